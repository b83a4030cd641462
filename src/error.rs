use thiserror::Error;

use crate::model;

pub type Result<T> = ::std::result::Result<T, Error>;

/// Server level error
#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[source] anyhow::Error),
    #[error("protocol error: {0}")]
    Protocol(#[source] model::Error),
}

impl From<model::Error> for Error {
    fn from(err: model::Error) -> Self {
        match err {
            model::Error::Io(io_err) => Error::Io(io_err),
            err => Error::Protocol(err),
        }
    }
}
