use std::io;
use std::sync;

use crate::model::*;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("poisoned error: {0}")]
    Poisoned(String),
    #[error("disconnected channel error: {name}")]
    Disconnected { name: String },
    #[error("thread panicked: {name}")]
    Panicked { name: String },
    #[error("unexpected protocol version: {0} (expected 5)")]
    BadVersion(u8),
    #[error("reserved field was not zero: {0}")]
    BadReserved(u8),
    #[error("unsupported address type: {0:#X}")]
    UnsupportedAddressType(u8),
    #[error("string too long: {0} bytes (max 255)")]
    StringTooLong(usize),
    #[error("authentication error: no acceptable method")]
    NoAcceptableMethod,
    #[error("command not supported: {cmd:#X}")]
    CommandNotSupported { cmd: u8 },
    #[error("address already in use: {addr}")]
    AddressAlreadyInUse { addr: SocketAddr },
    #[error("address not available: {addr}")]
    AddressNotAvailable { addr: SocketAddr },
    /// failure already expressed as a SOCKS reply
    #[error("{0}")]
    Reply(#[from] ReplyCode),
}

impl Error {
    pub fn disconnected<S: Into<String>>(name: S) -> Self {
        Self::Disconnected { name: name.into() }
    }

    pub fn panicked<S: Into<String>>(name: S) -> Self {
        Self::Panicked { name: name.into() }
    }

    pub fn command_not_supported(cmd: u8) -> Self {
        Self::CommandNotSupported { cmd }
    }

    /// Reply code reported to the client for this error.
    pub fn reply_code(&self) -> ReplyCode {
        match self {
            Error::Reply(code) => *code,
            Error::CommandNotSupported { .. } => ReplyCode::CommandNotSupported,
            _ => ReplyCode::GeneralFailure,
        }
    }
}

/// Reply field value for the outcome of a request.
///
/// `None` is success. An error carrying a reply code yields that code,
/// any other error is a general server failure.
pub fn reply_error(err: Option<&Error>) -> u8 {
    match err {
        None => ReplyCode::Success.code(),
        Some(err) => err.reply_code().code(),
    }
}

impl<T> From<sync::PoisonError<T>> for Error {
    fn from(error: sync::PoisonError<T>) -> Self {
        Error::Poisoned(error.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reply_mapping() {
        assert_eq!(reply_error(None), 0x00);

        let opaque = Error::Io(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(reply_error(Some(&opaque)), 0x01);
        assert_eq!(reply_error(Some(&Error::BadVersion(4))), 0x01);
        assert_eq!(reply_error(Some(&Error::NoAcceptableMethod)), 0x01);

        for code in 0..=8u8 {
            let rep = ReplyCode::from_u8(code).unwrap();
            assert_eq!(reply_error(Some(&rep.into())), code);
        }

        assert_eq!(
            reply_error(Some(&Error::command_not_supported(0x02))),
            ReplyCode::CommandNotSupported.code()
        );
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            Error::BadVersion(4).to_string(),
            "unexpected protocol version: 4 (expected 5)"
        );
        assert_eq!(
            Error::StringTooLong(256).to_string(),
            "string too long: 256 bytes (max 255)"
        );
        assert_eq!(
            Error::from(ReplyCode::ConnectionRefused).to_string(),
            "connection refused"
        );
    }
}
