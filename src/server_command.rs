//! Server control command
//!
use std::fmt;
use std::net::SocketAddr;

use crate::model::Error;
use crate::session::SessionId;

pub enum ServerCommand<T> {
    /// terminate
    Terminate,
    /// connected stream and client address
    Connect(T, SocketAddr),
    /// session has been finished
    Disconnect(SessionId),
    /// the listening socket failed; the server shuts down with this error
    AcceptFailed(Error),
}

impl<T> fmt::Debug for ServerCommand<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ServerCommand::*;
        match self {
            Terminate => write!(f, "Terminate"),
            Connect(_, addr) => write!(f, "Connect(_, {})", addr),
            Disconnect(id) => write!(f, "Disconnect({})", id),
            AcceptFailed(err) => write!(f, "AcceptFailed({})", err),
        }
    }
}
