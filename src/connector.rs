use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::*;

use crate::byte_stream::ByteStream;
use crate::model::{Error, L4Protocol, ReplyCode};

/// Backend establishing outbound connections on behalf of clients.
///
/// One connector is shared by every session, so `dial` may be called from
/// many threads at once.
pub trait Connector: Send + Sync {
    type B: ByteStream + 'static;

    /// Connect to `host_port` (`host:port`, IPv6 hosts bracketed).
    ///
    /// Failing with `Error::Reply` reports that code to the client,
    /// any other error is reported as a general server failure.
    fn dial(&self, network: L4Protocol, host_port: &str) -> Result<Self::B, Error>;
}

/// Pass-through to the network stack of this host.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    rw_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(rw_timeout: Option<Duration>) -> Self {
        Self {
            rw_timeout,
            connect_timeout: None,
        }
    }

    pub fn set_connect_timeout(&mut self, dur: Option<Duration>) -> &mut Self {
        self.connect_timeout = dur;
        self
    }
}

impl Connector for TcpConnector {
    type B = TcpStream;

    fn dial(&self, network: L4Protocol, host_port: &str) -> Result<Self::B, Error> {
        if network != L4Protocol::Tcp {
            return Err(ReplyCode::CommandNotSupported.into());
        }
        let strm = match self.connect_timeout {
            Some(timeout) => connect_timeout(host_port, timeout),
            None => TcpStream::connect(host_port),
        }
        .map_err(conn_error)?;
        strm.set_read_timeout(self.rw_timeout)?;
        strm.set_write_timeout(self.rw_timeout)?;
        debug!("dialed: {}: {:?}", host_port, strm.peer_addr());
        Ok(strm)
    }
}

/// Try each resolved address in turn, reporting the last failure.
fn connect_timeout(host_port: &str, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in host_port.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(strm) => return Ok(strm),
            Err(err) => {
                trace!("connect error: {}: {}", addr, err);
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("could not resolve to any address: {}", host_port),
        )
    }))
}

fn conn_error(io_err: io::Error) -> Error {
    match io_err.kind() {
        io::ErrorKind::ConnectionRefused => ReplyCode::ConnectionRefused.into(),
        _ => io_err.into(),
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use std::collections::BTreeMap;
    use std::iter::FromIterator;
    use std::net::TcpListener;
    use std::sync::Mutex;

    /// Canned backend keyed by `host:port`.
    ///
    /// `Err(Some(code))` fails with that reply code,
    /// `Err(None)` fails with an opaque io error.
    #[derive(Debug)]
    pub struct BufferConnector<S> {
        pub strms: BTreeMap<String, Result<S, Option<ReplyCode>>>,
        pub dialed: Mutex<Vec<(L4Protocol, String)>>,
    }

    impl<S> FromIterator<(String, Result<S, Option<ReplyCode>>)> for BufferConnector<S> {
        fn from_iter<T>(iter: T) -> Self
        where
            T: IntoIterator<Item = (String, Result<S, Option<ReplyCode>>)>,
        {
            Self {
                strms: iter.into_iter().collect(),
                dialed: Mutex::new(vec![]),
            }
        }
    }

    impl<S> BufferConnector<S> {
        pub fn stream(&self, host_port: &str) -> &S {
            self.strms[host_port].as_ref().unwrap()
        }

        pub fn dialed(&self) -> Vec<(L4Protocol, String)> {
            self.dialed.lock().unwrap().clone()
        }
    }

    impl<S> Connector for BufferConnector<S>
    where
        S: ByteStream + Clone + Sync + 'static,
    {
        type B = S;

        fn dial(&self, network: L4Protocol, host_port: &str) -> Result<Self::B, Error> {
            self.dialed
                .lock()
                .unwrap()
                .push((network, host_port.to_owned()));
            match self.strms.get(host_port) {
                Some(Ok(strm)) => Ok(strm.clone()),
                Some(Err(Some(code))) => Err((*code).into()),
                Some(Err(None)) | None => {
                    Err(io::Error::new(io::ErrorKind::Other, host_port.to_owned()).into())
                }
            }
        }
    }

    #[test]
    fn tcp_connector_dial() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let connector = TcpConnector::new(Some(Duration::from_secs(1)));
        let strm = connector
            .dial(L4Protocol::Tcp, &addr.to_string())
            .unwrap();
        assert_eq!(strm.peer_addr().unwrap(), addr);
        assert_eq!(strm.read_timeout().unwrap(), Some(Duration::from_secs(1)));
        assert!(ByteStream::local_addr(&strm).unwrap().ip().is_loopback());
    }

    #[test]
    fn tcp_connector_refused() {
        // reserve a port then release it so nothing listens there
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let mut connector = TcpConnector::default();
        connector.set_connect_timeout(Some(Duration::from_secs(1)));
        let err = connector
            .dial(L4Protocol::Tcp, &addr.to_string())
            .unwrap_err();
        assert_eq!(err.reply_code(), ReplyCode::ConnectionRefused);
    }

    #[test]
    fn tcp_connector_rejects_udp() {
        let err = TcpConnector::default()
            .dial(L4Protocol::Udp, "127.0.0.1:53")
            .unwrap_err();
        assert_eq!(err.reply_code(), ReplyCode::CommandNotSupported);
    }
}
