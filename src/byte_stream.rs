use std::fmt;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};

use crate::model::Error;

/// Write half which can signal end-of-stream to its peer.
pub trait HalfClose: io::Write + Send {
    /// Stop sending. Further writes fail; the peer reads EOF.
    fn close_write(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub type ReadHalf = Box<dyn io::Read + Send>;
pub type WriteHalf = Box<dyn HalfClose>;

/// read/write operations on byte stream
pub trait ByteStream: fmt::Debug + io::Read + io::Write + Send {
    /// Independently owned read and write halves of this stream.
    fn split(&self) -> Result<(ReadHalf, WriteHalf), Error>;

    /// Local endpoint of the stream
    fn local_addr(&self) -> Result<SocketAddr, Error>;

    /// Another handle to the same stream. Closing either closes both.
    fn try_clone(&self) -> Result<Self, Error>
    where
        Self: Sized;

    /// Best-effort close of both directions.
    fn close(&self) {}
}

impl HalfClose for TcpStream {
    fn close_write(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

/// byte stream on tcp connection
impl ByteStream for TcpStream {
    fn split(&self) -> Result<(ReadHalf, WriteHalf), Error> {
        let rd = self.try_clone()?;
        let wr = self.try_clone()?;
        Ok((Box::new(rd), Box::new(wr)))
    }

    fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(TcpStream::local_addr(self)?)
    }

    fn try_clone(&self) -> Result<Self, Error> {
        Ok(TcpStream::try_clone(self)?)
    }

    fn close(&self) {
        self.shutdown(Shutdown::Both).ok();
    }
}
