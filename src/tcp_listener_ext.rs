use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags};

pub trait TcpListenerExt {
    fn accept_timeout(&self, timeout: Option<Duration>) -> io::Result<(TcpStream, SocketAddr)>;
}

impl TcpListenerExt for TcpListener {
    /// accept(2) with timeout
    ///
    /// * `timeout`
    ///   Timeout for _accept_. If the value is `None`, wait connection indefinitely.
    ///
    /// Fails with `TimedOut` if no connection arrives in time.
    fn accept_timeout(&self, timeout: Option<Duration>) -> io::Result<(TcpStream, SocketAddr)> {
        let mut fds = [PollFd::new(self.as_raw_fd(), PollFlags::POLLIN)];
        let n = poll(&mut fds, timeout.map_or(-1, dur_to_millis))?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "poll accept"));
        }
        self.accept()
    }
}

/// Duration in milliseconds as taken by poll(2), saturating.
fn dur_to_millis(dur: Duration) -> i32 {
    dur.as_millis().try_into().unwrap_or(i32::MAX)
}
