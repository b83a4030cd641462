use super::error::Error;
use super::model::*;

/// Message level view of a client connection.
pub trait SocksStream {
    fn recv_method_candidates(&mut self) -> Result<MethodCandidates, Error>;
    fn send_method_selection(&mut self, method: MethodSelection) -> Result<(), Error>;
    fn recv_request(&mut self) -> Result<Msg, Error>;
    /// returns the number of bytes written
    fn send_reply(&mut self, reply: &Msg) -> Result<usize, Error>;
}
