//! SOCKS5 message types exchanged between client and proxy.
//!
//! ```text
//! client            proxy            backend
//!   |                 |                 |
//!   |---------------->|                 |
//!   |MethodCandidates |                 |
//!   |                 |                 |
//!   |<----------------|                 |
//!   |  MethodSelection|                 |
//!   |                 |                 |
//!   |---------------->|                 |
//!   |Msg (request)    |---------------->|
//!   |                 |        dial     |
//!   |<----------------|                 |
//!   |      Msg (reply)|                 |
//!   |                 |                 |
//!   .                 .                 .
//!   | - - - - - - - ->| - - - - - - - ->|
//!   |            [[ Relay ]]            |
//!   |<- - - - - - - - |< - - - - - - - -|
//!   .                 .                 .
//! ```
//!
use std::fmt;
pub use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use derive_more::{Display, From, Into};

use crate::raw_message::{AddrType, TryFromU8Error};

pub const DEFAULT_PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion(5);

/// Longest domain name representable with the one byte length prefix.
pub const MAX_DOMAIN_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Into, From, Display)]
pub struct ProtocolVersion(u8);

/// Authentication Methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum Method {
    /// No Authentication
    #[display(fmt = "No Authentication Required")]
    NoAuth,
    /// GSSAPI
    #[display(fmt = "GSSAPI")]
    GssApi,
    /// Authenticate with a username / password
    #[display(fmt = "Username/Password")]
    UserPass,
    /// IANA assigned method
    #[display(fmt = "IANA Assigned: {:#X}", _0)]
    IANAMethod(u8),
    /// Reserved for private method
    #[display(fmt = "Private Methods: {:#X}", _0)]
    Private(u8),
    /// No acceptable method
    #[display(fmt = "No Acceptable Methods")]
    NoMethods,
}

impl Method {
    pub fn code(&self) -> u8 {
        use Method::*;
        match self {
            NoAuth => 0x00,
            GssApi => 0x01,
            UserPass => 0x02,
            IANAMethod(c) => *c,
            Private(c) => *c,
            NoMethods => 0xff,
        }
    }
}

impl From<u8> for Method {
    fn from(code: u8) -> Self {
        use Method::*;
        match code {
            0x00 => NoAuth,
            0x01 => GssApi,
            0x02 => UserPass,
            0x03..=0x7F => IANAMethod(code),
            0x80..=0xFE => Private(code),
            0xFF => NoMethods,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MethodCandidates {
    pub version: ProtocolVersion,
    pub method: Vec<Method>,
}

impl MethodCandidates {
    pub fn new(method: &[Method]) -> Self {
        Self {
            version: DEFAULT_PROTOCOL_VERSION,
            method: method.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MethodSelection {
    pub version: ProtocolVersion,
    pub method: Method,
}

/// SOCKS5 CMD
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

impl TryFrom<u8> for Command {
    type Error = TryFromU8Error;

    fn try_from(n: u8) -> Result<Command, Self::Error> {
        match n {
            1 => Ok(Command::Connect),
            2 => Ok(Command::Bind),
            3 => Ok(Command::UdpAssociate),
            _ => Err(TryFromU8Error::new(n, "Command")),
        }
    }
}

/// Section 6. Replies > Reply field value
///
/// A reply code is also an error value: a backend failing with one of these
/// has it reported to the client verbatim.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReplyCode {
    #[error("succeeded")]
    Success = 0x00,
    #[error("general SOCKS server failure")]
    GeneralFailure = 0x01,
    #[error("connection not allowed by ruleset")]
    ConnectionNotAllowed = 0x02,
    #[error("network unreachable")]
    NetworkUnreachable = 0x03,
    #[error("host unreachable")]
    HostUnreachable = 0x04,
    #[error("connection refused")]
    ConnectionRefused = 0x05,
    #[error("TTL expired")]
    TtlExpired = 0x06,
    #[error("command not supported")]
    CommandNotSupported = 0x07,
    #[error("address type not supported")]
    AddrTypeNotSupported = 0x08,
}

impl ReplyCode {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    #[cfg(test)]
    pub fn from_u8(code: u8) -> Result<Self, TryFromU8Error> {
        use ReplyCode::*;
        match code {
            0 => Ok(Success),
            1 => Ok(GeneralFailure),
            2 => Ok(ConnectionNotAllowed),
            3 => Ok(NetworkUnreachable),
            4 => Ok(HostUnreachable),
            5 => Ok(ConnectionRefused),
            6 => Ok(TtlExpired),
            7 => Ok(CommandNotSupported),
            8 => Ok(AddrTypeNotSupported),
            c => Err(TryFromU8Error::new(c, "ReplyCode")),
        }
    }
}

/// Network kinds a backend may be asked to dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum L4Protocol {
    #[display(fmt = "tcp")]
    Tcp,
    #[display(fmt = "udp")]
    Udp,
}

/// Destination or bound host as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Address {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    /// at most `MAX_DOMAIN_LEN` bytes to be encodable
    Domain(String),
}

impl Address {
    /// `0.0.0.0`, echoed in replies that carry no bound address
    pub fn unspecified() -> Self {
        Address::Ipv4(Ipv4Addr::UNSPECIFIED)
    }

    pub fn addr_type(&self) -> AddrType {
        match self {
            Address::Ipv4(_) => AddrType::V4,
            Address::Ipv6(_) => AddrType::V6,
            Address::Domain(_) => AddrType::Domain,
        }
    }

    /// Join with `port` into a dialable `host:port` string.
    /// IPv6 hosts are bracketed.
    pub fn host_port(&self, port: u16) -> String {
        match self {
            Address::Ipv6(addr) => format!("[{}]:{}", addr, port),
            host => format!("{}:{}", host, port),
        }
    }
}

/// Host part only, IPv6 without brackets.
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Address::Ipv4(addr) => write!(f, "{}", addr),
            Address::Ipv6(addr) => write!(f, "{}", addr),
            Address::Domain(domain) => write!(f, "{}", domain),
        }
    }
}

impl From<IpAddr> for Address {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(addr) => Address::Ipv4(addr),
            IpAddr::V6(addr) => Address::Ipv6(addr),
        }
    }
}

impl From<Ipv4Addr> for Address {
    fn from(addr: Ipv4Addr) -> Self {
        Address::Ipv4(addr)
    }
}

impl From<Ipv6Addr> for Address {
    fn from(addr: Ipv6Addr) -> Self {
        Address::Ipv6(addr)
    }
}

/// A SOCKS5 request or reply.
///
/// Both directions share the layout `VER CODE RSV ATYP ADDR PORT`,
/// `code` being CMD on requests and REP on replies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Msg {
    pub code: u8,
    pub addr: Address,
    pub port: u16,
}

impl Msg {
    pub fn request(command: Command, addr: Address, port: u16) -> Self {
        Self {
            code: command as u8,
            addr,
            port,
        }
    }

    pub fn reply(rep: ReplyCode, addr: Address, port: u16) -> Self {
        Self {
            code: rep.code(),
            addr,
            port,
        }
    }

    /// Reply with the zero address and port
    pub fn failure(rep: ReplyCode) -> Self {
        Self::reply(rep, Address::unspecified(), 0)
    }

    /// Success reply announcing `bound` as the backend side local endpoint
    pub fn bound(bound: SocketAddr) -> Self {
        Self::reply(ReplyCode::Success, bound.ip().into(), bound.port())
    }

    pub fn command(&self) -> Result<Command, TryFromU8Error> {
        Command::try_from(self.code)
    }

    /// `host:port` string for the backend
    pub fn dial_target(&self) -> String {
        self.addr.host_port(self.port)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn method_codes() {
        for code in 0..=255u8 {
            assert_eq!(Method::from(code).code(), code);
        }
        assert_eq!(Method::from(0), Method::NoAuth);
        assert_eq!(Method::from(0x6a), Method::IANAMethod(0x6a));
        assert_eq!(Method::from(0xef), Method::Private(0xef));
        assert_eq!(Method::from(0xff), Method::NoMethods);
    }

    #[test]
    fn reply_codes() {
        for code in 0..=8u8 {
            assert_eq!(ReplyCode::from_u8(code).unwrap().code(), code);
        }
        assert!(ReplyCode::from_u8(9).is_err());
        assert_eq!(
            ReplyCode::CommandNotSupported.to_string(),
            "command not supported"
        );
    }

    #[test]
    fn commands() {
        assert_eq!(Command::try_from(1).unwrap(), Command::Connect);
        assert_eq!(Command::try_from(2).unwrap(), Command::Bind);
        assert_eq!(Command::try_from(3).unwrap(), Command::UdpAssociate);
        assert!(Command::try_from(0).is_err());
        assert!(Command::try_from(4).is_err());
    }

    #[test]
    fn dial_target() {
        let req = Msg::request(Command::Connect, Ipv4Addr::new(127, 0, 0, 1).into(), 80);
        assert_eq!(req.dial_target(), "127.0.0.1:80");
        let req = Msg::request(Command::Connect, Ipv6Addr::LOCALHOST.into(), 443);
        assert_eq!(req.dial_target(), "[::1]:443");
        let req = Msg::request(Command::Connect, Address::Domain("example.com".into()), 8080);
        assert_eq!(req.dial_target(), "example.com:8080");
        assert_eq!(Address::Ipv6(Ipv6Addr::LOCALHOST).to_string(), "::1");
    }

    #[test]
    fn bound_reply() {
        let rep = Msg::bound("10.0.0.5:54321".parse().unwrap());
        assert_eq!(rep.code, 0);
        assert_eq!(rep.addr, Address::Ipv4(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(rep.port, 54321);

        let rep = Msg::bound("[fe80::1]:1080".parse().unwrap());
        assert_eq!(rep.addr.addr_type(), AddrType::V6);

        assert_eq!(
            Msg::failure(ReplyCode::HostUnreachable),
            Msg {
                code: 4,
                addr: Address::Ipv4(Ipv4Addr::UNSPECIFIED),
                port: 0
            }
        );
    }
}
