//! RFC1928 SOCKS Protocol Version 5 byte level tags
//!
use std::fmt;

pub const RESERVED: u8 = 0x00;

/// ATYP
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddrType {
    V4 = 0x01,
    Domain = 0x03,
    V6 = 0x04,
}

impl AddrType {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for AddrType {
    type Error = TryFromU8Error;

    fn try_from(n: u8) -> Result<AddrType, Self::Error> {
        match n {
            1 => Ok(AddrType::V4),
            3 => Ok(AddrType::Domain),
            4 => Ok(AddrType::V6),
            _ => Err(TryFromU8Error::new(n, "AddrType")),
        }
    }
}

impl fmt::Display for AddrType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use AddrType::*;
        match self {
            V4 => write!(f, "Version4 IP Address"),
            Domain => write!(f, "Fully Qualified Domain Name"),
            V6 => write!(f, "Version6 IP Address"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[error("try from u8({value:#X}) error to {to}")]
pub struct TryFromU8Error {
    /// source value
    pub value: u8,
    /// target type
    pub to: &'static str,
}

impl TryFromU8Error {
    pub fn new(value: u8, to: &'static str) -> Self {
        Self { value, to }
    }
}
