use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::slice;

use log::*;

use crate::model::{self, Address, Error, Msg, ProtocolVersion, SocksStream};
use crate::model::{DEFAULT_PROTOCOL_VERSION, MAX_DOMAIN_LEN};
use crate::raw_message::{AddrType, RESERVED};

// Every read consumes exactly the length of its field (`read_exact`),
// so a stream handing out data in small pieces decodes the same.
trait ReadSocksExt {
    fn read_u8(&mut self) -> Result<u8, Error>;
    fn read_u16(&mut self) -> Result<u16, Error>;
    fn read_rsv(&mut self) -> Result<u8, Error>;
    fn read_version(&mut self) -> Result<ProtocolVersion, Error>;
    fn read_methods(&mut self, nmethod: usize) -> Result<Vec<model::Method>, Error>;
    fn read_atyp(&mut self) -> Result<AddrType, Error>;
    fn read_addr(&mut self, atyp: AddrType) -> Result<Address, Error>;
}

// Writers return the count of bytes written and stop at the first error.
trait WriteSocksExt {
    fn write_u8(&mut self, v: u8) -> Result<usize, Error>;
    fn write_u16(&mut self, v: u16) -> Result<usize, Error>;
    fn write_version(&mut self, version: ProtocolVersion) -> Result<usize, Error>;
    fn write_atyp(&mut self, atyp: AddrType) -> Result<usize, Error>;
    fn write_addr(&mut self, addr: &Address) -> Result<usize, Error>;
}

impl<T> ReadSocksExt for T
where
    T: io::Read,
{
    fn read_u8(&mut self) -> Result<u8, Error> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> Result<u16, Error> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn read_rsv(&mut self) -> Result<u8, Error> {
        let rsv = self.read_u8()?;
        if rsv != RESERVED {
            Err(Error::BadReserved(rsv))
        } else {
            Ok(rsv)
        }
    }

    fn read_version(&mut self) -> Result<ProtocolVersion, Error> {
        let version = self.read_u8()?;
        if ProtocolVersion::from(version) != DEFAULT_PROTOCOL_VERSION {
            return Err(Error::BadVersion(version));
        }
        Ok(version.into())
    }

    fn read_methods(&mut self, nmethod: usize) -> Result<Vec<model::Method>, Error> {
        let mut methods = vec![0u8; nmethod];
        self.read_exact(&mut methods)?;
        Ok(methods.into_iter().map(Into::into).collect())
    }

    fn read_atyp(&mut self) -> Result<AddrType, Error> {
        let atyp = self.read_u8()?;
        AddrType::try_from(atyp).map_err(|_| Error::UnsupportedAddressType(atyp))
    }

    fn read_addr(&mut self, atyp: AddrType) -> Result<Address, Error> {
        match atyp {
            AddrType::V4 => {
                let mut buf = [0u8; 4];
                self.read_exact(&mut buf)?;
                Ok(Address::Ipv4(Ipv4Addr::from(buf)))
            }
            AddrType::Domain => {
                let len = self.read_u8()? as usize;
                let mut buf = vec![0u8; len];
                self.read_exact(&mut buf)?;
                Ok(Address::Domain(String::from_utf8_lossy(&buf).into_owned()))
            }
            AddrType::V6 => {
                let mut buf = [0u8; 16];
                self.read_exact(&mut buf)?;
                Ok(Address::Ipv6(Ipv6Addr::from(buf)))
            }
        }
    }
}

impl<T> WriteSocksExt for T
where
    T: io::Write,
{
    fn write_u8(&mut self, v: u8) -> Result<usize, Error> {
        self.write_all(slice::from_ref(&v))?;
        Ok(1)
    }

    fn write_u16(&mut self, v: u16) -> Result<usize, Error> {
        self.write_all(&v.to_be_bytes())?;
        Ok(2)
    }

    fn write_version(&mut self, version: ProtocolVersion) -> Result<usize, Error> {
        self.write_u8(version.into())
    }

    fn write_atyp(&mut self, atyp: AddrType) -> Result<usize, Error> {
        self.write_u8(atyp.code())
    }

    fn write_addr(&mut self, addr: &Address) -> Result<usize, Error> {
        check_encodable(addr)?;
        let mut n = self.write_atyp(addr.addr_type())?;
        match addr {
            Address::Ipv4(addr) => {
                self.write_all(&addr.octets())?;
                n += 4;
            }
            Address::Ipv6(addr) => {
                self.write_all(&addr.octets())?;
                n += 16;
            }
            Address::Domain(domain) => {
                n += self.write_u8(domain.len() as u8)?;
                self.write_all(domain.as_bytes())?;
                n += domain.len();
            }
        }
        Ok(n)
    }
}

fn check_encodable(addr: &Address) -> Result<(), Error> {
    match addr {
        Address::Domain(domain) if domain.len() > MAX_DOMAIN_LEN => {
            Err(Error::StringTooLong(domain.len()))
        }
        _ => Ok(()),
    }
}

impl Address {
    /// Read `ATYP ADDR` from `strm`.
    ///
    /// An unknown tag fails with `UnsupportedAddressType` and nothing past
    /// the tag is consumed.
    pub fn read_from<R: io::Read>(mut strm: R) -> Result<Self, Error> {
        let atyp = strm.read_atyp()?;
        strm.read_addr(atyp)
    }

    /// Write `ATYP ADDR` to `strm`, returns the number of bytes written.
    ///
    /// A domain name over 255 bytes fails with `StringTooLong` before any
    /// byte is written.
    pub fn write_to<W: io::Write>(&self, mut strm: W) -> Result<usize, Error> {
        strm.write_addr(self)
    }
}

impl Msg {
    /// Read `VER CODE RSV ATYP ADDR PORT` from `strm`.
    pub fn read_from<R: io::Read>(mut strm: R) -> Result<Self, Error> {
        strm.read_version()?;
        let code = strm.read_u8()?;
        strm.read_rsv()?;
        let addr = Address::read_from(&mut strm)?;
        let port = strm.read_u16()?;
        Ok(Msg { code, addr, port })
    }

    /// Write `VER CODE RSV ATYP ADDR PORT` to `strm`, returns the number of
    /// bytes written.
    pub fn write_to<W: io::Write>(&self, mut strm: W) -> Result<usize, Error> {
        check_encodable(&self.addr)?;
        let mut n = strm.write_version(DEFAULT_PROTOCOL_VERSION)?;
        n += strm.write_u8(self.code)?;
        n += strm.write_u8(RESERVED)?;
        n += strm.write_addr(&self.addr)?;
        n += strm.write_u16(self.port)?;
        Ok(n)
    }
}

/// Wrapper of Read/Write stream
/// for impl SocksStream.
#[derive(Debug)]
pub struct ReadWriteStream<T> {
    strm: T,
}

impl<T> ReadWriteStream<T>
where
    T: io::Read + io::Write,
{
    pub fn new(strm: T) -> Self {
        Self { strm }
    }

    pub fn into_inner(self) -> T {
        self.strm
    }
}

impl<T> SocksStream for ReadWriteStream<T>
where
    T: io::Read + io::Write,
{
    fn recv_method_candidates(&mut self) -> Result<model::MethodCandidates, Error> {
        trace!("recv_method_candidates");
        let version = self.strm.read_version()?;
        let nmethods = self.strm.read_u8()?;
        let method = self.strm.read_methods(nmethods as usize)?;
        Ok(model::MethodCandidates { version, method })
    }

    fn send_method_selection(
        &mut self,
        method_selection: model::MethodSelection,
    ) -> Result<(), Error> {
        trace!("send_method_selection: {:?}", method_selection);
        let buf = [
            method_selection.version.into(),
            method_selection.method.code(),
        ];
        self.strm.write_all(&buf)?;
        Ok(())
    }

    fn recv_request(&mut self) -> Result<Msg, Error> {
        trace!("recv_request");
        Msg::read_from(&mut self.strm)
    }

    fn send_reply(&mut self, reply: &Msg) -> Result<usize, Error> {
        trace!("send_reply: {:?}", reply);
        let n = reply.write_to(&mut self.strm)?;
        self.strm.flush()?;
        Ok(n)
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::byte_stream::test::{BufferStream, IterBuffer};
    use crate::model::{Command, Method, MethodCandidates, MethodSelection, ReplyCode};

    pub fn write_method_candidates<T: io::Write>(
        mut strm: T,
        cand: MethodCandidates,
    ) -> Result<(), Error> {
        strm.write_version(cand.version)?;
        strm.write_u8(cand.method.len() as u8)?;
        for method in cand.method {
            strm.write_u8(method.code())?;
        }
        Ok(())
    }

    pub fn read_method_selection<T: io::Read>(mut strm: T) -> Result<MethodSelection, Error> {
        let version = strm.read_version()?;
        let method = strm.read_u8()?.into();
        Ok(MethodSelection { version, method })
    }

    /// Writer accepting at most `limit` bytes in total
    struct ShortWriter {
        buf: Vec<u8>,
        limit: usize,
    }

    impl io::Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.limit - self.buf.len();
            if room == 0 {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            let n = room.min(buf.len());
            self.buf.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn domain(len: usize) -> Address {
        Address::Domain("a".repeat(len))
    }

    #[test]
    fn msg_round_trip() {
        let addrs = vec![
            Address::Ipv4(Ipv4Addr::new(1, 2, 3, 4)),
            Address::Ipv6(Ipv6Addr::new(7, 6, 5, 4, 3, 2, 1, 0)),
            Address::Domain("example.com".into()),
            domain(0),
            domain(MAX_DOMAIN_LEN),
        ];
        for (i, addr) in addrs.into_iter().enumerate() {
            let msg = Msg {
                code: (i * 51) as u8,
                addr,
                port: (i as u16).wrapping_mul(16411),
            };
            let mut cursor = io::Cursor::new(vec![]);
            let written = msg.write_to(&mut cursor).unwrap();
            assert_eq!(written, cursor.get_ref().len());

            cursor.set_position(0);
            assert_eq!(Msg::read_from(&mut cursor).unwrap(), msg);
            assert_eq!(cursor.position() as usize, written);
        }
    }

    #[test]
    fn msg_wire_layout() {
        let req = Msg::request(Command::Connect, Ipv4Addr::new(127, 0, 0, 1).into(), 80);
        let mut buf = vec![];
        assert_eq!(req.write_to(&mut buf).unwrap(), 10);
        assert_eq!(buf, [5, 1, 0, 1, 127, 0, 0, 1, 0, 80]);

        let rep = Msg::reply(
            ReplyCode::GeneralFailure,
            Address::Domain("example.com".into()),
            8335,
        );
        let mut buf = vec![];
        assert_eq!(rep.write_to(&mut buf).unwrap(), 18);
        assert_eq!(
            buf,
            [
                5, 1, 0, 3, 11, b'e', b'x', b'a', b'm', b'p', b'l', b'e', b'.', b'c', b'o', b'm',
                0x20, 0x8f
            ]
        );

        let rep = Msg::reply(ReplyCode::Success, Ipv6Addr::LOCALHOST.into(), 1080);
        let mut buf = vec![];
        assert_eq!(rep.write_to(&mut buf).unwrap(), 22);
        assert_eq!(&buf[..4], &[5, 0, 0, 4]);
        assert_eq!(&buf[4..20], &Ipv6Addr::LOCALHOST.octets());
        assert_eq!(&buf[20..], &[0x04, 0x38]);
    }

    #[test]
    fn domain_name_boundary() {
        let mut buf = vec![];
        assert_eq!(domain(255).write_to(&mut buf).unwrap(), 257);
        assert_eq!(buf[1], 255);
        assert_eq!(Address::read_from(&buf[..]).unwrap(), domain(255));

        let mut buf = vec![];
        assert!(matches!(
            domain(256).write_to(&mut buf),
            Err(Error::StringTooLong(256))
        ));
        assert!(buf.is_empty());

        let msg = Msg::request(Command::Connect, domain(256), 80);
        let mut buf = vec![];
        assert!(matches!(
            msg.write_to(&mut buf),
            Err(Error::StringTooLong(256))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn unsupported_address_type() {
        for atyp in [0x00u8, 0x02, 0x05, 0xff] {
            let mut cursor = io::Cursor::new(vec![atyp, 1, 2, 3, 4, 5, 6]);
            assert!(matches!(
                Address::read_from(&mut cursor),
                Err(Error::UnsupportedAddressType(a)) if a == atyp
            ));
            assert_eq!(cursor.position(), 1);
        }
    }

    #[test]
    fn framing_errors() {
        let mut cursor = io::Cursor::new(vec![4, 1, 0, 1, 127, 0, 0, 1, 0, 80]);
        assert!(matches!(
            Msg::read_from(&mut cursor),
            Err(Error::BadVersion(4))
        ));

        let mut cursor = io::Cursor::new(vec![5, 1, 1, 1, 127, 0, 0, 1, 0, 80]);
        assert!(matches!(
            Msg::read_from(&mut cursor),
            Err(Error::BadReserved(1))
        ));

        // truncated port
        let mut cursor = io::Cursor::new(vec![5, 1, 0, 1, 127, 0, 0, 1, 0]);
        match Msg::read_from(&mut cursor) {
            Err(Error::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn fragmented_read() {
        let bytes = vec![
            5, 1, 0, 3, 11, b'e', b'x', b'a', b'm', b'p', b'l', b'e', b'.', b'c', b'o', b'm',
            0x7d, 0x6c,
        ];
        let mut strm = IterBuffer::new(
            bytes.into_iter().map(|b| vec![b]).collect::<Vec<_>>().into_iter(),
            io::Cursor::new(vec![]),
        );
        assert_eq!(
            Msg::read_from(&mut strm).unwrap(),
            Msg::request(Command::Connect, Address::Domain("example.com".into()), 32108)
        );
    }

    #[test]
    fn write_stops_at_first_error() {
        let msg = Msg::request(Command::Connect, Address::Domain("example.com".into()), 80);
        let mut strm = ShortWriter {
            buf: vec![],
            limit: 5,
        };
        assert!(matches!(msg.write_to(&mut strm), Err(Error::Io(_))));
        assert_eq!(strm.buf, [5, 1, 0, 3, 11]);
    }

    #[test]
    fn buffer_stream() {
        let input = vec![
            5, 1, 0, 5, 6, 0, 1, 2, 0x6a, 0xef, 0xff, 5, 1, 0, 1, 1, 2, 3, 4, 0, 5, 5, 1, 0, 3, 11,
            b'e', b'x', b'a', b'm', b'p', b'l', b'e', b'.', b'c', b'o', b'm', 0x7d, 0x6c, 5, 2, 0,
            1, 0, 0, 0, 0, 0x1f, 0x90, 5, 3, 0, 3, 11, b'e', b'x', b'a', b'm', b'p', b'l', b'e',
            b'.', b'c', b'o', b'm', 0x7, 0xe4,
        ];
        let mut strm =
            ReadWriteStream::new(BufferStream::with_buffer((&input).into(), vec![].into()));
        assert_eq!(
            strm.recv_method_candidates().unwrap(),
            MethodCandidates::new(&[Method::NoAuth])
        );
        assert_eq!(
            strm.recv_method_candidates().unwrap(),
            MethodCandidates::new(&[
                Method::NoAuth,
                Method::GssApi,
                Method::UserPass,
                Method::IANAMethod(0x6a),
                Method::Private(0xef),
                Method::NoMethods
            ])
        );
        assert_eq!(
            strm.recv_request().unwrap(),
            Msg::request(Command::Connect, Ipv4Addr::new(1, 2, 3, 4).into(), 5)
        );
        assert_eq!(
            strm.recv_request().unwrap(),
            Msg::request(Command::Connect, Address::Domain("example.com".into()), 32108)
        );
        assert_eq!(
            strm.recv_request().unwrap(),
            Msg::request(Command::Bind, Ipv4Addr::UNSPECIFIED.into(), 8080)
        );
        assert_eq!(
            strm.recv_request().unwrap(),
            Msg::request(
                Command::UdpAssociate,
                Address::Domain("example.com".into()),
                2020
            )
        );

        for method in [Method::NoAuth, Method::Private(0xfe), Method::NoMethods] {
            strm.send_method_selection(MethodSelection {
                version: DEFAULT_PROTOCOL_VERSION,
                method,
            })
            .unwrap();
        }
        assert_eq!(
            strm.send_reply(&Msg::bound("127.0.0.1:1080".parse().unwrap()))
                .unwrap(),
            10
        );
        assert_eq!(
            strm.send_reply(&Msg::failure(ReplyCode::CommandNotSupported))
                .unwrap(),
            10
        );

        let inner = strm.into_inner();
        // consumed all bytes
        assert_eq!(inner.rd_buff().position(), input.len() as u64);
        let out_exp: Vec<u8> = [5, 0]
            .iter()
            .chain([5, 0xfe].iter())
            .chain([5, 0xff].iter())
            .chain([5, 0, 0, 1, 127, 0, 0, 1, 0x4, 0x38].iter())
            .chain([5, 7, 0, 1, 0, 0, 0, 0, 0, 0].iter())
            .cloned()
            .collect();
        assert_eq!(inner.wr_buff().get_ref(), &out_exp);
    }

    #[test]
    fn reject_bad_greeting_version() {
        let mut strm =
            ReadWriteStream::new(BufferStream::with_buffer(vec![4, 1, 0].into(), vec![].into()));
        assert!(matches!(
            strm.recv_method_candidates(),
            Err(Error::BadVersion(4))
        ));
    }
}
