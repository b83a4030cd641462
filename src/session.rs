use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use derive_more::{Display, From};
use log::*;

use crate::auth_service::AuthService;
use crate::byte_stream::ByteStream;
use crate::connector::Connector;
use crate::model::dao::*;
use crate::model::model::*;
use crate::model::{reply_error, Error};
use crate::relay;
use crate::rw_socks_stream::ReadWriteStream;
use crate::server_command::ServerCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Display)]
#[display(fmt = "SessionId({})", _0)]
pub struct SessionId(pub u64);

/// Termination request of a session.
///
/// Sets the flag the relay polls on every read timeout, and closes the
/// registered connections so that reads blocking without a timeout return.
#[derive(Debug, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    conns: Mutex<Vec<Box<dyn ByteStream>>>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Flag shared with the relay threads
    pub fn flag(&self) -> Arc<AtomicBool> {
        self.flag.clone()
    }

    /// Close `conn` on stop, or right now if already stopped.
    pub fn register(&self, conn: Box<dyn ByteStream>) -> Result<(), Error> {
        let mut conns = self.conns.lock()?;
        if self.is_stopped() {
            conn.close();
        }
        conns.push(conn);
        Ok(())
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
        match self.conns.lock() {
            Ok(conns) => conns.iter().for_each(|conn| conn.close()),
            Err(err) => error!("stop: {}", err),
        }
    }
}

#[derive(Debug)]
pub struct SessionHandle {
    /// client address
    addr: SocketAddr,
    /// thread performs the whole session
    handle: thread::JoinHandle<Result<(), Error>>,
    /// termination request shared with the session
    stop: Arc<StopSignal>,
}

impl SessionHandle {
    pub fn new(
        addr: SocketAddr,
        handle: thread::JoinHandle<Result<(), Error>>,
        stop: Arc<StopSignal>,
    ) -> Self {
        Self { addr, handle, stop }
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Request the session to finish, closing its connections.
    pub fn stop(&self) {
        trace!("stop session: {}", self.addr);
        self.stop.stop();
    }

    pub fn join(self) -> thread::Result<Result<(), Error>> {
        trace!("join session: {}", self.addr);
        self.handle.join()
    }
}

/// One client connection: method negotiation, one request, then relay.
#[derive(Debug)]
pub struct Session<D, A, S> {
    pub id: SessionId,
    pub version: ProtocolVersion,
    pub dst_connector: Arc<D>,
    pub authorizer: A,
    /// termination request
    stop: Arc<StopSignal>,
    /// Send `Disconnect` command to the main thread when the session is dropped.
    guard: DisconnectGuard<S>,
}

impl<D, A, S> Session<D, A, S>
where
    D: Connector,
    A: AuthService,
{
    /// Returns Self and termination request flag.
    pub fn new(
        id: SessionId,
        version: ProtocolVersion,
        dst_connector: Arc<D>,
        authorizer: A,
        tx_cmd: mpsc::Sender<ServerCommand<S>>,
    ) -> (Self, Arc<StopSignal>) {
        let stop = Arc::new(StopSignal::new());
        (
            Self {
                id,
                version,
                dst_connector,
                authorizer,
                stop: stop.clone(),
                guard: DisconnectGuard::new(id, tx_cmd),
            },
            stop,
        )
    }

    fn make_session(
        &self,
        src_addr: SocketAddr,
        src_conn: impl ByteStream + 'static,
    ) -> Result<(), Error> {
        let mut socks = ReadWriteStream::new(src_conn);

        let select = negotiate_auth_method(self.version, &self.authorizer, &mut socks)?;
        debug!("{}: auth method: {}", self.id, select.method);

        // a request which cannot be decoded gets no reply
        let req = socks.recv_request()?;
        debug!("{}: request: {:?}", self.id, req);

        let (dst_conn, bound) = match perform_command(&req, &*self.dst_connector) {
            Ok(connected) => connected,
            Err(err) => {
                error!("{}: command error: {}", self.id, err);
                trace!("{}: command error: {:?}", self.id, err);
                socks.send_reply(&connect_reply(Err(&err)))?;
                return Err(err);
            }
        };
        info!("{}: connected: {}: bound {}", self.id, req.dial_target(), bound);
        if let Err(err) = dst_conn
            .try_clone()
            .and_then(|conn| self.stop.register(Box::new(conn)))
            .and_then(|()| socks.send_reply(&connect_reply(Ok(bound))))
        {
            dst_conn.close();
            return Err(err);
        }

        let src_conn = socks.into_inner();
        let relayed = relay::spawn_relay(
            src_addr.to_string(),
            req.dial_target(),
            &src_conn,
            &dst_conn,
            self.stop.flag(),
        )
        .map(|handle| handle.join());
        src_conn.close();
        dst_conn.close();

        match relayed? {
            Ok(result) => {
                debug!("{}: relay result: {:?}", self.id, result);
                Ok(())
            }
            Err(_) => Err(Error::panicked("relay")),
        }
    }

    pub fn start(
        self,
        src_addr: SocketAddr,
        src_conn: impl ByteStream + 'static,
    ) -> Result<(), Error> {
        info!("{}: start session: {}", self.id, src_addr);
        self.stop.register(Box::new(src_conn.try_clone()?))?;
        self.make_session(src_addr, src_conn)
    }
}

/// Reply to a CONNECT request.
///
/// A success reply carries the local endpoint of the backend connection,
/// a failure carries the zero address.
fn connect_reply(result: Result<SocketAddr, &Error>) -> Msg {
    match result {
        Ok(bound) => Msg::bound(bound),
        Err(err) => Msg {
            code: reply_error(Some(err)),
            addr: Address::unspecified(),
            port: 0,
        },
    }
}

/// Dispatch `req`, dialing the backend for `CONNECT`.
///
/// Returns the backend connection with its local endpoint.
fn perform_command<D>(req: &Msg, connector: &D) -> Result<(D::B, SocketAddr), Error>
where
    D: Connector,
{
    if !matches!(req.command(), Ok(Command::Connect)) {
        return Err(Error::command_not_supported(req.code));
    }
    let conn = connector.dial(L4Protocol::Tcp, &req.dial_target())?;
    match conn.local_addr() {
        Ok(bound) => Ok((conn, bound)),
        Err(err) => {
            conn.close();
            Err(err)
        }
    }
}

/// Run the method negotiation handshake on `socks`.
///
/// Only methods chosen by `auth` are accepted. When nothing acceptable is
/// offered the client is told so (`X'FF'`) and `NoAcceptableMethod` is
/// returned.
pub fn negotiate_auth_method(
    version: ProtocolVersion,
    auth: &impl AuthService,
    socks: &mut impl SocksStream,
) -> Result<MethodSelection, Error> {
    let candidates = socks.recv_method_candidates()?;
    trace!("candidates: {:?}", candidates);
    trace!("supported: {:?}", auth.supported());

    let selection = auth.select(&candidates.method);
    trace!("selection: {:?}", selection);

    let method_sel = MethodSelection {
        version,
        method: selection.unwrap_or(Method::NoMethods),
    };
    socks.send_method_selection(method_sel)?;
    match method_sel.method {
        Method::NoMethods => Err(Error::NoAcceptableMethod),
        _ => Ok(method_sel),
    }
}

#[derive(Debug)]
pub struct DisconnectGuard<S> {
    id: SessionId,
    tx: mpsc::Sender<ServerCommand<S>>,
}

impl<S> DisconnectGuard<S> {
    pub fn new(id: SessionId, tx: mpsc::Sender<ServerCommand<S>>) -> Self {
        Self { id, tx }
    }
}

impl<S> Drop for DisconnectGuard<S> {
    fn drop(&mut self) {
        debug!("DisconnectGuard: {}", self.id);
        // the server may already be gone
        self.tx.send(ServerCommand::Disconnect(self.id)).ok();
    }
}
