use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::{
    mpsc::{self, Receiver, Sender},
    Arc, Mutex,
};
use std::thread;

use log::*;
use rand::prelude::*;
use rand::rngs::StdRng;

use crate::acceptor::{Binder, TcpBinder};
use crate::auth_service::{AuthService, NoAuthService};
use crate::byte_stream::ByteStream;
use crate::config::ServerConfig;
use crate::connector::{Connector, TcpConnector};
use crate::error::Error;
use crate::model::{self, ProtocolVersion, SocketAddr, DEFAULT_PROTOCOL_VERSION};
use crate::server_command::ServerCommand;
use crate::session::{Session, SessionHandle, SessionId, StopSignal};
use crate::thread::spawn_thread;

pub struct Server<S, T, C> {
    config: ServerConfig,
    tx_cmd: Sender<ServerCommand<S>>,
    rx_cmd: Receiver<ServerCommand<S>>,
    /// bind server address
    binder: T,
    /// send termination message to the acceptor
    tx_acceptor_done: Sender<()>,
    /// make connection to service host
    connector: Arc<C>,
    protocol_version: ProtocolVersion,
    session: HashMap<SessionId, SessionHandle>,
    /// random context for generating SessionIds
    id_rng: StdRng,
}

/// spawn a thread send accepted stream to `tx`
///
/// An accept error is forwarded as `AcceptFailed` and ends the thread.
fn spawn_acceptor<S>(
    acceptor: impl Iterator<Item = Result<(S, SocketAddr), model::Error>> + Send + 'static,
    tx: Sender<ServerCommand<S>>,
) -> Result<thread::JoinHandle<()>, Error>
where
    S: ByteStream + 'static,
{
    use ServerCommand::*;
    Ok(spawn_thread("acceptor", move || {
        for accepted in acceptor {
            let cmd = match accepted {
                Ok((strm, addr)) => Connect(strm, addr),
                Err(err) => AcceptFailed(err),
            };
            if tx.send(cmd).is_err() {
                info!("disconnected ServerCommand chan");
                break;
            }
        }
    })?)
}

/// spawn a thread perform `Session.start`
fn spawn_session<S, D, M>(
    session: Session<D, M, S>,
    stop: Arc<StopSignal>,
    addr: SocketAddr,
    strm: S,
) -> Result<SessionHandle, Error>
where
    S: ByteStream + 'static,
    D: Connector + 'static,
    M: AuthService + 'static,
{
    let name = format!("session-{:016x}", session.id.0);
    let handle = spawn_thread(name, move || session.start(addr, strm))?;
    Ok(SessionHandle::new(addr, handle, stop))
}

impl Server<TcpStream, TcpBinder, TcpConnector> {
    pub fn new(config: ServerConfig) -> (Self, Sender<ServerCommand<TcpStream>>) {
        let (tx_done, rx_done) = mpsc::channel();
        let mut connector = TcpConnector::new(config.server_rw_timeout);
        connector.set_connect_timeout(config.connect_timeout);
        Server::<TcpStream, TcpBinder, TcpConnector>::with_binder(
            config.clone(),
            TcpBinder::new(
                config.client_rw_timeout,
                Arc::new(Mutex::new(rx_done)),
                config.accept_timeout,
            ),
            tx_done,
            connector,
        )
    }
}

impl<S, T, C> Server<S, T, C>
where
    S: ByteStream + 'static,
    T: Binder<Stream = S>,
    C: Connector + 'static,
{
    pub fn with_binder(
        config: ServerConfig,
        binder: T,
        tx_acceptor_done: Sender<()>,
        connector: C,
    ) -> (Self, Sender<ServerCommand<S>>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                config,
                tx_cmd: tx.clone(),
                rx_cmd: rx,
                binder,
                tx_acceptor_done,
                connector: Arc::new(connector),
                protocol_version: DEFAULT_PROTOCOL_VERSION,
                session: HashMap::new(),
                id_rng: StdRng::from_entropy(),
            },
            tx,
        )
    }

    fn next_session_id(&mut self) -> SessionId {
        loop {
            let next_candidate = self.id_rng.next_u64().into();
            if self.session.contains_key(&next_candidate) {
                continue;
            }
            debug!("next session id is issued: {}", next_candidate);
            return next_candidate;
        }
    }

    /// Stop the acceptor and every running session, then wait for them.
    fn shutdown(&mut self, accept_th: thread::JoinHandle<()>) {
        trace!("stopping accept thread...");
        self.tx_acceptor_done.send(()).ok();
        trace!("stopping session threads...");
        self.session.values().for_each(SessionHandle::stop);
        self.session.drain().for_each(|(id, ss)| {
            if ss.join().is_err() {
                error!("session panic: {}", id);
            }
        });
        trace!("session threads are stopped");
        accept_th.join().ok();
        trace!("accept thread is stopped");
    }

    fn connect(&mut self, strm: S, addr: SocketAddr) -> Result<(), Error> {
        let (session, stop) = Session::new(
            self.next_session_id(),
            self.protocol_version,
            self.connector.clone(),
            NoAuthService::new(),
            self.tx_cmd.clone(),
        );
        let id = session.id;
        let handle = spawn_session(session, stop, addr, strm)?;
        self.session.insert(id, handle);
        Ok(())
    }

    fn disconnect(&mut self, id: SessionId) {
        if let Some(session) = self.session.remove(&id) {
            debug!("stopping session: {}: {}", id, session.client_addr());
            match session.join() {
                Ok(Ok(())) => info!("session is stopped: {}", id),
                Ok(Err(err)) => {
                    error!("session error: {}: {}", id, err);
                    trace!("session error: {}: {:?}", id, err);
                }
                Err(err) => error!("session panic: {}: {:?}", id, err),
            }
        } else {
            error!("session not found: {}", id);
        }
    }

    /// Accept connections and run a session for each until `Terminate`.
    ///
    /// A failure of the listening socket shuts the server down and is returned.
    pub fn serve(&mut self) -> Result<(), Error> {
        let acceptor = self.binder.bind(self.config.server_addr())?;
        let accept_th = spawn_acceptor(acceptor, self.tx_cmd.clone())?;

        let mut result = Ok(());
        while let Ok(cmd) = self.rx_cmd.recv() {
            use ServerCommand::*;
            info!("cmd: {:?}", cmd);
            match cmd {
                Terminate => break,
                Connect(stream, addr) => {
                    if let Err(err) = self.connect(stream, addr) {
                        error!("session could not be started: {}: {}", addr, err);
                    }
                }
                Disconnect(id) => self.disconnect(id),
                AcceptFailed(err) => {
                    error!("accept failed: {}", err);
                    result = Err(err.into());
                    break;
                }
            }
        }
        self.shutdown(accept_th);
        info!("server shutdown");
        result
    }
}
