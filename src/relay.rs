use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::*;

use crate::byte_stream::{ByteStream, ReadHalf, WriteHalf};
use crate::model::Error;
use crate::thread::spawn_thread;

const BUFFER_SIZE: usize = 8 * 1024;

#[derive(Debug)]
pub struct RelayHandle {
    /// handle to relay: client -> backend
    outbound_th: JoinHandle<Result<u64, Error>>,
    /// handle to relay: client <- backend
    incoming_th: JoinHandle<Result<u64, Error>>,
}

/// Outcome of each direction, in bytes relayed.
#[derive(Debug)]
pub struct RelayResult {
    pub outbound: Result<u64, Error>,
    pub incoming: Result<u64, Error>,
}

impl RelayHandle {
    /// Wait until both directions are finished.
    pub fn join(self) -> thread::Result<RelayResult> {
        let outbound = self.outbound_th.join();
        let incoming = self.incoming_th.join();
        Ok(RelayResult {
            outbound: outbound?,
            incoming: incoming?,
        })
    }
}

/// Spawn relay threads
///
/// * `client_addr`
///    Label of the client side of this session.
/// * `server_addr`
///    Label of the backend side of this session.
/// * `client_conn`
///    Connection between client and this proxy.
/// * `server_conn`
///    Connection between backend and this proxy.
/// * `stop`
///    Termination request. Observed whenever a read returns or times out.
///
/// A direction ends at end-of-stream or on its first error, then half-closes
/// its destination. Neither direction is cut short by the other one ending.
pub fn spawn_relay(
    client_addr: String,
    server_addr: String,
    client_conn: &impl ByteStream,
    server_conn: &impl ByteStream,
    stop: Arc<AtomicBool>,
) -> Result<RelayHandle, Error> {
    let (read_client, write_client) = client_conn.split()?;
    let (read_server, write_server) = server_conn.split()?;

    let outbound_th = {
        let stop = stop.clone();
        let client_addr = client_addr.clone();
        let server_addr = server_addr.clone();
        spawn_thread("outbound", move || {
            relay_half(&stop, &client_addr, &server_addr, read_client, write_server)
        })?
    };
    let incoming_th = spawn_thread("incoming", move || {
        relay_half(&stop, &server_addr, &client_addr, read_server, write_client)
    })?;
    Ok(RelayHandle {
        outbound_th,
        incoming_th,
    })
}

fn relay_half(
    stop: &AtomicBool,
    src_addr: &str,
    dst_addr: &str,
    mut src: ReadHalf,
    mut dst: WriteHalf,
) -> Result<u64, Error> {
    let name = thread::current().name().unwrap_or("<anonymous>").to_owned();
    info!("spawned relay: {}: {} ==> {}", name, src_addr, dst_addr);

    let result = copy(stop, &mut src, &mut dst);
    if let Err(err) = dst.close_write() {
        trace!("close_write: {}: {}: {}", name, dst_addr, err);
    }
    match &result {
        Ok(size) => info!(
            "relay thread has been finished: {}: {} ==> {}: {} bytes",
            name, src_addr, dst_addr, size
        ),
        Err(err) => info!(
            "relay thread has been aborted: {}: {} ==> {}: {}",
            name, src_addr, dst_addr, err
        ),
    }
    result
}

/// Timeouts on either side only give a chance to look at `stop`.
fn is_tick(err: &io::Error) -> bool {
    use io::ErrorKind as K;
    matches!(err.kind(), K::WouldBlock | K::TimedOut | K::Interrupted)
}

fn copy(stop: &AtomicBool, src: &mut ReadHalf, dst: &mut WriteHalf) -> Result<u64, Error> {
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        if stop.load(Ordering::Relaxed) {
            info!("relay thread is requested termination");
            return Ok(total);
        }
        match src.read(&mut buf) {
            Ok(0) => {
                dst.flush()?;
                return Ok(total);
            }
            Ok(size) => {
                let written = write_all_ticking(stop, dst, &buf[..size])?;
                total += written as u64;
                trace!("relayed {} bytes", written);
            }
            // read timeout: only a chance to look at `stop`
            Err(err) if is_tick(&err) => {}
            Err(err) => return Err(err.into()),
        }
    }
}

/// Write the whole of `buf` unless termination is requested in between.
///
/// Returns the number of bytes written, which falls short of `buf.len()` only
/// when stopped.
fn write_all_ticking(
    stop: &AtomicBool,
    dst: &mut WriteHalf,
    buf: &[u8],
) -> Result<usize, Error> {
    let mut offset = 0;
    while offset < buf.len() {
        match dst.write(&buf[offset..]) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
            Ok(n) => offset += n,
            Err(err) if is_tick(&err) => {
                if stop.load(Ordering::Relaxed) {
                    info!("relay thread is requested termination while writing");
                    break;
                }
                trace!("write stalled: {} bytes pending", buf.len() - offset);
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(offset)
}
