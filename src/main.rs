//! A SOCKS5 proxy server implemented in Rust
//!
//! socks5d is an SOCKS5 proxy built on socks5 crate.
//!
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::*;

use socks5 as s5;

#[derive(Parser, Debug)]
#[command(name = "socks5d", version, about)]
struct Opt {
    /// Set port to listen on
    #[arg(short = 'p', long = "port", default_value = "1080")]
    port: u16,

    /// Set ipaddress to listen on
    #[arg(short = 'i', long = "ip", default_value = "0.0.0.0")]
    ipaddr: IpAddr,

    /// Set path to config file (format: yaml)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

fn set_handler(signals: &[i32], handler: impl Fn(i32) + Send + 'static) -> io::Result<()> {
    let mut signals = signal_hook::iterator::Signals::new(signals)?;
    std::thread::spawn(move || signals.forever().for_each(handler));
    Ok(())
}

fn main() -> anyhow::Result<()> {
    use signal_hook::consts::signal::*;
    env_logger::init();

    let opt = Opt::parse();
    debug!("option: {:?}", opt);

    let config = match opt.config {
        Some(ref path) => s5::ServerConfig::with_file(opt.ipaddr, opt.port, path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => s5::ServerConfig::new(opt.ipaddr, opt.port),
    };
    info!("config: {:?}", config);

    let (mut server, tx) = s5::Server::new(config);
    set_handler(&[SIGTERM, SIGINT, SIGQUIT], move |signal| {
        info!("signal: {}", signal);
        tx.send(s5::ServerCommand::Terminate).ok();
    })
    .context("setting signal handler")?;

    server.serve().context("server error")?;
    Ok(())
}
