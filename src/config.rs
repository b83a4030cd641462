use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::error::Error;
use crate::model::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub server_ip: IpAddr,
    pub server_port: u16,
    /// read/write timeout on client connections
    pub client_rw_timeout: Option<Duration>,
    /// read/write timeout on backend connections
    pub server_rw_timeout: Option<Duration>,
    /// timeout for establishing backend connections
    pub connect_timeout: Option<Duration>,
    /// interval the acceptor checks for a termination request
    pub accept_timeout: Option<Duration>,
}

/// Timeouts in milliseconds as written in a config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    client_rw_timeout_ms: Option<u64>,
    server_rw_timeout_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    accept_timeout_ms: Option<u64>,
}

impl ServerConfig {
    pub fn new(server_ip: IpAddr, server_port: u16) -> Self {
        Self {
            server_ip,
            server_port,
            ..Self::default()
        }
    }

    /// Load timeouts from the yaml file at `path`.
    ///
    /// Fields absent from the file keep their default.
    pub fn with_file(server_ip: IpAddr, server_port: u16, path: &Path) -> Result<Self, Error> {
        let file = File::open(path)?;
        let mut config = Self::new(server_ip, server_port);
        config.load(file).map_err(Error::Config)?;
        Ok(config)
    }

    fn load(&mut self, mut rdr: impl io::Read) -> anyhow::Result<()> {
        let mut text = String::new();
        rdr.read_to_string(&mut text)
            .context("config file is not readable")?;
        let file: ConfigFile = if text.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(&text).context("malformed config file")?
        };
        let ms = |v: Option<u64>, default| v.map(Duration::from_millis).or(default);
        self.client_rw_timeout = ms(file.client_rw_timeout_ms, self.client_rw_timeout);
        self.server_rw_timeout = ms(file.server_rw_timeout_ms, self.server_rw_timeout);
        self.connect_timeout = ms(file.connect_timeout_ms, self.connect_timeout);
        self.accept_timeout = ms(file.accept_timeout_ms, self.accept_timeout);
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            server_ip: Ipv4Addr::new(0, 0, 0, 0).into(),
            server_port: 1080,
            client_rw_timeout: Some(Duration::from_millis(2000)),
            server_rw_timeout: Some(Duration::from_millis(5000)),
            connect_timeout: None,
            accept_timeout: Some(Duration::from_secs(3)),
        }
    }
}

impl ServerConfig {
    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_ip, self.server_port)
    }

    pub fn set_client_rw_timeout(&mut self, dur: Option<Duration>) -> &mut Self {
        self.client_rw_timeout = dur;
        self
    }

    pub fn set_server_rw_timeout(&mut self, dur: Option<Duration>) -> &mut Self {
        self.server_rw_timeout = dur;
        self
    }

    pub fn set_connect_timeout(&mut self, dur: Option<Duration>) -> &mut Self {
        self.connect_timeout = dur;
        self
    }

    pub fn set_accept_timeout(&mut self, dur: Option<Duration>) -> &mut Self {
        self.accept_timeout = dur;
        self
    }
}
