//! This crate provides a library for constructing [SOCKS5](https://www.rfc-editor.org/rfc/rfc1928) proxy server.
//!
//! # Feature
//! ## Authentication
//!
//! Any authentication method is not supported.
//!
//! The client connects to the server is required for sending `X'00'` (`NO AUTHENTICATION REQUIRED`) as a method selection message.
//!
//! ## Command
//!
//! Only `CONNECT` command is supported.
//! `BIND` and `UDP ASSOCIATE` are answered with `X'07'` (`Command not supported`).
//!
//! ## Backend
//!
//! Outbound connections are made by a [`Connector`](connector::Connector).
//! The default one, [`TcpConnector`](connector::TcpConnector), dials through the network stack of the host.
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! socks5 = "0.1.0"
//! ```
//!
//! ## Server
//!
//! Here is a minimum server example.
//!
//! ```rust
//! use std::{time::Duration, thread};
//! use socks5::*;
//! let mut config = ServerConfig::new("127.0.0.1".parse().unwrap(), 0);
//! config.set_accept_timeout(Some(Duration::from_millis(100)));
//! let (mut server, tx) = Server::new(config);
//! let th = thread::spawn(move || server.serve());
//! thread::sleep(Duration::from_millis(300));
//! tx.send(ServerCommand::Terminate).unwrap();
//! th.join().unwrap().unwrap();
//! ```
//!
//! The daemon `socks5d` is built with the `build-binary` feature (enabled by default).

pub mod acceptor;
pub mod auth_service;
pub mod byte_stream;
pub mod config;
pub mod connector;
pub mod error;
pub mod model;
mod raw_message;
mod relay;
mod rw_socks_stream;
pub mod server;
pub mod server_command;
pub mod session;
mod tcp_listener_ext;
mod thread;

pub use config::*;
pub use model::model::*;
pub use rw_socks_stream::ReadWriteStream;
pub use server::*;
pub use server_command::*;
