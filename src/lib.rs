//! A reliable, connection-oriented byte stream carried over UDP
//! datagrams: handshake, in-order delivery, cumulative and selective
//! acknowledgement, and orderly shutdown, all without the kernel's TCP
//! stack. See [`Profile`] for the tunable parameters and [`Server`]/
//! [`Client`] for the two ways to get a [`Connection`].

pub mod client;
pub mod connection;
pub mod error;
pub mod handle;
pub mod listener;
pub mod profile;
pub mod segment;
pub mod seq;
pub mod server;
pub mod stream;
pub mod timer;
pub mod transport;

pub use client::Client;
pub use connection::ConnState;
pub use error::{FailureReason, Result, RudpError};
pub use listener::{ConnectionListener, LoggingListener};
pub use profile::{Profile, ProfileBuilder};
pub use server::Server;
pub use stream::Connection;
pub use timer::{TimerHandle, TimerService, WheelTimer};
pub use transport::{DatagramTransport, UdpTransport};
