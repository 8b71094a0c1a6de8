//! Client-server communication protocol.
//!
//! This module defines how currency lookups travel between a client and the currency server:
//! the message shapes, how they are framed inside a byte stream, and the connection lifecycle
//! on both ends.
//!
//! # Overview
//!
//! A client sends one [`Request`] at a time and reads back exactly one [`Response`]. There is
//! no handshake, version field or length prefix. Each message is compact JSON, and the stream
//! is split into messages by [`FrameReader`], which looks for the byte closing the outermost
//! JSON value.
//!
//! ```text
//! client                                   server
//!   {"Get":"USD"}                  ──────▶
//!                                  ◀──────  [{"code":"USD","name":"US Dollar",...}]
//!   {"Get":123}                    ──────▶
//!                                  ◀──────  {"message":"failed to decode request: ..."}
//! ```
//!
//! A request that cannot be decoded is answered with an error object and the connection stays
//! open. Only I/O failures (or the peer going away) end a session.
//!
//! # Key Components
//!
//! - [`FrameReader`]: reassembles whole messages from arbitrarily sized reads.
//! - [`codec`]: JSON encoding of requests and responses.
//! - [`ProtocolTransport`]: framing plus encoding over any `Read + Write` stream.
//! - [`CurrencyServer`]: accept loop spawning one command loop thread per connection.
//! - [`Dialer`] and [`Client`]: outbound connections with bounded retry, and the client session.
//! - [`Connection`]: plaintext or TLS byte stream; nothing above it cares which.
//!
//! # See Also
//!
//! - [`dataset`](crate::dataset): the records every lookup is answered from.
mod client;
pub mod codec;
mod connection;
mod endpoint;
pub mod frame;
mod listener;
mod request;
mod response;
mod server;
mod tls;
mod transport;

pub use client::{
    Client, Connect, DialError, Dialer, DialerConfig, SocketConnector, is_temporary,
};
pub use connection::{Connection, Stream};
pub use endpoint::{Endpoint, Network, Side, UnsupportedNetwork};
pub use frame::{FrameError, FrameReader};
pub use listener::{Listener, ListenerError};
pub use request::Request;
pub use response::{ErrorObject, Response};
pub use server::{CurrencyServer, ServerConfig};
pub use tls::{ClientTlsConfig, ServerTlsConfig, TlsError};
pub use transport::{ProtocolTransport, TransportError};
