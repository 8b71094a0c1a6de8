//! Outbound connections and the client side of a session.
//!
//! [`Dialer`] owns the retry policy: each failed attempt is classified with [`is_temporary`];
//! temporary failures are retried after a delay until `max_attempts` is reached, anything else
//! fails immediately. The actual connect step sits behind [`Connect`], implemented for real
//! sockets by [`SocketConnector`].
use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpStream},
    sync::Arc,
    thread,
    time::Duration,
};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use log::{debug, info, warn};
use rustls::{ClientConfig, ClientConnection, StreamOwned, pki_types::ServerName};
use socket2::{SockRef, TcpKeepalive};
use thiserror::Error;

use super::{
    Connection, Endpoint, Network, ProtocolTransport, Request, Response, Side,
    connection::Stream,
    tls::{self, ClientTlsConfig, TlsError},
    transport::TransportError,
};

#[derive(Debug, Error)]
pub enum DialError {
    #[error("giving up after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: io::Error,
    },
    #[error("unable to recover: {source}")]
    Permanent {
        attempts: u32,
        #[source]
        source: io::Error,
    },
}

impl DialError {
    pub fn attempts(&self) -> u32 {
        match self {
            DialError::Exhausted { attempts, .. } | DialError::Permanent { attempts, .. } => {
                *attempts
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialerConfig {
    pub connect_timeout: Duration,
    pub keep_alive: Option<Duration>,
    /// Total connection attempts, including the first.
    pub max_attempts: u32,
    pub retry_interval: Duration,
    /// Multiplier applied to the delay after every retry; 1 keeps it fixed.
    pub backoff: u32,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(300),
            keep_alive: Some(Duration::from_secs(300)),
            max_attempts: 3,
            retry_interval: Duration::from_secs(1),
            backoff: 1,
        }
    }
}

/// A single connection attempt.
pub trait Connect {
    type Stream;

    fn connect(&mut self) -> io::Result<Self::Stream>;
}

/// Whether a failed attempt is worth repeating.
pub fn is_temporary(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

pub struct Dialer {
    config: DialerConfig,
}

impl Dialer {
    pub fn new(config: DialerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DialerConfig {
        &self.config
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.config.backoff.max(1).saturating_pow(retry);
        self.config.retry_interval.saturating_mul(factor)
    }

    /// Connects, retrying temporary failures. At most one stream is ever returned; failed
    /// attempts leave nothing behind.
    pub fn dial<C: Connect>(&self, connector: &mut C) -> Result<C::Stream, DialError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("connection attempt {attempt}/{max_attempts}");

            let err = match connector.connect() {
                Ok(stream) => return Ok(stream),
                Err(e) => e,
            };
            warn!("failed to create socket: {err}");

            if !is_temporary(&err) {
                return Err(DialError::Permanent {
                    attempts: attempt,
                    source: err,
                });
            }
            if attempt >= max_attempts {
                return Err(DialError::Exhausted {
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = self.delay_for(attempt - 1);
            info!("trying again in {delay:?}");
            thread::sleep(delay);
        }
    }
}

/// Connects to an [`Endpoint`] over TCP or a unix socket, optionally wrapping the result in TLS.
pub struct SocketConnector {
    endpoint: Endpoint,
    connect_timeout: Duration,
    keep_alive: Option<Duration>,
    tls: Option<(Arc<ClientConfig>, ServerName<'static>)>,
}

impl SocketConnector {
    pub fn new(endpoint: Endpoint, config: &DialerConfig) -> Self {
        Self {
            endpoint,
            connect_timeout: config.connect_timeout,
            keep_alive: config.keep_alive,
            tls: None,
        }
    }

    pub fn with_tls(mut self, config: &ClientTlsConfig) -> Result<Self, TlsError> {
        let name = config
            .server_name
            .as_deref()
            .unwrap_or_else(|| self.endpoint.host());
        self.tls = Some((config.build()?, tls::server_name(name)?));
        Ok(self)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn connect_stream(&self) -> io::Result<Stream> {
        match self.endpoint.network {
            #[cfg(unix)]
            Network::Unix => Ok(Stream::Unix(UnixStream::connect(self.endpoint.path())?)),
            #[cfg(not(unix))]
            Network::Unix => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not supported on this platform",
            )),
            _ => {
                let addrs = self.endpoint.socket_addrs(Side::Dial)?;
                let stream = connect_tcp(&addrs, self.connect_timeout)?;
                if let Some(time) = self.keep_alive {
                    SockRef::from(&stream).set_tcp_keepalive(&TcpKeepalive::new().with_time(time))?;
                }
                stream.set_nodelay(true)?;
                Ok(Stream::Tcp(stream))
            }
        }
    }
}

impl Connect for SocketConnector {
    type Stream = Connection;

    fn connect(&mut self) -> io::Result<Connection> {
        info!("creating connection socket to {}", self.endpoint);
        let stream = self.connect_stream()?;

        let Some((config, name)) = &self.tls else {
            return Ok(Connection::Plain(stream));
        };

        let session = ClientConnection::new(Arc::clone(config), name.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut conn = Connection::TlsClient(Box::new(StreamOwned::new(session, stream)));

        // Handshake now so certificate or protocol problems count as dial failures.
        conn.handshake()?;
        Ok(conn)
    }
}

fn connect_tcp(addrs: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
    let mut last = None;
    for addr in addrs {
        let res = if timeout.is_zero() {
            TcpStream::connect(addr)
        } else {
            TcpStream::connect_timeout(addr, timeout)
        };

        match res {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("connect to {addr} failed: {e}");
                last = Some(e);
            }
        }
    }

    Err(last.unwrap_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no address to dial")))
}

/// Client half of a session: one request out, one response back.
pub struct Client<S: Read + Write = Connection> {
    transport: ProtocolTransport<S>,
}

impl Client<Connection> {
    pub fn dial<C>(dialer: &Dialer, connector: &mut C) -> Result<Self, DialError>
    where
        C: Connect<Stream = Connection>,
    {
        let conn = dialer.dial(connector)?;
        info!("connected to {}", conn.peer());
        Ok(Self::new(conn))
    }

    pub fn peer(&self) -> String {
        self.transport.get_ref().peer()
    }

    pub fn close(mut self) -> io::Result<()> {
        self.transport.get_mut().close()
    }
}

impl<S: Read + Write> Client<S> {
    pub fn new(stream: S) -> Self {
        Self {
            transport: ProtocolTransport::new(stream),
        }
    }

    pub fn lookup(&mut self, selector: &str) -> Result<Response, TransportError> {
        self.transport.write_request(&Request::new(selector))?;
        self.transport.read_response()
    }

    pub fn into_inner(self) -> S {
        self.transport.into_inner()
    }
}
