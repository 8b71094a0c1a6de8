use std::{
    io,
    net::TcpListener,
    path::PathBuf,
    sync::Arc,
};

#[cfg(unix)]
use std::os::unix::{
    fs::FileTypeExt,
    net::{UnixListener, UnixStream},
};

use log::{debug, warn};
use rustls::{ServerConfig, ServerConnection, StreamOwned};
use thiserror::Error;

use super::{
    Connection, Endpoint, Network, Side,
    connection::Stream,
    tls::TlsError,
};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("{0} sockets are not supported on this platform")]
    Unsupported(Network),
    #[error(transparent)]
    Tls(#[from] TlsError),
}

enum Socket {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: UnixListener,
        path: PathBuf,
    },
}

/// Bound listening socket handing out [`Connection`]s.
///
/// With a TLS config every accepted socket is wrapped in a server session. The handshake is
/// left to the first read or write, which happens on the connection's own thread.
pub struct Listener {
    socket: Socket,
    tls: Option<Arc<ServerConfig>>,
}

impl Listener {
    pub fn bind(endpoint: &Endpoint, tls: Option<Arc<ServerConfig>>) -> Result<Self, ListenerError> {
        let bind_err = |source| ListenerError::Bind {
            endpoint: endpoint.to_string(),
            source,
        };

        let socket = match endpoint.network {
            Network::Unix => bind_unix(endpoint).map_err(bind_err)?,
            _ => {
                let addrs = endpoint.socket_addrs(Side::Listen).map_err(bind_err)?;
                Socket::Tcp(TcpListener::bind(&addrs[..]).map_err(bind_err)?)
            }
        };

        Ok(Self { socket, tls })
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// The endpoint actually bound, with any port 0 resolved.
    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        match &self.socket {
            Socket::Tcp(listener) => {
                let addr = listener.local_addr()?;
                let network = if addr.is_ipv4() {
                    Network::Tcp4
                } else {
                    Network::Tcp6
                };
                Ok(Endpoint::new(network, addr.to_string()))
            }
            #[cfg(unix)]
            Socket::Unix { path, .. } => {
                Ok(Endpoint::new(Network::Unix, path.display().to_string()))
            }
        }
    }

    pub fn accept(&self) -> io::Result<Connection> {
        let stream = match &self.socket {
            Socket::Tcp(listener) => {
                let (stream, _) = listener.accept()?;
                stream.set_nodelay(true)?;
                Stream::Tcp(stream)
            }
            #[cfg(unix)]
            Socket::Unix { listener, .. } => {
                let (stream, _) = listener.accept()?;
                Stream::Unix(stream)
            }
        };

        match &self.tls {
            None => Ok(Connection::Plain(stream)),
            Some(config) => {
                let session = ServerConnection::new(Arc::clone(config)).map_err(io::Error::other)?;
                Ok(Connection::TlsServer(Box::new(StreamOwned::new(session, stream))))
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Socket::Unix { path, .. } = &self.socket {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("failed to remove socket file {}: {e}", path.display());
            }
        }
    }
}

#[cfg(unix)]
fn bind_unix(endpoint: &Endpoint) -> io::Result<Socket> {
    let path = endpoint.path().to_path_buf();

    // A socket file left behind by a previous run blocks the bind. One that still accepts
    // connections belongs to a live server and is left alone.
    if let Ok(meta) = std::fs::symlink_metadata(&path) {
        if meta.file_type().is_socket() {
            if UnixStream::connect(&path).is_ok() {
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("{} is in use by a running server", path.display()),
                ));
            }
            debug!("removing stale socket file {}", path.display());
            std::fs::remove_file(&path)?;
        }
    }

    let listener = UnixListener::bind(&path)?;
    Ok(Socket::Unix { listener, path })
}

#[cfg(not(unix))]
fn bind_unix(_endpoint: &Endpoint) -> io::Result<Socket> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        ListenerError::Unsupported(Network::Unix).to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use std::net::TcpStream;

    use tempdir::TempDir;

    use super::*;

    #[test]
    fn bind_ephemeral_tcp_port() {
        let listener = Listener::bind(&Endpoint::new(Network::Tcp, "127.0.0.1:0"), None).unwrap();
        let endpoint = listener.local_endpoint().unwrap();

        assert_eq!(endpoint.network, Network::Tcp4);
        assert!(!endpoint.address.ends_with(":0"));
        assert!(!listener.is_tls());
    }

    #[test]
    fn accept_tcp_connection() {
        let listener = Listener::bind(&Endpoint::new(Network::Tcp, "127.0.0.1:0"), None).unwrap();
        let addr = listener.local_endpoint().unwrap().address;

        let _client = TcpStream::connect(&addr).unwrap();
        let conn = listener.accept().unwrap();
        assert!(!conn.is_tls());
        assert!(conn.peer().starts_with("127.0.0.1:"));
    }

    #[test]
    fn bind_occupied_port_fails() {
        let first = Listener::bind(&Endpoint::new(Network::Tcp, "127.0.0.1:0"), None).unwrap();
        let taken = first.local_endpoint().unwrap();

        let err = Listener::bind(&taken, None).err().unwrap();
        assert!(matches!(err, ListenerError::Bind { .. }));
    }

    #[test]
    fn unix_socket_lifecycle() {
        let temp = TempDir::new("listener").unwrap();
        let path = temp.path().join("coin.sock");
        let endpoint = Endpoint::new(Network::Unix, path.display().to_string());

        let listener = Listener::bind(&endpoint, None).unwrap();
        assert_eq!(listener.local_endpoint().unwrap(), endpoint);

        let _client = UnixStream::connect(&path).unwrap();
        let conn = listener.accept().unwrap();
        assert!(conn.peer().starts_with("unix:"));

        drop(listener);
        assert!(!path.exists());
    }

    #[test]
    fn stale_unix_socket_is_replaced() {
        let temp = TempDir::new("listener").unwrap();
        let path = temp.path().join("coin.sock");
        let endpoint = Endpoint::new(Network::Unix, path.display().to_string());

        // Closing the listener leaves its socket file behind with nothing accepting on it.
        drop(UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        assert!(Listener::bind(&endpoint, None).is_ok());
    }

    #[test]
    fn live_unix_socket_is_not_taken_over() {
        let temp = TempDir::new("listener").unwrap();
        let path = temp.path().join("coin.sock");
        let endpoint = Endpoint::new(Network::Unix, path.display().to_string());

        let first = Listener::bind(&endpoint, None).unwrap();
        match Listener::bind(&endpoint, None) {
            Err(ListenerError::Bind { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::AddrInUse)
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("second bind on a live socket succeeded"),
        }

        assert!(path.exists());
        let _client = UnixStream::connect(&path).unwrap();
        assert!(first.accept().is_ok());
    }
}
