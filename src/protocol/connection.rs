use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
    time::Duration,
};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use rustls::{ClientConnection, ServerConnection, StreamOwned};

/// A connected plaintext socket.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    pub fn peer(&self) -> String {
        match self {
            Stream::Tcp(s) => s
                .peer_addr()
                .map_or_else(|_| "tcp:unknown".into(), |addr| addr.to_string()),
            #[cfg(unix)]
            Stream::Unix(s) => s
                .peer_addr()
                .ok()
                .and_then(|addr| addr.as_pathname().map(|p| p.display().to_string()))
                .map_or_else(|| "unix:unnamed".into(), |path| format!("unix:{path}")),
        }
    }

    pub fn set_timeouts(
        &self,
        read: Option<Duration>,
        write: Option<Duration>,
    ) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => {
                s.set_read_timeout(read)?;
                s.set_write_timeout(write)
            }
            #[cfg(unix)]
            Stream::Unix(s) => {
                s.set_read_timeout(read)?;
                s.set_write_timeout(write)
            }
        }
    }

    pub fn shutdown(&self) -> io::Result<()> {
        let res = match self {
            Stream::Tcp(s) => s.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Stream::Unix(s) => s.shutdown(Shutdown::Both),
        };

        match res {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            res => res,
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(s) => s.flush(),
        }
    }
}

/// A bidirectional byte stream, plaintext or TLS, owned by exactly one session.
///
/// Framing and dispatch only ever see `Read + Write`; TLS is just a different way of
/// constructing one of these.
#[derive(Debug)]
pub enum Connection {
    Plain(Stream),
    TlsServer(Box<StreamOwned<ServerConnection, Stream>>),
    TlsClient(Box<StreamOwned<ClientConnection, Stream>>),
}

impl Connection {
    pub fn stream(&self) -> &Stream {
        match self {
            Connection::Plain(s) => s,
            Connection::TlsServer(tls) => &tls.sock,
            Connection::TlsClient(tls) => &tls.sock,
        }
    }

    pub fn is_tls(&self) -> bool {
        !matches!(self, Connection::Plain(_))
    }

    pub fn peer(&self) -> String {
        let peer = self.stream().peer();
        if self.is_tls() {
            format!("{peer} (tls)")
        } else {
            peer
        }
    }

    pub fn set_timeouts(
        &self,
        read: Option<Duration>,
        write: Option<Duration>,
    ) -> io::Result<()> {
        self.stream().set_timeouts(read, write)
    }

    /// Drives a pending TLS handshake to completion. No-op for plaintext.
    pub fn handshake(&mut self) -> io::Result<()> {
        match self {
            Connection::Plain(_) => {}
            Connection::TlsServer(tls) => {
                while tls.conn.is_handshaking() {
                    tls.conn.complete_io(&mut tls.sock)?;
                }
            }
            Connection::TlsClient(tls) => {
                while tls.conn.is_handshaking() {
                    tls.conn.complete_io(&mut tls.sock)?;
                }
            }
        }
        Ok(())
    }

    /// Sends close_notify where applicable and shuts the socket down.
    pub fn close(&mut self) -> io::Result<()> {
        match self {
            Connection::Plain(_) => {}
            Connection::TlsServer(tls) => {
                tls.conn.send_close_notify();
                tls.flush()?;
            }
            Connection::TlsClient(tls) => {
                tls.conn.send_close_notify();
                tls.flush()?;
            }
        }
        self.stream().shutdown()
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Plain(s) => s.read(buf),
            Connection::TlsServer(tls) => tls.read(buf),
            Connection::TlsClient(tls) => tls.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Plain(s) => s.write(buf),
            Connection::TlsServer(tls) => tls.write(buf),
            Connection::TlsClient(tls) => tls.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Connection::Plain(s) => s.flush(),
            Connection::TlsServer(tls) => tls.flush(),
            Connection::TlsClient(tls) => tls.flush(),
        }
    }
}
