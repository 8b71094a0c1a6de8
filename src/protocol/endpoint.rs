use std::{
    fmt, io,
    net::{SocketAddr, ToSocketAddrs},
    path::Path,
    str::FromStr,
};

use clap::ValueEnum;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported network protocol '{0}'")]
pub struct UnsupportedNetwork(pub String);

/// Transport families a listener or dialer can use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Network {
    #[default]
    Tcp,
    Tcp4,
    Tcp6,
    Unix,
}

impl FromStr for Network {
    type Err = UnsupportedNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            "unix" => Ok(Network::Unix),
            other => Err(UnsupportedNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
            Network::Unix => "unix",
        };
        f.write_str(name)
    }
}

/// Whether an address is about to be listened on or dialed; decides what an empty host means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Listen,
    Dial,
}

/// A network kind paired with a host:port address or a socket path.
///
/// Addresses with an empty host such as `:4040` are accepted. Listening binds the
/// unspecified address of the family and dialing targets `localhost`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub network: Network,
    pub address: String,
}

impl Endpoint {
    pub fn new(network: Network, address: impl Into<String>) -> Self {
        Self {
            network,
            address: address.into(),
        }
    }

    pub fn is_unix(&self) -> bool {
        self.network == Network::Unix
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.address)
    }

    /// Host part of a TCP address, used as the default TLS server name.
    pub fn host(&self) -> &str {
        if self.is_unix() {
            return "localhost";
        }

        let host = match self.address.strip_prefix('[') {
            Some(rest) => rest.split(']').next().unwrap_or_default(),
            None => self
                .address
                .rsplit_once(':')
                .map_or(self.address.as_str(), |(host, _)| host),
        };

        if host.is_empty() { "localhost" } else { host }
    }

    /// Resolves a TCP endpoint, keeping only addresses of the requested family.
    pub fn socket_addrs(&self, side: Side) -> io::Result<Vec<SocketAddr>> {
        let address = match (self.address.strip_prefix(':'), side) {
            (Some(port), Side::Listen) if self.network == Network::Tcp6 => format!("[::]:{port}"),
            (Some(port), Side::Listen) => format!("0.0.0.0:{port}"),
            (Some(port), Side::Dial) => format!("localhost:{port}"),
            (None, _) => self.address.clone(),
        };

        let addrs: Vec<SocketAddr> = address
            .to_socket_addrs()?
            .filter(|addr| match self.network {
                Network::Tcp4 => addr.is_ipv4(),
                Network::Tcp6 => addr.is_ipv6(),
                _ => true,
            })
            .collect();

        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no {} address found for '{}'", self.network, self.address),
            ));
        }
        Ok(addrs)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.network, self.address)
    }
}
