//! Peer identities and the addresses nodes advertise.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use multiaddr::{Multiaddr, Protocol};

use crate::error::{HarnessError, Result};

/// Opaque libp2p peer identity, as printed by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap an identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identity as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a multiaddress, mapping failures to [`HarnessError::Multiaddr`].
pub fn parse_multiaddr(text: &str) -> Result<Multiaddr> {
    text.trim().parse().map_err(|e: multiaddr::Error| HarnessError::Multiaddr {
        addr: text.to_string(),
        reason: e.to_string(),
    })
}

/// The `/p2p/<id>` component of an address, if present.
pub fn peer_id_of(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|proto| match proto {
        Protocol::P2p(id) => Some(PeerId(id.to_string())),
        _ => None,
    })
}

/// `addr` with `/p2p/<peer>` appended.
pub fn with_peer_id(addr: &Multiaddr, peer: &PeerId) -> Result<Multiaddr> {
    parse_multiaddr(&format!("{addr}/p2p/{peer}"))
}

/// `addr` with every `/p2p/<id>` component removed.
pub fn without_peer_id(addr: &Multiaddr) -> Multiaddr {
    addr.iter().filter(|proto| !matches!(proto, Protocol::P2p(_))).collect()
}

/// The RPC listener address a daemon writes to its `api` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAddr {
    /// TCP listener; `host` is an IP literal or DNS name.
    Tcp {
        /// Host part.
        host: String,
        /// Port.
        port: u16,
    },
    /// Unix-domain socket at a filesystem path.
    Unix(PathBuf),
}

impl ApiAddr {
    /// Base URL for HTTP requests. Unix sockets get a placeholder host.
    pub fn base_url(&self) -> String {
        match self {
            ApiAddr::Tcp { host, port } if host.contains(':') => format!("http://[{host}]:{port}"),
            ApiAddr::Tcp { host, port } => format!("http://{host}:{port}"),
            ApiAddr::Unix(_) => "http://unix".to_string(),
        }
    }
}

impl FromStr for ApiAddr {
    type Err = HarnessError;

    fn from_str(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Some(path) = text.strip_prefix("/unix") {
            if path.len() > 1 && path.starts_with('/') {
                return Ok(ApiAddr::Unix(PathBuf::from(path)));
            }
        }

        let addr = parse_multiaddr(text)?;
        let mut host = None;
        let mut port = None;
        for proto in addr.iter() {
            match proto {
                Protocol::Ip4(ip) => host = Some(ip.to_string()),
                Protocol::Ip6(ip) => host = Some(ip.to_string()),
                Protocol::Dns(name) | Protocol::Dns4(name) | Protocol::Dns6(name) => {
                    host = Some(name.to_string())
                }
                Protocol::Tcp(p) => port = Some(p),
                _ => {}
            }
        }

        match (host, port) {
            (Some(host), Some(port)) => Ok(ApiAddr::Tcp { host, port }),
            _ => Err(HarnessError::Multiaddr {
                addr: text.to_string(),
                reason: "expected an ip/dns host with a tcp port, or a unix path".to_string(),
            }),
        }
    }
}

impl fmt::Display for ApiAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiAddr::Tcp { host, port } if host.contains(':') => write!(f, "/ip6/{host}/tcp/{port}"),
            ApiAddr::Tcp { host, port } if host.parse::<std::net::Ipv4Addr>().is_ok() => {
                write!(f, "/ip4/{host}/tcp/{port}")
            }
            ApiAddr::Tcp { host, port } => write!(f, "/dns/{host}/tcp/{port}"),
            ApiAddr::Unix(path) => write!(f, "/unix{}", path.display()),
        }
    }
}
