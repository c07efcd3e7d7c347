//! Relay endpoints as `ws://` URLs.
//!
//! `host:port` without a scheme is read as `ws://host:port/`. Only plain
//! `ws` is accepted; the relay does not terminate TLS.

use anyhow::{anyhow, Context, Result};
use std::net::{SocketAddr, ToSocketAddrs};
use tungstenite::http::Uri;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: "/".to_string(),
        }
    }

    pub fn parse(addr: &str) -> Result<Self> {
        let addr = addr.trim();
        let url = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("ws://{}", addr)
        };
        let uri: Uri = url
            .parse()
            .with_context(|| format!("invalid relay address: {}", addr))?;
        match uri.scheme_str() {
            Some("ws") => {}
            Some(other) => return Err(anyhow!("unsupported relay scheme: {}", other)),
            None => return Err(anyhow!("invalid relay address: {}", addr)),
        }
        let host = uri
            .host()
            .map(|host| host.trim_start_matches('[').trim_end_matches(']'))
            .filter(|host| !host.is_empty())
            .ok_or_else(|| anyhow!("missing relay host in {}", addr))?;
        let port = uri
            .port_u16()
            .ok_or_else(|| anyhow!("missing relay port in {}", addr))?;
        let path = uri
            .path_and_query()
            .map(|path| path.as_str())
            .filter(|path| !path.is_empty())
            .unwrap_or("/");
        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// `host:port`, bracketing IPv6 hosts; what the relay binds to.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// The URL a client requests during the handshake.
    pub fn url(&self) -> String {
        format!("ws://{}{}", self.authority(), self.path)
    }

    /// Resolve to the first socket address for this host.
    pub fn resolve(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve {}", self))?
            .next()
            .ok_or_else(|| anyhow!("no address found for {}", self))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url())
    }
}
