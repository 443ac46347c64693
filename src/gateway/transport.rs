// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Stream listeners for the newline-delimited transport.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

#[cfg(unix)]
use tokio::net::UnixListener;

pub trait RelayIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> RelayIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type RelayStream = Box<dyn RelayIo>;

/// Where a stream listener binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(SocketAddr),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl Endpoint {
    /// `unix:/path` or a bare path containing `/` selects a Unix socket; anything else is `host:port`.
    pub fn parse(value: &str) -> io::Result<Self> {
        #[cfg(unix)]
        {
            if let Some(path) = value.strip_prefix("unix:") {
                return Ok(Endpoint::Unix(PathBuf::from(path)));
            }
            if value.contains('/') {
                return Ok(Endpoint::Unix(PathBuf::from(value)));
            }
        }
        value.parse::<SocketAddr>()
            .map(Endpoint::Tcp)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{}: {}", value, e)))
    }

    pub fn transport_name(&self) -> &'static str {
        match self {
            Endpoint::Tcp(_) => "tcp",
            #[cfg(unix)]
            Endpoint::Unix(_) => "unix",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "{}", addr),
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

pub enum RelayListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener, PathBuf),
}

pub async fn bind(endpoint: &Endpoint) -> io::Result<RelayListener> {
    match endpoint {
        Endpoint::Tcp(addr) => Ok(RelayListener::Tcp(TcpListener::bind(addr).await?)),
        #[cfg(unix)]
        Endpoint::Unix(path) => {
            // A stale socket file from a previous run blocks bind.
            if path.exists() {
                let _ = std::fs::remove_file(path);
            }
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let inner = UnixListener::bind(path)?;
            Ok(RelayListener::Unix(inner, path.clone()))
        }
    }
}

impl RelayListener {
    pub async fn accept(&self) -> io::Result<RelayStream> {
        match self {
            RelayListener::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                tracing::trace!(%addr, "Accepted tcp connection");
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            RelayListener::Unix(listener, _) => {
                let (stream, _addr) = listener.accept().await?;
                Ok(Box::new(stream))
            }
        }
    }

    /// Actual bound endpoint; resolves port 0 for TCP.
    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        match self {
            RelayListener::Tcp(listener) => Ok(Endpoint::Tcp(listener.local_addr()?)),
            #[cfg(unix)]
            RelayListener::Unix(_, path) => Ok(Endpoint::Unix(path.clone())),
        }
    }
}

/// Remove a Unix socket file left behind by a listener. No-op for TCP.
pub fn cleanup(endpoint: &Endpoint) -> io::Result<()> {
    match endpoint {
        Endpoint::Tcp(_) => Ok(()),
        #[cfg(unix)]
        Endpoint::Unix(path) => cleanup_path(path),
    }
}

#[cfg(unix)]
fn cleanup_path(path: &Path) -> io::Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}
