use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};

use anyhow::{anyhow, Result};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::unix::{self, UCred};
use tonic::transport::server::Connected;

/// Where the coordinator listens and workers dial.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(SocketAddr),
}

/// coordinator_sock cooks up a unique-ish UNIX-domain socket name
/// in /var/tmp, for the coordinator.
pub fn coordinator_sock() -> PathBuf {
    let uid = nix::unistd::getuid();
    PathBuf::from(format!("/var/tmp/824-mr-{}", uid))
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Unix(coordinator_sock())
    }
}

impl FromStr for Endpoint {
    type Err = anyhow::Error;

    /// Accepts `unix:<path>` or a socket address such as `127.0.0.1:8080`.
    fn from_str(s: &str) -> Result<Self> {
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(anyhow!("empty unix socket path"));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }
        s.parse()
            .map(Endpoint::Tcp)
            .map_err(|e| anyhow!("invalid endpoint `{}`: {}", s, e))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "{}", addr),
        }
    }
}

/// A Unix socket connection tonic can serve. Adapted from tonic's `uds`
/// example: tonic only knows how to serve TCP connections by itself.
#[derive(Debug)]
pub struct UdsStream(pub tokio::net::UnixStream);

#[derive(Clone, Debug)]
pub struct UdsConnectInfo {
    pub peer_addr: Option<Arc<unix::SocketAddr>>,
    pub peer_cred: Option<UCred>,
}

impl Connected for UdsStream {
    type ConnectInfo = UdsConnectInfo;

    fn connect_info(&self) -> Self::ConnectInfo {
        UdsConnectInfo {
            peer_addr: self.0.peer_addr().ok().map(Arc::new),
            peer_cred: self.0.peer_cred().ok(),
        }
    }
}

impl AsyncRead for UdsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for UdsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}
