//! Upstream forwarding.
//!
//! Every query gets its own short-lived UDP socket. The socket is marked
//! or bound to a physical interface when configured so that the
//! forwarded query is routed around the tunnel instead of back into it.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

use crate::config::UpstreamConfig;

/// Maximum size of a DNS reply we accept from upstream.
pub const MAX_DNS_PACKET_SIZE: usize = 4096;

/// Something that can answer a raw DNS query.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Forward the query unmodified. `None` on timeout or socket error.
    async fn forward(&self, query: &[u8]) -> Option<Vec<u8>>;
}

/// Plain DNS over UDP to a single resolver.
pub struct UdpUpstream {
    addr: SocketAddr,
    timeout: Duration,
    fwmark: Option<u32>,
    bind_interface: Option<String>,
}

impl UdpUpstream {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            addr,
            timeout,
            fwmark: None,
            bind_interface: None,
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            addr: config.address,
            timeout: config.timeout(),
            fwmark: config.fwmark,
            bind_interface: config.bind_interface.clone(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn socket(&self) -> io::Result<UdpSocket> {
        let domain = Domain::for_address(self.addr);
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        self.exclude_from_tunnel(&socket)?;

        let local = if self.addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        socket.bind(&SockAddr::from(local))?;
        socket.set_nonblocking(true)?;

        UdpSocket::from_std(socket.into())
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn exclude_from_tunnel(&self, socket: &Socket) -> io::Result<()> {
        if let Some(mark) = self.fwmark {
            socket.set_mark(mark)?;
        }
        if let Some(interface) = &self.bind_interface {
            socket.bind_device(Some(interface.as_bytes()))?;
        }
        Ok(())
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn exclude_from_tunnel(&self, _socket: &Socket) -> io::Result<()> {
        if self.fwmark.is_some() || self.bind_interface.is_some() {
            tracing::warn!("Tunnel exclusion is not supported on this platform");
        }
        Ok(())
    }

    async fn exchange(&self, query: &[u8]) -> io::Result<Vec<u8>> {
        let socket = self.socket()?;
        socket.connect(self.addr).await?;
        socket.send(query).await?;

        let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];
        let len = timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "upstream timeout"))??;
        buf.truncate(len);
        Ok(buf)
    }
}

#[async_trait]
impl Upstream for UdpUpstream {
    async fn forward(&self, query: &[u8]) -> Option<Vec<u8>> {
        match self.exchange(query).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                debug!("Upstream {} failed: {}", self.addr, e);
                None
            }
        }
    }
}
