//! LAN discovery request.
//!
//! Broadcasts one `{"type":"discover"}` datagram and collects the
//! `announce` replies that arrive within the wait window.  Each host answers
//! with its computer name and WebSocket address.

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use keymote_core::protocol::discovery::DiscoveryMessage;
use tokio::net::UdpSocket;
use tokio::time::{self, Instant};
use tracing::debug;

/// A host that answered the request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DiscoveredHost {
    pub name: String,
    pub ip: String,
    pub port: u16,
}

impl DiscoveredHost {
    /// The WebSocket URL to dial.
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.ip, self.port)
    }
}

/// Broadcast address for `port` on the local network.
pub fn broadcast_target(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::BROADCAST, port))
}

/// Sends a discovery request to `target` and gathers replies for `wait`.
///
/// Duplicate announcements are collapsed; the result is sorted by name.
pub async fn discover_hosts(target: SocketAddr, wait: Duration) -> std::io::Result<Vec<DiscoveredHost>> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;
    socket
        .send_to(&DiscoveryMessage::Discover.to_datagram(), target)
        .await?;
    debug!("discovery request sent to {target}");

    let deadline = Instant::now() + wait;
    let mut hosts = BTreeSet::new();
    let mut buf = [0u8; 1024];
    loop {
        let received = match time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(result) => result?,
            Err(_) => break,
        };
        let (len, from) = received;
        match DiscoveryMessage::from_datagram(&buf[..len]) {
            Some(DiscoveryMessage::Announce { name, ip, port }) => {
                debug!("announcement from {from}: {name} at {ip}:{port}");
                hosts.insert(DiscoveredHost { name, ip, port });
            }
            _ => debug!("ignoring datagram from {from}"),
        }
    }
    Ok(hosts.into_iter().collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
