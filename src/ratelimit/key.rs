//! Client identity extraction.
//!
//! The limiter buckets requests by an opaque string key. These extractors turn
//! an inbound request into that key. Deployments behind a reverse proxy should
//! use [`ForwardedFor`] with the header their proxy sets; everything else uses
//! the socket peer address.

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderName,
};
use std::net::{IpAddr, SocketAddr};

/// Derives a rate limit key from a request.
pub trait ClientKeyExtractor: Send + Sync {
    /// Returns `None` when the request carries no usable client identity.
    fn extract(&self, request: &Request) -> Option<String>;
}

/// Keys clients by the IP of the TCP peer, ignoring the source port.
#[derive(Debug, Default, Clone, Copy)]
pub struct PeerAddr;

impl ClientKeyExtractor for PeerAddr {
    fn extract(&self, request: &Request) -> Option<String> {
        peer_ip(request).map(|ip| ip.to_string())
    }
}

/// Keys clients by the first address of a trusted forwarding header, falling
/// back to the peer address when the header is absent or unparsable.
#[derive(Debug, Clone)]
pub struct ForwardedFor {
    header: HeaderName,
}

impl ForwardedFor {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl Default for ForwardedFor {
    fn default() -> Self {
        Self::new(HeaderName::from_static("x-forwarded-for"))
    }
}

impl ClientKeyExtractor for ForwardedFor {
    fn extract(&self, request: &Request) -> Option<String> {
        request
            .headers()
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(parse_remote_addr)
            .or_else(|| peer_ip(request))
            .map(|ip| ip.to_string())
    }
}

fn peer_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| canonical(addr.ip()))
}

/// Parse a transport address such as `1.2.3.4:80`, `[::1]:54321`, `::1` or
/// `1.2.3.4`, discarding any port.
pub fn parse_remote_addr(addr: &str) -> Option<IpAddr> {
    let addr = addr.trim();

    if let Ok(socket) = addr.parse::<SocketAddr>() {
        return Some(canonical(socket.ip()));
    }

    addr.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .ok()
        .map(canonical)
}

// IPv4-mapped IPv6 peers (dual-stack listeners) share a bucket with plain IPv4.
fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}
