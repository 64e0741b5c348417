//! Multicast UDP socket setup

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use crate::config::NetworkConfig;
use crate::error::NetworkError;

fn setup<T>(op: &'static str, result: std::io::Result<T>) -> Result<T, NetworkError> {
    result.map_err(|source| NetworkError::Setup { op, source })
}

/// Multicast group address packets are sent to
pub fn group_addr(config: &NetworkConfig) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(config.multicast_addr, config.port))
}

/// Socket for sending to the multicast group
pub fn create_sender_socket(config: &NetworkConfig) -> Result<UdpSocket, NetworkError> {
    let socket = setup("socket", Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)))?;
    setup("set_multicast_if_v4", socket.set_multicast_if_v4(&config.interface))?;
    setup("set_multicast_ttl_v4", socket.set_multicast_ttl_v4(config.ttl))?;
    setup("set_multicast_loop_v4", socket.set_multicast_loop_v4(config.loopback))?;

    let local = SockAddr::from(SocketAddrV4::new(config.interface, 0));
    setup("bind", socket.bind(&local))?;

    tracing::debug!(
        "Sender socket ready: group {}:{}, ttl {}, loopback {}",
        config.multicast_addr,
        config.port,
        config.ttl,
        config.loopback
    );
    Ok(socket.into())
}

/// Socket bound to the stream port and joined to the multicast group
pub fn create_receiver_socket(config: &NetworkConfig) -> Result<UdpSocket, NetworkError> {
    let socket = setup("socket", Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)))?;
    setup("set_reuse_address", socket.set_reuse_address(true))?;
    #[cfg(unix)]
    setup("set_reuse_port", socket.set_reuse_port(true))?;

    let local = SockAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port));
    setup("bind", socket.bind(&local))?;
    setup(
        "join_multicast_v4",
        socket.join_multicast_v4(&config.multicast_addr, &config.interface),
    )?;

    tracing::debug!(
        "Receiver joined {}:{} on interface {}",
        config.multicast_addr,
        config.port,
        config.interface
    );
    Ok(socket.into())
}
