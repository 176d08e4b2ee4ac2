//! Local address discovery for the `/api/ip` self-identification route.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use log::{debug, warn};

/// Public resolver used only to pick the outbound interface; nothing is sent.
const PROBE_TARGET: (Ipv4Addr, u16) = (Ipv4Addr::new(8, 8, 8, 8), 80);

/// IPv4 address of the interface used for outbound traffic, or `0.0.0.0`
/// when there is no usable non-loopback address.
#[must_use]
pub fn local_ipv4() -> Ipv4Addr {
    let probe = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).and_then(|socket| {
        socket.connect(PROBE_TARGET)?;
        socket.local_addr()
    });

    match probe {
        Ok(SocketAddr::V4(address)) if usable(*address.ip()) => {
            debug!("Discovered local address {}", address.ip());
            *address.ip()
        }
        Ok(address) => {
            warn!("Outbound interface has no usable IPv4 address ({address})");
            Ipv4Addr::UNSPECIFIED
        }
        Err(err) => {
            warn!("Failed to discover local address: {err}");
            Ipv4Addr::UNSPECIFIED
        }
    }
}

fn usable(address: Ipv4Addr) -> bool {
    !address.is_loopback() && !address.is_unspecified()
}
