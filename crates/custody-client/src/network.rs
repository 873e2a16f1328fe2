//! Host network snapshot.

use std::net::IpAddr;

use custody_types::NetworkSource;

/// Non-loopback addresses of this host, in interface enumeration order.
///
/// Enumeration failures are logged and yield an empty list.
#[must_use]
pub fn local_network_sources() -> Vec<NetworkSource> {
    non_loopback_sources(interface_addresses())
}

/// Keep non-loopback addresses, preserving order.
#[must_use]
pub fn non_loopback_sources(addrs: impl IntoIterator<Item = IpAddr>) -> Vec<NetworkSource> {
    addrs
        .into_iter()
        .filter(|ip| !ip.is_loopback())
        .map(NetworkSource::from_ip)
        .collect()
}

#[cfg(unix)]
fn interface_addresses() -> Vec<IpAddr> {
    use std::net::{SocketAddrV4, SocketAddrV6};

    let ifaddrs = match nix::ifaddrs::getifaddrs() {
        Ok(ifaddrs) => ifaddrs,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to enumerate network interfaces");
            return Vec::new();
        },
    };

    ifaddrs
        .filter_map(|ifaddr| {
            let address = ifaddr.address?;
            if let Some(sin) = address.as_sockaddr_in() {
                Some(IpAddr::V4(*SocketAddrV4::from(*sin).ip()))
            } else {
                address
                    .as_sockaddr_in6()
                    .map(|sin6| IpAddr::V6(*SocketAddrV6::from(*sin6).ip()))
            }
        })
        .collect()
}

#[cfg(not(unix))]
fn interface_addresses() -> Vec<IpAddr> {
    tracing::debug!("Network interface enumeration unsupported on this platform");
    Vec::new()
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use custody_types::AddressFamily;

    use super::*;

    #[test]
    fn test_loopback_filtered_and_order_kept() {
        let addrs = [
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0x1a)),
            IpAddr::V4(Ipv4Addr::new(10, 1, 0, 3)),
        ];

        let sources = non_loopback_sources(addrs);
        let got: Vec<_> = sources
            .iter()
            .map(|s| (s.family, s.address.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                (AddressFamily::Ipv4, "192.168.1.20"),
                (AddressFamily::Ipv6, "fe80::1a"),
                (AddressFamily::Ipv4, "10.1.0.3"),
            ]
        );
    }

    #[test]
    fn test_snapshot_has_no_loopback() {
        let sources = local_network_sources();
        assert!(sources.iter().all(|s| s.address != "127.0.0.1" && s.address != "::1"));
    }
}
