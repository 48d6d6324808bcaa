use std::net::{IpAddr, Ipv4Addr};

use dns_lookup::lookup_host;
use log::debug;

use crate::error::TraceError;

/// Turns a destination name into the IPv4 address that gets probed.
pub trait Resolver {
    fn resolve(&self, target: &str) -> Result<Ipv4Addr, TraceError>;
}

/// Resolver backed by the system's `getaddrinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DnsResolver;

impl Resolver for DnsResolver {
    fn resolve(&self, target: &str) -> Result<Ipv4Addr, TraceError> {
        // literal addresses skip the lookup
        if let Ok(ip) = target.parse::<Ipv4Addr>() {
            return Ok(ip);
        }

        let ips = lookup_host(target).map_err(|source| TraceError::Resolution {
            host: target.to_owned(),
            source,
        })?;
        debug!("{} resolved to {:?}", target, ips);

        first_ipv4(&ips).ok_or_else(|| TraceError::NoIpv4Address {
            host: target.to_owned(),
        })
    }
}

fn first_ipv4(ips: &[IpAddr]) -> Option<Ipv4Addr> {
    ips.iter().find_map(|ip| match ip {
        IpAddr::V4(ipv4) => Some(*ipv4),
        IpAddr::V6(_) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn literal_address_is_returned_as_is() {
        let ip = DnsResolver.resolve("8.8.8.8").unwrap();
        assert_eq!(ip, Ipv4Addr::new(8, 8, 8, 8));
    }

    #[test]
    fn ipv6_results_are_skipped() {
        let ips = vec![
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)),
        ];
        assert_eq!(first_ipv4(&ips), Some(Ipv4Addr::new(93, 184, 216, 34)));
        assert_eq!(first_ipv4(&ips[..1]), None);
    }
}
