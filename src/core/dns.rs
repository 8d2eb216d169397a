use std::net::{IpAddr, Ipv4Addr};

use hickory_resolver::Resolver;

/// Blocking reverse-DNS lookups against the system resolver.
pub struct HostnameResolver {
    inner: Resolver,
}

impl HostnameResolver {
    /// `None` if the system resolver configuration cannot be read.
    pub fn new() -> Option<Self> {
        Resolver::from_system_conf().ok().map(|inner| Self { inner })
    }

    /// PTR lookup for `ip`; `None` on any failure.
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<String> {
        let response = self.inner.reverse_lookup(IpAddr::V4(ip)).ok()?;
        response
            .iter()
            .next()
            .map(|name| name.to_utf8().trim_end_matches('.').to_owned())
    }
}
