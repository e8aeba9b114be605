//! Execution environment classification.
//!
//! Both predicates here take explicit inputs so they can be evaluated without
//! a live page.

use serde::{Deserialize, Serialize};
use url::{Origin, Url};

/// Where the page is being served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Environment {
    /// Loopback host, i.e. a developer machine.
    Local,
    /// Any other host.
    Deployed,
}

impl Environment {
    pub fn is_local(self) -> bool {
        self == Environment::Local
    }
}

/// Classify a page host name.
///
/// `localhost`, the IPv6 loopback, and dotted-quad addresses in 127.0.0.0/8
/// are [`Environment::Local`]. Everything else is [`Environment::Deployed`].
///
/// Matching is exact; host names taken from a parsed URL are already
/// lowercased.
pub fn classify(hostname: &str) -> Environment {
    if hostname == "localhost"
        || hostname == "[::1]"
        || hostname == "::1"
        || is_loopback_v4(hostname)
    {
        Environment::Local
    } else {
        Environment::Deployed
    }
}

/// Four octets of one to three digits each, valued 0-255, the first being 127.
fn is_loopback_v4(host: &str) -> bool {
    let octets: Vec<&str> = host.split('.').collect();
    if octets.len() != 4 || octets[0] != "127" {
        return false;
    }
    octets.iter().all(|octet| {
        (1..=3).contains(&octet.len())
            && octet.bytes().all(|b| b.is_ascii_digit())
            && octet.parse::<u16>().map_or(false, |v| v <= 255)
    })
}

/// Capability check: service workers can only be used where the platform
/// exposes them.
pub fn is_supported(platform_has_service_workers: bool) -> bool {
    platform_has_service_workers
}

/// Whether the bundle's public URL shares the page's origin.
///
/// A worker script served from another origin (e.g. a CDN) cannot be
/// registered for this page.
pub fn same_origin(public_url: &Url, page_origin: &Origin) -> bool {
    &public_url.origin() == page_origin
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_hosts() {
        for host in ["127.0.0.1", "localhost", "127.5.0.9", "[::1]", "::1"] {
            assert_eq!(classify(host), Environment::Local, "{host}");
        }
    }

    #[test]
    fn test_deployed_hosts() {
        for host in [
            "example.com",
            "10.0.0.1",
            "",
            "localhost.example.com",
            "LOCALHOST",
            " localhost",
        ] {
            assert_eq!(classify(host), Environment::Deployed, "{host}");
        }
    }

    #[test]
    fn test_parsed_url_hosts_are_normalised() {
        let url = Url::parse("http://LocalHost:3000/").unwrap();
        assert_eq!(classify(url.host_str().unwrap()), Environment::Local);
    }

    #[test]
    fn test_loopback_edges() {
        assert!(is_loopback_v4("127.255.255.255"));
        assert!(is_loopback_v4("127.000.0.1"));
        assert!(!is_loopback_v4("127.256.0.1"));
        assert!(!is_loopback_v4("127.0.0"));
        assert!(!is_loopback_v4("127.0.0.1.5"));
        assert!(!is_loopback_v4("127.0.0.0001"));
        assert!(!is_loopback_v4("128.0.0.1"));
        assert!(!is_loopback_v4("127.a.0.1"));
    }

    #[test]
    fn test_is_supported() {
        assert!(is_supported(true));
        assert!(!is_supported(false));
    }

    #[test]
    fn test_same_origin() {
        let page = Url::parse("https://example.com/index.html").unwrap().origin();
        let local = Url::parse("https://example.com/app/").unwrap();
        let cdn = Url::parse("https://cdn.example.com/app/").unwrap();

        assert!(same_origin(&local, &page));
        assert!(!same_origin(&cdn, &page));
    }
}
