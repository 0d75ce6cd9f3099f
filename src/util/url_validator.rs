use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur while turning a string into a subscription URL.
#[derive(Error, Debug)]
pub enum UrlError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL has no authority (e.g. `mailto:` or `data:`).
    #[error("URL cannot be used as a feed address: {0}")]
    NotAddressable(String),
    /// The URL uses a scheme other than http, https or file.
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Which hosts a feed URL may point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostPolicy {
    /// Any host is accepted.
    #[default]
    AllowAll,
    /// Localhost and private network ranges are rejected.
    PublicOnly,
}

/// Produces the canonical form of a URL used as the URL index key.
///
/// `url::Url` already lowercases the scheme and host, drops default ports and
/// resolves `.`/`..` path segments. On top of that this strips a trailing
/// slash from non-root paths and removes an empty fragment, so that
/// `HTTP://Example.test:80/feed/` and `http://example.test/feed` collapse to
/// the same key.
pub fn normalize_url(url: &Url) -> Url {
    let mut url = url.clone();

    if url.fragment() == Some("") {
        url.set_fragment(None);
    }

    if url.query() == Some("") {
        url.set_query(None);
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_owned();
        if trimmed.is_empty() {
            url.set_path("/");
        } else {
            url.set_path(&trimmed);
        }
    }

    url
}

/// Parses and normalizes a feed URL, applying the given host policy.
///
/// # Errors
///
/// Returns [`UrlError`] if:
/// - The URL cannot be parsed ([`UrlError::InvalidUrl`])
/// - The URL cannot carry a feed address, e.g. `mailto:` ([`UrlError::NotAddressable`])
/// - The scheme is not `http`, `https` or `file` ([`UrlError::UnsupportedScheme`])
/// - The policy is [`HostPolicy::PublicOnly`] and the host is localhost or private
///
/// # Examples
///
/// ```
/// use feedtree::util::{parse_feed_url, HostPolicy};
///
/// let url = parse_feed_url("HTTP://Example.test:80/feed/", HostPolicy::AllowAll).unwrap();
/// assert_eq!(url.as_str(), "http://example.test/feed");
///
/// assert!(parse_feed_url("not a url", HostPolicy::AllowAll).is_err());
/// assert!(parse_feed_url("http://localhost/feed", HostPolicy::PublicOnly).is_err());
/// ```
pub fn parse_feed_url(url_str: &str, policy: HostPolicy) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim())?;

    if url.cannot_be_a_base() {
        return Err(UrlError::NotAddressable(url_str.to_owned()));
    }

    match url.scheme() {
        "http" | "https" | "file" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_owned())),
    }

    if policy == HostPolicy::PublicOnly {
        check_public_host(&url)?;
    }

    Ok(normalize_url(&url))
}

fn check_public_host(url: &Url) -> Result<(), UrlError> {
    if url.scheme() == "file" {
        return Err(UrlError::Localhost);
    }

    if let Some(host) = url.host_str() {
        if host == "localhost" {
            return Err(UrlError::Localhost);
        }

        // Strip brackets from IPv6 addresses for parsing
        let host_for_parse = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
            if ip.is_loopback() {
                return Err(UrlError::Localhost);
            }
            if is_private_ip(&ip) {
                return Err(UrlError::PrivateIp(ip.to_string()));
            }
        }
    }

    Ok(())
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_trailing_slash_collapsed() {
        assert_eq!(
            normalize_url(&parse("http://example.test/feed/")).as_str(),
            "http://example.test/feed"
        );
        assert_eq!(
            normalize_url(&parse("http://example.test/feed//")).as_str(),
            "http://example.test/feed"
        );
    }

    #[test]
    fn test_root_path_kept() {
        assert_eq!(
            normalize_url(&parse("http://example.test")).as_str(),
            "http://example.test/"
        );
        assert_eq!(
            normalize_url(&parse("http://example.test/")).as_str(),
            "http://example.test/"
        );
    }

    #[test]
    fn test_default_port_and_case_collapsed() {
        assert_eq!(
            normalize_url(&parse("HTTP://EXAMPLE.test:80/Feed")).as_str(),
            "http://example.test/Feed"
        );
        assert_eq!(
            normalize_url(&parse("https://example.test:443/feed")).as_str(),
            "https://example.test/feed"
        );
    }

    #[test]
    fn test_empty_query_and_fragment_dropped() {
        assert_eq!(
            normalize_url(&parse("http://example.test/feed?#")).as_str(),
            "http://example.test/feed"
        );
    }

    #[test]
    fn test_query_preserved() {
        assert_eq!(
            normalize_url(&parse("http://example.test/feed?format=atom")).as_str(),
            "http://example.test/feed?format=atom"
        );
    }

    #[test]
    fn test_invalid_urls_rejected() {
        assert!(matches!(
            parse_feed_url("::not a url::", HostPolicy::AllowAll),
            Err(UrlError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_feed_url("mailto:someone@example.test", HostPolicy::AllowAll),
            Err(UrlError::NotAddressable(_))
        ));
        assert!(matches!(
            parse_feed_url("ftp://example.test/feed", HostPolicy::AllowAll),
            Err(UrlError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_allow_all_accepts_local_hosts() {
        assert!(parse_feed_url("http://localhost/feed", HostPolicy::AllowAll).is_ok());
        assert!(parse_feed_url("http://192.168.1.1/feed", HostPolicy::AllowAll).is_ok());
        assert!(parse_feed_url("file:///home/user/feed.xml", HostPolicy::AllowAll).is_ok());
    }

    #[test]
    fn test_public_only_rejects_local_hosts() {
        assert!(parse_feed_url("http://localhost/feed", HostPolicy::PublicOnly).is_err());
        assert!(parse_feed_url("http://127.0.0.1/feed", HostPolicy::PublicOnly).is_err());
        assert!(parse_feed_url("http://[::1]/feed", HostPolicy::PublicOnly).is_err());
        assert!(parse_feed_url("http://10.0.0.1:3000/feed", HostPolicy::PublicOnly).is_err());
        assert!(parse_feed_url("http://[fe80::1]/feed", HostPolicy::PublicOnly).is_err());
        assert!(parse_feed_url("file:///etc/passwd", HostPolicy::PublicOnly).is_err());
        assert!(parse_feed_url("https://example.com/feed.xml", HostPolicy::PublicOnly).is_ok());
    }
}
