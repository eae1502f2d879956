use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors from validating an article URL before it is handed to the
/// content proxy. Covers parse failures and SSRF policy violations.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validate an article URL before fetching its full content through the
/// proxy. Article URLs come from the aggregation service, which is trusted
/// for feed data but not for where it points us: reject non-HTTP(S)
/// schemes, localhost, and private address ranges.
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if let Some(host) = url.host_str() {
        if host == "localhost" {
            return Err(UrlValidationError::Localhost);
        }

        // IPv6 hosts arrive bracketed
        let host_for_parse = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
            if ip.is_loopback() {
                return Err(UrlValidationError::Localhost);
            }
            if is_private_ip(&ip) {
                return Err(UrlValidationError::PrivateIp(ip.to_string()));
            }
        }
    }

    Ok(url)
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

    #[test]
    fn test_valid_public_urls() {
        assert!(validate_url("https://example.com/post/1").is_ok());
        assert!(validate_url("http://news.example.org").is_ok());
        assert!(validate_url("https://example.com:8443/post").is_ok());
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(validate_url("file:///etc/passwd").is_err());
        assert!(validate_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_localhost_rejected() {
        assert!(validate_url("http://localhost/post").is_err());
        assert!(validate_url("http://127.0.0.1/post").is_err());
        assert!(validate_url("http://[::1]/post").is_err());
    }

    #[test]
    fn test_private_ranges_rejected() {
        assert!(validate_url("http://192.168.1.1/post").is_err());
        assert!(validate_url("http://10.0.0.1/post").is_err());
        assert!(validate_url("http://172.16.0.1/post").is_err());
        assert!(validate_url("http://169.254.1.1/post").is_err());
        assert!(validate_url("http://0.0.0.0/post").is_err());
        assert!(validate_url("http://[fe80::1]/post").is_err());
    }

    #[test]
    fn test_port_does_not_bypass_checks() {
        assert!(validate_url("http://192.168.1.1:8080/post").is_err());
    }
}
