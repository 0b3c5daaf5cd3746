use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during address validation.
///
/// These cover both parsing failures and the policy that keeps feed
/// subscriptions away from local and private networks.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// Nothing was entered.
    #[error("Address is empty")]
    Empty,
    /// The address could not be parsed as a URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Decides whether user input is a usable feed address.
pub trait Validate: Send + Sync {
    fn validate(&self, text: &str) -> Result<(), ValidationError>;
}

/// Default [`Validate`] implementation backed by [`validate_url`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlValidator {
    /// Accept localhost and private ranges (local development, tests)
    pub allow_private_hosts: bool,
}

impl UrlValidator {
    pub fn new(allow_private_hosts: bool) -> Self {
        Self {
            allow_private_hosts,
        }
    }
}

impl Validate for UrlValidator {
    fn validate(&self, text: &str) -> Result<(), ValidationError> {
        match validate_url(text) {
            Ok(_) => Ok(()),
            Err(ValidationError::Localhost | ValidationError::PrivateIp(_))
                if self.allow_private_hosts =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Canonical form used to compare feed addresses.
///
/// Trims surrounding whitespace and trailing slashes, so
/// `https://example.com/feed/` and `https://example.com/feed` are the same
/// subscription.
pub fn normalize_address(address: &str) -> &str {
    address.trim().trim_end_matches('/')
}

/// Validates a URL string for use as a feed source.
///
/// Rejects:
/// - Empty input
/// - Non-HTTP(S) schemes (e.g., `file://`, `ftp://`)
/// - Localhost addresses (`localhost`, `127.0.0.1`, `::1`)
/// - Private IP ranges (RFC 1918, link-local, unique local IPv6)
///
/// # Examples
///
/// ```
/// use feedline::util::validate_url;
///
/// let url = validate_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("http://localhost/feed").is_err());
/// assert!(validate_url("http://192.168.1.1/feed").is_err());
/// assert!(validate_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, ValidationError> {
    let trimmed = url_str.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }

    let url = Url::parse(trimmed)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(ValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if let Some(host) = url.host_str() {
        if host == "localhost" {
            return Err(ValidationError::Localhost);
        }

        // Strip brackets from IPv6 addresses for parsing
        let host_for_parse = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
            if ip.is_loopback() {
                return Err(ValidationError::Localhost);
            }
            if is_private_ip(&ip) {
                return Err(ValidationError::PrivateIp(ip.to_string()));
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
