//! Request validation
//!
//! Pure functions that reject malformed or unsafe publish input before any
//! network call is made. Nothing here touches the database or the wire, so
//! every rule is unit-testable in isolation.

use std::net::IpAddr;

use url::{Host, Url};
use uuid::Uuid;

use crate::error::{CrosscastError, Result};
use crate::registry::ProviderConfig;
use crate::types::PublishRequest;

/// Global cap on content size, independent of any platform limit.
pub const MAX_CONTENT_BYTES: usize = 100 * 1024;

/// Bound on fan-out width from a single request.
pub const MAX_TARGETS: usize = 20;

/// Link and media URLs after sanitization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizedUrls {
    pub link_url: Option<String>,
    pub media_url: Option<String>,
}

/// Parse an identifier in canonical UUID form.
pub fn validate_identifier(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| CrosscastError::Validation("bad_id".to_string()))
}

/// Content must be non-empty after trimming and below the global cap.
pub fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(CrosscastError::Validation("empty_content".to_string()));
    }
    if content.len() > MAX_CONTENT_BYTES {
        return Err(CrosscastError::Validation("too_long".to_string()));
    }
    Ok(())
}

/// A request must name at least one and at most `MAX_TARGETS` targets.
pub fn validate_target_count(targets: &[Uuid]) -> Result<()> {
    if targets.is_empty() {
        return Err(CrosscastError::Validation("no_targets".to_string()));
    }
    if targets.len() > MAX_TARGETS {
        return Err(CrosscastError::Validation("too_many_targets".to_string()));
    }
    Ok(())
}

/// Validate a caller-supplied URL and return it re-serialized.
///
/// Only absolute http/https URLs are accepted, and hosts that point into
/// loopback, private, or link-local address space are rejected. This is the
/// SSRF guard: these URLs are later fetched or forwarded by the server, and
/// must not be usable to reach internal endpoints.
pub fn validate_url(raw: &str) -> Result<String> {
    let parsed =
        Url::parse(raw).map_err(|_| CrosscastError::Validation("invalid_url".to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        _ => return Err(CrosscastError::Validation("invalid_url_scheme".to_string())),
    }

    match parsed.host() {
        None => return Err(CrosscastError::Validation("invalid_url".to_string())),
        Some(Host::Domain(domain)) => {
            let domain = domain.to_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                return Err(CrosscastError::Validation("forbidden_url_host".to_string()));
            }
        }
        Some(Host::Ipv4(addr)) => {
            if is_forbidden_ip(IpAddr::V4(addr)) {
                return Err(CrosscastError::Validation("forbidden_url_host".to_string()));
            }
        }
        Some(Host::Ipv6(addr)) => {
            if is_forbidden_ip(IpAddr::V6(addr)) {
                return Err(CrosscastError::Validation("forbidden_url_host".to_string()));
            }
        }
    }

    Ok(parsed.to_string())
}

fn is_forbidden_ip(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_forbidden_ip(IpAddr::V4(mapped));
            }
            let segments = v6.segments();
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (segments[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (segments[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Whole-request validation, run once before any target is touched.
///
/// Returns the sanitized URLs to use for the rest of the dispatch.
pub fn validate_request(request: &PublishRequest) -> Result<SanitizedUrls> {
    validate_content(&request.content)?;
    validate_target_count(&request.target_account_ids)?;

    let link_url = request.link_url.as_deref().map(validate_url).transpose()?;
    let media_url = request.media_url.as_deref().map(validate_url).transpose()?;

    Ok(SanitizedUrls {
        link_url,
        media_url,
    })
}

/// Per-platform content rules, applied once per target.
///
/// A failure here concerns one target only; the caller records it and moves
/// on without aborting sibling targets. Returns the short reason code that
/// ends up in that target's `PublishResult`.
pub fn validate_for_provider(
    content: &str,
    has_media: bool,
    config: &ProviderConfig,
) -> std::result::Result<(), String> {
    if let Some(limit) = config.char_limit {
        if content.chars().count() > limit {
            return Err("too_long".to_string());
        }
    }

    if config.requires_media && !has_media {
        return Err("media_required".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{provider_config, ProviderKind};

    #[test]
    fn test_validate_identifier_accepts_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(validate_identifier(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_validate_identifier_rejects_junk() {
        for raw in ["", "123", "not-a-uuid", "'; DROP TABLE accounts; --"] {
            let err = validate_identifier(raw).unwrap_err();
            assert!(matches!(err, CrosscastError::Validation(ref r) if r == "bad_id"));
        }
    }

    #[test]
    fn test_validate_content_empty() {
        for content in ["", "   ", "\n\t "] {
            let err = validate_content(content).unwrap_err();
            assert!(matches!(err, CrosscastError::Validation(ref r) if r == "empty_content"));
        }
    }

    #[test]
    fn test_validate_content_global_cap() {
        let big = "a".repeat(MAX_CONTENT_BYTES + 1);
        let err = validate_content(&big).unwrap_err();
        assert!(matches!(err, CrosscastError::Validation(ref r) if r == "too_long"));

        let at_cap = "a".repeat(MAX_CONTENT_BYTES);
        assert!(validate_content(&at_cap).is_ok());
    }

    #[test]
    fn test_validate_target_count_empty() {
        let err = validate_target_count(&[]).unwrap_err();
        assert!(matches!(err, CrosscastError::Validation(ref r) if r == "no_targets"));
    }

    #[test]
    fn test_validate_target_count_excessive() {
        let targets: Vec<Uuid> = (0..MAX_TARGETS + 1).map(|_| Uuid::new_v4()).collect();
        let err = validate_target_count(&targets).unwrap_err();
        assert!(matches!(err, CrosscastError::Validation(ref r) if r == "too_many_targets"));

        assert!(validate_target_count(&targets[..MAX_TARGETS]).is_ok());
    }

    #[test]
    fn test_validate_url_accepts_public_https() {
        let url = validate_url("https://cdn.example.com/image.jpg").unwrap();
        assert_eq!(url, "https://cdn.example.com/image.jpg");
    }

    #[test]
    fn test_validate_url_rejects_non_http_schemes() {
        for raw in [
            "ftp://example.com/file",
            "file:///etc/passwd",
            "gopher://example.com",
        ] {
            let err = validate_url(raw).unwrap_err();
            assert!(
                matches!(err, CrosscastError::Validation(ref r) if r == "invalid_url_scheme"),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn test_validate_url_rejects_relative() {
        assert!(validate_url("/internal/admin").is_err());
        assert!(validate_url("example.com/no-scheme").is_err());
    }

    #[test]
    fn test_validate_url_rejects_loopback_and_private_ranges() {
        for raw in [
            "http://127.0.0.1/admin",
            "https://127.8.9.1:8080/",
            "http://10.0.0.5/metadata",
            "http://192.168.1.1/router",
            "http://172.16.3.4/",
            "http://169.254.169.254/latest/meta-data/",
            "http://0.0.0.0/",
            "http://localhost:3000/internal",
            "http://foo.localhost/",
            "http://[::1]/",
            "http://[fe80::1]/",
            "http://[fc00::1]/",
            "http://[::ffff:10.0.0.1]/",
        ] {
            let err = validate_url(raw).unwrap_err();
            assert!(
                matches!(err, CrosscastError::Validation(ref r) if r == "forbidden_url_host"),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn test_validate_url_scheme_check_does_not_bypass_host_check() {
        // Correct scheme, forbidden host: still rejected.
        assert!(validate_url("https://127.0.0.1/").is_err());
    }

    #[test]
    fn test_validate_url_reserializes() {
        // Normalization: default port dropped, host lowercased.
        let url = validate_url("HTTPS://CDN.Example.COM:443/a%20b").unwrap();
        assert_eq!(url, "https://cdn.example.com/a%20b");
    }

    fn request(targets: usize) -> PublishRequest {
        PublishRequest {
            workspace_id: Uuid::new_v4(),
            content: "Hello world".to_string(),
            link_url: None,
            media_url: None,
            media_type: None,
            target_account_ids: (0..targets).map(|_| Uuid::new_v4()).collect(),
        }
    }

    #[test]
    fn test_validate_request_ok() {
        let sanitized = validate_request(&request(2)).unwrap();
        assert_eq!(sanitized, SanitizedUrls::default());
    }

    #[test]
    fn test_validate_request_checks_both_urls_independently() {
        let mut req = request(1);
        req.link_url = Some("https://example.com/post".to_string());
        req.media_url = Some("http://192.168.0.10/img.png".to_string());
        assert!(validate_request(&req).is_err());

        req.media_url = Some("https://cdn.example.com/img.png".to_string());
        let sanitized = validate_request(&req).unwrap();
        assert_eq!(sanitized.link_url.as_deref(), Some("https://example.com/post"));
        assert_eq!(
            sanitized.media_url.as_deref(),
            Some("https://cdn.example.com/img.png")
        );
    }

    #[test]
    fn test_validate_request_rejects_zero_targets_before_urls() {
        let mut req = request(0);
        req.link_url = Some("http://127.0.0.1/".to_string());
        let err = validate_request(&req).unwrap_err();
        assert!(matches!(err, CrosscastError::Validation(ref r) if r == "no_targets"));
    }

    #[test]
    fn test_provider_validation_char_limit() {
        let config = provider_config(ProviderKind::X);
        assert_eq!(
            validate_for_provider(&"a".repeat(281), false, config),
            Err("too_long".to_string())
        );
        assert!(validate_for_provider(&"a".repeat(280), false, config).is_ok());
    }

    #[test]
    fn test_provider_validation_counts_chars_not_bytes() {
        let config = provider_config(ProviderKind::Bluesky);
        // 300 multi-byte characters are exactly at the limit.
        let content = "é".repeat(300);
        assert!(content.len() > 300);
        assert!(validate_for_provider(&content, false, config).is_ok());
    }

    #[test]
    fn test_provider_validation_media_required() {
        let config = provider_config(ProviderKind::Instagram);
        assert_eq!(
            validate_for_provider("caption", false, config),
            Err("media_required".to_string())
        );
        assert!(validate_for_provider("caption", true, config).is_ok());
    }

    #[test]
    fn test_provider_validation_no_limit_platform() {
        let facebook = provider_config(ProviderKind::Facebook);
        assert!(validate_for_provider(&"a".repeat(5_000), false, facebook).is_ok());
    }
}
