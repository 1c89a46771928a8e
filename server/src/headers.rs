use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use hyper::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};

use shared::types::app_config::CookieConfig;

/// Extract a header value as a string
pub fn get_header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Parse the `Cookie` header into a name -> value map.
///
/// Malformed pairs (no `=`, empty name) are skipped, never reported:
/// a bad cookie is treated exactly like an absent one.
pub fn get_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let Some(raw) = headers.get("cookie").and_then(|v| v.to_str().ok()) else {
        return out;
    };
    for pair in raw.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let (Some(name), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        out.insert(name.to_string(), value.trim().to_string());
    }
    out
}

/// Build a `Set-Cookie` value.
///
/// `HttpOnly` is always set; `Domain` and `Secure` come from process-wide
/// config.  `max_age` additionally emits an `Expires` attribute so old
/// clients honor the lifetime too.
pub fn set_cookie(
    name: &str,
    value: &str,
    max_age: Option<Duration>,
    cookie_config: &CookieConfig,
) -> Result<HeaderValue> {
    let mut cookie = format!("{}={}", name, value);

    if let Some(age) = max_age {
        let expires = SystemTime::now() + age;
        cookie.push_str(&format!("; Expires={}", httpdate::fmt_http_date(expires)));
        cookie.push_str(&format!("; Max-Age={}", age.as_secs()));
    }

    cookie.push_str("; Path=/");

    if let Some(domain) = &cookie_config.domain {
        cookie.push_str(&format!("; Domain={}", domain));
    }

    if cookie_config.secure {
        cookie.push_str("; Secure");
    }

    cookie.push_str("; HttpOnly; SameSite=Lax");

    debug!("Setting cookie: {}", name);

    HeaderValue::from_str(&cookie).map_err(|e| {
        warn!("Failed to create cookie header for {}: {}", name, e);
        anyhow!("Invalid cookie value: {}", e)
    })
}

/// Clear a cookie by setting an empty value with an epoch expiry.
pub fn clear_cookie(name: &str, cookie_config: &CookieConfig) -> Result<HeaderValue> {
    let mut cookie = format!(
        "{}=; Expires={}; Max-Age=0; Path=/",
        name,
        httpdate::fmt_http_date(UNIX_EPOCH)
    );

    if let Some(domain) = &cookie_config.domain {
        cookie.push_str(&format!("; Domain={}", domain));
    }

    if cookie_config.secure {
        cookie.push_str("; Secure");
    }

    cookie.push_str("; HttpOnly; SameSite=Lax");

    debug!("Clearing cookie: {}", name);

    HeaderValue::from_str(&cookie).map_err(|e| anyhow!("Invalid cookie value: {}", e))
}

/// Extract the client IP: the configured proxy header when set, falling
/// back to the peer address captured at accept time.
pub fn get_client_ip(
    headers: &HeaderMap,
    ip_header: Option<&str>,
    peer_addr: Option<&str>,
) -> Option<String> {
    if let Some(name) = ip_header {
        if let Some(forwarded) = get_header_value(headers, name) {
            return forwarded.split(',').next().map(|s| s.trim().to_string());
        }
    }
    peer_addr.map(|s| s.to_string())
}

/// Extract the user agent string
pub fn get_user_agent(headers: &HeaderMap) -> Option<String> {
    get_header_value(headers, "user-agent")
}

/// Whether the client prefers a JSON response over HTML.
///
/// Media ranges are walked in quality order (stable within equal q):
/// the first concrete `application/json` wins JSON; the first
/// `text/html` or `*/*` wins HTML; an empty or absent header is HTML.
pub fn prefer_json(headers: &HeaderMap) -> bool {
    let Some(accept) = get_header_value(headers, "accept") else {
        return false;
    };

    let mut ranges: Vec<(String, u32)> = Vec::new();
    for part in accept.split(',') {
        let mut pieces = part.trim().split(';');
        let Some(media) = pieces.next() else { continue };
        let media = media.trim().to_ascii_lowercase();
        if media.is_empty() {
            continue;
        }
        // q parameter, scaled to milli-units to avoid float keys
        let mut q = 1000u32;
        for param in pieces {
            let mut kv = param.trim().splitn(2, '=');
            if kv.next().map(str::trim) == Some("q") {
                if let Some(v) = kv.next() {
                    q = (v.trim().parse::<f32>().unwrap_or(1.0).clamp(0.0, 1.0) * 1000.0) as u32;
                }
            }
        }
        ranges.push((media, q));
    }

    ranges.sort_by(|a, b| b.1.cmp(&a.1));

    for (media, _) in ranges {
        if media == "application/json" {
            return true;
        }
        if media == "text/html" || media == "*/*" {
            return false;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn headers_with(name: &str, value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(
            hyper::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
        h
    }

    #[test]
    fn cookies_parse_multiple_pairs() {
        let h = headers_with("cookie", "sid=abc123; save=1");
        let cookies = get_cookies(&h);
        assert_eq!(cookies.get("sid").map(String::as_str), Some("abc123"));
        assert_eq!(cookies.get("save").map(String::as_str), Some("1"));
    }

    #[test]
    fn malformed_cookie_pairs_are_skipped() {
        let h = headers_with("cookie", "garbage; =novalue; sid=ok");
        let cookies = get_cookies(&h);
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies.get("sid").map(String::as_str), Some("ok"));
    }

    #[test]
    fn no_cookie_header_yields_empty_map() {
        assert!(get_cookies(&HeaderMap::new()).is_empty());
    }

    #[test]
    fn prefer_json_on_json_accept() {
        let h = headers_with("accept", "application/json");
        assert!(prefer_json(&h));
    }

    #[test]
    fn prefer_html_on_html_accept() {
        let h = headers_with("accept", "text/html");
        assert!(!prefer_json(&h));
    }

    #[test]
    fn wildcard_without_earlier_json_is_html() {
        let h = headers_with("accept", "*/*");
        assert!(!prefer_json(&h));
    }

    #[test]
    fn missing_accept_header_is_html() {
        assert!(!prefer_json(&HeaderMap::new()));
    }

    #[test]
    fn quality_ordering_wins_over_listing_order() {
        let h = headers_with("accept", "text/html;q=0.5, application/json");
        assert!(prefer_json(&h));
    }

    #[test]
    fn browser_style_accept_is_html() {
        let h = headers_with(
            "accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        );
        assert!(!prefer_json(&h));
    }

    #[test]
    fn clear_cookie_uses_epoch_expiry() {
        let v = clear_cookie("sid", &CookieConfig::default()).unwrap();
        let s = v.to_str().unwrap();
        assert!(s.starts_with("sid=;"));
        assert!(s.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
        assert!(s.contains("Max-Age=0"));
        assert!(s.contains("HttpOnly"));
    }

    #[test]
    fn set_cookie_with_max_age_has_expires() {
        let v = set_cookie(
            "sid",
            "abc",
            Some(Duration::from_secs(3600)),
            &CookieConfig::default(),
        )
        .unwrap();
        let s = v.to_str().unwrap();
        assert!(s.contains("Max-Age=3600"));
        assert!(s.contains("Expires="));
    }

    #[test]
    fn session_cookie_has_no_expires() {
        let v = set_cookie("sid", "abc", None, &CookieConfig::default()).unwrap();
        let s = v.to_str().unwrap();
        assert!(!s.contains("Expires="));
        assert!(!s.contains("Max-Age="));
    }

    #[test]
    fn secure_and_domain_attributes_from_config() {
        let cfg = CookieConfig {
            domain: Some("judge.example.com".into()),
            secure: true,
        };
        let s = set_cookie("sid", "abc", None, &cfg).unwrap();
        let s = s.to_str().unwrap();
        assert!(s.contains("Domain=judge.example.com"));
        assert!(s.contains("Secure"));
    }

    proptest! {
        #[test]
        fn cookie_parsing_never_panics(raw in "[ -~]{0,128}") {
            if let Ok(v) = HeaderValue::from_str(&raw) {
                let mut h = HeaderMap::new();
                h.insert("cookie", v);
                let _ = get_cookies(&h);
            }
        }

        #[test]
        fn accept_parsing_never_panics(raw in "[ -~]{0,128}") {
            if let Ok(v) = HeaderValue::from_str(&raw) {
                let mut h = HeaderMap::new();
                h.insert("accept", v);
                let _ = prefer_json(&h);
            }
        }
    }
}
