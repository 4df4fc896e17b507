//! Site names and loose URLs to navigable addresses.

use url::Url;

const KNOWN_SITES: &[(&str, &str)] = &[
    ("youtube", "https://www.youtube.com"),
    ("booking", "https://www.booking.com"),
    ("skyscanner", "https://www.skyscanner.net"),
    ("kayak", "https://www.kayak.com"),
    ("expedia", "https://www.expedia.com"),
    ("google", "https://www.google.com"),
    ("hotels", "https://www.hotels.com"),
    ("nytimes", "https://www.nytimes.com"),
    ("new york times", "https://www.nytimes.com"),
    ("guardian", "https://www.theguardian.com"),
    ("washington post", "https://www.washingtonpost.com"),
    ("washingtonpost", "https://www.washingtonpost.com"),
    ("amazon", "https://www.amazon.com"),
];

/// Map a site name ("booking.com", "Skyscanner") or URL to a URL.
///
/// Full http(s) URLs pass through, known site names map to their home page,
/// anything that looks like a host gets `https://`. Returns `None` for text
/// that cannot be navigated to.
pub fn map_site_to_url(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lower = trimmed.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Url::parse(trimmed).ok();
    }

    let bare = lower.strip_prefix("www.").unwrap_or(&lower);
    if let Some((_, url)) = KNOWN_SITES.iter().find(|(name, _)| {
        bare == *name || bare.strip_suffix(".com").is_some_and(|b| b == *name)
    }) {
        return Url::parse(url).ok();
    }

    if lower.contains('.') && !lower.contains(char::is_whitespace) {
        return Url::parse(&format!("https://{lower}"))
            .ok()
            .filter(|u| u.host_str().is_some());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapped(raw: &str) -> Option<String> {
        map_site_to_url(raw).map(|u| u.to_string())
    }

    #[test]
    fn test_known_sites() {
        assert_eq!(mapped("YouTube"), Some("https://www.youtube.com/".into()));
        assert_eq!(mapped("booking.com"), Some("https://www.booking.com/".into()));
        assert_eq!(mapped("skyscanner"), Some("https://www.skyscanner.net/".into()));
    }

    #[test]
    fn test_urls_pass_through() {
        assert_eq!(
            mapped("https://example.org/path?q=1"),
            Some("https://example.org/path?q=1".into())
        );
    }

    #[test]
    fn test_bare_host_gets_scheme() {
        assert_eq!(mapped("rust-lang.org"), Some("https://rust-lang.org/".into()));
    }

    #[test]
    fn test_unknown_name_is_none() {
        assert_eq!(mapped("my favourite site"), None);
        assert_eq!(mapped(""), None);
    }
}
