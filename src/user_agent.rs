//! Shared User-Agent strings for the resolver and download HTTP clients.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/wishlist";

/// Default User-Agent for resource downloads.
#[must_use]
pub(crate) fn default_download_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("wishlist/{version} (downloader; +{PROJECT_UA_URL})")
}

/// Default User-Agent for metadata API requests.
#[must_use]
pub(crate) fn default_resolver_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("wishlist/{version} (resolver; +{PROJECT_UA_URL})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_format_consistency() {
        let download_ua = default_download_user_agent();
        let resolver_ua = default_resolver_user_agent();
        assert!(download_ua.contains(PROJECT_UA_URL));
        assert!(resolver_ua.contains(PROJECT_UA_URL));
        assert_eq!(
            env!("CARGO_PKG_VERSION"),
            resolver_ua
                .strip_prefix("wishlist/")
                .and_then(|s| s.split(' ').next())
                .expect("resolver UA has version"),
        );
        assert_ne!(download_ua, resolver_ua);
    }
}
