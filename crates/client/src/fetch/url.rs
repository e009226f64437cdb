//! URL resolution against the application origin.

use url::Url;

/// Error type for URL resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Resolve a manifest entry or notification target against the origin.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Join relative paths onto `origin`; absolute URLs are kept
/// 3. Lowercase the host (done by the parser)
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn resolve(origin: &Url, input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = origin.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Whether `url` shares scheme, host and port with `origin`.
pub fn is_same_origin(origin: &Url, url: &Url) -> bool {
    origin.origin() == url.origin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://recipes.test").unwrap()
    }

    #[test]
    fn test_resolve_relative_path() {
        let url = resolve(&origin(), "/static/css/style.css").unwrap();
        assert_eq!(url.as_str(), "https://recipes.test/static/css/style.css");
    }

    #[test]
    fn test_resolve_absolute_kept() {
        let url = resolve(&origin(), "https://cdn.test/app.js").unwrap();
        assert_eq!(url.host_str(), Some("cdn.test"));
    }

    #[test]
    fn test_resolve_lowercase_host() {
        let url = resolve(&origin(), "https://RECIPES.TEST/about").unwrap();
        assert_eq!(url.host_str(), Some("recipes.test"));
    }

    #[test]
    fn test_resolve_remove_fragment() {
        let url = resolve(&origin(), "/recipes/42#steps").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.path(), "/recipes/42");
    }

    #[test]
    fn test_resolve_preserve_query() {
        let url = resolve(&origin(), "/recipes?b=2&a=1").unwrap();
        assert_eq!(url.query(), Some("b=2&a=1"));
    }

    #[test]
    fn test_resolve_trim_whitespace() {
        let url = resolve(&origin(), "  /  ").unwrap();
        assert_eq!(url.as_str(), "https://recipes.test/");
    }

    #[test]
    fn test_resolve_unsupported_scheme() {
        let result = resolve(&origin(), "file:///etc/passwd");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_resolve_empty() {
        assert!(matches!(resolve(&origin(), ""), Err(UrlError::Empty)));
        assert!(matches!(resolve(&origin(), "   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_same_origin() {
        let o = origin();
        assert!(is_same_origin(&o, &Url::parse("https://recipes.test/api/v1/recipe/1").unwrap()));
        assert!(!is_same_origin(&o, &Url::parse("http://recipes.test/").unwrap()));
        assert!(!is_same_origin(&o, &Url::parse("https://recipes.test:8443/").unwrap()));
        assert!(!is_same_origin(&o, &Url::parse("https://fonts.test/inter.css").unwrap()));
    }
}
