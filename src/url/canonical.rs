use crate::UrlError;
use url::Url;

/// Canonicalizes a URL so that equivalent spellings share one frontier and manifest key
///
/// # Canonicalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an `http` or `https` scheme and a host
/// 3. Lowercase the scheme and host (the path keeps its case)
/// 4. Remove the fragment (everything after #)
/// 5. Empty path becomes `/`; a trailing slash is dropped unless the path is `/`
///
/// Query strings are kept verbatim: for document hosts the query usually
/// selects the document.
///
/// # Examples
///
/// ```
/// use harvest_engine::url::canonicalize;
///
/// let url = canonicalize("https://Docs.Example.COM/Guide/#intro").unwrap();
/// assert_eq!(url.as_str(), "https://docs.example.com/Guide");
/// ```
pub fn canonicalize(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    // The url crate already lowercases scheme and registered domain names.
    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);

    let path = url.path().to_string();
    if path.is_empty() {
        url.set_path("/");
    } else if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
        if url.path().is_empty() {
            url.set_path("/");
        }
    }

    if url.query() == Some("") {
        url.set_query(None);
    }

    Ok(url)
}
