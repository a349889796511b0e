use url::Url;

/// Returns the key used to group requests by host: the lowercase host plus
/// any non-default port
///
/// Robots policies, politeness slots and content-store directories are all
/// keyed by this value, so two servers on one machine stay separate.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use harvest_engine::url::host_key;
///
/// let url = Url::parse("https://Example.com/path").unwrap();
/// assert_eq!(host_key(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(host_key(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Returns the lowercase host name without a port
pub fn host_name(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
