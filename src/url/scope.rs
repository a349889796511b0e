use url::Url;

use super::host::{host_key, host_name};

/// Checks if a host matches a pattern
///
/// Two kinds of patterns are supported:
/// 1. Exact: `example.com` matches only `example.com`
/// 2. Wildcard: `*.example.com` matches `example.com` and any subdomain of it
///
/// A pattern carrying a port (`127.0.0.1:8080`) is compared against the
/// host key, so it only matches that port.
///
/// # Examples
///
/// ```
/// use harvest_engine::url::matches_host_pattern;
///
/// assert!(matches_host_pattern("example.com", "example.com"));
/// assert!(matches_host_pattern("*.example.com", "api.v2.example.com"));
/// assert!(!matches_host_pattern("*.example.com", "notexample.com"));
/// ```
pub fn matches_host_pattern(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.to_lowercase();
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Host allow/deny policy
///
/// Deny patterns are checked first. If the allow list is empty every host
/// not denied is in scope.
#[derive(Debug, Clone, Default)]
pub struct ScopePolicy {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl ScopePolicy {
    pub fn new(allow: Vec<String>, deny: Vec<String>) -> Self {
        Self { allow, deny }
    }

    /// Builds the crawl-phase policy
    ///
    /// When no allow patterns are configured the crawl stays on the hosts of
    /// its seed URLs.
    pub fn for_crawl(allow: &[String], deny: &[String], seeds: &[Url]) -> Self {
        let allow = if allow.is_empty() {
            let mut hosts: Vec<String> = seeds.iter().filter_map(host_key).collect();
            hosts.sort();
            hosts.dedup();
            hosts
        } else {
            allow.to_vec()
        };
        Self::new(allow, deny.to_vec())
    }

    /// Returns true if the URL's host passes the deny and allow lists
    pub fn permits(&self, url: &Url) -> bool {
        let (Some(name), Some(key)) = (host_name(url), host_key(url)) else {
            return false;
        };
        let hit = |pattern: &String| {
            matches_host_pattern(pattern, &name) || matches_host_pattern(pattern, &key)
        };

        if self.deny.iter().any(hit) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_exact_match() {
        assert!(matches_host_pattern("example.com", "example.com"));
        assert!(!matches_host_pattern("example.com", "blog.example.com"));
        assert!(!matches_host_pattern("blog.example.com", "example.com"));
    }

    #[test]
    fn test_wildcard_matches_bare_and_nested() {
        assert!(matches_host_pattern("*.example.com", "example.com"));
        assert!(matches_host_pattern("*.example.com", "www.example.com"));
        assert!(matches_host_pattern("*.example.com", "deep.nested.example.com"));
    }

    #[test]
    fn test_wildcard_no_partial_match() {
        assert!(!matches_host_pattern("*.example.com", "myexample.com"));
        assert!(!matches_host_pattern("*.example.com", "example.com.org"));
        assert!(!matches_host_pattern("*.example.com", ""));
    }

    #[test]
    fn test_pattern_case_is_ignored() {
        assert!(matches_host_pattern("*.Example.COM", "docs.example.com"));
    }

    #[test]
    fn test_deny_wins_over_allow() {
        let policy = ScopePolicy::new(
            vec!["*.example.com".to_string()],
            vec!["private.example.com".to_string()],
        );
        assert!(policy.permits(&url("https://docs.example.com/a")));
        assert!(!policy.permits(&url("https://private.example.com/a")));
        assert!(!policy.permits(&url("https://other.org/")));
    }

    #[test]
    fn test_empty_allow_permits_everything_not_denied() {
        let policy = ScopePolicy::new(vec![], vec!["*.tracker.net".to_string()]);
        assert!(policy.permits(&url("https://anything.org/")));
        assert!(!policy.permits(&url("https://ads.tracker.net/")));
    }

    #[test]
    fn test_crawl_scope_defaults_to_seed_hosts() {
        let seeds = vec![url("http://127.0.0.1:4000/"), url("https://docs.example.com/")];
        let policy = ScopePolicy::for_crawl(&[], &[], &seeds);

        assert!(policy.permits(&url("http://127.0.0.1:4000/next")));
        assert!(!policy.permits(&url("http://127.0.0.1:5000/next")));
        assert!(policy.permits(&url("https://docs.example.com/x")));
        assert!(!policy.permits(&url("https://example.com/x")));
    }

    #[test]
    fn test_port_pattern_matches_host_key() {
        let policy = ScopePolicy::new(vec!["localhost:9000".to_string()], vec![]);
        assert!(policy.permits(&url("http://localhost:9000/")));
        assert!(!policy.permits(&url("http://localhost:9001/")));
    }
}
