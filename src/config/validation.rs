use crate::config::types::{ApiSampleConfig, BulkConfig, Config, CrawlConfig, FetchConfig, ScopeConfig};
use crate::ConfigError;
use url::Url;

/// Largest accepted value for any delay setting, in seconds (one day)
pub const MAX_DELAY_SECONDS: f64 = 86_400.0;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawl)?;
    validate_fetch_config(&config.fetch)?;
    validate_scope_config(&config.scope)?;
    validate_bulk_config(&config.bulk)?;
    validate_api_sample_config(&config.api_samples)?;

    if config.output.root.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output root cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.per_host_workers < 1 {
        return Err(ConfigError::Validation(format!(
            "per_host_workers must be >= 1, got {}",
            config.per_host_workers
        )));
    }

    if config.flush_every < 1 {
        return Err(ConfigError::Validation(format!(
            "flush_every must be >= 1, got {}",
            config.flush_every
        )));
    }

    for extension in &config.attachment_extensions {
        if !extension.starts_with('.') || extension.len() < 2 {
            return Err(ConfigError::Validation(format!(
                "attachment extension '{}' must look like '.pdf'",
                extension
            )));
        }
    }

    validate_urls("seed", &config.seeds)
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_seconds == 0 {
        return Err(ConfigError::Validation(
            "timeout_seconds must be >= 1".to_string(),
        ));
    }

    check_delay("backoff_factor", config.backoff_factor)?;
    check_delay("throttle_seconds", config.throttle_seconds)?;
    if let Some(cap) = config.backoff_max_seconds {
        check_delay("backoff_max_seconds", cap)?;
    }

    Ok(())
}

fn validate_scope_config(config: &ScopeConfig) -> Result<(), ConfigError> {
    for pattern in config.allow_hosts.iter().chain(&config.deny_hosts) {
        validate_host_pattern(pattern)?;
    }
    Ok(())
}

fn validate_bulk_config(config: &BulkConfig) -> Result<(), ConfigError> {
    for pattern in config.allow_hosts.iter().chain(&config.deny_hosts) {
        validate_host_pattern(pattern)?;
    }
    validate_urls("bulk", &config.urls)
}

fn validate_api_sample_config(config: &ApiSampleConfig) -> Result<(), ConfigError> {
    validate_urls("api sample", &config.urls)
}

fn validate_urls(label: &str, urls: &[String]) -> Result<(), ConfigError> {
    for raw in urls {
        let url = Url::parse(raw)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} URL '{}': {}", label, raw, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "{} URL '{}' must use http or https",
                label, raw
            )));
        }
    }
    Ok(())
}

fn check_delay(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be a non-negative number, got {}",
            name, value
        )));
    }
    if value > MAX_DELAY_SECONDS {
        return Err(ConfigError::Validation(format!(
            "{} must be at most {} seconds, got {}",
            name, MAX_DELAY_SECONDS, value
        )));
    }
    Ok(())
}

/// Validates a host pattern (supports a leading `*.` wildcard and a `:port`)
fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Host pattern cannot be empty".to_string(),
        ));
    }

    let host = pattern.strip_prefix("*.").unwrap_or(pattern);
    let host = match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };

    if host.is_empty() {
        return Err(ConfigError::InvalidPattern(format!(
            "Host pattern '{}' has no host part",
            pattern
        )));
    }

    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' contains invalid characters",
            pattern
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.starts_with('-') || host.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot start or end with '.' or '-'",
            pattern
        )));
    }

    if host.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot contain consecutive dots",
            pattern
        )));
    }

    Ok(())
}
