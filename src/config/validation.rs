use crate::config::types::{
    Config, CrawlerConfig, NetworkConfig, PathsConfig, SiteOverride, UserAgentConfig,
};
use crate::model::Site;
use crate::ConfigError;
use std::collections::HashMap;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.task_file.is_empty() {
        return Err(ConfigError::Validation(
            "task_file cannot be empty".to_string(),
        ));
    }

    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_network_config(&config.network)?;
    validate_paths_config(&config.paths)?;
    validate_site_overrides(&config.sites)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.threads < 1 || config.threads > 256 {
        return Err(ConfigError::Validation(format!(
            "threads must be between 1 and 256, got {}",
            config.threads
        )));
    }

    if config.archive_step == 0 {
        return Err(ConfigError::Validation(
            "archive_step must be >= 1".to_string(),
        ));
    }

    if config.image_concurrency < 1 {
        return Err(ConfigError::Validation(format!(
            "image_concurrency must be >= 1, got {}",
            config.image_concurrency
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_network_config(config: &NetworkConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 {
        return Err(ConfigError::Validation(
            "max_retries must be >= 1".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.jitter) {
        return Err(ConfigError::Validation(format!(
            "jitter must be between 0.0 and 1.0, got {}",
            config.jitter
        )));
    }

    if config.initial_backoff_ms > config.max_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "initial_backoff_ms ({}) cannot exceed max_backoff_ms ({})",
            config.initial_backoff_ms, config.max_backoff_ms
        )));
    }

    if config.breaker_threshold < 1 {
        return Err(ConfigError::Validation(
            "breaker_threshold must be >= 1".to_string(),
        ));
    }

    for proxy in &config.proxies {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    Ok(())
}

fn validate_paths_config(config: &PathsConfig) -> Result<(), ConfigError> {
    if config.data_folder.is_empty() {
        return Err(ConfigError::Validation(
            "data_folder cannot be empty".to_string(),
        ));
    }

    if config.archive_folder.is_empty() {
        return Err(ConfigError::Validation(
            "archive_folder cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_site_overrides(sites: &HashMap<Site, SiteOverride>) -> Result<(), ConfigError> {
    for (site, entry) in sites {
        if let Some(template) = &entry.profile_url {
            validate_url_template(template)
                .map_err(|e| ConfigError::InvalidUrl(format!("sites.{}: {}", site, e)))?;
        }

        if let Some(directory) = &entry.directory {
            validate_directory_name(directory)?;
        }
    }
    Ok(())
}

/// Validates a profile URL template (must contain `{id}` and parse as a URL)
pub(crate) fn validate_url_template(template: &str) -> Result<(), String> {
    if !template.contains("{id}") {
        return Err(format!("template '{}' has no {{id}} placeholder", template));
    }

    let sample = template.replace("{id}", "0");
    let url = Url::parse(&sample).map_err(|e| format!("template '{}': {}", template, e))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!("template '{}' must use http or https", template));
    }

    Ok(())
}

/// Directory names become a single path component
fn validate_directory_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ConfigError::Validation(format!(
            "Invalid site directory name '{}'",
            name
        )));
    }
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    Ok(())
}
