use crate::config::types::{Config, FolderRule};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    for seed in config.seeds() {
        validate_seed(seed)?;
    }
    validate_limits(config)?;
    validate_folders(&config.folders)?;
    Ok(())
}

/// Parses and validates a seed URL string
///
/// Seeds must be absolute `http`/`https` URLs with a host.
pub fn parse_seed(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", raw, e)))?;
    validate_seed(&url)?;
    Ok(url)
}

fn validate_seed(url: &Url) -> Result<(), ConfigError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "Seed URL '{}' must use http or https",
            url
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' has no host",
            url
        )));
    }

    Ok(())
}

/// Validates numeric limits and ranges
fn validate_limits(config: &Config) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if config.page_timeout.is_zero() {
        return Err(ConfigError::Validation(
            "timeout must be greater than 0ms".to_string(),
        ));
    }

    if config.download_timeout.is_zero() {
        return Err(ConfigError::Validation(
            "download-timeout must be greater than 0ms".to_string(),
        ));
    }

    if config.delay.min > config.delay.max {
        return Err(ConfigError::Validation(format!(
            "delay minimum {} exceeds maximum {}",
            config.delay.min, config.delay.max
        )));
    }

    if config.max_redirects > 20 {
        return Err(ConfigError::Validation(format!(
            "max-redirects must be <= 20, got {}",
            config.max_redirects
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the folder table
///
/// Folder names become a single path component under the output root.
fn validate_folders(folders: &[FolderRule]) -> Result<(), ConfigError> {
    for rule in folders {
        if rule.pattern.is_empty() {
            return Err(ConfigError::Validation(format!(
                "folder '{}' has an empty pattern",
                rule.name
            )));
        }

        if rule.name.is_empty()
            || rule.name == "."
            || rule.name == ".."
            || rule.name.contains(['/', '\\'])
        {
            return Err(ConfigError::Validation(format!(
                "folder name '{}' must be a single path component",
                rule.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn valid_config() -> Config {
        Config::new(Url::parse("https://example.test/").unwrap())
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_parse_seed() {
        assert!(parse_seed("https://example.test/").is_ok());
        assert!(parse_seed("http://127.0.0.1:8080/start").is_ok());
        assert!(matches!(
            parse_seed("ftp://example.test/"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            parse_seed("/relative/path"),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_concurrency_bounds() {
        let mut config = valid_config();
        config.concurrency = 0;
        assert!(validate(&config).is_err());

        config.concurrency = 101;
        assert!(validate(&config).is_err());

        config.concurrency = 100;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = valid_config();
        config.page_timeout = Duration::ZERO;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_extra_seed_scheme_checked() {
        let mut config = valid_config();
        config
            .extra_seeds
            .push(Url::parse("mailto:someone@example.test").unwrap());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_folder_names_must_be_single_component() {
        let mut config = valid_config();
        config.folders.push(FolderRule {
            pattern: "brand.php".to_string(),
            name: "../escape".to_string(),
        });
        assert!(validate(&config).is_err());

        config.folders[0].name = "brand".to_string();
        assert!(validate(&config).is_ok());

        config.folders[0].pattern = String::new();
        assert!(validate(&config).is_err());
    }
}
