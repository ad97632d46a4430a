use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - API base URL is http(s) and a key is set
/// - Orchestrator timeout, pass cap and watch interval are not 0
/// - Job templates carry JSON parameters
/// - Database path is not empty
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let base_url = config.api.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::ValidationError(format!(
            "api.base_url must be an http(s) URL, got {:?}",
            config.api.base_url
        )));
    }

    if config.api.key.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "api.key cannot be empty".to_string(),
        ));
    }

    if config.orchestrator.api_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.api_timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.orchestrator.max_passes_per_session == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.max_passes_per_session cannot be 0".to_string(),
        ));
    }

    if config.orchestrator.watch_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.watch_interval_secs cannot be 0".to_string(),
        ));
    }

    if config.database.path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "database.path cannot be empty".to_string(),
        ));
    }

    for (name, template) in &config.templates {
        template
            .validate(name)
            .map_err(|e| ConfigError::ValidationError(format!("templates.{}: {}", name, e)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;
    use crate::job::JobTemplate;

    fn valid_config() -> Config {
        load_config_from_str(
            r#"
[api]
base_url = "https://firm.example.com/api/v1/jobs"
key = "reporting"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let mut config = valid_config();
        config.api.base_url = "ftp://firm.example.com/jobs".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_rejects_empty_key() {
        let mut config = valid_config();
        config.api.key = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_timeout_zero_fails() {
        let mut config = valid_config();
        config.orchestrator.api_timeout_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("api_timeout_secs"));
    }

    #[test]
    fn test_validate_max_passes_zero_fails() {
        let mut config = valid_config();
        config.orchestrator.max_passes_per_session = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_invalid_template() {
        let mut config = valid_config();
        config.templates.insert(
            "Holdings".to_string(),
            JobTemplate {
                params: r#"{"start_date": __StartDate__}"#.to_string(),
            },
        );
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("templates.Holdings"));
    }

    #[test]
    fn test_validate_watch_interval_zero_fails() {
        let mut config = valid_config();
        config.orchestrator.watch_interval_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("watch_interval_secs"));
    }
}
