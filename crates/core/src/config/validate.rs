use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Upstream base URL uses http or https
/// - Timeouts and the event buffer are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Upstream validation
    let base_url = config.upstream.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::ValidationError(format!(
            "upstream.base_url must start with http:// or https://, got '{}'",
            base_url
        )));
    }
    if config.upstream.request_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "upstream.request_timeout_secs cannot be 0".to_string(),
        ));
    }
    if config.upstream.connect_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "upstream.connect_timeout_secs cannot be 0".to_string(),
        ));
    }

    // Generation validation
    if config.generation.fetch_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "generation.fetch_timeout_secs cannot be 0".to_string(),
        ));
    }
    if config.generation.event_buffer == 0 {
        return Err(ConfigError::ValidationError(
            "generation.event_buffer cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenerationConfig, ServerConfig, UpstreamConfig};
    use std::net::IpAddr;

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                host: "0.0.0.0".parse::<IpAddr>().unwrap(),
                port: 0,
            },
            upstream: UpstreamConfig::default(),
            generation: GenerationConfig::default(),
        };
        let result = validate_config(&config);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_non_http_base_url_fails() {
        let mut config = Config::default();
        config.upstream.base_url = "localhost:8000".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("upstream.base_url"));
    }

    #[test]
    fn test_validate_zero_fetch_timeout_fails() {
        let mut config = Config::default();
        config.generation.fetch_timeout_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("fetch_timeout_secs"));
    }

    #[test]
    fn test_validate_zero_event_buffer_fails() {
        let mut config = Config::default();
        config.generation.event_buffer = 0;
        assert!(validate_config(&config).is_err());
    }
}
