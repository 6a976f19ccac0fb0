use super::{
    types::{Config, WorkerCapacity},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Upload limit is non-zero and below the hard rejection ceiling
/// - Dimension bounds are ordered and non-zero
/// - Frame rate cap is positive
/// - Worker capacity is non-zero when fixed
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.limits.file_upload_limit_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "limits.file_upload_limit_bytes cannot be 0".to_string(),
        ));
    }

    if config.limits.way_too_big_bytes < config.limits.file_upload_limit_bytes {
        return Err(ConfigError::ValidationError(
            "limits.way_too_big_bytes cannot be below limits.file_upload_limit_bytes".to_string(),
        ));
    }

    if config.limits.min_dimension == 0 {
        return Err(ConfigError::ValidationError(
            "limits.min_dimension cannot be 0".to_string(),
        ));
    }

    if config.limits.max_dimension < config.limits.min_dimension {
        return Err(ConfigError::ValidationError(
            "limits.max_dimension cannot be below limits.min_dimension".to_string(),
        ));
    }

    if config.limits.max_fps <= 0.0 {
        return Err(ConfigError::ValidationError(
            "limits.max_fps must be positive".to_string(),
        ));
    }

    if config.workers.capacity == WorkerCapacity::Fixed(0) {
        return Err(ConfigError::ValidationError(
            "workers.capacity cannot be 0; use \"unbounded\" to disable gating".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_upload_limit_fails() {
        let mut config = Config::default();
        config.limits.file_upload_limit_bytes = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_ceiling_below_limit_fails() {
        let mut config = Config::default();
        config.limits.way_too_big_bytes = config.limits.file_upload_limit_bytes - 1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_inverted_dimensions_fail() {
        let mut config = Config::default();
        config.limits.min_dimension = 500;
        config.limits.max_dimension = 100;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_capacity_fails() {
        let mut config = Config::default();
        config.workers.capacity = WorkerCapacity::Fixed(0);
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("unbounded"));
    }

    #[test]
    fn test_validate_unbounded_capacity_ok() {
        let mut config = Config::default();
        config.workers.capacity = WorkerCapacity::Unbounded;
        assert!(validate_config(&config).is_ok());
    }
}
