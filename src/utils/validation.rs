use crate::utils::error::{Result, StatsError};
use regex::Regex;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<Url> {
    if url_str.is_empty() {
        return Err(StatsError::InvalidConfigValue {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(StatsError::InvalidConfigValue {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(StatsError::InvalidConfigValue {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(StatsError::InvalidConfigValue {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(StatsError::InvalidConfigValue {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(StatsError::InvalidConfigValue {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| StatsError::ConfigError {
        message: format!("'{}' is required", field_name),
    })
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(StatsError::InvalidConfigValue {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// ISO 3166-1 alpha-2 shape, e.g. `US`.
pub fn validate_country_code(field_name: &str, code: &str) -> Result<()> {
    let re = Regex::new(r"^[A-Z]{2}$").map_err(|e| StatsError::ConfigError {
        message: e.to_string(),
    })?;
    if !re.is_match(code) {
        return Err(StatsError::InvalidConfigValue {
            field: field_name.to_string(),
            value: code.to_string(),
            reason: "Expected a two-letter upper-case country code".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("store.endpoint", "https://example.com/sql").is_ok());
        assert!(validate_url("store.endpoint", "http://localhost:8080").is_ok());
        assert!(validate_url("store.endpoint", "").is_err());
        assert!(validate_url("store.endpoint", "invalid-url").is_err());
        assert!(validate_url("store.endpoint", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("store.pool_size", 5, 1).is_ok());
        assert!(validate_positive_number("store.pool_size", 0, 1).is_err());
    }

    #[test]
    fn test_validate_country_code() {
        assert!(validate_country_code("catalog.state_country", "US").is_ok());
        assert!(validate_country_code("catalog.state_country", "us").is_err());
        assert!(validate_country_code("catalog.state_country", "US'; --").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("execution.max_retries", 2, 0, 5).is_ok());
        assert!(validate_range("execution.max_retries", 9, 0, 5).is_err());
    }
}
