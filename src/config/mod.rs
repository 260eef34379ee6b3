// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// Prefix for environment-provided settings, e.g. `LB_BACKEND_ADDRESSES`.
pub const ENV_PREFIX: &str = "LB";

/// Load configuration from a file (YAML or JSON)
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let is_yaml = matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    );
    parse_config(&contents, is_yaml)
}

pub fn parse_config(contents: &str, yaml: bool) -> Result<Config> {
    let config: Config = if yaml {
        serde_yaml::from_str(contents).context("Failed to parse YAML config")?
    } else {
        serde_json::from_str(contents).context("Failed to parse JSON config")?
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from `LB_*` environment variables.
///
/// Lists are comma separated and nested keys use a double underscore:
/// `LB_BACKEND_ADDRESSES=http://a:8001,http://b:8002 LB_METRICS__ENABLED=true`.
pub fn load_from_env() -> Result<Config> {
    load_from_vars(None)
}

pub fn load_from_vars(vars: Option<HashMap<String, String>>) -> Result<Config> {
    let environment = ::config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("backend_addresses")
        .source(vars);

    let config: Config = ::config::Config::builder()
        .add_source(environment)
        .build()
        .context("Failed to read environment configuration")?
        .try_deserialize()
        .context("Failed to parse environment configuration")?;

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_defaults_fill_missing_fields() {
        let config = parse_config(
            "backend_addresses:\n  - http://localhost:8001\n  - http://localhost:8002\n",
            true,
        )
        .unwrap();

        assert_eq!(config.backend_addresses.len(), 2);
        assert_eq!(config.retry_downtime_secs, 10);
        assert_eq!(
            config.attempt_timeout().unwrap(),
            std::time::Duration::from_secs(2)
        );
        assert_eq!(config.retry.attempts_per_backend, 2);
        assert!(!config.metrics.enabled);
        assert_eq!(config.listen_addr.port(), 8080);
    }

    #[test]
    fn json_overrides_are_applied() {
        let config = parse_config(
            r#"{
                "backend_addresses": ["http://10.0.0.1:9000"],
                "retry_downtime_secs": 30,
                "per_attempt_timeout_secs": 0.5,
                "metrics": { "enabled": true, "port": 9100 }
            }"#,
            false,
        )
        .unwrap();

        assert_eq!(
            config.retry_downtime().unwrap(),
            std::time::Duration::from_secs(30)
        );
        assert_eq!(
            config.attempt_timeout().unwrap(),
            std::time::Duration::from_millis(500)
        );
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9100);
        assert_eq!(config.metrics.path, "/metrics");
    }

    #[test]
    fn empty_backend_list_is_rejected() {
        let err = parse_config("backend_addresses: []\n", true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::NoBackends)
        ));
    }

    #[test]
    fn bad_address_and_timeout_are_rejected() {
        let mut config = Config::new(vec!["not a url".to_string()]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAddress { .. })
        ));

        config.backend_addresses = vec!["ftp://files.local".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAddress { .. })
        ));

        config.backend_addresses = vec!["http://localhost:8001".to_string()];
        config.per_attempt_timeout_secs = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(_))));

        config.per_attempt_timeout_secs = 2.0;
        config.retry.attempts_per_backend = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRetry(_))));
    }

    #[test]
    fn oversized_downtime_is_rejected() {
        let err = parse_config(
            "backend_addresses: [\"http://a.local\"]\nretry_downtime_secs: 18446744073709551615\n",
            true,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidDowntime { .. })
        ));

        let mut config = Config::new(vec!["http://a.local".to_string()]);
        config.retry_downtime_secs = MAX_RETRY_DOWNTIME.as_secs();
        assert!(config.validate().is_ok());
        config.retry_downtime_secs += 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDowntime { .. })
        ));
    }

    #[test]
    fn unrepresentable_timeout_is_rejected() {
        let err = parse_config(
            "backend_addresses: [\"http://a.local\"]\nper_attempt_timeout_secs: 1.0e30\n",
            true,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidTimeout(_))
        ));

        let mut config = Config::new(vec!["http://a.local".to_string()]);
        for secs in [-1.0, f64::NAN, f64::INFINITY, 1e-12] {
            config.per_attempt_timeout_secs = secs;
            assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(_))));
        }
    }

    #[test]
    fn duplicate_addresses_are_rejected() {
        let config = Config::new(vec![
            "http://a.local".to_string(),
            "http://b.local".to_string(),
            "http://a.local".to_string(),
        ]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateAddress(address)) if address == "http://a.local"
        ));
    }

    #[test]
    fn environment_variables_are_read() {
        let vars = HashMap::from([
            (
                "LB_BACKEND_ADDRESSES".to_string(),
                "http://localhost:8001,http://localhost:8002,http://localhost:8003".to_string(),
            ),
            ("LB_RETRY_DOWNTIME_SECS".to_string(), "5".to_string()),
            ("LB_RETRY__ATTEMPTS_PER_BACKEND".to_string(), "3".to_string()),
        ]);

        let config = load_from_vars(Some(vars)).unwrap();
        assert_eq!(
            config.backend_addresses,
            vec![
                "http://localhost:8001",
                "http://localhost:8002",
                "http://localhost:8003"
            ]
        );
        assert_eq!(config.retry_downtime_secs, 5);
        assert_eq!(config.retry.attempts_per_backend, 3);
    }

    #[test]
    fn environment_without_backends_fails() {
        assert!(load_from_vars(Some(HashMap::new())).is_err());
    }
}
