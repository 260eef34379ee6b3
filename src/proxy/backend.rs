// src/proxy/backend.rs
use crate::config::{parse_backend_url, ConfigError};
use std::fmt;
use url::Url;

/// One member of the pool. Quarantine state lives in the registry, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Backend {
    /// Address exactly as configured; reported back in `X-App-URL`.
    pub address: String,
    pub url: Url,
}

impl Backend {
    pub fn parse(address: &str) -> Result<Self, ConfigError> {
        let url = parse_backend_url(address)?;
        Ok(Self {
            address: address.to_string(),
            url,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_configured_address_verbatim() {
        let backend = Backend::parse("http://localhost:8001").unwrap();
        assert_eq!(backend.address(), "http://localhost:8001");
        assert_eq!(backend.url.as_str(), "http://localhost:8001/");
        assert_eq!(backend.to_string(), "http://localhost:8001");
    }

    #[test]
    fn rejects_unparseable_address() {
        assert!(Backend::parse("localhost").is_err());
    }
}
