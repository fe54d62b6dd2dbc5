//! Server configuration: TOML file with environment-variable overrides.
//!
//! Every field is defaulted except the database URL and the inspection API
//! credentials, which have no sensible defaults and must come from the file
//! or the `REGWATCH_*` environment.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use regwatch_core::scan::OrchestratorConfig;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub inspection_api: InspectionApiSettings,
    pub scan: OrchestratorConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8460,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectionApiSettings {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout_secs: u64,
}

impl Default for InspectionApiSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            timeout_secs: 15,
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then apply environment overrides and
    /// validate the result.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("REGWATCH_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("REGWATCH_PORT")
            && let Ok(port) = v.parse()
        {
            self.server.port = port;
        }
        if let Ok(v) = std::env::var("REGWATCH_DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = std::env::var("REGWATCH_API_BASE_URL") {
            self.inspection_api.base_url = v;
        }
        if let Ok(v) = std::env::var("REGWATCH_API_CLIENT_ID") {
            self.inspection_api.client_id = v;
        }
        if let Ok(v) = std::env::var("REGWATCH_API_CLIENT_SECRET") {
            self.inspection_api.client_secret = v;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.database.url.is_empty(),
            "database URL not configured (set [database].url or REGWATCH_DATABASE_URL)"
        );
        anyhow::ensure!(
            !self.inspection_api.base_url.is_empty(),
            "inspection API base URL not configured \
             (set [inspection_api].base_url or REGWATCH_API_BASE_URL)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_defaults_and_keeps_the_rest() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [database]
            url = "postgres://localhost/regwatch"

            [inspection_api]
            base_url = "https://inspections.example.gov/v1/"
            client_id = "regwatch"
            client_secret = "secret"

            [scan.defaults]
            batch_size = 25
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.scan.defaults.batch_size, 25);
        assert_eq!(config.scan.defaults.concurrency, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_database_url_is_rejected() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }
}
