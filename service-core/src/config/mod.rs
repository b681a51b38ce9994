//! Settings shared by every service binary, loaded in layers: a local
//! `.env` file (development convenience), an optional `configuration`
//! file, then `APP`-prefixed environment variables, which win.

use crate::error::AppError;
use serde::Deserialize;

/// The domain-agnostic slice of a service's configuration. Domain
/// settings wrap this and read their own variables on top.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// TCP port the HTTP surface binds on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_defaults_when_absent() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.port, 8080);
    }
}
