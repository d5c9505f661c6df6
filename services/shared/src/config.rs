// Configuration management shared by every mdstudio-* component.
//
// Config *file* loading and the CLI that parses arguments are out of scope
// for the core; this is just the typed surface each session is constructed
// from, with environment overrides the way the original workspace did it.

use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub router_url: String,
    pub realm: String,
    pub jwt_secret: String,
    pub service_port: u16,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut cfg = config::Config::builder();

        cfg = cfg
            .set_default("router_url", "ws://localhost:8800/ws")?
            .set_default("realm", "mdstudio")?
            .set_default("jwt_secret", "development-secret-key")?
            .set_default("service_port", 8080)?
            .set_default("log_level", "info")?;

        cfg = cfg.add_source(config::Environment::with_prefix("MDSTUDIO"));

        if env::var("TEST_MODE").is_ok() {
            cfg = cfg.set_override("log_level", "debug")?;
        }

        cfg.build()?.try_deserialize()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            router_url: "ws://localhost:8800/ws".to_string(),
            realm: "mdstudio".to_string(),
            jwt_secret: "development-secret-key".to_string(),
            service_port: 8080,
            log_level: "info".to_string(),
        }
    }
}
