use super::models::app_config::AppConfig;
use super::models::app_env::Env;
use std::fs;

impl AppConfig {
    /// Loads `config/<env>.toml` relative to the working directory.
    pub fn new(env: &Env) -> AppConfig {
        let path = format!("config/{}.toml", env);
        let raw = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("CONFIG -> cannot read {}: {}", path, e));
        let config = AppConfig::from_toml_str(&raw)
            .unwrap_or_else(|e| panic!("CONFIG -> {} is invalid: {}", path, e));
        if let Err(e) = config.validate() {
            panic!("CONFIG -> {}: {}", path, e);
        }
        config
    }

    pub fn from_toml_str(raw: &str) -> Result<AppConfig, toml::de::Error> {
        toml::from_str(raw)
    }
}

#[cfg(test)]
pub fn test_config() -> AppConfig {
    AppConfig::from_toml_str(include_str!("../../config/local.toml"))
        .expect("config/local.toml must parse")
}
