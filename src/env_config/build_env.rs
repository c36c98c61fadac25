use super::models::app_env::{AppEnv, Env};
use std::env;
use std::str::FromStr;

impl AppEnv {
    pub fn new() -> AppEnv {
        AppEnv {
            env: Env::from_str(&get_env_var("ENV")).expect("Unknown environment"),
            postgres_host: get_env_var("POSTGRES_HOST"),
            postgres_user: get_env_var("POSTGRES_USER"),
            postgres_password: get_env_var("POSTGRES_PASSWORD"),
            postgres_database: get_env_var("POSTGRES_DATABASE"),
            webdriver_url: env::var("WEBDRIVER_URL")
                .unwrap_or_else(|_| "http://localhost:4444".to_string()),
        }
    }
}

impl Default for AppEnv {
    fn default() -> Self {
        Self::new()
    }
}

fn get_env_var(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| panic!("ENV -> {} is not set", name))
}
