use serde::{Deserialize, Serialize};

/// Configuration for the database binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Database name; the service id when unset.
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    /// Characters the generated password must not contain.
    #[serde(default = "default_exclude_characters")]
    pub exclude_characters: String,
    #[serde(default = "default_endpoint_env")]
    pub endpoint_env: String,
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            database_name: None,
            port: default_port(),
            username: default_username(),
            exclude_characters: default_exclude_characters(),
            endpoint_env: default_endpoint_env(),
            secret_env: default_secret_env(),
        }
    }
}

fn default_engine() -> String {
    "aurora-postgresql".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_username() -> String {
    "api".to_string()
}

fn default_exclude_characters() -> String {
    "/@\" \\".to_string()
}

fn default_endpoint_env() -> String {
    "DB_ENDPOINT".to_string()
}

fn default_secret_env() -> String {
    "DB_SECRET".to_string()
}
