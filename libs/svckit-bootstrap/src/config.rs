use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use svckit::{ClusterRef, Environment, NetworkRef};
use svckit::provider::NamespaceHandle;

/// Main application configuration with strongly-typed global sections
/// and a flexible per-extension configuration bag.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Deployment environment every service is built into.
    pub environment: EnvironmentConfig,
    /// Logging configuration (optional, uses defaults if None).
    pub logging: Option<LoggingConfig>,
    /// Where and how the deployment manifest is written.
    #[serde(default)]
    pub output: OutputConfig,
    /// Directory containing per-extension YAML files (optional).
    #[serde(default)]
    pub extensions_dir: Option<String>,
    /// Per-extension configuration bag: extension name → arbitrary JSON/YAML value.
    #[serde(default)]
    pub extensions: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    pub id: String,
    pub network: String,
    pub cluster: String,
    /// Existing discovery namespace to import instead of creating one.
    #[serde(default)]
    pub namespace: Option<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            id: "production".to_string(),
            network: "vpc-default".to_string(),
            cluster: "cluster-default".to_string(),
            namespace: None,
        }
    }
}

impl EnvironmentConfig {
    pub fn to_environment(&self) -> Environment {
        let env = Environment::new(
            self.id.clone(),
            NetworkRef(self.network.clone()),
            ClusterRef(self.cluster.clone()),
        );
        match &self.namespace {
            Some(name) => env.with_namespace(NamespaceHandle {
                id: format!("imported-{name}"),
                name: name.clone(),
            }),
            None => env,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Write to this file instead of stdout.
    #[serde(default)]
    pub path: Option<String>,
}

/// Logging configuration - maps subsystem names to their logging settings.
/// Key "default" is the catch-all for logs that don't match explicit subsystems.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/synth.log", empty disables the file sink
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

/// Create a default logging configuration.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: String::new(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: EnvironmentConfig::default(),
            logging: Some(default_logging_config()),
            output: OutputConfig::default(),
            extensions_dir: None,
            extensions: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration with layered loading: defaults → YAML file → environment variables.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        // Optional sections stay None unless YAML or ENV provide them.
        let base = AppConfig {
            logging: None,
            ..AppConfig::default()
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(config_path.as_ref()))
            // Example: SVCKIT__ENVIRONMENT__ID=staging maps to environment.id
            .merge(Env::prefixed("SVCKIT__").split("__"));

        let mut config: AppConfig = figment
            .extract()
            .with_context(|| format!("Failed to load config from {}", config_path.as_ref().display()))?;

        if let Some(dir) = config.extensions_dir.clone() {
            merge_extension_files(&mut config.extensions, dir)?;
        }

        Ok(config)
    }

    /// Load configuration from file or fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => Ok(Self::default()),
        }
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(env_id) = &args.environment {
            self.environment.id = env_id.clone();
        }
        if let Some(format) = args.format {
            self.output.format = format;
        }
        if let Some(path) = &args.output {
            self.output.path = Some(path.clone());
        }

        // Verbose flags raise the console level of the "default" section.
        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            default_section.console_level = match args.verbose {
                0 => default_section.console_level.clone(),
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            };
        }
    }
}

/// Command line arguments structure.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub environment: Option<String>,
    pub format: Option<OutputFormat>,
    pub output: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
}

/// Merge `<name>.yaml` files from `dir` into the bag; a file wins over an inline entry.
fn merge_extension_files(
    bag: &mut HashMap<String, serde_json::Value>,
    dir: impl AsRef<Path>,
) -> Result<()> {
    use std::fs;
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_yaml = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"))
            .unwrap_or(false);
        if !is_yaml {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let val: serde_yaml::Value = serde_yaml::from_str(&raw)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?;
        tracing::debug!(extension = name, path = %path.display(), "Merged extension config file");
        bag.insert(name.to_string(), serde_json::to_value(val)?);
    }
    Ok(())
}
