use crate::models::ControlConfig;
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Name of the daemon configuration file inside the config directory
pub const CONFIG_FILE_NAME: &str = "srcds-control.yaml";

/// Configuration manager for loading and saving the YAML configuration file.
///
/// The daemon core never loads configuration itself; the binary loads it here
/// once and hands an `Arc<ControlConfig>` to the controller.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager for `config_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Load the configuration file.
    ///
    /// # Returns
    /// The loaded ControlConfig, or defaults if the file doesn't exist
    pub fn load_config(&self) -> Result<ControlConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
            return Ok(ControlConfig::default());
        }

        let file_contents = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: ControlConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        validate(&config)?;

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Save the configuration file.
    pub fn save_config(&self, config: &ControlConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}

/// Reject settings the daemon cannot run with; warn about suspicious ones.
pub fn validate(config: &ControlConfig) -> Result<()> {
    if config.rcon.max_packet_size < 14 {
        bail!(
            "rcon.max_packet_size must be at least 14 bytes, got {}",
            config.rcon.max_packet_size
        );
    }
    if config.server.process_name.trim().is_empty() {
        bail!("server.process_name must not be empty");
    }
    if config.rcon.password.is_empty() {
        tracing::warn!("rcon.password is empty; authentication will be rejected by the server");
    }
    if !config.server.server_dir.ends_with('/') {
        tracing::warn!(
            "server.server_dir '{}' has no trailing slash",
            config.server.server_dir
        );
    }
    Ok(())
}
