//! Command-line options shared by the textrpg binaries.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use textrpg_core::Config;

/// Where to find the backend and which conversation to continue.
#[derive(Args, Debug, Default)]
pub struct ConnectionArgs {
    /// Backend base URL (overrides `backend.base_url` from the config file)
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Continue an existing backend session
    #[arg(long, value_name = "ID")]
    pub session: Option<String>,

    /// Config file to use instead of `$XDG_CONFIG_HOME/textrpg/config.toml`
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl ConnectionArgs {
    /// Load the config file, apply flag overrides and validate the result.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => Config::load().context("failed to load configuration")?,
        };

        if let Some(base_url) = &self.base_url {
            config.backend.base_url = base_url.clone();
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}
