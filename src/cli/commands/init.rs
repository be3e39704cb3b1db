//! Implementation of the `autoapply init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::cli::context::AppContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::PROJECT_CONFIG;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing project config with the defaults
    #[arg(long, short)]
    pub force: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub config_path: PathBuf,
    pub config_written: bool,
    pub directories_created: Vec<String>,
    pub database_path: String,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if !self.directories_created.is_empty() {
            lines.push("\nCreated directories:".to_string());
            for dir in &self.directories_created {
                lines.push(format!("  - {dir}"));
            }
        }
        if self.config_written {
            lines.push(format!("\nWrote default config to {}", self.config_path.display()));
        }
        lines.push(format!("Database ready at {}", self.database_path));
        lines.join("\n")
    }
}

pub async fn execute(args: InitArgs, config: &Config, json_mode: bool) -> Result<()> {
    let config_path = PathBuf::from(PROJECT_CONFIG);
    let already_initialized = config_path.exists();

    let mut directories_created = vec![];
    let mut dirs = vec![PathBuf::from(".autoapply"), PathBuf::from(&config.artifacts.dir)];
    if let Some(log_dir) = &config.logging.log_dir {
        dirs.push(PathBuf::from(log_dir));
    }
    for dir in &dirs {
        if create_dir(dir).await? {
            directories_created.push(dir.display().to_string());
        }
    }

    let config_written = if !already_initialized || args.force {
        let yaml = serde_yaml::to_string(&Config::default())
            .context("Failed to serialize default config")?;
        fs::write(&config_path, yaml)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        true
    } else {
        false
    };

    AppContext::open(config).await?;

    let message = match (already_initialized, args.force) {
        (false, _) => "Project initialized successfully.",
        (true, true) => "Project reinitialized with default config.",
        (true, false) => "Project already initialized; database schema is up to date.",
    };

    output(
        &InitOutput {
            success: true,
            message: message.to_string(),
            config_path,
            config_written,
            directories_created,
            database_path: config.database.path.clone(),
        },
        json_mode,
    );
    Ok(())
}

async fn create_dir(dir: &Path) -> Result<bool> {
    if dir.exists() {
        return Ok(false);
    }
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(true)
}
