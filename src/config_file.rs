use crate::cli::{Args, Command, ServeArgs, SpriteArgs, DEFAULT_EXTENSIONS, DEFAULT_MAX_UPLOAD_MB};
use crate::config::{
    DEFAULT_HOST, DEFAULT_LABEL_FONT, DEFAULT_MODEL, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS,
    DEFAULT_UPLOAD_FOLDER,
};
use crate::vision::DEFAULT_API_BASE;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// On-disk settings file
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub name: Option<String>,
    pub config: CounterConfigJson,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterConfigJson {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub api_base: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub upload_folder: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_upload_mb: Option<usize>,
    pub font: Option<String>,
    pub extensions: Option<String>,
    pub jobs: Option<usize>,
    pub output_path: Option<String>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

impl Args {
    /// Load configuration from a JSON file and merge with command-line arguments
    /// Command-line arguments take precedence over config file values
    pub fn load_and_merge_config(&mut self) -> Result<()> {
        if let Some(config_path) = self.config_file.clone() {
            let config = ConfigFile::load(&config_path)?;
            let cli_args = std::env::args().collect::<Vec<_>>();

            match &mut self.command {
                Command::Serve(serve) => serve.merge_from_config(config.config, &cli_args),
                Command::Sprite(sprite) => sprite.merge_from_config(config.config, &cli_args),
            }

            info!(
                "Loaded configuration {} from: {:?}",
                config.name.as_deref().unwrap_or("(unnamed)"),
                config_path
            );
        }
        Ok(())
    }
}

fn given_on_cli(cli_args: &[String], flags: &[&str]) -> bool {
    cli_args
        .iter()
        .any(|a| flags.iter().any(|f| a == f || a.starts_with(&format!("{}=", f))))
}

impl ServeArgs {
    fn merge_from_config(&mut self, config: CounterConfigJson, cli_args: &[String]) {
        // Secrets - only when neither variable nor flag supplied one
        if self.resolved_api_key().is_none() {
            if let Some(key) = config.api_key {
                self.api_key = Some(key);
            }
        }

        // Remaining values - only apply if still at the default
        if self.model == DEFAULT_MODEL && !given_on_cli(cli_args, &["--model"]) {
            if let Some(model) = config.model {
                self.model = model;
            }
        }

        if self.api_base == DEFAULT_API_BASE {
            if let Some(base) = config.api_base {
                self.api_base = base;
            }
        }

        if self.host == DEFAULT_HOST && !given_on_cli(cli_args, &["--host"]) {
            if let Some(host) = config.host {
                self.host = host;
            }
        }

        if self.port == DEFAULT_PORT && !given_on_cli(cli_args, &["-p", "--port"]) {
            if let Some(port) = config.port {
                self.port = port;
            }
        }

        if self.upload_dir == Path::new(DEFAULT_UPLOAD_FOLDER) {
            if let Some(folder) = config.upload_folder {
                self.upload_dir = PathBuf::from(folder);
            }
        }

        if self.timeout_secs == DEFAULT_TIMEOUT_SECS {
            if let Some(timeout) = config.timeout_secs {
                self.timeout_secs = timeout;
            }
        }

        if self.max_upload_mb == DEFAULT_MAX_UPLOAD_MB {
            if let Some(limit) = config.max_upload_mb {
                self.max_upload_mb = limit;
            }
        }

        if self.font == DEFAULT_LABEL_FONT {
            if let Some(font) = config.font {
                self.font = font;
            }
        }
    }
}

impl SpriteArgs {
    fn merge_from_config(&mut self, config: CounterConfigJson, cli_args: &[String]) {
        if !given_on_cli(cli_args, &["-o", "--output"]) {
            if let Some(output) = config.output_path {
                self.output_dir = PathBuf::from(output);
            }
        }

        if self.extensions_str == DEFAULT_EXTENSIONS {
            if let Some(ext) = config.extensions {
                self.extensions_str = ext;
            }
        }

        if self.jobs == 0 {
            if let Some(jobs) = config.jobs {
                self.jobs = jobs;
            }
        }

        if self.font == DEFAULT_LABEL_FONT {
            if let Some(font) = config.font {
                self.font = font;
            }
        }
    }
}
