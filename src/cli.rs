use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{
    AppConfig, DEFAULT_HOST, DEFAULT_LABEL_FONT, DEFAULT_MODEL, DEFAULT_PORT,
    DEFAULT_TIMEOUT_SECS, DEFAULT_UPLOAD_FOLDER,
};
use crate::utils::parse_extensions;
use crate::vision::DEFAULT_API_BASE;

pub const DEFAULT_EXTENSIONS: &str = "jpg,jpeg,png,webp,tiff";
pub const DEFAULT_MAX_UPLOAD_MB: usize = 16;

#[derive(Parser, Debug)]
#[command(
    name = "abacus-counter",
    version,
    about = "Reads poultry-inspection counting abacus photos through a vision-language model",
    long_about = "
Abacus Counter

Accepts photos of a ten-row counting abacus, builds a \"right side only\" sprite of
the rows, and asks a Gemini model to count the beads on the right of every row.
The reply is normalized to one integer per defect category.

Example Usage:
  # Start the HTTP service (key from .env or the environment)
  abacus-counter serve --port 5000

  # Use another model and a custom upload folder
  abacus-counter serve --model gemini-2.5-flash --upload-dir /var/tmp/abacus

  # Render sprites offline to calibrate the crop constants
  abacus-counter sprite -i ~/boards -o ~/sprites --jobs 4

  # Load settings from a JSON config file
  abacus-counter --config counter.json serve"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (debug logging, detailed CLI messages)
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// JSON config file; command-line values take precedence
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP counting service
    Serve(ServeArgs),
    /// Render sprites for local photos without calling the model
    Sprite(SpriteArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Gemini API key
    #[arg(long = "api-key", env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Alternative variable for the API key, used when API_KEY is unset
    #[arg(long = "google-api-key", env = "GOOGLE_API_KEY", hide_env_values = true, hide = true)]
    pub google_api_key: Option<String>,

    /// Model used for the generation call
    #[arg(long = "model", env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Address to listen on
    #[arg(long = "host", env = "ABACUS_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short = 'p', long = "port", env = "ABACUS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Folder that holds the per-request scratch directories
    #[arg(
        long = "upload-dir",
        env = "UPLOAD_FOLDER",
        default_value = DEFAULT_UPLOAD_FOLDER,
        value_name = "DIR"
    )]
    pub upload_dir: PathBuf,

    /// Timeout of the generation call in seconds
    #[arg(long = "timeout", env = "GEMINI_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS, value_name = "SECS")]
    pub timeout_secs: u64,

    /// Largest accepted upload in megabytes
    #[arg(long = "max-upload-mb", default_value_t = DEFAULT_MAX_UPLOAD_MB, value_name = "MB")]
    pub max_upload_mb: usize,

    /// Base URL of the Generative Language API
    #[arg(long = "api-base", env = "GEMINI_API_BASE", default_value = DEFAULT_API_BASE, value_name = "URL")]
    pub api_base: String,

    /// Font for the sprite row numbers (name, filename or full path)
    #[arg(long = "font", default_value = DEFAULT_LABEL_FONT, value_name = "FONT")]
    pub font: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SpriteArgs {
    /// Input directories or single image files (can be specified multiple times)
    #[arg(short = 'i', long = "input", required = true, value_name = "DIR|FILE")]
    pub input_paths: Vec<PathBuf>,

    /// Output directory for sprites and crops
    #[arg(short = 'o', long = "output", default_value = ".", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Comma-separated list of image extensions to process
    #[arg(long = "extensions", default_value = DEFAULT_EXTENSIONS)]
    pub extensions_str: String,

    /// Number of parallel jobs (0 = one per CPU)
    #[arg(short = 'j', long = "jobs", default_value_t = 0)]
    pub jobs: usize,

    /// Font for the sprite row numbers (name, filename or full path)
    #[arg(long = "font", default_value = DEFAULT_LABEL_FONT, value_name = "FONT")]
    pub font: String,
}

impl ServeArgs {
    /// API_KEY wins over GOOGLE_API_KEY
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.google_api_key.clone())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn app_config(&self) -> AppConfig {
        AppConfig {
            api_key: self.resolved_api_key().unwrap_or_default(),
            model: self.model.clone(),
            api_base: self.api_base.clone(),
            host: self.host.clone(),
            port: self.port,
            upload_dir: self.upload_dir.clone(),
            model_timeout: Duration::from_secs(self.timeout_secs),
            max_upload_bytes: self.max_upload_mb.saturating_mul(1024 * 1024),
            label_font: self.font.clone(),
        }
    }
}

impl SpriteArgs {
    pub fn extensions(&self) -> Vec<String> {
        parse_extensions(&self.extensions_str)
    }

    pub fn parallel_jobs(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get()
        } else {
            self.jobs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve_args(extra: &[&str]) -> ServeArgs {
        let mut argv = vec!["abacus-counter", "serve"];
        argv.extend_from_slice(extra);
        match Args::try_parse_from(argv).unwrap().command {
            Command::Serve(args) => args,
            other => panic!("expected serve, got {:?}", other),
        }
    }

    #[test]
    fn test_serve_flags() {
        let args = serve_args(&[
            "--api-key",
            "k1",
            "--model",
            "gemini-2.5-flash",
            "--port",
            "8080",
            "--timeout",
            "20",
            "--max-upload-mb",
            "4",
        ]);
        let config = args.app_config();

        assert_eq!(config.api_key, "k1");
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.port, 8080);
        assert_eq!(config.model_timeout, Duration::from_secs(20));
        assert_eq!(config.max_upload_bytes, 4 * 1024 * 1024);
    }

    #[test]
    fn test_api_key_precedence() {
        let args = serve_args(&["--api-key", "primary", "--google-api-key", "secondary"]);
        assert_eq!(args.resolved_api_key().as_deref(), Some("primary"));

        let args = serve_args(&["--api-key", "", "--google-api-key", "secondary"]);
        assert_eq!(args.resolved_api_key().as_deref(), Some("secondary"));
    }

    #[test]
    fn test_sprite_flags() {
        let args = Args::try_parse_from([
            "abacus-counter",
            "-v",
            "sprite",
            "-i",
            "a",
            "-i",
            "b.jpg",
            "-o",
            "out",
            "--extensions",
            "jpg,PNG",
            "-j",
            "3",
        ])
        .unwrap();

        assert!(args.verbose);
        match args.command {
            Command::Sprite(sprite) => {
                assert_eq!(sprite.input_paths.len(), 2);
                assert_eq!(sprite.output_dir, PathBuf::from("out"));
                assert_eq!(sprite.extensions(), vec!["jpg".to_string(), "png".to_string()]);
                assert_eq!(sprite.parallel_jobs(), 3);
            }
            other => panic!("expected sprite, got {:?}", other),
        }
    }

    #[test]
    fn test_sprite_requires_input() {
        assert!(Args::try_parse_from(["abacus-counter", "sprite", "-o", "out"]).is_err());
    }
}
