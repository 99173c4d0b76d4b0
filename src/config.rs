use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::vision::DEFAULT_API_BASE;

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_UPLOAD_FOLDER: &str = "uploads";
pub const DEFAULT_TIMEOUT_SECS: u64 = 50;
/// 16 MB request body limit
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_LABEL_FONT: &str = "DejaVuSans-Bold";

/// Settings resolved once at startup and shared by every request
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub model_timeout: Duration,
    pub max_upload_bytes: usize,
    pub label_font: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_FOLDER),
            model_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            label_font: DEFAULT_LABEL_FONT.to_string(),
        }
    }
}

impl AppConfig {
    /// Check the settings and create the upload folder
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "API_KEY/GOOGLE_API_KEY not set. Define the key before starting the server"
            ));
        }

        if self.model.trim().is_empty() {
            return Err(anyhow::anyhow!("Model name must not be empty"));
        }

        if self.model_timeout.is_zero() {
            return Err(anyhow::anyhow!("Model timeout must be at least 1 second"));
        }

        if self.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Upload limit must be greater than zero"));
        }

        std::fs::create_dir_all(&self.upload_dir).with_context(|| {
            format!(
                "Failed to create upload folder: {}",
                self.upload_dir.display()
            )
        })?;

        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config(upload_dir: PathBuf) -> AppConfig {
        AppConfig {
            api_key: "test-key".to_string(),
            upload_dir,
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.port, 5000);
        assert_eq!(config.model_timeout, Duration::from_secs(50));
        assert_eq!(config.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
    }

    #[test]
    fn test_validate_requires_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path().join("uploads"));
        config.api_key = "  ".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("API_KEY"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path().join("uploads"));
        config.model_timeout = Duration::ZERO;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_creates_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("a").join("uploads");
        let config = valid_config(uploads.clone());

        config.validate().unwrap();
        assert!(uploads.is_dir());
    }

    #[test]
    fn test_bind_addr() {
        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..AppConfig::default()
        };
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:8080");

        let config = AppConfig {
            host: "not a host".to_string(),
            ..AppConfig::default()
        };
        assert!(config.bind_addr().is_err());
    }
}
