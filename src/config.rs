//! Site configuration management.
//!
//! Handles loading, parsing, and validating the `cloister.toml`
//! configuration file.

use crate::cli::{Cli, Commands};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Default values for serde deserialization
mod defaults {
    pub mod site {
        pub fn name() -> String {
            "Example".into()
        }
        pub fn description() -> String {
            "This is a simple example website".into()
        }
        pub fn style() -> String {
            "default".into()
        }
    }

    pub mod content {
        use std::path::PathBuf;

        pub fn root() -> PathBuf {
            "content".into()
        }
    }

    pub mod serve {
        pub fn interface() -> String {
            "127.0.0.1".into()
        }
        pub fn port() -> u16 {
            8080
        }
    }
}

/// Top-level configuration object.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    pub site: SiteSection,
    pub content: ContentSection,
    pub serve: ServeSection,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site: SiteSection::default(),
            content: ContentSection::default(),
            serve: ServeSection::default(),
        }
    }
}

/// Site identity shown to readers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteSection {
    pub name: String,
    pub description: String,
    /// Stylesheet reference injected into served pages. Empty disables it.
    pub style: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            name: defaults::site::name(),
            description: defaults::site::description(),
            style: defaults::site::style(),
        }
    }
}

/// Where the content documents live.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContentSection {
    pub root: PathBuf,
}

impl Default for ContentSection {
    fn default() -> Self {
        Self {
            root: defaults::content::root(),
        }
    }
}

/// HTTP front-end settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServeSection {
    pub interface: String,
    pub port: u16,
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            interface: defaults::serve::interface(),
            port: defaults::serve::port(),
        }
    }
}

impl SiteConfig {
    /// Load configuration from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Apply command-line overrides on top of the file values.
    pub fn update_with_cli(&mut self, cli: &Cli) {
        if let Some(root) = &cli.root {
            self.content.root = root.clone();
        }

        if let Commands::Serve { interface, port } = &cli.command {
            if let Some(interface) = interface {
                self.serve.interface = interface.clone();
            }
            if let Some(port) = port {
                self.serve.port = *port;
            }
        }
    }

    /// Validate the configuration before the server starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.content.root.is_dir() {
            return Err(ConfigError::Validation(format!(
                "content root `{}` is not a directory",
                self.content.root.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_defaults() {
        let config = SiteConfig::default();
        assert_eq!(config.site.name, "Example");
        assert_eq!(config.content.root, PathBuf::from("content"));
        assert_eq!(config.serve.interface, "127.0.0.1");
        assert_eq!(config.serve.port, 8080);
    }

    #[test]
    fn test_parse_partial_toml_fills_defaults() {
        let config: SiteConfig = toml::from_str(
            r#"
            [site]
            name = "My Site"

            [serve]
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.site.name, "My Site");
        assert_eq!(config.site.style, "default");
        assert_eq!(config.content.root, PathBuf::from("content"));
        assert_eq!(config.serve.port, 9000);
        assert_eq!(config.serve.interface, "127.0.0.1");
    }

    #[test]
    fn test_validate_missing_root() {
        let mut config = SiteConfig::default();
        config.content.root = PathBuf::from("/definitely/not/a/real/dir");

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_config_error_display() {
        let io_err = ConfigError::Io(
            PathBuf::from("cloister.toml"),
            Error::new(ErrorKind::NotFound, "file not found"),
        );
        let display = format!("{io_err}");
        assert!(display.contains("IO error"));
        assert!(display.contains("cloister.toml"));

        let validation_err = ConfigError::Validation("Test validation error".to_string());
        let display = format!("{validation_err}");
        assert!(display.contains("Test validation error"));
    }
}
