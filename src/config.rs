//! Run configuration.
//!
//! A run's configuration is assembled once, with precedence defaults →
//! configuration file → command line, and then passed around immutably.
//! Configuration files may be TOML or JSON, found either at an explicit
//! `--config` path or in standard locations.

use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::cli::{Cli, VerbosityLevel};
use crate::error::{ConfigError, ConfigResult, FormatError};

/// Default indentation unit: four spaces.
pub const DEFAULT_INDENT: &str = "    ";

/// Default target encoding label.
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Immutable parameters of the formatting core itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatConfig {
    /// String prepended once per nesting level.
    pub indent: String,
    /// Target encoding label; the output declaration names its canonical
    /// form and file bytes are decoded/encoded as this encoding.
    pub encoding: String,
    /// When set, files with validation messages are not rewritten.
    pub strict_validation: bool,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            indent: DEFAULT_INDENT.to_string(),
            encoding: DEFAULT_ENCODING.to_string(),
            strict_validation: false,
        }
    }
}

impl FormatConfig {
    /// Resolve the configured encoding label.
    pub fn encoding(&self) -> Result<&'static Encoding, FormatError> {
        Encoding::for_label(self.encoding.as_bytes()).ok_or_else(|| {
            FormatError::UnknownEncoding {
                label: self.encoding.clone(),
            }
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !self.indent.chars().all(|c| c == ' ' || c == '\t') {
            return Err(ConfigError::InvalidValue {
                field: "indent".to_string(),
                value: self.indent.clone(),
                reason: "must contain only spaces and tabs".to_string(),
            });
        }
        if Encoding::for_label(self.encoding.as_bytes()).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "encoding".to_string(),
                value: self.encoding.clone(),
                reason: "unknown encoding label".to_string(),
            });
        }
        Ok(())
    }
}

/// Which files a run looks at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilesConfig {
    pub extensions: Vec<String>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["xml".to_string()],
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Run-level switches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    pub dry_run: bool,
    pub backup: bool,
    pub validate: bool,
    pub fail_fast: bool,
    pub threads: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            backup: false,
            validate: true,
            fail_fast: false,
            threads: num_cpus::get(),
        }
    }
}

/// Output preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OutputPrefs {
    pub verbose: bool,
    pub quiet: bool,
}

impl OutputPrefs {
    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Fully resolved configuration for one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    pub formatting: FormatConfig,
    pub files: FilesConfig,
    pub run: RunConfig,
    pub output: OutputPrefs,
}

/// Partial configuration as read from a file; absent fields fall through to
/// the layer below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub formatting: FormattingSection,
    pub files: FilesSection,
    pub run: RunSection,
    pub output: OutputSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormattingSection {
    pub indent: Option<String>,
    pub encoding: Option<String>,
    pub strict: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesSection {
    pub extensions: Option<Vec<String>>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub backup: Option<bool>,
    pub validate: Option<bool>,
    pub fail_fast: Option<bool>,
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub verbose: Option<bool>,
    pub quiet: Option<bool>,
}

/// Loads and merges configuration layers.
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults → file → CLI.
    pub async fn load_config(cli: &Cli) -> ConfigResult<AppConfig> {
        let file = if let Some(path) = &cli.config {
            Some(Self::load_from_file(path).await?)
        } else {
            Self::load_from_standard_locations().await?
        };

        let config = Self::resolve(cli, file.unwrap_or_default());
        config.formatting.validate()?;
        Ok(config)
    }

    /// Read one configuration file, dispatching on its extension.
    pub async fn load_from_file(path: &Path) -> ConfigResult<ConfigFile> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// Probe `./format-xml.toml`, then the user configuration directory.
    async fn load_from_standard_locations() -> ConfigResult<Option<ConfigFile>> {
        let mut candidates = vec![PathBuf::from("format-xml.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("format-xml").join("config.toml"));
        }

        for candidate in candidates {
            if fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(Some(Self::load_from_file(&candidate).await?));
            }
        }
        Ok(None)
    }

    fn resolve(cli: &Cli, file: ConfigFile) -> AppConfig {
        let defaults = AppConfig::default();

        let formatting = FormatConfig {
            indent: cli
                .indent
                .clone()
                .or(file.formatting.indent)
                .unwrap_or(defaults.formatting.indent),
            encoding: cli
                .encoding
                .clone()
                .or(file.formatting.encoding)
                .unwrap_or(defaults.formatting.encoding),
            strict_validation: cli.strict
                || file.formatting.strict.unwrap_or(defaults.formatting.strict_validation),
        };

        let files = FilesConfig {
            extensions: cli
                .extension_list()
                .or(file.files.extensions)
                .unwrap_or(defaults.files.extensions),
            include_patterns: if cli.include_patterns.is_empty() {
                file.files.include.unwrap_or_default()
            } else {
                cli.include_patterns.clone()
            },
            exclude_patterns: if cli.exclude_patterns.is_empty() {
                file.files.exclude.unwrap_or_default()
            } else {
                cli.exclude_patterns.clone()
            },
        };

        let run = RunConfig {
            dry_run: cli.dry_run,
            backup: cli.backup || file.run.backup.unwrap_or(defaults.run.backup),
            validate: if cli.no_validate {
                false
            } else {
                file.run.validate.unwrap_or(defaults.run.validate)
            },
            fail_fast: cli.fail_fast || file.run.fail_fast.unwrap_or(defaults.run.fail_fast),
            threads: cli
                .threads
                .or(file.run.threads)
                .filter(|threads| *threads > 0)
                .unwrap_or(defaults.run.threads),
        };

        let output = OutputPrefs {
            verbose: cli.verbose || file.output.verbose.unwrap_or(false),
            quiet: cli.quiet || file.output.quiet.unwrap_or(false),
        };

        AppConfig {
            formatting,
            files,
            run,
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use tempfile::TempDir;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["format-xml"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_format_config_defaults() {
        let config = FormatConfig::default();
        assert_eq!(config.indent, "    ");
        assert_eq!(config.encoding, "UTF-8");
        assert!(!config.strict_validation);
    }

    #[test]
    fn test_encoding_resolution() {
        let config = FormatConfig::default();
        assert_eq!(config.encoding().unwrap().name(), "UTF-8");

        let latin = FormatConfig {
            encoding: "iso-8859-1".to_string(),
            ..FormatConfig::default()
        };
        // encoding_rs folds ISO-8859-1 into its windows-1252 decoder.
        assert!(latin.encoding().is_ok());

        let bogus = FormatConfig {
            encoding: "UTF-9".to_string(),
            ..FormatConfig::default()
        };
        assert!(matches!(
            bogus.encoding(),
            Err(FormatError::UnknownEncoding { .. })
        ));
    }

    #[test]
    fn test_indent_must_be_whitespace() {
        let config = FormatConfig {
            indent: "ab".to_string(),
            ..FormatConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let tabs = FormatConfig {
            indent: "\t".to_string(),
            ..FormatConfig::default()
        };
        assert!(tabs.validate().is_ok());
    }

    #[tokio::test]
    async fn test_defaults_without_any_file() {
        let config = ConfigManager::resolve(&cli(&["."]), ConfigFile::default());
        assert_eq!(config, AppConfig::default());
    }

    #[tokio::test]
    async fn test_cli_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        tokio::fs::write(
            &config_path,
            "[formatting]\nindent = \"  \"\nencoding = \"windows-1252\"\n",
        )
        .await
        .unwrap();

        let file = ConfigManager::load_from_file(&config_path).await.unwrap();
        let config = ConfigManager::resolve(&cli(&[".", "--indent", "\t"]), file);

        // CLI wins for indent, file wins for encoding.
        assert_eq!(config.formatting.indent, "\t");
        assert_eq!(config.formatting.encoding, "windows-1252");
    }

    #[tokio::test]
    async fn test_json_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(
            &config_path,
            r#"{"run": {"backup": true}, "files": {"extensions": ["xml", "xsd"]}}"#,
        )
        .await
        .unwrap();

        let file = ConfigManager::load_from_file(&config_path).await.unwrap();
        let config = ConfigManager::resolve(&cli(&["."]), file);
        assert!(config.run.backup);
        assert_eq!(config.files.extensions, vec!["xml", "xsd"]);
    }

    #[tokio::test]
    async fn test_unsupported_config_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        tokio::fs::write(&config_path, "run: {}").await.unwrap();

        let result = ConfigManager::load_from_file(&config_path).await;
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_missing_config_file() {
        let result = ConfigManager::load_from_file(Path::new("/nonexistent/config.toml")).await;
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_no_validate_flag_wins() {
        let mut file = ConfigFile::default();
        file.run.validate = Some(true);
        let config = ConfigManager::resolve(&cli(&[".", "--no-validate"]), file);
        assert!(!config.run.validate);
    }

    #[test]
    fn test_zero_threads_falls_back_to_default() {
        let mut file = ConfigFile::default();
        file.run.threads = Some(0);
        let config = ConfigManager::resolve(&cli(&["."]), file);
        assert!(config.run.threads > 0);
    }
}
