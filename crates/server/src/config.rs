use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_FILE: &str = "feedgate.toml";
const DEFAULT_MAX_ITEMS: usize = 50;
const DEFAULT_TEXT_MAX_BYTES: usize = 256 * 1024;
const DEFAULT_STREAM_MAX_BYTES: usize = 128 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{operation} '{path}': {source}")]
    Io {
        operation: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Returns the default data path based on build profile.
/// - Debug builds: `./data` (relative to project directory)
/// - Release builds: `/data` (absolute path for production)
pub fn default_data_path() -> PathBuf {
    #[cfg(debug_assertions)]
    {
        PathBuf::from("./data")
    }

    #[cfg(not(debug_assertions))]
    {
        PathBuf::from("/data")
    }
}

/// How a feed's size is bounded while fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// Buffer and parse the whole feed, then drop surplus items.
    #[default]
    Full,
    /// Read up to a byte budget and cut the raw text at an item boundary.
    #[serde(rename = "text")]
    TextTruncate,
    /// Read chunks until the byte budget runs out, then cut at the last
    /// complete item. Item count is bounded by the budget, not `max_items`.
    #[serde(rename = "stream")]
    StreamTruncate,
}

impl FetchStrategy {
    pub fn default_max_bytes(&self) -> usize {
        match self {
            FetchStrategy::Full => usize::MAX,
            FetchStrategy::TextTruncate => DEFAULT_TEXT_MAX_BYTES,
            FetchStrategy::StreamTruncate => DEFAULT_STREAM_MAX_BYTES,
        }
    }
}

/// One feed as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    #[serde(default)]
    pub strategy: FetchStrategy,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<usize>,
}

fn default_max_items() -> usize {
    DEFAULT_MAX_ITEMS
}

/// A feed with all limits resolved, ready for fetching. Per-request
/// overrides are applied onto a copy of this.
#[derive(Debug, Clone)]
pub struct FeedDescriptor {
    pub id: String,
    pub url: String,
    pub strategy: FetchStrategy,
    pub max_items: usize,
    pub max_bytes: usize,
}

/// On-disk configuration shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileSettings {
    #[serde(default = "default_base_url")]
    base_url: String,
    #[serde(default = "default_token_key")]
    token_key: String,
    #[serde(default)]
    feeds: BTreeMap<String, FeedConfig>,
}

fn default_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_token_key() -> String {
    "feedgate".to_string()
}

impl Default for FileSettings {
    fn default() -> Self {
        let mut feeds = BTreeMap::new();
        feeds.insert(
            "verge".to_string(),
            FeedConfig {
                url: "https://www.theverge.com/rss/full.xml".to_string(),
                strategy: FetchStrategy::Full,
                max_items: DEFAULT_MAX_ITEMS,
                max_bytes: None,
            },
        );
        feeds.insert(
            "daily".to_string(),
            FeedConfig {
                url: "http://feeds.simplecast.com/54nAGcIl".to_string(),
                strategy: FetchStrategy::Full,
                max_items: DEFAULT_MAX_ITEMS,
                max_bytes: None,
            },
        );
        Self {
            base_url: default_base_url(),
            token_key: default_token_key(),
            feeds,
        }
    }
}

/// Immutable process configuration, loaded once at startup and passed
/// explicitly to everything that needs it.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_path: PathBuf,
    pub database_url: String,
    /// Absolute prefix for rewritten proxy links, without a trailing slash.
    pub base_url: String,
    pub token_key: String,
    pub feeds: BTreeMap<String, FeedConfig>,
}

impl Config {
    /// Load configuration from `{data_path}/feedgate.toml`, creating the
    /// file with defaults on first run. The parsed settings are written
    /// back so new fields gain their defaults on disk.
    pub async fn load(data_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data_path = data_path.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&data_path)
            .await
            .map_err(|e| ConfigError::Io {
                operation: "Failed to create data directory",
                path: data_path.display().to_string(),
                source: e,
            })?;

        let file = data_path.join(CONFIG_FILE);
        let settings = match tokio::fs::read_to_string(&file).await {
            Ok(content) => {
                let settings: FileSettings = toml::from_str(&content)?;
                Self::write_atomically(&file, &settings).await?;
                settings
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let default = FileSettings::default();
                Self::write_atomically(&file, &default).await?;
                tracing::info!("wrote default configuration to {}", file.display());
                default
            }
            Err(e) => {
                return Err(ConfigError::Io {
                    operation: "Failed to read config file",
                    path: file.display().to_string(),
                    source: e,
                })
            }
        };

        Ok(Self::from_settings(data_path, settings))
    }

    fn from_settings(data_path: PathBuf, settings: FileSettings) -> Self {
        let database_url = format!(
            "sqlite:{}?mode=rwc",
            data_path.join("feedgate.db").display()
        );
        Self {
            data_path,
            database_url,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token_key: settings.token_key,
            feeds: settings.feeds,
        }
    }

    /// Write settings to file atomically using temp file + rename pattern.
    async fn write_atomically(path: &Path, settings: &FileSettings) -> Result<(), ConfigError> {
        let toml_str = toml::to_string_pretty(settings)?;
        let tmp_path = path.with_extension("toml.tmp");
        tokio::fs::write(&tmp_path, &toml_str)
            .await
            .map_err(|e| ConfigError::Io {
                operation: "Failed to write config temp file",
                path: tmp_path.display().to_string(),
                source: e,
            })?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| ConfigError::Io {
                operation: "Failed to rename config file",
                path: path.display().to_string(),
                source: e,
            })?;
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_path.join(CONFIG_FILE)
    }

    /// Resolve a feed id to a descriptor with limits filled in.
    pub fn feed(&self, id: &str) -> Option<FeedDescriptor> {
        self.feeds.get(id).map(|feed| FeedDescriptor {
            id: id.to_string(),
            url: feed.url.clone(),
            strategy: feed.strategy,
            max_items: feed.max_items,
            max_bytes: feed
                .max_bytes
                .unwrap_or_else(|| feed.strategy.default_max_bytes()),
        })
    }

    pub fn feed_ids(&self) -> Vec<String> {
        self.feeds.keys().cloned().collect()
    }
}
