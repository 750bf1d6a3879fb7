use nextbin_workspace::Timings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_NAME: &str = "nextbin.config.json";

/// Nextbin configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Where the scratch session is kept between runs
    #[serde(default = "default_session_file")]
    pub session_file: String,

    /// Root of the local snippet store
    #[serde(default = "default_snippet_dir")]
    pub snippet_dir: String,

    /// Identity that owns saved snippets; anonymous when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default)]
    pub timings: Timings,
}

fn default_session_file() -> String {
    ".nextbin/session.json".to_string()
}

fn default_snippet_dir() -> String {
    ".nextbin/snippets".to_string()
}

impl Config {
    /// Load config from a directory
    pub fn load(cwd: &Path) -> anyhow::Result<Self> {
        let config_path = cwd.join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn session_path(&self, cwd: &Path) -> PathBuf {
        cwd.join(&self.session_file)
    }

    pub fn snippet_dir(&self, cwd: &Path) -> PathBuf {
        cwd.join(&self.snippet_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_file: default_session_file(),
            snippet_dir: default_snippet_dir(),
            user: None,
            timings: Timings::default(),
        }
    }
}
