use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use dietsync_core::EngineConfig;
use dietsync_core::engine::{DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT};

pub struct Config {
    pub data_dir: PathBuf,
    /// Server-side store used by `dietsync serve` and `dietsync user`.
    pub server_db_path: PathBuf,
    /// Local cache of the signed-in user's last known values.
    pub cache_path: PathBuf,
    pub profile_path: PathBuf,
}

/// Connection details saved by `dietsync login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientProfile {
    pub server_url: String,
    pub token: String,
    pub user_id: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

impl ClientProfile {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "dietsync").context("Could not determine home directory")?;
        Self::at(proj_dirs.data_dir())
    }

    /// Use `data_dir` instead of the platform default.
    pub fn at(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            data_dir: data_dir.to_path_buf(),
            server_db_path: data_dir.join("server.db"),
            cache_path: data_dir.join("cache.db"),
            profile_path: data_dir.join("client.json"),
        })
    }

    pub fn load_profile(&self) -> Result<Option<ClientProfile>> {
        if !self.profile_path.exists() {
            return Ok(None);
        }
        let raw =
            std::fs::read_to_string(&self.profile_path).context("Failed to read client profile")?;
        let profile = serde_json::from_str(&raw).with_context(|| {
            format!("Invalid client profile: {}", self.profile_path.display())
        })?;
        Ok(Some(profile))
    }

    pub fn require_profile(&self) -> Result<ClientProfile> {
        self.load_profile()?
            .context("Not logged in. Run `dietsync login` first")
    }

    /// Write the profile, readable only by the owner since it holds the token.
    /// The file is restricted before any of the token is written to it.
    pub fn save_profile(&self, profile: &ClientProfile) -> Result<()> {
        use std::io::Write;

        let raw = serde_json::to_string_pretty(profile)?;
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            options.mode(0o600);
            // `mode` only applies when the file is created.
            if self.profile_path.exists() {
                std::fs::set_permissions(
                    &self.profile_path,
                    std::fs::Permissions::from_mode(0o600),
                )
                .context("Failed to set client profile permissions")?;
            }
        }

        let mut file = options
            .open(&self.profile_path)
            .context("Failed to open client profile")?;
        file.write_all(raw.as_bytes())
            .context("Failed to write client profile")?;
        Ok(())
    }

    pub fn remove_profile(&self) -> Result<bool> {
        if !self.profile_path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.profile_path).context("Failed to remove client profile")?;
        Ok(true)
    }
}

/// A fresh 256-bit bearer token, hex encoded.
pub fn generate_token() -> String {
    use rand::Rng;
    use std::fmt::Write;

    let bytes: [u8; 32] = rand::rng().random();
    bytes
        .iter()
        .fold(String::with_capacity(64), |mut acc: String, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}
