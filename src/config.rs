//! Server configuration module
//!
//! Parses and manages the game server configuration from YAML files.
//! Every field has a default, so an empty document is a valid config.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::core::SERVER_TICK_RATE;
use crate::network::codec::{DEFAULT_MAX_FRAME_SIZE, HEADER_LEN};

/// Client widths the game can be started at.
pub const SUPPORTED_RESOLUTIONS: [i32; 4] = [800, 1280, 1366, 1920];

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    // ============================================
    // Listener
    // ============================================
    #[serde(default = "default_ip")]
    pub ip: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    // ============================================
    // Tick & timeouts
    // ============================================
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Inactivity deadline, refreshed by every accepted packet
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i64,

    /// How long a disconnecting connection keeps flushing
    #[serde(default = "default_disconnect_grace_ms")]
    pub disconnect_grace_ms: i64,

    // ============================================
    // Flood & abuse protection
    // ============================================
    /// Decoded packets allowed per flood window
    #[serde(default = "default_max_packet")]
    pub max_packet: u32,

    #[serde(default = "default_flood_window_secs")]
    pub flood_window_secs: u64,

    /// Block applied on flood, malformed frames and oversized payloads
    #[serde(default = "default_flood_block_secs")]
    pub flood_block_secs: u64,

    /// Block applied to every accepted address (0 disables)
    #[serde(default = "default_ip_block_secs")]
    pub ip_block_secs: u64,

    /// Size of the recent-packet ring used in abuse reports
    #[serde(default = "default_recent_packets")]
    pub recent_packets: usize,

    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    #[serde(default = "default_max_chat_length")]
    pub max_chat_length: usize,

    #[serde(default = "default_max_npc_key_length")]
    pub max_npc_key_length: usize,

    // ============================================
    // Game settings
    // ============================================
    /// Minimum time between logout and the next start game (0 disables)
    #[serde(default)]
    pub relog_delay_ms: i64,

    /// Client resolution sent with a successful start game
    #[serde(default = "default_resolution")]
    pub resolution: i32,

    #[serde(default)]
    pub check_version: bool,

    /// Accepted client hashes, hex encoded
    #[serde(default)]
    pub version_hashes: Vec<String>,

    /// Client binaries whose MD5 is also accepted
    #[serde(default)]
    pub version_files: Vec<String>,

    // ============================================
    // Administrative switches
    // ============================================
    #[serde(default = "default_true")]
    pub allow_new_account: bool,

    #[serde(default = "default_true")]
    pub allow_change_password: bool,

    #[serde(default = "default_true")]
    pub allow_login: bool,

    #[serde(default = "default_true")]
    pub allow_new_character: bool,

    #[serde(default = "default_true")]
    pub allow_delete_character: bool,

    #[serde(default = "default_true")]
    pub allow_start_game: bool,
}

// ============================================
// Default value functions
// These are called by serde when a field is missing
// ============================================

fn default_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7000
}

fn default_max_connections() -> usize {
    1024
}

fn default_tick_interval_ms() -> u64 {
    SERVER_TICK_RATE.as_millis() as u64
}

fn default_timeout_ms() -> i64 {
    10_000
}

fn default_disconnect_grace_ms() -> i64 {
    500
}

fn default_max_packet() -> u32 {
    200
}

fn default_flood_window_secs() -> u64 {
    5
}

fn default_flood_block_secs() -> u64 {
    24 * 60 * 60
}

fn default_ip_block_secs() -> u64 {
    5
}

fn default_recent_packets() -> usize {
    10
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_max_chat_length() -> usize {
    80
}

fn default_max_npc_key_length() -> usize {
    30
}

fn default_resolution() -> i32 {
    1280
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: default_ip(),
            port: default_port(),
            max_connections: default_max_connections(),
            tick_interval_ms: default_tick_interval_ms(),
            timeout_ms: default_timeout_ms(),
            disconnect_grace_ms: default_disconnect_grace_ms(),
            max_packet: default_max_packet(),
            flood_window_secs: default_flood_window_secs(),
            flood_block_secs: default_flood_block_secs(),
            ip_block_secs: default_ip_block_secs(),
            recent_packets: default_recent_packets(),
            max_frame_size: default_max_frame_size(),
            max_chat_length: default_max_chat_length(),
            max_npc_key_length: default_max_npc_key_length(),
            relog_delay_ms: 0,
            resolution: default_resolution(),
            check_version: false,
            version_hashes: Vec::new(),
            version_files: Vec::new(),
            allow_new_account: true,
            allow_change_password: true,
            allow_login: true,
            allow_new_character: true,
            allow_delete_character: true,
            allow_start_game: true,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ServerConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML in {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a YAML string
    ///
    /// Useful for testing
    pub fn from_str(contents: &str) -> Result<Self> {
        let config: ServerConfig = serde_yaml::from_str(contents).context("Failed to parse YAML")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.ip.is_empty(), "ip cannot be empty");
        anyhow::ensure!(self.max_connections > 0, "max_connections must be positive");
        anyhow::ensure!(self.tick_interval_ms > 0, "tick_interval_ms must be positive");
        anyhow::ensure!(self.timeout_ms > 0, "timeout_ms must be positive");
        anyhow::ensure!(
            self.disconnect_grace_ms >= 0,
            "disconnect_grace_ms cannot be negative"
        );
        anyhow::ensure!(self.flood_window_secs > 0, "flood_window_secs must be positive");
        anyhow::ensure!(
            self.max_frame_size > HEADER_LEN && self.max_frame_size <= u16::MAX as usize,
            "max_frame_size out of range: {} (must be {}..={})",
            self.max_frame_size,
            HEADER_LEN + 1,
            u16::MAX
        );
        anyhow::ensure!(self.relog_delay_ms >= 0, "relog_delay_ms cannot be negative");
        anyhow::ensure!(
            SUPPORTED_RESOLUTIONS.contains(&self.resolution),
            "unsupported resolution: {} (expected one of {:?})",
            self.resolution,
            SUPPORTED_RESOLUTIONS
        );

        for hash in &self.version_hashes {
            hex::decode(hash).with_context(|| format!("version hash is not hex: {}", hash))?;
        }

        if self.check_version {
            anyhow::ensure!(
                !self.version_hashes.is_empty() || !self.version_files.is_empty(),
                "check_version requires version_hashes or version_files"
            );
        }

        Ok(())
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(&self).context("Failed to serialize config to YAML")?;

        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write config to {}", path.as_ref().display()))?;

        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.ip, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.ip, self.port))
    }

    /// Every accepted client hash: the configured hex values followed by the
    /// MD5 of each configured client binary.
    pub fn accepted_version_hashes(&self) -> Result<Vec<Vec<u8>>> {
        let mut hashes = Vec::with_capacity(self.version_hashes.len() + self.version_files.len());

        for hash in &self.version_hashes {
            hashes.push(hex::decode(hash).with_context(|| format!("version hash is not hex: {}", hash))?);
        }

        for file in &self.version_files {
            let bytes = fs::read(file).with_context(|| format!("Failed to read client binary: {}", file))?;
            let mut hasher = Md5::new();
            hasher.update(&bytes);
            let digest = hasher.finalize().to_vec();
            tracing::info!("[config] version_file={} md5={}", file, hex::encode(&digest));
            hashes.push(digest);
        }

        Ok(hashes)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn flood_window(&self) -> Duration {
        Duration::from_secs(self.flood_window_secs)
    }

    pub fn flood_block(&self) -> Duration {
        Duration::from_secs(self.flood_block_secs)
    }

    pub fn ip_block(&self) -> Duration {
        Duration::from_secs(self.ip_block_secs)
    }
}
