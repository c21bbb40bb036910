use crate::matter::pairing;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: main calls this before building the tokio runtime, while the
            // process is still single-threaded
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let mut value = value.trim();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            Some((key.trim(), value))
        })
        .collect()
}

/// How plugin devices are spread over server nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    /// One server node; every plugin's devices sit under a shared aggregator
    Bridge,
    /// One server node and aggregator per plugin
    ChildBridge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub matter: MatterConfig,
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatterConfig {
    pub vendor_id: u16,
    pub vendor_name: String,
    pub product_id: u16,
    pub product_name: String,
    /// First operational port; child bridges count up from here
    pub port: u16,
    /// Fixed commissioning credentials. Generated and stored per node if unset.
    pub discriminator: Option<u16>,
    pub passcode: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub name: String,
    pub mode: BridgeMode,
    /// Directory for persisted node contexts. `None` keeps them in memory.
    pub storage_dir: Option<PathBuf>,
    /// Shell command run by the software updater
    pub update_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            matter: MatterConfig {
                vendor_id: 0xFFF1,
                vendor_name: "Matterbridge".to_string(),
                product_id: 0x8000,
                product_name: "Matterbridge aggregator".to_string(),
                port: 5540,
                discriminator: None,
                passcode: None,
            },
            bridge: BridgeConfig {
                name: "Matterbridge".to_string(),
                mode: BridgeMode::Bridge,
                storage_dir: crate::storage::Storage::default_dir(),
                update_command: None,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from defaults overlaid with values from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(name) = lookup("BRIDGE_NAME") {
            config.bridge.name = name;
        }
        if let Some(mode) = lookup("BRIDGE_MODE") {
            match mode.parse() {
                Ok(m) => config.bridge.mode = m,
                Err(_) => log::warn!(
                    "[Config] Unknown BRIDGE_MODE '{}', using {}",
                    mode,
                    config.bridge.mode
                ),
            }
        }
        if let Some(dir) = lookup("BRIDGE_STORAGE_DIR") {
            config.bridge.storage_dir = if dir.is_empty() {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }
        if let Some(command) = lookup("BRIDGE_UPDATE_COMMAND")
            && !command.trim().is_empty()
        {
            config.bridge.update_command = Some(command);
        }

        if let Some(vendor_id) = lookup("MATTER_VENDOR_ID")
            && let Some(v) = parse_u16(&vendor_id)
        {
            config.matter.vendor_id = v;
        }
        if let Some(product_id) = lookup("MATTER_PRODUCT_ID")
            && let Some(p) = parse_u16(&product_id)
        {
            config.matter.product_id = p;
        }
        if let Some(port) = lookup("MATTER_PORT")
            && let Ok(p) = port.parse()
        {
            config.matter.port = p;
        }
        if let Some(discriminator) = lookup("MATTER_DISCRIMINATOR") {
            match discriminator.trim().parse::<u16>() {
                Ok(d) if pairing::is_valid_discriminator(d) => {
                    config.matter.discriminator = Some(d)
                }
                _ => log::warn!(
                    "[Config] Ignoring MATTER_DISCRIMINATOR '{}' (expected 0..={})",
                    discriminator,
                    pairing::MAX_DISCRIMINATOR
                ),
            }
        }
        if let Some(passcode) = lookup("MATTER_PASSCODE") {
            match passcode.trim().parse::<u32>() {
                Ok(p) if pairing::is_valid_passcode(p) => config.matter.passcode = Some(p),
                _ => log::warn!("[Config] Ignoring invalid MATTER_PASSCODE '{}'", passcode),
            }
        }

        config
    }
}

/// Parse decimal or `0x`-prefixed hex.
fn parse_u16(value: &str) -> Option<u16> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
