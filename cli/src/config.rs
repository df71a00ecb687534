//! Configuration and file locations for the mixer CLI
//!
//! Settings come from `~/.mixer/config.json` (or `--config`), then from
//! `MIXER_*` environment variables. A missing file means all defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::chain::JsonRpcChain;
use crate::crypto::DEFAULT_TREE_DEPTH;
use crate::timer::GateConfig;
use crate::types::{is_valid_address, Field};

/// Default directory for mixer state
const MIXER_DIR: &str = ".mixer";
const CONFIG_FILE: &str = "config.json";
const VAULT_FILE: &str = "deposits.enc";
const ARTIFACTS_DIR: &str = "artifacts";

/// Wei per ether
const ETHER_DECIMALS: usize = 18;

/// Get the mixer directory path
pub fn mixer_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(MIXER_DIR))
        .context("Could not find home directory")
}

pub fn config_file() -> Result<PathBuf> {
    Ok(mixer_dir()?.join(CONFIG_FILE))
}

pub fn vault_file() -> Result<PathBuf> {
    Ok(mixer_dir()?.join(VAULT_FILE))
}

pub fn artifacts_dir() -> Result<PathBuf> {
    Ok(mixer_dir()?.join(ARTIFACTS_DIR))
}

fn default_artifact(name: &str) -> String {
    artifacts_dir()
        .unwrap_or_else(|_| PathBuf::from(MIXER_DIR).join(ARTIFACTS_DIR))
        .join(name)
        .to_string_lossy()
        .into_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub mixer_address: Option<String>,
    /// Per-request timeout for node calls
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: 1337,
            mixer_address: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayerConfig {
    pub url: String,
    /// Account that broadcasts the withdrawal and collects the fee
    pub broadcaster_address: Option<String>,
    /// Fee paid to the broadcaster, in ether
    pub fee_eth: String,
    pub timeout_secs: u64,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080".to_string(),
            broadcaster_address: None,
            fee_eth: "0.0015".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Locations of the proving artifacts (URLs or local paths)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub circuit: String,
    pub proving_key: String,
    pub verification_key: String,
    pub tree_depth: usize,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            circuit: default_artifact("circuit.json"),
            proving_key: default_artifact("proving_key.bin"),
            verification_key: default_artifact("verification_key.json"),
            tree_depth: DEFAULT_TREE_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimerConfig {
    /// Midnight policy when true, fixed delay otherwise
    pub production: bool,
    pub fixed_delay_seconds: u64,
    /// Start a withdrawal by itself for deposits already past their expiry
    pub auto_withdraw_past_deposits: bool,
    pub poll_interval_secs: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            production: true,
            fixed_delay_seconds: 30,
            auto_withdraw_past_deposits: false,
            poll_interval_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MixerConfig {
    pub network: NetworkConfig,
    pub relayer: RelayerConfig,
    pub artifacts: ArtifactsConfig,
    pub timer: TimerConfig,
}

impl MixerConfig {
    /// Load from `path` (or the default location) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_file()?,
        };

        let mut config = if path.exists() {
            let json = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&json).context("Failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MIXER_RPC_URL") {
            self.network.rpc_url = v;
        }
        if let Some(v) = lookup("MIXER_CHAIN_ID") {
            self.network.chain_id = v.parse().context("MIXER_CHAIN_ID must be an integer")?;
        }
        if let Some(v) = lookup("MIXER_ADDRESS") {
            self.network.mixer_address = Some(v);
        }
        if let Some(v) = lookup("MIXER_RELAYER_URL") {
            self.relayer.url = v;
        }
        if let Some(v) = lookup("MIXER_BROADCASTER_ADDRESS") {
            self.relayer.broadcaster_address = Some(v);
        }
        if let Some(v) = lookup("MIXER_FEE_ETH") {
            self.relayer.fee_eth = v;
        }
        if let Some(v) = lookup("MIXER_PRODUCTION") {
            self.timer.production = parse_bool(&v).context("MIXER_PRODUCTION must be true or false")?;
        }
        if let Some(v) = lookup("MIXER_FIXED_DELAY_SECONDS") {
            self.timer.fixed_delay_seconds = v
                .parse()
                .context("MIXER_FIXED_DELAY_SECONDS must be an integer")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(address) = &self.network.mixer_address {
            if !is_valid_address(address) {
                bail!("Invalid mixer address: {}", address);
            }
        }
        if let Some(address) = &self.relayer.broadcaster_address {
            if !is_valid_address(address) {
                bail!("Invalid broadcaster address: {}", address);
            }
        }
        parse_ether(&self.relayer.fee_eth).context("Invalid relayer fee")?;
        if self.artifacts.tree_depth == 0 || self.artifacts.tree_depth > 32 {
            bail!("Tree depth must be between 1 and 32");
        }
        if self.network.timeout_secs == 0 || self.relayer.timeout_secs == 0 {
            bail!("Timeouts must be at least one second");
        }
        if self.timer.poll_interval_secs == 0 {
            bail!("Poll interval must be at least one second");
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create mixer directory")?;
        }
        let json = serde_json::to_string_pretty(self)?;

        // Set restrictive permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::write(path, &json)?;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(path, &json)?;
        }

        Ok(())
    }

    pub fn mixer_address(&self) -> Result<&str> {
        self.network.mixer_address.as_deref().context(
            "Mixer address not configured. Set MIXER_ADDRESS or network.mixer_address in the config file",
        )
    }

    pub fn broadcaster_address(&self) -> Result<&str> {
        self.relayer.broadcaster_address.as_deref().context(
            "Broadcaster address not configured. Set MIXER_BROADCASTER_ADDRESS or relayer.broadcaster_address",
        )
    }

    /// Node client for the configured network
    pub fn chain(&self, mixer_address: &str) -> Result<JsonRpcChain> {
        JsonRpcChain::new(
            &self.network.rpc_url,
            self.network.chain_id,
            mixer_address,
            Duration::from_secs(self.network.timeout_secs),
        )
        .with_context(|| format!("Invalid RPC endpoint {}", self.network.rpc_url))
    }

    pub fn fee_wei(&self) -> Result<Field> {
        parse_ether(&self.relayer.fee_eth)
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            use_midnight_policy: self.timer.production,
            fixed_delay_seconds: self.timer.fixed_delay_seconds,
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => bail!("not a boolean: {}", other),
    }
}

/// Convert a decimal ether amount to wei without floating point
///
/// Stricter than `ethers::utils::parse_ether`, which truncates digits past
/// the 18th decimal and accepts signs and underscores.
pub fn parse_ether(amount: &str) -> Result<Field> {
    let amount = amount.trim();
    let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));

    if whole.is_empty() && fraction.is_empty() {
        bail!("empty amount");
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        bail!("invalid amount: {}", amount);
    }
    if fraction.len() > ETHER_DECIMALS {
        bail!("too many decimal places (max {}): {}", ETHER_DECIMALS, amount);
    }

    let wei = ethers::utils::parse_ether(amount)
        .map_err(|e| anyhow::anyhow!("invalid amount {}: {}", amount, e))?;
    Ok(Field::from(wei))
}

/// Format wei as ether, trimming trailing zeros
pub fn format_ether(wei: &Field) -> String {
    let Some(wei) = wei.to_u256() else {
        return format!("{} wei", wei);
    };
    let formatted = ethers::utils::format_ether(wei);
    match formatted.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                whole.to_string()
            } else {
                format!("{}.{}", whole, fraction)
            }
        }
        None => formatted,
    }
}
