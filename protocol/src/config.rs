//! # Protocol Configuration & Constants
//!
//! Every bit-width, bound and domain string the authorization core depends
//! on lives here. Several of these are wire contracts with collaborators we
//! do not control (the proving circuit, the on-chain verifier, the limit
//! order protocol), so changing one is a coordinated release, not a tweak.
//!
//! [`ServiceConfig`] carries the runtime settings of a deployment. It is
//! loaded from a JSON file, then overridden from `UMBRA_*` environment
//! variables, then validated.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ethers_core::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

// ---------------------------------------------------------------------------
// Scalar Bounds
// ---------------------------------------------------------------------------

/// Smallest accepted secret scalar (price, amount, nonce).
///
/// Zero thresholds are meaningless and a zero nonce is a guessable one.
pub const MIN_SCALAR: u64 = 1;

/// Largest accepted secret scalar. The circuit range-checks differences to
/// 64 bits, so anything wider could wrap inside the field.
pub const MAX_SCALAR: u64 = u64::MAX;

/// Number of bits the circuit uses for its range checks.
pub const RANGE_BITS: usize = 64;

// ---------------------------------------------------------------------------
// Salt Layout
// ---------------------------------------------------------------------------

/// Bits of the commitment that survive inside a packed salt.
pub const COMMITMENT_BITS: usize = 96;

/// Bits of the extension hash carried in the low end of a packed salt.
/// Fixed by the limit order protocol's salt rule.
pub const EXTENSION_HASH_BITS: usize = 160;

// ---------------------------------------------------------------------------
// Proof Encoding
// ---------------------------------------------------------------------------

/// Number of public signals produced by the threshold circuit:
/// `[valid, commit, nonce, offeredPrice, offeredAmount]`.
pub const PUBLIC_SIGNAL_COUNT: usize = 5;

/// Scalars in an encoded proof: 2 (A) + 4 (B) + 2 (C) + 5 signals.
pub const PROOF_SCALARS: usize = 8 + PUBLIC_SIGNAL_COUNT;

/// Exact byte length of the verifier calldata blob.
pub const ENCODED_PROOF_LEN: usize = PROOF_SCALARS * 32;

/// Poseidon arity of the commitment hash. Hard contract with the circuit.
pub const COMMITMENT_ARITY: usize = 3;

// ---------------------------------------------------------------------------
// Limit Order Protocol
// ---------------------------------------------------------------------------

/// EIP-712 domain name of the aggregation router.
pub const EIP712_DOMAIN_NAME: &str = "1inch Aggregation Router";

/// EIP-712 domain version of the aggregation router.
pub const EIP712_DOMAIN_VERSION: &str = "6";

/// Router v6, deployed at the same address on every supported chain.
pub const DEFAULT_ROUTER_ADDRESS: &str = "0x111111125421cA6dc452d289314280a0f8842A65";

/// Signature of the predicate contract entry point that receives the proof.
pub const PREDICATE_CHECK_SIGNATURE: &str = "checkPredicate(bytes)";

/// Router helper that performs a static call and returns the uint result.
pub const ARBITRARY_STATIC_CALL_SIGNATURE: &str = "arbitraryStaticCall(address,bytes)";

/// Router helper comparing a static call result against a value.
pub const GT_SIGNATURE: &str = "gt(uint256,bytes)";

// ---------------------------------------------------------------------------
// Catalog Storage
// ---------------------------------------------------------------------------

/// Suffix appended to the catalog path to form its lock marker.
pub const LOCK_SUFFIX: &str = ".lock";

/// How long a writer waits for the catalog lock before giving up.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// A lock held longer than this is reported as stuck.
pub const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

/// First backoff step while waiting on the lock. Doubles up to
/// [`LOCK_MAX_BACKOFF`].
pub const LOCK_INITIAL_BACKOFF: Duration = Duration::from_millis(20);

/// Ceiling for the lock backoff.
pub const LOCK_MAX_BACKOFF: Duration = Duration::from_millis(400);

/// Format version written into every catalog document.
pub const CATALOG_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// Service Defaults
// ---------------------------------------------------------------------------

/// Default HTTP port of the exposure layer.
pub const DEFAULT_PORT: u16 = 3001;

/// Default number of concurrent proof generations.
pub const DEFAULT_PROVER_WORKERS: usize = 2;

/// Map a network name to its EVM chain id. Unknown names return `None`;
/// callers must then supply `chainId` explicitly.
pub fn chain_id_for_network(network: &str) -> Option<u64> {
    match network.to_ascii_lowercase().as_str() {
        "mainnet" | "ethereum" => Some(1),
        "sepolia" => Some(11_155_111),
        "base" => Some(8_453),
        "base-sepolia" => Some(84_532),
        "arbitrum" => Some(42_161),
        "optimism" => Some(10),
        "polygon" => Some(137),
        "localhost" | "hardhat" | "anvil" => Some(31_337),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a [`ServiceConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidConfig
    }
}

/// Runtime settings for one authorization service instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    /// Port of the HTTP exposure layer.
    pub port: u16,
    /// Network name, e.g. `base` or `sepolia`.
    pub network: String,
    /// Origins the exposure layer accepts for CORS.
    pub cors_origins: Vec<String>,
    /// Whether the process installs a tracing subscriber.
    pub enable_logging: bool,
    /// Explicit chain id. Derived from `network` when absent.
    pub chain_id: Option<u64>,
    /// Verifying contract of the EIP-712 domain.
    pub router_address: Address,
    /// Deployed ZK predicate contract.
    pub predicate_address: Address,
    /// Path of the catalog JSON document.
    pub catalog_path: PathBuf,
    /// Size of the proving worker pool.
    pub prover_workers: usize,
    /// Per-proof timeout. `None` waits indefinitely.
    pub proof_timeout_ms: Option<u64>,
    /// Catalog lock acquisition timeout.
    pub lock_timeout_ms: u64,
    /// Age after which a catalog lock is considered abandoned.
    pub lock_stale_after_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            network: "base".to_string(),
            cors_origins: vec!["http://localhost:3000".to_string()],
            enable_logging: true,
            chain_id: None,
            router_address: DEFAULT_ROUTER_ADDRESS
                .parse()
                .unwrap_or_else(|_| Address::zero()),
            predicate_address: Address::zero(),
            catalog_path: PathBuf::from("data/published-orders.json"),
            prover_workers: DEFAULT_PROVER_WORKERS,
            proof_timeout_ms: None,
            lock_timeout_ms: LOCK_TIMEOUT.as_millis() as u64,
            lock_stale_after_ms: LOCK_STALE_AFTER.as_millis() as u64,
        }
    }
}

impl ServiceConfig {
    /// Load a config from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply `UMBRA_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Split out from
    /// [`apply_env_overrides`](Self::apply_env_overrides) so tests do not
    /// have to mutate the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("UMBRA_PORT") {
            self.port = parse_value("UMBRA_PORT", &v)?;
        }
        if let Some(v) = lookup("UMBRA_NETWORK") {
            self.network = v;
        }
        if let Some(v) = lookup("UMBRA_CORS_ORIGINS") {
            self.cors_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("UMBRA_ENABLE_LOGGING") {
            self.enable_logging = parse_value("UMBRA_ENABLE_LOGGING", &v)?;
        }
        if let Some(v) = lookup("UMBRA_CHAIN_ID") {
            self.chain_id = Some(parse_value("UMBRA_CHAIN_ID", &v)?);
        }
        if let Some(v) = lookup("UMBRA_ROUTER_ADDRESS") {
            self.router_address = parse_value("UMBRA_ROUTER_ADDRESS", &v)?;
        }
        if let Some(v) = lookup("UMBRA_PREDICATE_ADDRESS") {
            self.predicate_address = parse_value("UMBRA_PREDICATE_ADDRESS", &v)?;
        }
        if let Some(v) = lookup("UMBRA_CATALOG_PATH") {
            self.catalog_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("UMBRA_PROVER_WORKERS") {
            self.prover_workers = parse_value("UMBRA_PROVER_WORKERS", &v)?;
        }
        if let Some(v) = lookup("UMBRA_PROOF_TIMEOUT_MS") {
            self.proof_timeout_ms = Some(parse_value("UMBRA_PROOF_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("UMBRA_LOCK_TIMEOUT_MS") {
            self.lock_timeout_ms = parse_value("UMBRA_LOCK_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("UMBRA_LOCK_STALE_AFTER_MS") {
            self.lock_stale_after_ms = parse_value("UMBRA_LOCK_STALE_AFTER_MS", &v)?;
        }
        Ok(())
    }

    /// Check cross-field consistency. Call after all overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(invalid("port", "must be non-zero"));
        }
        if self.prover_workers == 0 {
            return Err(invalid("proverWorkers", "must be at least 1"));
        }
        if self.lock_timeout_ms == 0 {
            return Err(invalid("lockTimeoutMs", "must be non-zero"));
        }
        if self.chain_id.is_none() && chain_id_for_network(&self.network).is_none() {
            return Err(invalid(
                "network",
                &format!("unknown network '{}' and no chainId given", self.network),
            ));
        }
        if self.router_address.is_zero() {
            return Err(invalid("routerAddress", "must not be the zero address"));
        }
        Ok(())
    }

    /// Effective chain id: explicit value first, then the network mapping.
    pub fn resolved_chain_id(&self) -> Option<u64> {
        self.chain_id.or_else(|| chain_id_for_network(&self.network))
    }

    pub fn proof_timeout(&self) -> Option<Duration> {
        self.proof_timeout_ms.map(Duration::from_millis)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_millis(self.lock_stale_after_ms)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| invalid(key, &e.to_string()))
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// `2^bits - 1` as a [`U256`]. Used for the salt masks.
pub fn low_mask(bits: usize) -> U256 {
    if bits >= 256 {
        U256::MAX
    } else {
        (U256::one() << bits) - U256::one()
    }
}
