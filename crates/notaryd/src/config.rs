//! Configuration loading (C1).
//!
//! Every setting is environment-sourced; the notary has no interactive CLI
//! surface, but the fields are still declared via `clap::Parser` with `env`
//! attributes so each one doubles as documented `--help` output. Validation
//! (missing secret, missing relays, empty allowlist, unreadable allowlist)
//! fails fast with a descriptive error.

use clap::Parser;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Raw, unvalidated command-line/environment surface.
#[derive(Parser, Debug, Clone)]
#[command(name = "notaryd")]
#[command(about = "Cross-coordinator buyer reputation notary daemon")]
pub struct RawConfig {
    /// Notary secret key, bech32 (`nsec1...`) or 64-character hex.
    #[arg(long, env = "NOTARY_NSEC")]
    pub nsec: String,

    /// Comma-separated relay URLs.
    #[arg(long, env = "NOTARY_RELAY_URLS")]
    pub relay_urls: Option<String>,

    /// A single relay URL, used when `NOTARY_RELAY_URLS` is not set.
    #[arg(long, env = "NOTARY_RELAY_URL")]
    pub relay_url: Option<String>,

    #[arg(long, env = "NOTARY_DB_PATH", default_value = "notary_data")]
    pub db_path: PathBuf,

    #[arg(
        long,
        env = "FEDERATION_JSON_PATH",
        default_value = "frontend/static/federation.json"
    )]
    pub federation_json_path: PathBuf,

    #[arg(long, env = "NOTARY_SINCE_SECS", default_value_t = 0)]
    pub since_secs: u64,

    #[arg(long, env = "NOTARY_GIFTWRAP_SINCE_SECS", default_value_t = 0)]
    pub giftwrap_since_secs: u64,

    #[arg(long, env = "NOTARY_IO_TIMEOUT_SECS", default_value_t = 15)]
    pub io_timeout_secs: u64,

    /// Truthy values: 1, true, yes, y, on (case-insensitive); anything else
    /// (including unset) is off.
    #[arg(long, env = "NOTARY_DEBUG", default_value = "0")]
    pub debug: String,
}

/// Validated, ready-to-use configuration.
#[derive(Debug, Clone)]
pub struct NotaryConfig {
    pub nsec: String,
    pub relay_urls: Vec<String>,
    pub trusted_coordinator_pubkeys: HashSet<String>,
    pub db_path: PathBuf,
    pub since_secs: u64,
    pub giftwrap_since_secs: u64,
    pub io_timeout: Duration,
    pub debug: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing NOTARY_RELAY_URL or NOTARY_RELAY_URLS")]
    MissingRelayUrls,
    #[error("failed to read allowlist file {path}: {source}")]
    AllowlistUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse allowlist file {path} as JSON: {source}")]
    AllowlistInvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no trusted coordinator pubkeys loaded from {0}")]
    EmptyAllowlist(PathBuf),
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn parse_relay_urls(raw: &RawConfig) -> Result<Vec<String>, ConfigError> {
    if let Some(csv) = raw.relay_urls.as_deref().filter(|s| !s.trim().is_empty()) {
        let urls: Vec<String> = csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if urls.is_empty() {
            return Err(ConfigError::MissingRelayUrls);
        }
        return Ok(urls);
    }
    match raw.relay_url.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(url) => Ok(vec![url.trim().to_string()]),
        None => Err(ConfigError::MissingRelayUrls),
    }
}

#[derive(Debug, Deserialize)]
struct FederationEntry {
    #[serde(rename = "nostrHexPubkey")]
    nostr_hex_pubkey: Option<String>,
}

/// Loads the trusted-coordinator allowlist: a JSON object keyed by
/// coordinator alias, each value carrying a `nostrHexPubkey`. Entries that
/// fail hex validation are skipped, not treated as fatal.
pub fn load_trusted_coordinator_pubkeys(
    path: &Path,
) -> Result<HashSet<String>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::AllowlistUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: std::collections::HashMap<String, FederationEntry> =
        serde_json::from_str(&raw).map_err(|source| ConfigError::AllowlistInvalidJson {
            path: path.to_path_buf(),
            source,
        })?;

    let pubkeys: HashSet<String> = entries
        .into_values()
        .filter_map(|entry| entry.nostr_hex_pubkey)
        .filter(|key| notary_core::hexkey::is_hex_pubkey(key))
        .map(|key| notary_core::hexkey::normalize_pubkey(&key))
        .collect();

    if pubkeys.is_empty() {
        return Err(ConfigError::EmptyAllowlist(path.to_path_buf()));
    }
    Ok(pubkeys)
}

impl NotaryConfig {
    /// Validates a [`RawConfig`] into a ready-to-use [`NotaryConfig`].
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let relay_urls = parse_relay_urls(&raw)?;
        let trusted_coordinator_pubkeys =
            load_trusted_coordinator_pubkeys(&raw.federation_json_path)?;

        Ok(NotaryConfig {
            nsec: raw.nsec,
            relay_urls,
            trusted_coordinator_pubkeys,
            db_path: raw.db_path,
            since_secs: raw.since_secs,
            giftwrap_since_secs: raw.giftwrap_since_secs,
            io_timeout: Duration::from_secs(raw.io_timeout_secs),
            debug: is_truthy(&raw.debug),
        })
    }

    /// Parses `RawConfig` from the process environment/argv and validates it.
    pub fn load() -> anyhow::Result<Self> {
        let raw = RawConfig::parse();
        Ok(Self::from_raw(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn raw(nsec: &str, relay_urls: Option<&str>, relay_url: Option<&str>) -> RawConfig {
        RawConfig {
            nsec: nsec.to_string(),
            relay_urls: relay_urls.map(String::from),
            relay_url: relay_url.map(String::from),
            db_path: PathBuf::from("notary_data"),
            federation_json_path: PathBuf::from("does-not-matter.json"),
            since_secs: 0,
            giftwrap_since_secs: 0,
            io_timeout_secs: 15,
            debug: "0".to_string(),
        }
    }

    #[test]
    fn relay_urls_csv_takes_precedence() {
        let r = raw("nsec", Some("wss://a, wss://b"), Some("wss://c"));
        assert_eq!(
            parse_relay_urls(&r).unwrap(),
            vec!["wss://a".to_string(), "wss://b".to_string()]
        );
    }

    #[test]
    fn falls_back_to_single_relay_url() {
        let r = raw("nsec", None, Some("wss://c"));
        assert_eq!(parse_relay_urls(&r).unwrap(), vec!["wss://c".to_string()]);
    }

    #[test]
    fn missing_relay_urls_is_an_error() {
        let r = raw("nsec", None, None);
        assert!(matches!(
            parse_relay_urls(&r),
            Err(ConfigError::MissingRelayUrls)
        ));
    }

    #[test]
    fn truthy_values_recognized() {
        for v in ["1", "true", "YES", "y", "On"] {
            assert!(is_truthy(v), "{v} should be truthy");
        }
        for v in ["0", "false", "", "nah"] {
            assert!(!is_truthy(v), "{v} should not be truthy");
        }
    }

    #[test]
    fn allowlist_skips_invalid_entries_and_lowercases() {
        let good = "b".repeat(64);
        let json = format!(
            r#"{{"coordA": {{"nostrHexPubkey": "{}"}}, "coordB": {{"nostrHexPubkey": "not-hex"}}, "coordC": {{}}}}"#,
            good.to_uppercase()
        );
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let pubkeys = load_trusted_coordinator_pubkeys(file.path()).unwrap();
        assert_eq!(pubkeys.len(), 1);
        assert!(pubkeys.contains(&good));
    }

    #[test]
    fn empty_allowlist_is_a_startup_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{}").unwrap();
        let err = load_trusted_coordinator_pubkeys(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyAllowlist(_)));
    }
}
