//! Value types shared between the embedded store and the event processors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A trading network label. Constrained to the set the notary understands;
/// anything else is rejected at the edge (see [`Network::parse`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    /// All networks a badge/report is ever published or propagated across.
    pub const ALL: [Network; 2] = [Network::Mainnet, Network::Testnet];

    /// Parses a lowercased network label, defaulting empty/missing input to
    /// `mainnet` as the wire format does. Returns `None` for anything else.
    pub fn parse(raw: Option<&str>) -> Option<Network> {
        match raw
            .filter(|s| !s.is_empty())
            .unwrap_or("mainnet")
            .to_ascii_lowercase()
            .as_str()
        {
            "mainnet" => Some(Network::Mainnet),
            "testnet" => Some(Network::Testnet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A coordinator-signed success receipt for a buyer ephemeral pubkey.
///
/// `receipt_key = coordinator_pubkey + ":" + d`; unique per key, created on
/// first observation, never mutated or deleted (I1, I3).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub coordinator_pubkey: String,
    pub buyer_pubkey: String,
    pub network: Network,
    pub created_at: i64,
}

impl Receipt {
    pub fn receipt_key(coordinator_pubkey: &str, d: &str) -> String {
        format!("{coordinator_pubkey}:{d}")
    }
}

/// A coordinator-signed scam report for a buyer ephemeral pubkey.
///
/// `report_key = coordinator_pubkey + ":" + network + ":" + buyer_pubkey + ":" + report`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub coordinator_pubkey: String,
    pub buyer_pubkey: String,
    pub network: Network,
    pub report: String,
    pub created_at: i64,
}

impl Report {
    pub fn report_key(
        coordinator_pubkey: &str,
        network: Network,
        buyer_pubkey: &str,
        report: &str,
    ) -> String {
        format!("{coordinator_pubkey}:{network}:{buyer_pubkey}:{report}")
    }
}

/// The default report kind when a coordinator's report event omits the
/// `report` tag.
pub const DEFAULT_REPORT_KIND: &str = "scammer";

/// A finalized link between an ephemeral pubkey and its master identity.
/// Exactly one master per ephemeral (the store's primary key is the
/// ephemeral); overwriting with a newer, consistent handshake is allowed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub master_pubkey: String,
    pub linked_at: i64,
}

/// The ephemeral's half of a link handshake, keyed by ephemeral pubkey.
/// Overwritten on retry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLinkRequest {
    pub master_pubkey: String,
    pub created_at: i64,
}

/// The master's half of a link handshake, keyed by ephemeral pubkey.
/// Overwritten on retry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLinkConfirm {
    pub master_pubkey: String,
    pub created_at: i64,
}

/// A computed reputation tier, derived purely from accumulated history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    None,
    Beginner,
    Intermediate,
    Experienced,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::None => "none",
            Tier::Beginner => "beginner",
            Tier::Intermediate => "intermediate",
            Tier::Experienced => "experienced",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
