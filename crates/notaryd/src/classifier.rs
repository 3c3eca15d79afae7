//! Event classifier (C3).
//!
//! Dispatches a raw relay event by kind, checks authorship against the
//! trusted-coordinator allowlist for receipts/reports, and extracts the
//! well-known tags. Tag parsing is tolerant: a missing or malformed required
//! tag is a silent drop (`None`), never an error (§7 — malformed input is not
//! exceptional).

use crate::kinds::{RECEIPT_KIND, REPORT_KIND};
use notary_core::model::{Network, DEFAULT_REPORT_KIND};
use notary_core::{hexkey, tags::first_tag_value};
use nostr::Event;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReceipt {
    pub coordinator_pubkey: String,
    pub d: String,
    pub buyer_pubkey: String,
    pub network: Network,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReport {
    pub coordinator_pubkey: String,
    pub buyer_pubkey: String,
    pub network: Network,
    pub report: String,
    pub created_at: i64,
}

pub enum Classified {
    Receipt(RawReceipt),
    Report(RawReport),
    /// Kind 1059. The Link Engine owns unwrapping; the classifier only
    /// confirms the kind and passes the event through untouched.
    GiftWrap,
}

fn tags_as_vecs(event: &Event) -> Vec<Vec<String>> {
    event
        .tags
        .iter()
        .map(|tag| tag.as_slice().to_vec())
        .collect()
}

/// Classifies one relay event. Returns `None` for anything that should be
/// dropped: unrecognized kind, untrusted author (on 38384/38386), or a
/// malformed required tag.
pub fn classify(event: &Event, trusted_coordinators: &HashSet<String>) -> Option<Classified> {
    let kind = event.kind.as_u16();
    let created_at = event.created_at.as_u64() as i64;
    let author = hexkey::normalize_pubkey(&event.pubkey.to_hex());

    match kind {
        k if k == RECEIPT_KIND => {
            if !trusted_coordinators.contains(&author) {
                return None;
            }
            let tags = tags_as_vecs(event);
            let d = first_tag_value(&tags, "d")?.to_string();
            let p = first_tag_value(&tags, "p")?;
            let buyer_pubkey = hexkey::validate_and_normalize(p)?;
            let network = Network::parse(first_tag_value(&tags, "net"))?;
            Some(Classified::Receipt(RawReceipt {
                coordinator_pubkey: author,
                d,
                buyer_pubkey,
                network,
                created_at,
            }))
        }
        k if k == REPORT_KIND => {
            if !trusted_coordinators.contains(&author) {
                return None;
            }
            let tags = tags_as_vecs(event);
            let p = first_tag_value(&tags, "p")?;
            let buyer_pubkey = hexkey::validate_and_normalize(p)?;
            let network = Network::parse(first_tag_value(&tags, "net"))?;
            let report = first_tag_value(&tags, "report")
                .map(str::to_string)
                .unwrap_or_else(|| DEFAULT_REPORT_KIND.to_string());
            Some(Classified::Report(RawReport {
                coordinator_pubkey: author,
                buyer_pubkey,
                network,
                report,
                created_at,
            }))
        }
        k if k == crate::kinds::GIFT_WRAP_KIND => Some(Classified::GiftWrap),
        _ => None,
    }
}
