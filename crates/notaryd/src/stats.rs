//! Stats responder (C8, §4.6).

use crate::store::Store;
use notary_core::model::Network;
use notary_core::tier::tier_from_success;
use nostr::{EventBuilder, Keys, Kind, Tag};
use nostr_sdk::Client;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

pub struct StatsRequest {
    pub master_pubkey: String,
    pub reply_pubkey: String,
    pub network: Network,
    pub request_id: Option<String>,
}

/// Computes §4.5's master-path stats and gift-wraps a
/// `robosats.reputation.stats.response.v1` rumor back to `reply_pubkey`,
/// within the I/O timeout. Absorbed on failure or timeout, same as a badge
/// publish (§7).
pub async fn respond(
    store: &Store,
    keys: &Keys,
    client: &Client,
    relay_hint: Option<&str>,
    request: StatsRequest,
    now: i64,
    io_timeout: Duration,
) {
    let ephemerals = store
        .list_ephemerals_for_master(&request.master_pubkey)
        .unwrap_or_default();
    let success_count = store
        .success_count_for_ephemerals(&ephemerals, request.network)
        .unwrap_or(0);
    let first_success_at = store
        .first_success_at_for_ephemerals(&ephemerals, request.network)
        .unwrap_or(None);
    let reported = store
        .is_master_reported(&request.master_pubkey)
        .unwrap_or(false);
    let tier = tier_from_success(success_count, first_success_at, now);

    let mut body = json!({
        "type": "robosats.reputation.stats.response.v1",
        "network": request.network.as_str(),
        "success_count": success_count,
        "tier": tier.as_str(),
        "reported": reported,
        "created_at": now,
    });
    if let Some(first_success_at) = first_success_at {
        body["first_success_at"] = json!(first_success_at);
    }
    if let Some(request_id) = &request.request_id {
        body["request_id"] = json!(request_id);
    }

    let content = body.to_string();
    let Ok(receiver) = nostr::PublicKey::from_hex(&request.reply_pubkey) else {
        return;
    };

    let reply_p_tag = match relay_hint {
        Some(relay) => Tag::parse(["p", &request.reply_pubkey, relay]),
        None => Tag::parse(["p", &request.reply_pubkey]),
    }
    .expect("p tag");
    let extra_tags = vec![reply_p_tag];

    let rumor = EventBuilder::new(Kind::Custom(0), content);
    let gift_wrap = match EventBuilder::gift_wrap(keys, &receiver, rumor, extra_tags).await {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "failed to build stats response gift wrap");
            return;
        }
    };

    match tokio::time::timeout(io_timeout, client.send_event(&gift_wrap)).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => warn!(error = %err, "failed to send stats response"),
        Err(_) => warn!("timed out sending stats response"),
    }
}
