//! Link engine (C6, §4.4).
//!
//! Unwraps a NIP-59 gift wrap with the notary's own key, parses the rumor's
//! JSON content, and dispatches on its `type` field. Link request/confirm
//! payloads feed the two pending-handshake tables and attempt finalization;
//! stats-request payloads are handed to the stats responder.

use crate::badge::BadgePublisher;
use crate::kinds::{LINK_CONFIRM_TYPE, LINK_REQUEST_TYPE, STATS_REQUEST_TYPE};
use crate::stats::{self, StatsRequest};
use crate::store::Store;
use notary_core::hexkey;
use notary_core::model::{PendingLinkConfirm, PendingLinkRequest};
use nostr::nips::nip59::extract_rumor;
use nostr::{Event, Keys};
use nostr_sdk::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempts to unwrap `event` as a gift wrap addressed to `keys`, parse its
/// rumor content as JSON, and dispatch on the declared message `type`.
/// Unwrap failures and parse failures are silent drops (§7): most gift wraps
/// a relay delivers are not addressed to this notary and simply won't
/// decrypt with its key.
pub async fn process_gift_wrap(
    event: &Event,
    keys: &Keys,
    store: &Store,
    badges: &BadgePublisher,
    client: &Client,
    relay_hint: Option<&str>,
    now: i64,
    io_timeout: Duration,
) {
    let unwrapped = match extract_rumor(keys, event) {
        Ok(unwrapped) => unwrapped,
        Err(err) => {
            debug!(error = %err, "gift wrap did not unwrap with notary key");
            return;
        }
    };

    let sender_pubkey = hexkey::normalize_pubkey(&unwrapped.sender.to_hex());
    let rumor_created_at = unwrapped.rumor.created_at.as_u64() as i64;

    let payload: Value = match serde_json::from_str(&unwrapped.rumor.content) {
        Ok(value) => value,
        Err(_) => {
            debug!("gift wrap rumor content was not valid JSON");
            return;
        }
    };

    let created_at = payload
        .get("created_at")
        .and_then(Value::as_i64)
        .unwrap_or(rumor_created_at);

    let message_type = match payload.get("type").and_then(Value::as_str) {
        Some(t) => t,
        None => return,
    };

    match message_type {
        LINK_REQUEST_TYPE => {
            handle_link_request(store, badges, &sender_pubkey, &payload, created_at, now).await
        }
        LINK_CONFIRM_TYPE => {
            handle_link_confirm(store, badges, &sender_pubkey, &payload, created_at, now).await
        }
        STATS_REQUEST_TYPE => {
            let Some(request) = parse_stats_request(&sender_pubkey, &payload) else {
                return;
            };
            stats::respond(store, keys, client, relay_hint, request, now, io_timeout).await;
        }
        _ => {}
    }
}

async fn handle_link_request(
    store: &Store,
    badges: &BadgePublisher,
    sender_pubkey: &str,
    payload: &Value,
    created_at: i64,
    now: i64,
) {
    let Some(master_pubkey) = payload
        .get("master_pubkey")
        .and_then(Value::as_str)
        .and_then(hexkey::validate_and_normalize)
    else {
        return;
    };

    let ephemeral_pubkey = sender_pubkey;
    if let Err(err) = store.upsert_pending_request(
        ephemeral_pubkey,
        &PendingLinkRequest {
            master_pubkey,
            created_at,
        },
    ) {
        warn!(error = %err, "failed to persist pending link request");
        return;
    }

    try_finalize(store, badges, ephemeral_pubkey, now).await;
}

async fn handle_link_confirm(
    store: &Store,
    badges: &BadgePublisher,
    sender_pubkey: &str,
    payload: &Value,
    created_at: i64,
    now: i64,
) {
    let Some(ephemeral_pubkey) = payload
        .get("ephemeral_pubkey")
        .and_then(Value::as_str)
        .and_then(hexkey::validate_and_normalize)
    else {
        return;
    };

    if let Err(err) = store.upsert_pending_confirm(
        &ephemeral_pubkey,
        &PendingLinkConfirm {
            master_pubkey: sender_pubkey.to_string(),
            created_at,
        },
    ) {
        warn!(error = %err, "failed to persist pending link confirm");
        return;
    }

    try_finalize(store, badges, &ephemeral_pubkey, now).await;
}

async fn try_finalize(store: &Store, badges: &BadgePublisher, ephemeral_pubkey: &str, now: i64) {
    match store.try_finalize_link(ephemeral_pubkey, now) {
        Ok(Some(master_pubkey)) => {
            badges
                .publish_for_new_link(ephemeral_pubkey, &master_pubkey, now)
                .await;
        }
        Ok(None) => {}
        Err(err) => warn!(error = %err, "failed to finalize link"),
    }
}

fn parse_stats_request(sender_pubkey: &str, payload: &Value) -> Option<StatsRequest> {
    let reply_pubkey = payload
        .get("reply_pubkey")
        .and_then(Value::as_str)
        .and_then(hexkey::validate_and_normalize)?;
    let network =
        notary_core::model::Network::parse(payload.get("network").and_then(Value::as_str))?;

    // A present-but-non-string `request_id` drops the whole request rather
    // than silently treating it as absent.
    if payload.get("request_id").is_some_and(|v| !v.is_string()) {
        return None;
    }
    let request_id = payload
        .get("request_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(StatsRequest {
        master_pubkey: sender_pubkey.to_string(),
        reply_pubkey,
        network,
        request_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::{EventBuilder, Kind};
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn stats_request_requires_64_hex_reply_pubkey() {
        let payload = json!({"reply_pubkey": "not-hex", "network": "mainnet"});
        assert!(parse_stats_request("sender", &payload).is_none());
    }

    #[test]
    fn stats_request_rejects_unknown_network() {
        let payload = json!({"reply_pubkey": "b".repeat(64), "network": "regtest"});
        assert!(parse_stats_request("sender", &payload).is_none());
    }

    #[test]
    fn stats_request_parses_optional_request_id() {
        let reply = "b".repeat(64);
        let payload = json!({"reply_pubkey": reply, "network": "testnet", "request_id": "r1"});
        let request = parse_stats_request("sender", &payload).unwrap();
        assert_eq!(request.master_pubkey, "sender");
        assert_eq!(request.reply_pubkey, reply);
        assert_eq!(request.request_id.as_deref(), Some("r1"));
    }

    #[test]
    fn stats_request_rejects_non_string_request_id() {
        let reply = "b".repeat(64);
        let payload = json!({"reply_pubkey": reply, "network": "testnet", "request_id": 123});
        assert!(parse_stats_request("sender", &payload).is_none());
    }

    /// Builds a gift wrap from `sender` to `notary_keys` carrying `content`.
    async fn wrap(sender: &Keys, notary_keys: &Keys, content: String) -> Event {
        let rumor = EventBuilder::new(Kind::Custom(0), content);
        EventBuilder::gift_wrap(sender, &notary_keys.public_key(), rumor, Vec::new())
            .await
            .unwrap()
    }

    fn harness() -> (
        std::sync::Arc<Store>,
        BadgePublisher,
        nostr_sdk::Client,
        Keys,
        tempfile::TempDir,
    ) {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(Store::open(dir.path()).unwrap());
        let notary_keys = Keys::generate();
        let client = nostr_sdk::Client::new(notary_keys.clone());
        let badges = BadgePublisher::new(
            client.clone(),
            notary_keys.clone(),
            store.clone(),
            Duration::from_millis(50),
        );
        (store, badges, client, notary_keys, dir)
    }

    // Scenario 5 (§8): the confirm half arrives before the request half; no
    // link exists until the request arrives, at which point finalization is
    // immediate. No relays are attached to the test client, so the resulting
    // badge publish attempt fails fast and is absorbed (§7), never panicking.
    #[tokio::test]
    async fn out_of_order_handshake_finalizes_on_second_half() {
        let (store, badges, client, notary_keys, _dir) = harness();
        let store = store.as_ref();
        let ephemeral = Keys::generate();
        let master = Keys::generate();
        let master_hex = master.public_key().to_hex().to_ascii_lowercase();
        let ephemeral_hex = ephemeral.public_key().to_hex().to_ascii_lowercase();

        let confirm_content = json!({
            "type": LINK_CONFIRM_TYPE,
            "ephemeral_pubkey": ephemeral_hex,
        })
        .to_string();
        let confirm_event = wrap(&master, &notary_keys, confirm_content).await;
        process_gift_wrap(
            &confirm_event,
            &notary_keys,
            store,
            &badges,
            &client,
            None,
            1,
            Duration::from_millis(50),
        )
        .await;
        assert_eq!(store.get_master_for_ephemeral(&ephemeral_hex).unwrap(), None);

        let request_content = json!({
            "type": LINK_REQUEST_TYPE,
            "master_pubkey": master_hex,
        })
        .to_string();
        let request_event = wrap(&ephemeral, &notary_keys, request_content).await;
        process_gift_wrap(
            &request_event,
            &notary_keys,
            store,
            &badges,
            &client,
            None,
            2,
            Duration::from_millis(50),
        )
        .await;

        assert_eq!(
            store.get_master_for_ephemeral(&ephemeral_hex).unwrap(),
            Some(master_hex)
        );
    }

    // Scenario 6 (§8): a request/confirm pair that disagree on the master
    // never link; both halves are retained until a corrected confirm agrees.
    #[tokio::test]
    async fn conflicting_halves_retain_until_corrected() {
        let (store, badges, client, notary_keys, _dir) = harness();
        let store = store.as_ref();
        let ephemeral = Keys::generate();
        let m1 = Keys::generate();
        let m2 = Keys::generate();
        let ephemeral_hex = ephemeral.public_key().to_hex().to_ascii_lowercase();
        let m1_hex = m1.public_key().to_hex().to_ascii_lowercase();

        let request_content = json!({
            "type": LINK_REQUEST_TYPE,
            "master_pubkey": m1_hex,
        })
        .to_string();
        process_gift_wrap(
            &wrap(&ephemeral, &notary_keys, request_content).await,
            &notary_keys,
            store,
            &badges,
            &client,
            None,
            1,
            Duration::from_millis(50),
        )
        .await;

        let confirm_content = json!({
            "type": LINK_CONFIRM_TYPE,
            "ephemeral_pubkey": ephemeral_hex,
        })
        .to_string();
        process_gift_wrap(
            &wrap(&m2, &notary_keys, confirm_content).await,
            &notary_keys,
            store,
            &badges,
            &client,
            None,
            2,
            Duration::from_millis(50),
        )
        .await;
        assert_eq!(store.get_master_for_ephemeral(&ephemeral_hex).unwrap(), None);

        let corrected_confirm = json!({
            "type": LINK_CONFIRM_TYPE,
            "ephemeral_pubkey": ephemeral_hex,
        })
        .to_string();
        process_gift_wrap(
            &wrap(&m1, &notary_keys, corrected_confirm).await,
            &notary_keys,
            store,
            &badges,
            &client,
            None,
            3,
            Duration::from_millis(50),
        )
        .await;
        assert_eq!(
            store.get_master_for_ephemeral(&ephemeral_hex).unwrap(),
            Some(m1_hex)
        );
    }
}
