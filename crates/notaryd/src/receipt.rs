//! Receipt processor (C4, §4.2).

use crate::badge::BadgePublisher;
use crate::classifier::RawReceipt;
use crate::store::Store;
use notary_core::model::Receipt;
use tracing::warn;

pub async fn process_receipt(store: &Store, badges: &BadgePublisher, receipt: RawReceipt, now: i64) {
    let receipt_key = Receipt::receipt_key(&receipt.coordinator_pubkey, &receipt.d);
    let record = Receipt {
        coordinator_pubkey: receipt.coordinator_pubkey.clone(),
        buyer_pubkey: receipt.buyer_pubkey.clone(),
        network: receipt.network,
        created_at: receipt.created_at,
    };

    let inserted = match store.upsert_receipt(&receipt_key, &record) {
        Ok(inserted) => inserted,
        Err(err) => {
            warn!(%receipt_key, error = %err, "failed to persist receipt");
            return;
        }
    };
    if !inserted {
        return;
    }

    match store.get_master_for_ephemeral(&receipt.buyer_pubkey) {
        Ok(Some(master)) => {
            badges
                .publish_for_receipt(&receipt.buyer_pubkey, receipt.network, &master, now)
                .await;
        }
        Ok(None) => {}
        Err(err) => warn!(buyer = %receipt.buyer_pubkey, error = %err, "failed to look up link"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notary_core::model::Network;

    #[test]
    fn receipt_key_matches_coordinator_and_d() {
        let receipt = RawReceipt {
            coordinator_pubkey: "coord".into(),
            d: "abc".into(),
            buyer_pubkey: "b".repeat(64),
            network: Network::Mainnet,
            created_at: 1,
        };
        assert_eq!(
            Receipt::receipt_key(&receipt.coordinator_pubkey, &receipt.d),
            "coord:abc"
        );
    }
}
