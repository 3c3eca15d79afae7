//! Report processor (C5, §4.3).

use crate::badge::BadgePublisher;
use crate::classifier::RawReport;
use crate::store::Store;
use notary_core::model::Report;
use tracing::warn;

pub async fn process_report(store: &Store, badges: &BadgePublisher, report: RawReport, now: i64) {
    let report_key = Report::report_key(
        &report.coordinator_pubkey,
        report.network,
        &report.buyer_pubkey,
        &report.report,
    );
    let record = Report {
        coordinator_pubkey: report.coordinator_pubkey.clone(),
        buyer_pubkey: report.buyer_pubkey.clone(),
        network: report.network,
        report: report.report.clone(),
        created_at: report.created_at,
    };

    let inserted = match store.upsert_report(&report_key, &record) {
        Ok(inserted) => inserted,
        Err(err) => {
            warn!(%report_key, error = %err, "failed to persist report");
            return;
        }
    };
    if !inserted {
        return;
    }

    match store.get_master_for_ephemeral(&report.buyer_pubkey) {
        Ok(Some(master)) => {
            badges.republish_for_master_both_networks(&master, now).await;
        }
        Ok(None) => {
            badges
                .publish_for_unlinked_ephemeral_both_networks(&report.buyer_pubkey)
                .await;
        }
        Err(err) => warn!(buyer = %report.buyer_pubkey, error = %err, "failed to look up link"),
    }
}
