//! Badge publisher (C7).
//!
//! Computes a master's (or an unlinked ephemeral's) reputation as a pure
//! function of Store state (I5) and publishes a parameterized-replaceable
//! badge event. Publish failures — including I/O timeouts — are logged and
//! absorbed; a badge is always re-derivable from Store state, so a dropped
//! publish is never a correctness problem, only a staleness one until the
//! next republish (§7, §9 "idempotence as recovery").

use crate::kinds::BADGE_KIND;
use crate::store::Store;
use notary_core::model::{Network, Tier};
use notary_core::tier::tier_from_success;
use nostr::{EventBuilder, Keys, Kind, Tag};
use nostr_sdk::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// The computed reputation of a master (or an unlinked ephemeral, with
/// `tier = None` and `success_count = 0`) at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub success_count: u64,
    pub first_success_at: Option<i64>,
    pub reported: bool,
    pub tier: Tier,
}

pub struct BadgePublisher {
    client: Client,
    keys: Keys,
    store: Arc<Store>,
    io_timeout: Duration,
}

impl BadgePublisher {
    pub fn new(client: Client, keys: Keys, store: Arc<Store>, io_timeout: Duration) -> Self {
        Self {
            client,
            keys,
            store,
            io_timeout,
        }
    }

    /// §4.5, master path: aggregates across every ephemeral linked to
    /// `master_pubkey`.
    pub fn stats_for_master(&self, master_pubkey: &str, network: Network, now: i64) -> Stats {
        let ephemerals = self
            .store
            .list_ephemerals_for_master(master_pubkey)
            .unwrap_or_default();
        let success_count = self
            .store
            .success_count_for_ephemerals(&ephemerals, network)
            .unwrap_or(0);
        let first_success_at = self
            .store
            .first_success_at_for_ephemerals(&ephemerals, network)
            .unwrap_or(None);
        let reported = self.store.is_master_reported(master_pubkey).unwrap_or(false);
        let tier = tier_from_success(success_count, first_success_at, now);
        Stats {
            success_count,
            first_success_at,
            reported,
            tier,
        }
    }

    /// §4.5, unlinked-ephemeral path.
    fn stats_for_unlinked_ephemeral(&self, ephemeral_pubkey: &str) -> Stats {
        let reported = self
            .store
            .is_ephemeral_reported(ephemeral_pubkey)
            .unwrap_or(false);
        Stats {
            success_count: 0,
            first_success_at: None,
            reported,
            tier: Tier::None,
        }
    }

    /// Builds, signs, and publishes the badge for `(network, ephemeral)`
    /// given already-computed `stats`. The single point every publish path
    /// funnels through.
    async fn publish(&self, ephemeral_pubkey: &str, network: Network, stats: Stats) {
        let d = format!("{network}:{ephemeral_pubkey}");
        let mut tags = vec![
            Tag::parse(["d", &d]).expect("d tag"),
            Tag::parse(["p", ephemeral_pubkey]).expect("p tag"),
            Tag::parse(["tier", stats.tier.as_str()]).expect("tier tag"),
            Tag::parse(["net", network.as_str()]).expect("net tag"),
            Tag::parse(["v", "1"]).expect("v tag"),
        ];
        if stats.reported {
            tags.push(Tag::parse(["reported", "1"]).expect("reported tag"));
        }

        let event = match EventBuilder::new(Kind::Custom(BADGE_KIND), "")
            .tags(tags)
            .sign_with_keys(&self.keys)
        {
            Ok(event) => event,
            Err(err) => {
                warn!(%ephemeral_pubkey, %network, error = %err, "failed to sign badge event");
                return;
            }
        };

        match tokio::time::timeout(self.io_timeout, self.client.send_event(&event)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                warn!(%ephemeral_pubkey, %network, error = %err, "failed to publish badge");
            }
            Err(_) => {
                warn!(%ephemeral_pubkey, %network, "timed out publishing badge");
            }
        }
    }

    /// Receipt-processor path (§4.2): the receipt's network only.
    pub async fn publish_for_receipt(&self, ephemeral_pubkey: &str, network: Network, master_pubkey: &str, now: i64) {
        let stats = self.stats_for_master(master_pubkey, network, now);
        self.publish(ephemeral_pubkey, network, stats).await;
    }

    /// Report-processor path for a linked ephemeral (§4.3): republish every
    /// ephemeral of the master, on both networks.
    pub async fn republish_for_master_both_networks(&self, master_pubkey: &str, now: i64) {
        let ephemerals = self
            .store
            .list_ephemerals_for_master(master_pubkey)
            .unwrap_or_default();
        for network in Network::ALL {
            let stats = self.stats_for_master(master_pubkey, network, now);
            for ephemeral in &ephemerals {
                self.publish(ephemeral, network, stats).await;
            }
        }
    }

    /// Report-processor path for an unlinked ephemeral (§4.3): both networks,
    /// tier stays `none`.
    pub async fn publish_for_unlinked_ephemeral_both_networks(&self, ephemeral_pubkey: &str) {
        let stats = self.stats_for_unlinked_ephemeral(ephemeral_pubkey);
        for network in Network::ALL {
            self.publish(ephemeral_pubkey, network, stats).await;
        }
    }

    /// Link-engine path (§4.4 step 4): a link just finalized for
    /// `ephemeral_pubkey` ↔ `master_pubkey`. If the master is already
    /// reported, every linked ephemeral is republished; otherwise only the
    /// newly linked ephemeral is. Both cases cover both networks.
    pub async fn publish_for_new_link(&self, ephemeral_pubkey: &str, master_pubkey: &str, now: i64) {
        let already_reported = self.store.is_master_reported(master_pubkey).unwrap_or(false);
        if already_reported {
            self.republish_for_master_both_networks(master_pubkey, now).await;
            return;
        }
        for network in Network::ALL {
            let stats = self.stats_for_master(master_pubkey, network, now);
            self.publish(ephemeral_pubkey, network, stats).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use notary_core::model::Receipt;
    use tempfile::tempdir;

    const DAY: i64 = 86_400;

    fn open(dir: &tempfile::TempDir) -> BadgePublisher {
        let store = Arc::new(Store::open(dir.path()).unwrap());
        let keys = Keys::generate();
        let client = nostr_sdk::Client::new(keys.clone());
        BadgePublisher::new(client, keys, store, Duration::from_millis(50))
    }

    fn receipt(buyer: &str, network: Network, created_at: i64) -> Receipt {
        Receipt {
            coordinator_pubkey: "coord".into(),
            buyer_pubkey: buyer.into(),
            network,
            created_at,
        }
    }

    // Scenario 2 (§8): six receipts on mainnet for a linked ephemeral climb
    // the tier to `beginner` (success_count > 5).
    #[test]
    fn stats_for_master_aggregates_linked_ephemerals() {
        let dir = tempdir().unwrap();
        let badges = open(&dir);
        badges
            .store
            .upsert_pending_request(
                "eph",
                &notary_core::model::PendingLinkRequest {
                    master_pubkey: "master".into(),
                    created_at: 1,
                },
            )
            .unwrap();
        badges
            .store
            .upsert_pending_confirm(
                "eph",
                &notary_core::model::PendingLinkConfirm {
                    master_pubkey: "master".into(),
                    created_at: 1,
                },
            )
            .unwrap();
        badges.store.try_finalize_link("eph", 1).unwrap();

        for i in 0..6 {
            badges
                .store
                .upsert_receipt(
                    &format!("coord:d{i}"),
                    &receipt("eph", Network::Mainnet, 100),
                )
                .unwrap();
        }

        let stats = badges.stats_for_master("master", Network::Mainnet, 200);
        assert_eq!(stats.success_count, 6);
        assert_eq!(stats.tier, Tier::Beginner);
        assert!(!stats.reported);
    }

    // Scenario 3 (§8): eleven receipts with the first dated 91 days before
    // `now` reach `intermediate`.
    #[test]
    fn age_gated_intermediate() {
        let dir = tempdir().unwrap();
        let badges = open(&dir);
        badges
            .store
            .upsert_pending_request(
                "eph",
                &notary_core::model::PendingLinkRequest {
                    master_pubkey: "master".into(),
                    created_at: 1,
                },
            )
            .unwrap();
        badges
            .store
            .upsert_pending_confirm(
                "eph",
                &notary_core::model::PendingLinkConfirm {
                    master_pubkey: "master".into(),
                    created_at: 1,
                },
            )
            .unwrap();
        badges.store.try_finalize_link("eph", 1).unwrap();

        let now = 200 * DAY;
        let first_created_at = now - 91 * DAY;
        badges
            .store
            .upsert_receipt(
                "coord:first",
                &receipt("eph", Network::Mainnet, first_created_at),
            )
            .unwrap();
        for i in 1..11 {
            badges
                .store
                .upsert_receipt(
                    &format!("coord:d{i}"),
                    &receipt("eph", Network::Mainnet, now),
                )
                .unwrap();
        }

        let stats = badges.stats_for_master("master", Network::Mainnet, now);
        assert_eq!(stats.success_count, 11);
        assert_eq!(stats.tier, Tier::Intermediate);
    }

    // Scenario 4 (§8): reporting one of two ephemerals linked to the same
    // master marks the master (and thus every one of its ephemerals)
    // reported, regardless of which ephemeral the report named.
    #[test]
    fn report_on_one_ephemeral_marks_whole_master_reported() {
        let dir = tempdir().unwrap();
        let badges = open(&dir);
        for (ephemeral, master) in [("e1", "master"), ("e2", "master")] {
            badges
                .store
                .upsert_pending_request(
                    ephemeral,
                    &notary_core::model::PendingLinkRequest {
                        master_pubkey: master.into(),
                        created_at: 1,
                    },
                )
                .unwrap();
            badges
                .store
                .upsert_pending_confirm(
                    ephemeral,
                    &notary_core::model::PendingLinkConfirm {
                        master_pubkey: master.into(),
                        created_at: 1,
                    },
                )
                .unwrap();
            badges.store.try_finalize_link(ephemeral, 1).unwrap();
        }

        badges
            .store
            .upsert_report(
                "coord:mainnet:e1:scammer",
                &notary_core::model::Report {
                    coordinator_pubkey: "coord".into(),
                    buyer_pubkey: "e1".into(),
                    network: Network::Mainnet,
                    report: "scammer".into(),
                    created_at: 5,
                },
            )
            .unwrap();

        let stats = badges.stats_for_master("master", Network::Testnet, 100);
        assert!(stats.reported);
    }

    #[test]
    fn unlinked_ephemeral_has_none_tier_and_reflects_its_own_reports() {
        let dir = tempdir().unwrap();
        let badges = open(&dir);
        assert!(!badges.stats_for_unlinked_ephemeral("eph").reported);

        badges
            .store
            .upsert_report(
                "coord:mainnet:eph:scammer",
                &notary_core::model::Report {
                    coordinator_pubkey: "coord".into(),
                    buyer_pubkey: "eph".into(),
                    network: Network::Mainnet,
                    report: "scammer".into(),
                    created_at: 5,
                },
            )
            .unwrap();

        let stats = badges.stats_for_unlinked_ephemeral("eph");
        assert_eq!(stats.tier, Tier::None);
        assert!(stats.reported);
    }
}
