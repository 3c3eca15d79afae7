//! Embedded durable store (C2).
//!
//! Five primary `sled` trees (`receipts`, `reports`, `links`,
//! `pending_link_requests`, `pending_link_confirms`) plus three secondary
//! index trees that give the buyer/network and master lookups a relational
//! schema would give them via indexes. Values are postcard-encoded.
//!
//! Every insert here is either a true upsert (pending rows, links — last
//! write wins) or an insert-or-ignore (receipts, reports — first observation
//! wins, §7 "duplicate receipts/reports"). Link finalization is the one
//! operation that spans more than one or two trees with an invariant across
//! all of them (I4), so it alone uses a `sled` transaction.

use notary_core::model::{Link, Network, PendingLinkConfirm, PendingLinkRequest, Receipt, Report};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::Db;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),
}

impl From<TransactionError<StoreError>> for StoreError {
    fn from(err: TransactionError<StoreError>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => StoreError::Sled(e),
        }
    }
}

pub struct Store {
    db: Db,
    receipts: sled::Tree,
    reports: sled::Tree,
    links: sled::Tree,
    pending_link_requests: sled::Tree,
    pending_link_confirms: sled::Tree,
    idx_receipts_by_buyer_net: sled::Tree,
    idx_reports_by_buyer_net: sled::Tree,
    idx_links_by_master: sled::Tree,
}

fn buyer_net_prefix(buyer_pubkey: &str, network: Network) -> String {
    format!("{buyer_pubkey}:{network}:")
}

fn buyer_prefix(buyer_pubkey: &str) -> String {
    format!("{buyer_pubkey}:")
}

fn master_prefix(master_pubkey: &str) -> String {
    format!("{master_pubkey}:")
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self {
            receipts: db.open_tree("receipts")?,
            reports: db.open_tree("reports")?,
            links: db.open_tree("links")?,
            pending_link_requests: db.open_tree("pending_link_requests")?,
            pending_link_confirms: db.open_tree("pending_link_confirms")?,
            idx_receipts_by_buyer_net: db.open_tree("idx_receipts_by_buyer_net")?,
            idx_reports_by_buyer_net: db.open_tree("idx_reports_by_buyer_net")?,
            idx_links_by_master: db.open_tree("idx_links_by_master")?,
            db,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    // ---- Receipts (C2, I1/I3) -------------------------------------------

    /// Inserts the receipt iff `receipt_key` is new. Returns `true` iff
    /// inserted (mirrors `INSERT OR IGNORE`, §4.2).
    pub fn upsert_receipt(&self, receipt_key: &str, receipt: &Receipt) -> Result<bool, StoreError> {
        if self.receipts.contains_key(receipt_key.as_bytes())? {
            return Ok(false);
        }
        let encoded = postcard::to_allocvec(receipt)?;
        self.receipts.insert(receipt_key.as_bytes(), encoded)?;

        let idx_key = format!(
            "{}:{}:{}",
            receipt.buyer_pubkey, receipt.network, receipt_key
        );
        self.idx_receipts_by_buyer_net
            .insert(idx_key.as_bytes(), &receipt.created_at.to_le_bytes())?;
        Ok(true)
    }

    /// `success_count` for every ephemeral of `master` on `network`.
    pub fn success_count_for_ephemerals(
        &self,
        ephemerals: &[String],
        network: Network,
    ) -> Result<u64, StoreError> {
        let mut count = 0u64;
        for ephemeral in ephemerals {
            let prefix = buyer_net_prefix(ephemeral, network);
            count += self.idx_receipts_by_buyer_net.scan_prefix(prefix.as_bytes()).count() as u64;
        }
        Ok(count)
    }

    /// `first_success_at` across every ephemeral of `master` on `network`.
    pub fn first_success_at_for_ephemerals(
        &self,
        ephemerals: &[String],
        network: Network,
    ) -> Result<Option<i64>, StoreError> {
        let mut min: Option<i64> = None;
        for ephemeral in ephemerals {
            let prefix = buyer_net_prefix(ephemeral, network);
            for entry in self.idx_receipts_by_buyer_net.scan_prefix(prefix.as_bytes()) {
                let (_, value) = entry?;
                let created_at = i64::from_le_bytes(value.as_ref().try_into().unwrap_or([0; 8]));
                min = Some(min.map_or(created_at, |m: i64| m.min(created_at)));
            }
        }
        Ok(min)
    }

    // ---- Reports (C2, I1/I3) --------------------------------------------

    /// Inserts the report iff `report_key` is new. Returns `true` iff
    /// inserted (§4.3).
    pub fn upsert_report(&self, report_key: &str, report: &Report) -> Result<bool, StoreError> {
        if self.reports.contains_key(report_key.as_bytes())? {
            return Ok(false);
        }
        let encoded = postcard::to_allocvec(report)?;
        self.reports.insert(report_key.as_bytes(), encoded)?;

        let idx_key = format!("{}:{}:{}", report.buyer_pubkey, report.network, report_key);
        self.idx_reports_by_buyer_net
            .insert(idx_key.as_bytes(), &report.created_at.to_le_bytes())?;
        Ok(true)
    }

    /// Any report at all for `ephemeral_pubkey`, on any network.
    pub fn is_ephemeral_reported(&self, ephemeral_pubkey: &str) -> Result<bool, StoreError> {
        let prefix = buyer_prefix(ephemeral_pubkey);
        Ok(self
            .idx_reports_by_buyer_net
            .scan_prefix(prefix.as_bytes())
            .next()
            .transpose()?
            .is_some())
    }

    /// Any report for any ephemeral linked to `master_pubkey`, across any
    /// network or coordinator. A master reported on one path is reported
    /// everywhere; this is intentional rather than scoped per network.
    pub fn is_master_reported(&self, master_pubkey: &str) -> Result<bool, StoreError> {
        for ephemeral in self.list_ephemerals_for_master(master_pubkey)? {
            if self.is_ephemeral_reported(&ephemeral)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ---- Links / pending handshake halves (C2, I2/I4, §4.4) -------------

    pub fn get_master_for_ephemeral(
        &self,
        ephemeral_pubkey: &str,
    ) -> Result<Option<String>, StoreError> {
        match self.links.get(ephemeral_pubkey.as_bytes())? {
            Some(bytes) => {
                let link: Link = postcard::from_bytes(&bytes)?;
                Ok(Some(link.master_pubkey))
            }
            None => Ok(None),
        }
    }

    pub fn list_ephemerals_for_master(
        &self,
        master_pubkey: &str,
    ) -> Result<Vec<String>, StoreError> {
        let prefix = master_prefix(master_pubkey);
        let mut ephemerals = Vec::new();
        for entry in self.idx_links_by_master.scan_prefix(prefix.as_bytes()) {
            let (key, _) = entry?;
            let key = String::from_utf8_lossy(&key);
            if let Some(ephemeral) = key.strip_prefix(&prefix) {
                ephemerals.push(ephemeral.to_string());
            }
        }
        Ok(ephemerals)
    }

    pub fn upsert_pending_request(
        &self,
        ephemeral_pubkey: &str,
        request: &PendingLinkRequest,
    ) -> Result<(), StoreError> {
        let encoded = postcard::to_allocvec(request)?;
        self.pending_link_requests
            .insert(ephemeral_pubkey.as_bytes(), encoded)?;
        Ok(())
    }

    pub fn upsert_pending_confirm(
        &self,
        ephemeral_pubkey: &str,
        confirm: &PendingLinkConfirm,
    ) -> Result<(), StoreError> {
        let encoded = postcard::to_allocvec(confirm)?;
        self.pending_link_confirms
            .insert(ephemeral_pubkey.as_bytes(), encoded)?;
        Ok(())
    }

    fn get_pending_request(
        &self,
        ephemeral_pubkey: &str,
    ) -> Result<Option<PendingLinkRequest>, StoreError> {
        match self.pending_link_requests.get(ephemeral_pubkey.as_bytes())? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_pending_confirm(
        &self,
        ephemeral_pubkey: &str,
    ) -> Result<Option<PendingLinkConfirm>, StoreError> {
        match self.pending_link_confirms.get(ephemeral_pubkey.as_bytes())? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Attempts to join the two pending halves for `ephemeral_pubkey`.
    /// Returns `Some(master_pubkey)` iff both halves are present and agree;
    /// in that case the link is (re)written, both pending rows are removed,
    /// and any stale master-index entry from a prior link is cleaned up —
    /// all atomically (I2, I4).
    pub fn try_finalize_link(
        &self,
        ephemeral_pubkey: &str,
        now: i64,
    ) -> Result<Option<String>, StoreError> {
        let request = self.get_pending_request(ephemeral_pubkey)?;
        let confirm = self.get_pending_confirm(ephemeral_pubkey)?;
        let (request, confirm) = match (request, confirm) {
            (Some(r), Some(c)) => (r, c),
            _ => return Ok(None),
        };
        if request.master_pubkey != confirm.master_pubkey {
            return Ok(None);
        }
        let master = request.master_pubkey;
        let previous_master = self.get_master_for_ephemeral(ephemeral_pubkey)?;

        let link = Link {
            master_pubkey: master.clone(),
            linked_at: now,
        };
        let encoded_link = postcard::to_allocvec(&link)?;
        let new_idx_key = format!("{master}:{ephemeral_pubkey}");
        let stale_idx_key = previous_master
            .filter(|prev| prev != &master)
            .map(|prev| format!("{prev}:{ephemeral_pubkey}"));

        let trees = (
            &self.links,
            &self.idx_links_by_master,
            &self.pending_link_requests,
            &self.pending_link_confirms,
        );
        trees
            .transaction(|(links, idx_links, pending_req, pending_conf)| {
                if let Some(stale_key) = &stale_idx_key {
                    idx_links.remove(stale_key.as_bytes())?;
                }
                links.insert(ephemeral_pubkey.as_bytes(), encoded_link.clone())?;
                idx_links.insert(new_idx_key.as_bytes(), &[] as &[u8])?;
                pending_req.remove(ephemeral_pubkey.as_bytes())?;
                pending_conf.remove(ephemeral_pubkey.as_bytes())?;
                Ok::<(), ConflictableTransactionError<StoreError>>(())
            })
            .map_err(StoreError::from)?;

        Ok(Some(master))
    }
}
