//! Service supervisor (C9, §4.7).
//!
//! Connects relays, installs the three subscriptions, and bridges relay-pool
//! notifications onto the async executor. Some relay SDKs invoke their
//! notification callback from a foreign thread and expect the handler to
//! post work back onto the runtime rather than run inline; `nostr-sdk`'s
//! Rust API instead delivers notifications through its own broadcast
//! channel on the calling runtime, so there is no foreign thread to bridge
//! from. The contract is still the same one: `handle` must return promptly
//! and must never block, so it spawns a task per event and returns
//! immediately.

use crate::badge::BadgePublisher;
use crate::classifier::{self, Classified};
use crate::config::NotaryConfig;
use crate::kinds::{GIFT_WRAP_KIND, RECEIPT_KIND, REPORT_KIND};
use crate::link;
use crate::receipt;
use crate::report;
use crate::store::Store;
use nostr::{Alphabet, Event, Filter, Keys, Kind, PublicKey, SingleLetterTag, Timestamp};
use nostr_sdk::{Client, HandleNotification, RelayPoolNotification};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid notary secret key: {0}")]
    InvalidSecretKey(String),
    #[error("invalid relay URL {0}: {1}")]
    InvalidRelayUrl(String, String),
    #[error("failed to connect within the I/O timeout")]
    ConnectTimedOut,
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

struct NotificationHandler {
    store: Arc<Store>,
    badges: Arc<BadgePublisher>,
    client: Client,
    keys: Keys,
    trusted_coordinators: Arc<HashSet<String>>,
    relay_hint: Option<String>,
    io_timeout: Duration,
}

impl NotificationHandler {
    async fn process_event(self: Arc<Self>, event: Event) {
        let kind = event.kind.as_u16();
        if kind != RECEIPT_KIND && kind != REPORT_KIND && kind != GIFT_WRAP_KIND {
            return;
        }

        let now = now_unix();
        match classifier::classify(&event, &self.trusted_coordinators) {
            Some(Classified::Receipt(r)) => {
                receipt::process_receipt(&self.store, &self.badges, r, now).await
            }
            Some(Classified::Report(r)) => {
                report::process_report(&self.store, &self.badges, r, now).await
            }
            Some(Classified::GiftWrap) => {
                link::process_gift_wrap(
                    &event,
                    &self.keys,
                    &self.store,
                    &self.badges,
                    &self.client,
                    self.relay_hint.as_deref(),
                    now,
                    self.io_timeout,
                )
                .await
            }
            None => {}
        }
    }
}

#[async_trait::async_trait]
impl HandleNotification for NotificationHandler {
    async fn handle(
        &self,
        _relay_url: nostr_sdk::RelayUrl,
        _subscription_id: nostr::SubscriptionId,
        event: Box<Event>,
    ) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let handler = Arc::new(NotificationHandler {
            store: self.store.clone(),
            badges: self.badges.clone(),
            client: self.client.clone(),
            keys: self.keys.clone(),
            trusted_coordinators: self.trusted_coordinators.clone(),
            relay_hint: self.relay_hint.clone(),
            io_timeout: self.io_timeout,
        });
        tokio::spawn(async move {
            handler.process_event(*event).await;
        });
        Ok(false)
    }

    async fn handle_msg(
        &self,
        _relay_url: nostr_sdk::RelayUrl,
        _msg: nostr_sdk::RelayMessage,
    ) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(false)
    }
}

pub struct Supervisor {
    config: NotaryConfig,
    client: Client,
    keys: Keys,
    store: Arc<Store>,
    badges: Arc<BadgePublisher>,
    notifications_task: Option<tokio::task::JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(config: NotaryConfig) -> anyhow::Result<Self> {
        let keys = Keys::parse(&config.nsec)
            .map_err(|e| ServiceError::InvalidSecretKey(e.to_string()))?;
        let store = Arc::new(Store::open(&config.db_path)?);
        let client = Client::new(keys.clone());
        let badges = Arc::new(BadgePublisher::new(
            client.clone(),
            keys.clone(),
            store.clone(),
            config.io_timeout,
        ));

        Ok(Self {
            config,
            client,
            keys,
            store,
            badges,
            notifications_task: None,
        })
    }

    pub fn notary_pubkey_hex(&self) -> String {
        self.keys.public_key().to_hex().to_ascii_lowercase()
    }

    /// Connects relays, installs subscriptions, and starts the notification
    /// bridge (§4.7 steps 1-4).
    pub async fn start(&mut self) -> anyhow::Result<()> {
        for url in &self.config.relay_urls {
            self.client
                .add_relay(url.as_str())
                .await
                .map_err(|e| ServiceError::InvalidRelayUrl(url.clone(), e.to_string()))?;
        }

        tokio::time::timeout(self.config.io_timeout, self.client.connect())
            .await
            .map_err(|_| ServiceError::ConnectTimedOut)?;

        let handler = NotificationHandler {
            store: self.store.clone(),
            badges: self.badges.clone(),
            client: self.client.clone(),
            keys: self.keys.clone(),
            trusted_coordinators: Arc::new(self.config.trusted_coordinator_pubkeys.clone()),
            relay_hint: self.config.relay_urls.first().cloned(),
            io_timeout: self.config.io_timeout,
        };
        let client_for_notifications = self.client.clone();
        self.notifications_task = Some(tokio::spawn(async move {
            if let Err(err) = client_for_notifications.handle_notifications(handler).await {
                warn!(error = %err, "notification loop ended");
            }
        }));

        let since = Timestamp::from(self.config.since_secs);
        let giftwrap_since = Timestamp::from(self.config.giftwrap_since_secs);
        let authors: Vec<PublicKey> = self
            .config
            .trusted_coordinator_pubkeys
            .iter()
            .filter_map(|p| PublicKey::from_hex(p).ok())
            .collect();

        let receipt_filter = Filter::new()
            .kind(Kind::Custom(RECEIPT_KIND))
            .authors(authors.clone())
            .since(since);
        let report_filter = Filter::new()
            .kind(Kind::Custom(REPORT_KIND))
            .authors(authors)
            .since(since);
        let mut gift_filter = Filter::new()
            .kind(Kind::Custom(GIFT_WRAP_KIND))
            .since(giftwrap_since);
        if !self.config.debug {
            gift_filter = gift_filter.custom_tag(
                SingleLetterTag::lowercase(Alphabet::P),
                self.notary_pubkey_hex(),
            );
        }

        let timeout = self.config.io_timeout;
        tokio::time::timeout(
            timeout,
            self.client
                .subscribe_with_id(nostr::SubscriptionId::new("receipts"), receipt_filter, None),
        )
        .await
        .map_err(|_| ServiceError::ConnectTimedOut)??;
        tokio::time::timeout(
            timeout,
            self.client
                .subscribe_with_id(nostr::SubscriptionId::new("reports"), report_filter, None),
        )
        .await
        .map_err(|_| ServiceError::ConnectTimedOut)??;
        tokio::time::timeout(
            timeout,
            self.client
                .subscribe_with_id(nostr::SubscriptionId::new("links"), gift_filter, None),
        )
        .await
        .map_err(|_| ServiceError::ConnectTimedOut)??;

        info!(
            notary_pubkey_hex = %self.notary_pubkey_hex(),
            relay_urls = ?self.config.relay_urls,
            trusted_coordinators = self.config.trusted_coordinator_pubkeys.len(),
            since_secs = self.config.since_secs,
            giftwrap_since_secs = self.config.giftwrap_since_secs,
            "notary service running"
        );

        Ok(())
    }

    /// Best-effort shutdown: every step is allowed to fail independently
    /// (§4.7 "each step is best-effort; errors are swallowed").
    pub async fn stop(&mut self) {
        if let Some(task) = self.notifications_task.take() {
            task.abort();
        }
        if let Err(err) = self.client.unsubscribe_all().await {
            warn!(error = %err, "failed to unsubscribe cleanly");
        }
        self.client.disconnect().await;
        if let Err(err) = self.store.flush() {
            warn!(error = %err, "failed to flush store on shutdown");
        }
    }
}
