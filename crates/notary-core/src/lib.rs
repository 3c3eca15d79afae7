//! Pure, I/O-free core of the buyer reputation notary.
//!
//! This crate holds everything that is a deterministic function of its
//! inputs: pubkey/network canonicalization, tag extraction, the reputation
//! tier function, and the value types shared between the embedded store and
//! the event processors. Nothing here touches a relay, a file, or a clock
//! other than through an explicit `now` parameter.
//!
//! # Modules
//!
//! - [`hexkey`]: hex-pubkey validation and canonicalization.
//! - [`tags`]: tolerant first-match-wins tag extraction.
//! - [`model`]: `Receipt`, `Report`, `Link`, and the pending-handshake rows.
//! - [`tier`]: the reputation tier function.
//!
//! Every fallible path here is modeled as `Option`, not a typed error:
//! malformed/empty input is a normal silent drop (§7), never an exceptional
//! condition, so there is no shared `Error` type to construct or propagate.

pub mod hexkey;
pub mod model;
pub mod tags;
pub mod tier;

pub use model::{Network, PendingLinkConfirm, PendingLinkRequest, Receipt, Report, Tier};
