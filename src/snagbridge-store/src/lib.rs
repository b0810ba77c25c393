//! Snagbridge Store - persistence for error cards.
//!
//! Everything the bridge remembers lives behind a two-operation key-value
//! contract (`get` / `set`), namespaced per deployment:
//!
//! - routing rules (project to channel, with optional filters)
//! - chat user to error-tracker identity mappings
//! - one card mapping per unique error
//! - the active error registry walked by the reconciliation loop
//!
//! # Usage
//!
//! ```rust,no_run
//! use snagbridge_store::{CardStore, CardMapping};
//!
//! # async fn demo() -> snagbridge_store::Result<()> {
//! let store = CardStore::in_memory("com.mattermost.bugsnag");
//! let _guard = store.lock_card("project", "error").await;
//! if store.card_mapping("project", "error").await?.is_none() {
//!     store
//!         .save_card_mapping(&CardMapping {
//!             project_id: "project".into(),
//!             error_id: "error".into(),
//!             channel_id: "channel".into(),
//!             post_id: "post".into(),
//!         })
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod keys;
pub mod kv;
pub mod list;
pub mod locks;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use kv::{FileKv, KvStore, MemoryKv, Namespaced};
pub use list::{Upsert, upsert_by};
pub use locks::{KeyGuard, KeyLocks};
pub use records::{ActiveError, CardMapping, RoutingRule, UserMapping};
pub use store::CardStore;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "com.mattermost.bugsnag";
