//! Error-event synchronization engine.
//!
//! Connects error-tracker webhooks to chat cards:
//!
//! - [`routing`]: which channels an event goes to
//! - [`ingest`]: webhook authentication and the one-card-per-error upsert
//! - [`actions`]: button presses (assign, resolve, ignore, open)
//! - [`sync`]: the background loop that refreshes registered cards
//!
//! Rendering lives in [`card`]; the buttons' enabled state is always
//! derived from the card's current status and assignee.
//!
//! # Example
//!
//! ```rust,ignore
//! use snagbridge_engine::{CardSettings, ErrorEvent, WebhookIngestor};
//!
//! let ingestor = WebhookIngestor::new(store, chat, CardSettings::default());
//! let event = ErrorEvent::from_json(&body)?;
//! let report = ingestor.ingest(&event, None).await?;
//! println!("{} card(s) upserted", report.processed);
//! ```

pub mod actions;
pub mod card;
pub mod error;
pub mod event;
pub mod identity;
pub mod ingest;
pub mod routing;
pub mod sync;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use actions::{
    ActionContext, ActionHandler, ActionOutcome, ActionRequest, CardAction, DEFAULT_ACTION_TIMEOUT,
};
pub use card::{CardSettings, MAX_STACK_FRAMES};
pub use error::{EngineError, EngineResult};
pub use event::{ErrorEvent, WebhookPayload};
pub use ingest::{CardOutcome, IngestReport, WebhookAuth, WebhookIngestor};
pub use sync::{SyncScheduler, SyncSupervisor, SyncWorker, TickReport};
