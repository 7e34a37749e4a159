//! LEOIPTV offline core
//!
//! Offline delivery for the LEOIPTV player. The core precaches the
//! application shell and serves same-origin GETs cache-first. Eligible
//! responses are written through to a runtime cache, and failed navigations
//! fall back to the cached shell. A tagged background task refreshes
//! playlist data.
//!
//! The crate is a handler set: a host runtime delivers [`worker::Event`]s and
//! supplies the collaborators (cache store, transport, client registry,
//! notifier, playlist source) through traits.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod lifecycle;
pub mod logging;
pub mod notify;
pub mod platform;
pub mod store;
pub mod sync;
pub mod transport;
pub mod worker;

pub use error::{OfflineError, OfflineResult};
pub use worker::{Event, EventOutcome, Platform, ServiceWorker, WorkerState};
