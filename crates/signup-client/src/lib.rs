//! # signup-client
//!
//! Host-agnostic client side of the tenant signup pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     SignupPipeline                      │
//! │  ┌──────────────┐  ┌─────────────────┐  ┌────────────┐  │
//! │  │ Confirmation │  │  RecoveryCache  │  │ Navigation │  │
//! │  │    Poller    │  │ (memory / file) │  │  commands  │  │
//! │  └──────┬───────┘  └─────────────────┘  └────────────┘  │
//! │         │                                               │
//! │  ┌──────▼──────────────────────────────────────────┐    │
//! │  │     SignupApi (HttpSignupApi / LocalSignupApi)  │    │
//! │  └─────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The host (web view, desktop shell, CLI) renders forms and performs the
//! [`Navigation`] it is handed; all signup decisions are made here.

pub mod api;
pub mod cache;
pub mod error;
pub mod pipeline;
pub mod poller;

pub use api::{HttpSignupApi, LocalSignupApi, SignupApi};
pub use cache::{FileStorage, MemoryStorage, RecoveryCache, RecoveryEntry, RecoveryStorage};
pub use error::CacheError;
pub use pipeline::{return_params, Navigation, SignupForm, SignupPipeline};
pub use poller::{ConfirmationPoller, PollCursor, PollOutcome, PollerConfig};
