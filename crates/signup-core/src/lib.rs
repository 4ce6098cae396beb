//! # signup-core
//!
//! Tenant signup provisioning with payment authorization from one of two
//! interchangeable processors, and exactly-once tenant finalization.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                          SignupService                            │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌─────────────────────┐  │
//! │  │   Provider   │  │     Checkout     │  │  PaymentProcessor   │  │
//! │  │   Selector   │──│   Orchestrator   │──│     (Strategy)      │  │
//! │  └──────────────┘  └──────────────────┘  └─────────────────────┘  │
//! │                            │                                      │
//! │                    ┌───────▼───────┐     ┌─────────────────────┐  │
//! │                    │  IntentStore  │◀────│      Finalizer      │  │
//! │                    └───────────────┘     │ (AccountProvisioner)│  │
//! │                                          └─────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `PaymentProcessor` trait lets checkout logic run unchanged against
//! Stripe, MercadoPago, or the bundled mock processors.

pub mod account;
pub mod api;
pub mod checkout;
pub mod error;
pub mod finalize;
pub mod intent;
pub mod plan;
pub mod processor;
pub mod provider;
pub mod service;
pub mod status;
pub mod store;

pub use account::{AccountProvisioner, Company, CompanyId, MemoryAccountDirectory, NewTenant};
pub use checkout::{CheckoutOrchestrator, CheckoutOutcome};
pub use error::{ErrorKind, ErrorReport, Result, SignupError};
pub use finalize::{FinalizeOutcome, Finalizer};
pub use intent::{Intent, IntentId, SignupDetails};
pub use plan::{BillingInterval, PlanCatalog, PlanPricing};
pub use processor::{CaptureMode, MockProcessor, PaymentProcessor, ProcessorRegistry};
pub use provider::{select_provider, PaymentProvider};
pub use service::SignupService;
pub use status::IntentStatus;
pub use store::{IntentStore, LinkOutcome, MemoryIntentStore};
