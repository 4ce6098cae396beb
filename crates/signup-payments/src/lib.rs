//! # signup-payments
//!
//! Real payment processors for tenant signup.
//!
//! ## Capture styles
//!
//! ### 1. Stripe (redirect) - every country except Argentina
//!
//! Either an embedded Elements widget backed by a SetupIntent, or Stripe's
//! hosted checkout page in setup mode:
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │   Signup    │────▶│  Stripe Hosted  │────▶│   Confirmation   │
//! │   wizard    │     │ Checkout (setup)│     │ page (polls)     │
//! └─────────────┘     └─────────────────┘     └──────────────────┘
//! ```
//!
//! ### 2. MercadoPago (inline) - Argentina
//!
//! The card form tokenizes in the browser; the token is saved to a
//! MercadoPago customer and the intent is ready immediately.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use signup_core::ProcessorRegistry;
//! use signup_payments::{MercadoPagoProcessor, StripeProcessor};
//!
//! let processors = ProcessorRegistry::new()
//!     .with(Arc::new(StripeProcessor::from_env()?))
//!     .with(Arc::new(MercadoPagoProcessor::from_env()?));
//! ```

mod error;
mod mercadopago;
mod stripe_processor;
mod webhook;

pub use error::{PaymentError, Result};
pub use mercadopago::{MercadoPagoConfig, MercadoPagoProcessor};
pub use stripe_processor::StripeProcessor;
pub use webhook::{StripeWebhookHandler, WebhookEvent, WebhookOutcome};
