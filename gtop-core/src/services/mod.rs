//! Request-level operations.
//!
//! Each service owns one API area and its error type; the server maps those
//! errors onto HTTP responses.

pub mod admin;
pub mod checkout;
pub mod payment_webhook;
pub mod verification;
pub mod wallet;

pub use admin::{AdminWalletService, Adjustment, CatalogError, ProductLinkService};
pub use checkout::{CheckoutError, CheckoutService};
pub use payment_webhook::{PaymentWebhookService, WebhookTarget, classify_target};
pub use verification::{PlayerVerification, PlayerVerifier, VerificationError};
pub use wallet::{WalletError, WalletService};
