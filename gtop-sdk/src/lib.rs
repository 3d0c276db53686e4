//! Shared wire types for the gtop game top-up gateway.
//!
//! Everything a storefront client, the payment gateway, or an internal
//! scheduler needs to talk to `gtop-server` lives here, together with the
//! small auth helpers both sides of the wire agree on.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod objects;
