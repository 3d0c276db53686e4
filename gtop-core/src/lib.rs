#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod entities;
pub mod events;
pub mod framework;
pub mod processors;
pub mod provider;
pub mod repository;
pub mod services;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
