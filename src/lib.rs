//! CAS (Central Authentication Service) ticket-validation strategy.
//!
//! The protocol core lives in `cas-strategy-core` and is re-exported here.
//! The actix-web integration is available under [`actix`] when the
//! `actix-framework` feature is enabled.

pub use cas_strategy_core::*;

#[cfg(feature = "actix-framework")]
pub use cas_strategy_actix as actix;
