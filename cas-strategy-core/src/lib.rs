//! Client-side implementation of the CAS ticket-validation protocol.
//!
//! A [`CasStrategy`] decides, for every incoming request, between redirecting
//! to the SSO login page, honoring a front-channel single-logout request, and
//! validating a service ticket against the CAS server (CAS 1.0 plain text,
//! CAS 3.0 XML, or CAS 3.0 SAML 1.1). The outcome of a validation is reduced
//! to an accept/reject/error decision through a verify callback.

#[macro_use]
extern crate log;

mod config;
mod error;
mod principal;
mod protocol;
mod request;
mod strategy;
mod transport;

pub use crate::config::{CasConfig, CasVersion};
pub use crate::error::CasError;
pub use crate::principal::CasPrincipal;
pub use crate::protocol::{FailureReason, ValidationOutcome};
pub use crate::request::CasRequest;
pub use crate::strategy::{
    AuthDecision, AuthenticateOptions, CasStrategy, Verdict, VerifyContext,
};
