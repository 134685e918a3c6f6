//! Core types and traits for the ghgate workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! gateway: the error type, the credential record and its typed attribute
//! view, device-flow and token values, and the credential store trait.

pub mod credential;
pub mod error;
pub mod token;
pub mod traits;

pub use credential::{Credential, CredentialAttributes, attr};
pub use error::GateError;
pub use token::{
    AccessToken, CachedToken, CopilotToken, DeviceAuthorization, PendingReason, TokenSource,
    normalize_expiry, unix_now,
};
pub use traits::CredentialStore;
