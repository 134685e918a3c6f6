//! GitHub device-flow authentication and Copilot token acquisition.
//!
//! - [`device_flow`] speaks the two RFC 8628 HTTP calls.
//! - [`service::DeviceFlowService`] runs them against a stored credential
//!   and persists the outcome.
//! - [`copilot`] exchanges a GitHub access token for a short-lived Copilot
//!   API token, backed by the in-memory [`TokenCache`].
//! - [`flow::login`] is the caller-side polling loop used by the CLI.

pub mod cache;
pub mod copilot;
pub mod device_flow;
pub mod flow;
pub mod http;
pub mod service;

pub use cache::TokenCache;
pub use copilot::{CopilotAuth, CopilotTokenExchanger};
pub use device_flow::{DeviceFlowClient, PollOutcome};
pub use service::{DeviceFlowService, DeviceFlowStart, DeviceFlowStatus};
