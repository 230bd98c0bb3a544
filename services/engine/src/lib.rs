//! Warpify Engine Library
//!
//! Domain logic behind the gateway: login automation, domain provisioning,
//! mailbox warmup, and the adapters for the services they drive.

pub mod agents;
pub mod tools;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use agents::domain_setup::{DomainError, DomainSetup};
pub use agents::login_automation::{AutomationError, AutomationOptions, AutomationResult};
pub use agents::warmup::WarmupError;
pub use agents::{DomainAgent, LoginAutomationAgent, WarmupAgent};
pub use tools::{AuditLog, BlobStore, KvStore};
