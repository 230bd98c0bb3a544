//! Agent modules for the Warpify Engine
//!
//! - `domain_setup`: zone provisioning, mail records and forwarding redirects
//! - `login_automation`: browser-driven mailbox sign-in with bounded retries
//! - `warmup`: mailbox warmup and bulk reconnect on the email platform

pub mod domain_setup;
pub mod login_automation;
pub mod warmup;

pub use domain_setup::DomainAgent;
pub use login_automation::LoginAutomationAgent;
pub use warmup::WarmupAgent;
