//! Engine Tools
//!
//! Adapters for the external services the agents drive. Every adapter sits
//! behind a trait so agents can be tested against in-memory fakes.

pub mod audit;
pub mod browser;
pub mod email_platform;
pub mod kv;
pub mod storage;

pub use audit::AuditLog;
pub use browser::{Browser, BrowserError, BrowserLauncher, HarnessClient, Page};
pub use email_platform::{EmailPlatform, EmailPlatformConnector, SmartleadConnector};
pub use kv::{CloudflareKv, KvStore, MemoryKv};
pub use storage::{BlobStore, FsBlobStore, StorageError, StoredObject};
