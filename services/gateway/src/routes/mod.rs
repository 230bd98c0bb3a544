//! HTTP handlers, grouped by API area

pub mod automation;
pub mod domain;
pub mod health;
pub mod storage;
pub mod warmup;
