//! Adapters binding the domain to storage, files, and transports.

pub mod audit;
pub mod llm;
pub mod sqlite;
