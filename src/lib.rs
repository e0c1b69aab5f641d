//! Engram: a self-improving coding-agent substrate.
//!
//! Records build/test/lint executions, extracts recurring failure patterns,
//! promotes stable patterns into durable project knowledge, renders that
//! knowledge into a guidance document, and explores tasks best-of-N with a
//! pairwise comparative judge.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod services;

pub use domain::{CoreError, CoreResult};
pub use services::{Config, ProjectPaths};
