//! Domain layer: models, ports, canonical serialization, and errors.

pub mod canonical;
pub mod errors;
pub mod id;
pub mod models;
pub mod ports;

pub use errors::{CoreError, CoreResult};
