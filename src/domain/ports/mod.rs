//! Ports to external collaborators.

pub mod chat_model;

pub use chat_model::{ChatModel, ChatRequest};
