//! Page Responder — Messenger webhook auto-responder.

pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod webhook;
