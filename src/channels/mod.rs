//! Adapters for the external services the pipeline talks to.

pub mod messenger;
pub mod sheets;

pub use messenger::{GraphSendClient, GraphUserDirectory};
pub use sheets::SheetsKeywordSource;
