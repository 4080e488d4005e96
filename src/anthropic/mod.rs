pub mod client;
pub mod error;
pub mod types;

pub use client::{AnthropicClient, AnthropicTextGenerator};
pub use error::AnthropicError;
