pub mod cli;
pub mod error;
pub mod http;
pub mod provider;

pub use cli::{CliLlmConfig, CliLlmProvider};
pub use error::LlmError;
pub use http::{HttpLlmConfig, HttpLlmProvider};
pub use provider::{LlmProvider, Message, Role};
