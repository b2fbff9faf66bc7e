//! Anthropic Messages API with the `web_search` server tool (message-block responses).

pub mod client;
pub mod normalize;
mod types;
