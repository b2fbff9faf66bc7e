//! OpenAI Responses API with the `web_search` tool (call/action responses).

pub mod client;
pub mod normalize;
mod types;
