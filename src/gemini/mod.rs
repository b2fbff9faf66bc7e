//! Gemini `generateContent` with Google Search grounding (candidate/grounding responses).

pub mod client;
pub mod grounding;
mod types;
