// Streaming relay to an OpenAI-compatible chat-completion endpoint.

pub mod client;
pub mod fragment;
pub mod sse;

pub use client::{FragmentStream, RelayClient, RelayOutcome, UpstreamConfig};
pub use fragment::{Fragment, RelayError};
