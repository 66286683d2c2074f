// OpenAI Transport
//
// This crate provides the HTTPS CompletionTransport used in production.
// It only performs the round trip: status codes and the provider's error
// message are handed back to agentdesk-core, which classifies them.

mod transport;

#[cfg(test)]
mod tests;

pub use transport::OpenAiTransport;

// Re-export core trait for convenience
pub use agentdesk_core::CompletionTransport;
