//! Voice webhooks: call state, the flow state machine, and the documents it emits.

pub mod flow;
pub mod state;
pub mod twiml;

pub use flow::CallFlow;
pub use state::CallState;
pub use twiml::VoiceResponse;
