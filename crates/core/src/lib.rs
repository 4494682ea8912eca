//! Call relay core.
//!
//! Everything that holds per-call state or defines a wire format lives here,
//! free of sockets and HTTP clients: the telephony and model protocols, the
//! model session bootstrap, the contracts for the transcription and
//! conversation-log collaborators, and the [`relay::CallSession`] state
//! machine that ties them together.

pub mod bootstrap;
pub mod caller;
pub mod conversation;
pub mod realtime;
pub mod relay;
pub mod transcription;
pub mod wav;
