//! The advisor chain: precedence-ordered participants that observe and
//! transform a request before, and a response after, the core model call.

pub mod chain;
pub mod envelope;
pub mod memory;

pub use chain::{Advisor, AdvisorChain, CallChain, CallTerminal, ResponseStream, StreamChain, StreamTerminal};
pub use envelope::{AdvisedRequest, AdvisedResponse};
