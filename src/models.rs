//! These models represent the objects passed between the client, the
//! advisors, and the model collaborator.
//!
//! Provider wire formats (openai, anthropic, etc.) overlap but never match
//! exactly, so everything is converted into these internal structs at the
//! boundary and the core only ever reasons about them.

pub mod content;
pub mod message;
pub mod role;
pub mod tool;
