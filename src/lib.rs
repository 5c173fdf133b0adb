//! Advisor-chain chat client framework.
//!
//! A [`client::ChatClient`] wraps a model collaborator with an ordered chain
//! of [`advisor::Advisor`]s that transform the request on the way in and
//! observe the response on the way out, plus a bounded tool-calling loop
//! that satisfies model-issued tool requests locally before resubmitting.

pub mod advisor;
pub mod agent;
pub mod client;
pub mod errors;
pub mod models;
pub mod prompt;
pub mod prompt_template;
pub mod providers;
pub mod store;
pub mod stream;
pub mod tools;
