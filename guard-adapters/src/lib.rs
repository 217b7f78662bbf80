//! Model adapters used to reach the reasoning oracle.
//!
//! Providers implement the shared [`traits::ModelAdapter`] interface; the
//! decision pipeline only ever talks to that trait.

#![warn(missing_docs, clippy::pedantic)]

pub mod http;
pub mod openai_compat;
pub mod traits;
