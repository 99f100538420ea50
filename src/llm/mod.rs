pub mod client;
pub mod prompts;
pub mod provider;
pub mod types;

pub use client::*;
pub use provider::*;
