//! Status surface abstractions (progress messages, prompts, buttons).

pub mod port;
pub mod types;
