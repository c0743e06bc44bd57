// VoteTally - lib.rs
//
// Library entry point. The engine is embedded by a chat gateway process;
// the `votetally` binary uses the same modules for offline administration.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
