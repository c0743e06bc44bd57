// VoteTally - platform/mod.rs
//
// Platform abstraction layer: chat platform seam, time source, config files.
// Dependencies: core model types, directories crate.
// Must NOT depend on: app.

pub mod clock;
pub mod config;
pub mod gateway;
pub mod memory;
