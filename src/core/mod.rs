// VoteTally - core/mod.rs
//
// Core business logic layer: scoring, aggregation, registry, vote guard.
// Dependencies: standard library plus serde/chrono data types.
// Must NOT depend on: platform, app, or perform any I/O.

pub mod aggregation;
pub mod export;
pub mod history;
pub mod model;
pub mod registry;
pub mod scoring;
pub mod settings;
pub mod vote_guard;
