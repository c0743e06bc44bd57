// VoteTally - app/mod.rs
//
// Application layer: engine orchestration, event intake, expiry polling and
// durable documents.
// Dependencies: core layer, platform traits.

pub mod engine;
pub mod ingest;
pub mod poller;
pub mod state;
pub mod store;
