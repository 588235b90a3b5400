//! Downstream read surface (§6 "Output to downstream sinks"): a thin
//! `axum` HTTP/WebSocket layer over [`crate::state::EngineState`]'s read
//! views. Ambient observability, not a core module — nothing here mutates
//! engine state.

pub mod rest;
pub mod ws;
