//! Gateway: HTTP surface of the retrieval-augmented chat pipeline.
//!
//! Lifecycle:
//! 1. Load environment configuration (fallback credentials, key policy)
//! 2. Bind address, start HTTP server (health, chat)
//! 3. Each `/api/chat` request runs one pipeline invocation and streams the
//!    reply back as raw bytes
//!
//! All domain logic (augmentation, relaying, memory) lives in other crates;
//! this one only resolves credentials, wires clients, and maps errors to
//! HTTP statuses.

pub mod chat;
pub mod config;
pub mod server;
