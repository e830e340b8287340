//! mathq daemon - concurrent TCP math server
//!
//! This crate provides the server side of mathq:
//! - `config` - layered server configuration
//! - `event_log` - timestamped protocol event log
//! - `registry` - client registry actor (name → session)
//! - `queue` - global FIFO request queue and the single evaluation worker
//! - `server` - TCP listener and per-connection session handlers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       mathqd daemon                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   MathServer    │────▶│     RegistryActor           │   │
//! │  │  (TcpListener)  │     │  (client name owner)        │   │
//! │  └────────┬────────┘     └─────────────────────────────┘   │
//! │           │                             ▲                   │
//! │           │ connections                 │ JOIN / cleanup    │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐     ┌──────────────┴──────────────┐   │
//! │  │ SessionHandler  │────▶│   RequestQueue (mpsc)       │   │
//! │  │  (per client)   │     │          │                  │   │
//! │  └─────────────────┘     │          ▼                  │   │
//! │           ▲              │   EvaluationWorker          │   │
//! │           └──────────────┤   (RES / ERR replies)       │   │
//! │                          └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod event_log;
pub mod queue;
pub mod registry;
pub mod server;
pub mod writer;
