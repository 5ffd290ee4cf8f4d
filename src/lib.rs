//! # grounded-chat
//!
//! A retrieval-augmented chat service. Questions are embedded, matched
//! against a vector store, and answered by a language model that only sees
//! the retrieved context. Answers are streamed back as plain text while the
//! model generates them. An offline command ingests text and PDF documents
//! into the store.
//!
//! ## Architecture
//!
//! ```text
//!  ingest (offline)
//! ┌──────────┐   ┌─────────┐   ┌───────────┐   ┌──────────────┐
//! │ extract  │──▶│  chunk  │──▶│ embedding │──▶│ vector store │
//! └──────────┘   └─────────┘   └───────────┘   └──────┬───────┘
//!                                                     │
//!  POST /chat                                         ▼
//! ┌──────────┐   ┌───────────┐   ┌────────────┐   ┌─────────┐
//! │  server  │──▶│ retrieval │──▶│ completion │──▶│  relay  │──▶ client
//! └──────────┘   └───────────┘   └────────────┘   └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! grounded-chat ingest --file ./docs/handbook.pdf
//! grounded-chat serve --bind 0.0.0.0:3000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`models`] | Core data types |
//! | [`error`] | Error types and HTTP mapping |
//! | [`extract`] | Text and PDF reading |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store (Supabase, in-memory) |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retrieval`] | Context retrieval and prompt assembly |
//! | [`completion`] | Streaming chat-completion client |
//! | [`relay`] | SSE to plain-text stream relay |
//! | [`server`] | HTTP server |

pub mod chunk;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod models;
pub mod relay;
pub mod retrieval;
pub mod server;
pub mod store;
