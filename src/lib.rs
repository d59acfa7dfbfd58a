//! # ragviz
//!
//! Shows how retrieval-augmented generation finds its context.
//!
//! ragviz splits a document into overlapping word windows, embeds every
//! window, ranks the windows against a query by cosine similarity, and lays
//! the query and the chunks out on a 2D plane so the ranking can be seen.
//! The algorithms live in [`ragviz_core`]; this crate adds configuration,
//! the hosted embedding backends, a CLI, and an HTTP API for front-ends.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────┐   ┌───────────────┐
//! │ Document │──▶│ Chunker (core)   │──▶│ Embedding     │
//! │ (file/-) │   │ word windows     │   │ Gemini/OpenAI │
//! └──────────┘   └──────────────────┘   │ Ollama/mock   │
//!                                       └──────┬────────┘
//!                                              ▼
//!                 ┌──────────┐        ┌──────────────────┐
//!                 │   CLI    │◀───────│ RetrievalPipeline│
//!                 │ (ragviz) │        │ rank + project   │
//!                 └──────────┘        └────────┬─────────┘
//!                                              ▼
//!                                        ┌──────────┐
//!                                        │   HTTP   │
//!                                        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragviz chunk notes.md --chunk-size 50 --overlap 10
//! ragviz query notes.md "where do cats live?" --seed 0.5
//! ragviz tokens notes.md
//! ragviz serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Hosted and local embedding backends |
//! | [`input`] | Reading documents from files or stdin |
//! | [`chunk_cmd`] | `ragviz chunk` |
//! | [`query_cmd`] | `ragviz query` |
//! | [`tokens_cmd`] | `ragviz tokens` |
//! | [`server`] | HTTP visualization API |

pub mod chunk_cmd;
pub mod config;
pub mod embedding;
pub mod input;
pub mod query_cmd;
pub mod server;
pub mod tokens_cmd;
