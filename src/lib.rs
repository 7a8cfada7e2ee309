//! # filehound
//!
//! Local hybrid file search: semantic (embedding) retrieval fused with fuzzy
//! filename and content matching over a SQLite index.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────────┐
//! │   walk    │──▶│   indexer    │──▶│    SQLite    │
//! │ scan+hash │   │ chunk+embed  │   │ files+vectors│
//! └───────────┘   └──────────────┘   └──────┬───────┘
//!                                           │
//!                     ┌─────────────────────┤
//!                     ▼                     ▼
//!               ┌──────────┐          ┌──────────┐
//!               │ semantic │          │  fuzzy   │
//!               └────┬─────┘          └────┬─────┘
//!                    └─────── fusion ──────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fh init                          # create database
//! fh index ~/src/project           # index a tree
//! fh search "auth config"          # combined search
//! fh search "login" --mode semantic --ext .py
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`store`] | File metadata store |
//! | [`chunk`] | Text chunking |
//! | [`vector_index`] | Vector storage and similarity ranking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`walk`] | Directory traversal and file scanning |
//! | [`indexer`] | Directory indexing pipeline |
//! | [`semantic`] | Semantic search |
//! | [`fuzzy`] | Fuzzy filename/content search |
//! | [`fusion`] | Result fusion |
//! | [`engine`] | Query surface |
//! | [`stats`] | Index statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`logging`] | Log subscriber setup |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod fuzzy;
pub mod indexer;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod semantic;
pub mod stats;
pub mod store;
pub mod vector_index;
pub mod walk;
