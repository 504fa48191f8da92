//! # dcse-crawler
//!
//! Repository-to-stream ingestion for the code search indexer.
//!
//! The crawler clones a source repository, walks its files, turns each one
//! into a small document (path, language tag, truncated text, SHA-256 of the
//! full bytes) and appends it to a Redis stream that the indexer consumes.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌──────────────┐
//! │   Clone   │──▶│  Walker  │──▶│ Normalize │──▶│ Publisher │──▶│ Redis stream │
//! │ (git CLI) │   │ walkdir  │   │  + SHA256 │   │ XADD+retry│   │ "dcse_stream"│
//! └───────────┘   └──────────┘   └───────────┘   └───────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dcse-crawler ingest https://github.com/spring-projects/spring-petclinic.git
//! dcse-crawler ingest <url> --dry-run --progress json
//! dcse-crawler walk ./cloned_repo
//! dcse-crawler check
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`models`] | File entries, documents and the wire format |
//! | [`hasher`] | Content fingerprints |
//! | [`normalize`] | File → document |
//! | [`walker`] | Deterministic tree walk and filter policy |
//! | [`clone`] | Clone collaborator |
//! | [`stream`] | Stream collaborator (Redis, in-memory) |
//! | [`publisher`] | Retry, timeout and dedup around appends |
//! | [`pipeline`] | Run orchestration and counters |
//! | [`progress`] | Progress reporting |
//! | [`error`] | Error types |

pub mod clone;
pub mod config;
pub mod error;
pub mod hasher;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod publisher;
pub mod stream;
pub mod walker;
