//! # Atelier
//!
//! A personal workspace for tasks, papers, notes and journal entries,
//! served over a small JSON API.
//!
//! Records in every collection carry a list of tag names; a shared tag
//! catalog lists the names in use. Tags can be merged across the whole
//! workspace, text and JSON completions go through a chain of LLM
//! providers with fallback, and research feeds can be parsed and ranked.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐
//! │   CLI    │──▶│  records   │──▶│    SQLite    │
//! │ atelier  │   │  merge     │   │ tags + 4     │
//! └──────────┘   │ (TagStore) │   │ collections  │
//!       │        └────────────┘   └──────────────┘
//!       ▼              ▲
//! ┌──────────┐         │          ┌──────────────┐
//! │   HTTP   │─────────┘   ┌─────▶│ Gemini       │
//! │  (axum)  │──▶ completion ────▶│ OpenAI-compat│
//! └──────────┘                    └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and credential resolution |
//! | [`error`] | Typed not-found and invalid-input errors |
//! | [`models`] | Collections, tags and records |
//! | [`store`] | [`store::TagStore`] trait with SQLite and in-memory backends |
//! | [`merge`] | Workspace-wide tag merge |
//! | [`records`] | Record CRUD |
//! | [`backlinks`] | Notes that reference a note |
//! | [`completion`] | LLM gateway with ordered provider fallback |
//! | [`feed`] | RSS/Atom parsing |
//! | [`trending`] | Cross-feed paper ranking |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod backlinks;
pub mod completion;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod merge;
pub mod migrate;
pub mod models;
pub mod records;
pub mod server;
pub mod store;
pub mod tags_cmd;
pub mod trending;
