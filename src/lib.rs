//! # Catalog Search Sync
//!
//! Keeps a catalog of sellable items synchronized into a Typesense
//! collection and compiles storefront filter selections into Typesense
//! queries.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌────────────┐
//! │  Catalog  │──▶│ IndexingEngine│──▶│  Typesense  │
//! │ (SQLite)  │   │ cursor+mapper │   │ collection  │
//! └───────────┘   └──────┬───────┘   └─────┬──────┘
//!                        │ flags            │ hits
//!                        ▼                  ▼
//!                 ┌────────────┐     ┌─────────────┐
//!                 │  Progress  │     │SearchService│
//!                 │  (SQLite)  │     │filter+result│
//!                 └────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! catsync init                          # create database
//! catsync catalog import items.json     # load the catalog mirror
//! catsync index --progress human        # tick until complete
//! catsync search "spiderman" --sort price
//! catsync serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Catalog items, search documents, index state |
//! | [`error`] | Error taxonomy of the indexing and search paths |
//! | [`engine`] | Search engine client trait |
//! | [`typesense`] | Typesense HTTP client |
//! | [`schema`] | Collection schema and idempotent creation |
//! | [`catalog`] | Catalog repository and JSON import |
//! | [`progress`] | Per-item and per-collection indexing progress |
//! | [`cursor`] | Restartable batch enumeration |
//! | [`mapper`] | Catalog item → search document |
//! | [`indexer`] | Tick / force reindex / item hooks |
//! | [`filter`] | Filter selection → engine query |
//! | [`results`] | Engine hits → result page |
//! | [`search`] | Search service |
//! | [`report`] | CLI indexing progress |
//! | [`app`] | Service wiring from config |
//! | [`commands`] | CLI command implementations |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod app;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod cursor;
pub mod db;
pub mod engine;
pub mod error;
pub mod filter;
pub mod indexer;
pub mod mapper;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod report;
pub mod results;
pub mod schema;
pub mod search;
pub mod server;
pub mod typesense;
