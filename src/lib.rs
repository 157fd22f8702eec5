//! # Plotline
//!
//! Story-arc, character-graph and plot-hole analysis for long-form
//! manuscripts, with a SQLite-backed analysis cache, a CLI and an HTTP API.
//!
//! The analysis itself lives in [`plotline_core`]; this crate supplies the
//! filesystem manuscript source, the SQLite cache, HTTP text-generation
//! providers and the two front ends.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────┐   ┌──────────┐
//! │ Manuscripts  │──▶│ plotline-core  │──▶│  SQLite  │
//! │ project.toml │   │ arc/graph/holes│   │  cache   │
//! └──────────────┘   └───────┬────────┘   └──────────┘
//!                            │  ▲
//!                            │  └── OpenAI / Ollama
//!                 ┌──────────┴─────────┐
//!                 ▼                    ▼
//!            ┌──────────┐        ┌──────────┐
//!            │   CLI    │        │   HTTP   │
//!            │(plotline)│        │  (axum)  │
//!            └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! plotline init                     # create database
//! plotline projects                 # list configured manuscripts
//! plotline analyze novel            # tension, pacing, structure
//! plotline detect novel --assist    # plot holes, reviewed by the provider
//! plotline generate --premise "..." --genre mystery --length 12
//! plotline serve                    # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`manuscript`] | Filesystem chapter source |
//! | [`sqlite_cache`] | SQLite analysis cache |
//! | [`provider`] | OpenAI and Ollama text generation |
//! | [`app`] | Service wiring |
//! | [`single_flight`] | Per-key computation locks |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod app;
pub mod commands;
pub mod config;
pub mod db;
pub mod export;
pub mod logging;
pub mod manuscript;
pub mod migrate;
pub mod provider;
pub mod report;
pub mod server;
pub mod single_flight;
pub mod sqlite_cache;
pub mod stats;
