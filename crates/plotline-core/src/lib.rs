//! # Plotline Core
//!
//! Narrative analysis for long-form manuscripts: story-arc and pacing
//! analysis, a character relationship graph, plot-hole detection, rule-based
//! suggestions, AI-assisted plot generation and a content-hashed analysis
//! cache.
//!
//! This crate performs no filesystem or network I/O. Manuscripts arrive
//! through a [`source::ChapterSource`], text generation goes through a
//! [`provider::TextGenerator`], and artifacts are stored in an
//! [`cache::AnalysisCache`]. The `plotline` app crate supplies the
//! filesystem, HTTP and SQLite implementations.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`analyzer`] | tension, pacing and structure classification |
//! | [`graph`] | character presence, interactions and relationship typing |
//! | [`detector`] | timeline, consistency, setup and POV passes |
//! | [`suggest`] | deterministic plot suggestions |
//! | [`generator`] | act-by-act plot generation |
//! | [`cache`] | freshness-checked artifact storage |
//! | [`service`] | the cache-first query API |

pub mod analyzer;
pub mod cache;
pub mod detector;
pub mod error;
pub mod generator;
pub mod graph;
pub mod hash;
pub mod lexicon;
pub mod models;
pub mod provider;
pub mod service;
pub mod source;
pub mod suggest;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod text;
pub mod validate;

pub use error::{Error, Result, Stage, StageError};
pub use service::{Plotline, ServiceSettings};
