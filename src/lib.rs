//! hnkeep - migrate Harmonic-HN bookmark exports to Karakeep.
//!
//! The pipeline: parse the Harmonic export, enrich each bookmark from the
//! Hacker News API (bounded concurrency, on-disk cache, single-flight
//! dedup, retry with backoff), convert to the Karakeep schema, then either
//! write an import file or reconcile directly against a Karakeep server
//! with idempotent create/update/skip semantics.

pub mod cli;
pub mod config;
pub mod converter;
pub mod hackernews;
pub mod harmonic;
pub mod karakeep;
pub mod output;
pub mod retry;
pub mod runner;
pub mod syncer;
