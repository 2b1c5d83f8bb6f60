//! # cc-statusline
//!
//! Cost and usage telemetry for the Claude Code status line.
//!
//! ## Overview
//!
//! Claude Code pipes a JSON payload to the status line command on every
//! render. This crate turns that into a short line showing:
//! - Today's cost, summed from the session transcripts
//! - Burn rate of the current activity block
//! - Cost per model
//! - Plan utilization from the OAuth usage API (5-hour and weekly windows,
//!   paid overage)
//!
//! Every result is cached on disk so a render inside the TTL touches neither
//! the transcripts nor the network.
//!
//! ## Features
//!
//! - `colors` (default): Enables terminal color output via owo-colors

/// File-backed TTL cache with source-mtime invalidation
pub mod cache;

/// Command-line argument parsing and configuration
pub mod cli;

/// OAuth credential resolution, refresh and storage
pub mod credentials;

/// Display formatting for text and JSON output
pub mod display;

/// Blocking HTTP seam used by the API clients
pub mod http;

/// File and stderr diagnostics via tracing
pub mod logging;

/// Data models for hooks, transcript records and activity blocks
pub mod models;

/// Model-specific pricing calculations
pub mod pricing;

/// Query facade consumed by the renderer
pub mod telemetry;

/// Transcript discovery and JSONL reading
pub mod transcript;

/// Cost analytics over transcript records
pub mod usage;

/// Online usage limits retrieved from the Claude OAuth API
pub mod usage_api;

/// Utility functions for paths, formatting and private file writes
pub mod utils;
