//! keel-core — shared types for the keel cluster-lifecycle controller.
//!
//! This crate holds the declarative cluster model and the plan payload
//! types that every other keel crate builds on:
//!
//! - **`types`** — Cluster spec/status, upgrade strategy, config fragments,
//!   and the `NodePlan` instruction/file payload
//! - **`selector`** — label selectors for targeting config fragments
//! - **`runtime`** — bootstrap runtime flavor detection (skiff / clipper)
//!   and the paths/images derived from it
//! - **`names`** — length-safe derived object names
//! - **`config`** — `keel.toml` settings (management server, CA, images)

pub mod config;
pub mod names;
pub mod runtime;
pub mod selector;
pub mod types;

pub use config::Settings;
pub use names::safe_concat_name;
pub use runtime::Runtime;
pub use selector::{LabelSelector, SelectorError, SelectorRequirement};
pub use types::*;
