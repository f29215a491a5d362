//! TUI rendering module for kwspot.
//!
//! Provides the probability heatmap, layout and rate tracking.

pub mod heatmap;
pub mod rate;
pub mod ui;
