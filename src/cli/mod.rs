//! CLI output formatting
//!
//! Colored terminal rendering of resolved permissions, discovery summaries
//! and doctor reports.

pub mod display;

pub use display::{
    error_hint, print_error, print_resolution, render_diagnostic_report, render_discovery,
    render_resolution,
};
