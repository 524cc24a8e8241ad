//! Comparing profiles with live configuration

pub mod compute;
pub mod display;
mod types;

pub use compute::{compute_diff, drift_diff, plan_diff, text_diff};
pub use display::{format_diff_terminal, DiffView};
pub use types::*;
