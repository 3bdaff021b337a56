//! Adaptive options CLI
//!
//! Commands:
//! - `adaptive-options status` - orchestration status as JSON
//! - `adaptive-options demo` - end-to-end pass with rule-based learners
//! - `adaptive-options evaluate` - market evaluation on a synthetic window

pub mod commands;
pub mod runtime;
pub mod synthetic;

pub use commands::{run_demo, run_evaluate, run_status};
pub use runtime::{Cli, Commands};
