//! A small expression language for orrery kernels.
//!
//! Calc gives the kernel something real to run: assignments, arithmetic,
//! records, reactive state and UI elements, one statement per line.
//!
//! ```text
//! price = 12
//! qty = 3
//! total = price * qty
//! print "total: " + "ok"
//! state clicks = 0
//! slider speed = {value: 5, max: 10}
//! view current = speed.value
//! set clicks = clicks + 1
//! raise ValueError "bad input"
//! stop
//! total / 2
//! ```
//!
//! - `state! name = expr` creates a state whose writes may re-trigger the
//!   writing cell.
//! - `min(..)` and `max(..)` are the only functions.

mod analyzer;
mod eval;
mod executor;
mod lexer;
mod parser;

use std::sync::Arc;

use orrery_core::{Kernel, KernelConfig, NotificationSink, Result};

pub use analyzer::CalcAnalyzer;
pub use eval::EvalError;
pub use executor::CalcExecutor;

/// Build a kernel that analyzes and runs calc cells.
pub fn kernel(config: KernelConfig, sink: Arc<dyn NotificationSink>) -> Result<Kernel> {
    Kernel::new(config, CalcAnalyzer::new(), CalcExecutor::new(), sink)
}
