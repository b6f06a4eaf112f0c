//! Director pattern: a bounded closed loop around an AI coder.
//!
//! Each iteration hands a prompt to a coder, runs a validation command and asks
//! an evaluator whether the task is done. Failures feed the next prompt; after
//! the last failed iteration a failure analysis is reported.
//!
//! - **[`core`]**: pure logic (data model, payload extraction, verdict rules, reports).
//! - **[`io`]**: descriptors, child processes, model CLIs, prompts and the run log.
//!
//! [`director`], [`evaluator`] and [`analysis`] tie the two together.

pub mod analysis;
pub mod core;
pub mod director;
pub mod error;
pub mod evaluator;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
