//! Side-effecting collaborators: files, child processes, model CLIs.

pub mod catalog;
pub mod coder;
pub mod command;
pub mod config;
pub mod judge;
pub mod process;
pub mod prompt;
pub mod run_log;
