//! Deterministic, pure logic for the director.
//!
//! Nothing in here touches the filesystem, spawns processes or calls models.
//! Everything operates on in-memory text and data and is covered by unit tests.

pub mod payload;
pub mod report;
pub mod text;
pub mod types;
pub mod verdict;
