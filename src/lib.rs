//! mAIware endpoint agent
//!
//! Watches a download directory, triages new files (hashes, PE headers,
//! entry point disassembly, classification) and reports results to a
//! discoverable collector.

pub mod constants;
pub mod logic;
