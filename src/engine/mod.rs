//! Core engine — the fetch → decide → buy loop.

pub mod executor;
pub mod oracle;
pub mod scheduler;
