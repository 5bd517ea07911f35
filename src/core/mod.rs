//! Terminal interface and the buffered write gate.

pub mod output;
pub mod terminal;
