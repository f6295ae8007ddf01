//! Analysis modules.
//!
//! Statistics computed over a finished frequency table.

pub mod summary;

pub use summary::*;
