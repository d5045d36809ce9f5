//! Federal income tax engine: liability breakdown, what-if scenarios,
//! entity comparison, multi-year projection and ranked savings
//! recommendations.
//!
//! [`core`] is the engine; [`cmd`] holds the CLI command implementations.

pub mod cmd;
pub mod core;
