//! The `utils` module holds the pieces shared by the command line entry
//! point: the top-level error type and logging setup.

pub mod error;
pub mod logging;
