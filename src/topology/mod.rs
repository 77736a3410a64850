//! The `topology` module turns command-line specification tokens into the
//! queues and exchange bindings a session works with.
//!
//! A token without `/` names a queue. A token of the form
//! `exchange/route[/route...]` expands to one binding per route, all sharing
//! the same exchange.

pub mod route;

pub use route::{Route, Specification};

#[cfg(test)]
mod tests;
