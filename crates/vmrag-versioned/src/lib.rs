//! vmrag-versioned - CLI-subprocess adapter over a Dolt-style versioned SQL store.
//!
//! Talks to the versioning binary only through `std::process::Command`; the
//! binary itself (and its branch/commit/merge semantics) is an opaque
//! external collaborator. See [`DoltAdapter`].

mod dolt;

pub use dolt::{escape_sql_literal, DoltAdapter};
