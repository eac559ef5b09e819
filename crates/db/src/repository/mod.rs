//! Repository functions — one function per database operation.
//!
//! Every function takes a pool or an executor (so it can join a caller's
//! transaction) and returns a `Result<T, DbError>`.
//! No business logic, no domain types — pure SQL.

pub mod pipelines;
pub mod runs;
pub mod tasks;
