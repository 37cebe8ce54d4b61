//! Integration tests: agents, the auction and the sweep running together
//! against the in-memory and SQLite stores.

mod agents;
mod sqlite_store;
mod support;
mod sweep;
