//! Integration tests for the access core
//!
//! Everything runs against `InMemoryStore`; the Postgres store has its own
//! ignored tests that need `DATABASE_URL`.

mod access_flow;
mod webhook_flow;
