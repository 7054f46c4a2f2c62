//! The seven MCP tools this server exposes (spec §4.L), each a
//! `schema()` plus an `execute()` taking the shared application state, the
//! resolved tenant, and the call's JSON arguments.

pub mod memory_add;
pub mod memory_delete;
pub mod memory_query;
pub mod session_end;
pub mod session_record;
pub mod session_start;
pub mod session_stop;
