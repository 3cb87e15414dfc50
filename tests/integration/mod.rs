//! Integration test modules.

mod finish_protocol_test;
mod session_lifecycle_test;
mod support;
mod sync_barrier_test;
