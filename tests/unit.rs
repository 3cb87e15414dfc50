//! Unit test harness entry point.

#[path = "unit/mod.rs"]
mod unit;
