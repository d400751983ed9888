//! Scenario-based tests for shipper

mod capabilities;
mod pending_guard;
mod timeout_handling;
