//! Core domain models
//!
//! This module defines the deploys, stacks, and pipeline stages the
//! executor works with, plus the YAML configuration.

pub mod config;
pub mod deploy;
pub mod outcome;
pub mod pipeline;
pub mod stack;
pub mod stage;
pub mod state;

pub use deploy::*;
pub use outcome::*;
pub use pipeline::*;
pub use stack::*;
pub use stage::*;
pub use state::*;
