//! Shared test utilities for leadrun integration tests.
//!
//! This module provides:
//! - Scripted collaborators that fail, panic or stop at chosen positions
//! - `TestHarness` wiring an in-memory database to a runner or supervisor
//! - Builders for candidates and job parameters

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::*;
pub use harness::{view, LeadView, TestHarness, USER};
