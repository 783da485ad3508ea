//! Shared test utilities for agritrack integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs against a temp media root and an
//!   in-memory job store
//! - Test doubles for the detector, the media backend and the transcoder

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::TestHarness;
