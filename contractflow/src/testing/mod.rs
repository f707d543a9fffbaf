//! Testing utilities for contractflow workflows.
//!
//! This module provides:
//! - Stage doubles (mock, failing, slow, flaky)
//! - Content pipeline contract fixtures and an executor harness
//! - Assertions for step and workflow results

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_step_failed_with, assert_step_succeeded, assert_workflow};
pub use fixtures::{
    audio_contract, audio_output, content_source, content_workflow, script_contract,
    script_output, trend_contract, trend_output, TestHarness,
};
pub use mocks::{FailingStage, FlakyStage, MockStage, SlowStage};
