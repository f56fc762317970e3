//! Mock device implementations for testing and development.
//!
//! This module provides a simulated Falcon that can be controlled
//! programmatically without requiring physical hardware.

pub mod falcon;

// Re-export commonly used types
pub use falcon::{MockFalcon, MockFalconHandle, MockFrame, MockPoll, SIMULATOR_FIRMWARE};
