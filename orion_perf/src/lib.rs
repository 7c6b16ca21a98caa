pub mod charts;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod orion;
pub mod process;
pub mod regression;
pub mod stats;
pub mod summary;
pub mod tabular;
pub mod tools;

// Test helpers module - made public for use in unit tests and integration tests
// This is conditionally compiled to avoid including test code in release builds
#[doc(hidden)]
#[cfg(any(test, doctest, feature = "test-helpers"))]
pub mod test_helpers;
