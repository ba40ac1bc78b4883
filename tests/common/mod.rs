//! Common test utilities for feedcast integration tests

#[allow(dead_code)]
pub mod fixtures;
#[allow(dead_code)]
pub mod harness;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use harness::*;
