//! Shared harness for the end-to-end test binaries under `tests/`: a
//! disposable working directory, a ready-to-use engine, and fixture
//! payload builders so each test file stays focused on the scenario it
//! verifies.

pub mod config;
pub mod fixtures;

pub use config::TestConfig;
pub use fixtures::TestFixtures;
