//! Test harness utilities shared by the daemon suites.

mod config_loader;
mod reporter;
mod units;
mod world;

pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use units::{Descriptor, text_unit};
pub use world::{TestWorld, world};
