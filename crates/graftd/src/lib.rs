//! Runtime for the graft component host.
//!
//! The daemon loads its configuration through [`graft_config`], initialises
//! structured telemetry, scans the component directory into a
//! [`graft_components::ComponentRegistry`] and serves requests through an
//! in-process host whose routing table freezes once start-up completes.
//!
//! With hot reload enabled a [`DirectoryWatcher`] reports changes under the
//! component directory and a [`ReloadWorker`] recompiles each changed unit and
//! swaps it into place. Identities first seen after the host froze are served
//! by the fallback dispatch filter installed ahead of every other filter.
//!
//! Health reporting hooks emit structured telemetry at each lifecycle stage:
//! bootstrap, the start-up scan, every reload and the final teardown.
//!
//! ## Request transport
//!
//! The host listens on the configured socket and accepts one JSONL request
//! per connection:
//!
//! ```text
//! {"method":"GET","path":"/orders","headers":{},"body":""}
//! ```
//!
//! and answers with one JSONL response:
//!
//! ```text
//! {"status":200,"headers":{},"body":"..."}
//! ```

mod bootstrap;
mod builtin;
mod health;
mod host;
mod process;
mod reload;
mod telemetry;
mod transport;
mod watcher;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, HotReload, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use builtin::{Catalogue, MemoryConnection, MemoryDriver};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use host::InProcessHost;
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon};
pub use reload::ReloadWorker;
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use watcher::{DirectoryWatcher, WatchError, WatchEvent, WatchEventKind};

#[cfg(test)]
mod tests;
