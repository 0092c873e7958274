//! # kudev-daemon
//!
//! The hot-reload loop and its collaborators.
//!
//! ```text
//! FileWatcher ──events──▶ Debouncer ──batches──▶ Orchestrator
//!                                                   │
//!                        HashCalculator ◀───────────┤ digest changed?
//!                        Builder ─▶ ImageLoader ─▶ Deployer
//!                                                   │
//!                                                Reporter
//! ```

pub mod builder;
pub mod debounce;
pub mod error;
pub mod loader;
pub mod orchestrator;
pub mod pipeline;
pub mod process;
pub mod reporter;
pub mod runtime;
pub mod watcher;

pub use builder::{BuildRequest, Builder, BuiltImage, DockerBuilder};
pub use debounce::{Debouncer, DEFAULT_DEBOUNCE_WINDOW};
pub use error::{BuildError, CommandError, DaemonError, LoadError};
pub use loader::{loader_for_context, DockerDesktopLoader, ImageLoader, KindLoader, MinikubeLoader};
pub use orchestrator::{CycleOutcome, Orchestrator};
pub use pipeline::{DeploySummary, Pipeline};
pub use reporter::{Reporter, TracingReporter};
pub use runtime::{init_tracing, shutdown_token};
pub use watcher::FileWatcher;
