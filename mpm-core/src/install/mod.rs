//! Fetching, verifying, and recording plugins

pub mod coordinator;
pub mod fetch;
pub mod installed;
pub mod lock;
pub mod progress;

pub use coordinator::{
    ArtifactFailure, BatchReport, InstallSettings, InstalledArtifact, Installer, UpdateCheck,
    DEFAULT_MAX_CONCURRENT, DEFAULT_PLUGINS_DIR,
};
pub use fetch::{fetch_and_verify, FetchOutcome, FetchRequest};
pub use installed::{find_installed_file, normalize_plugin_name, validate, ValidationStatus};
pub use lock::{LockAccumulator, LockEntry, PackageLock, LOCK_FILE};
pub use progress::{JobProgress, ProgressEvent, ProgressSink};
