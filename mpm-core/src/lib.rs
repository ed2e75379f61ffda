//! mpm core library: plugin resolution, fetching, and lock state

pub mod catalog;
pub mod compat;
pub mod error;
pub mod install;
pub mod integrity;
pub mod manifest;
pub mod platform;
pub mod resolve;
pub mod search;
pub mod select;
pub mod server;

pub use catalog::{ArtifactDeclaration, Catalogs, SourceKind, VersionConstraint};
pub use error::{MpmError, Result};
pub use platform::{ServerPlatform, Target};
pub use resolve::FallbackPolicy;
