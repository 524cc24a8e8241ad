//! Profile model, storage and include resolution

pub mod builtin;
pub mod resolve;
pub mod snapshot;
pub mod stack;
pub mod storage;
mod types;

pub use resolve::{explicit_path, find_profiles, resolve_profile_path, ProfileEntry};
pub use snapshot::snapshot_profile;
pub use stack::{resolve_includes, MergeConflict, Resolution};
pub use storage::{LoadedProfile, ProfileKind, ProfileLoader, ProfileSource, ProfileStore, ProfileSummary};
pub use types::*;
