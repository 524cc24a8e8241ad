//! Profile file storage
//!
//! Profiles are JSON documents stored at `<loadout home>/profiles/`, one per
//! file, optionally grouped in subdirectories. New and renamed profiles are
//! always written to the root of that directory.

use super::builtin::{builtin_names, content_hash, is_builtin, load_builtin};
use super::resolve::{explicit_path, find_profiles, resolve_profile_path};
use super::types::{Profile, ProfileShape};
use crate::error::{LoadoutError, LoadoutResult};
use crate::util::{validate_name, write_json_atomic};
use std::fs;
use std::path::{Path, PathBuf};

/// Where a loaded profile came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileSource {
    Disk(PathBuf),
    Builtin,
}

/// A profile together with its origin
#[derive(Debug, Clone)]
pub struct LoadedProfile {
    pub profile: Profile,
    pub source: ProfileSource,
}

impl LoadedProfile {
    /// Whether the post-apply hook can run without confirmation
    #[must_use]
    pub fn is_trusted(&self) -> bool {
        self.source == ProfileSource::Builtin
    }
}

/// Something that can look profiles up by name
pub trait ProfileLoader {
    /// Load a profile by bare name or relative path
    ///
    /// # Errors
    /// Returns `ProfileNotFound`, `AmbiguousProfile` or a parse error
    fn load(&self, name: &str) -> LoadoutResult<LoadedProfile>;

    /// Load a profile by the key [`ProfileStore::key_of`] produced
    ///
    /// # Errors
    /// Returns `ProfileNotFound` or a parse error
    fn load_key(&self, key: &str) -> LoadoutResult<LoadedProfile> {
        self.load(key)
    }
}

/// How a listed profile relates to the built-ins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    /// Only exists on disk
    Custom,
    /// Embedded profile, no override or an override with identical content
    Builtin,
    /// Embedded profile overridden by a file with different content
    CustomizedBuiltin,
}

/// One line of `list` output
#[derive(Debug, Clone)]
pub struct ProfileSummary {
    /// Name used to address the profile (relative path for nested files)
    pub rel_path: String,
    pub description: Option<String>,
    pub shape: ProfileShape,
    pub kind: ProfileKind,
}

/// Profile library rooted at one directory
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the library
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn root_file(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    /// Stable name for a loaded profile: its relative path for disk
    /// profiles, its name for built-ins
    #[must_use]
    pub fn key_of(&self, loaded: &LoadedProfile) -> String {
        match &loaded.source {
            ProfileSource::Disk(path) => path
                .strip_prefix(&self.root)
                .ok()
                .map(|rel| {
                    rel.with_extension("")
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/")
                })
                .unwrap_or_else(|| loaded.profile.name.clone()),
            ProfileSource::Builtin => loaded.profile.name.clone(),
        }
    }

    /// Resolve a name to its file on disk, ignoring built-ins
    ///
    /// # Errors
    /// Returns `ProfileNotFound` or `AmbiguousProfile`
    pub fn resolve_path(&self, name: &str) -> LoadoutResult<PathBuf> {
        resolve_profile_path(&self.root, name)
    }

    /// Read and validate a profile file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated
    pub fn read_file(path: &Path) -> LoadoutResult<Profile> {
        let content = fs::read_to_string(path).map_err(|e| LoadoutError::io(path, &e))?;
        let mut profile: Profile =
            serde_json::from_str(&content).map_err(|e| LoadoutError::json(path, &e))?;
        if profile.name.is_empty() {
            if let Some(stem) = path.file_stem() {
                profile.name = stem.to_string_lossy().into_owned();
            }
        }
        profile.validate()?;
        Ok(profile)
    }

    /// Write a profile to the root of the library, replacing any file there
    ///
    /// # Errors
    /// Returns an error if the profile is invalid or cannot be written
    pub fn save(&self, profile: &Profile) -> LoadoutResult<PathBuf> {
        profile.validate()?;
        let path = self.root_file(&profile.name);
        write_json_atomic(&path, profile)?;
        tracing::info!(profile = %profile.name, path = %path.display(), "saved profile");
        Ok(path)
    }

    /// Save a new profile, failing if the name is already taken
    ///
    /// # Errors
    /// Returns `ProfileExists` if a disk or built-in profile has this name
    pub fn create(&self, profile: &Profile) -> LoadoutResult<PathBuf> {
        if self.exists(&profile.name)? {
            return Err(LoadoutError::ProfileExists(profile.name.clone()));
        }
        self.save(profile)
    }

    /// Whether any profile (disk or built-in) answers to this name
    ///
    /// # Errors
    /// Returns an error if the profiles directory cannot be walked
    pub fn exists(&self, name: &str) -> LoadoutResult<bool> {
        if is_builtin(name) {
            return Ok(true);
        }
        match self.resolve_path(name) {
            Ok(_) | Err(LoadoutError::AmbiguousProfile { .. }) => Ok(true),
            Err(LoadoutError::ProfileNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Copy a profile under a new name
    ///
    /// # Errors
    /// Returns an error if the source is missing or the target exists
    pub fn clone_profile(&self, source: &str, target: &str) -> LoadoutResult<Profile> {
        validate_name(target)?;
        let mut profile = self.load(source)?.profile;
        profile.name = target.to_string();
        self.create(&profile)?;
        Ok(profile)
    }

    /// Rename a profile on disk; the renamed file lands at the root
    ///
    /// # Errors
    /// Returns `BuiltinProtected` for built-ins, `ProfileExists` if the new
    /// name is taken
    pub fn rename(&self, old: &str, new: &str) -> LoadoutResult<Profile> {
        validate_name(new)?;
        let old_path = self.disk_path_of_custom(old, "clone it to get an editable copy")?;
        if self.exists(new)? {
            return Err(LoadoutError::ProfileExists(new.to_string()));
        }

        let mut profile = Self::read_file(&old_path)?;
        profile.name = new.to_string();
        self.save(&profile)?;
        fs::remove_file(&old_path).map_err(|e| LoadoutError::io(&old_path, &e))?;
        tracing::info!(from = old, to = new, "renamed profile");
        Ok(profile)
    }

    /// Delete a custom profile file
    ///
    /// # Errors
    /// Returns `BuiltinProtected` for built-ins and their overrides
    pub fn delete(&self, name: &str) -> LoadoutResult<Profile> {
        let path = self.disk_path_of_custom(name, "use restore to drop local changes")?;
        let profile = Self::read_file(&path).unwrap_or_else(|_| Profile::new(name));
        fs::remove_file(&path).map_err(|e| LoadoutError::io(&path, &e))?;
        tracing::info!(profile = name, "deleted profile");
        Ok(profile)
    }

    /// Remove the on-disk override of a built-in profile
    ///
    /// Returns whether an override existed.
    ///
    /// # Errors
    /// Returns `InvalidProfile` if the name is not a built-in
    pub fn restore(&self, name: &str) -> LoadoutResult<bool> {
        if !is_builtin(name) {
            return Err(LoadoutError::invalid(name, "not a built-in profile"));
        }
        let path = self.root_file(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(profile = name, "restored built-in profile");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LoadoutError::io(&path, &e)),
        }
    }

    /// Resolve a profile that may be modified on disk, protecting built-ins
    fn disk_path_of_custom(&self, name_or_path: &str, hint: &str) -> LoadoutResult<PathBuf> {
        let name = name_or_path.strip_prefix("./").unwrap_or(name_or_path);
        let path = match self.resolve_path(name_or_path) {
            Ok(path) => path,
            Err(LoadoutError::ProfileNotFound(_)) if is_builtin(name) => {
                return Err(LoadoutError::BuiltinProtected {
                    name: name.to_string(),
                    hint: hint.to_string(),
                });
            }
            Err(e) => return Err(e),
        };
        if is_builtin(name) && path == self.root_file(name) {
            return Err(LoadoutError::BuiltinProtected {
                name: name.to_string(),
                hint: hint.to_string(),
            });
        }
        Ok(path)
    }

    /// List disk profiles and built-ins
    ///
    /// # Errors
    /// Returns an error if the directory cannot be walked or a file is invalid
    pub fn list(&self) -> LoadoutResult<Vec<ProfileSummary>> {
        let mut summaries = Vec::new();

        for entry in find_profiles(&self.root)? {
            let profile = Self::read_file(&entry.path)?;
            let kind = if entry.rel_path == entry.name && is_builtin(&entry.name) {
                match load_builtin(&entry.name)? {
                    Some(original) if content_hash(&original) == content_hash(&profile) => {
                        ProfileKind::Builtin
                    }
                    _ => ProfileKind::CustomizedBuiltin,
                }
            } else {
                ProfileKind::Custom
            };
            summaries.push(ProfileSummary {
                rel_path: entry.rel_path,
                description: profile.description.clone(),
                shape: profile.shape(),
                kind,
            });
        }

        for name in builtin_names() {
            if self.root_file(name).is_file() {
                continue;
            }
            if let Some(profile) = load_builtin(name)? {
                summaries.push(ProfileSummary {
                    rel_path: name.to_string(),
                    description: profile.description.clone(),
                    shape: profile.shape(),
                    kind: ProfileKind::Builtin,
                });
            }
        }

        summaries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        Ok(summaries)
    }
}

impl ProfileLoader for ProfileStore {
    fn load(&self, name: &str) -> LoadoutResult<LoadedProfile> {
        match self.resolve_path(name) {
            Ok(path) => {
                let profile = Self::read_file(&path)?;
                Ok(LoadedProfile {
                    profile,
                    source: ProfileSource::Disk(path),
                })
            }
            Err(LoadoutError::ProfileNotFound(_)) if !name.contains('/') => {
                match load_builtin(name)? {
                    Some(profile) => {
                        tracing::debug!(profile = name, "using built-in profile");
                        Ok(LoadedProfile {
                            profile,
                            source: ProfileSource::Builtin,
                        })
                    }
                    None => Err(LoadoutError::ProfileNotFound(name.to_string())),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn load_key(&self, key: &str) -> LoadoutResult<LoadedProfile> {
        if key.contains('/') {
            return self.load(key);
        }
        // A bare key is a root file or a built-in, never a nested match
        if self.root_file(key).is_file() {
            return self.load(&explicit_path(key));
        }
        match load_builtin(key)? {
            Some(profile) => Ok(LoadedProfile {
                profile,
                source: ProfileSource::Builtin,
            }),
            None => Err(LoadoutError::ProfileNotFound(key.to_string())),
        }
    }
}
