//! Profile storage and reference resolution
//!
//! A profile is a persisted bundle of terminal behavior settings identified
//! by a UUID; the "visible name" is a separate, user-editable, non-unique
//! label. The store keeps the whole list in one TOML file and maintains the
//! invariant that exactly one profile is the default, creating one lazily
//! when the store is empty.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Profile errors
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("failed to read profile store: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse profile store: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize profile store: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("config directory not found")]
    NoConfigDir,

    #[error("no such profile \"{0}\"")]
    NotFound(String),

    #[error("profile name \"{0}\" is ambiguous")]
    Ambiguous(String),

    #[error("no profiles exist")]
    Empty,

    #[error("cannot delete the last profile")]
    LastProfile,
}

/// One persisted profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Stable identity. Never shown to the user as a name.
    pub uuid: String,
    /// User-editable label. Not unique.
    pub visible_name: String,
    /// Command to run instead of the user's shell.
    pub custom_command: Option<String>,
    /// Run the command as a login shell.
    pub login_shell: bool,
    /// Working directory for new screens.
    pub working_directory: Option<PathBuf>,
    /// Default zoom factor for screens using this profile.
    pub zoom: f64,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            visible_name: "Unnamed".into(),
            custom_command: None,
            login_shell: false,
            working_directory: None,
            zoom: 1.0,
        }
    }
}

impl Profile {
    /// Create a profile with a fresh UUID and the given name.
    pub fn new(visible_name: &str) -> Self {
        Self {
            visible_name: visible_name.into(),
            ..Default::default()
        }
    }
}

/// The persisted profile list plus the default-profile marker.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProfileStore {
    /// UUID of the default profile. Empty only before `ensure_default`.
    pub default_profile: String,
    /// All profiles.
    pub profiles: Vec<Profile>,
}

impl ProfileStore {
    /// Load the store from the standard location, creating a default profile
    /// if none exist yet.
    pub fn load() -> Result<Self, ProfileError> {
        let path = Self::store_path().ok_or(ProfileError::NoConfigDir)?;
        Self::load_from(&path)
    }

    /// Load the store from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ProfileError> {
        let mut store = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        store.ensure_default();
        Ok(store)
    }

    /// Save the store to the standard location.
    pub fn save(&self) -> Result<(), ProfileError> {
        let path = Self::store_path().ok_or(ProfileError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Save the store to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ProfileError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn store_path() -> Option<PathBuf> {
        crate::config::config_dir().map(|dir| dir.join("profiles.toml"))
    }

    /// Restore the invariants: at least one profile exists and the default
    /// marker points at one of them.
    pub fn ensure_default(&mut self) {
        if self.profiles.is_empty() {
            let profile = Profile::new("Default");
            self.default_profile = profile.uuid.clone();
            self.profiles.push(profile);
            return;
        }
        if !self.profiles.iter().any(|p| p.uuid == self.default_profile) {
            self.default_profile = self.profiles[0].uuid.clone();
        }
    }

    /// Look up a profile by UUID.
    pub fn get(&self, uuid: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.uuid == uuid)
    }

    /// UUID of the default profile.
    pub fn default_uuid(&self) -> Result<String, ProfileError> {
        if self.profiles.is_empty() {
            return Err(ProfileError::Empty);
        }
        Ok(self.default_profile.clone())
    }

    /// Add a new profile with the given name, returning its UUID.
    pub fn create(&mut self, visible_name: &str) -> String {
        let profile = Profile::new(visible_name);
        let uuid = profile.uuid.clone();
        self.profiles.push(profile);
        uuid
    }

    /// Mark an existing profile as the default.
    pub fn set_default(&mut self, uuid: &str) -> Result<(), ProfileError> {
        if self.get(uuid).is_none() {
            return Err(ProfileError::NotFound(uuid.into()));
        }
        self.default_profile = uuid.into();
        Ok(())
    }

    /// Delete a profile. Refuses to delete the last one; deleting the
    /// default reassigns the marker first.
    pub fn delete(&mut self, uuid: &str) -> Result<(), ProfileError> {
        if self.profiles.len() <= 1 {
            return Err(ProfileError::LastProfile);
        }
        let index = self
            .profiles
            .iter()
            .position(|p| p.uuid == uuid)
            .ok_or_else(|| ProfileError::NotFound(uuid.into()))?;

        if self.default_profile == uuid {
            let replacement = self
                .profiles
                .iter()
                .map(|p| p.uuid.as_str())
                .find(|u| *u != uuid)
                .unwrap_or_default()
                .to_string();
            self.default_profile = replacement;
        }

        self.profiles.remove(index);
        Ok(())
    }
}

/// Resolution of a profile reference (UUID, visible name, or none) to the
/// UUID of an existing profile.
pub trait ResolveProfile {
    /// Resolve a reference. `None` resolves to the default profile. A string
    /// that is syntactically a UUID and matches an existing profile wins over
    /// any visible-name match, even when some profile is named like that
    /// UUID. Name lookup requires exactly one match.
    fn resolve(&self, reference: Option<&str>) -> Result<String, ProfileError>;

    /// Resolve by UUID only, no name lookup and no default fallback.
    fn resolve_id(&self, uuid: &str) -> Result<String, ProfileError>;
}

impl ResolveProfile for ProfileStore {
    fn resolve(&self, reference: Option<&str>) -> Result<String, ProfileError> {
        let reference = match reference {
            None => return self.default_uuid(),
            Some(r) => r,
        };

        if Uuid::parse_str(reference).is_ok() && self.get(reference).is_some() {
            return Ok(reference.to_string());
        }

        let mut matches = self
            .profiles
            .iter()
            .filter(|p| p.visible_name == reference);

        match (matches.next(), matches.next()) {
            (Some(profile), None) => Ok(profile.uuid.clone()),
            (Some(_), Some(_)) => Err(ProfileError::Ambiguous(reference.into())),
            (None, _) => Err(ProfileError::NotFound(reference.into())),
        }
    }

    fn resolve_id(&self, uuid: &str) -> Result<String, ProfileError> {
        self.get(uuid)
            .map(|p| p.uuid.clone())
            .ok_or_else(|| ProfileError::NotFound(uuid.into()))
    }
}

/// Resolve with the CLI fallback policy: on failure, warn and retry with the
/// default profile. Used for `--profile` and window/tab profile arguments,
/// never for session-config profile ids.
pub fn resolve_or_default(
    resolver: &dyn ResolveProfile,
    reference: Option<&str>,
) -> Result<String, ProfileError> {
    match resolver.resolve(reference) {
        Ok(uuid) => Ok(uuid),
        Err(err) => {
            log::warn!("{err}; using the default profile");
            resolver.resolve(None)
        }
    }
}
