//! Entity model: radio stations, their songs, and the keys derived from them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::codec::{Width, encode_hex};

/// Placeholder written into listing fields the project leaves blank.
pub const UNKNOWN: &str = "UNKNOWN";

/// Default trigger force of an item.
pub const DEFAULT_FORCE: i32 = 80;

/// Upper bound of the trigger force scale.
pub const MAX_FORCE: i32 = 300;

/// Suffix hashed into every item key of an entity.
const KEY_SUFFIX: &str = "_zz";

/// Errors that can occur when validating entity data.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum EntityError {
    /// The identifier is not exactly four ASCII characters.
    #[error("Invalid entity id '{0}': expected exactly 4 ASCII characters")]
    InvalidId(String),

    /// A required field is missing or blank.
    #[error("Empty field: {0}")]
    EmptyField(String),
}

/// Four-character entity identifier (e.g. `ABCD`).
///
/// Validated on construction; every derived name (internal name, keys, file
/// names) is computed from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Validate and wrap an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::InvalidId`] unless `s` is exactly four ASCII
    /// characters.
    pub fn new(s: &str) -> Result<Self, EntityError> {
        if s.len() == 4 && s.is_ascii() {
            Ok(Self(s.to_string()))
        } else {
            Err(EntityError::InvalidId(s.to_string()))
        }
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Internal symbolic name used for events, banks and file names.
    pub fn internal_name(&self) -> String {
        format!("Radio_{}", self.0)
    }

    /// Reversed-character tag shared by every key of this entity.
    ///
    /// The runtime reads these keys as little-endian integers, so the text
    /// `"{id}_zz"` is reversed before being laid out as 8 bytes.
    fn key_tag(&self) -> String {
        let reversed: String = format!("{}{KEY_SUFFIX}", self.0).chars().rev().collect();
        encode_hex(&reversed, Width::Fixed(8))
    }

    /// Key of the item at 1-based `position`.
    ///
    /// The first two tag bytes are replaced by the position as 4 hex digits.
    pub fn item_key(&self, position: u16) -> String {
        let tag = self.key_tag();
        format!("{position:04X}{}", &tag[4..])
    }

    /// Reserved key shared by all overlay assets of this entity.
    pub fn overlay_key(&self) -> String {
        self.key_tag()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// One song of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Source audio file (resolved against the project directory).
    pub path: PathBuf,
    /// Track name.
    pub name: Option<String>,
    /// Artist name.
    pub artist: Option<String>,
    /// Album name; falls back to the entity name when absent.
    pub album: Option<String>,
    /// Release year as written in the project.
    pub year: Option<String>,
    /// Track length as written in the project.
    pub length: Option<String>,
    /// Trigger force on the 0-300 scale.
    pub force: i32,
    /// Volume offset in decibels.
    pub volume: f32,
}

impl Item {
    /// Create an item with default metadata for the given source path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: None,
            artist: None,
            album: None,
            year: None,
            length: None,
            force: DEFAULT_FORCE,
            volume: 0.0,
        }
    }

    /// Force as a fraction of the full scale, clamped to `0.0..=1.0`.
    pub fn force_ratio(&self) -> f64 {
        f64::from(self.force.clamp(0, MAX_FORCE)) / f64::from(MAX_FORCE)
    }

    /// File stem of the source path, used as the sound definition name.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A radio station: the unit that gets built into one bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Validated identifier.
    pub id: EntityId,
    /// Display name shown in game.
    pub name: String,
    /// Optional logo image (DDS payload).
    pub logo: Option<PathBuf>,
    /// Ordered songs; never empty for a valid entity.
    pub items: Vec<Item>,
    /// Jingle files sharing the overlay key.
    pub overlays: Vec<PathBuf>,
}

impl Entity {
    /// Internal symbolic name, `Radio_{id}`.
    pub fn internal_name(&self) -> String {
        self.id.internal_name()
    }

    /// Whether overlay assets are declared.
    pub fn has_overlays(&self) -> bool {
        !self.overlays.is_empty()
    }

    /// Validates the entity's invariants.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::EmptyField`] if the name is blank, the item list
    /// is empty, or an item has an empty path.
    pub fn validate(&self) -> Result<(), EntityError> {
        if self.name.trim().is_empty() {
            return Err(EntityError::EmptyField("name".to_string()));
        }
        if self.items.is_empty() {
            return Err(EntityError::EmptyField("songs".to_string()));
        }
        if self.items.iter().any(|item| item.path.as_os_str().is_empty()) {
            return Err(EntityError::EmptyField("song file".to_string()));
        }
        Ok(())
    }
}

/// Display value of an optional text field, substituting [`UNKNOWN`].
pub fn or_unknown(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => UNKNOWN,
    }
}
