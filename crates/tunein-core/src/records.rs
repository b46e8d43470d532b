//! Binary record synthesis.
//!
//! Turns one [`Entity`] into the record documents the runtime consumes:
//! the item list (one entity record per song plus the overlay record), the
//! container record with its per-song listings, and the two localization
//! records. Values are written as hex dumps of the exact bytes the runtime
//! reads, keyed by the positional/overlay keys derived from the entity id.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use tunein_schema::{
    Entity, EntityId, Item, Width, XBT_HEADER, checksum_hex, encode_hex, encode_wide_hex,
    or_unknown,
};

use crate::document::{Document, FieldRef};
use crate::error::{BuildError, BuildResult};
use crate::paths;
use crate::template::{Template, TemplateKind, TemplateSet};

const LOC_NAME: FieldRef = FieldRef::hashed("29D6A3E8");
const LOC_ID: FieldRef = FieldRef::hashed("BF396750");

const RADIO_NAME: FieldRef = FieldRef::field("Name");
const RADIO_NAME_ID: FieldRef = FieldRef::field("NameId");
const RADIO_LOGO: FieldRef = FieldRef::field("Logo");
const RADIO_JINGLE: FieldRef = FieldRef::field("Jingle");
const RADIO_ITEMS: FieldRef = FieldRef::object("Items");

const SONG_ID: FieldRef = FieldRef::field("ID");
const SONG_EVENT: FieldRef = FieldRef::field("EventName");
const SONG_PROJECT: FieldRef = FieldRef::field("ProjectPathId");
const SONG_FATHER: FieldRef = FieldRef::field("FatherArchetypeID");

const LISTING_ITEM: FieldRef = FieldRef::field("Item");
const LISTING_TRACK: FieldRef = FieldRef::field("TrackName");
const LISTING_ARTIST: FieldRef = FieldRef::field("ArtistName");
const LISTING_ALBUM: FieldRef = FieldRef::field("Album");
const LISTING_YEAR: FieldRef = FieldRef::field("Year");
const LISTING_LENGTH: FieldRef = FieldRef::field("Length");

/// Archetype every overlay record inherits from.
pub const OVERLAY_ARCHETYPE: &str = "1D45840700000000";

/// Target file of the item-list document.
pub const SONGS_TARGET: &str = "entity/generated/archetypes.entities.bin";

/// Event name suffix of the overlay record.
const OVERLAY_EVENT: &str = "Jingle";

/// All records generated for one entity.
#[derive(Debug, Clone)]
pub struct RecordSet {
    /// Entity the records belong to.
    pub id: EntityId,
    /// Item-list document.
    pub songs: Document,
    /// Container record.
    pub radio: Document,
    /// Localized string record.
    pub loc_string: Document,
    /// Text table record.
    pub loc_tat: Document,
    /// Positional keys in item order.
    pub item_keys: Vec<String>,
    /// Overlay key, when overlays exist.
    pub overlay_key: Option<String>,
    /// Staged logo texture, when one was written.
    pub logo: Option<PathBuf>,
}

impl RecordSet {
    /// Write the four record documents into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if a document cannot be written.
    pub fn save(&self, dir: &Path) -> BuildResult<Vec<PathBuf>> {
        let outputs = [
            (paths::songs_file(&self.id), &self.songs),
            (paths::radio_file(&self.id), &self.radio),
            (paths::loc_tat_file(&self.id), &self.loc_tat),
            (paths::loc_string_file(&self.id), &self.loc_string),
        ];
        let mut written = Vec::with_capacity(outputs.len());
        for (name, doc) in outputs {
            let path = dir.join(name);
            doc.save(&path)?;
            debug!("Wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

/// Instantiates record templates for entities.
///
/// Each template is loaded and indexed once; every record is a clone.
#[derive(Debug, Clone)]
pub struct RecordSynthesizer {
    loc_string: Template,
    loc_tat: Template,
    radio: Template,
    song: Template,
    listing: Template,
}

impl RecordSynthesizer {
    /// Load the record templates.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Template`] if any template is missing or malformed.
    pub fn load(templates: &TemplateSet) -> BuildResult<Self> {
        Ok(Self {
            loc_string: templates.load(TemplateKind::LocString)?,
            loc_tat: templates.load(TemplateKind::LocTat)?,
            radio: templates.load(TemplateKind::RadioBin)?,
            song: templates.load(TemplateKind::SongEntity)?,
            listing: templates.load(TemplateKind::IndividualSong)?,
        })
    }

    /// Build every record of `entity`.
    ///
    /// The logo texture, if any, is written below `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the logo texture cannot be written. An unreadable
    /// logo source only drops the logo.
    pub fn synthesize(&self, entity: &Entity, data_dir: &Path) -> BuildResult<RecordSet> {
        let id = &entity.id;
        let (loc_string, loc_tat) = self.localization(entity);

        let mut radio = self.radio.clone();
        radio.set(RADIO_NAME, &encode_hex(&entity.name, Width::Terminated));
        radio.set(RADIO_NAME_ID, &encode_hex(id.as_str(), Width::Fixed(4)));

        let logo = match &entity.logo {
            Some(source) => stage_logo(id, source, data_dir)?,
            None => None,
        };
        if logo.is_some() {
            radio.set(RADIO_LOGO, &checksum_hex(&paths::logo_runtime_path(id)));
        }

        let mut songs = Document::new("root");
        let list_root = songs.root();
        songs.set_attribute(list_root, "file", SONGS_TARGET);
        let add = songs.append_element(list_root, "add");
        songs.set_attribute(add, "depth", "root");

        let items_node = radio.field(RADIO_ITEMS);
        if items_node.is_none() {
            warn!("Template radio_bin.xml has no {RADIO_ITEMS}, listings dropped");
        }

        let mut item_keys = Vec::with_capacity(entity.items.len());
        for (index, item) in entity.items.iter().enumerate() {
            let position = u16::try_from(index + 1).map_err(|_| {
                BuildError::Validation(format!("{id}: more than {} songs", u16::MAX))
            })?;
            let key = id.item_key(position);
            let event = format!("{}/{position:02}", id.internal_name());

            let record = self.item_record(id, &key, &event);
            songs.append_document(add, record.doc());

            let listing = self.listing_record(entity, item, &key);
            if let Some(items_node) = items_node {
                radio.doc_mut().append_document(items_node, listing.doc());
            }
            item_keys.push(key);
        }

        let overlay_key = entity.has_overlays().then(|| {
            let key = id.overlay_key();
            let event = format!("{}/{OVERLAY_EVENT}", id.internal_name());
            let mut record = self.item_record(id, &key, &event);
            record.set(SONG_FATHER, OVERLAY_ARCHETYPE);
            songs.append_document(add, record.doc());
            radio.set(RADIO_JINGLE, &key);
            key
        });

        Ok(RecordSet {
            id: id.clone(),
            songs,
            radio: radio.into_doc(),
            loc_string,
            loc_tat,
            item_keys,
            overlay_key,
            logo,
        })
    }

    fn localization(&self, entity: &Entity) -> (Document, Document) {
        let id_bytes = encode_hex(entity.id.as_str(), Width::Fixed(4));

        let mut string = self.loc_string.clone();
        string.set(LOC_NAME, &encode_wide_hex(&entity.name, Width::Terminated));
        string.set(LOC_ID, &id_bytes);

        let mut tat = self.loc_tat.clone();
        tat.set(LOC_ID, &id_bytes);

        (string.into_doc(), tat.into_doc())
    }

    fn item_record(&self, id: &EntityId, key: &str, event: &str) -> Template {
        let mut record = self.song.clone();
        record.set(SONG_ID, key);
        record.set(SONG_EVENT, &encode_hex(event, Width::Terminated));
        record.set(
            SONG_PROJECT,
            &checksum_hex(&paths::project_runtime_path(id)),
        );
        record
    }

    fn listing_record(&self, entity: &Entity, item: &Item, key: &str) -> Template {
        // A missing album shows the station name rather than UNKNOWN.
        let album = item
            .album
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(&entity.name);

        let mut listing = self.listing.clone();
        listing.set(LISTING_ITEM, key);
        for (field, value) in [
            (LISTING_TRACK, or_unknown(item.name.as_deref())),
            (LISTING_ARTIST, or_unknown(item.artist.as_deref())),
            (LISTING_ALBUM, album),
            (LISTING_YEAR, or_unknown(item.year.as_deref())),
            (LISTING_LENGTH, or_unknown(item.length.as_deref())),
        ] {
            listing.set(field, &encode_hex(value, Width::Terminated));
        }
        listing
    }
}

/// Convert the logo image into a texture inside the data staging tree.
///
/// Returns `None` (after logging) if the source cannot be read.
fn stage_logo(id: &EntityId, source: &Path, data_dir: &Path) -> BuildResult<Option<PathBuf>> {
    let image = match std::fs::read(source) {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = BuildError::AssetNotFound {
                path: source.to_path_buf(),
                source: e,
            };
            warn!("{id}: {err}, skipping logo");
            return Ok(None);
        }
    };

    let target = data_dir.join(paths::logo_staging_path(id));
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }

    let mut texture = Vec::with_capacity(XBT_HEADER.len() + image.len());
    texture.extend_from_slice(&XBT_HEADER);
    texture.extend_from_slice(&image);
    std::fs::write(&target, texture).map_err(|e| BuildError::io(&target, e))?;

    debug!("{id}: staged logo at {}", target.display());
    Ok(Some(target))
}
