//! Record and descriptor templates shipped in the assets directory.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::document::{Document, FieldIndex, FieldRef, NodeId};
use crate::error::BuildError;

/// Every template file the pipeline reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// Localized display name.
    LocString,
    /// Text table pointing at the localized name.
    LocTat,
    /// Container (radio) record.
    RadioBin,
    /// Per-item entity record.
    SongEntity,
    /// Per-item listing inside the container record.
    IndividualSong,
    /// Bundle manifest.
    Mdata,
    /// Audio project skeleton.
    Descriptor,
    /// Audio sound definition.
    SoundDef,
    /// Audio bank waveform.
    Waveform,
    /// Audio event.
    Event,
    /// Overlay waveform inside the overlay sound definition.
    OverlayWaveform,
}

impl TemplateKind {
    /// All templates, in load order.
    pub const ALL: [Self; 11] = [
        Self::LocString,
        Self::LocTat,
        Self::RadioBin,
        Self::SongEntity,
        Self::IndividualSong,
        Self::Mdata,
        Self::Descriptor,
        Self::SoundDef,
        Self::Waveform,
        Self::Event,
        Self::OverlayWaveform,
    ];

    /// File name inside the assets directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::LocString => "localization_string.xml",
            Self::LocTat => "localization_tat.xml",
            Self::RadioBin => "radio_bin.xml",
            Self::SongEntity => "song_entity.xml",
            Self::IndividualSong => "individual_song.xml",
            Self::Mdata => "mdata.xml",
            Self::Descriptor => "template.fdp",
            Self::SoundDef => "fmod_sounddef.xml",
            Self::Waveform => "fmod_waveform.xml",
            Self::Event => "fmod_event.xml",
            Self::OverlayWaveform => "fmod_jingles_waveform.xml",
        }
    }
}

/// A loaded template with its field index.
///
/// Cloning copies the arena, so handles from the index stay valid in every
/// clone. Load once, clone per record.
#[derive(Debug, Clone)]
pub struct Template {
    kind: TemplateKind,
    doc: Document,
    index: FieldIndex,
}

impl Template {
    /// Wrap a parsed document.
    pub fn new(kind: TemplateKind, doc: Document) -> Self {
        let index = FieldIndex::build(&doc);
        Self { kind, doc, index }
    }

    /// Which template this is.
    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    /// Underlying document.
    pub fn doc(&self) -> &Document {
        &self.doc
    }

    /// Mutable access for structural edits.
    pub fn doc_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Consume the template, returning its document.
    pub fn into_doc(self) -> Document {
        self.doc
    }

    /// Handle of a field, if the template has it.
    pub fn field(&self, field: FieldRef) -> Option<NodeId> {
        self.index.get(field)
    }

    /// Overwrite a field's value.
    ///
    /// A missing field is logged and skipped; returns whether it was written.
    pub fn set(&mut self, field: FieldRef, value: &str) -> bool {
        match self.index.get(field) {
            Some(id) => {
                self.doc.set_text(id, value);
                true
            }
            None => {
                warn!(
                    "Template {} has no field {field}, skipping",
                    self.kind.file_name()
                );
                false
            }
        }
    }

    /// Current value of a field.
    pub fn get(&self, field: FieldRef) -> Option<String> {
        self.index.get(field).map(|id| self.doc.text(id))
    }
}

/// The assets directory holding every template.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    dir: PathBuf,
}

impl TemplateSet {
    /// Use templates from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Assets directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of one template file.
    pub fn path(&self, kind: TemplateKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Load and index one template.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Template`] if the file is missing or malformed.
    pub fn load(&self, kind: TemplateKind) -> Result<Template, BuildError> {
        let doc = Document::load(&self.path(kind)).map_err(|source| BuildError::Template {
            name: kind.file_name().to_string(),
            source,
        })?;
        Ok(Template::new(kind, doc))
    }

    /// Names of templates missing from the directory.
    pub fn missing(&self) -> Vec<&'static str> {
        TemplateKind::ALL
            .iter()
            .filter(|kind| !self.path(**kind).is_file())
            .map(|kind| kind.file_name())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SONG: &str = r#"<object name="Song">
  <field name="ID" type="BinHex">0000000000000000</field>
  <field name="EventName" type="BinHex">00</field>
</object>"#;

    #[test]
    fn set_and_get_fields() {
        let mut template = Template::new(TemplateKind::SongEntity, Document::parse(SONG).unwrap());
        assert!(template.set(FieldRef::field("ID"), "00015F4443424100"));
        assert_eq!(
            template.get(FieldRef::field("ID")).as_deref(),
            Some("00015F4443424100")
        );
        assert!(!template.set(FieldRef::field("Nope"), "00"));
    }

    #[test]
    fn clones_are_independent() {
        let base = Template::new(TemplateKind::SongEntity, Document::parse(SONG).unwrap());
        let mut first = base.clone();
        let mut second = base.clone();
        first.set(FieldRef::field("ID"), "01");
        second.set(FieldRef::field("ID"), "02");
        assert_eq!(first.get(FieldRef::field("ID")).as_deref(), Some("01"));
        assert_eq!(second.get(FieldRef::field("ID")).as_deref(), Some("02"));
        assert_eq!(
            base.get(FieldRef::field("ID")).as_deref(),
            Some("0000000000000000")
        );
    }

    #[test]
    fn missing_template_is_a_template_error() {
        let dir = tempfile::tempdir().unwrap();
        let set = TemplateSet::new(dir.path());
        assert!(matches!(
            set.load(TemplateKind::RadioBin),
            Err(BuildError::Template { name, .. }) if name == "radio_bin.xml"
        ));
        assert_eq!(set.missing().len(), TemplateKind::ALL.len());
    }

    #[test]
    fn shipped_assets_are_complete() {
        let assets = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets");
        let set = TemplateSet::new(assets);
        assert!(set.missing().is_empty(), "missing: {:?}", set.missing());
        for kind in TemplateKind::ALL {
            set.load(kind).unwrap();
        }
    }
}
