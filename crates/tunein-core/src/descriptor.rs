//! Audio project descriptor (`Radio_{id}.fdp`) generation.
//!
//! The descriptor skeleton gets one sound definition, one bank waveform and
//! one event per song, plus a waveform pair per jingle. Identifiers inside
//! the descriptor are GUIDs derived from the content, so regenerating the
//! descriptor for an unchanged project yields the same file.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use tunein_schema::{Entity, Item};

use crate::audio::wine_path;
use crate::document::{Document, NodeId};
use crate::error::{BuildError, BuildResult};
use crate::template::{TemplateKind, TemplateSet};

/// Companion file copied next to the descriptor when the assets ship one.
pub const COMPANION_TEMPLATE: &str = "template.fdt";

/// Envelope whose last point carries the trigger force.
const FORCE_ENVELOPE: &str = "env011";

/// How source paths are written into the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PathStyle {
    /// Host paths, as the native tool reads them.
    #[default]
    Native,
    /// Paths as seen by a tool running under a launcher on `drive`.
    Wine {
        /// Drive the host root is mounted on, e.g. `Z:`.
        drive: String,
    },
}

impl PathStyle {
    /// Render `path` for the descriptor.
    pub fn render(&self, path: &Path) -> String {
        match self {
            Self::Native => path.to_string_lossy().into_owned(),
            Self::Wine { drive } => wine_path(drive, path),
        }
    }
}

/// Deterministic GUID for one descriptor node.
pub fn content_guid(internal: &str, role: &str, index: usize, path: &Path) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(internal.as_bytes());
    hasher.update(&[0]);
    hasher.update(role.as_bytes());
    hasher.update(&[0]);
    hasher.update(&(index as u64).to_le_bytes());
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = hex::encode(&hasher.finalize().as_bytes()[..16]);
    format!(
        "{{{}-{}-{}-{}-{}}}",
        &digest[0..8],
        &digest[8..12],
        &digest[12..16],
        &digest[16..20],
        &digest[20..32]
    )
}

/// Builds descriptors from the descriptor templates.
#[derive(Debug, Clone)]
pub struct DescriptorWriter {
    project: Document,
    sound_def: Document,
    waveform: Document,
    event: Document,
    overlay_waveform: Document,
    companion: Option<PathBuf>,
    style: PathStyle,
}

impl DescriptorWriter {
    /// Load the descriptor templates.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Template`] if a template is missing or malformed.
    pub fn load(templates: &TemplateSet) -> BuildResult<Self> {
        let companion = templates.dir().join(COMPANION_TEMPLATE);
        Ok(Self {
            project: templates.load(TemplateKind::Descriptor)?.into_doc(),
            sound_def: templates.load(TemplateKind::SoundDef)?.into_doc(),
            waveform: templates.load(TemplateKind::Waveform)?.into_doc(),
            event: templates.load(TemplateKind::Event)?.into_doc(),
            overlay_waveform: templates.load(TemplateKind::OverlayWaveform)?.into_doc(),
            companion: companion.is_file().then_some(companion),
            style: PathStyle::Native,
        })
    }

    /// Write source paths in `style`.
    #[must_use]
    pub fn with_path_style(mut self, style: PathStyle) -> Self {
        self.style = style;
        self
    }

    /// Build the descriptor document for `entity`.
    pub fn generate(&self, entity: &Entity) -> Document {
        let internal = entity.internal_name();
        let mut doc = self.project.clone();
        let root = doc.root();

        doc.set_child_text(root, "name", &internal);
        doc.set_child_text(root, "currentbank", &internal);
        let folder = ensure_child(&mut doc, root, "sounddeffolder");
        let group = ensure_child(&mut doc, root, "eventgroup");
        let bank = ensure_child(&mut doc, root, "soundbank");
        doc.set_child_text(group, "name", &internal);
        doc.set_child_text(bank, "name", &internal);

        for (index, item) in entity.items.iter().enumerate() {
            let sound_def = self.sound_def_for(&internal, index, item);
            doc.append_document(folder, &sound_def);

            let waveform = self.waveform_for(&internal, "waveform", index, &item.path);
            doc.append_document(bank, &waveform);

            let event = self.event_for(&internal, index, item);
            doc.append_document(group, &event);
        }

        let simple = ensure_child(&mut doc, group, "simpleevent");
        doc.set_child_text(simple, "bankname", &internal);

        if entity.has_overlays() {
            let nested = ensure_child(&mut doc, folder, "sounddeffolder");
            let jingles = ensure_child(&mut doc, nested, "sounddef");
            for (index, overlay) in entity.overlays.iter().enumerate() {
                let waveform = self.waveform_for(&internal, "jingle", index, overlay);
                doc.append_document(bank, &waveform);

                let mut member = self.overlay_waveform.clone();
                let member_root = member.root();
                member.set_child_text(member_root, "filename", &self.style.render(overlay));
                member.set_child_text(member_root, "soundbankname", &internal);
                doc.append_document(jingles, &member);
            }
        }

        doc
    }

    /// Generate and save the descriptor for `entity` at `path`.
    ///
    /// The companion template, when shipped, is copied next to it.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be written.
    pub fn write(&self, entity: &Entity, path: &Path) -> BuildResult<()> {
        self.generate(entity).save(path)?;
        debug!("Wrote descriptor {}", path.display());

        if let Some(companion) = &self.companion {
            let target = path.with_extension("fdt");
            std::fs::copy(companion, &target).map_err(|e| BuildError::io(&target, e))?;
            debug!("Copied {} -> {}", companion.display(), target.display());
        }
        Ok(())
    }

    fn sound_def_for(&self, internal: &str, index: usize, item: &Item) -> Document {
        let mut doc = self.sound_def.clone();
        let root = doc.root();
        doc.set_child_text(root, "name", &format!("/{}", item.stem()));
        doc.set_child_text(root, "guid", &content_guid(internal, "sounddef", index, &item.path));
        let waveform = ensure_child(&mut doc, root, "waveform");
        doc.set_child_text(waveform, "filename", &self.style.render(&item.path));
        doc.set_child_text(waveform, "soundbankname", internal);
        doc
    }

    fn waveform_for(&self, internal: &str, role: &str, index: usize, path: &Path) -> Document {
        let mut doc = self.waveform.clone();
        let root = doc.root();
        doc.set_child_text(root, "filename", &self.style.render(path));
        doc.set_child_text(root, "guid", &content_guid(internal, role, index, path));
        doc
    }

    fn event_for(&self, internal: &str, index: usize, item: &Item) -> Document {
        let mut doc = self.event.clone();
        let root = doc.root();
        doc.set_child_text(root, "name", &format!("{:02}", index + 1));
        doc.set_child_text(root, "guid", &content_guid(internal, "event", index, &item.path));

        let layer = ensure_child(&mut doc, root, "layer");
        let sound = ensure_child(&mut doc, layer, "sound");
        doc.set_child_text(sound, "name", &format!("/{}", item.stem()));

        if !set_force(&mut doc, item.force_ratio()) {
            warn!("Event template has no {FORCE_ENVELOPE} point, force not applied");
        }
        if let Some(volume) = doc.child(root, "volume_db") {
            doc.set_text(volume, &item.volume.to_string());
        }
        doc
    }
}

fn ensure_child(doc: &mut Document, parent: NodeId, name: &str) -> NodeId {
    match doc.child(parent, name) {
        Some(child) => child,
        None => doc.append_element(parent, name),
    }
}

/// Replace the first value of the force envelope's last point.
fn set_force(doc: &mut Document, ratio: f64) -> bool {
    let envelope = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|&n| doc.name(n) == "envelope")
        .find(|&n| doc.child_text(n, "name").as_deref() == Some(FORCE_ENVELOPE));
    let Some(point) = envelope.and_then(|env| doc.children_named(env, "point").last()) else {
        return false;
    };

    let current = doc.text(point);
    let rest: Vec<&str> = current.split(',').skip(1).collect();
    let mut values = vec![format!("{ratio:.6}")];
    values.extend(rest.into_iter().map(str::to_string));
    doc.set_text(point, &values.join(","));
    true
}
