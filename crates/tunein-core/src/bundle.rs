//! Mod manager bundle: the `.mdata` manifest and the final zip.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use tunein_schema::Entity;

use crate::document::Document;
use crate::error::{BuildError, BuildResult};
use crate::paths;
use crate::template::{TemplateKind, TemplateSet};

/// Load priority the mod manager assigns to every bundled file.
pub const FILE_PRIORITY: &str = "998";

/// Files the manifest lists, in load order.
pub fn manifest_entries(entity: &Entity) -> Vec<String> {
    let id = &entity.id;
    vec![
        paths::archive_stem(id),
        paths::songs_file(id),
        paths::radio_file(id),
        paths::loc_tat_file(id),
        paths::loc_string_file(id),
    ]
}

/// Fills the manifest template.
#[derive(Debug, Clone)]
pub struct ManifestWriter {
    template: Document,
}

impl ManifestWriter {
    /// Load the manifest template.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Template`] if it is missing or malformed.
    pub fn load(templates: &TemplateSet) -> BuildResult<Self> {
        Ok(Self {
            template: templates.load(TemplateKind::Mdata)?.into_doc(),
        })
    }

    /// Manifest document for `entity`.
    pub fn generate(&self, entity: &Entity) -> Document {
        let mut doc = self.template.clone();
        let root = doc.root();

        let names = match doc.child(root, "names") {
            Some(names) => names,
            None => doc.append_element(root, "names"),
        };
        doc.set_child_text(names, "English", &entity.name);

        let files = match doc.child(root, "files") {
            Some(files) => files,
            None => doc.append_element(root, "files"),
        };
        for loc in manifest_entries(entity) {
            let file = doc.append_element(files, "file");
            doc.set_attribute(file, "priority", FILE_PRIORITY);
            doc.set_attribute(file, "loc", &loc);
        }
        doc
    }

    /// Write `TuneinCrew{id}.mdata` into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, entity: &Entity, dir: &Path) -> BuildResult<PathBuf> {
        let path = dir.join(paths::manifest_file(&entity.id));
        self.generate(entity).save(&path)?;
        debug!("Wrote manifest {}", path.display());
        Ok(path)
    }
}

/// Zip every file below `source_dir` into `target`, flat and sorted by name.
///
/// Entries carry a fixed timestamp so identical inputs give identical bytes.
/// An existing `target` is replaced.
///
/// # Errors
///
/// Returns an error if a file cannot be read or the archive cannot be written.
pub fn write_bundle(source_dir: &Path, target: &Path) -> BuildResult<Vec<String>> {
    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source_dir).to_path_buf();
            BuildError::io(path, e.into())
        })?;
        if entry.file_type().is_file() {
            let name = entry.file_name().to_string_lossy().into_owned();
            files.push((name, entry.into_path()));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    if target.exists() {
        std::fs::remove_file(target).map_err(|e| BuildError::io(target, e))?;
    }
    let out = File::create(target).map_err(|e| BuildError::io(target, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(out));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    let mut names = Vec::with_capacity(files.len());
    for (name, path) in files {
        zip.start_file(name.as_str(), options)?;
        let mut input = File::open(&path).map_err(|e| BuildError::io(&path, e))?;
        std::io::copy(&mut input, &mut zip).map_err(|e| BuildError::io(&path, e))?;
        debug!("Bundled {name}");
        names.push(name);
    }
    zip.finish()?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tunein_schema::{EntityId, Item};

    fn entity() -> Entity {
        Entity {
            id: EntityId::new("ABCD").unwrap(),
            name: "Test Radio".to_string(),
            logo: None,
            items: vec![Item::new("a.wav")],
            overlays: Vec::new(),
        }
    }

    #[test]
    fn manifest_lists_files_in_load_order() {
        let templates =
            TemplateSet::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets"));
        let writer = ManifestWriter::load(&templates).unwrap();
        let doc = writer.generate(&entity());
        let root = doc.root();

        let names = doc.child(root, "names").unwrap();
        assert_eq!(doc.child_text(names, "English").as_deref(), Some("Test Radio"));

        let files = doc.child(root, "files").unwrap();
        let locs: Vec<&str> = doc
            .children_named(files, "file")
            .filter_map(|f| doc.attribute(f, "loc"))
            .collect();
        assert_eq!(
            locs,
            [
                "Radio_ABCD_data",
                "Radio_ABCD_songs.xml",
                "Radio_ABCD_radio.xml",
                "Radio_ABCD_loc_tat.xml",
                "Radio_ABCD_loc_string.xml",
            ]
        );
        assert!(
            doc.children_named(files, "file")
                .all(|f| doc.attribute(f, "priority") == Some("998"))
        );
    }

    #[test]
    fn bundle_is_flat_sorted_and_reproducible() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("b.xml"), b"<b/>").unwrap();
        std::fs::write(src.path().join("a.fat"), b"FAT2").unwrap();
        std::fs::create_dir(src.path().join("nested")).unwrap();
        std::fs::write(src.path().join("nested").join("c.dat"), b"data").unwrap();

        let out = tempfile::tempdir().unwrap();
        let first = out.path().join("first.zip");
        let second = out.path().join("second.zip");
        let names = write_bundle(src.path(), &first).unwrap();
        write_bundle(src.path(), &second).unwrap();

        assert_eq!(names, ["a.fat", "b.xml", "c.dat"]);
        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());

        let mut archive = zip::ZipArchive::new(File::open(&first).unwrap()).unwrap();
        assert_eq!(archive.len(), 3);
        let entry = archive.by_name("c.dat").unwrap();
        assert_eq!(entry.size(), 4);
    }

    #[test]
    fn bundle_replaces_existing_file() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("only.xml"), b"<x/>").unwrap();
        let out = tempfile::tempdir().unwrap();
        let target = out.path().join("TuneinCrewABCD.zip");
        std::fs::write(&target, b"stale").unwrap();

        write_bundle(src.path(), &target).unwrap();
        let archive = zip::ZipArchive::new(File::open(&target).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);
    }
}
