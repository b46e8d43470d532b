//! Project descriptor parsing.
//!
//! A project file declares the audio tool and any number of radios:
//!
//! ```xml
//! <project>
//!   <fmod>tools/fmod_designercl.exe</fmod>
//!   <prefix>wine</prefix>
//!   <radio>
//!     <id>ABCD</id>
//!     <name>Test Radio</name>
//!     <logo>logo.dds</logo>
//!     <jingles><file>jingle1.wav</file></jingles>
//!     <songs>
//!       <song><file>a.wav</file><name>Song A</name><force>120</force></song>
//!     </songs>
//!   </radio>
//! </project>
//! ```
//!
//! Invalid radios and songs are logged and left out; only a malformed
//! document fails the whole parse.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, warn};

use tunein_schema::{DEFAULT_FORCE, Entity, EntityId, Item};

use crate::audio::has_drive_letter;
use crate::document::{Document, DocumentError, NodeId};

/// Errors that abort project parsing.
#[derive(Error, Debug)]
pub enum ProjectError {
    /// The project file could not be read or is not well-formed XML.
    #[error("Invalid project {}: {source}", path.display())]
    Malformed {
        /// Project file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: DocumentError,
    },
}

/// A parsed project file.
#[derive(Debug, Clone)]
pub struct Project {
    /// Directory relative paths resolve against.
    pub dir: PathBuf,
    /// Audio tool as written in the project.
    pub tool: Option<PathBuf>,
    /// Launcher placed in front of the tool.
    pub prefix: Option<String>,
    /// Valid radios in declaration order.
    pub entities: Vec<Entity>,
    /// Reasons radios or songs were left out.
    pub rejected: Vec<String>,
}

impl Project {
    /// Parse the project file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::Malformed`] if the file cannot be read or parsed.
    pub fn parse(path: &Path) -> Result<Self, ProjectError> {
        let doc = Document::load(path).map_err(|source| ProjectError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        Ok(Self::from_document(&doc, dir))
    }

    /// Parse project XML, resolving relative paths against `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::Malformed`] if the XML is not well-formed.
    pub fn parse_str(xml: &str, dir: &Path) -> Result<Self, ProjectError> {
        let doc = Document::parse(xml).map_err(|source| ProjectError::Malformed {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self::from_document(&doc, dir))
    }

    fn from_document(doc: &Document, dir: &Path) -> Self {
        let root = doc.root();
        let mut project = Self {
            dir: dir.to_path_buf(),
            tool: non_blank(doc.child_text(root, "fmod")).map(PathBuf::from),
            prefix: non_blank(doc.child_text(root, "prefix")),
            entities: Vec::new(),
            rejected: Vec::new(),
        };

        let mut seen = HashSet::new();
        for radio in doc.children_named(root, "radio") {
            match project.parse_radio(doc, radio) {
                Ok(entity) if !seen.insert(entity.id.clone()) => {
                    project.reject(format!("Duplicate radio id {}, skipping", entity.id));
                }
                Ok(entity) => project.entities.push(entity),
                Err(reason) => project.reject(reason),
            }
        }
        project
    }

    fn reject(&mut self, reason: String) {
        error!("{reason}");
        self.rejected.push(reason);
    }

    fn parse_radio(&mut self, doc: &Document, radio: NodeId) -> Result<Entity, String> {
        let raw_id = doc.child_text(radio, "id").unwrap_or_default();
        let id = EntityId::new(raw_id.trim()).map_err(|_| {
            format!("Missing or invalid radio id '{raw_id}', expected exactly 4 characters")
        })?;

        let name = non_blank(doc.child_text(radio, "name"))
            .ok_or_else(|| format!("Radio {id} has no name"))?;

        let logo = non_blank(doc.child_text(radio, "logo")).map(|l| resolve_path(&self.dir, &l));
        if let Some(logo) = logo.as_ref().filter(|l| !l.is_file()) {
            warn!("Logo {} of radio {id} not found", logo.display());
        }

        let overlays = doc
            .child(radio, "jingles")
            .map(|jingles| {
                doc.children_named(jingles, "file")
                    .filter_map(|f| non_blank(Some(doc.text(f))))
                    .map(|f| resolve_path(&self.dir, &f))
                    .collect()
            })
            .unwrap_or_default();

        let songs: Vec<NodeId> = doc
            .child(radio, "songs")
            .map(|songs| doc.children_named(songs, "song").collect())
            .unwrap_or_default();
        if songs.is_empty() {
            return Err(format!("Radio {id} has no songs"));
        }

        let mut items = Vec::with_capacity(songs.len());
        for (index, song) in songs.into_iter().enumerate() {
            match self.parse_song(doc, song) {
                Some(item) => items.push(item),
                None => self.reject(format!("Song {} of radio {id} has no file", index + 1)),
            }
        }
        if items.is_empty() {
            return Err(format!("Radio {id} has no usable songs"));
        }

        Ok(Entity {
            id,
            name,
            logo,
            items,
            overlays,
        })
    }

    fn parse_song(&self, doc: &Document, song: NodeId) -> Option<Item> {
        let file = non_blank(doc.child_text(song, "file"))?;
        let mut item = Item::new(resolve_path(&self.dir, &file));
        item.name = non_blank(doc.child_text(song, "name"));
        item.artist = non_blank(doc.child_text(song, "artist"));
        item.album = non_blank(doc.child_text(song, "album"));
        item.year = non_blank(doc.child_text(song, "year"));
        item.length = non_blank(doc.child_text(song, "length"));

        if let Some(force) = non_blank(doc.child_text(song, "force")) {
            item.force = force.parse().unwrap_or_else(|_| {
                warn!("Invalid force '{force}' for {file}, using {DEFAULT_FORCE}");
                DEFAULT_FORCE
            });
        }
        if let Some(volume) = non_blank(doc.child_text(song, "volume")) {
            match volume.replace(',', ".").parse() {
                Ok(v) => item.volume = v,
                Err(_) => warn!("Invalid volume '{volume}' for {file}, using 0"),
            }
        }
        Some(item)
    }
}

/// Resolve a path from the project against `dir`.
///
/// Absolute and drive-letter paths are kept as written.
pub fn resolve_path(dir: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() || has_drive_letter(raw) {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PROJECT: &str = r"<project>
  <fmod>tools/fmod_designercl.exe</fmod>
  <prefix>wine</prefix>
  <radio>
    <id>ABCD</id>
    <name>Test Radio</name>
    <logo>logo.dds</logo>
    <jingles>
      <file>jingle1.wav</file>
      <file>  </file>
      <file>Z:\music\jingle2.wav</file>
    </jingles>
    <songs>
      <song>
        <file>a.wav</file>
        <name>Song A</name>
        <artist>Artist</artist>
        <force>120</force>
        <volume>-2,5</volume>
      </song>
      <song>
        <file>/abs/b.wav</file>
        <album>Side B</album>
        <force>loud</force>
      </song>
      <song><name>No File</name></song>
    </songs>
  </radio>
  <radio>
    <id>TOOLONG</id>
    <name>Bad</name>
    <songs><song><file>x.wav</file></song></songs>
  </radio>
  <radio>
    <id>EFGH</id>
    <name>   </name>
    <songs><song><file>x.wav</file></song></songs>
  </radio>
  <radio>
    <id>IJKL</id>
    <name>Silent</name>
  </radio>
  <radio>
    <id>ABCD</id>
    <name>Again</name>
    <songs><song><file>x.wav</file></song></songs>
  </radio>
</project>";

    #[test]
    fn parses_radios_and_songs() {
        let dir = Path::new("/projects/demo");
        let project = Project::parse_str(PROJECT, dir).unwrap();

        assert_eq!(project.tool, Some(PathBuf::from("tools/fmod_designercl.exe")));
        assert_eq!(project.prefix.as_deref(), Some("wine"));
        assert_eq!(project.entities.len(), 1);

        let radio = &project.entities[0];
        assert_eq!(radio.id.as_str(), "ABCD");
        assert_eq!(radio.name, "Test Radio");
        assert_eq!(radio.logo, Some(dir.join("logo.dds")));
        assert_eq!(
            radio.overlays,
            [dir.join("jingle1.wav"), PathBuf::from("Z:\\music\\jingle2.wav")]
        );

        assert_eq!(radio.items.len(), 2);
        let a = &radio.items[0];
        assert_eq!(a.path, dir.join("a.wav"));
        assert_eq!(a.name.as_deref(), Some("Song A"));
        assert_eq!(a.artist.as_deref(), Some("Artist"));
        assert_eq!(a.album, None);
        assert_eq!(a.force, 120);
        assert!((a.volume + 2.5).abs() < f32::EPSILON);

        let b = &radio.items[1];
        assert_eq!(b.path, PathBuf::from("/abs/b.wav"));
        assert_eq!(b.album.as_deref(), Some("Side B"));
        assert_eq!(b.force, DEFAULT_FORCE);
        assert_eq!(b.name, None);
    }

    #[test]
    fn rejections_are_recorded() {
        let project = Project::parse_str(PROJECT, Path::new(".")).unwrap();
        assert_eq!(project.rejected.len(), 5);
        assert!(project.rejected[0].contains("Song 3 of radio ABCD"));
        assert!(project.rejected[1].contains("TOOLONG"));
        assert!(project.rejected[2].contains("EFGH has no name"));
        assert!(project.rejected[3].contains("IJKL has no songs"));
        assert!(project.rejected[4].contains("Duplicate radio id ABCD"));
    }

    #[test]
    fn radio_without_usable_songs_is_dropped() {
        let xml = "<project><radio><id>WXYZ</id><name>Empty</name>\
                   <songs><song><file> </file></song></songs></radio></project>";
        let project = Project::parse_str(xml, Path::new(".")).unwrap();
        assert!(project.entities.is_empty());
        assert_eq!(project.tool, None);
        assert!(project.rejected.iter().any(|r| r.contains("no usable songs")));
    }

    #[test]
    fn malformed_project_fails() {
        assert!(matches!(
            Project::parse_str("<project><radio></project>", Path::new(".")),
            Err(ProjectError::Malformed { .. })
        ));
    }

    #[test]
    fn parse_resolves_against_file_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.xml");
        std::fs::write(
            &path,
            "<project><radio><id>ABCD</id><name>R</name>\
             <songs><song><file>music/a.wav</file></song></songs></radio></project>",
        )
        .unwrap();
        let project = Project::parse(&path).unwrap();
        assert_eq!(project.dir, dir.path());
        assert_eq!(project.entities[0].items[0].path, dir.path().join("music/a.wav"));
    }

    #[test]
    fn drive_letter_paths_are_kept() {
        assert_eq!(
            resolve_path(Path::new("/p"), "C:\\music\\a.wav"),
            PathBuf::from("C:\\music\\a.wav")
        );
        assert_eq!(resolve_path(Path::new("/p"), "a.wav"), PathBuf::from("/p/a.wav"));
    }
}
