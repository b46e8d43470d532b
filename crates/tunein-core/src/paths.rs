//! Well-known locations and the file names derived from an entity id.

use dirs::home_dir;
use std::path::PathBuf;

use tunein_schema::EntityId;

/// Returns the configuration directory, or None if the user's home cannot be resolved.
pub fn try_tunein_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("TUNEIN_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".tunein"))
}

/// User configuration file: ~/.tunein/config.toml
pub fn config_path() -> Option<PathBuf> {
    try_tunein_home().map(|h| h.join("config.toml"))
}

/// Audio descriptor next to the project file: `Radio_{id}.fdp`
pub fn descriptor_file(id: &EntityId) -> String {
    format!("{}.fdp", id.internal_name())
}

/// Audio tool outputs: `Radio_{id}.fev`, `Radio_{id}.fsb`
pub fn sound_outputs(id: &EntityId) -> [String; 2] {
    let name = id.internal_name();
    [format!("{name}.fev"), format!("{name}.fsb")]
}

/// Archive stem: `Radio_{id}_data` (`.fat` / `.dat`)
pub fn archive_stem(id: &EntityId) -> String {
    format!("{}_data", id.internal_name())
}

/// Item-list document: `Radio_{id}_songs.xml`
pub fn songs_file(id: &EntityId) -> String {
    format!("{}_songs.xml", id.internal_name())
}

/// Container record: `Radio_{id}_radio.xml`
pub fn radio_file(id: &EntityId) -> String {
    format!("{}_radio.xml", id.internal_name())
}

/// Text table record: `Radio_{id}_loc_tat.xml`
pub fn loc_tat_file(id: &EntityId) -> String {
    format!("{}_loc_tat.xml", id.internal_name())
}

/// Localized string record: `Radio_{id}_loc_string.xml`
pub fn loc_string_file(id: &EntityId) -> String {
    format!("{}_loc_string.xml", id.internal_name())
}

/// Bundle manifest: `TuneinCrew{id}.mdata`
pub fn manifest_file(id: &EntityId) -> String {
    format!("TuneinCrew{id}.mdata")
}

/// Final bundle: `TuneinCrew{id}.zip`
pub fn bundle_file(id: &EntityId) -> String {
    format!("TuneinCrew{id}.zip")
}

/// Runtime path of the logo texture, as hashed into the container record.
pub fn logo_runtime_path(id: &EntityId) -> String {
    format!("ui\\textures\\radiologos\\{}.xbt", id.internal_name())
}

/// Logo texture location inside the data staging directory.
pub fn logo_staging_path(id: &EntityId) -> PathBuf {
    PathBuf::from("ui")
        .join("textures")
        .join("radiologos")
        .join(format!("{}.xbt", id.internal_name()).to_lowercase())
}

/// Runtime path of the compiled event project.
pub fn project_runtime_path(id: &EntityId) -> String {
    format!("sound\\{}.fev", id.internal_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_names() {
        let id = EntityId::new("AbCd").unwrap();
        assert_eq!(descriptor_file(&id), "Radio_AbCd.fdp");
        assert_eq!(archive_stem(&id), "Radio_AbCd_data");
        assert_eq!(bundle_file(&id), "TuneinCrewAbCd.zip");
        assert_eq!(
            logo_staging_path(&id),
            PathBuf::from("ui/textures/radiologos/radio_abcd.xbt")
        );
        assert_eq!(
            logo_runtime_path(&id),
            "ui\\textures\\radiologos\\Radio_AbCd.xbt"
        );
        assert_eq!(project_runtime_path(&id), "sound\\Radio_AbCd.fev");
    }
}
