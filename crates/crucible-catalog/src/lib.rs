//! The Catalog Store: a process-lifetime, read-only cache of static
//! game-piece definitions.
//!
//! Loaded once from JSON data files at startup and shared behind an `Arc`.
//! The ledger consults it for every ownership operation; nothing mutates it
//! at runtime.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crucible_types::{
    ActionDef, CardKind, ExplorationDef, ExplorationSubtype, FactionDef, ObjectiveDef, PlanetDef,
    StrategemDef, TechnologyDef,
};

/// Errors raised while loading catalog data files.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog file missing: {0}")]
    Missing(String),

    #[error("catalog file {file} is invalid: {source}")]
    Invalid {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("catalog file {file} must hold a list under the '{key}' key")]
    Format { file: String, key: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// In-memory catalog of every definition kind.
#[derive(Debug, Default)]
pub struct Catalog {
    actions: HashMap<String, ActionDef>,
    technologies: HashMap<String, TechnologyDef>,
    planets: HashMap<String, PlanetDef>,
    strategems: HashMap<String, StrategemDef>,
    explorations: HashMap<String, ExplorationDef>,
    objectives: HashMap<String, ObjectiveDef>,
    factions: HashMap<String, FactionDef>,
}

/// One data file: its name and the JSON key holding the entry list.
const DATA_FILES: [(&str, &str); 7] = [
    ("actions.json", "actions"),
    ("technology.json", "technology"),
    ("planets.json", "planets"),
    ("strategems.json", "strategems"),
    ("exploration.json", "exploration"),
    ("objectives.json", "objectives"),
    ("factions.json", "factions"),
];

impl Catalog {
    /// Load every data file under `dir`.
    ///
    /// Entries that fail to deserialize are skipped with a warning rather
    /// than failing the whole load; a missing or malformed file is fatal.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let dir = dir.as_ref();
        let mut catalog = Catalog::default();

        for entry in read_entries::<ActionDef>(dir, "actions.json", "actions")? {
            catalog.actions.insert(entry.key.clone(), entry);
        }
        for entry in read_entries::<TechnologyDef>(dir, "technology.json", "technology")? {
            catalog.technologies.insert(entry.key.clone(), entry);
        }
        for entry in read_entries::<PlanetDef>(dir, "planets.json", "planets")? {
            catalog.planets.insert(entry.key.clone(), entry);
        }
        for entry in read_entries::<StrategemDef>(dir, "strategems.json", "strategems")? {
            catalog.strategems.insert(entry.key.clone(), entry);
        }
        for entry in read_entries::<ExplorationDef>(dir, "exploration.json", "exploration")? {
            catalog.explorations.insert(entry.key.clone(), entry);
        }
        for entry in read_entries::<ObjectiveDef>(dir, "objectives.json", "objectives")? {
            catalog.objectives.insert(entry.key.clone(), entry);
        }
        for entry in read_entries::<FactionDef>(dir, "factions.json", "factions")? {
            catalog.factions.insert(entry.key.clone(), entry);
        }

        tracing::info!(
            actions = catalog.actions.len(),
            technologies = catalog.technologies.len(),
            planets = catalog.planets.len(),
            strategems = catalog.strategems.len(),
            explorations = catalog.explorations.len(),
            objectives = catalog.objectives.len(),
            factions = catalog.factions.len(),
            "catalog loaded"
        );

        Ok(catalog)
    }

    /// An empty catalog, for tests and for building one by hand.
    pub fn empty() -> Self {
        Self::default()
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Whether a definition of `kind` exists for `key`.
    pub fn contains(&self, kind: CardKind, key: &str) -> bool {
        match kind {
            CardKind::Action => self.actions.contains_key(key),
            CardKind::Technology => self.technologies.contains_key(key),
            CardKind::Planet => self.planets.contains_key(key),
            CardKind::Strategem => self.strategems.contains_key(key),
            CardKind::Exploration => self.explorations.contains_key(key),
            CardKind::Objective => self.objectives.contains_key(key),
        }
    }

    /// Display name for a definition, if present.
    pub fn display_name(&self, kind: CardKind, key: &str) -> Option<&str> {
        match kind {
            CardKind::Action => self.actions.get(key).map(|d| d.name.as_str()),
            CardKind::Technology => self.technologies.get(key).map(|d| d.name.as_str()),
            CardKind::Planet => self.planets.get(key).map(|d| d.name.as_str()),
            CardKind::Strategem => self.strategems.get(key).map(|d| d.name.as_str()),
            CardKind::Exploration => self.explorations.get(key).map(|d| d.name.as_str()),
            CardKind::Objective => self.objectives.get(key).map(|d| d.name.as_str()),
        }
    }

    /// Asset path for a definition, if present.
    pub fn asset(&self, kind: CardKind, key: &str) -> Option<&str> {
        match kind {
            CardKind::Action => self.actions.get(key).map(|d| d.asset.as_str()),
            CardKind::Technology => self.technologies.get(key).map(|d| d.asset.as_str()),
            CardKind::Planet => self.planets.get(key).map(|d| d.asset.as_str()),
            CardKind::Strategem => self.strategems.get(key).map(|d| d.asset.as_str()),
            CardKind::Exploration => self.explorations.get(key).map(|d| d.asset.as_str()),
            CardKind::Objective => self.objectives.get(key).map(|d| d.asset.as_str()),
        }
    }

    /// Every key of a kind, unordered.
    pub fn keys_of(&self, kind: CardKind) -> Vec<&str> {
        match kind {
            CardKind::Action => self.actions.keys().map(String::as_str).collect(),
            CardKind::Technology => self.technologies.keys().map(String::as_str).collect(),
            CardKind::Planet => self.planets.keys().map(String::as_str).collect(),
            CardKind::Strategem => self.strategems.keys().map(String::as_str).collect(),
            CardKind::Exploration => self.explorations.keys().map(String::as_str).collect(),
            CardKind::Objective => self.objectives.keys().map(String::as_str).collect(),
        }
    }

    pub fn action(&self, key: &str) -> Option<&ActionDef> {
        self.actions.get(key)
    }

    pub fn technology(&self, key: &str) -> Option<&TechnologyDef> {
        self.technologies.get(key)
    }

    pub fn planet(&self, key: &str) -> Option<&PlanetDef> {
        self.planets.get(key)
    }

    pub fn strategem(&self, key: &str) -> Option<&StrategemDef> {
        self.strategems.get(key)
    }

    pub fn exploration(&self, key: &str) -> Option<&ExplorationDef> {
        self.explorations.get(key)
    }

    pub fn objective(&self, key: &str) -> Option<&ObjectiveDef> {
        self.objectives.get(key)
    }

    pub fn faction(&self, key: &str) -> Option<&FactionDef> {
        self.factions.get(key)
    }

    /// All strategem definitions, unordered.
    pub fn strategems(&self) -> impl Iterator<Item = &StrategemDef> {
        self.strategems.values()
    }

    /// All exploration definitions, unordered.
    pub fn explorations(&self) -> impl Iterator<Item = &ExplorationDef> {
        self.explorations.values()
    }

    /// All exploration definitions of one subtype.
    pub fn explorations_of(
        &self,
        subtype: ExplorationSubtype,
    ) -> impl Iterator<Item = &ExplorationDef> {
        self.explorations.values().filter(move |d| d.subtype == subtype)
    }

    /// All objective definitions, unordered.
    pub fn objectives(&self) -> impl Iterator<Item = &ObjectiveDef> {
        self.objectives.values()
    }

    // ========================================================================
    // Builders (tests and tooling)
    // ========================================================================

    pub fn insert_action(&mut self, def: ActionDef) {
        self.actions.insert(def.key.clone(), def);
    }

    pub fn insert_technology(&mut self, def: TechnologyDef) {
        self.technologies.insert(def.key.clone(), def);
    }

    pub fn insert_planet(&mut self, def: PlanetDef) {
        self.planets.insert(def.key.clone(), def);
    }

    pub fn insert_strategem(&mut self, def: StrategemDef) {
        self.strategems.insert(def.key.clone(), def);
    }

    pub fn insert_exploration(&mut self, def: ExplorationDef) {
        self.explorations.insert(def.key.clone(), def);
    }

    pub fn insert_objective(&mut self, def: ObjectiveDef) {
        self.objectives.insert(def.key.clone(), def);
    }

    pub fn insert_faction(&mut self, def: FactionDef) {
        self.factions.insert(def.key.clone(), def);
    }
}

/// Names of the data files a complete catalog directory holds.
pub fn expected_files() -> impl Iterator<Item = &'static str> {
    DATA_FILES.iter().map(|(file, _)| *file)
}

/// Read one data file and deserialize its entry list.
///
/// The file holds an object with a single list under `key`. Entries that
/// fail to deserialize are logged and skipped.
fn read_entries<T: DeserializeOwned>(
    dir: &Path,
    file: &str,
    key: &'static str,
) -> Result<Vec<T>, CatalogError> {
    let path = dir.join(file);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(CatalogError::Missing(path.display().to_string()));
        }
        Err(err) => return Err(err.into()),
    };

    let payload: serde_json::Value =
        serde_json::from_str(&raw).map_err(|source| CatalogError::Invalid {
            file: file.to_string(),
            source,
        })?;

    let entries = payload
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or(CatalogError::Format {
            file: file.to_string(),
            key,
        })?;

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<T>(entry.clone()) {
            Ok(def) => out.push(def),
            Err(err) => {
                tracing::warn!(%file, %err, "skipping malformed catalog entry");
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_data_dir(dir: &Path) {
        fs::write(
            dir.join("actions.json"),
            r#"{"actions": [
                {"key": "sabotage", "name": "Sabotage", "asset": "actions/sabotage.png"},
                {"key": "broken", "name": 12}
            ]}"#,
        )
        .unwrap();
        fs::write(
            dir.join("technology.json"),
            r#"{"technology": [
                {"key": "gravity-drive", "name": "Gravity Drive", "color": "blue", "asset": "tech/gd.png"}
            ]}"#,
        )
        .unwrap();
        fs::write(
            dir.join("planets.json"),
            r#"{"planets": [
                {"key": "veldyr", "name": "Veldyr", "biome": "cultural",
                 "resources": 2, "influence": 1, "asset": "planets/veldyr.png"}
            ]}"#,
        )
        .unwrap();
        fs::write(dir.join("strategems.json"), r#"{"strategems": []}"#).unwrap();
        fs::write(
            dir.join("exploration.json"),
            r#"{"exploration": [
                {"key": "vault", "name": "Ancient Vault", "biome": "cultural",
                 "subtype": "relic_fragment", "asset": "exp/vault.png"}
            ]}"#,
        )
        .unwrap();
        fs::write(
            dir.join("objectives.json"),
            r#"{"objectives": [
                {"key": "expand-borders", "name": "Expand Borders", "tier": "stage_one",
                 "victory_points": 1, "asset": "obj/expand.png"}
            ]}"#,
        )
        .unwrap();
        fs::write(dir.join("factions.json"), r#"{"factions": []}"#).unwrap();
    }

    #[test]
    fn test_load_skips_malformed_entries() {
        let dir = tempfile::tempdir().unwrap();
        write_data_dir(dir.path());

        let catalog = Catalog::load(dir.path()).unwrap();
        assert!(catalog.contains(CardKind::Action, "sabotage"));
        assert_eq!(catalog.keys_of(CardKind::Action).len(), 1); // "broken" skipped
        assert_eq!(catalog.display_name(CardKind::Planet, "veldyr"), Some("Veldyr"));
        assert!(catalog.objective("expand-borders").unwrap().tier.is_public());
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = Catalog::load(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::Missing(_)));
    }

    #[test]
    fn test_wrong_shape_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_data_dir(dir.path());
        fs::write(dir.path().join("actions.json"), r#"{"cards": []}"#).unwrap();

        let err = Catalog::load(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::Format { .. }));
    }

    #[test]
    fn test_builder_lookup() {
        let mut catalog = Catalog::empty();
        catalog.insert_action(ActionDef {
            key: "sabotage".into(),
            name: "Sabotage".into(),
            asset: "a.png".into(),
        });

        assert!(catalog.contains(CardKind::Action, "sabotage"));
        assert!(!catalog.contains(CardKind::Action, "unknown"));
        assert!(!catalog.contains(CardKind::Planet, "sabotage"));
    }
}
