// Scene and character catalog (catalog.toml).
//
// Built once at startup and shared read-only across request handlers.
// Lookups for unknown ids return `None`; callers decide how to react.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Catalog compiled into the binary, used when no catalog path is configured.
const BUILTIN_CATALOG: &str = include_str!("../../../defaults/catalog.toml");

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse catalog: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("duplicate {kind} id `{id}`")]
    DuplicateId { kind: &'static str, id: String },

    #[error("{kind} entry #{index} has an empty id")]
    EmptyId { kind: &'static str, index: usize },
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// A backdrop the conversation takes place in.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Scene {
    pub id: String,
    pub name: String,
    pub description: String,
    pub opening_line: String,
}

/// A persona the model impersonates for one turn.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub role: String,
    pub personality: String,
    /// Display hint for clients (colour name); never used in prompts.
    pub style: String,
}

/// Raw deserialization target for catalog.toml.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    scenes: Vec<Scene>,
    #[serde(default)]
    characters: Vec<Character>,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Immutable id -> entry lookup for scenes and characters.
///
/// Entries keep their declaration order so enumeration is stable.
#[derive(Debug, Clone)]
pub struct Catalog {
    scenes: Vec<Scene>,
    characters: Vec<Character>,
    scene_index: HashMap<String, usize>,
    character_index: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog from already-constructed entries, rejecting empty or
    /// duplicate ids.
    pub fn new(scenes: Vec<Scene>, characters: Vec<Character>) -> Result<Self, CatalogError> {
        let scene_index = build_index("scene", scenes.iter().map(|s| s.id.as_str()))?;
        let character_index =
            build_index("character", characters.iter().map(|c| c.id.as_str()))?;

        Ok(Self {
            scenes,
            characters,
            scene_index,
            character_index,
        })
    }

    /// Parse a catalog from TOML text with `[[scenes]]` and `[[characters]]`
    /// arrays of tables.
    pub fn from_toml_str(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(text)?;
        Self::new(file.scenes, file.characters)
    }

    /// Read and parse a catalog file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|_| CatalogError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        Self::from_toml_str(&text)
    }

    /// The catalog shipped with the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    pub fn lookup_scene(&self, id: &str) -> Option<&Scene> {
        self.scene_index.get(id).map(|&i| &self.scenes[i])
    }

    pub fn lookup_character(&self, id: &str) -> Option<&Character> {
        self.character_index.get(id).map(|&i| &self.characters[i])
    }

    pub fn all_scenes(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.iter()
    }

    pub fn all_characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.iter()
    }

    /// Render the catalog in the shape clients expect from `GET /meta`:
    ///
    /// ```json
    /// { "scenarios": { "<id>": { "name", "description", "opening_line" } },
    ///   "agents":    { "<id>": { "name", "role", "personality", "style" } } }
    /// ```
    pub fn to_meta(&self) -> Value {
        let scenarios: Map<String, Value> = self
            .scenes
            .iter()
            .map(|s| {
                (
                    s.id.clone(),
                    serde_json::json!({
                        "name": s.name,
                        "description": s.description,
                        "opening_line": s.opening_line,
                    }),
                )
            })
            .collect();

        let agents: Map<String, Value> = self
            .characters
            .iter()
            .map(|c| {
                (
                    c.id.clone(),
                    serde_json::json!({
                        "name": c.name,
                        "role": c.role,
                        "personality": c.personality,
                        "style": c.style,
                    }),
                )
            })
            .collect();

        serde_json::json!({
            "scenarios": scenarios,
            "agents": agents,
        })
    }
}

fn build_index<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<HashMap<String, usize>, CatalogError> {
    let mut index = HashMap::new();
    for (i, id) in ids.enumerate() {
        if id.trim().is_empty() {
            return Err(CatalogError::EmptyId { kind, index: i });
        }
        if index.insert(id.to_string(), i).is_some() {
            return Err(CatalogError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(index)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
