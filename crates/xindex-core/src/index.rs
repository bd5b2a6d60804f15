//! Per-unit index records.
//!
//! A parse of one source unit visits many files. The parser returns one
//! [`PerUnitIndex`] per visited file; each addresses other files through
//! [`LocalFile`] ids resolved by its own `lid2path` table.
//!
//! Definitions are shaped per entity kind through the [`Detail`] trait:
//!
//! | Kind | Detail | Relation lists |
//! |------|--------|----------------|
//! | Function | [`FuncDetail`] | bases, local variables, callees |
//! | Type | [`TypeDetail`] | bases, member funcs/types/vars, alias target |
//! | Variable | [`VarDetail`] | declared type |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Debug;
use std::path::Path;

use crate::delta::{Delta, KindDelta};
use crate::position::Range;
use crate::store::{EntityTable, GlobalStore};
use crate::symbol::{DeclRef, EntityKind, FileId, FileRemap, LocalFile, SymbolKey, SymbolRef, Use};

// ============================================================================
// Content Hash
// ============================================================================

/// SHA-256 hash of content, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute SHA-256 hash of the given bytes, returning hex-encoded string.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        ContentHash(hex::encode(result))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// File-Level Records
// ============================================================================

/// Source language of a unit.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Unknown,
    C,
    Cpp,
    ObjC,
    ObjCpp,
}

impl Language {
    /// Guess the language from a file extension.
    pub fn from_path(path: &str) -> Self {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match ext {
            "c" => Language::C,
            "cc" | "cpp" | "cxx" | "c++" | "hh" | "hpp" | "hxx" => Language::Cpp,
            "m" => Language::ObjC,
            "mm" => Language::ObjCpp,
            _ => Language::Unknown,
        }
    }
}

/// An include directive seen in a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Include {
    /// 0-based line of the directive.
    pub line: u16,
    /// Path the directive resolved to.
    pub resolved_path: String,
}

/// The file definition installed into the store for an indexed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDef {
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub includes: Vec<Include>,
    /// Preprocessor-inactive ranges.
    #[serde(default)]
    pub skipped_ranges: Vec<Range>,
    /// Other files this file depends on, with their write times.
    #[serde(default)]
    pub dependencies: BTreeMap<String, i64>,
}

// ============================================================================
// Definitions
// ============================================================================

/// Kind-specific part of a [`Definition`], and where each kind lives in the
/// index, the Delta and the store.
pub trait Detail:
    Clone + Debug + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Entity kind this detail describes.
    const KIND: EntityKind;

    fn index_entities(index: &PerUnitIndex) -> &BTreeMap<SymbolKey, IndexEntity<Self>>;
    fn index_entities_mut(index: &mut PerUnitIndex) -> &mut BTreeMap<SymbolKey, IndexEntity<Self>>;
    fn delta_part(delta: &Delta) -> &KindDelta<Self>;
    fn delta_part_mut(delta: &mut Delta) -> &mut KindDelta<Self>;
    fn table(store: &GlobalStore) -> &EntityTable<Self>;
}

/// Function relations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncDetail {
    /// Functions this one overrides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<SymbolKey>,
    /// Local variables.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vars: Vec<SymbolKey>,
    /// Calls made from the body.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub callees: Vec<SymbolRef>,
}

/// Type relations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDetail {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<SymbolKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub funcs: Vec<SymbolKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<SymbolKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vars: Vec<SymbolKey>,
    /// Target of a typedef/alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_of: Option<SymbolKey>,
}

/// Variable relations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarDetail {
    /// Declared type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_type: Option<SymbolKey>,
}

impl Detail for FuncDetail {
    const KIND: EntityKind = EntityKind::Function;

    fn index_entities(index: &PerUnitIndex) -> &BTreeMap<SymbolKey, IndexEntity<Self>> {
        &index.funcs
    }
    fn index_entities_mut(index: &mut PerUnitIndex) -> &mut BTreeMap<SymbolKey, IndexEntity<Self>> {
        &mut index.funcs
    }
    fn delta_part(delta: &Delta) -> &KindDelta<Self> {
        &delta.funcs
    }
    fn delta_part_mut(delta: &mut Delta) -> &mut KindDelta<Self> {
        &mut delta.funcs
    }
    fn table(store: &GlobalStore) -> &EntityTable<Self> {
        &store.funcs
    }
}

impl Detail for TypeDetail {
    const KIND: EntityKind = EntityKind::Type;

    fn index_entities(index: &PerUnitIndex) -> &BTreeMap<SymbolKey, IndexEntity<Self>> {
        &index.types
    }
    fn index_entities_mut(index: &mut PerUnitIndex) -> &mut BTreeMap<SymbolKey, IndexEntity<Self>> {
        &mut index.types
    }
    fn delta_part(delta: &Delta) -> &KindDelta<Self> {
        &delta.types
    }
    fn delta_part_mut(delta: &mut Delta) -> &mut KindDelta<Self> {
        &mut delta.types
    }
    fn table(store: &GlobalStore) -> &EntityTable<Self> {
        &store.types
    }
}

impl Detail for VarDetail {
    const KIND: EntityKind = EntityKind::Variable;

    fn index_entities(index: &PerUnitIndex) -> &BTreeMap<SymbolKey, IndexEntity<Self>> {
        &index.vars
    }
    fn index_entities_mut(index: &mut PerUnitIndex) -> &mut BTreeMap<SymbolKey, IndexEntity<Self>> {
        &mut index.vars
    }
    fn delta_part(delta: &Delta) -> &KindDelta<Self> {
        &delta.vars
    }
    fn delta_part_mut(delta: &mut Delta) -> &mut KindDelta<Self> {
        &mut delta.vars
    }
    fn table(store: &GlobalStore) -> &EntityTable<Self> {
        &store.vars
    }
}

/// One file's definition of an entity.
///
/// A definition with an empty `name` is trivial: the entity is only
/// referenced from this file, not defined in it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "D: Serialize, F: Serialize",
    deserialize = "D: Deserialize<'de> + Default, F: Deserialize<'de>"
))]
pub struct Definition<D, F = FileId> {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    /// Canonical spelling, in the defining file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spell: Option<DeclRef<F>>,
    #[serde(default)]
    pub detail: D,
}

impl<D, F> Definition<D, F> {
    /// Whether this definition carries no content.
    pub fn is_trivial(&self) -> bool {
        self.name.is_empty()
    }
}

impl<D: Clone> Definition<D, LocalFile> {
    /// Move the spelling into the global file id space.
    pub fn resolve(&self, remap: &FileRemap) -> Option<Definition<D, FileId>> {
        let spell = match &self.spell {
            Some(spell) => Some(spell.resolve(remap)?),
            None => None,
        };
        Some(Definition {
            name: self.name.clone(),
            comments: self.comments.clone(),
            spell,
            detail: self.detail.clone(),
        })
    }
}

// ============================================================================
// Per-Unit Entities
// ============================================================================

/// Everything one parse knows about one entity, as seen from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "D: Serialize", deserialize = "D: Deserialize<'de> + Default"))]
pub struct IndexEntity<D> {
    pub key: SymbolKey,
    #[serde(default)]
    pub def: Definition<D, LocalFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub declarations: Vec<DeclRef<LocalFile>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uses: Vec<Use<LocalFile>>,
    /// Derived types or overriding functions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived: Vec<SymbolKey>,
    /// Variables of this type.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<SymbolKey>,
}

impl<D: Default> IndexEntity<D> {
    /// Create an entity with a trivial definition and no relations.
    pub fn new(key: SymbolKey) -> Self {
        IndexEntity {
            key,
            def: Definition::default(),
            declarations: Vec::new(),
            uses: Vec::new(),
            derived: Vec::new(),
            instances: Vec::new(),
        }
    }
}

impl<D> IndexEntity<D> {
    /// Every local file id this entity mentions.
    pub fn local_files(&self) -> impl Iterator<Item = LocalFile> + '_ {
        self.def
            .spell
            .iter()
            .map(|s| s.file_id)
            .chain(self.declarations.iter().map(|d| d.file_id))
            .chain(self.uses.iter().map(|u| u.file_id))
    }
}

// ============================================================================
// PerUnitIndex
// ============================================================================

/// The symbol picture of one visited file, produced by one parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerUnitIndex {
    /// The file this record-set belongs to.
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub language: Language,
    /// Write time of `path` when it was parsed (nanoseconds since the epoch).
    #[serde(default)]
    pub last_write_time: i64,
    /// Content of `path` as parsed.
    #[serde(default)]
    pub file_contents: String,
    /// Local file id table; `LocalFile::Other(lid)` resolves here.
    #[serde(default)]
    pub lid2path: BTreeMap<u32, String>,
    #[serde(default)]
    pub includes: Vec<Include>,
    #[serde(default)]
    pub skipped_ranges: Vec<Range>,
    /// Write times of the files this one depends on.
    #[serde(default)]
    pub dependencies: BTreeMap<String, i64>,
    #[serde(default, with = "entity_list")]
    pub funcs: BTreeMap<SymbolKey, IndexEntity<FuncDetail>>,
    #[serde(default, with = "entity_list")]
    pub types: BTreeMap<SymbolKey, IndexEntity<TypeDetail>>,
    #[serde(default, with = "entity_list")]
    pub vars: BTreeMap<SymbolKey, IndexEntity<VarDetail>>,
}

impl PerUnitIndex {
    /// Create an index with no symbols for `path`.
    ///
    /// Diffing a stored index against an empty one removes everything the
    /// stored one contributed.
    pub fn empty(path: impl Into<String>) -> Self {
        let path = path.into();
        PerUnitIndex {
            language: Language::from_path(&path),
            path,
            ..Default::default()
        }
    }

    /// Local id for `path`, allocating one if it is not in the table yet.
    pub fn lid_for(&mut self, path: &str) -> LocalFile {
        if path == self.path {
            return LocalFile::Owner;
        }
        if let Some((lid, _)) = self.lid2path.iter().find(|(_, p)| p.as_str() == path) {
            return LocalFile::Other(*lid);
        }
        let lid = self.lid2path.keys().next_back().map_or(0, |l| l + 1);
        self.lid2path.insert(lid, path.to_string());
        LocalFile::Other(lid)
    }

    /// Entity of kind `D` for `key`, created on first access.
    pub fn entity_mut<D: Detail>(&mut self, key: SymbolKey) -> &mut IndexEntity<D> {
        D::index_entities_mut(self)
            .entry(key)
            .or_insert_with(|| IndexEntity::new(key))
    }

    /// Entity of kind `D` for `key`, if present.
    pub fn entity<D: Detail>(&self, key: SymbolKey) -> Option<&IndexEntity<D>> {
        D::index_entities(self).get(&key)
    }

    /// The file definition this index installs.
    pub fn file_def(&self) -> FileDef {
        FileDef {
            path: self.path.clone(),
            args: self.args.clone(),
            language: self.language,
            includes: self.includes.clone(),
            skipped_ranges: self.skipped_ranges.clone(),
            dependencies: self.dependencies.clone(),
        }
    }

    /// Total number of entities across all kinds.
    pub fn entity_count(&self) -> usize {
        self.funcs.len() + self.types.len() + self.vars.len()
    }

    /// Local ids referenced by entities but missing from `lid2path`.
    pub fn dangling_lids(&self) -> Vec<u32> {
        let mut missing: Vec<u32> = local_files_of(&self.funcs)
            .chain(local_files_of(&self.types))
            .chain(local_files_of(&self.vars))
            .filter_map(|f| match f {
                LocalFile::Other(lid) if !self.lid2path.contains_key(&lid) => Some(lid),
                _ => None,
            })
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }
}

fn local_files_of<D>(
    map: &BTreeMap<SymbolKey, IndexEntity<D>>,
) -> impl Iterator<Item = LocalFile> + '_ {
    map.values().flat_map(|e| e.local_files())
}

/// Serializes an entity map as a list; each entity already carries its key.
mod entity_list {
    use super::{IndexEntity, SymbolKey};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S, D>(
        map: &BTreeMap<SymbolKey, IndexEntity<D>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        D: Serialize,
    {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, De, D>(
        deserializer: De,
    ) -> Result<BTreeMap<SymbolKey, IndexEntity<D>>, De::Error>
    where
        De: Deserializer<'de>,
        D: Deserialize<'de> + Default,
    {
        let list = Vec::<IndexEntity<D>>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|e| (e.key, e)).collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
