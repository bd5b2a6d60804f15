//! Symbol identity and occurrence types.
//!
//! - [`SymbolKey`]: stable, parser-supplied symbol identity
//! - [`EntityKind`]: File/Function/Type/Variable tag
//! - [`Role`]: bitmask describing how an occurrence uses its symbol
//! - [`Use`] / [`DeclRef`]: occurrences, generic over the file id space
//!
//! # File id spaces
//!
//! Occurrences produced by one parse address files through [`LocalFile`] ids
//! that only mean something together with that parse's `lid -> path` table.
//! The store owns the only global arena of [`FileId`]s. `Use<LocalFile>` and
//! `Use<FileId>` are different types, so a local id can only reach the store
//! through [`FileRemap`].

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::position::{Position, Range};

// ============================================================================
// Identity
// ============================================================================

/// Opaque, content-derived 64-bit symbol identifier.
///
/// Supplied by the parser; stable for the same logical symbol across parses
/// and files. Never recomputed here.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SymbolKey(pub u64);

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key_{:016x}", self.0)
    }
}

/// Kind of indexed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    File,
    Function,
    Type,
    Variable,
}

impl EntityKind {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::File => "file",
            EntityKind::Function => "function",
            EntityKind::Type => "type",
            EntityKind::Variable => "variable",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// How an occurrence relates to its symbol. Several roles may combine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Role: u16 {
        const DECLARATION = 1 << 0;
        const DEFINITION = 1 << 1;
        const REFERENCE = 1 << 2;
        const READ = 1 << 3;
        const WRITE = 1 << 4;
        const CALL = 1 << 5;
        const DYNAMIC = 1 << 6;
        const ADDRESS = 1 << 7;
        const IMPLICIT = 1 << 8;
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::REFERENCE
    }
}

// ============================================================================
// File Ids
// ============================================================================

/// Global file id: index into the store's dense file table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl FileId {
    /// Create a new file ID.
    pub fn new(id: u32) -> Self {
        FileId(id)
    }

    /// Index into the dense file table.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file_{}", self.0)
    }
}

/// File id scoped to one parse.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LocalFile {
    /// The file the record-set belongs to.
    #[default]
    Owner,
    /// Another visited file, resolved through the record-set's lid table.
    Other(u32),
}

/// Resolves [`LocalFile`] ids of one Delta side to global [`FileId`]s.
#[derive(Debug, Clone)]
pub struct FileRemap {
    owner: FileId,
    others: HashMap<u32, FileId>,
}

impl FileRemap {
    /// Create a remap for the record-set owned by `owner`.
    pub fn new(owner: FileId, others: HashMap<u32, FileId>) -> Self {
        FileRemap { owner, others }
    }

    /// Resolve one local id.
    pub fn resolve(&self, local: LocalFile) -> Option<FileId> {
        match local {
            LocalFile::Owner => Some(self.owner),
            LocalFile::Other(lid) => self.others.get(&lid).copied(),
        }
    }

    /// The owning file.
    pub fn owner(&self) -> FileId {
        self.owner
    }
}

// ============================================================================
// Occurrences
// ============================================================================

/// One occurrence of a symbol: where and how it appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Use<F = FileId> {
    pub range: Range,
    pub role: Role,
    pub file_id: F,
}

impl<F> Use<F> {
    /// Create a new occurrence.
    pub fn new(range: Range, role: Role, file_id: F) -> Self {
        Use {
            range,
            role,
            file_id,
        }
    }

    /// Same occurrence, addressed through a different file id.
    pub fn with_file<G>(&self, file_id: G) -> Use<G> {
        Use {
            range: self.range,
            role: self.role,
            file_id,
        }
    }
}

impl Use<LocalFile> {
    /// Move this occurrence into the global file id space.
    pub fn resolve(&self, remap: &FileRemap) -> Option<Use<FileId>> {
        Some(self.with_file(remap.resolve(self.file_id)?))
    }
}

/// An occurrence plus the extent of the enclosing declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeclRef<F = FileId> {
    pub range: Range,
    pub role: Role,
    pub file_id: F,
    /// Full extent of the declaration (e.g. the whole function body).
    pub extent: Range,
}

impl<F: Copy> DeclRef<F> {
    /// Create a new declaration reference.
    pub fn new(range: Range, role: Role, file_id: F, extent: Range) -> Self {
        DeclRef {
            range,
            role,
            file_id,
            extent,
        }
    }

    /// The plain occurrence, without its extent.
    pub fn as_use(&self) -> Use<F> {
        Use::new(self.range, self.role, self.file_id)
    }

    /// Same declaration, addressed through a different file id.
    pub fn with_file<G>(&self, file_id: G) -> DeclRef<G> {
        DeclRef {
            range: self.range,
            role: self.role,
            file_id,
            extent: self.extent,
        }
    }
}

impl DeclRef<LocalFile> {
    /// Move this declaration into the global file id space.
    pub fn resolve(&self, remap: &FileRemap) -> Option<DeclRef<FileId>> {
        Some(self.with_file(remap.resolve(self.file_id)?))
    }
}

/// An occurrence inside a definition body that points at another entity
/// (e.g. a callee). Always in the definition's own file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolRef {
    pub range: Range,
    pub key: SymbolKey,
    pub kind: EntityKind,
    pub role: Role,
}

/// Key of the per-file occurrence refcount map.
///
/// `extent` is `Some` for declarations and spellings, `None` for plain uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExtentRef {
    pub range: Range,
    pub key: SymbolKey,
    pub kind: EntityKind,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<Range>,
}

impl ExtentRef {
    /// Refcount key for a plain use.
    pub fn from_use(key: SymbolKey, kind: EntityKind, use_: &Use) -> Self {
        ExtentRef {
            range: use_.range,
            key,
            kind,
            role: use_.role,
            extent: None,
        }
    }

    /// Refcount key for a declaration or spelling.
    pub fn from_decl(key: SymbolKey, kind: EntityKind, decl: &DeclRef) -> Self {
        ExtentRef {
            range: decl.range,
            key,
            kind,
            role: decl.role,
            extent: Some(decl.extent),
        }
    }

    /// Whether this entry is a declaration (carries an extent).
    pub fn is_declaration(&self) -> bool {
        self.extent.is_some()
    }

    /// Whether `pos` falls inside the occurrence range.
    pub fn covers(&self, pos: Position) -> bool {
        self.range.contains_position(pos)
    }
}

// ============================================================================
// Tests
// ============================================================================
