//! Read-only queries against a [`GlobalStore`].
//!
//! All queries are total: an unknown key, file, or an entity without a
//! definition yields an empty result, never an error. Results come back in
//! a deterministic order.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::index::{Definition, Detail, FileDef, FuncDetail, TypeDetail, VarDetail};
use crate::position::{Position, Range};
use crate::store::{GlobalStore, QueryEntity, QueryFile};
use crate::symbol::{DeclRef, EntityKind, ExtentRef, FileId, Role, SymbolKey, Use};

// ============================================================================
// Result Types
// ============================================================================

/// An occurrence with its file resolved to a path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Location {
    pub path: String,
    pub range: Range,
    pub role: Role,
}

/// Path-resolved, order-independent snapshot of the store.
///
/// Two stores holding the same facts dump equal, whatever order their
/// Deltas arrived in and whatever file ids they allocated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreDump {
    pub files: Vec<FileDump>,
    pub funcs: Vec<EntityDump>,
    pub types: Vec<EntityDump>,
    pub vars: Vec<EntityDump>,
}

/// One file in a [`StoreDump`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDump {
    pub path: String,
    pub def: Option<FileDef>,
    pub symbol_refs: Vec<(ExtentRef, u32)>,
}

/// One entity in a [`StoreDump`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityDump {
    pub key: SymbolKey,
    pub defs: Vec<DefDump>,
    pub declarations: Vec<(Location, Range, u32)>,
    pub uses: Vec<(Location, u32)>,
    pub derived: Vec<(SymbolKey, u32)>,
    pub instances: Vec<(SymbolKey, u32)>,
}

/// One file's definition in a [`StoreDump`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefDump {
    pub path: String,
    pub name: String,
    pub comments: Option<String>,
    pub spell: Option<(Location, Range)>,
    pub detail: serde_json::Value,
}

// ============================================================================
// Queries
// ============================================================================

impl GlobalStore {
    /// Global id of `path`, if the store has seen it.
    pub fn file_id(&self, path: &str) -> Option<FileId> {
        self.file_by_path.get(path).copied()
    }

    /// File record by id.
    pub fn file(&self, id: FileId) -> Option<&QueryFile> {
        self.files.get(id.index())
    }

    /// File record by path.
    pub fn file_by_path(&self, path: &str) -> Option<&QueryFile> {
        self.file_id(path).and_then(|id| self.file(id))
    }

    /// Whether `path` itself has been indexed (not just referenced).
    pub fn is_indexed(&self, path: &str) -> bool {
        self.file_by_path(path).is_some_and(|f| f.def.is_some())
    }

    pub fn func(&self, key: SymbolKey) -> Option<&QueryEntity<FuncDetail>> {
        self.funcs.get(key)
    }

    pub fn type_(&self, key: SymbolKey) -> Option<&QueryEntity<TypeDetail>> {
        self.types.get(key)
    }

    pub fn var(&self, key: SymbolKey) -> Option<&QueryEntity<VarDetail>> {
        self.vars.get(key)
    }

    /// Display name of an entity, from any file that defines it.
    pub fn name(&self, kind: EntityKind, key: SymbolKey) -> Option<&str> {
        match kind {
            EntityKind::Function => self.func(key).and_then(|e| e.name()),
            EntityKind::Type => self.type_(key).and_then(|e| e.name()),
            EntityKind::Variable => self.var(key).and_then(|e| e.name()),
            EntityKind::File => None,
        }
    }

    /// Occurrences in `file` covering `pos`, narrowest range first.
    pub fn symbols_at(&self, file: FileId, pos: Position) -> Vec<ExtentRef> {
        let Some(file) = self.file(file) else {
            return Vec::new();
        };
        let mut hits: Vec<ExtentRef> = file
            .symbol_refs
            .keys()
            .filter(|r| r.covers(pos))
            .copied()
            .collect();
        hits.sort_by(|a, b| {
            a.range
                .extent_key()
                .cmp(&b.range.extent_key())
                .then_with(|| a.cmp(b))
        });
        hits
    }

    /// Declarations in `file` whose extent encloses `pos`, innermost first.
    pub fn enclosing_declarations(&self, file: FileId, pos: Position) -> Vec<ExtentRef> {
        let Some(file) = self.file(file) else {
            return Vec::new();
        };
        let mut hits: Vec<(Range, ExtentRef)> = file
            .symbol_refs
            .keys()
            .filter_map(|r| r.extent.filter(|e| e.contains_position(pos)).map(|e| (e, *r)))
            .collect();
        hits.sort_by(|a, b| {
            a.0.extent_key()
                .cmp(&b.0.extent_key())
                .then_with(|| a.1.cmp(&b.1))
        });
        hits.into_iter().map(|(_, r)| r).collect()
    }

    /// Canonical spellings of an entity, one per defining file.
    pub fn definitions(&self, kind: EntityKind, key: SymbolKey) -> Vec<DeclRef> {
        match kind {
            EntityKind::Function => spells(self.func(key)),
            EntityKind::Type => spells(self.type_(key)),
            EntityKind::Variable => spells(self.var(key)),
            EntityKind::File => Vec::new(),
        }
    }

    /// Declarations of an entity.
    pub fn declarations(&self, kind: EntityKind, key: SymbolKey) -> Vec<DeclRef> {
        match kind {
            EntityKind::Function => decls(self.func(key)),
            EntityKind::Type => decls(self.type_(key)),
            EntityKind::Variable => decls(self.var(key)),
            EntityKind::File => Vec::new(),
        }
    }

    /// References to an entity, optionally including its declarations and
    /// definitions.
    pub fn references(&self, kind: EntityKind, key: SymbolKey, include_decls: bool) -> Vec<Use> {
        let mut out = match kind {
            EntityKind::Function => uses(self.func(key)),
            EntityKind::Type => uses(self.type_(key)),
            EntityKind::Variable => uses(self.var(key)),
            EntityKind::File => Vec::new(),
        };
        if include_decls {
            out.extend(self.declarations(kind, key).iter().map(|d| d.as_use()));
            out.extend(self.definitions(kind, key).iter().map(|d| d.as_use()));
        }
        out.sort();
        out.dedup();
        out
    }

    /// Call sites of a function.
    pub fn callers(&self, key: SymbolKey) -> Vec<Use> {
        let mut out: Vec<Use> = uses(self.func(key))
            .into_iter()
            .filter(|u| u.role.contains(Role::CALL))
            .collect();
        out.sort();
        out
    }

    /// Derived types, or functions overriding a function.
    pub fn derived(&self, kind: EntityKind, key: SymbolKey) -> Vec<SymbolKey> {
        let mut out: Vec<SymbolKey> = match kind {
            EntityKind::Function => self.func(key).map(|e| e.derived.keys().copied().collect()),
            EntityKind::Type => self.type_(key).map(|e| e.derived.keys().copied().collect()),
            _ => None,
        }
        .unwrap_or_default();
        out.sort();
        out
    }

    /// Variables whose declared type is `key`.
    pub fn instances(&self, key: SymbolKey) -> Vec<SymbolKey> {
        let mut out: Vec<SymbolKey> = self
            .type_(key)
            .map(|e| e.instances.keys().copied().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Resolve an occurrence's file to a path.
    pub fn location(&self, use_: &Use) -> Option<Location> {
        Some(Location {
            path: self.file(use_.file_id)?.path.clone(),
            range: use_.range,
            role: use_.role,
        })
    }

    /// Resolve many occurrences, dropping any in unknown files.
    pub fn locations(&self, uses: &[Use]) -> Vec<Location> {
        uses.iter().filter_map(|u| self.location(u)).collect()
    }

    /// Canonical snapshot for comparison and display.
    pub fn dump(&self) -> StoreDump {
        let mut files: Vec<FileDump> = self
            .files
            .iter()
            .filter(|f| f.def.is_some() || !f.symbol_refs.is_empty())
            .map(|f| {
                let mut symbol_refs: Vec<(ExtentRef, u32)> =
                    f.symbol_refs.iter().map(|(r, c)| (*r, c)).collect();
                symbol_refs.sort();
                FileDump {
                    path: f.path.clone(),
                    def: f.def.clone(),
                    symbol_refs,
                }
            })
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        StoreDump {
            files,
            funcs: self.dump_kind::<FuncDetail>(),
            types: self.dump_kind::<TypeDetail>(),
            vars: self.dump_kind::<VarDetail>(),
        }
    }

    fn dump_kind<D: Detail>(&self) -> Vec<EntityDump> {
        let mut out: Vec<EntityDump> = D::table(self)
            .iter()
            .filter(|e| !e.is_empty())
            .map(|e| self.dump_entity(e))
            .collect();
        out.sort_by_key(|e| e.key);
        out
    }

    fn dump_entity<D: Detail>(&self, e: &QueryEntity<D>) -> EntityDump {
        let path_of = |id: FileId| {
            self.file(id)
                .map(|f| f.path.clone())
                .unwrap_or_default()
        };
        let decl_loc = |d: &DeclRef| {
            (
                Location {
                    path: path_of(d.file_id),
                    range: d.range,
                    role: d.role,
                },
                d.extent,
            )
        };

        let mut defs: Vec<DefDump> = e
            .defs
            .iter()
            .map(|fd| def_dump(path_of(fd.file_id), &fd.def, decl_loc))
            .collect();
        defs.sort_by(|a, b| a.path.cmp(&b.path));

        let mut declarations: Vec<(Location, Range, u32)> = e
            .declarations
            .iter()
            .map(|(d, c)| {
                let (loc, extent) = decl_loc(d);
                (loc, extent, c)
            })
            .collect();
        declarations.sort();

        let mut uses: Vec<(Location, u32)> = e
            .uses
            .iter()
            .map(|(u, c)| {
                (
                    Location {
                        path: path_of(u.file_id),
                        range: u.range,
                        role: u.role,
                    },
                    c,
                )
            })
            .collect();
        uses.sort();

        EntityDump {
            key: e.key,
            defs,
            declarations,
            uses,
            derived: sorted_counts(e.derived.iter()),
            instances: sorted_counts(e.instances.iter()),
        }
    }
}

fn def_dump<D: Detail>(
    path: String,
    def: &Definition<D>,
    decl_loc: impl Fn(&DeclRef) -> (Location, Range),
) -> DefDump {
    DefDump {
        path,
        name: def.name.clone(),
        comments: def.comments.clone(),
        spell: def.spell.as_ref().map(decl_loc),
        detail: serde_json::to_value(&def.detail).unwrap_or_default(),
    }
}

fn sorted_counts<'a>(it: impl Iterator<Item = (&'a SymbolKey, u32)>) -> Vec<(SymbolKey, u32)> {
    let mut out: Vec<(SymbolKey, u32)> = it.map(|(k, c)| (*k, c)).collect();
    out.sort();
    out
}

fn spells<D>(entity: Option<&QueryEntity<D>>) -> Vec<DeclRef> {
    let mut out: Vec<DeclRef> = entity
        .map(|e| e.defs.iter().filter_map(|d| d.def.spell).collect())
        .unwrap_or_default();
    out.sort();
    out
}

fn decls<D>(entity: Option<&QueryEntity<D>>) -> Vec<DeclRef> {
    let mut out: Vec<DeclRef> = entity
        .map(|e| e.declarations.keys().copied().collect())
        .unwrap_or_default();
    out.sort();
    out
}

fn uses<D>(entity: Option<&QueryEntity<D>>) -> Vec<Use> {
    let mut out: Vec<Use> = entity
        .map(|e| e.uses.keys().copied().collect())
        .unwrap_or_default();
    out.sort();
    out
}

/// Group dumped locations by path.
pub fn group_by_path(locations: &[Location]) -> BTreeMap<&str, Vec<Range>> {
    let mut out: BTreeMap<&str, Vec<Range>> = BTreeMap::new();
    for loc in locations {
        out.entry(loc.path.as_str()).or_default().push(loc.range);
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::compute_delta;
    use crate::index::PerUnitIndex;
    use crate::symbol::LocalFile;

    fn r(line: u16, c0: i16, c1: i16) -> Range {
        Range::from_coords(line, c0, line, c1)
    }

    /// A class with a method, a subclass, an instance, and a call.
    fn sample() -> GlobalStore {
        let mut index = PerUnitIndex::empty("a.cc");
        let base = index.entity_mut::<TypeDetail>(SymbolKey(10));
        base.def.name = "Base".to_string();
        base.def.spell = Some(DeclRef::new(
            r(0, 6, 10),
            Role::DEFINITION,
            LocalFile::Owner,
            Range::from_coords(0, 0, 4, 1),
        ));
        base.derived.push(SymbolKey(11));
        base.instances.push(SymbolKey(20));

        let method = index.entity_mut::<FuncDetail>(SymbolKey(1));
        method.def.name = "Base::run".to_string();
        method.def.spell = Some(DeclRef::new(
            r(1, 7, 10),
            Role::DEFINITION,
            LocalFile::Owner,
            Range::from_coords(1, 2, 3, 3),
        ));
        method.declarations.push(DeclRef::new(
            r(8, 7, 10),
            Role::DECLARATION,
            LocalFile::Owner,
            r(8, 2, 14),
        ));
        method.uses.push(Use::new(r(6, 4, 7), Role::CALL, LocalFile::Owner));
        method.uses.push(Use::new(r(7, 4, 7), Role::REFERENCE, LocalFile::Owner));

        let mut store = GlobalStore::new();
        store.apply(compute_delta(None, &index)).unwrap();
        store
    }

    #[test]
    fn basic_lookups() {
        let store = sample();
        assert!(store.is_indexed("a.cc"));
        assert!(!store.is_indexed("b.cc"));
        assert_eq!(store.name(EntityKind::Type, SymbolKey(10)), Some("Base"));
        assert_eq!(store.name(EntityKind::Function, SymbolKey(99)), None);
        assert_eq!(store.derived(EntityKind::Type, SymbolKey(10)), vec![SymbolKey(11)]);
        assert_eq!(store.instances(SymbolKey(10)), vec![SymbolKey(20)]);
    }

    #[test]
    fn symbols_at_orders_narrowest_first() {
        let store = sample();
        let file = store.file_id("a.cc").unwrap();
        let hits = store.symbols_at(file, Position::new(1, 8));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, SymbolKey(1));

        let enclosing = store.enclosing_declarations(file, Position::new(2, 0));
        let keys: Vec<_> = enclosing.iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![SymbolKey(1), SymbolKey(10)]);
    }

    #[test]
    fn references_and_callers() {
        let store = sample();
        let refs = store.references(EntityKind::Function, SymbolKey(1), false);
        assert_eq!(refs.len(), 2);
        let with_decls = store.references(EntityKind::Function, SymbolKey(1), true);
        assert_eq!(with_decls.len(), 4);
        let callers = store.callers(SymbolKey(1));
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].range, r(6, 4, 7));

        let locs = store.locations(&with_decls);
        assert!(locs.iter().all(|l| l.path == "a.cc"));
        assert_eq!(group_by_path(&locs)["a.cc"].len(), 4);
    }

    #[test]
    fn unknown_entities_are_empty() {
        let store = sample();
        assert!(store.definitions(EntityKind::Variable, SymbolKey(5)).is_empty());
        assert!(store.references(EntityKind::File, SymbolKey(1), true).is_empty());
        assert!(store.symbols_at(FileId(99), Position::new(0, 0)).is_empty());
    }

    #[test]
    fn dump_ignores_file_id_allocation_order() {
        let mut a = PerUnitIndex::empty("a.cc");
        let h = a.lid_for("h.h");
        a.entity_mut::<VarDetail>(SymbolKey(3))
            .uses
            .push(Use::new(r(1, 0, 1), Role::READ, h));
        let mut b = PerUnitIndex::empty("b.cc");
        b.entity_mut::<VarDetail>(SymbolKey(3))
            .uses
            .push(Use::new(r(2, 0, 1), Role::WRITE, LocalFile::Owner));

        let mut one = GlobalStore::new();
        one.apply(compute_delta(None, &a)).unwrap();
        one.apply(compute_delta(None, &b)).unwrap();
        let mut two = GlobalStore::new();
        two.apply(compute_delta(None, &b)).unwrap();
        two.apply(compute_delta(None, &a)).unwrap();

        assert_ne!(one.file_id("b.cc"), two.file_id("b.cc"));
        assert_eq!(one.dump(), two.dump());
    }
}
