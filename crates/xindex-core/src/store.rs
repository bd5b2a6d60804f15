//! The global symbol store and Delta application.
//!
//! [`GlobalStore`] holds:
//! - a dense file table (global [`FileId`] <-> path)
//! - per entity kind, a dense entity array plus a [`SymbolKey`] index
//!
//! Every fact several units may contribute is refcounted: each file's
//! occurrence map ([`QueryFile::symbol_refs`]) and every entity relation list.
//! An entry disappears only when its count reaches zero, so overlapping
//! contributions from different units never clobber each other.
//!
//! # Applying Deltas
//!
//! [`GlobalStore::apply`] validates the whole Delta first and rejects it
//! before touching any entity. Then, per kind:
//! 1. definitions the updating file withdrew are removed (spelling refcount
//!    released with them)
//! 2. new definitions replace that file's previous one, else are appended
//! 3. relation updates decrement removed entries and increment added ones
//!
//! A Delta must be applied exactly once; applying it twice double counts.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use thiserror::Error;
use tracing::{debug, warn};

use crate::delta::{Delta, KindDelta, Update};
use crate::index::{Definition, Detail, FileDef, FuncDetail, TypeDetail, VarDetail};
use crate::symbol::{
    DeclRef, EntityKind, ExtentRef, FileId, FileRemap, LocalFile, Role, SymbolKey, Use,
};

// ============================================================================
// Errors
// ============================================================================

/// Errors from [`GlobalStore::apply`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The Delta names no file.
    #[error("delta has no path")]
    EmptyPath,

    /// An occurrence refers to a local file id its lid table does not define.
    #[error("delta for {path} references unknown local file id {lid}")]
    UnresolvedLocalId { path: String, lid: u32 },
}

// ============================================================================
// Refcounted Sets
// ============================================================================

/// Multiset with a count per entry; zero-count entries are never stored.
#[derive(Debug, Clone)]
pub struct RefCounts<T: Eq + Hash> {
    counts: HashMap<T, u32>,
}

impl<T: Eq + Hash> Default for RefCounts<T> {
    fn default() -> Self {
        RefCounts {
            counts: HashMap::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> RefCounts<T> {
    /// Increment the count of `item`.
    pub fn add(&mut self, item: T) {
        *self.counts.entry(item).or_insert(0) += 1;
    }

    /// Decrement the count of `item`, dropping it at zero.
    ///
    /// Returns `false` if the item was not present; the count stays clamped
    /// at zero.
    pub fn remove(&mut self, item: &T) -> bool {
        match self.counts.get_mut(item) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.counts.remove(item);
                true
            }
            None => false,
        }
    }

    /// Current count of `item` (0 when absent).
    pub fn count(&self, item: &T) -> u32 {
        self.counts.get(item).copied().unwrap_or(0)
    }

    /// Whether `item` has a positive count.
    pub fn contains(&self, item: &T) -> bool {
        self.counts.contains_key(item)
    }

    /// Distinct entries, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &T> {
        self.counts.keys()
    }

    /// Entries with their counts, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&T, u32)> {
        self.counts.iter().map(|(k, c)| (k, *c))
    }

    /// Number of distinct entries.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

// ============================================================================
// Store Records
// ============================================================================

/// One file's entry in the store.
#[derive(Debug, Clone)]
pub struct QueryFile {
    pub id: FileId,
    pub path: String,
    /// Present iff the file itself has been indexed.
    pub def: Option<FileDef>,
    /// Occurrence refcount map for this file.
    pub symbol_refs: RefCounts<ExtentRef>,
}

/// One file's definition of an entity, in global ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDefinition<D> {
    pub file_id: FileId,
    pub def: Definition<D>,
}

/// An entity as merged from every contributing file.
#[derive(Debug, Clone)]
pub struct QueryEntity<D> {
    pub key: SymbolKey,
    /// At most one definition per file.
    pub defs: Vec<FileDefinition<D>>,
    pub declarations: RefCounts<DeclRef>,
    pub uses: RefCounts<Use>,
    pub derived: RefCounts<SymbolKey>,
    pub instances: RefCounts<SymbolKey>,
}

impl<D> QueryEntity<D> {
    fn new(key: SymbolKey) -> Self {
        QueryEntity {
            key,
            defs: Vec::new(),
            declarations: RefCounts::default(),
            uses: RefCounts::default(),
            derived: RefCounts::default(),
            instances: RefCounts::default(),
        }
    }

    /// First definition, if any file defines this entity.
    pub fn any_def(&self) -> Option<&Definition<D>> {
        self.defs.first().map(|d| &d.def)
    }

    /// Display name from any definition.
    pub fn name(&self) -> Option<&str> {
        self.any_def().map(|d| d.name.as_str())
    }

    /// Whether nothing references this entity any more.
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
            && self.declarations.is_empty()
            && self.uses.is_empty()
            && self.derived.is_empty()
            && self.instances.is_empty()
    }
}

/// Dense entity array plus key index for one kind.
#[derive(Debug, Clone)]
pub struct EntityTable<D> {
    entities: Vec<QueryEntity<D>>,
    by_key: HashMap<SymbolKey, usize>,
}

impl<D> Default for EntityTable<D> {
    fn default() -> Self {
        EntityTable {
            entities: Vec::new(),
            by_key: HashMap::new(),
        }
    }
}

impl<D> EntityTable<D> {
    /// Look up an entity.
    pub fn get(&self, key: SymbolKey) -> Option<&QueryEntity<D>> {
        self.by_key.get(&key).map(|&i| &self.entities[i])
    }

    fn get_mut(&mut self, key: SymbolKey) -> Option<&mut QueryEntity<D>> {
        self.by_key.get(&key).map(|&i| &mut self.entities[i])
    }

    fn get_or_insert(&mut self, key: SymbolKey) -> &mut QueryEntity<D> {
        let idx = match self.by_key.get(&key) {
            Some(&i) => i,
            None => {
                let i = self.entities.len();
                self.entities.push(QueryEntity::new(key));
                self.by_key.insert(key, i);
                i
            }
        };
        &mut self.entities[idx]
    }

    /// Grow capacity geometrically when `hint` more entities may arrive.
    fn reserve(&mut self, hint: usize) {
        let needed = self.entities.len() + hint;
        if needed > self.entities.capacity() {
            let target = needed + needed * 3 / 10;
            self.entities.reserve(target - self.entities.len());
            self.by_key.reserve(target.saturating_sub(self.by_key.len()));
        }
    }

    /// Number of entity slots, including empty ones.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &QueryEntity<D>> {
        self.entities.iter()
    }

    /// Drop entities nothing references; returns how many were dropped.
    fn compact(&mut self) -> usize {
        let before = self.entities.len();
        self.entities.retain(|e| !e.is_empty());
        self.by_key = self
            .entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.key, i))
            .collect();
        before - self.entities.len()
    }
}

// ============================================================================
// Apply Statistics
// ============================================================================

/// Counters for one [`GlobalStore::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub files_allocated: usize,
    pub defs_installed: usize,
    pub defs_removed: usize,
    pub refs_added: usize,
    pub refs_removed: usize,
    /// Decrements of entries that were not present.
    pub clamped: usize,
}

// ============================================================================
// GlobalStore
// ============================================================================

/// The merged, queryable index.
#[derive(Debug, Clone, Default)]
pub struct GlobalStore {
    pub(crate) files: Vec<QueryFile>,
    pub(crate) file_by_path: HashMap<String, FileId>,
    pub(crate) funcs: EntityTable<FuncDetail>,
    pub(crate) types: EntityTable<TypeDetail>,
    pub(crate) vars: EntityTable<VarDetail>,
}

impl GlobalStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one Delta.
    ///
    /// The Delta is validated in full before any entity changes; an invalid
    /// Delta leaves the store untouched.
    pub fn apply(&mut self, delta: Delta) -> Result<ApplyStats, StoreError> {
        validate(&delta)?;

        let mut stats = ApplyStats::default();
        let owner = self.intern_file(&delta.path, &mut stats);
        let prev = self.remap(owner, &delta.prev_lid2path, &mut stats);
        let cur = self.remap(owner, &delta.lid2path, &mut stats);

        let funcs = resolve_kind(&delta.path, delta.funcs, &prev, &cur)?;
        let types = resolve_kind(&delta.path, delta.types, &prev, &cur)?;
        let vars = resolve_kind(&delta.path, delta.vars, &prev, &cur)?;

        if delta.file_removed {
            self.files[owner.index()].def = None;
        } else if let Some(def) = delta.file_def {
            self.files[owner.index()].def = Some(def);
        }

        apply_kind(&mut self.files, &mut self.funcs, funcs, owner, &mut stats);
        apply_kind(&mut self.files, &mut self.types, types, owner, &mut stats);
        apply_kind(&mut self.files, &mut self.vars, vars, owner, &mut stats);

        debug!(
            path = %delta.path,
            defs_installed = stats.defs_installed,
            defs_removed = stats.defs_removed,
            refs_added = stats.refs_added,
            refs_removed = stats.refs_removed,
            "applied delta"
        );
        if stats.clamped > 0 {
            warn!(path = %delta.path, clamped = stats.clamped, "refcount decrements clamped at zero");
        }
        Ok(stats)
    }

    /// Physically drop entities nothing references any more.
    pub fn prune(&mut self) -> usize {
        self.funcs.compact() + self.types.compact() + self.vars.compact()
    }

    /// Number of files the store knows (indexed or only referenced).
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// All file records, by id.
    pub fn files(&self) -> impl Iterator<Item = &QueryFile> {
        self.files.iter()
    }

    /// Entity table for kind `D`.
    pub fn entities<D: Detail>(&self) -> &EntityTable<D> {
        D::table(self)
    }

    fn intern_file(&mut self, path: &str, stats: &mut ApplyStats) -> FileId {
        if let Some(id) = self.file_by_path.get(path) {
            return *id;
        }
        let id = FileId::new(self.files.len() as u32);
        self.files.push(QueryFile {
            id,
            path: path.to_string(),
            def: None,
            symbol_refs: RefCounts::default(),
        });
        self.file_by_path.insert(path.to_string(), id);
        stats.files_allocated += 1;
        id
    }

    fn remap(
        &mut self,
        owner: FileId,
        table: &BTreeMap<u32, String>,
        stats: &mut ApplyStats,
    ) -> FileRemap {
        let others = table
            .iter()
            .map(|(lid, path)| (*lid, self.intern_file(path, stats)))
            .collect();
        FileRemap::new(owner, others)
    }
}

// ============================================================================
// Validation & Resolution
// ============================================================================

fn validate(delta: &Delta) -> Result<(), StoreError> {
    if delta.path.is_empty() {
        return Err(StoreError::EmptyPath);
    }
    check_kind(delta, &delta.funcs)?;
    check_kind(delta, &delta.types)?;
    check_kind(delta, &delta.vars)?;
    Ok(())
}

fn check_kind<D>(delta: &Delta, part: &KindDelta<D>) -> Result<(), StoreError> {
    check_lids(&delta.path, part.removed_files(), &delta.prev_lid2path)?;
    check_lids(&delta.path, part.added_files(), &delta.lid2path)
}

fn check_lids(
    path: &str,
    files: impl Iterator<Item = LocalFile>,
    table: &BTreeMap<u32, String>,
) -> Result<(), StoreError> {
    for file in files {
        if let LocalFile::Other(lid) = file {
            if !table.contains_key(&lid) {
                return Err(StoreError::UnresolvedLocalId {
                    path: path.to_string(),
                    lid,
                });
            }
        }
    }
    Ok(())
}

/// A kind's Delta with every local id moved to global ids.
struct ResolvedKind<D> {
    hint: usize,
    removed: Vec<SymbolKey>,
    def_updates: Vec<(SymbolKey, Definition<D>)>,
    declarations: Vec<(SymbolKey, Update<DeclRef>)>,
    uses: Vec<(SymbolKey, Update<Use>)>,
    derived: BTreeMap<SymbolKey, Update<SymbolKey>>,
    instances: BTreeMap<SymbolKey, Update<SymbolKey>>,
}

fn resolve_kind<D: Detail>(
    path: &str,
    part: KindDelta<D>,
    prev: &FileRemap,
    cur: &FileRemap,
) -> Result<ResolvedKind<D>, StoreError> {
    let unresolved = |f: LocalFile| StoreError::UnresolvedLocalId {
        path: path.to_string(),
        lid: match f {
            LocalFile::Owner => 0,
            LocalFile::Other(lid) => lid,
        },
    };

    let mut def_updates = Vec::with_capacity(part.def_updates.len());
    for (key, def) in part.def_updates {
        let resolved = def
            .resolve(cur)
            .ok_or_else(|| unresolved(def.spell.map_or(LocalFile::Owner, |s| s.file_id)))?;
        def_updates.push((key, resolved));
    }

    let mut declarations = Vec::with_capacity(part.declarations.len());
    for (key, update) in part.declarations {
        let removed = update
            .removed
            .iter()
            .map(|d| d.resolve(prev).ok_or_else(|| unresolved(d.file_id)))
            .collect::<Result<Vec<_>, _>>()?;
        let added = update
            .added
            .iter()
            .map(|d| d.resolve(cur).ok_or_else(|| unresolved(d.file_id)))
            .collect::<Result<Vec<_>, _>>()?;
        declarations.push((key, Update { removed, added }));
    }

    let widen = D::KIND == EntityKind::Function;
    let mut uses = Vec::with_capacity(part.uses.len());
    for (key, update) in part.uses {
        let removed = update
            .removed
            .iter()
            .map(|u| u.resolve(prev).ok_or_else(|| unresolved(u.file_id)))
            .map(|r| r.map(|u| if widen { widen_implicit(u) } else { u }))
            .collect::<Result<Vec<_>, _>>()?;
        let added = update
            .added
            .iter()
            .map(|u| u.resolve(cur).ok_or_else(|| unresolved(u.file_id)))
            .map(|r| r.map(|u| if widen { widen_implicit(u) } else { u }))
            .collect::<Result<Vec<_>, _>>()?;
        uses.push((key, Update { removed, added }));
    }

    Ok(ResolvedKind {
        hint: part.hint,
        removed: part.removed,
        def_updates,
        declarations,
        uses,
        derived: part.derived,
        instances: part.instances,
    })
}

/// Implicit call ranges cover one extra column on each side.
fn widen_implicit(mut u: Use) -> Use {
    if u.role.contains(Role::IMPLICIT) {
        if u.range.start.column > 0 {
            u.range.start.column -= 1;
        }
        u.range.end.column = u.range.end.column.saturating_add(1);
    }
    u
}

// ============================================================================
// Mutation
// ============================================================================

fn apply_kind<D: Detail>(
    files: &mut [QueryFile],
    table: &mut EntityTable<D>,
    part: ResolvedKind<D>,
    owner: FileId,
    stats: &mut ApplyStats,
) {
    table.reserve(part.hint);

    for key in part.removed {
        let Some(entity) = table.get_mut(key) else {
            stats.clamped += 1;
            continue;
        };
        match entity.defs.iter().position(|d| d.file_id == owner) {
            Some(pos) => {
                let old = entity.defs.remove(pos);
                release_spell(files, key, D::KIND, &old.def, stats);
                stats.defs_removed += 1;
            }
            None => stats.clamped += 1,
        }
    }

    for (key, def) in part.def_updates {
        let entity = table.get_or_insert(key);
        if let Some(spell) = &def.spell {
            add_ref(files, spell.file_id, ExtentRef::from_decl(key, D::KIND, spell), stats);
        }
        match entity.defs.iter_mut().find(|d| d.file_id == owner) {
            Some(slot) => {
                let old = std::mem::replace(&mut slot.def, def);
                release_spell(files, key, D::KIND, &old, stats);
            }
            None => entity.defs.push(FileDefinition {
                file_id: owner,
                def,
            }),
        }
        stats.defs_installed += 1;
    }

    for (key, update) in part.declarations {
        for decl in &update.removed {
            remove_ref(files, decl.file_id, ExtentRef::from_decl(key, D::KIND, decl), stats);
            if !table.get_mut(key).is_some_and(|e| e.declarations.remove(decl)) {
                stats.clamped += 1;
            }
        }
        for decl in update.added {
            add_ref(files, decl.file_id, ExtentRef::from_decl(key, D::KIND, &decl), stats);
            table.get_or_insert(key).declarations.add(decl);
        }
    }

    for (key, update) in part.uses {
        for use_ in &update.removed {
            remove_ref(files, use_.file_id, ExtentRef::from_use(key, D::KIND, use_), stats);
            if !table.get_mut(key).is_some_and(|e| e.uses.remove(use_)) {
                stats.clamped += 1;
            }
        }
        for use_ in update.added {
            add_ref(files, use_.file_id, ExtentRef::from_use(key, D::KIND, &use_), stats);
            table.get_or_insert(key).uses.add(use_);
        }
    }

    apply_key_updates(table, part.derived, |e| &mut e.derived, stats);
    apply_key_updates(table, part.instances, |e| &mut e.instances, stats);
}

fn apply_key_updates<D>(
    table: &mut EntityTable<D>,
    updates: BTreeMap<SymbolKey, Update<SymbolKey>>,
    field: impl Fn(&mut QueryEntity<D>) -> &mut RefCounts<SymbolKey>,
    stats: &mut ApplyStats,
) {
    for (key, update) in updates {
        for item in &update.removed {
            if !table.get_mut(key).is_some_and(|e| field(e).remove(item)) {
                stats.clamped += 1;
            }
        }
        for item in update.added {
            field(table.get_or_insert(key)).add(item);
        }
    }
}

fn release_spell<D>(
    files: &mut [QueryFile],
    key: SymbolKey,
    kind: EntityKind,
    def: &Definition<D>,
    stats: &mut ApplyStats,
) {
    if let Some(spell) = &def.spell {
        remove_ref(files, spell.file_id, ExtentRef::from_decl(key, kind, spell), stats);
    }
}

fn add_ref(files: &mut [QueryFile], file_id: FileId, r: ExtentRef, stats: &mut ApplyStats) {
    match files.get_mut(file_id.index()) {
        Some(file) => {
            file.symbol_refs.add(r);
            stats.refs_added += 1;
        }
        None => warn!(key = %r.key, file = %file_id, "occurrence in unknown file"),
    }
}

fn remove_ref(files: &mut [QueryFile], file_id: FileId, r: ExtentRef, stats: &mut ApplyStats) {
    if files
        .get_mut(file_id.index())
        .is_some_and(|f| f.symbol_refs.remove(&r))
    {
        stats.refs_removed += 1;
    } else {
        stats.clamped += 1;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{compute_delta, compute_removal};
    use crate::index::PerUnitIndex;
    use crate::position::Range;

    fn r(line: u16, col: i16) -> Range {
        Range::from_coords(line, col, line, col + 3)
    }

    /// `path` defines function 1 at line 0 and calls it from `calls`.
    fn unit(path: &str, name: &str, calls: &[u16]) -> PerUnitIndex {
        let mut index = PerUnitIndex::empty(path);
        let f = index.entity_mut::<FuncDetail>(SymbolKey(1));
        f.def.name = name.to_string();
        f.def.spell = Some(DeclRef::new(
            r(0, 0),
            Role::DEFINITION,
            LocalFile::Owner,
            Range::from_coords(0, 0, 2, 1),
        ));
        f.uses = calls
            .iter()
            .map(|l| Use::new(r(*l, 4), Role::CALL, LocalFile::Owner))
            .collect();
        index
    }

    mod refcounts {
        use super::*;

        #[test]
        fn counts_and_clamps() {
            let mut rc = RefCounts::default();
            rc.add("a");
            rc.add("a");
            assert_eq!(rc.count(&"a"), 2);
            assert!(rc.remove(&"a"));
            assert!(rc.remove(&"a"));
            assert!(!rc.contains(&"a"));
            assert!(!rc.remove(&"a"));
            assert_eq!(rc.count(&"a"), 0);
            assert!(rc.is_empty());
        }
    }

    mod apply {
        use super::*;

        #[test]
        fn installs_definition_and_refs() {
            let mut store = GlobalStore::new();
            let stats = store.apply(compute_delta(None, &unit("a.cc", "f", &[5]))).unwrap();
            assert_eq!(stats.files_allocated, 1);
            assert_eq!(stats.defs_installed, 1);
            assert_eq!(stats.clamped, 0);

            let f = store.funcs.get(SymbolKey(1)).unwrap();
            assert_eq!(f.name(), Some("f"));
            assert_eq!(f.uses.len(), 1);
            // spell + one call
            assert_eq!(store.files[0].symbol_refs.len(), 2);
            assert!(store.files[0].def.is_some());
        }

        #[test]
        fn replacing_definition_moves_spell_refcount() {
            let mut store = GlobalStore::new();
            let v1 = unit("a.cc", "f", &[]);
            store.apply(compute_delta(None, &v1)).unwrap();

            let mut v2 = v1.clone();
            let f = v2.entity_mut::<FuncDetail>(SymbolKey(1));
            f.def.name = "g".to_string();
            if let Some(spell) = f.def.spell.as_mut() {
                spell.range = r(1, 0);
            }
            store.apply(compute_delta(Some(&v1), &v2)).unwrap();

            let refs = &store.files[0].symbol_refs;
            assert_eq!(refs.len(), 1);
            assert!(refs.keys().all(|e| e.range == r(1, 0)));
            let f = store.funcs.get(SymbolKey(1)).unwrap();
            assert_eq!(f.defs.len(), 1);
            assert_eq!(f.name(), Some("g"));
        }

        #[test]
        fn overlapping_units_do_not_clobber() {
            // Two units both contribute the same header occurrence.
            let header_use = |index: &mut PerUnitIndex| {
                let h = index.lid_for("h.h");
                index
                    .entity_mut::<VarDetail>(SymbolKey(9))
                    .uses
                    .push(Use::new(r(3, 0), Role::READ, h));
            };
            let mut a = PerUnitIndex::empty("a.cc");
            header_use(&mut a);
            let mut b = PerUnitIndex::empty("b.cc");
            header_use(&mut b);

            let mut store = GlobalStore::new();
            store.apply(compute_delta(None, &a)).unwrap();
            store.apply(compute_delta(None, &b)).unwrap();
            let h = store.file_by_path["h.h"];
            assert_eq!(store.files[h.index()].symbol_refs.iter().next().map(|(_, c)| c), Some(2));

            store.apply(compute_removal(Some(&a), "a.cc")).unwrap();
            assert_eq!(store.files[h.index()].symbol_refs.len(), 1);
            assert_eq!(store.vars.get(SymbolKey(9)).unwrap().uses.len(), 1);
        }

        #[test]
        fn invalid_delta_is_rejected_untouched() {
            let mut index = unit("a.cc", "f", &[]);
            index
                .entity_mut::<FuncDetail>(SymbolKey(1))
                .uses
                .push(Use::new(r(4, 0), Role::CALL, LocalFile::Other(42)));

            let mut store = GlobalStore::new();
            let err = store.apply(compute_delta(None, &index)).unwrap_err();
            assert!(matches!(err, StoreError::UnresolvedLocalId { lid: 42, .. }));
            assert_eq!(store.file_count(), 0);
            assert!(store.funcs.is_empty());
        }

        #[test]
        fn rejected_delta_leaves_populated_store_as_it_was() {
            let good = unit("a.cc", "f", &[4]);
            let mut store = GlobalStore::new();
            store.apply(compute_delta(None, &good)).unwrap();
            let before = store.dump();

            // Lid 0 resolves, lid 7 does not; nothing may be interned or counted.
            let mut bad = good.clone();
            let header = bad.lid_for("h.h");
            let f = bad.entity_mut::<FuncDetail>(SymbolKey(1));
            f.def.name = "g".to_string();
            f.uses.push(Use::new(r(8, 0), Role::CALL, header));
            f.uses.push(Use::new(r(9, 0), Role::CALL, LocalFile::Other(7)));
            let err = store.apply(compute_delta(Some(&good), &bad)).unwrap_err();
            assert!(matches!(err, StoreError::UnresolvedLocalId { lid: 7, .. }));

            assert_eq!(store.dump(), before);
            assert_eq!(store.file_count(), 1);
            assert_eq!(store.funcs.get(SymbolKey(1)).unwrap().name(), Some("f"));
        }

        #[test]
        fn repeated_removal_clamps_and_prunes() {
            let index = unit("a.cc", "f", &[4, 6]);
            let mut store = GlobalStore::new();
            store.apply(compute_delta(None, &index)).unwrap();
            assert_eq!(store.apply(compute_removal(Some(&index), "a.cc")).unwrap().clamped, 0);

            let stats = store.apply(compute_removal(Some(&index), "a.cc")).unwrap();
            assert!(stats.clamped > 0);
            assert!(store.files[0].symbol_refs.is_empty());
            assert!(store.funcs.get(SymbolKey(1)).unwrap().uses.is_empty());
            assert_eq!(store.prune(), 1);
            assert_eq!(store.prune(), 0);
        }

        #[test]
        fn empty_path_is_rejected() {
            let mut store = GlobalStore::new();
            assert_eq!(store.apply(Delta::default()), Err(StoreError::EmptyPath));
        }

        #[test]
        fn implicit_calls_are_widened() {
            let mut index = PerUnitIndex::empty("a.cc");
            index
                .entity_mut::<FuncDetail>(SymbolKey(3))
                .uses
                .push(Use::new(r(2, 5), Role::CALL | Role::IMPLICIT, LocalFile::Owner));

            let mut store = GlobalStore::new();
            store.apply(compute_delta(None, &index)).unwrap();
            let uses: Vec<_> = store.funcs.get(SymbolKey(3)).unwrap().uses.keys().copied().collect();
            assert_eq!(uses[0].range, Range::from_coords(2, 4, 2, 9));

            store.apply(compute_removal(Some(&index), "a.cc")).unwrap();
            assert!(store.funcs.get(SymbolKey(3)).unwrap().is_empty());
            assert!(store.files[0].symbol_refs.is_empty());
        }

        #[test]
        fn removal_clears_file_definition_and_prune_compacts() {
            let index = unit("a.cc", "f", &[4, 6]);
            let mut store = GlobalStore::new();
            store.apply(compute_delta(None, &index)).unwrap();
            let stats = store.apply(compute_removal(Some(&index), "a.cc")).unwrap();
            assert_eq!(stats.clamped, 0);
            assert!(store.files[0].def.is_none());
            assert!(store.files[0].symbol_refs.is_empty());
            assert_eq!(store.funcs.len(), 1);
            assert_eq!(store.prune(), 1);
            assert!(store.funcs.get(SymbolKey(1)).is_none());
        }

        #[test]
        fn missing_entries_are_clamped() {
            let index = unit("a.cc", "f", &[4]);
            let mut store = GlobalStore::new();
            let stats = store.apply(compute_removal(Some(&index), "a.cc")).unwrap();
            assert!(stats.clamped > 0);
            assert!(store.files[0].symbol_refs.is_empty());
        }
    }
}
