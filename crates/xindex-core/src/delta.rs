//! Structural diff between two snapshots of one file's index.
//!
//! [`compute_delta`] turns `(old, new)` into a [`Delta`]: per entity kind, the
//! definitions to remove or install, and a `(removed, added)` multiset
//! [`Update`] for every relation list. Applying the Delta chain
//! `diff(None, P1), diff(P1, P2), ..` leaves the store with the same content
//! as applying `diff(None, Pn)` alone.
//!
//! Old and new snapshots number their local file ids independently. Before
//! diffing, the old side is rebased onto the new side's numbering so equal
//! occurrences compare equal; `prev_lid2path` carries the rebased table.

use std::collections::{BTreeMap, HashMap};

use crate::index::{
    Definition, Detail, FileDef, FuncDetail, IndexEntity, PerUnitIndex, TypeDetail, VarDetail,
};
use crate::symbol::{DeclRef, LocalFile, SymbolKey, Use};

// ============================================================================
// Update
// ============================================================================

/// Multiset difference of one relation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update<T> {
    pub removed: Vec<T>,
    pub added: Vec<T>,
}

impl<T> Default for Update<T> {
    fn default() -> Self {
        Update {
            removed: Vec::new(),
            added: Vec::new(),
        }
    }
}

impl<T: Ord + Clone> Update<T> {
    /// Multiset symmetric difference: each element of `old` cancels one equal
    /// element of `new`.
    pub fn diff(old: &[T], new: &[T]) -> Self {
        let mut a = old.to_vec();
        let mut b = new.to_vec();
        a.sort();
        b.sort();

        let mut update = Update::default();
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => {
                    update.removed.push(a[i].clone());
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    update.added.push(b[j].clone());
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }
        update.removed.extend_from_slice(&a[i..]);
        update.added.extend_from_slice(&b[j..]);
        update
    }
}

impl<T> Update<T> {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

// ============================================================================
// Delta
// ============================================================================

/// Changes to one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindDelta<D> {
    /// Number of entities the new snapshot holds, used to pre-size tables.
    pub hint: usize,
    /// Entities whose definition from this file goes away.
    pub removed: Vec<SymbolKey>,
    /// Definitions to install for this file, replacing any previous one.
    pub def_updates: Vec<(SymbolKey, Definition<D, LocalFile>)>,
    pub declarations: BTreeMap<SymbolKey, Update<DeclRef<LocalFile>>>,
    pub uses: BTreeMap<SymbolKey, Update<Use<LocalFile>>>,
    pub derived: BTreeMap<SymbolKey, Update<SymbolKey>>,
    pub instances: BTreeMap<SymbolKey, Update<SymbolKey>>,
}

impl<D> Default for KindDelta<D> {
    fn default() -> Self {
        KindDelta {
            hint: 0,
            removed: Vec::new(),
            def_updates: Vec::new(),
            declarations: BTreeMap::new(),
            uses: BTreeMap::new(),
            derived: BTreeMap::new(),
            instances: BTreeMap::new(),
        }
    }
}

impl<D> KindDelta<D> {
    /// Whether this kind has no changes.
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
            && self.def_updates.is_empty()
            && self.declarations.is_empty()
            && self.uses.is_empty()
            && self.derived.is_empty()
            && self.instances.is_empty()
    }

    /// Every local id referenced by removed occurrences.
    pub(crate) fn removed_files(&self) -> impl Iterator<Item = LocalFile> + '_ {
        self.declarations
            .values()
            .flat_map(|u| u.removed.iter().map(|d| d.file_id))
            .chain(
                self.uses
                    .values()
                    .flat_map(|u| u.removed.iter().map(|u| u.file_id)),
            )
    }

    /// Every local id referenced by added occurrences and new definitions.
    pub(crate) fn added_files(&self) -> impl Iterator<Item = LocalFile> + '_ {
        self.def_updates
            .iter()
            .filter_map(|(_, def)| def.spell.map(|s| s.file_id))
            .chain(
                self.declarations
                    .values()
                    .flat_map(|u| u.added.iter().map(|d| d.file_id)),
            )
            .chain(
                self.uses
                    .values()
                    .flat_map(|u| u.added.iter().map(|u| u.file_id)),
            )
    }
}

/// Everything one file's re-index changes in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    /// The file the snapshots belong to.
    pub path: String,
    /// Local id table for removed occurrences.
    pub prev_lid2path: BTreeMap<u32, String>,
    /// Local id table for added occurrences and definitions.
    pub lid2path: BTreeMap<u32, String>,
    /// File definition to install, if any.
    pub file_def: Option<FileDef>,
    /// The file was deleted: its definition is cleared.
    pub file_removed: bool,
    /// Content of the file as indexed.
    pub file_content: Option<String>,
    pub funcs: KindDelta<FuncDetail>,
    pub types: KindDelta<TypeDetail>,
    pub vars: KindDelta<VarDetail>,
}

impl Delta {
    /// Whether no symbol data changes.
    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty() && self.types.is_empty() && self.vars.is_empty()
    }

    /// Size hint for kind `D`.
    pub fn hint<D: Detail>(&self) -> usize {
        D::delta_part(self).hint
    }
}

// ============================================================================
// Computing Deltas
// ============================================================================

/// Diff `old` (or nothing) against `new` for the same logical file.
pub fn compute_delta(old: Option<&PerUnitIndex>, new: &PerUnitIndex) -> Delta {
    let rebase = LidRebase::new(old.map(|o| &o.lid2path), &new.lid2path);
    let mut delta = Delta {
        path: new.path.clone(),
        prev_lid2path: rebase.table.clone(),
        lid2path: new.lid2path.clone(),
        file_def: Some(new.file_def()),
        file_removed: false,
        file_content: Some(new.file_contents.clone()),
        ..Default::default()
    };
    diff_kind::<FuncDetail>(old, new, &rebase, &mut delta);
    diff_kind::<TypeDetail>(old, new, &rebase, &mut delta);
    diff_kind::<VarDetail>(old, new, &rebase, &mut delta);
    delta
}

/// Delta that withdraws everything `old` contributed and clears the file's
/// definition.
pub fn compute_removal(old: Option<&PerUnitIndex>, path: &str) -> Delta {
    let mut delta = compute_delta(old, &PerUnitIndex::empty(path));
    delta.file_def = None;
    delta.file_removed = true;
    delta.file_content = None;
    delta
}

fn diff_kind<D: Detail>(
    old: Option<&PerUnitIndex>,
    new: &PerUnitIndex,
    rebase: &LidRebase,
    delta: &mut Delta,
) {
    let empty = BTreeMap::new();
    let old_map = old.map_or(&empty, |o| D::index_entities(o));
    let new_map = D::index_entities(new);
    let out = D::delta_part_mut(delta);
    out.hint = new_map.len();

    for (key, prev) in old_map {
        let prev = rebase.entity(prev);
        match new_map.get(key) {
            None => {
                if !prev.def.is_trivial() {
                    out.removed.push(*key);
                }
                push_relations(out, *key, &prev, &IndexEntity::new(*key));
            }
            Some(cur) => {
                if !cur.def.is_trivial() {
                    if prev.def != cur.def {
                        out.def_updates.push((*key, cur.def.clone()));
                    }
                } else if !prev.def.is_trivial() {
                    out.removed.push(*key);
                }
                push_relations(out, *key, &prev, cur);
            }
        }
    }

    for (key, cur) in new_map {
        if old_map.contains_key(key) {
            continue;
        }
        if !cur.def.is_trivial() {
            out.def_updates.push((*key, cur.def.clone()));
        }
        push_relations(out, *key, &IndexEntity::new(*key), cur);
    }
}

fn push_relations<D>(
    out: &mut KindDelta<D>,
    key: SymbolKey,
    prev: &IndexEntity<D>,
    cur: &IndexEntity<D>,
) {
    insert_nonempty(
        &mut out.declarations,
        key,
        Update::diff(&prev.declarations, &cur.declarations),
    );
    insert_nonempty(&mut out.uses, key, Update::diff(&prev.uses, &cur.uses));
    insert_nonempty(
        &mut out.derived,
        key,
        Update::diff(&prev.derived, &cur.derived),
    );
    insert_nonempty(
        &mut out.instances,
        key,
        Update::diff(&prev.instances, &cur.instances),
    );
}

fn insert_nonempty<T>(map: &mut BTreeMap<SymbolKey, Update<T>>, key: SymbolKey, update: Update<T>) {
    if !update.is_empty() {
        map.insert(key, update);
    }
}

// ============================================================================
// Local Id Rebasing
// ============================================================================

/// Renumbers the old snapshot's local ids onto the new snapshot's table.
///
/// Paths only the old side knows get fresh ids past the new table. Old ids
/// missing from the old table get fresh ids that are not in any table, so
/// the resulting Delta fails validation instead of aliasing another file.
struct LidRebase {
    map: HashMap<u32, u32>,
    table: BTreeMap<u32, String>,
    next_unknown: u32,
}

impl LidRebase {
    fn new(old: Option<&BTreeMap<u32, String>>, new: &BTreeMap<u32, String>) -> Self {
        let mut table = new.clone();
        let by_path: HashMap<&str, u32> = new.iter().map(|(l, p)| (p.as_str(), *l)).collect();
        let mut next = new.keys().next_back().map_or(0, |l| l + 1);
        let mut map = HashMap::new();

        for (lid, path) in old.into_iter().flatten() {
            let target = match by_path.get(path.as_str()) {
                Some(l) => *l,
                None => {
                    let l = next;
                    next += 1;
                    table.insert(l, path.clone());
                    l
                }
            };
            map.insert(*lid, target);
        }

        LidRebase {
            map,
            table,
            next_unknown: next,
        }
    }

    fn file(&self, f: LocalFile) -> LocalFile {
        match f {
            LocalFile::Owner => LocalFile::Owner,
            LocalFile::Other(lid) => match self.map.get(&lid) {
                Some(l) => LocalFile::Other(*l),
                None => LocalFile::Other(self.next_unknown.saturating_add(lid)),
            },
        }
    }

    fn entity<D: Clone>(&self, e: &IndexEntity<D>) -> IndexEntity<D> {
        let mut def = e.def.clone();
        def.spell = e.def.spell.map(|s| s.with_file(self.file(s.file_id)));
        IndexEntity {
            key: e.key,
            def,
            declarations: e
                .declarations
                .iter()
                .map(|d| d.with_file(self.file(d.file_id)))
                .collect(),
            uses: e
                .uses
                .iter()
                .map(|u| u.with_file(self.file(u.file_id)))
                .collect(),
            derived: e.derived.clone(),
            instances: e.instances.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
