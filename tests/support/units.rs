//! Builders for per-unit indexes.

use xindex::index::{FuncDetail, PerUnitIndex, VarDetail};
use xindex::position::Range;
use xindex::symbol::{DeclRef, LocalFile, Role, SymbolKey, Use};

/// An index for `path` whose parsed content is `contents`.
pub fn unit(path: &str, contents: &str) -> PerUnitIndex {
    let mut index = PerUnitIndex::empty(path);
    index.file_contents = contents.to_string();
    index
}

/// Define function `key` in the unit's own file, spelled at `range`.
pub fn define_func(index: &mut PerUnitIndex, key: u64, name: &str, range: Range) {
    let entity = index.entity_mut::<FuncDetail>(SymbolKey(key));
    entity.def.name = name.to_string();
    entity.def.spell = Some(DeclRef::new(range, Role::DEFINITION, LocalFile::Owner, range));
}

/// Declare function `key` at `range` in `file`.
pub fn declare_func(index: &mut PerUnitIndex, key: u64, file: &str, range: Range) {
    let lid = index.lid_for(file);
    index
        .entity_mut::<FuncDetail>(SymbolKey(key))
        .declarations
        .push(DeclRef::new(range, Role::DECLARATION, lid, range));
}

/// Record a call of function `key` at `range` in `file`.
pub fn call_func(index: &mut PerUnitIndex, key: u64, file: &str, range: Range) {
    let lid = index.lid_for(file);
    index
        .entity_mut::<FuncDetail>(SymbolKey(key))
        .uses
        .push(Use::new(range, Role::REFERENCE | Role::CALL, lid));
}

/// Record a read of variable `key` at `range` in `file`.
pub fn read_var(index: &mut PerUnitIndex, key: u64, file: &str, range: Range) {
    let lid = index.lid_for(file);
    index
        .entity_mut::<VarDetail>(SymbolKey(key))
        .uses
        .push(Use::new(range, Role::REFERENCE | Role::READ, lid));
}

/// Record a call of function `key` through local file id `lid`, which the
/// index's file table does not define.
pub fn call_through_undefined_file(index: &mut PerUnitIndex, key: u64, lid: u32, range: Range) {
    index
        .entity_mut::<FuncDetail>(SymbolKey(key))
        .uses
        .push(Use::new(range, Role::REFERENCE | Role::CALL, LocalFile::Other(lid)));
}

/// `a.cc` as used across the suite:
///
/// ```text
/// int foo();
/// int main() { foo(); }
/// ```
///
/// `foo` is key 1, `main` is key 2.
pub fn foo_main(path: &str) -> PerUnitIndex {
    let mut index = unit(path, FOO_MAIN);
    define_func(&mut index, 1, "foo", Range::from_coords(0, 4, 0, 7));
    define_func(&mut index, 2, "main", Range::from_coords(1, 4, 1, 8));
    call_func(&mut index, 1, path, Range::from_coords(1, 13, 1, 16));
    index
}

pub const FOO_MAIN: &str = "int foo();\nint main() { foo(); }\n";
