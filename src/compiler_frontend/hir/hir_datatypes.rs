// ============================================================
// HIR Type System
// ============================================================
//
// The canonical type representation handed to the borrow checker.
// All types are fully resolved by the type checker; the engine never infers.
//
// Types are referenced by TypeId and stored in a TypeContext.
// Only the facts the ownership analysis needs are kept:
//   - is the type bitwise-copyable (move vs copy)
//   - what is its structure (field paths, dereference targets)
//
// ============================================================

use crate::compiler_frontend::hir::hir_nodes::BorrowKind;
use crate::compiler_frontend::string_interning::StringId;
use rustc_hash::FxHashSet;

/// Stable identifier for a canonical HIR type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone)]
pub struct HirType {
    pub name: StringId,
    pub kind: TypeKind,

    /// Decided by the type checker. Consuming a place of a copyable type copies it.
    pub copyable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Scalars, strings, handles: anything without projectable structure.
    Opaque,

    Struct {
        fields: Vec<(StringId, TypeId)>,
    },

    Array {
        element: TypeId,
        length: u32,
    },

    Reference {
        kind: BorrowKind,
        pointee: TypeId,
    },
}

/// Central type storage.
///
/// Guarantees canonical identity of all types.
/// If two places have the same TypeId, they are exactly the same type.
#[derive(Debug, Clone, Default)]
pub struct TypeContext {
    types: Vec<HirType>,
}

impl TypeContext {
    /// Inserts a new canonical type.
    /// Caller is responsible for interning/deduplicating if desired.
    pub fn insert(&mut self, ty: HirType) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub fn get(&self, id: TypeId) -> Option<&HirType> {
        self.types.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn is_copyable(&self, id: TypeId) -> bool {
        self.get(id).is_some_and(|ty| ty.copyable)
    }

    /// A value of this type owns a destructor obligation when it goes out of scope.
    pub fn needs_drop(&self, id: TypeId) -> bool {
        match self.get(id) {
            Some(ty) => !ty.copyable && !matches!(ty.kind, TypeKind::Reference { .. }),
            None => false,
        }
    }

    pub fn field_type(&self, id: TypeId, field: StringId) -> Option<TypeId> {
        match &self.get(id)?.kind {
            TypeKind::Struct { fields } => fields
                .iter()
                .find(|(name, _)| *name == field)
                .map(|(_, ty)| *ty),
            _ => None,
        }
    }

    pub fn element_type(&self, id: TypeId) -> Option<TypeId> {
        match &self.get(id)?.kind {
            TypeKind::Array { element, .. } => Some(*element),
            _ => None,
        }
    }

    pub fn pointee(&self, id: TypeId) -> Option<(BorrowKind, TypeId)> {
        match &self.get(id)?.kind {
            TypeKind::Reference { kind, pointee } => Some((*kind, *pointee)),
            _ => None,
        }
    }

    pub fn is_reference(&self, id: TypeId) -> bool {
        self.pointee(id).is_some()
    }

    /// True if a value of this type can hold a borrow, directly or in a field.
    /// Such values carry a region variable during solving.
    pub fn contains_reference(&self, id: TypeId) -> bool {
        let mut visited = FxHashSet::default();
        self.contains_reference_inner(id, &mut visited)
    }

    fn contains_reference_inner(&self, id: TypeId, visited: &mut FxHashSet<TypeId>) -> bool {
        if !visited.insert(id) {
            return false;
        }

        match self.get(id).map(|ty| &ty.kind) {
            Some(TypeKind::Reference { .. }) => true,
            Some(TypeKind::Struct { fields }) => fields
                .iter()
                .any(|(_, field_ty)| self.contains_reference_inner(*field_ty, visited)),
            Some(TypeKind::Array { element, .. }) => {
                self.contains_reference_inner(*element, visited)
            }
            Some(TypeKind::Opaque) | None => false,
        }
    }
}
