use crate::compiler_frontend::hir::hir_datatypes::TypeContext;
use crate::compiler_frontend::hir::hir_nodes::{HirFunction, LocalId, NodeId, Statement};
use crate::compiler_frontend::hir::hir_validation::reachable_nodes;
use crate::compiler_frontend::hir::place::{PlaceRelation, Projection, relate_projections};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Per-function lookup tables built once after validation.
#[derive(Debug, Clone)]
pub(super) struct FunctionLayout {
    pub node_count: usize,
    pub local_count: usize,

    /// Reachable nodes in breadth-first order from the entry.
    pub reachable: Vec<NodeId>,
    pub reachable_set: PointSet,

    /// Only edges between reachable nodes.
    pub predecessors: Vec<Vec<NodeId>>,

    pub locals_by_scope: Vec<Vec<LocalId>>,
    pub scope_end_nodes: Vec<Vec<NodeId>>,

    /// Locals whose type can hold a borrow and therefore get a region variable.
    pub region_carrying: Vec<bool>,
    pub needs_drop: Vec<bool>,
}

impl FunctionLayout {
    pub(super) fn build(function: &HirFunction, types: &TypeContext) -> Self {
        let node_count = function.nodes.len();
        let local_count = function.locals.len();
        let reachable = reachable_nodes(function);

        let mut reachable_set = PointSet::empty(node_count);
        for node_id in &reachable {
            reachable_set.insert(node_id.index());
        }

        let mut predecessors = vec![Vec::new(); node_count];
        let mut scope_end_nodes = vec![Vec::new(); function.scopes.len()];

        for node_id in &reachable {
            let node = &function.nodes[node_id.index()];
            for successor in &node.successors {
                predecessors[successor.index()].push(*node_id);
            }

            if let Statement::ScopeEnd(scope) = node.statement {
                scope_end_nodes[scope.index()].push(*node_id);
            }
        }

        for list in predecessors.iter_mut().chain(scope_end_nodes.iter_mut()) {
            list.sort_unstable();
            list.dedup();
        }

        let mut locals_by_scope = vec![Vec::new(); function.scopes.len()];
        let mut region_carrying = Vec::with_capacity(local_count);
        let mut needs_drop = Vec::with_capacity(local_count);

        for (index, local) in function.locals.iter().enumerate() {
            locals_by_scope[local.scope.index()].push(LocalId(index as u32));
            region_carrying.push(types.contains_reference(local.ty));
            needs_drop.push(types.needs_drop(local.ty));
        }

        Self {
            node_count,
            local_count,
            reachable,
            reachable_set,
            predecessors,
            locals_by_scope,
            scope_end_nodes,
            region_carrying,
            needs_drop,
        }
    }

    pub(super) fn is_reachable(&self, node: NodeId) -> bool {
        self.reachable_set.contains(node.index())
    }
}

// ============================================================
// Ownership lattice
// ============================================================

/// Where a move happened and whether it happened on every path reaching the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveRecord {
    pub sites: BTreeSet<NodeId>,

    /// Moved on every reaching path. Only affects whether a drop is conditional.
    pub definite: bool,
}

impl MoveRecord {
    pub(super) fn at(site: NodeId) -> Self {
        Self {
            sites: BTreeSet::from([site]),
            definite: true,
        }
    }

    /// A local that has not been assigned yet.
    pub(super) fn uninitialized() -> Self {
        Self {
            sites: BTreeSet::new(),
            definite: true,
        }
    }

    fn join(&self, other: &Self) -> Self {
        Self {
            sites: self.sites.union(&other.sites).copied().collect(),
            definite: self.definite && other.definite,
        }
    }

    fn weakened(&self) -> Self {
        Self {
            sites: self.sites.clone(),
            definite: false,
        }
    }

    fn absorb(&mut self, other: &Self) {
        self.sites.extend(other.sites.iter().copied());
    }
}

/// Ownership of one local. Sub-paths are projection lists relative to the local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipState {
    Owned,
    Moved(MoveRecord),
    PartiallyMoved(BTreeMap<Vec<Projection>, MoveRecord>),
}

/// Result of asking whether a path can still be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum MoveConflict<'a> {
    None,

    /// The path itself or a containing path is moved.
    Moved(&'a MoveRecord),

    /// The path covers a moved sub-path.
    SubPathMoved(&'a MoveRecord),
}

impl OwnershipState {
    pub(super) fn uninitialized() -> Self {
        OwnershipState::Moved(MoveRecord::uninitialized())
    }

    /// Most conservative state wins. Any path that moved a location keeps it moved.
    pub fn join(&self, other: &Self) -> Self {
        use OwnershipState::{Moved, Owned, PartiallyMoved};

        match (self, other) {
            (Owned, Owned) => Owned,
            (Moved(left), Moved(right)) => Moved(left.join(right)),
            (Moved(record), Owned) | (Owned, Moved(record)) => Moved(record.weakened()),
            (Moved(record), PartiallyMoved(paths)) | (PartiallyMoved(paths), Moved(record)) => {
                let mut joined = record.weakened();
                for path_record in paths.values() {
                    joined.absorb(path_record);
                }
                Moved(joined)
            }
            (PartiallyMoved(paths), Owned) | (Owned, PartiallyMoved(paths)) => PartiallyMoved(
                paths
                    .iter()
                    .map(|(path, record)| (path.clone(), record.weakened()))
                    .collect(),
            ),
            (PartiallyMoved(left), PartiallyMoved(right)) => {
                let mut joined = BTreeMap::new();

                for (path, record) in left {
                    let merged = match right.get(path) {
                        Some(other) => record.join(other),
                        None => record.weakened(),
                    };
                    joined.insert(path.clone(), merged);
                }

                for (path, record) in right {
                    if !left.contains_key(path) {
                        joined.insert(path.clone(), record.weakened());
                    }
                }

                PartiallyMoved(normalize_moved_paths(joined))
            }
        }
    }

    pub(super) fn conflict_for(&self, path: &[Projection]) -> MoveConflict<'_> {
        match self {
            OwnershipState::Owned => MoveConflict::None,
            OwnershipState::Moved(record) => MoveConflict::Moved(record),
            OwnershipState::PartiallyMoved(paths) => {
                let mut sub_path = None;

                for (moved_path, record) in paths {
                    match relate_projections(moved_path, path) {
                        PlaceRelation::Equal | PlaceRelation::Contains => {
                            return MoveConflict::Moved(record);
                        }
                        PlaceRelation::ContainedBy => {
                            if sub_path.is_none() {
                                sub_path = Some(record);
                            }
                        }
                        PlaceRelation::Disjoint => {}
                    }
                }

                match sub_path {
                    Some(record) => MoveConflict::SubPathMoved(record),
                    None => MoveConflict::None,
                }
            }
        }
    }

    pub(super) fn mark_moved(&mut self, path: &[Projection], site: NodeId) {
        self.mark_moved_with(path, MoveRecord::at(site));
    }

    /// Marks the path moved with an explicit record, e.g. to blame earlier move sites.
    pub(super) fn mark_moved_with(&mut self, path: &[Projection], mut record: MoveRecord) {
        if path.is_empty() {
            *self = OwnershipState::Moved(record);
            return;
        }

        match self {
            OwnershipState::Moved(existing) => {
                existing.absorb(&record);
            }
            OwnershipState::Owned => {
                *self = OwnershipState::PartiallyMoved(BTreeMap::from([(path.to_vec(), record)]));
            }
            OwnershipState::PartiallyMoved(paths) => {
                if let Some((prefix, existing)) = paths
                    .iter_mut()
                    .find(|(moved_path, _)| path.starts_with(moved_path))
                {
                    existing.absorb(&record);
                    if prefix.as_slice() == path {
                        existing.definite = true;
                    }
                    return;
                }

                paths.retain(|moved_path, covered| {
                    if moved_path.starts_with(path) {
                        record.absorb(covered);
                        false
                    } else {
                        true
                    }
                });
                paths.insert(path.to_vec(), record);
            }
        }
    }

    /// Assignment re-initializes the written path.
    pub(super) fn mark_written(&mut self, path: &[Projection]) {
        if path.is_empty() {
            *self = OwnershipState::Owned;
            return;
        }

        if let OwnershipState::PartiallyMoved(paths) = self {
            paths.retain(|moved_path, _| !moved_path.starts_with(path));
            if paths.is_empty() {
                *self = OwnershipState::Owned;
            }
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, OwnershipState::Owned)
    }
}

/// Drops moved paths that already sit under a shorter moved path.
fn normalize_moved_paths(
    mut paths: BTreeMap<Vec<Projection>, MoveRecord>,
) -> BTreeMap<Vec<Projection>, MoveRecord> {
    let keys = paths.keys().cloned().collect::<Vec<_>>();

    for key in &keys {
        // The shortest prefix never has a prefix of its own, so it is never removed here.
        let Some(prefix) = keys
            .iter()
            .filter(|other| other.len() < key.len() && key.starts_with(other))
            .min_by_key(|other| other.len())
        else {
            continue;
        };

        if let Some(record) = paths.remove(key)
            && let Some(prefix_record) = paths.get_mut(prefix)
        {
            prefix_record.absorb(&record);
        }
    }

    paths
}

/// Ownership of every local at one program point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct OwnershipMap {
    locals: Vec<OwnershipState>,
}

impl OwnershipMap {
    /// Parameters arrive owned. Every other local starts uninitialized.
    pub(super) fn at_entry(function: &HirFunction) -> Self {
        let locals = function
            .locals
            .iter()
            .map(|local| {
                if local.is_param {
                    OwnershipState::Owned
                } else {
                    OwnershipState::uninitialized()
                }
            })
            .collect();

        Self { locals }
    }

    pub(super) fn get(&self, local: LocalId) -> &OwnershipState {
        &self.locals[local.index()]
    }

    pub(super) fn get_mut(&mut self, local: LocalId) -> &mut OwnershipState {
        &mut self.locals[local.index()]
    }

    pub(super) fn join(&self, other: &Self) -> Self {
        let locals = self
            .locals
            .iter()
            .zip(other.locals.iter())
            .map(|(left, right)| left.join(right))
            .collect();

        Self { locals }
    }

    pub(super) fn states(&self) -> &[OwnershipState] {
        &self.locals
    }
}

// ============================================================
// Bitsets
// ============================================================

/// Dense bitset over program points, locals or loans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct PointSet {
    words: Vec<u64>,
    bit_len: usize,
}

impl PointSet {
    pub(super) fn empty(bit_len: usize) -> Self {
        let word_len = bit_len.div_ceil(64);
        Self {
            words: vec![0; word_len],
            bit_len,
        }
    }

    pub(super) fn full_range(bit_len: usize, end: usize) -> Self {
        let mut set = Self::empty(bit_len);
        for bit_index in 0..end.min(bit_len) {
            set.insert(bit_index);
        }
        set
    }

    pub(super) fn len(&self) -> usize {
        self.bit_len
    }

    /// Same bits over a different domain size. Bits past the new size are dropped.
    pub(super) fn resized(&self, bit_len: usize) -> Self {
        let mut set = Self::empty(bit_len);
        for bit_index in self.iter_ones() {
            set.insert(bit_index);
        }
        set
    }

    /// Returns true if the bit was not set before.
    pub(super) fn insert(&mut self, bit_index: usize) -> bool {
        if bit_index >= self.bit_len {
            return false;
        }

        let word_index = bit_index / 64;
        let mask = 1u64 << (bit_index % 64);
        let was_set = self.words[word_index] & mask != 0;
        self.words[word_index] |= mask;
        !was_set
    }

    pub(super) fn remove(&mut self, bit_index: usize) {
        if bit_index >= self.bit_len {
            return;
        }

        let word_index = bit_index / 64;
        self.words[word_index] &= !(1u64 << (bit_index % 64));
    }

    pub(super) fn contains(&self, bit_index: usize) -> bool {
        if bit_index >= self.bit_len {
            return false;
        }

        let word_index = bit_index / 64;
        let bit_offset = bit_index % 64;
        (self.words[word_index] & (1u64 << bit_offset)) != 0
    }

    /// Returns true if any bit was added.
    pub(super) fn union_with(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (left, right) in self.words.iter_mut().zip(other.words.iter()) {
            let merged = *left | *right;
            changed |= merged != *left;
            *left = merged;
        }
        changed
    }

    pub(super) fn subtract(&mut self, other: &Self) {
        for (left, right) in self.words.iter_mut().zip(other.words.iter()) {
            *left &= !*right;
        }
    }

    pub(super) fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    pub(super) fn iter_ones(&self) -> PointSetIter<'_> {
        PointSetIter {
            set: self,
            word_index: 0,
            current_word: self.words.first().copied().unwrap_or(0),
        }
    }
}

pub(super) struct PointSetIter<'a> {
    set: &'a PointSet,
    word_index: usize,
    current_word: u64,
}

impl Iterator for PointSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.word_index >= self.set.words.len() {
                return None;
            }

            if self.current_word != 0 {
                let trailing = self.current_word.trailing_zeros() as usize;
                let bit_index = self.word_index * 64 + trailing;
                self.current_word &= self.current_word - 1;

                if bit_index < self.set.bit_len {
                    return Some(bit_index);
                }

                continue;
            }

            self.word_index += 1;
            if self.word_index < self.set.words.len() {
                self.current_word = self.set.words[self.word_index];
            }
        }
    }
}
