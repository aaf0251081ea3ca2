//! ============================================================
//!                         HIR Nodes
//! ============================================================
//! The fully resolved, type-checked function representation the borrow checker consumes.
//!  - All symbols are resolved to stable IDs
//!  - Every local carries a concrete type
//!  - Control flow is an explicit graph of single-statement nodes
//!  - Scope exits are materialized as `ScopeEnd` nodes on every exit edge
//!
//! The CFG builder owns the construction of these nodes. The borrow checker only
//! reads them and never mutates a module.
//!
//! ============================================================
//!                     Control Flow Shape
//! ============================================================
//!
//! Each function has exactly one `Exit` node without successors.
//! `Return` nodes store the returned value into the return slot and then flow
//! through the `ScopeEnd` nodes of every open scope before reaching `Exit`.
//! Loops are ordinary back edges.

use crate::compiler_frontend::hir::hir_datatypes::{TypeContext, TypeId};
use crate::compiler_frontend::hir::place::Place;
use crate::compiler_frontend::string_interning::StringId;
use crate::compiler_frontend::text_location::TextLocation;
use serde::Serialize;
use std::fmt::{Display, Formatter};

// ============================================================
// Stable IDs
// ============================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LocalId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FunctionId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl LocalId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ScopeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl Display for LocalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "_{}", self.0)
    }
}

impl Display for ScopeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope{}", self.0)
    }
}

impl Display for FunctionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

// ============================================================
// Module
// ============================================================
#[derive(Debug, Clone, Default)]
pub struct HirModule {
    pub types: TypeContext,
    pub functions: Vec<HirFunction>,
}

impl HirModule {
    pub fn function(&self, id: FunctionId) -> Option<&HirFunction> {
        self.functions.iter().find(|function| function.id == id)
    }
}

// ============================================================
// Functions
// ============================================================
#[derive(Debug, Clone)]
pub struct HirFunction {
    pub id: FunctionId,
    pub name: StringId,
    pub signature: FunctionSignature,

    /// Indexed by `LocalId`. Parameters are ordinary locals with `is_param` set.
    pub locals: Vec<HirLocal>,

    /// Indexed by `ScopeId`. Scope 0 is the function body.
    pub scopes: Vec<HirScope>,

    /// Indexed by `NodeId`.
    pub nodes: Vec<CfgNode>,

    pub entry: NodeId,
    pub exit: NodeId,
    pub location: TextLocation,
}

impl HirFunction {
    pub fn local(&self, id: LocalId) -> Option<&HirLocal> {
        self.locals.get(id.index())
    }

    pub fn node(&self, id: NodeId) -> Option<&CfgNode> {
        self.nodes.get(id.index())
    }

    pub fn node_location(&self, id: NodeId) -> TextLocation {
        self.node(id)
            .map(|node| node.location)
            .unwrap_or(self.location)
    }

    pub fn local_type(&self, id: LocalId) -> Option<TypeId> {
        self.local(id).map(|local| local.ty)
    }
}

#[derive(Debug, Clone)]
pub struct FunctionSignature {
    pub params: Vec<HirParam>,

    /// The first parameter is a `self`-like receiver.
    pub receiver: bool,

    pub return_type: TypeId,

    /// Explicit lifetime of the returned reference. `'static` names the free region.
    pub return_lifetime: Option<StringId>,
}

#[derive(Debug, Clone, Copy)]
pub struct HirParam {
    pub local: LocalId,

    /// Declared lifetime of the reference in this parameter's type, if written out.
    pub lifetime: Option<StringId>,
}

#[derive(Debug, Clone)]
pub struct HirLocal {
    pub name: StringId,
    pub ty: TypeId,
    pub scope: ScopeId,
    pub is_param: bool,
    pub location: TextLocation,
}

#[derive(Debug, Clone)]
pub struct HirScope {
    pub parent: Option<ScopeId>,
    pub location: TextLocation,
}

// ============================================================
// CFG
// ============================================================
#[derive(Debug, Clone)]
pub struct CfgNode {
    pub statement: Statement,
    pub location: TextLocation,
    pub successors: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign {
        destination: Place,
        value: Rvalue,
    },

    /// Evaluate for effects and discard the result.
    Eval(Rvalue),

    /// Store into the return slot. Control continues through the scope exits.
    Return(Option<Rvalue>),

    /// Inspect the condition. The branch targets are the node's successors.
    Branch(Operand),

    /// Every local declared in the scope dies here.
    ScopeEnd(ScopeId),

    Nop,

    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Pass by value. Moves unless the place's type is copyable.
    Consume(Place),

    /// Non-consuming inspection.
    Read(Place),

    /// A temporary borrow, e.g. an argument `&mut x`.
    Ref(BorrowKind, Place),

    Constant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rvalue {
    Use(Operand),
    Ref(BorrowKind, Place),
    Call { callee: Callee, args: Vec<Operand> },
    Aggregate(Vec<Operand>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee {
    Function(FunctionId),

    /// Host or external function without a signature in this module.
    Opaque,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum BorrowKind {
    Shared,
    Exclusive,
}

impl BorrowKind {
    pub fn is_exclusive(self) -> bool {
        matches!(self, BorrowKind::Exclusive)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BorrowKind::Shared => "shared",
            BorrowKind::Exclusive => "exclusive",
        }
    }
}

impl Rvalue {
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Rvalue::Use(operand) => vec![operand],
            Rvalue::Ref(..) => Vec::new(),
            Rvalue::Call { args, .. } => args.iter().collect(),
            Rvalue::Aggregate(operands) => operands.iter().collect(),
        }
    }
}
