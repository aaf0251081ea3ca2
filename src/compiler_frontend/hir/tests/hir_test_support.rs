#![cfg(test)]

//! Hand-built HIR for unit tests.
//!
//! `FunctionBuilder` appends statements to a linear CFG: every new node is connected from
//! the current frontier. Branches and loops are built by resetting the frontier and adding
//! back edges explicitly. Node `n` is placed on line `n + 1`.

use crate::compiler_frontend::hir::hir_datatypes::{HirType, TypeContext, TypeId, TypeKind};
use crate::compiler_frontend::hir::hir_nodes::{
    BorrowKind, Callee, CfgNode, FunctionId, FunctionSignature, HirFunction, HirLocal, HirModule,
    HirParam, HirScope, LocalId, NodeId, Operand, Rvalue, ScopeId, Statement,
};
use crate::compiler_frontend::hir::place::{IndexKind, Place};
use crate::compiler_frontend::string_interning::{StringId, StringTable};
use crate::compiler_frontend::text_location::TextLocation;

pub(crate) fn line(line: i32) -> TextLocation {
    TextLocation::new_just_line(line)
}

pub(crate) struct TestModule {
    pub string_table: StringTable,
    pub types: TypeContext,
    pub functions: Vec<HirFunction>,
    unit: Option<TypeId>,
}

impl TestModule {
    pub(crate) fn new() -> Self {
        Self {
            string_table: StringTable::new(),
            types: TypeContext::default(),
            functions: Vec::new(),
            unit: None,
        }
    }

    pub(crate) fn intern(&mut self, text: &str) -> StringId {
        self.string_table.intern(text)
    }

    pub(crate) fn opaque(&mut self, name: &str, copyable: bool) -> TypeId {
        let name = self.intern(name);
        self.types.insert(HirType {
            name,
            kind: TypeKind::Opaque,
            copyable,
        })
    }

    /// A non-copyable value with a destructor.
    pub(crate) fn thing(&mut self) -> TypeId {
        self.opaque("Thing", false)
    }

    pub(crate) fn int(&mut self) -> TypeId {
        self.opaque("Int", true)
    }

    pub(crate) fn unit(&mut self) -> TypeId {
        if let Some(unit) = self.unit {
            return unit;
        }

        let unit = self.opaque("Unit", true);
        self.unit = Some(unit);
        unit
    }

    pub(crate) fn struct_type(&mut self, name: &str, fields: &[(&str, TypeId)]) -> TypeId {
        let fields = fields
            .iter()
            .map(|(field, ty)| (self.intern(field), *ty))
            .collect();
        let name = self.intern(name);

        self.types.insert(HirType {
            name,
            kind: TypeKind::Struct { fields },
            copyable: false,
        })
    }

    pub(crate) fn array(&mut self, element: TypeId, length: u32) -> TypeId {
        let name = self.intern("Array");
        let copyable = self.types.is_copyable(element);

        self.types.insert(HirType {
            name,
            kind: TypeKind::Array { element, length },
            copyable,
        })
    }

    pub(crate) fn reference(&mut self, kind: BorrowKind, pointee: TypeId) -> TypeId {
        let name = self.intern(match kind {
            BorrowKind::Shared => "&",
            BorrowKind::Exclusive => "&mut",
        });

        // Shared references are bitwise-copyable, exclusive ones move.
        self.types.insert(HirType {
            name,
            kind: TypeKind::Reference { kind, pointee },
            copyable: !kind.is_exclusive(),
        })
    }

    pub(crate) fn shared_ref(&mut self, pointee: TypeId) -> TypeId {
        self.reference(BorrowKind::Shared, pointee)
    }

    pub(crate) fn exclusive_ref(&mut self, pointee: TypeId) -> TypeId {
        self.reference(BorrowKind::Exclusive, pointee)
    }

    pub(crate) fn function(&mut self, name: &str) -> FunctionBuilder<'_> {
        let id = FunctionId(self.functions.len() as u32);
        let name = self.intern(name);
        let unit = self.unit();

        FunctionBuilder {
            module: self,
            function: HirFunction {
                id,
                name,
                signature: FunctionSignature {
                    params: Vec::new(),
                    receiver: false,
                    return_type: unit,
                    return_lifetime: None,
                },
                locals: Vec::new(),
                scopes: vec![HirScope {
                    parent: None,
                    location: line(0),
                }],
                nodes: Vec::new(),
                entry: NodeId(0),
                exit: NodeId(0),
                location: line(0),
            },
            open_scopes: vec![ScopeId(0)],
            frontier: Vec::new(),
        }
    }

    pub(crate) fn field(&mut self, place: Place, name: &str) -> Place {
        let name = self.intern(name);
        place.field(name)
    }

    pub(crate) fn finish(self) -> (HirModule, StringTable) {
        (
            HirModule {
                types: self.types,
                functions: self.functions,
            },
            self.string_table,
        )
    }
}

pub(crate) struct FunctionBuilder<'m> {
    module: &'m mut TestModule,
    function: HirFunction,
    open_scopes: Vec<ScopeId>,
    frontier: Vec<NodeId>,
}

impl FunctionBuilder<'_> {
    pub(crate) fn id(&self) -> FunctionId {
        self.function.id
    }

    pub(crate) fn intern(&mut self, text: &str) -> StringId {
        self.module.intern(text)
    }

    pub(crate) fn module(&mut self) -> &mut TestModule {
        self.module
    }

    pub(crate) fn field(&mut self, place: impl Into<Place>, name: &str) -> Place {
        self.module.field(place.into(), name)
    }

    pub(crate) fn local(&mut self, name: &str, ty: TypeId) -> LocalId {
        self.declare(name, ty, false)
    }

    pub(crate) fn param(&mut self, name: &str, ty: TypeId) -> LocalId {
        self.param_with_lifetime(name, ty, None)
    }

    pub(crate) fn param_with_lifetime(
        &mut self,
        name: &str,
        ty: TypeId,
        lifetime: Option<&str>,
    ) -> LocalId {
        let local = self.declare(name, ty, true);
        let lifetime = lifetime.map(|lifetime| self.module.intern(lifetime));
        self.function.signature.params.push(HirParam { local, lifetime });
        local
    }

    pub(crate) fn receiver(&mut self) {
        self.function.signature.receiver = true;
    }

    pub(crate) fn returns(&mut self, ty: TypeId) {
        self.function.signature.return_type = ty;
    }

    pub(crate) fn return_lifetime(&mut self, lifetime: &str) {
        let lifetime = self.module.intern(lifetime);
        self.function.signature.return_lifetime = Some(lifetime);
    }

    fn declare(&mut self, name: &str, ty: TypeId, is_param: bool) -> LocalId {
        let id = LocalId(self.function.locals.len() as u32);
        let name = self.module.intern(name);
        let scope = self.current_scope();
        let location = line(self.function.nodes.len() as i32 + 1);

        self.function.locals.push(HirLocal {
            name,
            ty,
            scope,
            is_param,
            location,
        });
        id
    }

    fn current_scope(&self) -> ScopeId {
        self.open_scopes.last().copied().unwrap_or(ScopeId(0))
    }

    pub(crate) fn open_scope(&mut self) -> ScopeId {
        let id = ScopeId(self.function.scopes.len() as u32);
        self.function.scopes.push(HirScope {
            parent: Some(self.current_scope()),
            location: line(self.function.nodes.len() as i32 + 1),
        });
        self.open_scopes.push(id);
        id
    }

    /// Emits the `ScopeEnd` of the innermost open scope.
    pub(crate) fn close_scope(&mut self) -> NodeId {
        let scope = self.open_scopes.pop().unwrap_or(ScopeId(0));
        self.push(Statement::ScopeEnd(scope))
    }

    pub(crate) fn push(&mut self, statement: Statement) -> NodeId {
        let id = NodeId(self.function.nodes.len() as u32);
        self.function.nodes.push(CfgNode {
            statement,
            location: line(id.0 as i32 + 1),
            successors: Vec::new(),
        });

        for predecessor in std::mem::take(&mut self.frontier) {
            self.edge(predecessor, id);
        }
        self.frontier = vec![id];
        id
    }

    pub(crate) fn edge(&mut self, from: NodeId, to: NodeId) {
        let successors = &mut self.function.nodes[from.index()].successors;
        if !successors.contains(&to) {
            successors.push(to);
        }
    }

    pub(crate) fn frontier(&self) -> Vec<NodeId> {
        self.frontier.clone()
    }

    pub(crate) fn set_frontier(&mut self, frontier: Vec<NodeId>) {
        self.frontier = frontier;
    }

    pub(crate) fn assign(&mut self, destination: impl Into<Place>, value: Rvalue) -> NodeId {
        self.push(Statement::Assign {
            destination: destination.into(),
            value,
        })
    }

    pub(crate) fn eval(&mut self, value: Rvalue) -> NodeId {
        self.push(Statement::Eval(value))
    }

    pub(crate) fn ret(&mut self, value: Option<Rvalue>) -> NodeId {
        self.push(Statement::Return(value))
    }

    pub(crate) fn branch(&mut self, condition: Operand) -> NodeId {
        self.push(Statement::Branch(condition))
    }

    pub(crate) fn nop(&mut self) -> NodeId {
        self.push(Statement::Nop)
    }

    /// Closes every open scope, appends the exit node and adds the function to the module.
    pub(crate) fn finish(mut self) -> FunctionId {
        while !self.open_scopes.is_empty() {
            self.close_scope();
        }

        let exit = self.push(Statement::Exit);
        self.function.exit = exit;

        let id = self.function.id;
        self.module.functions.push(self.function);
        id
    }

    /// Gives the raw function back without registering it, for malformed-input tests.
    pub(crate) fn finish_raw(mut self) -> HirFunction {
        while !self.open_scopes.is_empty() {
            self.close_scope();
        }

        let exit = self.push(Statement::Exit);
        self.function.exit = exit;
        self.function
    }
}

// Operand and rvalue shorthands.

pub(crate) fn consume(place: impl Into<Place>) -> Operand {
    Operand::Consume(place.into())
}

pub(crate) fn read(place: impl Into<Place>) -> Operand {
    Operand::Read(place.into())
}

pub(crate) fn shared(place: impl Into<Place>) -> Operand {
    Operand::Ref(BorrowKind::Shared, place.into())
}

pub(crate) fn exclusive(place: impl Into<Place>) -> Operand {
    Operand::Ref(BorrowKind::Exclusive, place.into())
}

pub(crate) fn use_of(operand: Operand) -> Rvalue {
    Rvalue::Use(operand)
}

pub(crate) fn constant() -> Rvalue {
    Rvalue::Use(Operand::Constant)
}

pub(crate) fn borrow(place: impl Into<Place>) -> Rvalue {
    Rvalue::Ref(BorrowKind::Shared, place.into())
}

pub(crate) fn borrow_mut(place: impl Into<Place>) -> Rvalue {
    Rvalue::Ref(BorrowKind::Exclusive, place.into())
}

/// A call to a host function the module knows nothing about.
pub(crate) fn opaque_call(args: Vec<Operand>) -> Rvalue {
    Rvalue::Call {
        callee: Callee::Opaque,
        args,
    }
}

pub(crate) fn call(callee: FunctionId, args: Vec<Operand>) -> Rvalue {
    Rvalue::Call {
        callee: Callee::Function(callee),
        args,
    }
}

pub(crate) fn deref(place: impl Into<Place>) -> Place {
    place.into().deref()
}

pub(crate) fn index(place: impl Into<Place>, position: u32) -> Place {
    place.into().index(IndexKind::Constant(position))
}

pub(crate) fn dynamic_index(place: impl Into<Place>) -> Place {
    place.into().index(IndexKind::Dynamic)
}
