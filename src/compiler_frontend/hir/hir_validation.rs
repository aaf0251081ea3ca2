//! HIR Validation
//!
//! Structural validation of one function's CFG before it is borrow checked.
//! Every failure here is an upstream defect, not a user error, so it is reported
//! as an internal `CompilerError` and aborts the analysis of that function only.

use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::hir::hir_nodes::{
    Callee, FunctionId, HirFunction, HirModule, LocalId, NodeId, Operand, Rvalue, Statement,
};
use crate::compiler_frontend::hir::place::Place;
use crate::compiler_frontend::string_interning::StringTable;
use crate::compiler_frontend::text_location::TextLocation;
use crate::return_borrow_checker_error;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// Lifetime name that selects the free region instead of a parameter's region.
pub const STATIC_LIFETIME_NAME: &str = "static";

pub fn validate_hir_function(
    module: &HirModule,
    function: &HirFunction,
    string_table: &StringTable,
) -> Result<(), CompilerError> {
    let validator = HirFunctionValidator {
        module,
        function,
        string_table,
    };
    validator.validate()
}

struct HirFunctionValidator<'a> {
    module: &'a HirModule,
    function: &'a HirFunction,
    string_table: &'a StringTable,
}

impl HirFunctionValidator<'_> {
    fn validate(&self) -> Result<(), CompilerError> {
        self.validate_entry_and_exit()?;
        self.validate_scopes()?;
        self.validate_locals()?;
        self.validate_signature()?;

        for (index, node) in self.function.nodes.iter().enumerate() {
            let node_id = NodeId(index as u32);
            self.validate_edges(node_id)?;
            self.validate_statement(node_id, &node.statement, node.location)?;
        }

        self.validate_declared_locals()
    }

    fn function_name(&self) -> &str {
        self.string_table.resolve(self.function.name)
    }

    fn validate_entry_and_exit(&self) -> Result<(), CompilerError> {
        let node_count = self.function.nodes.len();

        if self.function.entry.index() >= node_count {
            return_borrow_checker_error!(
                format!(
                    "Function '{}' has entry node {} but only {} CFG nodes",
                    self.function_name(),
                    self.function.entry,
                    node_count
                ),
                self.function.location,
                {
                    CompilationStage => "HIR Validation",
                    BrokenInvariant => "entry node exists",
                }
            );
        }

        let Some(exit) = self.function.node(self.function.exit) else {
            return_borrow_checker_error!(
                format!(
                    "Function '{}' has exit node {} but only {} CFG nodes",
                    self.function_name(),
                    self.function.exit,
                    node_count
                ),
                self.function.location,
                {
                    CompilationStage => "HIR Validation",
                    BrokenInvariant => "exit node exists",
                }
            );
        };

        if exit.statement != Statement::Exit || !exit.successors.is_empty() {
            return_borrow_checker_error!(
                format!(
                    "Exit node {} of function '{}' must be an Exit statement without successors",
                    self.function.exit,
                    self.function_name()
                ),
                exit.location,
                {
                    CompilationStage => "HIR Validation",
                    BrokenInvariant => "exit node is terminal",
                }
            );
        }

        Ok(())
    }

    fn validate_scopes(&self) -> Result<(), CompilerError> {
        if self.function.scopes.is_empty() {
            return_borrow_checker_error!(
                format!(
                    "Function '{}' declares no body scope",
                    self.function_name()
                ),
                self.function.location,
                {
                    CompilationStage => "HIR Validation",
                    BrokenInvariant => "body scope exists",
                }
            );
        }

        for (index, scope) in self.function.scopes.iter().enumerate() {
            if let Some(parent) = scope.parent
                && parent.index() >= index
            {
                // Parents are declared before children, which also rules out cycles.
                return_borrow_checker_error!(
                    format!(
                        "Scope {} of function '{}' has parent {} that is not declared before it",
                        index,
                        self.function_name(),
                        parent
                    ),
                    scope.location,
                    {
                        CompilationStage => "HIR Validation",
                        BrokenInvariant => "scope parents precede children",
                    }
                );
            }
        }

        Ok(())
    }

    fn validate_locals(&self) -> Result<(), CompilerError> {
        for (index, local) in self.function.locals.iter().enumerate() {
            if self.module.types.get(local.ty).is_none() {
                return_borrow_checker_error!(
                    format!(
                        "Local '{}' (#{}) in function '{}' has unknown type id {}",
                        self.string_table.resolve(local.name),
                        index,
                        self.function_name(),
                        local.ty.0
                    ),
                    local.location,
                    {
                        CompilationStage => "HIR Validation",
                        BrokenInvariant => "local types are known",
                    }
                );
            }

            if local.scope.index() >= self.function.scopes.len() {
                return_borrow_checker_error!(
                    format!(
                        "Local '{}' in function '{}' is declared in unknown scope {}",
                        self.string_table.resolve(local.name),
                        self.function_name(),
                        local.scope
                    ),
                    local.location,
                    {
                        CompilationStage => "HIR Validation",
                        BrokenInvariant => "local scopes are known",
                    }
                );
            }
        }

        Ok(())
    }

    fn validate_signature(&self) -> Result<(), CompilerError> {
        let signature = &self.function.signature;

        if self.module.types.get(signature.return_type).is_none() {
            return_borrow_checker_error!(
                format!(
                    "Function '{}' has unknown return type id {}",
                    self.function_name(),
                    signature.return_type.0
                ),
                self.function.location,
                {
                    CompilationStage => "HIR Validation",
                    BrokenInvariant => "return type is known",
                }
            );
        }

        for param in &signature.params {
            let Some(local) = self.function.local(param.local) else {
                return_borrow_checker_error!(
                    format!(
                        "Function '{}' lists unknown local {} as a parameter",
                        self.function_name(),
                        param.local
                    ),
                    self.function.location,
                    {
                        CompilationStage => "HIR Validation",
                        BrokenInvariant => "parameters are locals",
                    }
                );
            };

            if !local.is_param {
                return_borrow_checker_error!(
                    format!(
                        "Parameter '{}' of function '{}' is not marked as a parameter local",
                        self.string_table.resolve(local.name),
                        self.function_name()
                    ),
                    local.location,
                    {
                        CompilationStage => "HIR Validation",
                        BrokenInvariant => "parameters are locals",
                    }
                );
            }
        }

        if signature.receiver && signature.params.is_empty() {
            return_borrow_checker_error!(
                format!(
                    "Function '{}' declares a receiver but has no parameters",
                    self.function_name()
                ),
                self.function.location,
                {
                    CompilationStage => "HIR Validation",
                    BrokenInvariant => "receiver is the first parameter",
                }
            );
        }

        if let Some(lifetime) = signature.return_lifetime {
            let is_static = self.string_table.resolve(lifetime) == STATIC_LIFETIME_NAME;
            let is_declared = signature
                .params
                .iter()
                .any(|param| param.lifetime == Some(lifetime));

            if !is_static && !is_declared {
                return_borrow_checker_error!(
                    format!(
                        "Function '{}' returns a reference with undeclared lifetime '{}",
                        self.function_name(),
                        self.string_table.resolve(lifetime)
                    ),
                    self.function.location,
                    {
                        CompilationStage => "HIR Validation",
                        BrokenInvariant => "return lifetime names a parameter lifetime",
                    }
                );
            }
        }

        Ok(())
    }

    fn validate_edges(&self, node_id: NodeId) -> Result<(), CompilerError> {
        let Some(node) = self.function.node(node_id) else {
            return Ok(());
        };

        for successor in &node.successors {
            if successor.index() >= self.function.nodes.len() {
                return_borrow_checker_error!(
                    format!(
                        "Node {} of function '{}' has a dangling successor edge to {}",
                        node_id,
                        self.function_name(),
                        successor
                    ),
                    node.location,
                    {
                        CompilationStage => "HIR Validation",
                        BrokenInvariant => "successor edges are in range",
                    }
                );
            }
        }

        if node.statement == Statement::Exit && node_id != self.function.exit {
            return_borrow_checker_error!(
                format!(
                    "Function '{}' has a second Exit statement at node {}",
                    self.function_name(),
                    node_id
                ),
                node.location,
                {
                    CompilationStage => "HIR Validation",
                    BrokenInvariant => "single exit node",
                }
            );
        }

        Ok(())
    }

    fn validate_statement(
        &self,
        node_id: NodeId,
        statement: &Statement,
        location: TextLocation,
    ) -> Result<(), CompilerError> {
        match statement {
            Statement::Assign { destination, value } => {
                self.validate_place(node_id, destination, location)?;
                self.validate_rvalue(node_id, value, location)
            }
            Statement::Eval(value) | Statement::Return(Some(value)) => {
                self.validate_rvalue(node_id, value, location)
            }
            Statement::Branch(operand) => self.validate_operand(node_id, operand, location),
            Statement::ScopeEnd(scope) => {
                if scope.index() >= self.function.scopes.len() {
                    return_borrow_checker_error!(
                        format!(
                            "Node {} of function '{}' ends unknown scope {}",
                            node_id,
                            self.function_name(),
                            scope
                        ),
                        location,
                        {
                            CompilationStage => "HIR Validation",
                            BrokenInvariant => "scope ids are known",
                        }
                    );
                }
                Ok(())
            }
            Statement::Return(None) | Statement::Nop | Statement::Exit => Ok(()),
        }
    }

    fn validate_rvalue(
        &self,
        node_id: NodeId,
        value: &Rvalue,
        location: TextLocation,
    ) -> Result<(), CompilerError> {
        match value {
            Rvalue::Ref(_, place) => self.validate_place(node_id, place, location),
            Rvalue::Call { callee, args } => {
                if let Callee::Function(callee_id) = callee {
                    self.validate_callee(node_id, *callee_id, location)?;
                }
                for arg in args {
                    self.validate_operand(node_id, arg, location)?;
                }
                Ok(())
            }
            Rvalue::Use(operand) => self.validate_operand(node_id, operand, location),
            Rvalue::Aggregate(operands) => {
                for operand in operands {
                    self.validate_operand(node_id, operand, location)?;
                }
                Ok(())
            }
        }
    }

    fn validate_operand(
        &self,
        node_id: NodeId,
        operand: &Operand,
        location: TextLocation,
    ) -> Result<(), CompilerError> {
        match operand {
            Operand::Consume(place) | Operand::Read(place) | Operand::Ref(_, place) => {
                self.validate_place(node_id, place, location)
            }
            Operand::Constant => Ok(()),
        }
    }

    fn validate_callee(
        &self,
        node_id: NodeId,
        callee: FunctionId,
        location: TextLocation,
    ) -> Result<(), CompilerError> {
        if self.module.function(callee).is_none() {
            return_borrow_checker_error!(
                format!(
                    "Node {} of function '{}' calls unknown function {}",
                    node_id,
                    self.function_name(),
                    callee
                ),
                location,
                {
                    CompilationStage => "HIR Validation",
                    BrokenInvariant => "callees are known",
                }
            );
        }

        Ok(())
    }

    fn validate_place(
        &self,
        node_id: NodeId,
        place: &Place,
        location: TextLocation,
    ) -> Result<(), CompilerError> {
        if self.function.local(place.root).is_none() {
            return_borrow_checker_error!(
                format!(
                    "Node {} of function '{}' refers to unknown local {}",
                    node_id,
                    self.function_name(),
                    place.root
                ),
                location,
                {
                    CompilationStage => "HIR Validation",
                    BrokenInvariant => "local ids are known",
                }
            );
        }

        if place.type_in(self.function, &self.module.types).is_none() {
            return_borrow_checker_error!(
                format!(
                    "Node {} of function '{}' uses place '{}' that does not fit its type",
                    node_id,
                    self.function_name(),
                    place.display(self.function, self.string_table)
                ),
                location,
                {
                    CompilationStage => "HIR Validation",
                    BrokenInvariant => "projections match types",
                }
            );
        }

        Ok(())
    }

    /// Every declared non-parameter local must be referenced on some reachable node.
    /// Reading a local before any assignment is left to the ownership analysis.
    fn validate_declared_locals(&self) -> Result<(), CompilerError> {
        let mut referenced = FxHashSet::default();

        for node_id in reachable_nodes(self.function) {
            if let Some(node) = self.function.node(node_id) {
                statement_roots(&node.statement, &mut referenced);
            }
        }

        for (index, local) in self.function.locals.iter().enumerate() {
            if local.is_param {
                continue;
            }

            if !referenced.contains(&LocalId(index as u32)) {
                return_borrow_checker_error!(
                    format!(
                        "Local '{}' in function '{}' is never referenced on a reachable node",
                        self.string_table.resolve(local.name),
                        self.function_name()
                    ),
                    local.location,
                    {
                        CompilationStage => "HIR Validation",
                        BrokenInvariant => "declared locals are reachable",
                    }
                );
            }
        }

        Ok(())
    }
}

fn statement_roots(statement: &Statement, roots: &mut FxHashSet<LocalId>) {
    match statement {
        Statement::Assign { destination, value } => {
            roots.insert(destination.root);
            rvalue_roots(value, roots);
        }
        Statement::Eval(value) | Statement::Return(Some(value)) => rvalue_roots(value, roots),
        Statement::Branch(operand) => operand_roots(operand, roots),
        Statement::Return(None) | Statement::ScopeEnd(_) | Statement::Nop | Statement::Exit => {}
    }
}

fn rvalue_roots(value: &Rvalue, roots: &mut FxHashSet<LocalId>) {
    if let Rvalue::Ref(_, place) = value {
        roots.insert(place.root);
    }

    for operand in value.operands() {
        operand_roots(operand, roots);
    }
}

fn operand_roots(operand: &Operand, roots: &mut FxHashSet<LocalId>) {
    match operand {
        Operand::Consume(place) | Operand::Read(place) | Operand::Ref(_, place) => {
            roots.insert(place.root);
        }
        Operand::Constant => {}
    }
}

/// Breadth-first order of the nodes reachable from the entry.
/// Out-of-range successors are skipped, so this is safe to call before validation.
pub fn reachable_nodes(function: &HirFunction) -> Vec<NodeId> {
    let mut visited = FxHashSet::default();
    let mut order = Vec::new();
    let mut queue = VecDeque::new();

    queue.push_back(function.entry);

    while let Some(node_id) = queue.pop_front() {
        let Some(node) = function.node(node_id) else {
            continue;
        };

        if !visited.insert(node_id) {
            continue;
        }

        order.push(node_id);
        for successor in &node.successors {
            queue.push_back(*successor);
        }
    }

    order
}
