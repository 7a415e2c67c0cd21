//! Lowering of declaration bodies to contract graphs.
//!
//! A [`BodyResolver`] walks one resolution unit with a lexical scope stack,
//! emits one contract slot per expression node and solves the graph once the
//! walk is done. Units that touch a package-level symbol without a definition
//! yet come back as [`UnitOutcome::Deferred`] and are retried by the driver.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use symex_ast::{
    AssignTok, BinaryOp, ConstGroup, Expr, ExprId, ExprKind, Field, FuncDecl, LitKind, LocalDecl, Pos, Stmt,
    TypeExpr, TypeSpec, UnaryOp, ValueSpec,
};
use symex_types::{FunctionType, SymbolDef, Type};

use crate::alloc::AllocationIndex;
use crate::builtin::Universe;
use crate::contracts::{solve, CompositeElem, Contract, ContractGraph, ElemKey, RangePart, SlotId};
use crate::env::{PackageProvider, TypeEnv};
use crate::error::{ErrorKind, ResolveError, Warning};
use crate::scope::ScopeStack;
use crate::table::{SymbolKind, SymbolTable};
use crate::typeparser::{TypeNames, TypeParser};

/// Everything a unit may consult besides its own syntax.
pub struct Context<'a> {
    pub package: &'a str,
    pub table: &'a SymbolTable,
    pub universe: &'a Universe,
    pub deps: &'a dyn PackageProvider,
    /// Own package-level names whose kind or definition is not known yet.
    pub pending: &'a HashSet<String>,
}

impl<'a> Context<'a> {
    pub fn env(&self) -> TypeEnv<'a> {
        TypeEnv::new(self.package, self.table, self.universe, self.deps)
    }

    fn package_table(&self, path: &str) -> Option<&'a SymbolTable> {
        self.env().package_table(path)
    }
}

/// Import bindings of one source file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileScope {
    pub name: String,
    /// Local package name to import path.
    pub imports: BTreeMap<String, String>,
    /// Paths imported with `.`.
    pub dots: Vec<String>,
}

impl FileScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn bind(&mut self, local: impl Into<String>, path: impl Into<String>) {
        self.imports.insert(local.into(), path.into());
    }

    pub fn resolve(&self, local: &str) -> Option<&str> {
        self.imports.get(local).map(String::as_str)
    }
}

/// Name a package is referred to by when imported without an explicit name:
/// the last path element, skipping a trailing major-version element and
/// dropping a `.vN` suffix.
pub fn default_import_name(path: &str) -> String {
    fn is_major(s: &str) -> bool {
        s.strip_prefix('v')
            .is_some_and(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()))
    }
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let mut last = parts.last().copied().unwrap_or(path);
    if parts.len() > 1 && is_major(last) {
        last = parts[parts.len() - 2];
    }
    let name = match last.rsplit_once('.') {
        Some((head, tail)) if is_major(tail) => head,
        _ => last,
    };
    name.replace('-', "_")
}

/// Type names visible at package level from one file.
pub struct FileNames<'a> {
    pub ctx: &'a Context<'a>,
    pub file: &'a FileScope,
}

impl TypeNames for FileNames<'_> {
    fn type_name(&self, name: &str) -> Result<Type, ResolveError> {
        let ctx = self.ctx;
        if ctx.table.get(SymbolKind::Type, name).is_some() {
            return Ok(Type::ident(ctx.package, name));
        }
        if ctx.table.contains(name) {
            return Err(ResolveError::new(
                ErrorKind::KindMismatch,
                name,
                format!("{name} is not a type"),
            ));
        }
        for dot in &self.file.dots {
            if ctx
                .package_table(dot)
                .is_some_and(|t| t.get(SymbolKind::Type, name).is_some())
            {
                return Ok(Type::ident(dot, name));
            }
        }
        ctx.universe
            .type_named(name)
            .ok_or_else(|| ResolveError::not_found(name))
    }

    fn qualified_type(&self, qualifier: &str, name: &str) -> Result<Type, ResolveError> {
        let path = self
            .file
            .resolve(qualifier)
            .ok_or_else(|| ResolveError::not_found(qualifier))?;
        let table = self.ctx.package_table(path).ok_or_else(|| {
            ResolveError::new(
                ErrorKind::NotFound,
                format!("{qualifier}.{name}"),
                format!("no symbol table for package `{path}`"),
            )
        })?;
        if table.get(SymbolKind::Type, name).is_some() {
            Ok(Type::ident(path, name))
        } else if table.contains(name) {
            Err(ResolveError::new(
                ErrorKind::KindMismatch,
                format!("{qualifier}.{name}"),
                format!("{qualifier}.{name} is not a type"),
            ))
        } else {
            Err(ResolveError::not_found(&format!("{qualifier}.{name}")))
        }
    }
}

#[derive(Clone, Debug)]
struct Local {
    kind: SymbolKind,
    slot: SlotId,
    /// Set for local type names.
    ty: Option<Type>,
}

/// Local scopes first, then the file's package-level view.
struct LocalNames<'r, 'a> {
    scopes: &'r ScopeStack<Local>,
    names: FileNames<'a>,
}

impl TypeNames for LocalNames<'_, '_> {
    fn type_name(&self, name: &str) -> Result<Type, ResolveError> {
        match self.scopes.lookup(name) {
            Some(Local { ty: Some(t), .. }) => Ok(t.clone()),
            Some(_) => Err(ResolveError::new(
                ErrorKind::KindMismatch,
                name,
                format!("{name} is not a type"),
            )),
            None => self.names.type_name(name),
        }
    }

    fn qualified_type(&self, qualifier: &str, name: &str) -> Result<Type, ResolveError> {
        self.names.qualified_type(qualifier, name)
    }
}

/// A name bound inside a body, with the type it resolved to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LocalBinding {
    pub name: String,
    pub depth: usize,
    pub def: Option<Type>,
}

/// Per-body typing report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BodyReport {
    pub function: String,
    pub expr_types: BTreeMap<ExprId, Type>,
    pub locals: Vec<LocalBinding>,
}

#[derive(Clone, Debug, Default)]
pub struct UnitResult {
    /// Resolved type of every declared name, in declaration order.
    pub values: Vec<(String, Option<Type>)>,
    pub report: BodyReport,
    pub errors: Vec<ResolveError>,
    pub warnings: Vec<Warning>,
    pub allocations: AllocationIndex,
    /// Types declared inside the unit, under their `virtual#` names.
    pub local_types: Vec<SymbolDef>,
}

#[derive(Clone, Debug)]
pub enum UnitOutcome {
    Resolved(UnitResult),
    /// Waiting on an unresolved package-level symbol.
    Deferred { symbol: String },
}

struct Recorded {
    name: String,
    depth: usize,
    slot: SlotId,
}

pub struct BodyResolver<'a> {
    ctx: &'a Context<'a>,
    file: &'a FileScope,
    unit: String,
    unit_pos: Option<String>,
    graph: ContractGraph,
    scopes: ScopeStack<Local>,
    local_types: Vec<SymbolDef>,
    /// Result types and named-result flag of the enclosing functions.
    returns: Vec<(Vec<Type>, bool)>,
    recorded: Vec<Recorded>,
    references: Vec<(String, String)>,
    warnings: Vec<Warning>,
    iota: Option<u64>,
}

impl<'a> BodyResolver<'a> {
    pub fn new(ctx: &'a Context<'a>, file: &'a FileScope, unit: impl Into<String>, pos: Option<&Pos>) -> Self {
        Self {
            ctx,
            file,
            unit: unit.into(),
            unit_pos: pos.map(Pos::display),
            graph: ContractGraph::new(),
            scopes: ScopeStack::new(),
            local_types: Vec::new(),
            returns: Vec::new(),
            recorded: Vec::new(),
            references: Vec::new(),
            warnings: Vec::new(),
            iota: None,
        }
    }

    /// Resolve a function or method body against its already parsed signature.
    pub fn resolve_function(mut self, decl: &FuncDecl, signature: &FunctionType, receiver: Option<&Type>) -> UnitOutcome {
        if let (Some(recv), Some(t)) = (&decl.recv, receiver) {
            if let Some(name) = recv.names.first() {
                let slot = self.graph.add(Contract::Declared(t.clone()), None, self.unit_pos.clone(), name);
                self.bind_local(name, SymbolKind::Variable, slot);
            }
        }
        self.bind_fields(&decl.ty.params, &signature.params);
        self.bind_fields(&decl.ty.results, &signature.results);
        self.returns
            .push((signature.results.clone(), decl.ty.has_named_results()));
        if let Some(body) = &decl.body {
            for stmt in &body.stmts {
                self.stmt(stmt);
            }
        }
        self.finish(Vec::new())
    }

    /// Resolve one package-level `var` spec.
    pub fn resolve_values(mut self, spec: &ValueSpec, declared: Option<Type>) -> UnitOutcome {
        let outputs = self.declare_values(&spec.names, declared, &spec.values, false);
        self.finish(outputs)
    }

    /// Resolve a package-level `const` group; later specs see earlier names.
    pub fn resolve_consts(mut self, group: &ConstGroup) -> UnitOutcome {
        let outputs = self.const_group(group);
        self.finish(outputs)
    }

    fn finish(self, outputs: Vec<(String, SlotId)>) -> UnitOutcome {
        let env = self.ctx.env().with_local_types(&self.local_types);
        let mut solution = solve(&self.graph, &env);
        if let Some(symbol) = solution.deferred.take() {
            return UnitOutcome::Deferred { symbol };
        }
        let mut allocations = std::mem::take(&mut solution.allocations);
        for (package, name) in &self.references {
            allocations.record_external(self.ctx.package, package, name);
        }
        let values = outputs
            .into_iter()
            .map(|(name, slot)| (name, solution.value(slot)))
            .collect();
        let locals = self
            .recorded
            .iter()
            .map(|r| LocalBinding {
                name: r.name.clone(),
                depth: r.depth,
                def: solution.value(r.slot),
            })
            .collect();
        let errors = solution.errors.iter().map(|e| self.attribute(e.clone())).collect();
        UnitOutcome::Resolved(UnitResult {
            values,
            report: BodyReport {
                function: self.unit.clone(),
                expr_types: std::mem::take(&mut solution.node_types),
                locals,
            },
            errors,
            warnings: self.warnings,
            allocations,
            local_types: self.local_types,
        })
    }

    fn attribute(&self, mut err: ResolveError) -> ResolveError {
        if err.pos.is_none() {
            err.pos = self.unit_pos.clone();
        }
        err
    }

    fn pos_of(&self, e: &Expr) -> Option<String> {
        e.pos.as_ref().map(Pos::display).or_else(|| self.unit_pos.clone())
    }

    /// Slot typed by expression node `e`.
    fn add_node(&mut self, contract: Contract, e: &Expr, label: impl Into<String>) -> SlotId {
        let pos = self.pos_of(e);
        self.graph.add(contract, Some(e.id), pos, label)
    }

    /// Slot without a node of its own, positioned at `near`.
    fn add_near(&mut self, contract: Contract, near: Option<&Expr>, label: impl Into<String>) -> SlotId {
        let pos = near.and_then(|e| e.pos.as_ref().map(Pos::display)).or_else(|| self.unit_pos.clone());
        self.graph.add(contract, None, pos, label)
    }

    fn invalid(&mut self, err: ResolveError, near: Option<&Expr>) -> SlotId {
        let label = err.symbol.clone();
        self.add_near(Contract::Invalid(err), near, label)
    }

    fn bind_local(&mut self, name: &str, kind: SymbolKind, slot: SlotId) {
        if name == "_" {
            return;
        }
        let local = Local { kind, slot, ty: None };
        if let Err(e) = self.scopes.insert(name, local) {
            self.invalid(e, None);
            return;
        }
        self.recorded.push(Recorded {
            name: name.to_string(),
            depth: self.scopes.depth(),
            slot,
        });
    }

    fn bind_fields(&mut self, fields: &[Field], types: &[Type]) {
        let mut i = 0;
        for field in fields {
            for (k, name) in field.names.iter().enumerate() {
                let Some(t) = types.get(i + k) else {
                    continue;
                };
                let t = match t {
                    Type::Ellipsis { element } => Type::slice((**element).clone()),
                    other => other.clone(),
                };
                let slot = self.graph.add(Contract::Declared(t), None, self.unit_pos.clone(), name);
                self.bind_local(name, SymbolKind::Variable, slot);
            }
            i += field.names.len().max(1);
        }
    }

    fn with_parser<R>(&mut self, f: impl FnOnce(&mut TypeParser<'_>) -> R) -> R {
        let names = LocalNames {
            scopes: &self.scopes,
            names: FileNames {
                ctx: self.ctx,
                file: self.file,
            },
        };
        let mut parser = TypeParser::new(self.ctx.package, &names).for_symbol(self.unit.clone());
        let out = f(&mut parser);
        let warnings = parser.take_warnings();
        let references = parser.take_references();
        self.warnings.extend(warnings);
        self.references.extend(references);
        out
    }

    fn parse_type(&mut self, t: &TypeExpr) -> Result<Type, ResolveError> {
        self.with_parser(|p| p.parse(t))
    }

    fn in_scope(&mut self, f: impl FnOnce(&mut Self)) {
        self.scopes.push();
        f(self);
        self.scopes.pop();
    }

    // ---- declarations ----

    /// One slot per name carrying the value assigned to it.
    fn sources(&mut self, count: usize, values: &[Expr]) -> Vec<SlotId> {
        if count > 1 && values.len() == 1 {
            let v = &values[0];
            let mut tuple = self.expr(v);
            if count == 2 && is_comma_ok_form(v) {
                tuple = self.add_near(Contract::CommaOk(tuple), Some(v), v.node_name());
            }
            return (0..count)
                .map(|index| {
                    self.add_near(
                        Contract::Project {
                            tuple,
                            index,
                            arity: count,
                        },
                        Some(v),
                        v.node_name(),
                    )
                })
                .collect();
        }
        let slots: Vec<SlotId> = values.iter().map(|v| self.expr(v)).collect();
        if slots.len() == count {
            return slots;
        }
        let err = ResolveError::new(
            ErrorKind::ArityMismatch,
            self.unit.clone(),
            format!("assignment mismatch: {count} variables but {} values", values.len()),
        );
        let bad = self.invalid(err, values.first());
        vec![bad; count]
    }

    fn declare_values(
        &mut self,
        names: &[String],
        declared: Option<Type>,
        values: &[Expr],
        constant: bool,
    ) -> Vec<(String, SlotId)> {
        let sources = if values.is_empty() {
            match &declared {
                Some(t) => names
                    .iter()
                    .map(|n| self.graph.add(Contract::Declared(t.clone()), None, self.unit_pos.clone(), n))
                    .collect(),
                None => {
                    let err = ResolveError::new(
                        ErrorKind::Grammar,
                        self.unit.clone(),
                        "missing type or initializer",
                    );
                    let bad = self.invalid(err, None);
                    vec![bad; names.len()]
                }
            }
        } else {
            self.sources(names.len(), values)
        };
        names
            .iter()
            .zip(sources)
            .map(|(name, from)| {
                let slot = self.graph.add(
                    Contract::PropagatesTo {
                        from,
                        declared: declared.clone(),
                        constant,
                    },
                    None,
                    self.unit_pos.clone(),
                    name,
                );
                (name.clone(), slot)
            })
            .collect()
    }

    /// Constant specs with implicit repetition and `iota`; names are bound in
    /// the current frame as they are declared.
    fn const_group(&mut self, group: &ConstGroup) -> Vec<(String, SlotId)> {
        let mut outputs = Vec::new();
        let mut previous: Option<(&Option<TypeExpr>, &[Expr])> = None;
        for (index, spec) in group.specs.iter().enumerate() {
            let (ty, values) = if spec.values.is_empty() {
                match previous {
                    Some(p) => p,
                    None => (&spec.ty, &spec.values[..]),
                }
            } else {
                (&spec.ty, &spec.values[..])
            };
            previous = Some((ty, values));
            let declared = match ty {
                Some(t) => match self.parse_type(t) {
                    Ok(t) => Some(t),
                    Err(e) => {
                        self.invalid(e, None);
                        None
                    }
                },
                None => None,
            };
            self.iota = Some(index as u64);
            let declared_values = self.declare_values(&spec.names, declared, values, true);
            self.iota = None;
            for (name, slot) in declared_values {
                self.bind_local(&name, SymbolKind::Constant, slot);
                outputs.push((name, slot));
            }
        }
        outputs
    }

    fn local_var(&mut self, spec: &ValueSpec) {
        let declared = match &spec.ty {
            Some(t) => match self.parse_type(t) {
                Ok(t) => Some(t),
                Err(e) => {
                    self.invalid(e, spec.values.first());
                    None
                }
            },
            None => None,
        };
        for (name, slot) in self.declare_values(&spec.names, declared, &spec.values, false) {
            self.bind_local(&name, SymbolKind::Variable, slot);
        }
    }

    /// Function-local type, published under a name unique to its position.
    fn local_type(&mut self, spec: &TypeSpec) {
        let pos = spec
            .pos
            .as_ref()
            .map(Pos::display)
            .or_else(|| self.unit_pos.clone())
            .unwrap_or_default();
        if spec.alias {
            let target = match self.parse_type(&spec.ty) {
                Ok(t) => t,
                Err(e) => {
                    self.invalid(e, None);
                    return;
                }
            };
            let slot = self.graph.add(Contract::TypeOperand(target.clone()), None, Some(pos), &spec.name);
            let local = Local {
                kind: SymbolKind::Type,
                slot,
                ty: Some(target),
            };
            if let Err(e) = self.scopes.insert(&spec.name, local) {
                self.invalid(e, None);
            }
            return;
        }

        let virtual_name = format!("virtual#{pos}#{}", spec.name);
        let ident = Type::ident(self.ctx.package, &virtual_name);
        let slot = self
            .graph
            .add(Contract::TypeOperand(ident.clone()), None, Some(pos.clone()), &spec.name);
        let local = Local {
            kind: SymbolKind::Type,
            slot,
            ty: Some(ident),
        };
        if let Err(e) = self.scopes.insert(&spec.name, local) {
            self.invalid(e, None);
            return;
        }
        match self.parse_type(&spec.ty) {
            Ok(t) => self
                .local_types
                .push(SymbolDef::new(virtual_name, self.ctx.package, t).at(pos)),
            Err(e) => {
                self.local_types
                    .push(SymbolDef::stub(virtual_name, self.ctx.package).at(pos));
                self.invalid(e, None);
            }
        }
    }

    // ---- statements ----

    fn block(&mut self, stmts: &[Stmt]) {
        self.in_scope(|r| {
            for s in stmts {
                r.stmt(s);
            }
        });
    }

    fn stmt(&mut self, s: &Stmt) {
        match s {
            Stmt::Expr(e) | Stmt::Go(e) | Stmt::Defer(e) => {
                self.expr(e);
            }
            Stmt::Assign { lhs, tok, rhs } => match tok {
                AssignTok::Define => self.define(lhs, rhs),
                AssignTok::Assign => self.assign(lhs, rhs),
                AssignTok::Op(op) => {
                    let ([target], [value]) = (&lhs[..], &rhs[..]) else {
                        let err = ResolveError::new(
                            ErrorKind::Grammar,
                            op.symbol(),
                            format!("assignment operation {}= requires single-valued expressions", op.symbol()),
                        );
                        self.invalid(err, lhs.first());
                        return;
                    };
                    let t = self.expr(target);
                    let v = self.expr(value);
                    let b = self.add_near(Contract::BinaryOp { op: *op, x: t, y: v }, Some(target), op.symbol());
                    self.add_near(Contract::Assign { target: t, value: b }, Some(target), op.symbol());
                }
            },
            Stmt::Decl(decl) => match decl {
                LocalDecl::Var(spec) => self.local_var(spec),
                LocalDecl::Const(group) => {
                    self.const_group(group);
                }
                LocalDecl::Type(spec) => self.local_type(spec),
            },
            Stmt::IncDec { x, inc } => {
                let t = self.expr(x);
                let one = self.add_near(Contract::Literal(LitKind::Int), Some(x), "1");
                let op = if *inc { BinaryOp::Add } else { BinaryOp::Sub };
                let b = self.add_near(Contract::BinaryOp { op, x: t, y: one }, Some(x), op.symbol());
                self.add_near(Contract::Assign { target: t, value: b }, Some(x), x.node_name());
            }
            Stmt::Send { chan, value } => {
                let c = self.expr(chan);
                let v = self.expr(value);
                self.add_near(Contract::Send { chan: c, value: v }, Some(chan), "send");
            }
            Stmt::Return(values) => {
                let slots: Vec<SlotId> = values.iter().map(|v| self.expr(v)).collect();
                let (results, named) = self.returns.last().cloned().unwrap_or_default();
                self.add_near(
                    Contract::Return {
                        values: slots,
                        results,
                        named,
                    },
                    values.first(),
                    "return",
                );
            }
            Stmt::Block(b) => self.block(&b.stmts),
            Stmt::If { init, cond, then, els } => self.in_scope(|r| {
                if let Some(init) = init {
                    r.stmt(init);
                }
                r.expr(cond);
                r.block(&then.stmts);
                if let Some(els) = els {
                    r.stmt(els);
                }
            }),
            Stmt::For { init, cond, post, body } => self.in_scope(|r| {
                if let Some(init) = init {
                    r.stmt(init);
                }
                if let Some(cond) = cond {
                    r.expr(cond);
                }
                if let Some(post) = post {
                    r.stmt(post);
                }
                r.block(&body.stmts);
            }),
            Stmt::Range {
                key,
                value,
                define,
                x,
                body,
            } => self.in_scope(|r| {
                let xs = r.expr(x);
                for (part, target) in [(RangePart::Key, key), (RangePart::Value, value)] {
                    let Some(target) = target else {
                        continue;
                    };
                    if *define {
                        let Some(name) = target.as_ident() else {
                            let err = ResolveError::new(
                                ErrorKind::Grammar,
                                target.node_name(),
                                "non-name on left side of :=",
                            );
                            r.invalid(err, Some(target));
                            continue;
                        };
                        let slot = r.add_node(Contract::Range { x: xs, part }, target, name);
                        r.bind_local(name, SymbolKind::Variable, slot);
                    } else {
                        let v = r.add_near(Contract::Range { x: xs, part }, Some(target), "range");
                        if target.as_ident() == Some("_") {
                            continue;
                        }
                        let t = r.expr(target);
                        r.add_near(Contract::Assign { target: t, value: v }, Some(target), "range");
                    }
                }
                r.block(&body.stmts);
            }),
            Stmt::Switch { init, tag, clauses } => self.in_scope(|r| {
                if let Some(init) = init {
                    r.stmt(init);
                }
                let tag = tag.as_ref().map(|t| r.expr(t));
                for clause in clauses {
                    r.in_scope(|r| {
                        for e in &clause.exprs {
                            let v = r.expr(e);
                            match tag {
                                Some(t) => {
                                    r.add_near(Contract::BinaryOp { op: BinaryOp::Eql, x: t, y: v }, Some(e), "case");
                                }
                                None => {
                                    let yes = r.add_near(Contract::Declared(Type::untyped("bool")), Some(e), "case");
                                    r.add_near(Contract::BinaryOp { op: BinaryOp::LAnd, x: yes, y: v }, Some(e), "case");
                                }
                            }
                        }
                        for s in &clause.body {
                            r.stmt(s);
                        }
                    });
                }
            }),
            Stmt::TypeSwitch { init, bind, x, clauses } => self.in_scope(|r| {
                if let Some(init) = init {
                    r.stmt(init);
                }
                let operand = match &x.unparen().kind {
                    ExprKind::TypeAssert { x: inner, ty: None } => inner.as_ref(),
                    _ => x,
                };
                let xs = r.expr(operand);
                let guard = r.add_near(Contract::TypeSwitchBind { x: xs, ty: None }, Some(operand), "switch");
                for clause in clauses {
                    r.in_scope(|r| {
                        let mut types = Vec::new();
                        for t in &clause.types {
                            if matches!(t, TypeExpr::Name(n) if n == "nil") {
                                types.push(Some(Type::Nil));
                                continue;
                            }
                            match r.parse_type(t) {
                                Ok(t) => types.push(Some(t)),
                                Err(e) => {
                                    r.invalid(e, Some(operand));
                                    types.push(None);
                                }
                            }
                        }
                        if let Some(name) = bind {
                            let ty = match types.as_slice() {
                                [Some(t)] => Some(t.clone()),
                                _ => None,
                            };
                            let slot = r.add_near(Contract::TypeSwitchBind { x: guard, ty }, Some(operand), name);
                            r.bind_local(name, SymbolKind::Variable, slot);
                        }
                        for s in &clause.body {
                            r.stmt(s);
                        }
                    });
                }
            }),
            Stmt::Select(clauses) => {
                for clause in clauses {
                    self.in_scope(|r| {
                        if let Some(comm) = &clause.comm {
                            r.stmt(comm);
                        }
                        for s in &clause.body {
                            r.stmt(s);
                        }
                    });
                }
            }
            Stmt::Labeled { stmt, .. } => self.stmt(stmt),
            Stmt::Branch { .. } | Stmt::Empty => {}
        }
    }

    fn define(&mut self, lhs: &[Expr], rhs: &[Expr]) {
        let names: Option<Vec<&str>> = lhs.iter().map(Expr::as_ident).collect();
        let Some(names) = names else {
            for v in rhs {
                self.expr(v);
            }
            let err = ResolveError::new(ErrorKind::Grammar, self.unit.clone(), "non-name on left side of :=");
            self.invalid(err, lhs.first());
            return;
        };
        let sources = self.sources(names.len(), rhs);
        let mut fresh = 0;
        for ((name, from), target) in names.into_iter().zip(sources).zip(lhs) {
            if name == "_" {
                self.add_near(Contract::Discard(from), Some(target), name);
            } else if self.scopes.in_top_frame(name) {
                let t = self.expr(target);
                self.add_near(Contract::Assign { target: t, value: from }, Some(target), name);
            } else {
                fresh += 1;
                let slot = self.add_node(
                    Contract::PropagatesTo {
                        from,
                        declared: None,
                        constant: false,
                    },
                    target,
                    name,
                );
                self.bind_local(name, SymbolKind::Variable, slot);
            }
        }
        if fresh == 0 {
            let err = ResolveError::new(
                ErrorKind::DuplicateSymbol,
                self.unit.clone(),
                "no new variables on left side of :=",
            );
            self.invalid(err, lhs.first());
        }
    }

    fn assign(&mut self, lhs: &[Expr], rhs: &[Expr]) {
        let sources = self.sources(lhs.len(), rhs);
        for (target, from) in lhs.iter().zip(sources) {
            if target.as_ident() == Some("_") {
                self.add_near(Contract::Discard(from), Some(target), "_");
                continue;
            }
            let t = self.expr(target);
            self.add_near(Contract::Assign { target: t, value: from }, Some(target), target.node_name());
        }
    }

    // ---- expressions ----

    fn expr(&mut self, e: &Expr) -> SlotId {
        self.expr_hint(e, None)
    }

    /// `hint` is the element type an elided composite literal takes.
    fn expr_hint(&mut self, e: &Expr, hint: Option<&Type>) -> SlotId {
        match &e.kind {
            ExprKind::Ident(name) => self.ident(e, name),
            ExprKind::BasicLit { kind, value } => self.add_node(Contract::Literal(*kind), e, value.clone()),
            ExprKind::CompositeLit { ty, elts } => self.composite(e, ty.as_ref(), elts, hint),
            ExprKind::FuncLit { ty, body } => {
                let sig = match self.with_parser(|p| p.parse_signature(ty)) {
                    Ok(sig) => sig,
                    Err(err) => return self.invalid(err, Some(e)),
                };
                self.in_scope(|r| {
                    r.bind_fields(&ty.params, &sig.params);
                    r.bind_fields(&ty.results, &sig.results);
                    r.returns.push((sig.results.clone(), ty.has_named_results()));
                    for s in &body.stmts {
                        r.stmt(s);
                    }
                    r.returns.pop();
                });
                self.add_node(Contract::FuncLit(Type::Function(sig)), e, "func literal")
            }
            ExprKind::Paren(inner) => {
                let s = self.expr_hint(inner, hint);
                self.add_node(Contract::Forward(s), e, "paren")
            }
            ExprKind::Selector { x, sel } => {
                let prefix = self.expr(x);
                self.add_node(
                    Contract::Selector {
                        prefix,
                        item: sel.clone(),
                    },
                    e,
                    sel.clone(),
                )
            }
            ExprKind::Index { x, index } => {
                let container = self.expr(x);
                let index = self.expr(index);
                self.add_node(Contract::Index { container, index }, e, e.node_name())
            }
            ExprKind::SliceExpr { x, low, high, max } => {
                let x = self.expr(x);
                let bounds = [low, high, max]
                    .into_iter()
                    .flatten()
                    .map(|b| self.expr(b))
                    .collect();
                self.add_node(Contract::SliceExpr { x, bounds }, e, e.node_name())
            }
            ExprKind::TypeAssert { x, ty } => {
                let expr = self.expr(x);
                let Some(ty) = ty else {
                    let err = ResolveError::new(ErrorKind::Grammar, "type", "use of .(type) outside type switch");
                    return self.invalid(err, Some(e));
                };
                match self.parse_type(ty) {
                    Ok(ty) => self.add_node(Contract::TypeAssertion { expr, ty }, e, e.node_name()),
                    Err(err) => self.invalid(err, Some(e)),
                }
            }
            ExprKind::Call { fun, args, spread } => {
                let callee = self.expr(fun);
                let args = args.iter().map(|a| self.expr(a)).collect();
                let label = callee_label(fun);
                self.add_node(
                    Contract::Call {
                        callee,
                        args,
                        spread: *spread,
                    },
                    e,
                    label,
                )
            }
            ExprKind::Star(x) => {
                let x = self.expr(x);
                self.add_node(Contract::Deref(x), e, e.node_name())
            }
            ExprKind::Unary { op, x } => {
                let inner = match (op, &x.unparen().kind) {
                    (UnaryOp::Addr, ExprKind::CompositeLit { .. }) => self.expr_hint(x, hint.map(strip_pointer)),
                    _ => self.expr(x),
                };
                self.add_node(Contract::UnaryOp { op: *op, x: inner }, e, op.symbol())
            }
            ExprKind::Binary { op, x, y } => {
                let x = self.expr(x);
                let y = self.expr(y);
                self.add_node(Contract::BinaryOp { op: *op, x, y }, e, op.symbol())
            }
            ExprKind::Type(t) => match self.parse_type(t) {
                Ok(t) => self.add_node(Contract::TypeOperand(t), e, e.node_name()),
                Err(err) => self.invalid(err, Some(e)),
            },
        }
    }

    fn ident(&mut self, e: &Expr, name: &str) -> SlotId {
        if name == "_" {
            let err = ResolveError::new(ErrorKind::KindMismatch, "_", "cannot use _ as value");
            return self.invalid(err, Some(e));
        }
        if let Some(local) = self.scopes.lookup(name) {
            let contract = match (&local.ty, local.kind) {
                (Some(t), SymbolKind::Type) => Contract::TypeOperand(t.clone()),
                _ => Contract::Forward(local.slot),
            };
            return self.add_node(contract, e, name);
        }
        if name == "nil" {
            return self.add_node(Contract::Nil, e, name);
        }
        let ctx = self.ctx;
        let file = self.file;
        if let Ok((_, kind)) = ctx.table.lookup(name) {
            let contract = match kind {
                SymbolKind::Type => Contract::TypeOperand(Type::ident(ctx.package, name)),
                _ => Contract::Resource {
                    package: ctx.package.to_string(),
                    name: name.to_string(),
                    kind: Some(kind),
                    forced: false,
                },
            };
            return self.add_node(contract, e, name);
        }
        if ctx.pending.contains(name) {
            let contract = Contract::Resource {
                package: ctx.package.to_string(),
                name: name.to_string(),
                kind: None,
                forced: false,
            };
            return self.add_node(contract, e, name);
        }
        if let Some(path) = file.resolve(name) {
            let contract = Contract::Package {
                path: path.to_string(),
                name: name.to_string(),
            };
            return self.add_node(contract, e, name);
        }
        for dot in &file.dots {
            let Some(table) = ctx.package_table(dot) else {
                continue;
            };
            if let Ok((_, kind)) = table.lookup(name) {
                let contract = match kind {
                    SymbolKind::Type => Contract::TypeOperand(Type::ident(dot, name)),
                    _ => Contract::Resource {
                        package: dot.clone(),
                        name: name.to_string(),
                        kind: Some(kind),
                        forced: true,
                    },
                };
                return self.add_node(contract, e, name);
            }
        }
        let universe = ctx.universe;
        let contract = if let Some(t) = universe.type_named(name) {
            Contract::TypeOperand(t)
        } else if let Some(f) = universe.builtin_func(name) {
            Contract::Builtin(f)
        } else if name == "iota" {
            match self.iota {
                Some(_) => Contract::Declared(Type::untyped("int")),
                None => Contract::Invalid(ResolveError::new(
                    ErrorKind::NotFound,
                    name,
                    "cannot use iota outside constant declaration",
                )),
            }
        } else if let Some(t) = universe.constant(name) {
            Contract::Declared(t)
        } else {
            Contract::Invalid(ResolveError::not_found(name))
        };
        self.add_node(contract, e, name)
    }

    fn composite(&mut self, e: &Expr, ty: Option<&TypeExpr>, elts: &[symex_ast::Element], hint: Option<&Type>) -> SlotId {
        let (lit_type, addr) = match (ty, hint) {
            (Some(t), _) => match self.with_parser(|p| p.parse_literal(t, elts.len() as u64)) {
                Ok(t) => (t, false),
                Err(err) => {
                    for el in elts {
                        self.expr(&el.value);
                    }
                    return self.invalid(err, Some(e));
                }
            },
            (None, Some(Type::Pointer { target })) => ((**target).clone(), true),
            (None, Some(t)) => (t.clone(), false),
            (None, None) => {
                let err = ResolveError::new(ErrorKind::Grammar, "composite literal", "missing type in composite literal");
                return self.invalid(err, Some(e));
            }
        };
        let env = self.ctx.env().with_local_types(&self.local_types);
        let under = env.underlying(&lit_type).ok();
        let (key_hint, elem_hint, is_struct) = match &under {
            Some(Type::Struct { .. }) => (None, None, true),
            Some(Type::Array { element, .. } | Type::Slice { element }) => (None, Some((**element).clone()), false),
            Some(Type::Map { key, value }) => (Some((**key).clone()), Some((**value).clone()), false),
            _ => (None, None, false),
        };
        let mut elements = Vec::with_capacity(elts.len());
        for el in elts {
            let key = match &el.key {
                None => ElemKey::None,
                Some(k) if is_struct => match k.as_ident() {
                    Some(field) => ElemKey::Field(field.to_string()),
                    None => ElemKey::Expr(self.expr(k)),
                },
                Some(k) => ElemKey::Expr(self.expr_hint(k, key_hint.as_ref())),
            };
            let value = self.expr_hint(&el.value, elem_hint.as_ref());
            elements.push(CompositeElem { key, value });
        }
        let label = lit_type.display();
        self.add_node(
            Contract::Composite {
                ty: lit_type,
                elements,
                addr,
            },
            e,
            label,
        )
    }
}

fn strip_pointer(t: &Type) -> &Type {
    match t {
        Type::Pointer { target } => target,
        other => other,
    }
}

fn callee_label(fun: &Expr) -> String {
    match &fun.unparen().kind {
        ExprKind::Ident(name) => name.clone(),
        ExprKind::Selector { sel, .. } => sel.clone(),
        _ => fun.node_name().to_string(),
    }
}

/// Expressions with a `v, ok` form.
fn is_comma_ok_form(e: &Expr) -> bool {
    matches!(
        &e.unparen().kind,
        ExprKind::Index { .. }
            | ExprKind::TypeAssert { ty: Some(_), .. }
            | ExprKind::Unary {
                op: UnaryOp::Recv,
                ..
            }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_names() {
        assert_eq!(default_import_name("fmt"), "fmt");
        assert_eq!(default_import_name("net/http"), "http");
        assert_eq!(default_import_name("github.com/org/lib/v2"), "lib");
        assert_eq!(default_import_name("gopkg.in/yaml.v3"), "yaml");
        assert_eq!(default_import_name("example.com/go-kit"), "go_kit");
    }
}
