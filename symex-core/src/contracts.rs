//! Typed contracts between expression slots, and their solver.
//!
//! A resolution unit (a function body, a package-level `var` spec or a `const`
//! group) is first lowered to a [`ContractGraph`]. Slots are appended in
//! post-order, so every contract only refers to slots with smaller ids and a
//! single forward pass over the arena is a topological solve.

use std::collections::{BTreeMap, HashMap};

use symex_ast::{BinaryOp, ExprId, LitKind, UnaryOp};
use symex_types::{ChanDir, FunctionType, Type};

use crate::alloc::AllocationIndex;
use crate::builtin::BuiltinFunc;
use crate::env::{builtin_family, untyped_of, Family, MemberKind, TypeEnv};
use crate::error::{ErrorKind, ResolveError};
use crate::table::SymbolKind;

pub type SlotId = usize;

/// What a solved slot denotes.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Value(Type),
    /// Results of a multi-value call or a comma-ok form.
    Tuple(Vec<Type>),
    /// The expression denotes a type.
    TypeOf(Type),
    Package { path: String, name: String },
    Builtin(BuiltinFunc),
    /// Call without results, or a statement-level check.
    Void,
}

impl Operand {
    /// Type reported for the originating expression node.
    pub fn reported_type(&self) -> Option<Type> {
        match self {
            Operand::Value(t) | Operand::TypeOf(t) => Some(t.clone()),
            Operand::Package { path, name } => Some(Type::qualifier(path, name)),
            Operand::Tuple(_) | Operand::Builtin(_) | Operand::Void => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElemKey {
    None,
    /// Struct field name.
    Field(String),
    /// Array index or map key.
    Expr(SlotId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompositeElem {
    pub key: ElemKey,
    pub value: SlotId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangePart {
    Key,
    Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Contract {
    /// Ground slot bound to a package-level definition. `kind == None` defers
    /// the namespace choice to solve time. A `forced` resource belongs to an
    /// already extracted package and cannot be waited for.
    Resource {
        package: String,
        name: String,
        kind: Option<SymbolKind>,
        forced: bool,
    },
    /// Type fixed by a declaration.
    Declared(Type),
    Literal(LitKind),
    Nil,
    TypeOperand(Type),
    Package { path: String, name: String },
    Builtin(BuiltinFunc),
    /// Same operand as another slot (parentheses, uses of a local).
    Forward(SlotId),
    /// The target acquires the source's type; with a declared type the
    /// source must be assignable to it. Non-constant targets default untyped
    /// sources.
    PropagatesTo {
        from: SlotId,
        declared: Option<Type>,
        constant: bool,
    },
    Assign { target: SlotId, value: SlotId },
    Discard(SlotId),
    BinaryOp { op: BinaryOp, x: SlotId, y: SlotId },
    UnaryOp { op: UnaryOp, x: SlotId },
    Deref(SlotId),
    Call {
        callee: SlotId,
        args: Vec<SlotId>,
        spread: bool,
    },
    Selector { prefix: SlotId, item: String },
    Index { container: SlotId, index: SlotId },
    SliceExpr { x: SlotId, bounds: Vec<SlotId> },
    TypeAssertion { expr: SlotId, ty: Type },
    Composite {
        ty: Type,
        elements: Vec<CompositeElem>,
        /// Elided `&T{...}` inside an enclosing literal.
        addr: bool,
    },
    FuncLit(Type),
    /// `index`-th value of a tuple assigned to `arity` targets.
    Project {
        tuple: SlotId,
        index: usize,
        arity: usize,
    },
    /// `(T, bool)` form of a map index, type assertion or receive.
    CommaOk(SlotId),
    Range { x: SlotId, part: RangePart },
    TypeSwitchBind { x: SlotId, ty: Option<Type> },
    Return {
        values: Vec<SlotId>,
        results: Vec<Type>,
        named: bool,
    },
    Send { chan: SlotId, value: SlotId },
    /// Error found while lowering.
    Invalid(ResolveError),
}

impl Contract {
    pub fn inputs(&self) -> Vec<SlotId> {
        match self {
            Contract::Resource { .. }
            | Contract::Declared(_)
            | Contract::Literal(_)
            | Contract::Nil
            | Contract::TypeOperand(_)
            | Contract::Package { .. }
            | Contract::Builtin(_)
            | Contract::FuncLit(_)
            | Contract::Invalid(_) => Vec::new(),
            Contract::Forward(s)
            | Contract::Discard(s)
            | Contract::Deref(s)
            | Contract::CommaOk(s)
            | Contract::PropagatesTo { from: s, .. }
            | Contract::UnaryOp { x: s, .. }
            | Contract::Selector { prefix: s, .. }
            | Contract::TypeAssertion { expr: s, .. }
            | Contract::Project { tuple: s, .. }
            | Contract::Range { x: s, .. }
            | Contract::TypeSwitchBind { x: s, .. } => vec![*s],
            Contract::Assign { target: a, value: b }
            | Contract::BinaryOp { x: a, y: b, .. }
            | Contract::Index {
                container: a,
                index: b,
            }
            | Contract::Send { chan: a, value: b } => vec![*a, *b],
            Contract::Call { callee, args, .. } => {
                std::iter::once(*callee).chain(args.iter().copied()).collect()
            }
            Contract::SliceExpr { x, bounds } => {
                std::iter::once(*x).chain(bounds.iter().copied()).collect()
            }
            Contract::Composite { elements, .. } => elements
                .iter()
                .flat_map(|e| match e.key {
                    ElemKey::Expr(k) => vec![k, e.value],
                    _ => vec![e.value],
                })
                .collect(),
            Contract::Return { values, .. } => values.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Slot {
    pub contract: Contract,
    pub node: Option<ExprId>,
    pub pos: Option<String>,
    pub label: String,
}

#[derive(Clone, Debug, Default)]
pub struct ContractGraph {
    slots: Vec<Slot>,
}

impl ContractGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        contract: Contract,
        node: Option<ExprId>,
        pos: Option<String>,
        label: impl Into<String>,
    ) -> SlotId {
        let id = self.slots.len();
        debug_assert!(contract.inputs().iter().all(|&i| i < id));
        self.slots.push(Slot {
            contract,
            node,
            pos,
            label: label.into(),
        });
        id
    }

    pub fn slot(&self, id: SlotId) -> &Slot {
        &self.slots[id]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Every contract refers only to earlier slots.
    pub fn is_topological(&self) -> bool {
        self.slots
            .iter()
            .enumerate()
            .all(|(id, s)| s.contract.inputs().iter().all(|&i| i < id))
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Failure {
    /// This slot failed and reported why.
    Error,
    /// An input failed; nothing more to report.
    Poisoned,
    /// Waiting on a package-level symbol that is not resolved yet.
    Deferred(String),
}

type Outcome = Result<Operand, Failure>;

#[derive(Clone, Debug, Default)]
pub struct Solution {
    outcomes: Vec<Option<Operand>>,
    pub errors: Vec<ResolveError>,
    /// First symbol the unit is waiting on.
    pub deferred: Option<String>,
    pub allocations: AllocationIndex,
    pub node_types: BTreeMap<ExprId, Type>,
}

impl Solution {
    pub fn operand(&self, id: SlotId) -> Option<&Operand> {
        self.outcomes.get(id).and_then(|o| o.as_ref())
    }

    pub fn value(&self, id: SlotId) -> Option<Type> {
        match self.operand(id)? {
            Operand::Value(t) | Operand::TypeOf(t) => Some(t.clone()),
            _ => None,
        }
    }
}

/// Solve every slot of `graph` in order.
pub fn solve(graph: &ContractGraph, env: &TypeEnv<'_>) -> Solution {
    let mut solver = Solver {
        graph,
        env,
        results: Vec::with_capacity(graph.len()),
        errors: Vec::new(),
        allocations: AllocationIndex::new(),
        origins: HashMap::new(),
    };
    for id in 0..graph.len() {
        let outcome = solver.eval(id);
        solver.results.push(outcome);
    }

    let mut solution = Solution {
        errors: solver.errors,
        allocations: solver.allocations,
        ..Solution::default()
    };
    for (id, outcome) in solver.results.into_iter().enumerate() {
        match outcome {
            Ok(op) => {
                if let (Some(node), Some(t)) = (graph.slot(id).node, op.reported_type()) {
                    solution.node_types.insert(node, t);
                }
                solution.outcomes.push(Some(op));
            }
            Err(Failure::Deferred(symbol)) => {
                if solution.deferred.is_none() {
                    solution.deferred = Some(symbol);
                }
                solution.outcomes.push(None);
            }
            Err(_) => solution.outcomes.push(None),
        }
    }
    solution
}

struct Solver<'g, 'e, 'a> {
    graph: &'g ContractGraph,
    env: &'e TypeEnv<'a>,
    results: Vec<Outcome>,
    errors: Vec<ResolveError>,
    allocations: AllocationIndex,
    /// Package an external function or member came from.
    origins: HashMap<SlotId, String>,
}

fn untyped_bool() -> Type {
    Type::untyped("bool")
}

impl Solver<'_, '_, '_> {
    fn own(&self) -> &str {
        self.env.package
    }

    fn input(&self, id: SlotId) -> Outcome {
        match &self.results[id] {
            Ok(op) => Ok(op.clone()),
            Err(Failure::Deferred(s)) => Err(Failure::Deferred(s.clone())),
            Err(_) => Err(Failure::Poisoned),
        }
    }

    /// Record `err` against slot `at` without failing it.
    fn report(&mut self, at: SlotId, err: ResolveError) {
        let pos = self.graph.slot(at).pos.clone();
        self.errors.push(err.at(pos));
    }

    fn fail(&mut self, at: SlotId, err: ResolveError) -> Failure {
        self.report(at, err);
        Failure::Error
    }

    fn err(&mut self, at: SlotId, kind: ErrorKind, message: impl Into<String>) -> Failure {
        let label = self.graph.slot(at).label.clone();
        self.fail(at, ResolveError::new(kind, label, message))
    }

    fn check<T>(&mut self, at: SlotId, r: Result<T, ResolveError>) -> Result<T, Failure> {
        match r {
            Ok(v) => Ok(v),
            Err(e) => Err(self.fail(at, e)),
        }
    }

    /// Single value of slot `of`, reported against `at`.
    fn value(&mut self, at: SlotId, of: SlotId) -> Result<Type, Failure> {
        match self.input(of)? {
            Operand::Value(t) => Ok(t),
            Operand::Tuple(ts) => Err(self.err(
                at,
                ErrorKind::ArityMismatch,
                format!("multiple-value ({} values) in single-value context", ts.len()),
            )),
            Operand::TypeOf(t) => Err(self.err(
                at,
                ErrorKind::KindMismatch,
                format!("{} (type) is not an expression", t.display()),
            )),
            Operand::Package { name, .. } => Err(self.err(
                at,
                ErrorKind::KindMismatch,
                format!("use of package {name} without selector"),
            )),
            Operand::Builtin(f) => Err(self.err(
                at,
                ErrorKind::KindMismatch,
                format!("{} (built-in function) must be called", f.name()),
            )),
            Operand::Void => Err(self.err(at, ErrorKind::KindMismatch, "call without results used as value")),
        }
    }

    fn type_arg(&mut self, at: SlotId, of: SlotId) -> Result<Type, Failure> {
        match self.input(of)? {
            Operand::TypeOf(t) => Ok(t),
            other => {
                let shown = other.reported_type().map_or("expression".to_string(), |t| t.display());
                Err(self.err(at, ErrorKind::KindMismatch, format!("{shown} is not a type")))
            }
        }
    }

    fn underlying(&mut self, at: SlotId, t: &Type) -> Result<Type, Failure> {
        let r = self.env.underlying(t);
        self.check(at, r)
    }

    fn family(&mut self, at: SlotId, t: &Type) -> Result<Option<Family>, Failure> {
        if let Type::Builtin { name, untyped } = t {
            return Ok(builtin_family(name, *untyped));
        }
        let r = self.env.family(t);
        self.check(at, r)
    }

    /// Report, without failing `at`, when `value` cannot be assigned to `target`.
    fn expect_assignable(&mut self, at: SlotId, value: &Type, target: &Type, context: &str) {
        match self.env.assignable(value, target) {
            Ok(true) => {}
            Ok(false) => {
                let label = self.graph.slot(at).label.clone();
                self.report(
                    at,
                    ResolveError::new(
                        ErrorKind::IncompatibleTypes,
                        label,
                        format!(
                            "cannot use value of type {} as {} in {context}",
                            value.display(),
                            target.display()
                        ),
                    ),
                );
            }
            Err(e) => self.report(at, e),
        }
    }

    /// Record every external named type reachable from `t` without going
    /// through a function boundary.
    fn record_named(&mut self, t: &Type) {
        match t {
            Type::Identifier { package, name } => {
                let own = self.env.package.to_string();
                self.allocations.record_external(&own, package, name);
            }
            Type::Pointer { target: e }
            | Type::Slice { element: e }
            | Type::Array { element: e, .. }
            | Type::Ellipsis { element: e }
            | Type::Channel { value: e, .. } => self.record_named(e),
            Type::Map { key, value } => {
                self.record_named(key);
                self.record_named(value);
            }
            _ => {}
        }
    }

    fn eval(&mut self, id: SlotId) -> Outcome {
        let graph = self.graph;
        match &graph.slot(id).contract {
            Contract::Invalid(err) => Err(self.fail(id, err.clone())),
            Contract::Declared(t) => Ok(Operand::Value(t.clone())),
            Contract::Literal(kind) => Ok(Operand::Value(match kind {
                LitKind::Int => Type::untyped("int"),
                LitKind::Float => Type::untyped("float64"),
                LitKind::Imag => Type::untyped("complex128"),
                LitKind::Char => Type::untyped("rune"),
                LitKind::String => Type::untyped("string"),
            })),
            Contract::Nil => Ok(Operand::Value(Type::Nil)),
            Contract::TypeOperand(t) => Ok(Operand::TypeOf(t.clone())),
            Contract::Package { path, name } => Ok(Operand::Package {
                path: path.clone(),
                name: name.clone(),
            }),
            Contract::Builtin(f) => Ok(Operand::Builtin(*f)),
            Contract::FuncLit(t) => Ok(Operand::Value(t.clone())),
            Contract::Forward(from) => {
                if let Some(origin) = self.origins.get(from).cloned() {
                    self.origins.insert(id, origin);
                }
                self.input(*from)
            }
            Contract::Resource {
                package,
                name,
                kind,
                forced,
            } => self.resource(id, package, name, *kind, *forced),
            Contract::PropagatesTo {
                from,
                declared,
                constant,
            } => {
                let v = self.value(id, *from)?;
                match declared {
                    Some(t) => {
                        self.expect_assignable(id, &v, t, "assignment");
                        Ok(Operand::Value(t.clone()))
                    }
                    None if v == Type::Nil => Err(self.err(
                        id,
                        ErrorKind::KindMismatch,
                        "use of untyped nil in assignment",
                    )),
                    None if *constant => Ok(Operand::Value(v)),
                    None => Ok(Operand::Value(v.defaulted())),
                }
            }
            Contract::Assign { target, value } => {
                let t = self.value(id, *target)?;
                let v = self.value(id, *value)?;
                self.expect_assignable(id, &v, &t, "assignment");
                Ok(Operand::Void)
            }
            Contract::Discard(from) => {
                self.value(id, *from)?;
                Ok(Operand::Void)
            }
            Contract::BinaryOp { op, x, y } => self.binary(id, *op, *x, *y),
            Contract::UnaryOp { op, x } => self.unary(id, *op, *x),
            Contract::Deref(x) => match self.input(*x)? {
                Operand::TypeOf(t) => Ok(Operand::TypeOf(Type::pointer(t))),
                _ => {
                    let t = self.value(id, *x)?;
                    match self.underlying(id, &t)? {
                        Type::Pointer { target } => Ok(Operand::Value(*target)),
                        _ => Err(self.err(
                            id,
                            ErrorKind::KindMismatch,
                            format!("invalid indirect of value of type {}", t.display()),
                        )),
                    }
                }
            },
            Contract::Call {
                callee,
                args,
                spread,
            } => self.call(id, *callee, args, *spread),
            Contract::Selector { prefix, item } => self.selector(id, *prefix, item),
            Contract::Index { container, index } => self.index(id, *container, *index),
            Contract::SliceExpr { x, bounds } => {
                let t = self.value(id, *x)?;
                for b in bounds {
                    self.value(id, *b)?;
                }
                let sliced = match self.underlying(id, &t)? {
                    Type::Builtin { ref name, .. } if name == "string" => Some(t.defaulted()),
                    Type::Slice { .. } => Some(t.clone()),
                    Type::Array { element, .. } => Some(Type::slice(*element)),
                    Type::Pointer { target } => match self.underlying(id, &target)? {
                        Type::Array { element, .. } => Some(Type::slice(*element)),
                        _ => None,
                    },
                    _ => None,
                };
                match sliced {
                    Some(s) => Ok(Operand::Value(s)),
                    None => Err(self.err(
                        id,
                        ErrorKind::KindMismatch,
                        format!("cannot slice value of type {}", t.display()),
                    )),
                }
            }
            Contract::TypeAssertion { expr, ty } => {
                let x = self.value(id, *expr)?;
                let xu = self.underlying(id, &x)?;
                if !matches!(xu, Type::Interface { .. }) {
                    return Err(self.err(
                        id,
                        ErrorKind::KindMismatch,
                        format!("invalid type assertion: {} is not an interface", x.display()),
                    ));
                }
                let concrete = !matches!(self.env.underlying(ty), Ok(Type::Interface { .. }));
                if concrete && matches!(self.env.implements(ty, &xu), Ok(false)) {
                    let label = self.graph.slot(id).label.clone();
                    self.report(
                        id,
                        ResolveError::new(
                            ErrorKind::IncompatibleTypes,
                            label,
                            format!(
                                "impossible type assertion: {} does not implement {}",
                                ty.display(),
                                x.display()
                            ),
                        ),
                    );
                }
                Ok(Operand::Value(ty.clone()))
            }
            Contract::Composite { ty, elements, addr } => self.composite(id, ty, elements, *addr),
            Contract::Project {
                tuple,
                index,
                arity,
            } => match self.input(*tuple)? {
                Operand::Tuple(ts) if ts.len() == *arity => Ok(Operand::Value(ts[*index].clone())),
                Operand::Value(t) if *arity == 1 => Ok(Operand::Value(t)),
                Operand::Tuple(ts) => Err(self.err(
                    id,
                    ErrorKind::ArityMismatch,
                    format!("assignment mismatch: {arity} variables but {} values", ts.len()),
                )),
                Operand::Value(_) => Err(self.err(
                    id,
                    ErrorKind::ArityMismatch,
                    format!("assignment mismatch: {arity} variables but 1 value"),
                )),
                _ => {
                    self.value(id, *tuple)?;
                    Err(Failure::Poisoned)
                }
            },
            Contract::CommaOk(x) => {
                let t = self.value(id, *x)?;
                Ok(Operand::Tuple(vec![t, untyped_bool()]))
            }
            Contract::Range { x, part } => self.range(id, *x, *part),
            Contract::TypeSwitchBind { x, ty } => {
                let v = self.value(id, *x)?;
                match ty {
                    Some(Type::Nil) | None => Ok(Operand::Value(v)),
                    Some(t) => Ok(Operand::Value(t.clone())),
                }
            }
            Contract::Return {
                values,
                results,
                named,
            } => {
                if values.is_empty() {
                    if !results.is_empty() && !named {
                        return Err(self.err(id, ErrorKind::ArityMismatch, "not enough return values"));
                    }
                    return Ok(Operand::Void);
                }
                let types = self.spread_values(id, values, results.len() > 1)?;
                if types.len() != results.len() {
                    let which = if types.len() > results.len() {
                        "too many"
                    } else {
                        "not enough"
                    };
                    return Err(self.err(
                        id,
                        ErrorKind::ArityMismatch,
                        format!("{which} return values: have {}, want {}", types.len(), results.len()),
                    ));
                }
                for (v, r) in types.iter().zip(results) {
                    self.expect_assignable(id, v, r, "return statement");
                }
                Ok(Operand::Void)
            }
            Contract::Send { chan, value } => {
                let c = self.value(id, *chan)?;
                let v = self.value(id, *value)?;
                match self.underlying(id, &c)? {
                    Type::Channel { dir, value: elem } if dir != ChanDir::Recv => {
                        self.expect_assignable(id, &v, &elem, "send");
                        Ok(Operand::Void)
                    }
                    _ => Err(self.err(
                        id,
                        ErrorKind::KindMismatch,
                        format!("cannot send to value of type {}", c.display()),
                    )),
                }
            }
        }
    }

    /// Values of `slots`, expanding a lone tuple when `expand` is set.
    fn spread_values(&mut self, at: SlotId, slots: &[SlotId], expand: bool) -> Result<Vec<Type>, Failure> {
        if expand && slots.len() == 1 {
            if let Operand::Tuple(ts) = self.input(slots[0])? {
                return Ok(ts);
            }
        }
        let mut out = Vec::with_capacity(slots.len());
        for &s in slots {
            out.push(self.value(at, s)?);
        }
        Ok(out)
    }

    fn resource(
        &mut self,
        id: SlotId,
        package: &str,
        name: &str,
        kind: Option<SymbolKind>,
        forced: bool,
    ) -> Outcome {
        let Some(table) = self.env.package_table(package) else {
            return Err(self.err(
                id,
                ErrorKind::NotFound,
                format!("no symbol table for package `{package}`"),
            ));
        };
        let found = match kind {
            Some(k) => table.get(k, name).map(|d| (d, k)),
            None => table.lookup(name).ok(),
        };
        let external = package != self.own();
        match found {
            Some((_, SymbolKind::Type)) => Ok(Operand::TypeOf(Type::ident(package, name))),
            Some((def, _)) => match &def.def {
                Some(t) => {
                    if external {
                        let own = self.own().to_string();
                        self.allocations.record_external(&own, package, name);
                        self.origins.insert(id, package.to_string());
                    }
                    Ok(Operand::Value(t.clone()))
                }
                None if forced || external => Err(self.err(
                    id,
                    ErrorKind::UnresolvedSymbol,
                    format!("{name} has no resolved definition in `{package}`"),
                )),
                None => Err(Failure::Deferred(name.to_string())),
            },
            None if forced || external => Err(self.fail(id, ResolveError::not_found(name))),
            None => Err(Failure::Deferred(name.to_string())),
        }
    }

    fn binary(&mut self, id: SlotId, op: BinaryOp, x: SlotId, y: SlotId) -> Outcome {
        let xt = self.value(id, x)?;
        let yt = self.value(id, y)?;
        let sym = op.symbol();

        if op.is_shift() {
            let fx = self.family(id, &xt)?;
            let fy = self.family(id, &yt)?;
            let left_ok = fx.is_some_and(|f| f.is_integer() || (xt.is_untyped() && f.is_numeric()));
            if !left_ok || !fy.is_some_and(Family::is_numeric) {
                return Err(self.err(
                    id,
                    ErrorKind::IncompatibleTypes,
                    format!("invalid shift of {} by {}", xt.display(), yt.display()),
                ));
            }
            return Ok(Operand::Value(xt));
        }

        if op.is_comparison() {
            let ok = match (&xt, &yt) {
                (Type::Nil, Type::Nil) => false,
                (Type::Nil, other) | (other, Type::Nil) => {
                    self.env.assignable(&Type::Nil, other).unwrap_or(false)
                }
                _ => {
                    self.env.assignable(&xt, &yt).unwrap_or(false)
                        || self.env.assignable(&yt, &xt).unwrap_or(false)
                }
            };
            if !ok {
                return Err(self.err(
                    id,
                    ErrorKind::IncompatibleTypes,
                    format!("mismatched types {} and {} in {sym}", xt.display(), yt.display()),
                ));
            }
            if !op.is_equality() {
                let ordered = self
                    .family(id, &xt)?
                    .is_some_and(|f| f != Family::Bool && f != Family::Complex);
                if !ordered {
                    return Err(self.err(
                        id,
                        ErrorKind::IncompatibleTypes,
                        format!("operator {sym} not defined on {}", xt.display()),
                    ));
                }
            }
            return Ok(Operand::Value(untyped_bool()));
        }

        if op.is_logical() {
            let fx = self.family(id, &xt)?;
            let fy = self.family(id, &yt)?;
            if fx != Some(Family::Bool) || fy != Some(Family::Bool) {
                return Err(self.err(
                    id,
                    ErrorKind::IncompatibleTypes,
                    format!("operator {sym} not defined on {} and {}", xt.display(), yt.display()),
                ));
            }
            return Ok(Operand::Value(if xt.is_untyped() { yt } else { xt }));
        }

        let t = self.unify(id, sym, &xt, &yt)?;
        match self.family(id, &t)? {
            Some(f) if f.is_numeric() && (!op.is_integer_only() || f.is_integer()) => {
                Ok(Operand::Value(t))
            }
            Some(Family::String) if op == BinaryOp::Add => Ok(Operand::Value(t)),
            _ => Err(self.err(
                id,
                ErrorKind::IncompatibleTypes,
                format!("operator {sym} not defined on {}", t.display()),
            )),
        }
    }

    /// Common type of two arithmetic operands.
    fn unify(&mut self, id: SlotId, sym: &str, x: &Type, y: &Type) -> Result<Type, Failure> {
        let mismatch = |this: &mut Self| {
            this.err(
                id,
                ErrorKind::IncompatibleTypes,
                format!("mismatched types {} and {} in {sym}", x.display(), y.display()),
            )
        };
        match (x.is_untyped(), y.is_untyped()) {
            (false, false) if self.env.identical(x, y) => Ok(x.clone()),
            (false, false) => Err(mismatch(self)),
            (true, false) if self.env.assignable(x, y).unwrap_or(false) => Ok(y.clone()),
            (false, true) if self.env.assignable(y, x).unwrap_or(false) => Ok(x.clone()),
            (true, true) => {
                let (Type::Builtin { name: nx, .. }, Type::Builtin { name: ny, .. }) = (x, y) else {
                    return Err(mismatch(self));
                };
                match (builtin_family(nx, true), builtin_family(ny, true)) {
                    (Some(fx), Some(fy)) if fx.is_numeric() && fy.is_numeric() => {
                        Ok(untyped_of(fx.max(fy)))
                    }
                    (Some(fx), Some(fy)) if fx == fy => Ok(x.clone()),
                    _ => Err(mismatch(self)),
                }
            }
            _ => Err(mismatch(self)),
        }
    }

    fn unary(&mut self, id: SlotId, op: UnaryOp, x: SlotId) -> Outcome {
        let t = self.value(id, x)?;
        match op {
            UnaryOp::Addr => Ok(Operand::Value(Type::pointer(t))),
            UnaryOp::Recv => match self.underlying(id, &t)? {
                Type::Channel { dir, value } if dir != ChanDir::Send => Ok(Operand::Value(*value)),
                _ => Err(self.err(
                    id,
                    ErrorKind::KindMismatch,
                    format!("cannot receive from value of type {}", t.display()),
                )),
            },
            UnaryOp::Not | UnaryOp::Neg | UnaryOp::Plus | UnaryOp::Complement => {
                let f = self.family(id, &t)?;
                let ok = match op {
                    UnaryOp::Not => f == Some(Family::Bool),
                    UnaryOp::Complement => f.is_some_and(Family::is_integer),
                    _ => f.is_some_and(Family::is_numeric),
                };
                if ok {
                    Ok(Operand::Value(t))
                } else {
                    Err(self.err(
                        id,
                        ErrorKind::IncompatibleTypes,
                        format!("operator {} not defined on {}", op.symbol(), t.display()),
                    ))
                }
            }
        }
    }

    fn call(&mut self, id: SlotId, callee: SlotId, args: &[SlotId], spread: bool) -> Outcome {
        match self.input(callee)? {
            Operand::TypeOf(t) => {
                if args.len() != 1 {
                    return Err(self.err(
                        id,
                        ErrorKind::ArityMismatch,
                        format!("conversion to {} needs exactly one argument", t.display()),
                    ));
                }
                self.value(id, args[0])?;
                Ok(Operand::Value(t))
            }
            Operand::Builtin(f) => self.builtin_call(id, f, args, spread),
            Operand::Value(t) => {
                let sig = match self.underlying(id, &t)? {
                    Type::Function(f) => f,
                    Type::Method { def, .. } => def,
                    _ => {
                        return Err(self.err(
                            id,
                            ErrorKind::KindMismatch,
                            format!("cannot call non-function of type {}", t.display()),
                        ));
                    }
                };
                let arg_types = self.spread_values(id, args, sig.params.len() > 1)?;
                self.check_arguments(id, &sig, &arg_types, spread);
                if self.origins.contains_key(&callee) {
                    for r in &sig.results {
                        self.record_named(r);
                    }
                }
                Ok(match sig.results.len() {
                    0 => Operand::Void,
                    1 => Operand::Value(sig.results[0].clone()),
                    _ => Operand::Tuple(sig.results.clone()),
                })
            }
            other => {
                let shown = other.reported_type().map_or("value".to_string(), |t| t.display());
                Err(self.err(id, ErrorKind::KindMismatch, format!("cannot call {shown}")))
            }
        }
    }

    fn check_arguments(&mut self, id: SlotId, sig: &FunctionType, args: &[Type], spread: bool) {
        let fixed = if sig.variadic {
            sig.params.len().saturating_sub(1)
        } else {
            sig.params.len()
        };
        let arity_ok = if spread {
            sig.variadic && args.len() == sig.params.len()
        } else if sig.variadic {
            args.len() >= fixed
        } else {
            args.len() == fixed
        };
        if !arity_ok {
            let which = if args.len() < fixed { "not enough" } else { "too many" };
            let label = self.graph.slot(id).label.clone();
            self.report(
                id,
                ResolveError::new(
                    ErrorKind::ArityMismatch,
                    label,
                    format!("{which} arguments in call: have {}, want {}", args.len(), sig.params.len()),
                ),
            );
            return;
        }
        for (i, a) in args.iter().enumerate() {
            let target = match sig.params.get(i.min(sig.params.len().saturating_sub(1))) {
                Some(Type::Ellipsis { element }) if i >= fixed => {
                    if spread {
                        Type::slice((**element).clone())
                    } else {
                        (**element).clone()
                    }
                }
                Some(p) => p.clone(),
                None => continue,
            };
            self.expect_assignable(id, a, &target, "argument");
        }
    }

    fn arity(&mut self, id: SlotId, f: BuiltinFunc, args: &[SlotId], min: usize, max: Option<usize>) -> Result<(), Failure> {
        let n = args.len();
        if n < min || max.is_some_and(|m| n > m) {
            return Err(self.err(
                id,
                ErrorKind::ArityMismatch,
                format!("wrong number of arguments to {}: {n}", f.name()),
            ));
        }
        Ok(())
    }

    fn builtin_call(&mut self, id: SlotId, f: BuiltinFunc, args: &[SlotId], spread: bool) -> Outcome {
        let int = || Operand::Value(Type::builtin("int"));
        match f {
            BuiltinFunc::Len | BuiltinFunc::Cap => {
                self.arity(id, f, args, 1, Some(1))?;
                self.value(id, args[0])?;
                Ok(int())
            }
            BuiltinFunc::New => {
                self.arity(id, f, args, 1, Some(1))?;
                let t = self.type_arg(id, args[0])?;
                Ok(Operand::Value(Type::pointer(t)))
            }
            BuiltinFunc::Make => {
                self.arity(id, f, args, 1, Some(3))?;
                let t = self.type_arg(id, args[0])?;
                for &a in &args[1..] {
                    self.value(id, a)?;
                }
                match self.underlying(id, &t)? {
                    Type::Slice { .. } | Type::Map { .. } | Type::Channel { .. } => Ok(Operand::Value(t)),
                    _ => Err(self.err(
                        id,
                        ErrorKind::KindMismatch,
                        format!("invalid argument: cannot make {}", t.display()),
                    )),
                }
            }
            BuiltinFunc::Append => {
                self.arity(id, f, args, 1, None)?;
                let s = self.value(id, args[0])?;
                let Type::Slice { element } = self.underlying(id, &s)? else {
                    return Err(self.err(
                        id,
                        ErrorKind::KindMismatch,
                        format!("invalid argument: {} is not a slice", s.display()),
                    ));
                };
                let mut rest = Vec::new();
                for &a in &args[1..] {
                    rest.push(self.value(id, a)?);
                }
                if spread {
                    if let [v] = rest.as_slice() {
                        let bytes_from_string = self.env.identical(&element, &Type::builtin("byte"))
                            && self.family(id, v)? == Some(Family::String);
                        if !bytes_from_string {
                            self.expect_assignable(id, v, &s, "append");
                        }
                    }
                } else {
                    for v in &rest {
                        self.expect_assignable(id, v, &element, "append");
                    }
                }
                Ok(Operand::Value(s))
            }
            BuiltinFunc::Copy => {
                self.arity(id, f, args, 2, Some(2))?;
                self.value(id, args[0])?;
                self.value(id, args[1])?;
                Ok(int())
            }
            BuiltinFunc::Delete => {
                self.arity(id, f, args, 2, Some(2))?;
                let m = self.value(id, args[0])?;
                let k = self.value(id, args[1])?;
                match self.underlying(id, &m)? {
                    Type::Map { key, .. } => {
                        self.expect_assignable(id, &k, &key, "delete");
                        Ok(Operand::Void)
                    }
                    _ => Err(self.err(
                        id,
                        ErrorKind::KindMismatch,
                        format!("invalid argument: {} is not a map", m.display()),
                    )),
                }
            }
            BuiltinFunc::Close => {
                self.arity(id, f, args, 1, Some(1))?;
                let c = self.value(id, args[0])?;
                match self.underlying(id, &c)? {
                    Type::Channel { dir, .. } if dir != ChanDir::Recv => Ok(Operand::Void),
                    _ => Err(self.err(
                        id,
                        ErrorKind::KindMismatch,
                        format!("invalid operation: cannot close {}", c.display()),
                    )),
                }
            }
            BuiltinFunc::Clear | BuiltinFunc::Panic => {
                self.arity(id, f, args, 1, Some(1))?;
                self.value(id, args[0])?;
                Ok(Operand::Void)
            }
            BuiltinFunc::Print | BuiltinFunc::Println => {
                for &a in args {
                    self.value(id, a)?;
                }
                Ok(Operand::Void)
            }
            BuiltinFunc::Recover => {
                self.arity(id, f, args, 0, Some(0))?;
                Ok(Operand::Value(Type::empty_interface()))
            }
            BuiltinFunc::Complex => {
                self.arity(id, f, args, 2, Some(2))?;
                let re = self.value(id, args[0])?;
                let im = self.value(id, args[1])?;
                let t = self.unify(id, "complex", &re, &im)?;
                match &t {
                    Type::Builtin { untyped: true, .. } => Ok(Operand::Value(Type::untyped("complex128"))),
                    _ => match self.underlying(id, &t)? {
                        Type::Builtin { name, .. } if name == "float32" => {
                            Ok(Operand::Value(Type::builtin("complex64")))
                        }
                        Type::Builtin { name, .. } if name == "float64" => {
                            Ok(Operand::Value(Type::builtin("complex128")))
                        }
                        _ => Err(self.err(
                            id,
                            ErrorKind::IncompatibleTypes,
                            format!("invalid operation: complex of {}", t.display()),
                        )),
                    },
                }
            }
            BuiltinFunc::Real | BuiltinFunc::Imag => {
                self.arity(id, f, args, 1, Some(1))?;
                let c = self.value(id, args[0])?;
                if c.is_untyped() {
                    return Ok(Operand::Value(Type::untyped("float64")));
                }
                match self.underlying(id, &c)? {
                    Type::Builtin { name, .. } if name == "complex64" => Ok(Operand::Value(Type::builtin("float32"))),
                    Type::Builtin { name, .. } if name == "complex128" => Ok(Operand::Value(Type::builtin("float64"))),
                    _ => Err(self.err(
                        id,
                        ErrorKind::IncompatibleTypes,
                        format!("invalid argument: {} is not a complex number", c.display()),
                    )),
                }
            }
            BuiltinFunc::Min | BuiltinFunc::Max => {
                self.arity(id, f, args, 1, None)?;
                let mut t = self.value(id, args[0])?;
                for &a in &args[1..] {
                    let next = self.value(id, a)?;
                    t = self.unify(id, f.name(), &t, &next)?;
                }
                let ordered = self
                    .family(id, &t)?
                    .is_some_and(|fam| fam != Family::Bool && fam != Family::Complex);
                if !ordered {
                    return Err(self.err(
                        id,
                        ErrorKind::IncompatibleTypes,
                        format!("invalid argument: {} cannot be ordered", t.display()),
                    ));
                }
                Ok(Operand::Value(t))
            }
        }
    }

    fn selector(&mut self, id: SlotId, prefix: SlotId, item: &str) -> Outcome {
        let own = self.own().to_string();
        match self.input(prefix)? {
            Operand::Package { path, name } => {
                let Some(table) = self.env.package_table(&path) else {
                    return Err(self.err(
                        id,
                        ErrorKind::NotFound,
                        format!("no symbol table for package `{path}`"),
                    ));
                };
                let Ok((def, kind)) = table.lookup(item) else {
                    return Err(self.err(id, ErrorKind::NotFound, format!("undefined: {name}.{item}")));
                };
                self.allocations.record_external(&own, &path, item);
                self.origins.insert(id, path.clone());
                match (kind, &def.def) {
                    (SymbolKind::Type, _) => Ok(Operand::TypeOf(Type::ident(&path, item))),
                    (_, Some(t)) => Ok(Operand::Value(t.clone())),
                    (_, None) => Err(self.err(
                        id,
                        ErrorKind::UnresolvedSymbol,
                        format!("{name}.{item} has no resolved definition"),
                    )),
                }
            }
            Operand::TypeOf(t) => {
                let sel = self.env.select(&t, item);
                let sel = self.check(id, sel)?;
                if sel.kind != MemberKind::Method {
                    return Err(self.err(
                        id,
                        ErrorKind::KindMismatch,
                        format!("{}.{item} undefined (type {} has no method {item})", t.display(), t.display()),
                    ));
                }
                let Type::Function(sig) = sel.ty else {
                    return Err(Failure::Poisoned);
                };
                let mut params = vec![t];
                params.extend(sig.params);
                Ok(Operand::Value(Type::Function(FunctionType {
                    params,
                    results: sig.results,
                    variadic: sig.variadic,
                })))
            }
            Operand::Value(t) => {
                let sel = self.env.select(&t, item);
                let sel = self.check(id, sel)?;
                if let Some((package, type_name)) = &sel.owner {
                    if package != &own {
                        self.allocations
                            .record_external(&own, package, &format!("{type_name}.{item}"));
                        self.origins.insert(id, package.clone());
                    }
                }
                Ok(Operand::Value(sel.ty))
            }
            _ => {
                self.value(id, prefix)?;
                Err(Failure::Poisoned)
            }
        }
    }

    fn index(&mut self, id: SlotId, container: SlotId, index: SlotId) -> Outcome {
        let c = self.value(id, container)?;
        let i = self.value(id, index)?;
        let u = self.underlying(id, &c)?;
        let elem = match u {
            Type::Map { key, value } => {
                self.expect_assignable(id, &i, &key, "map index");
                Some(*value)
            }
            Type::Array { element, .. } | Type::Slice { element } => Some(*element),
            Type::Pointer { target } => match self.underlying(id, &target)? {
                Type::Array { element, .. } => Some(*element),
                _ => None,
            },
            Type::Builtin { ref name, .. } if name == "string" => Some(Type::builtin("byte")),
            _ => None,
        };
        match elem {
            Some(t) => Ok(Operand::Value(t)),
            None => Err(self.err(
                id,
                ErrorKind::KindMismatch,
                format!("cannot index value of type {}", c.display()),
            )),
        }
    }

    fn composite(&mut self, id: SlotId, ty: &Type, elements: &[CompositeElem], addr: bool) -> Outcome {
        let u = self.underlying(id, ty)?;
        let label = self.graph.slot(id).label.clone();
        for (i, el) in elements.iter().enumerate() {
            let v = match self.input(el.value) {
                Ok(_) => match self.value(id, el.value) {
                    Ok(v) => v,
                    Err(_) => continue,
                },
                Err(Failure::Deferred(s)) => return Err(Failure::Deferred(s)),
                Err(_) => continue,
            };
            let key = match &el.key {
                ElemKey::Expr(k) => match self.input(*k) {
                    Ok(_) => self.value(id, *k).ok(),
                    Err(Failure::Deferred(s)) => return Err(Failure::Deferred(s)),
                    Err(_) => None,
                },
                _ => None,
            };
            let target = match (&u, &el.key) {
                (Type::Struct { fields }, ElemKey::Field(name)) => {
                    match fields.iter().find(|f| f.selector_name() == Some(name.as_str())) {
                        Some(f) => f.def.clone(),
                        None => {
                            self.report(
                                id,
                                ResolveError::new(
                                    ErrorKind::NotFound,
                                    name,
                                    format!("unknown field {name} in struct literal of type {}", ty.display()),
                                ),
                            );
                            continue;
                        }
                    }
                }
                (Type::Struct { fields }, ElemKey::None) => match fields.get(i) {
                    Some(f) => f.def.clone(),
                    None => {
                        self.report(
                            id,
                            ResolveError::new(
                                ErrorKind::ArityMismatch,
                                &label,
                                format!("too many values in struct literal of type {}", ty.display()),
                            ),
                        );
                        continue;
                    }
                },
                (Type::Array { element, .. } | Type::Slice { element }, _) => (**element).clone(),
                (Type::Map { key: kt, value }, _) => {
                    match &key {
                        Some(k) => self.expect_assignable(id, k, kt, "map literal"),
                        None if el.key == ElemKey::None => self.report(
                            id,
                            ResolveError::new(ErrorKind::ArityMismatch, &label, "missing key in map literal"),
                        ),
                        None => {}
                    }
                    (**value).clone()
                }
                _ => {
                    return Err(self.err(
                        id,
                        ErrorKind::KindMismatch,
                        format!("invalid composite literal type {}", ty.display()),
                    ));
                }
            };
            self.expect_assignable(id, &v, &target, "composite literal");
        }
        if !matches!(
            u,
            Type::Struct { .. } | Type::Array { .. } | Type::Slice { .. } | Type::Map { .. }
        ) {
            return Err(self.err(
                id,
                ErrorKind::KindMismatch,
                format!("invalid composite literal type {}", ty.display()),
            ));
        }
        Ok(Operand::Value(if addr { Type::pointer(ty.clone()) } else { ty.clone() }))
    }

    fn range(&mut self, id: SlotId, x: SlotId, part: RangePart) -> Outcome {
        let t = self.value(id, x)?;
        let int = Type::builtin("int");
        let u = self.underlying(id, &t)?;
        let (key, value) = match &u {
            Type::Builtin { name, untyped } => match builtin_family(name, *untyped) {
                Some(Family::String) => (Some(int), Some(Type::builtin("rune"))),
                Some(f) if f.is_integer() => (Some(t.defaulted()), None),
                _ => (None, None),
            },
            Type::Array { element, .. } | Type::Slice { element } => (Some(int), Some((**element).clone())),
            Type::Pointer { target } => match self.underlying(id, target)? {
                Type::Array { element, .. } => (Some(int), Some(*element)),
                _ => (None, None),
            },
            Type::Map { key, value } => (Some((**key).clone()), Some((**value).clone())),
            Type::Channel { dir, value } if *dir != ChanDir::Send => (Some((**value).clone()), None),
            _ => (None, None),
        };
        if key.is_none() {
            return Err(self.err(
                id,
                ErrorKind::KindMismatch,
                format!("cannot range over value of type {}", t.display()),
            ));
        }
        match part {
            RangePart::Key => Ok(Operand::Value(key.unwrap_or(Type::Nil))),
            RangePart::Value => match value {
                Some(v) => Ok(Operand::Value(v)),
                None => Err(self.err(
                    id,
                    ErrorKind::ArityMismatch,
                    format!("range over {} permits only one iteration variable", t.display()),
                )),
            },
        }
    }
}
