//! Whole-package extraction.
//!
//! Phases: bind imports, register every package-level name, complete type
//! declarations, check for recursive value types, resolve signatures and
//! explicitly typed variables, then run value and body units to a fixpoint.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use symex_ast::{ConstGroup, Decl, FuncDecl, Package, Pos, TypeSpec, ValueSpec};
use symex_types::{FunctionType, PackageCatalog, SymbolDef, Type};
use tracing::{debug, info};

use crate::alloc::PackageAllocations;
use crate::builtin::{Universe, UNSAFE_PACKAGE};
use crate::engine::{default_import_name, BodyReport, BodyResolver, Context, FileNames, FileScope, UnitOutcome, UnitResult};
use crate::env::PackageProvider;
use crate::error::{DeclError, ErrorKind, FatalError, ResolveError, Warning, WarningKind};
use crate::table::{receiver_type_name, SymbolKind, SymbolTable};
use crate::typeparser::TypeParser;

/// How constants that stay untyped are written to the catalog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UntypedConstMode {
    /// Keep the untyped family (`{"type":"builtin","name":"int","untyped":true}`).
    #[default]
    Preserve,
    /// Emit the family's default type and warn.
    Default,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverOptions {
    pub untyped_constants: UntypedConstMode,
}

/// Everything produced for one package.
#[derive(Clone, Debug)]
pub struct Extraction {
    pub package: String,
    pub table: SymbolTable,
    pub catalog: PackageCatalog,
    pub allocations: PackageAllocations,
    pub bodies: Vec<BodyReport>,
    pub errors: Vec<DeclError>,
    pub warnings: Vec<Warning>,
}

impl Extraction {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

enum UnitKind<'p> {
    Var {
        spec: &'p ValueSpec,
        declared: Option<Type>,
    },
    Const(&'p ConstGroup),
    Func {
        decl: &'p FuncDecl,
        signature: FunctionType,
        receiver: Option<Type>,
    },
}

struct Unit<'p> {
    file: usize,
    name: String,
    pos: Option<&'p Pos>,
    kind: UnitKind<'p>,
}

/// Accumulated per-package output.
struct Sink {
    package: String,
    files: Vec<String>,
    errors: Vec<DeclError>,
    warnings: Vec<Warning>,
    allocations: PackageAllocations,
    bodies: Vec<BodyReport>,
}

impl Sink {
    fn error(&mut self, declaration: &str, pos: Option<&Pos>, error: ResolveError) {
        let error = error.at(pos.map(Pos::display));
        self.errors.push(DeclError {
            declaration: declaration.to_string(),
            error,
        });
    }

    fn warn(&mut self, pos: Option<&Pos>, mut warning: Warning) {
        if warning.pos.is_none() {
            warning.pos = pos.map(Pos::display);
        }
        self.warnings.push(warning);
    }

    fn reference(&mut self, file: usize, package: &str, name: &str) {
        let own = self.package.clone();
        if let Some(file) = self.files.get(file) {
            self.allocations
                .file_mut(file)
                .record_external(&own, package, name);
        }
    }
}

type Parsed<T> = (Result<T, ResolveError>, Vec<Warning>, Vec<(String, String)>);

pub struct PackageDriver<'a> {
    universe: &'a Universe,
    deps: &'a dyn PackageProvider,
    options: DriverOptions,
}

impl<'a> PackageDriver<'a> {
    pub fn new(universe: &'a Universe, deps: &'a dyn PackageProvider) -> Self {
        Self::with_options(universe, deps, DriverOptions::default())
    }

    pub fn with_options(universe: &'a Universe, deps: &'a dyn PackageProvider, options: DriverOptions) -> Self {
        Self {
            universe,
            deps,
            options,
        }
    }

    pub fn extract(&self, pkg: &Package) -> Result<Extraction, FatalError> {
        if pkg.path.is_empty() {
            return Err(FatalError::InvalidInput("package path is empty".into()));
        }
        info!(target: "symex::driver", package = %pkg.path, files = pkg.files.len(), "extracting package");

        let scopes = self.bind_imports(pkg)?;
        let mut sink = Sink {
            package: pkg.path.clone(),
            files: pkg.files.iter().map(|f| f.name.clone()).collect(),
            errors: Vec::new(),
            warnings: Vec::new(),
            allocations: PackageAllocations::new(pkg.path.clone()),
            bodies: Vec::new(),
        };
        for file in &pkg.files {
            sink.allocations.file_mut(&file.name);
        }

        let mut table = SymbolTable::new(pkg.path.clone());
        let mut pending = HashSet::new();
        let decls = self.collect(pkg, &mut table, &mut pending, &mut sink);

        self.complete_types(pkg, &decls.types, &scopes, &mut table, &mut sink);
        self.check_cycles(pkg, &decls.types, &mut table, &mut sink);

        let mut units = Vec::new();
        let mut bodies = Vec::new();
        for (file, decl) in decls.values {
            match decl {
                Decl::Var(spec) => {
                    let declared = self.declare_typed_var(pkg, file, spec, &scopes, &mut table, &mut sink);
                    units.push(Unit {
                        file,
                        name: spec.names.join(", "),
                        pos: spec.pos.as_ref(),
                        kind: UnitKind::Var { spec, declared },
                    });
                }
                Decl::Const(group) => units.push(Unit {
                    file,
                    name: group
                        .specs
                        .iter()
                        .flat_map(|s| s.names.iter().cloned())
                        .collect::<Vec<_>>()
                        .join(", "),
                    pos: group.specs.first().and_then(|s| s.pos.as_ref()),
                    kind: UnitKind::Const(group),
                }),
                Decl::Func(decl) => {
                    if let Some(unit) = self.declare_func(pkg, file, decl, &scopes, &mut table, &mut pending, &mut sink) {
                        bodies.push(unit);
                    }
                }
                Decl::Type(_) => {}
            }
        }
        units.extend(bodies);

        self.run_units(pkg, units, &scopes, &mut table, &mut pending, &mut sink);
        let catalog = self.emit(&table, &mut sink);

        info!(
            target: "symex::driver",
            package = %pkg.path,
            symbols = table.len(),
            errors = sink.errors.len(),
            warnings = sink.warnings.len(),
            "package extracted"
        );
        Ok(Extraction {
            package: pkg.path.clone(),
            table,
            catalog,
            allocations: sink.allocations,
            bodies: sink.bodies,
            errors: sink.errors,
            warnings: sink.warnings,
        })
    }

    fn bind_imports(&self, pkg: &Package) -> Result<Vec<FileScope>, FatalError> {
        let mut scopes = Vec::with_capacity(pkg.files.len());
        for file in &pkg.files {
            let mut scope = FileScope::new(&file.name);
            for import in &file.imports {
                let path = import.path.as_str();
                if path.is_empty() {
                    return Err(FatalError::InvalidInput(format!("empty import path in {}", file.name)));
                }
                let known = path == UNSAFE_PACKAGE || self.deps.package(path).is_some();
                if !known {
                    return Err(FatalError::MissingDependency(path.to_string()));
                }
                match import.name.as_deref() {
                    Some("_") => {}
                    Some(".") => scope.dots.push(path.to_string()),
                    Some(name) => scope.bind(name, path),
                    None => scope.bind(default_import_name(path), path),
                }
            }
            scopes.push(scope);
        }
        Ok(scopes)
    }

    /// Register every package-level name so later phases can refer to it.
    fn collect<'p>(
        &self,
        pkg: &'p Package,
        table: &mut SymbolTable,
        pending: &mut HashSet<String>,
        sink: &mut Sink,
    ) -> Collected<'p> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Collected::default();
        let mut claim = |name: &str, pos: Option<&Pos>, sink: &mut Sink| -> bool {
            if name == "_" {
                return false;
            }
            if !seen.insert(name.to_string()) {
                sink.error(
                    name,
                    pos,
                    ResolveError::new(
                        ErrorKind::DuplicateSymbol,
                        name,
                        format!("{name} redeclared in this block"),
                    ),
                );
                return false;
            }
            true
        };

        for (file, f) in pkg.files.iter().enumerate() {
            for decl in &f.decls {
                match decl {
                    Decl::Type(spec) => {
                        if claim(&spec.name, spec.pos.as_ref(), sink) {
                            let pos = spec.pos.as_ref().map(Pos::display).unwrap_or_default();
                            if let Err(e) = table.add_stub(SymbolKind::Type, &spec.name, &pos) {
                                sink.error(&spec.name, spec.pos.as_ref(), e);
                            }
                            out.types.push((file, spec));
                        }
                    }
                    Decl::Var(spec) => {
                        let pos = spec.pos.as_ref().map(Pos::display).unwrap_or_default();
                        for name in &spec.names {
                            if claim(name, spec.pos.as_ref(), sink) {
                                if let Err(e) = table.add_stub(SymbolKind::Variable, name, &pos) {
                                    sink.error(name, spec.pos.as_ref(), e);
                                }
                            }
                        }
                        out.values.push((file, decl));
                    }
                    Decl::Const(group) => {
                        for spec in &group.specs {
                            for name in &spec.names {
                                if claim(name, spec.pos.as_ref(), sink) {
                                    pending.insert(name.clone());
                                }
                            }
                        }
                        out.values.push((file, decl));
                    }
                    Decl::Func(func) => {
                        if func.recv.is_none() && func.name != "init" && claim(&func.name, func.pos.as_ref(), sink) {
                            pending.insert(func.name.clone());
                        }
                        out.values.push((file, decl));
                    }
                }
            }
        }
        out
    }

    fn parse<T>(
        &self,
        pkg: &Package,
        table: &SymbolTable,
        scope: &FileScope,
        symbol: &str,
        f: impl FnOnce(&mut TypeParser<'_>) -> Result<T, ResolveError>,
    ) -> Parsed<T> {
        let no_pending = HashSet::new();
        let ctx = Context {
            package: &pkg.path,
            table,
            universe: self.universe,
            deps: self.deps,
            pending: &no_pending,
        };
        let names = FileNames { ctx: &ctx, file: scope };
        let mut parser = TypeParser::new(&pkg.path, &names).for_symbol(symbol);
        let result = f(&mut parser);
        (result, parser.take_warnings(), parser.take_references())
    }

    fn record<T>(&self, file: usize, pos: Option<&Pos>, parsed: Parsed<T>, sink: &mut Sink) -> Result<T, ResolveError> {
        let (result, warnings, references) = parsed;
        for w in warnings {
            sink.warn(pos, w);
        }
        for (package, name) in references {
            sink.reference(file, &package, &name);
        }
        result
    }

    fn complete_types(
        &self,
        pkg: &Package,
        types: &[(usize, &TypeSpec)],
        scopes: &[FileScope],
        table: &mut SymbolTable,
        sink: &mut Sink,
    ) {
        for &(file, spec) in types {
            let parsed = self.parse(pkg, table, &scopes[file], &spec.name, |p| p.parse(&spec.ty));
            match self.record(file, spec.pos.as_ref(), parsed, sink) {
                Ok(def) => {
                    if let Err(e) = table.complete(SymbolKind::Type, &spec.name, def) {
                        sink.error(&spec.name, spec.pos.as_ref(), e);
                    }
                }
                Err(e) => sink.error(&spec.name, spec.pos.as_ref(), e),
            }
        }
    }

    /// A type may not contain itself by value.
    fn check_cycles(&self, pkg: &Package, types: &[(usize, &TypeSpec)], table: &mut SymbolTable, sink: &mut Sink) {
        let mut edges: HashMap<&str, Vec<String>> = HashMap::new();
        for &(_, spec) in types {
            let mut refs = Vec::new();
            if let Some(def) = table.get(SymbolKind::Type, &spec.name).and_then(|d| d.def.as_ref()) {
                value_refs(def, &pkg.path, &mut refs);
            }
            edges.insert(spec.name.as_str(), refs);
        }
        let cyclic: Vec<&TypeSpec> = types
            .iter()
            .map(|&(_, spec)| spec)
            .filter(|spec| reaches(&edges, &spec.name))
            .collect();
        for spec in cyclic {
            debug!(target: "symex::driver", name = %spec.name, "recursive value type");
            table.unset(SymbolKind::Type, &spec.name);
            sink.error(
                &spec.name,
                spec.pos.as_ref(),
                ResolveError::new(
                    ErrorKind::CyclicType,
                    &spec.name,
                    format!("invalid recursive type {}", spec.name),
                ),
            );
        }
    }

    /// Publish the explicit type of a `var` spec before any initializer runs.
    fn declare_typed_var(
        &self,
        pkg: &Package,
        file: usize,
        spec: &ValueSpec,
        scopes: &[FileScope],
        table: &mut SymbolTable,
        sink: &mut Sink,
    ) -> Option<Type> {
        let ty = spec.ty.as_ref()?;
        let symbol = spec.names.join(", ");
        let parsed = self.parse(pkg, table, &scopes[file], &symbol, |p| p.parse(ty));
        match self.record(file, spec.pos.as_ref(), parsed, sink) {
            Ok(t) => {
                for name in spec.names.iter().filter(|n| *n != "_") {
                    if table.get(SymbolKind::Variable, name).is_some_and(|d| d.is_stub()) {
                        let _ = table.complete(SymbolKind::Variable, name, t.clone());
                    }
                }
                Some(t)
            }
            Err(e) => {
                sink.error(&symbol, spec.pos.as_ref(), e);
                None
            }
        }
    }

    /// Resolve a function or method signature and queue its body.
    #[allow(clippy::too_many_arguments)]
    fn declare_func<'p>(
        &self,
        pkg: &Package,
        file: usize,
        decl: &'p FuncDecl,
        scopes: &[FileScope],
        table: &mut SymbolTable,
        pending: &mut HashSet<String>,
        sink: &mut Sink,
    ) -> Option<Unit<'p>> {
        let pos_text = decl.pos.as_ref().map(Pos::display).unwrap_or_default();
        let parsed = self.parse(pkg, table, &scopes[file], &decl.name, |p| {
            let receiver = match &decl.recv {
                Some(recv) => Some(p.parse_receiver(recv)?),
                None => None,
            };
            Ok((receiver, p.parse_signature(&decl.ty)?))
        });
        let parsed = self.record(file, decl.pos.as_ref(), parsed, sink);
        if decl.recv.is_none() {
            pending.remove(&decl.name);
        }

        let (receiver, signature) = match parsed {
            Ok(r) => r,
            Err(e) => {
                let name = match &decl.recv {
                    Some(_) => format!("?.{}", decl.name),
                    None => {
                        if decl.name != "init" && decl.name != "_" {
                            table.add_unresolved(SymbolKind::Function, &decl.name, &pos_text);
                        }
                        decl.name.clone()
                    }
                };
                sink.error(&name, decl.pos.as_ref(), e);
                return None;
            }
        };

        let name = match &receiver {
            Some(recv) => {
                let type_name = match receiver_type_name(recv) {
                    Ok(n) => n.to_string(),
                    Err(e) => {
                        sink.error(&decl.name, decl.pos.as_ref(), e);
                        return None;
                    }
                };
                let def = SymbolDef::new("", pkg.path.clone(), Type::method(recv.clone(), signature.clone())).at(pos_text);
                if let Err(e) = table.add_method(&type_name, &decl.name, def) {
                    sink.error(&format!("{type_name}.{}", decl.name), decl.pos.as_ref(), e);
                    return None;
                }
                format!("{type_name}.{}", decl.name)
            }
            None => {
                if decl.name != "init" && decl.name != "_" {
                    let def = SymbolDef::new(&decl.name, pkg.path.clone(), Type::Function(signature.clone())).at(pos_text);
                    if let Err(e) = table.add(SymbolKind::Function, def) {
                        sink.error(&decl.name, decl.pos.as_ref(), e);
                    }
                }
                decl.name.clone()
            }
        };

        decl.body.as_ref()?;
        Some(Unit {
            file,
            name,
            pos: decl.pos.as_ref(),
            kind: UnitKind::Func {
                decl,
                signature,
                receiver,
            },
        })
    }

    /// Run units until every one has resolved or none makes progress.
    fn run_units(
        &self,
        pkg: &Package,
        mut queue: Vec<Unit<'_>>,
        scopes: &[FileScope],
        table: &mut SymbolTable,
        pending: &mut HashSet<String>,
        sink: &mut Sink,
    ) {
        let mut round = 0;
        loop {
            round += 1;
            let mut waiting = Vec::new();
            let mut progressed = false;
            for unit in queue {
                match self.run_unit(pkg, &unit, scopes, table, pending) {
                    UnitOutcome::Deferred { symbol } => {
                        debug!(target: "symex::driver", unit = %unit.name, waiting_on = %symbol, round, "deferred");
                        waiting.push((unit, symbol));
                    }
                    UnitOutcome::Resolved(result) => {
                        progressed = true;
                        self.apply(pkg, &unit, result, table, pending, sink);
                    }
                }
            }
            if waiting.is_empty() {
                return;
            }
            if !progressed {
                for (unit, symbol) in waiting {
                    self.give_up(pkg, &unit, &symbol, table, pending, sink);
                }
                return;
            }
            queue = waiting.into_iter().map(|(unit, _)| unit).collect();
        }
    }

    fn run_unit(
        &self,
        pkg: &Package,
        unit: &Unit<'_>,
        scopes: &[FileScope],
        table: &SymbolTable,
        pending: &HashSet<String>,
    ) -> UnitOutcome {
        let ctx = Context {
            package: &pkg.path,
            table,
            universe: self.universe,
            deps: self.deps,
            pending,
        };
        let resolver = BodyResolver::new(&ctx, &scopes[unit.file], unit.name.clone(), unit.pos);
        match &unit.kind {
            UnitKind::Var { spec, declared } => resolver.resolve_values(spec, declared.clone()),
            UnitKind::Const(group) => resolver.resolve_consts(group),
            UnitKind::Func {
                decl,
                signature,
                receiver,
            } => resolver.resolve_function(decl, signature, receiver.as_ref()),
        }
    }

    fn apply(
        &self,
        pkg: &Package,
        unit: &Unit<'_>,
        result: UnitResult,
        table: &mut SymbolTable,
        pending: &mut HashSet<String>,
        sink: &mut Sink,
    ) {
        let pos_text = unit.pos.map(Pos::display).unwrap_or_default();
        match &unit.kind {
            UnitKind::Var { declared, .. } => {
                for (name, def) in &result.values {
                    if name == "_" || declared.is_some() {
                        continue;
                    }
                    if let Some(t) = def {
                        if table.get(SymbolKind::Variable, name).is_some_and(|d| d.is_stub()) {
                            let _ = table.complete(SymbolKind::Variable, name, t.clone());
                        }
                    }
                }
            }
            UnitKind::Const(_) => {
                for (name, def) in &result.values {
                    if name == "_" || !pending.remove(name) {
                        continue;
                    }
                    match def {
                        Some(t) => {
                            let def = SymbolDef::new(name, pkg.path.clone(), t.clone()).at(&pos_text);
                            if let Err(e) = table.add(SymbolKind::Constant, def) {
                                sink.error(name, unit.pos, e);
                            }
                        }
                        None => table.add_unresolved(SymbolKind::Constant, name, &pos_text),
                    }
                }
            }
            UnitKind::Func { .. } => {}
        }

        for def in result.local_types {
            let name = def.name.clone();
            if let Err(e) = table.add(SymbolKind::Type, def) {
                sink.error(&name, unit.pos, e);
            }
        }
        for e in result.errors {
            sink.error(&unit.name, unit.pos, e);
        }
        for w in result.warnings {
            sink.warn(unit.pos, w);
        }
        if let Some(file) = sink.files.get(unit.file).cloned() {
            sink.allocations.file_mut(&file).merge(&result.allocations);
        }
        if matches!(unit.kind, UnitKind::Func { .. }) {
            sink.bodies.push(result.report);
        }
    }

    fn give_up(
        &self,
        pkg: &Package,
        unit: &Unit<'_>,
        symbol: &str,
        table: &mut SymbolTable,
        pending: &mut HashSet<String>,
        sink: &mut Sink,
    ) {
        sink.error(
            &unit.name,
            unit.pos,
            ResolveError::new(
                ErrorKind::UnresolvedSymbol,
                symbol,
                format!("{} depends on {symbol}, which could not be resolved", unit.name),
            ),
        );
        if let UnitKind::Const(group) = &unit.kind {
            let pos_text = unit.pos.map(Pos::display).unwrap_or_default();
            for name in group.specs.iter().flat_map(|s| s.names.iter()) {
                if pending.remove(name) {
                    table.add_unresolved(SymbolKind::Constant, name, &pos_text);
                }
            }
        }
        debug!(target: "symex::driver", package = %pkg.path, unit = %unit.name, "unit left unresolved");
    }

    fn emit(&self, table: &SymbolTable, sink: &mut Sink) -> PackageCatalog {
        let mut catalog = table.to_catalog();
        if self.options.untyped_constants == UntypedConstMode::Default {
            for c in &mut catalog.constants {
                let Some(t) = c.def.as_ref().filter(|t| t.is_untyped()) else {
                    continue;
                };
                let typed = t.defaulted();
                let mut warning = Warning::new(
                    WarningKind::UntypedConstant,
                    &c.name,
                    format!("untyped constant {} emitted as {}", c.name, typed.display()),
                );
                if !c.pos.is_empty() {
                    warning.pos = Some(c.pos.clone());
                }
                sink.warnings.push(warning);
                c.def = Some(typed);
            }
        }
        catalog
    }
}

#[derive(Default)]
struct Collected<'p> {
    types: Vec<(usize, &'p TypeSpec)>,
    values: Vec<(usize, &'p Decl)>,
}

/// Own-package names `t` contains by value.
fn value_refs(t: &Type, own: &str, out: &mut Vec<String>) {
    match t {
        Type::Identifier { package, name } if package == own => out.push(name.clone()),
        Type::Array { element, .. } => value_refs(element, own, out),
        Type::Struct { fields } => {
            for f in fields {
                value_refs(&f.def, own, out);
            }
        }
        _ => {}
    }
}

fn reaches(edges: &HashMap<&str, Vec<String>>, start: &str) -> bool {
    let mut stack: Vec<&str> = edges
        .get(start)
        .map(|v| v.iter().map(String::as_str).collect())
        .unwrap_or_default();
    let mut seen = HashSet::new();
    while let Some(name) = stack.pop() {
        if name == start {
            return true;
        }
        if !seen.insert(name) {
            continue;
        }
        if let Some(next) = edges.get(name) {
            stack.extend(next.iter().map(String::as_str));
        }
    }
    false
}
