//! Type relations that need the symbol tables: underlying types, identity,
//! assignability, method sets and member selection.

use std::collections::{BTreeMap, HashMap, HashSet};

use symex_types::{canonical_order, FunctionType, SymbolDef, Type};

use crate::builtin::{is_placeholder, Universe};
use crate::error::{ErrorKind, ResolveError};
use crate::table::{SymbolKind, SymbolTable};

const MAX_NAMED_CHAIN: usize = 64;
const MAX_EMBED_DEPTH: usize = 32;

/// Source of dependency symbol tables.
pub trait PackageProvider: Send + Sync {
    fn package(&self, path: &str) -> Option<&SymbolTable>;
}

/// In-memory provider keyed by package path.
#[derive(Clone, Debug, Default)]
pub struct PackageSet {
    tables: HashMap<String, SymbolTable>,
}

impl PackageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: SymbolTable) {
        self.tables.insert(table.package().to_string(), table);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.tables.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl PackageProvider for PackageSet {
    fn package(&self, path: &str) -> Option<&SymbolTable> {
        self.tables.get(path)
    }
}

/// Coarse classification of basic types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Family {
    Integer,
    Rune,
    Float,
    Complex,
    String,
    Bool,
}

impl Family {
    pub fn is_numeric(self) -> bool {
        matches!(self, Family::Integer | Family::Rune | Family::Float | Family::Complex)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Family::Integer | Family::Rune)
    }
}

/// Family of a builtin type name. Untyped families are named after their
/// default type, so `rune` only yields [`Family::Rune`] when untyped.
pub fn builtin_family(name: &str, untyped: bool) -> Option<Family> {
    match name {
        "rune" if untyped => Some(Family::Rune),
        "int" | "int8" | "int16" | "int32" | "int64" | "uint" | "uint8" | "uint16" | "uint32"
        | "uint64" | "uintptr" | "byte" | "rune" => Some(Family::Integer),
        "float32" | "float64" => Some(Family::Float),
        "complex64" | "complex128" => Some(Family::Complex),
        "string" => Some(Family::String),
        "bool" => Some(Family::Bool),
        _ => None,
    }
}

/// Untyped family type named after its default type.
pub fn untyped_of(family: Family) -> Type {
    Type::untyped(match family {
        Family::Integer => "int",
        Family::Rune => "rune",
        Family::Float => "float64",
        Family::Complex => "complex128",
        Family::String => "string",
        Family::Bool => "bool",
    })
}

fn canonical_builtin(name: &str) -> &str {
    match name {
        "byte" => "uint8",
        "rune" => "int32",
        other => other,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Method,
}

/// Result of resolving `x.item` against the type of `x`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub kind: MemberKind,
    pub ty: Type,
    /// Named type the member was found on.
    pub owner: Option<(String, String)>,
    pub depth: usize,
    pub pointer_receiver: bool,
}

/// A method visible through a method set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodEntry {
    pub signature: FunctionType,
    pub depth: usize,
}

pub type MethodSet = BTreeMap<String, MethodEntry>;

pub struct TypeEnv<'a> {
    pub package: &'a str,
    pub table: &'a SymbolTable,
    pub universe: &'a Universe,
    pub deps: &'a dyn PackageProvider,
    /// Function-local types not yet published to `table`.
    pub local_types: &'a [SymbolDef],
}

impl<'a> TypeEnv<'a> {
    pub fn new(
        package: &'a str,
        table: &'a SymbolTable,
        universe: &'a Universe,
        deps: &'a dyn PackageProvider,
    ) -> Self {
        Self {
            package,
            table,
            universe,
            deps,
            local_types: &[],
        }
    }

    pub fn with_local_types(mut self, local_types: &'a [SymbolDef]) -> Self {
        self.local_types = local_types;
        self
    }

    pub fn package_table(&self, path: &str) -> Option<&'a SymbolTable> {
        if path == self.package {
            Some(self.table)
        } else if path.is_empty() {
            Some(self.universe.table())
        } else {
            self.universe.package(path).or_else(|| self.deps.package(path))
        }
    }

    /// Definition of the named type `package.name`.
    pub fn named_def(&self, package: &str, name: &str) -> Result<Type, ResolveError> {
        if package == self.package {
            if let Some(local) = self.local_types.iter().find(|d| d.name == name) {
                return local.def.clone().ok_or_else(|| incomplete(package, name));
            }
        }
        let table = self.package_table(package).ok_or_else(|| {
            ResolveError::new(
                ErrorKind::NotFound,
                name,
                format!("no symbol table for package `{package}`"),
            )
        })?;
        let def = table.lookup_in_kind(name, SymbolKind::Type)?;
        def.def.clone().ok_or_else(|| incomplete(package, name))
    }

    /// Strip names until a structural type is reached.
    pub fn underlying(&self, t: &Type) -> Result<Type, ResolveError> {
        let mut current = t.clone();
        for _ in 0..MAX_NAMED_CHAIN {
            match &current {
                Type::Identifier { .. } if is_placeholder(&current) => return Ok(current),
                Type::Identifier { package, name } => {
                    current = self.named_def(package, name)?;
                }
                Type::Builtin {
                    name,
                    untyped: false,
                } if name == "error" => return Ok(Universe::error_interface()),
                _ => return Ok(current),
            }
        }
        Err(ResolveError::new(
            ErrorKind::CyclicType,
            t.display(),
            format!("invalid recursive type {}", t.display()),
        ))
    }

    /// Family of the underlying basic type, if any.
    pub fn family(&self, t: &Type) -> Result<Option<Family>, ResolveError> {
        Ok(match self.underlying(t)? {
            Type::Builtin { name, untyped } => builtin_family(&name, untyped),
            _ => None,
        })
    }

    /// Structural identity; `byte`/`uint8` and `rune`/`int32` are the same type.
    pub fn identical(&self, a: &Type, b: &Type) -> bool {
        match (a, b) {
            (
                Type::Builtin { name: x, untyped: ux },
                Type::Builtin { name: y, untyped: uy },
            ) => ux == uy && (x == y || (!ux && canonical_builtin(x) == canonical_builtin(y))),
            (Type::Pointer { target: x }, Type::Pointer { target: y }) => self.identical(x, y),
            (
                Type::Array { element: x, length: lx },
                Type::Array { element: y, length: ly },
            ) => (lx.is_none() || ly.is_none() || lx == ly) && self.identical(x, y),
            (Type::Slice { element: x }, Type::Slice { element: y })
            | (Type::Ellipsis { element: x }, Type::Ellipsis { element: y }) => self.identical(x, y),
            (Type::Map { key: kx, value: vx }, Type::Map { key: ky, value: vy }) => {
                self.identical(kx, ky) && self.identical(vx, vy)
            }
            (Type::Channel { dir: dx, value: x }, Type::Channel { dir: dy, value: y }) => {
                dx == dy && self.identical(x, y)
            }
            (Type::Function(f), Type::Function(g)) => self.identical_signatures(f, g),
            (
                Type::Method { receiver: rx, def: f },
                Type::Method { receiver: ry, def: g },
            ) => self.identical(rx, ry) && self.identical_signatures(f, g),
            (Type::Struct { fields: fx }, Type::Struct { fields: fy }) => {
                fx.len() == fy.len()
                    && fx.iter().zip(fy).all(|(x, y)| {
                        x.name == y.name && x.tag == y.tag && self.identical(&x.def, &y.def)
                    })
            }
            (Type::Interface { methods: mx }, Type::Interface { methods: my }) => {
                mx.len() == my.len()
                    && canonical_order(mx).into_iter().zip(canonical_order(my)).all(|(x, y)| {
                        x.name == y.name && x.package == y.package && self.identical(&x.def, &y.def)
                    })
            }
            _ => a == b,
        }
    }

    pub fn identical_signatures(&self, f: &FunctionType, g: &FunctionType) -> bool {
        f.variadic == g.variadic
            && f.params.len() == g.params.len()
            && f.results.len() == g.results.len()
            && f.params.iter().zip(&g.params).all(|(x, y)| self.identical(x, y))
            && f.results.iter().zip(&g.results).all(|(x, y)| self.identical(x, y))
    }

    /// Defined (named) types: identifiers and typed predeclared types.
    fn is_defined(t: &Type) -> bool {
        matches!(t, Type::Identifier { .. } | Type::Builtin { untyped: false, .. })
    }

    /// Whether a value of type `value` may be assigned to a slot of type `target`.
    pub fn assignable(&self, value: &Type, target: &Type) -> Result<bool, ResolveError> {
        if self.identical(value, target) || is_placeholder(target) || is_placeholder(value) {
            return Ok(true);
        }
        let tu = self.underlying(target)?;
        match value {
            Type::Nil => {
                return Ok(matches!(
                    tu,
                    Type::Pointer { .. }
                        | Type::Slice { .. }
                        | Type::Map { .. }
                        | Type::Channel { .. }
                        | Type::Function(_)
                        | Type::Interface { .. }
                ));
            }
            Type::Builtin {
                name,
                untyped: true,
            } => {
                return match &tu {
                    Type::Interface { .. } => self.implements(&value.defaulted(), &tu),
                    Type::Builtin { name: tn, untyped } => {
                        let from = builtin_family(name, true);
                        let to = builtin_family(tn, *untyped);
                        Ok(match (from, to) {
                            (Some(f), Some(t)) if f.is_numeric() => t.is_numeric(),
                            (Some(f), Some(t)) => f == t,
                            _ => false,
                        })
                    }
                    _ => Ok(false),
                };
            }
            _ => {}
        }
        let vu = self.underlying(value)?;
        let one_unnamed = !Self::is_defined(value) || !Self::is_defined(target);
        if one_unnamed && self.identical(&vu, &tu) {
            return Ok(true);
        }
        if let (
            Type::Channel {
                dir: symex_types::ChanDir::Bidir,
                value: ve,
            },
            Type::Channel { value: te, .. },
        ) = (&vu, &tu)
        {
            if one_unnamed && self.identical(ve, te) {
                return Ok(true);
            }
        }
        if matches!(tu, Type::Interface { .. }) {
            return self.implements(value, &tu);
        }
        Ok(false)
    }

    /// `t` implements the interface `iface` when its method set covers the
    /// interface's methods with identical signatures.
    pub fn implements(&self, t: &Type, iface: &Type) -> Result<bool, ResolveError> {
        let wanted = self.interface_methods(iface)?;
        if wanted.is_empty() {
            return Ok(true);
        }
        let have = self.method_set(t)?;
        Ok(wanted.iter().all(|(name, sig)| {
            have.get(name)
                .is_some_and(|m| self.identical_signatures(&m.signature, sig))
        }))
    }

    /// Flattened methods of an interface type (embedded interfaces expanded).
    pub fn interface_methods(&self, iface: &Type) -> Result<BTreeMap<String, FunctionType>, ResolveError> {
        let mut out = BTreeMap::new();
        self.collect_interface(iface, &mut out, 0)?;
        Ok(out)
    }

    fn collect_interface(
        &self,
        t: &Type,
        out: &mut BTreeMap<String, FunctionType>,
        depth: usize,
    ) -> Result<(), ResolveError> {
        if depth > MAX_EMBED_DEPTH {
            return Err(ResolveError::new(
                ErrorKind::CyclicType,
                t.display(),
                format!("invalid recursive interface {}", t.display()),
            ));
        }
        let Type::Interface { methods } = self.underlying(t)? else {
            return Err(ResolveError::new(
                ErrorKind::KindMismatch,
                t.display(),
                format!("{} is not an interface", t.display()),
            ));
        };
        for m in &methods {
            if m.is_embedded() {
                self.collect_interface(&m.def, out, depth + 1)?;
            } else if let Some(sig) = m.def.signature() {
                out.insert(m.name.clone(), sig.clone());
            }
        }
        Ok(())
    }

    /// Methods declared directly on the named type `package.name`.
    fn declared_methods(&self, package: &str, name: &str) -> Vec<(String, FunctionType, bool)> {
        let Some(table) = self.package_table(package) else {
            return Vec::new();
        };
        table
            .methods_of(name)
            .filter_map(|d| match &d.def {
                Some(Type::Method { receiver, def }) => {
                    let method = d.name.rsplit_once('.').map_or(d.name.as_str(), |(_, m)| m);
                    Some((
                        method.to_string(),
                        def.clone(),
                        matches!(receiver.as_ref(), Type::Pointer { .. }),
                    ))
                }
                _ => None,
            })
            .collect()
    }

    /// Method set of `t`. For `*T` it includes pointer-receiver methods of `T`;
    /// promoted methods of embedded fields are added level by level, shallower
    /// names shadowing deeper ones and equal-depth collisions cancelling out.
    pub fn method_set(&self, t: &Type) -> Result<MethodSet, ResolveError> {
        if let Type::Interface { .. } = self.underlying(t)? {
            return Ok(self
                .interface_methods(t)?
                .into_iter()
                .map(|(name, signature)| (name, MethodEntry { signature, depth: 0 }))
                .collect());
        }
        let (base, pointer) = match t {
            Type::Pointer { target } => ((**target).clone(), true),
            other => (other.clone(), false),
        };
        let mut set = MethodSet::new();
        let mut blocked: HashSet<String> = HashSet::new();
        let mut visited: HashSet<(String, String)> = HashSet::new();
        let mut level = vec![(base, pointer)];
        for depth in 0..MAX_EMBED_DEPTH {
            if level.is_empty() {
                break;
            }
            let mut found: BTreeMap<String, (FunctionType, usize)> = BTreeMap::new();
            let mut fields: HashSet<String> = HashSet::new();
            let mut reached = Vec::new();
            let mut next = Vec::new();
            for (ty, via_pointer) in &level {
                if let Type::Identifier { package, name } = ty {
                    if visited.contains(&(package.clone(), name.clone())) {
                        continue;
                    }
                    reached.push((package.clone(), name.clone()));
                    for (method, sig, pointer_receiver) in self.declared_methods(package, name) {
                        if !pointer_receiver || *via_pointer {
                            found.entry(method).or_insert((sig, 0)).1 += 1;
                        }
                    }
                }
                match self.underlying(ty)? {
                    Type::Struct { fields: fs } => {
                        for f in &fs {
                            if let Some(n) = f.selector_name() {
                                fields.insert(n.to_string());
                            }
                            if f.is_embedded() {
                                match &f.def {
                                    Type::Pointer { target } => next.push(((**target).clone(), true)),
                                    other => next.push((other.clone(), *via_pointer)),
                                }
                            }
                        }
                    }
                    iface @ Type::Interface { .. } if depth > 0 => {
                        for (method, sig) in self.interface_methods(&iface)? {
                            found.entry(method).or_insert((sig, 0)).1 += 1;
                        }
                    }
                    _ => {}
                }
            }
            for (name, (signature, count)) in found {
                if set.contains_key(&name) || blocked.contains(&name) {
                    continue;
                }
                if count == 1 {
                    set.insert(name, MethodEntry { signature, depth });
                } else {
                    blocked.insert(name);
                }
            }
            blocked.extend(fields);
            visited.extend(reached);
            level = next;
        }
        Ok(set)
    }

    /// Resolve `x.item` for a value of type `t`, breadth-first over embedded
    /// fields. Both receiver kinds are accepted, as for addressable operands.
    /// A type embedded along two paths at one depth makes its members ambiguous.
    pub fn select(&self, t: &Type, item: &str) -> Result<Selection, ResolveError> {
        let base = match t {
            Type::Pointer { target } => (**target).clone(),
            other => other.clone(),
        };
        let mut visited: HashSet<(String, String)> = HashSet::new();
        let mut level = vec![base];
        for depth in 0..MAX_EMBED_DEPTH {
            if level.is_empty() {
                break;
            }
            let mut found: Vec<Selection> = Vec::new();
            let mut reached = Vec::new();
            let mut next = Vec::new();
            for ty in &level {
                let owner = match ty {
                    Type::Identifier { package, name } => {
                        if visited.contains(&(package.clone(), name.clone())) {
                            continue;
                        }
                        reached.push((package.clone(), name.clone()));
                        for (method, sig, pointer_receiver) in self.declared_methods(package, name) {
                            if method == item {
                                found.push(Selection {
                                    kind: MemberKind::Method,
                                    ty: Type::Function(sig),
                                    owner: Some((package.clone(), name.clone())),
                                    depth,
                                    pointer_receiver,
                                });
                            }
                        }
                        Some((package.clone(), name.clone()))
                    }
                    _ => None,
                };
                match self.underlying(ty)? {
                    Type::Struct { fields } => {
                        for f in &fields {
                            if f.selector_name() == Some(item) {
                                found.push(Selection {
                                    kind: MemberKind::Field,
                                    ty: f.def.clone(),
                                    owner: owner.clone(),
                                    depth,
                                    pointer_receiver: false,
                                });
                            }
                            if f.is_embedded() {
                                next.push(match &f.def {
                                    Type::Pointer { target } => (**target).clone(),
                                    other => other.clone(),
                                });
                            }
                        }
                    }
                    iface @ Type::Interface { .. } => {
                        if let Some(sig) = self.interface_methods(&iface)?.remove(item) {
                            found.push(Selection {
                                kind: MemberKind::Method,
                                ty: Type::Function(sig),
                                owner: owner.clone(),
                                depth,
                                pointer_receiver: false,
                            });
                        }
                    }
                    _ => {}
                }
            }
            visited.extend(reached);
            match found.len() {
                0 => level = next,
                1 => return Ok(found.remove(0)),
                _ => {
                    return Err(ResolveError::new(
                        ErrorKind::AmbiguousSelector,
                        item,
                        format!("ambiguous selector {}.{item}", t.display()),
                    ));
                }
            }
        }
        Err(ResolveError::new(
            ErrorKind::NotFound,
            item,
            format!("{} has no field or method {item}", t.display()),
        ))
    }
}

fn incomplete(package: &str, name: &str) -> ResolveError {
    ResolveError::new(
        ErrorKind::UnresolvedSymbol,
        name,
        format!("type {} has no resolved definition", Type::ident(package, name).display()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use symex_types::StructField;

    fn table() -> SymbolTable {
        let mut t = SymbolTable::new("p");
        t.complete(SymbolKind::Type, "A", Type::builtin("int")).expect("A");
        t.complete(SymbolKind::Type, "B", Type::ident("p", "A")).expect("B");
        t
    }

    #[test]
    fn underlying_follows_name_chains() {
        let t = table();
        let u = Universe::default();
        let deps = PackageSet::new();
        let env = TypeEnv::new("p", &t, &u, &deps);
        assert_eq!(env.underlying(&Type::ident("p", "B")).expect("B"), Type::builtin("int"));
        assert!(env.underlying(&Type::ident("p", "Z")).is_err());
    }

    #[test]
    fn alias_spellings_are_identical() {
        let t = table();
        let u = Universe::default();
        let deps = PackageSet::new();
        let env = TypeEnv::new("p", &t, &u, &deps);
        assert!(env.identical(&Type::slice(Type::builtin("byte")), &Type::slice(Type::builtin("uint8"))));
        assert!(!env.identical(&Type::builtin("int"), &Type::builtin("int32")));
    }

    #[test]
    fn assignability_rules() {
        let mut t = table();
        t.complete(
            SymbolKind::Type,
            "S",
            Type::structure(vec![StructField::new("x", Type::builtin("int"))]),
        )
        .expect("S");
        let u = Universe::default();
        let deps = PackageSet::new();
        let env = TypeEnv::new("p", &t, &u, &deps);
        let a = Type::ident("p", "A");
        assert!(env.assignable(&Type::untyped("int"), &a).expect("untyped"));
        assert!(!env.assignable(&Type::builtin("int"), &a).expect("named"));
        assert!(!env.assignable(&Type::untyped("string"), &a).expect("family"));
        assert!(env.assignable(&Type::Nil, &Type::slice(a.clone())).expect("nil"));
        assert!(!env.assignable(&Type::Nil, &a).expect("nil int"));
        let anon = Type::structure(vec![StructField::new("x", Type::builtin("int"))]);
        assert!(env.assignable(&anon, &Type::ident("p", "S")).expect("unnamed side"));
        assert!(env
            .assignable(&Type::builtin("int"), &Type::empty_interface())
            .expect("empty interface"));
    }
}
