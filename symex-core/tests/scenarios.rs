use symex_ast::build::*;
use symex_ast::{BinaryOp, Package};
use symex_core::{ErrorKind, Extraction, PackageDriver, PackageSet, SymbolKind, SymbolTable, Universe};
use symex_types::Type;

fn extract_with(pkg: &Package, deps: &PackageSet) -> Extraction {
    let universe = Universe::default();
    PackageDriver::new(&universe, deps)
        .extract(pkg)
        .expect("extraction should not be fatal")
}

fn extract(pkg: &Package) -> Extraction {
    extract_with(pkg, &PackageSet::new())
}

fn def_of(x: &Extraction, kind: SymbolKind, name: &str) -> Option<Type> {
    x.table.get(kind, name).and_then(|d| d.def.clone())
}

fn local<'a>(x: &'a Extraction, function: &str, name: &str) -> Option<&'a Type> {
    x.bodies
        .iter()
        .find(|b| b.function == function)
        .and_then(|b| b.locals.iter().find(|l| l.name == name))
        .and_then(|l| l.def.as_ref())
}

#[test]
fn named_builtin_and_typed_variable() {
    let pkg = package(
        "p",
        vec![file(
            "p.go",
            vec![],
            vec![type_decl("A", named("int")), var(&["x"], Some(named("A")), vec![int("1")])],
        )],
    );
    let x = extract(&pkg);
    assert!(x.is_clean(), "{:?}", x.errors);
    assert_eq!(def_of(&x, SymbolKind::Type, "A"), Some(Type::builtin("int")));
    assert_eq!(def_of(&x, SymbolKind::Variable, "x"), Some(Type::ident("p", "A")));

    let json = x.catalog.to_json(false).expect("encode");
    assert!(json.contains(r#"{"type":"builtin","name":"int","untyped":false}"#), "{json}");
}

#[test]
fn self_reference_through_pointer_is_not_a_cycle() {
    let next = sel(ident("s"), "next");
    let next_id = next.id;
    let pkg = package(
        "p",
        vec![file(
            "p.go",
            vec![],
            vec![
                type_decl("S", struct_of(vec![field(&["next"], pointer(named("S")))])),
                func(
                    "f",
                    func_type(vec![], vec![]),
                    vec![
                        define(&["s"], vec![composite(Some(named("S")), vec![])]),
                        assign(vec![ident("_")], vec![next]),
                    ],
                ),
            ],
        )],
    );
    let x = extract(&pkg);
    assert!(x.is_clean(), "{:?}", x.errors);

    let s = Type::ident("p", "S");
    match def_of(&x, SymbolKind::Type, "S") {
        Some(Type::Struct { fields }) => {
            assert_eq!(fields.len(), 1);
            assert_eq!(fields[0].name, "next");
            assert_eq!(fields[0].def, Type::pointer(s.clone()));
        }
        other => panic!("unexpected S: {other:?}"),
    }
    assert_eq!(local(&x, "f", "s"), Some(&s));
    let body = x.bodies.iter().find(|b| b.function == "f").expect("body of f");
    assert_eq!(body.expr_types.get(&next_id), Some(&Type::pointer(s)));
}

#[test]
fn function_values_flow_through_variables() {
    let pkg = package(
        "p",
        vec![file(
            "p.go",
            vec![],
            vec![
                // Declared after its use to exercise deferral.
                var(&["h"], None, vec![ident("g")]),
                func(
                    "add",
                    func_type(vec![field(&["a", "b"], named("int"))], types(vec![named("int")])),
                    vec![ret(vec![binary(BinaryOp::Add, ident("a"), ident("b"))])],
                ),
                var(&["g"], None, vec![ident("add")]),
            ],
        )],
    );
    let x = extract(&pkg);
    assert!(x.is_clean(), "{:?}", x.errors);

    let int = Type::builtin("int");
    let sig = Type::function(vec![int.clone(), int.clone()], vec![int]);
    assert_eq!(def_of(&x, SymbolKind::Function, "add"), Some(sig.clone()));
    assert_eq!(def_of(&x, SymbolKind::Variable, "g"), Some(sig.clone()));
    assert_eq!(def_of(&x, SymbolKind::Variable, "h"), Some(sig));
    assert!(x.allocations.total().is_empty());
}

#[test]
fn external_call_records_allocations() {
    let mut q = SymbolTable::new("q");
    q.complete(SymbolKind::Type, "T", Type::structure(vec![]))
        .expect("q.T");
    q.complete(
        SymbolKind::Function,
        "New",
        Type::function(vec![], vec![Type::pointer(Type::ident("q", "T"))]),
    )
    .expect("q.New");
    let mut deps = PackageSet::new();
    deps.insert(q);

    let pkg = package(
        "p",
        vec![file(
            "p.go",
            vec![import("q")],
            vec![var(&["v"], None, vec![call(sel(ident("q"), "New"), vec![])])],
        )],
    );
    let x = extract_with(&pkg, &deps);
    assert!(x.is_clean(), "{:?}", x.errors);
    assert_eq!(
        def_of(&x, SymbolKind::Variable, "v"),
        Some(Type::pointer(Type::ident("q", "T")))
    );
    let file = x.allocations.file("p.go").expect("per-file index");
    assert_eq!(file.count("q", "New"), 1);
    assert_eq!(file.count("q", "T"), 1);
    assert_eq!(file.len(), 2);
}

#[test]
fn pointer_receiver_satisfies_interface_through_address() {
    let pkg = package(
        "p",
        vec![file(
            "p.go",
            vec![],
            vec![
                type_decl(
                    "I",
                    interface_of(vec![method_elem("M", func_type(vec![], types(vec![named("int")])))]),
                ),
                type_decl("T", struct_of(vec![])),
                method(
                    field(&["t"], pointer(named("T"))),
                    "M",
                    func_type(vec![], types(vec![named("int")])),
                    vec![ret(vec![int("0")])],
                ),
                var(&["_"], Some(named("I")), vec![addr(composite(Some(named("T")), vec![]))]),
            ],
        )],
    );
    let x = extract(&pkg);
    assert!(x.is_clean(), "{:?}", x.errors);
    assert!(x.table.lookup_method("T", "M").is_some());
    assert!(x.table.get(SymbolKind::Variable, "_").is_none());
}

#[test]
fn promoted_method_through_embedding() {
    let pkg = package(
        "p",
        vec![file(
            "p.go",
            vec![],
            vec![
                type_decl("A", struct_of(vec![embedded(named("B"))])),
                type_decl("B", struct_of(vec![])),
                method(field(&["b"], pointer(named("B"))), "F", func_type(vec![], vec![]), vec![]),
                func(
                    "g",
                    func_type(vec![], vec![]),
                    vec![expr_stmt(call(
                        sel(paren(addr(composite(Some(named("A")), vec![]))), "F"),
                        vec![],
                    ))],
                ),
            ],
        )],
    );
    let x = extract(&pkg);
    assert!(x.is_clean(), "{:?}", x.errors);
}

#[test]
fn value_cycle_is_rejected_and_left_unset() {
    let pkg = package(
        "p",
        vec![file(
            "p.go",
            vec![],
            vec![
                type_decl("A", struct_of(vec![field(&["b"], named("B"))])),
                type_decl("B", struct_of(vec![field(&["a"], array_of(int("2"), named("A")))])),
                type_decl("C", struct_of(vec![field(&["next"], slice_of(named("C")))])),
            ],
        )],
    );
    let x = extract(&pkg);
    let cyclic: Vec<&str> = x
        .errors
        .iter()
        .filter(|e| e.error.kind == ErrorKind::CyclicType)
        .map(|e| e.declaration.as_str())
        .collect();
    assert_eq!(cyclic, vec!["A", "B"]);
    assert_eq!(def_of(&x, SymbolKind::Type, "A"), None);
    assert!(def_of(&x, SymbolKind::Type, "C").is_some());
    assert_eq!(x.catalog.incomplete(), 2);
}
