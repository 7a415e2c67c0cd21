use symex_ast::build::*;
use symex_ast::{BinaryOp, Block, Package, Stmt, TypeCaseClause};
use symex_core::{
    DriverOptions, ErrorKind, Extraction, LocalBinding, PackageDriver, PackageSet, SymbolKind, Universe,
    UntypedConstMode, WarningKind,
};
use symex_types::Type;

fn run(pkg: &Package, options: DriverOptions) -> Extraction {
    let universe = Universe::default();
    let deps = PackageSet::new();
    PackageDriver::with_options(&universe, &deps, options)
        .extract(pkg)
        .expect("extraction should not be fatal")
}

fn single(decls: Vec<symex_ast::Decl>) -> Package {
    package("p", vec![file("p.go", vec![], decls)])
}

fn locals<'a>(x: &'a Extraction, function: &str, name: &str) -> Vec<&'a LocalBinding> {
    x.bodies
        .iter()
        .filter(|b| b.function == function)
        .flat_map(|b| b.locals.iter())
        .filter(|l| l.name == name)
        .collect()
}

fn kinds(x: &Extraction) -> Vec<ErrorKind> {
    x.errors.iter().map(|e| e.error.kind).collect()
}

#[test]
fn inner_block_shadows_and_then_vanishes() {
    let pkg = single(vec![func(
        "f",
        func_type(vec![], vec![]),
        vec![
            define(&["x"], vec![int("1")]),
            Stmt::Block(Block::new(vec![
                define(&["x"], vec![string("\"s\"")]),
                assign(vec![ident("_")], vec![ident("x")]),
            ])),
            define(&["y"], vec![ident("x")]),
        ],
    )]);
    let x = run(&pkg, DriverOptions::default());
    assert!(x.is_clean(), "{:?}", x.errors);

    let xs = locals(&x, "f", "x");
    assert_eq!(xs.len(), 2);
    assert_eq!(xs[0].def, Some(Type::builtin("int")));
    assert_eq!(xs[1].def, Some(Type::builtin("string")));
    assert!(xs[1].depth > xs[0].depth);

    let y = locals(&x, "f", "y");
    assert_eq!(y[0].def, Some(Type::builtin("int")));
    assert_eq!(y[0].depth, xs[0].depth);
}

#[test]
fn name_is_gone_after_its_block() {
    let pkg = single(vec![func(
        "g",
        func_type(vec![], vec![]),
        vec![
            Stmt::Block(Block::new(vec![
                define(&["z"], vec![int("1")]),
                assign(vec![ident("_")], vec![ident("z")]),
            ])),
            assign(vec![ident("_")], vec![ident("z")]),
        ],
    )]);
    let x = run(&pkg, DriverOptions::default());
    assert_eq!(kinds(&x), vec![ErrorKind::NotFound]);
    assert_eq!(x.errors[0].declaration, "g");
    assert!(x.errors[0].error.message.contains('z'), "{}", x.errors[0].error.message);
}

#[test]
fn type_switch_binds_per_clause() {
    let pkg = single(vec![func(
        "f",
        func_type(vec![field(&["v"], named("any"))], vec![]),
        vec![Stmt::TypeSwitch {
            init: None,
            bind: Some("t".to_string()),
            x: assert_type_guard(ident("v")),
            clauses: vec![
                TypeCaseClause {
                    types: vec![named("int")],
                    body: vec![assign(vec![ident("_")], vec![binary(BinaryOp::Add, ident("t"), int("1"))])],
                },
                TypeCaseClause {
                    types: vec![named("string"), named("error")],
                    body: vec![assign(vec![ident("_")], vec![ident("t")])],
                },
            ],
        }],
    )]);
    let x = run(&pkg, DriverOptions::default());
    assert!(x.is_clean(), "{:?}", x.errors);

    let ts = locals(&x, "f", "t");
    assert_eq!(ts.len(), 2);
    assert_eq!(ts[0].def, Some(Type::builtin("int")));
    assert_eq!(ts[1].def, Some(Type::empty_interface()));
}

fn assert_type_guard(x: symex_ast::Expr) -> symex_ast::Expr {
    let mut e = ident("_");
    e.kind = symex_ast::ExprKind::TypeAssert {
        x: Box::new(x),
        ty: None,
    };
    e
}

#[test]
fn comma_ok_index_yields_bool() {
    let pkg = single(vec![func(
        "f",
        func_type(vec![field(&["m"], map_of(named("string"), named("int")))], vec![]),
        vec![
            define(&["v", "ok"], vec![index(ident("m"), string("\"a\""))]),
            assign(vec![ident("_"), ident("_")], vec![ident("v"), ident("ok")]),
        ],
    )]);
    let x = run(&pkg, DriverOptions::default());
    assert!(x.is_clean(), "{:?}", x.errors);
    assert_eq!(locals(&x, "f", "v")[0].def, Some(Type::builtin("int")));
    assert_eq!(locals(&x, "f", "ok")[0].def, Some(Type::builtin("bool")));
}

#[test]
fn range_variables_follow_the_container() {
    let pkg = single(vec![func(
        "f",
        func_type(
            vec![
                field(&["s"], named("string")),
                field(&["xs"], slice_of(named("float64"))),
                field(&["m"], map_of(named("string"), named("bool"))),
            ],
            vec![],
        ),
        vec![
            range(Some("i"), Some("r"), ident("s"), vec![]),
            range(Some("_"), Some("e"), ident("xs"), vec![]),
            range(Some("k"), Some("b"), ident("m"), vec![]),
        ],
    )]);
    let x = run(&pkg, DriverOptions::default());
    assert!(x.is_clean(), "{:?}", x.errors);
    let def = |n: &str| locals(&x, "f", n)[0].def.clone();
    assert_eq!(def("i"), Some(Type::builtin("int")));
    assert_eq!(def("r"), Some(Type::builtin("rune")));
    assert_eq!(def("e"), Some(Type::builtin("float64")));
    assert_eq!(def("k"), Some(Type::builtin("string")));
    assert_eq!(def("b"), Some(Type::builtin("bool")));
    assert!(locals(&x, "f", "_").is_empty());
}

#[test]
fn selector_found_twice_at_one_depth_is_ambiguous() {
    let pkg = single(vec![
        type_decl("B", struct_of(vec![])),
        type_decl("C", struct_of(vec![])),
        method(field(&["b"], named("B")), "M", func_type(vec![], vec![]), vec![]),
        method(field(&["c"], named("C")), "M", func_type(vec![], vec![]), vec![]),
        type_decl("A", struct_of(vec![embedded(named("B")), embedded(named("C"))])),
        func(
            "f",
            func_type(vec![field(&["a"], named("A"))], vec![]),
            vec![expr_stmt(call(sel(ident("a"), "M"), vec![]))],
        ),
    ]);
    let x = run(&pkg, DriverOptions::default());
    assert_eq!(kinds(&x), vec![ErrorKind::AmbiguousSelector]);
    assert_eq!(x.errors[0].declaration, "f");
}

#[test]
fn type_embedded_along_two_paths_is_ambiguous() {
    let pkg = single(vec![
        type_decl("D", struct_of(vec![field(&["x"], named("int"))])),
        method(field(&["d"], named("D")), "M", func_type(vec![], vec![]), vec![]),
        type_decl("B", struct_of(vec![embedded(named("D"))])),
        type_decl("C", struct_of(vec![embedded(named("D"))])),
        type_decl("A", struct_of(vec![embedded(named("B")), embedded(named("C"))])),
        type_decl("E", struct_of(vec![embedded(named("B"))])),
        func(
            "diamond",
            func_type(vec![field(&["a"], named("A"))], vec![]),
            vec![
                expr_stmt(call(sel(ident("a"), "M"), vec![])),
                assign(vec![ident("_")], vec![sel(ident("a"), "x")]),
            ],
        ),
        func(
            "chain",
            func_type(vec![field(&["e"], named("E"))], vec![]),
            vec![
                expr_stmt(call(sel(ident("e"), "M"), vec![])),
                assign(vec![ident("_")], vec![sel(ident("e"), "x")]),
            ],
        ),
    ]);
    let x = run(&pkg, DriverOptions::default());
    assert_eq!(
        kinds(&x),
        vec![ErrorKind::AmbiguousSelector, ErrorKind::AmbiguousSelector]
    );
    assert!(x.errors.iter().all(|e| e.declaration == "diamond"), "{:?}", x.errors);
}

#[test]
fn variadic_signature_without_parameters_accepts_any_call() {
    let mut q = symex_core::SymbolTable::new("example.com/q");
    q.complete(
        SymbolKind::Function,
        "F",
        Type::Function(symex_types::FunctionType {
            params: vec![],
            results: vec![],
            variadic: true,
        }),
    )
    .expect("F");
    let mut deps = PackageSet::new();
    deps.insert(q);

    let pkg = package(
        "p",
        vec![file(
            "p.go",
            vec![import("example.com/q")],
            vec![func(
                "f",
                func_type(vec![], vec![]),
                vec![
                    expr_stmt(call(sel(ident("q"), "F"), vec![])),
                    expr_stmt(call(sel(ident("q"), "F"), vec![int("1")])),
                ],
            )],
        )],
    );
    let universe = Universe::default();
    let x = PackageDriver::new(&universe, &deps)
        .extract(&pkg)
        .expect("extraction should not be fatal");
    assert!(x.is_clean(), "{:?}", x.errors);
}

#[test]
fn multi_value_call_in_single_value_context() {
    let pkg = single(vec![
        func(
            "two",
            func_type(vec![], types(vec![named("int"), named("int")])),
            vec![ret(vec![int("1"), int("2")])],
        ),
        var(&["a"], None, vec![call(ident("two"), vec![])]),
        var(&["b", "c"], None, vec![call(ident("two"), vec![])]),
    ]);
    let x = run(&pkg, DriverOptions::default());
    assert_eq!(kinds(&x), vec![ErrorKind::ArityMismatch]);
    assert_eq!(x.errors[0].declaration, "a");
    assert!(x.table.get(SymbolKind::Variable, "a").and_then(|d| d.def.clone()).is_none());
    let int = Some(Type::builtin("int"));
    assert_eq!(x.table.get(SymbolKind::Variable, "b").and_then(|d| d.def.clone()), int);
    assert_eq!(x.table.get(SymbolKind::Variable, "c").and_then(|d| d.def.clone()), int);
}

#[test]
fn mismatched_initializer_is_reported() {
    let pkg = single(vec![var(&["s"], Some(named("string")), vec![int("1")])]);
    let x = run(&pkg, DriverOptions::default());
    assert_eq!(kinds(&x), vec![ErrorKind::IncompatibleTypes]);
}

#[test]
fn mutual_value_dependency_is_unresolved() {
    let pkg = single(vec![
        var(&["a"], None, vec![ident("b")]),
        var(&["b"], None, vec![ident("a")]),
        var(&["ok"], None, vec![int("3")]),
    ]);
    let x = run(&pkg, DriverOptions::default());
    let unresolved: Vec<&str> = x
        .errors
        .iter()
        .filter(|e| e.error.kind == ErrorKind::UnresolvedSymbol)
        .map(|e| e.declaration.as_str())
        .collect();
    assert_eq!(unresolved, vec!["a", "b"]);
    assert_eq!(x.catalog.incomplete(), 2);
    assert_eq!(
        x.table.get(SymbolKind::Variable, "ok").and_then(|d| d.def.clone()),
        Some(Type::builtin("int"))
    );
}

#[test]
fn duplicate_declaration_keeps_the_first() {
    let pkg = single(vec![
        var(&["x"], Some(named("int")), vec![]),
        var(&["x"], Some(named("string")), vec![]),
    ]);
    let x = run(&pkg, DriverOptions::default());
    assert_eq!(kinds(&x), vec![ErrorKind::DuplicateSymbol]);
    assert_eq!(
        x.table.get(SymbolKind::Variable, "x").and_then(|d| d.def.clone()),
        Some(Type::builtin("int"))
    );
}

fn iota_group() -> Package {
    single(vec![const_group(vec![
        value_spec(&["A"], None, vec![ident("iota")]),
        value_spec(&["B"], None, vec![]),
        value_spec(&["K"], Some(named("uint8")), vec![int("3")]),
        value_spec(&["S"], None, vec![string("\"x\"")]),
    ])])
}

#[test]
fn untyped_constants_are_preserved_by_default() {
    let x = run(&iota_group(), DriverOptions::default());
    assert!(x.is_clean(), "{:?}", x.errors);
    let def = |n: &str| x.table.get(SymbolKind::Constant, n).and_then(|d| d.def.clone());
    assert_eq!(def("A"), Some(Type::untyped("int")));
    assert_eq!(def("B"), Some(Type::untyped("int")));
    assert_eq!(def("K"), Some(Type::builtin("uint8")));
    assert_eq!(def("S"), Some(Type::untyped("string")));
    assert!(x.warnings.is_empty());
}

#[test]
fn default_mode_types_constants_and_warns() {
    let options = DriverOptions {
        untyped_constants: UntypedConstMode::Default,
    };
    let x = run(&iota_group(), options);
    assert!(x.is_clean(), "{:?}", x.errors);

    let json = x.catalog.to_json(false).expect("encode");
    assert!(!json.contains(r#""untyped":true"#), "{json}");

    let warned: Vec<&str> = x
        .warnings
        .iter()
        .filter(|w| w.kind == WarningKind::UntypedConstant)
        .map(|w| w.symbol.as_str())
        .collect();
    assert_eq!(warned.len(), 3);
    assert!(!warned.contains(&"K"));
}

#[test]
fn iota_outside_a_constant_is_not_found() {
    let pkg = single(vec![var(&["v"], None, vec![ident("iota")])]);
    let x = run(&pkg, DriverOptions::default());
    assert_eq!(kinds(&x), vec![ErrorKind::NotFound]);
}

#[test]
fn local_types_get_virtual_names() {
    let pkg = single(vec![func(
        "f",
        func_type(vec![], vec![]),
        vec![
            Stmt::Decl(symex_ast::LocalDecl::Type(symex_ast::TypeSpec {
                name: "point".to_string(),
                ty: struct_of(vec![field(&["x"], named("int"))]),
                alias: false,
                pos: None,
            })),
            define(&["p"], vec![composite(Some(named("point")), vec![keyed(ident("x"), int("1"))])]),
            assign(vec![ident("_")], vec![sel(ident("p"), "x")]),
        ],
    )]);
    let x = run(&pkg, DriverOptions::default());
    assert!(x.is_clean(), "{:?}", x.errors);

    let virtual_name = x
        .table
        .defs(SymbolKind::Type)
        .iter()
        .map(|d| d.name.clone())
        .find(|n| n.starts_with("virtual#"))
        .expect("local type recorded");
    assert!(virtual_name.ends_with("#point"), "{virtual_name}");
    assert_eq!(
        locals(&x, "f", "p")[0].def,
        Some(Type::ident("p", &virtual_name))
    );
}

#[test]
fn missing_dependency_is_fatal() {
    let pkg = package("p", vec![file("p.go", vec![import("nowhere/q")], vec![])]);
    let universe = Universe::default();
    let deps = PackageSet::new();
    let err = PackageDriver::new(&universe, &deps)
        .extract(&pkg)
        .expect_err("unknown import");
    assert!(matches!(err, symex_core::FatalError::MissingDependency(ref p) if p == "nowhere/q"), "{err}");
}

#[test]
fn extraction_is_deterministic() {
    let pkg = single(vec![
        var(&["h"], None, vec![ident("g")]),
        var(&["g"], None, vec![binary(BinaryOp::Mul, int("2"), float("1.5"))]),
        type_decl("T", struct_of(vec![field(&["a", "b"], named("int"))])),
        func(
            "f",
            func_type(vec![], types(vec![named("T")])),
            vec![ret(vec![composite(Some(named("T")), vec![elem(int("1")), elem(int("2"))])])],
        ),
    ]);
    let first = run(&pkg, DriverOptions::default());
    let second = run(&pkg, DriverOptions::default());
    assert!(first.is_clean(), "{:?}", first.errors);
    assert_eq!(
        first.catalog.to_json(false).expect("encode"),
        second.catalog.to_json(false).expect("encode")
    );
    assert_eq!(first.bodies, second.bodies);
    assert_eq!(
        first.table.get(SymbolKind::Variable, "h").and_then(|d| d.def.clone()),
        Some(Type::builtin("float64"))
    );
}
