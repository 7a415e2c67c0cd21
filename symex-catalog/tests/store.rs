use std::fs;

use symex_ast::build::*;
use symex_catalog::{load_bundle, load_cgo, CatalogError, CatalogStore, ALLOCATIONS_FILE};
use symex_core::{BuiltinVersion, PackageDriver, PackageSet, SymbolKind, Universe};
use symex_types::{CatalogSet, PackageCatalog, SymbolDef, Type};

fn extract_q(deps: &PackageSet) -> symex_core::Extraction {
    let pkg = package(
        "example.com/q",
        vec![file(
            "q.go",
            vec![],
            vec![
                type_decl("T", struct_of(vec![field(&["n"], named("int"))])),
                func(
                    "New",
                    func_type(vec![], types(vec![pointer(named("T"))])),
                    vec![ret(vec![addr(composite(Some(named("T")), vec![]))])],
                ),
            ],
        )],
    );
    let universe = Universe::default();
    PackageDriver::new(&universe, deps).extract(&pkg).expect("extract q")
}

#[test]
fn saved_catalog_serves_a_dependent_package() {
    let temp = tempfile::TempDir::new().expect("create temp dir");
    let store = CatalogStore::new(temp.path());

    let q = extract_q(&PackageSet::new());
    assert!(q.is_clean(), "{:?}", q.errors);
    let report = q.allocations.report();
    let path = store.save(&q.catalog, Some(&report), true).expect("save");
    assert_eq!(path, temp.path().join("example.com/q/api.json"));
    assert!(temp.path().join("example.com/q").join(ALLOCATIONS_FILE).is_file());
    assert_eq!(store.require("example.com/q").expect("reload"), q.catalog);
    assert_eq!(
        store.load_allocations("example.com/q").expect("read"),
        Some(report)
    );

    let mut deps = PackageSet::new();
    let loaded = store
        .load_dependencies(["example.com/q", "unsafe", "C"], &mut deps)
        .expect("load deps");
    assert_eq!(loaded, 1);
    assert!(deps.contains("example.com/q"));

    let p = package(
        "example.com/p",
        vec![file(
            "p.go",
            vec![import("example.com/q")],
            vec![var(&["v"], None, vec![call(sel(ident("q"), "New"), vec![])])],
        )],
    );
    let universe = Universe::default();
    let x = PackageDriver::new(&universe, &deps).extract(&p).expect("extract p");
    assert!(x.is_clean(), "{:?}", x.errors);
    assert_eq!(
        x.table.get(SymbolKind::Variable, "v").and_then(|d| d.def.clone()),
        Some(Type::pointer(Type::ident("example.com/q", "T")))
    );
}

#[test]
fn snapshot_catalog_wins_over_project_catalog() {
    let temp = tempfile::TempDir::new().expect("create temp dir");
    let store = CatalogStore::new(temp.path()).with_version(BuiltinVersion::new(1, 9));

    let mut project = PackageCatalog::new("strings");
    project
        .functions
        .push(SymbolDef::new("Old", "strings", Type::function(vec![], vec![])));
    store.save(&project, None, false).expect("save project");

    let mut snapshot = PackageCatalog::new("strings");
    snapshot.functions.push(SymbolDef::new(
        "ToUpper",
        "strings",
        Type::function(vec![Type::builtin("string")], vec![Type::builtin("string")]),
    ));
    let dir = temp.path().join("golang").join("1.9").join("strings");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("api.json"), snapshot.to_json(false).expect("encode")).expect("write");

    assert_eq!(store.require("strings").expect("load"), snapshot);
    let other = CatalogStore::new(temp.path()).with_version(BuiltinVersion::new(1, 21));
    assert_eq!(other.require("strings").expect("load"), project);
}

#[test]
fn missing_and_malformed_catalogs_are_errors() {
    let temp = tempfile::TempDir::new().expect("create temp dir");
    let store = CatalogStore::new(temp.path());
    assert!(matches!(store.require("nope"), Err(CatalogError::Missing(p)) if p == "nope"));
    assert!(store.load("nope").expect("absent is fine").is_none());

    let dir = temp.path().join("bad");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(
        dir.join("api.json"),
        r#"{"package":"bad","datatypes":[{"name":"X","def":{"type":"mystery"}}]}"#,
    )
    .expect("write");
    assert!(matches!(store.load("bad"), Err(CatalogError::Format { .. })));

    let mut deps = PackageSet::new();
    let err = store
        .load_dependencies(["nope"], &mut deps)
        .expect_err("missing dependency");
    assert!(matches!(err, CatalogError::Missing(_)));
}

#[test]
fn bundle_and_cgo_side_table() {
    let temp = tempfile::TempDir::new().expect("create temp dir");

    let q = extract_q(&PackageSet::new());
    let bundle = CatalogSet {
        packages: vec![q.catalog.clone()],
    };
    let bundle_path = temp.path().join("bundle.json");
    fs::write(&bundle_path, bundle.to_json(true).expect("encode")).expect("write");
    let loaded = load_bundle(&bundle_path).expect("bundle");
    assert_eq!(loaded.get("example.com/q"), Some(&q.catalog));

    let mut cgo = PackageCatalog::new("");
    cgo.functions.push(SymbolDef::new(
        "CString",
        "C",
        Type::function(vec![Type::builtin("string")], vec![Type::pointer(Type::ident("C", "char"))]),
    ));
    cgo.datatypes
        .push(SymbolDef::new("char", "C", Type::builtin("int8")));
    let cgo_path = temp.path().join("cgo.json");
    fs::write(&cgo_path, cgo.to_json(false).expect("encode")).expect("write");

    let table = load_cgo(&cgo_path).expect("cgo");
    assert_eq!(table.package(), "C");
    assert!(table.get(SymbolKind::Function, "CString").is_some());

    let mut deps = PackageSet::new();
    deps.insert(table);
    let pkg = package(
        "p",
        vec![file(
            "p.go",
            vec![import("C")],
            vec![var(&["s"], None, vec![call(sel(ident("C"), "CString"), vec![string("\"x\"")])])],
        )],
    );
    let universe = Universe::default();
    let x = PackageDriver::new(&universe, &deps).extract(&pkg).expect("extract");
    assert!(x.is_clean(), "{:?}", x.errors);
    assert_eq!(
        x.table.get(SymbolKind::Variable, "s").and_then(|d| d.def.clone()),
        Some(Type::pointer(Type::ident("C", "char")))
    );

    let wrong = PackageCatalog::new("os");
    let wrong_path = temp.path().join("wrong.json");
    fs::write(&wrong_path, wrong.to_json(false).expect("encode")).expect("write");
    assert!(matches!(load_cgo(&wrong_path), Err(CatalogError::CgoPackage(p)) if p == "os"));
}
