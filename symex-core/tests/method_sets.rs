use std::collections::{BTreeMap, BTreeSet};

use proptest::{
    prelude::{any, prop, Just, Strategy},
    prop_oneof,
    test_runner::{Config, TestCaseError, TestRunner},
};
use symex_core::{PackageSet, SymbolKind, SymbolTable, TypeEnv, Universe};
use symex_types::{FunctionType, InterfaceMethod, StructField, SymbolDef, Type};

/// Method name to "has a pointer receiver".
type Methods = BTreeMap<String, bool>;

fn methods() -> impl Strategy<Value = Methods> {
    let name = prop_oneof![
        Just("Read".to_string()),
        Just("Write".to_string()),
        Just("Close".to_string()),
        Just("Len".to_string()),
        Just("String".to_string()),
    ];
    prop::collection::btree_map(name, any::<bool>(), 0..5)
}

fn declare(table: &mut SymbolTable, type_name: &str, methods: &Methods) {
    for (method, pointer) in methods {
        let recv = Type::ident("p", type_name);
        let recv = if *pointer { Type::pointer(recv) } else { recv };
        let def = SymbolDef::new(method.as_str(), "p", Type::method(recv, FunctionType::new(vec![], vec![])));
        table.add_method(type_name, method, def).expect("method");
    }
}

/// `type T struct{ E }` plus the given methods on `T` and `E`.
fn table(own: &Methods, embedded: &Methods) -> SymbolTable {
    let mut table = SymbolTable::new("p");
    table
        .complete(SymbolKind::Type, "E", Type::structure(vec![]))
        .expect("E");
    table
        .complete(
            SymbolKind::Type,
            "T",
            Type::structure(vec![StructField::new("", Type::ident("p", "E"))]),
        )
        .expect("T");
    declare(&mut table, "T", own);
    declare(&mut table, "E", embedded);
    table
}

fn expected(own: &Methods, embedded: &Methods, through_pointer: bool) -> BTreeSet<String> {
    let usable = |pointer: bool| through_pointer || !pointer;
    let mut set: BTreeSet<String> = own.iter().filter(|(_, p)| usable(**p)).map(|(m, _)| m.clone()).collect();
    for (m, p) in embedded {
        if !own.contains_key(m) && usable(*p) {
            set.insert(m.clone());
        }
    }
    set
}

#[test]
fn pointer_method_set_contains_value_method_set() {
    let universe = Universe::default();
    let deps = PackageSet::new();
    let mut runner = TestRunner::new(Config {
        cases: 128,
        ..Config::default()
    });
    runner
        .run(&(methods(), methods()), |(own, embedded)| {
            let table = table(&own, &embedded);
            let env = TypeEnv::new("p", &table, &universe, &deps);
            let t = Type::ident("p", "T");
            let value: BTreeSet<String> = env
                .method_set(&t)
                .map_err(|e| TestCaseError::fail(e.message))?
                .into_keys()
                .collect();
            let pointer: BTreeSet<String> = env
                .method_set(&Type::pointer(t))
                .map_err(|e| TestCaseError::fail(e.message))?
                .into_keys()
                .collect();

            if !value.is_subset(&pointer) {
                return Err(TestCaseError::fail(format!("{value:?} not within {pointer:?}")));
            }
            if value != expected(&own, &embedded, false) || pointer != expected(&own, &embedded, true) {
                return Err(TestCaseError::fail(format!(
                    "T: {value:?}, *T: {pointer:?} for own {own:?}, embedded {embedded:?}"
                )));
            }
            let any_pointer = own.values().any(|p| *p)
                || embedded.iter().any(|(m, p)| *p && !own.contains_key(m));
            if (value == pointer) == any_pointer {
                return Err(TestCaseError::fail(format!(
                    "equality {} but pointer receivers {any_pointer}",
                    value == pointer
                )));
            }
            Ok(())
        })
        .expect("method set law");
}

#[test]
fn implements_needs_address_for_pointer_methods() {
    let universe = Universe::default();
    let deps = PackageSet::new();
    let own: Methods = [("Read".to_string(), true)].into_iter().collect();
    let mut table = table(&own, &Methods::new());
    table
        .complete(
            SymbolKind::Type,
            "Reader",
            Type::interface(vec![InterfaceMethod::new(
                "Read",
                "p",
                Type::function(vec![], vec![]),
            )]),
        )
        .expect("Reader");
    let env = TypeEnv::new("p", &table, &universe, &deps);
    let iface = Type::ident("p", "Reader");
    let t = Type::ident("p", "T");
    assert!(!env.implements(&t, &iface).expect("T"));
    assert!(env.implements(&Type::pointer(t), &iface).expect("*T"));
}

#[test]
fn method_reached_twice_at_one_depth_cancels_out() {
    let universe = Universe::default();
    let deps = PackageSet::new();
    let mut table = SymbolTable::new("p");
    let embed = |names: &[&str]| {
        Type::structure(
            names
                .iter()
                .map(|n| StructField::new("", Type::ident("p", n)))
                .collect(),
        )
    };
    table.complete(SymbolKind::Type, "D", Type::structure(vec![])).expect("D");
    table.complete(SymbolKind::Type, "B", embed(&["D"])).expect("B");
    table.complete(SymbolKind::Type, "C", embed(&["D"])).expect("C");
    table.complete(SymbolKind::Type, "A", embed(&["B", "C"])).expect("A");
    table.complete(SymbolKind::Type, "E", embed(&["B"])).expect("E");
    let close: Methods = [("Close".to_string(), false)].into_iter().collect();
    declare(&mut table, "D", &close);

    let env = TypeEnv::new("p", &table, &universe, &deps);
    assert!(env.method_set(&Type::ident("p", "A")).expect("A").is_empty());
    let through_chain = env.method_set(&Type::ident("p", "E")).expect("E");
    assert_eq!(through_chain.get("Close").map(|m| m.depth), Some(2));
}
