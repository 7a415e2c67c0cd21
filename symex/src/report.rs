#![forbid(unsafe_code)]

use std::path::Path;

use miette::IntoDiagnostic;
use serde::Serialize;
use symex_core::{AllocationReport, Extraction};
use symex_types::{write_json, PackageCatalog};
use tracing::warn;

/// What the extractor prints. Without allocation reports this is a plain
/// catalog bundle (`{"packages":[…]}`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutputBundle {
    pub packages: Vec<PackageCatalog>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allocated: Vec<AllocationReport>,
}

impl OutputBundle {
    pub fn push(&mut self, extraction: &Extraction, allocated: bool, filter_prefix: Option<&str>) {
        self.packages.push(extraction.catalog.clone());
        if allocated {
            self.allocated
                .push(allocation_report(extraction, filter_prefix));
        }
    }

    pub fn write(&self, output: Option<&Path>, pretty: bool) -> miette::Result<()> {
        let mut text = write_json(self, pretty)?;
        text.push('\n');
        match output {
            Some(path) => std::fs::write(path, text).into_diagnostic(),
            None => {
                use std::io::Write;
                let mut out = std::io::stdout().lock();
                out.write_all(text.as_bytes()).into_diagnostic()?;
                out.flush().into_diagnostic()
            }
        }
    }
}

/// Allocation report of `extraction`, keeping only packages under
/// `filter_prefix` when one is given.
pub fn allocation_report(extraction: &Extraction, filter_prefix: Option<&str>) -> AllocationReport {
    let mut report = extraction.allocations.report();
    if let Some(prefix) = filter_prefix {
        let keep = |package: &str| package.starts_with(prefix);
        for file in &mut report.files {
            file.symbols.retain(|e| keep(&e.package));
        }
        report.total.retain(|e| keep(&e.package));
    }
    report
}

/// Per-declaration diagnostics go to the log; they never fail the run.
pub fn log_diagnostics(extraction: &Extraction) {
    for e in &extraction.errors {
        warn!(
            target: "symex::report",
            package = %extraction.package,
            kind = %e.error.kind,
            "{}",
            e.display()
        );
    }
    for w in &extraction.warnings {
        warn!(
            target: "symex::report",
            package = %extraction.package,
            symbol = %w.symbol,
            pos = w.pos.as_deref().unwrap_or(""),
            "{}",
            w.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symex_ast::build::*;
    use symex_core::{PackageDriver, PackageSet, SymbolTable, Universe};
    use symex_types::Type;

    fn extraction() -> Extraction {
        let mut deps = PackageSet::new();
        for path in ["example.com/q", "other.org/r"] {
            let mut t = SymbolTable::new(path);
            t.complete(
                symex_core::SymbolKind::Function,
                "F",
                Type::function(vec![], vec![Type::builtin("int")]),
            )
            .expect("F");
            deps.insert(t);
        }
        let pkg = package(
            "p",
            vec![file(
                "p.go",
                vec![import("example.com/q"), import("other.org/r")],
                vec![var(
                    &["a", "b"],
                    None,
                    vec![call(sel(ident("q"), "F"), vec![]), call(sel(ident("r"), "F"), vec![])],
                )],
            )],
        );
        let universe = Universe::default();
        PackageDriver::new(&universe, &deps).extract(&pkg).expect("extract")
    }

    #[test]
    fn prefix_filter_drops_other_packages() {
        let x = extraction();
        assert!(x.is_clean(), "{:?}", x.errors);
        assert_eq!(allocation_report(&x, None).total.len(), 2);
        let filtered = allocation_report(&x, Some("example.com/"));
        assert_eq!(filtered.total.len(), 1);
        assert_eq!(filtered.total[0].package, "example.com/q");
        assert_eq!(filtered.files[0].symbols.len(), 1);
    }

    #[test]
    fn bundle_without_allocations_is_a_catalog_set() {
        let x = extraction();
        let mut bundle = OutputBundle::default();
        bundle.push(&x, false, None);
        let text = write_json(&bundle, false).expect("encode");
        assert!(!text.contains("allocated"));
        let set = symex_types::CatalogSet::from_json(&text).expect("catalog set");
        assert_eq!(set.get("p"), Some(&x.catalog));
    }
}
