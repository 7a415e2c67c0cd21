#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::Parser;
use miette::IntoDiagnostic;
use rayon::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use symex_catalog::{load_cgo, CatalogStore, ExtractorConfig};
use symex_core::{Extraction, FatalError, PackageDriver, PackageSet, Universe, UntypedConstMode};

mod input;
mod report;

#[derive(Parser, Debug)]
#[command(name = "symex", version, about = "Extract per-package symbol catalogs")]
struct Cli {
    /// Front-end AST document (`*.json`) or a directory of them.
    #[arg(long = "package-path", required = true)]
    package_path: PathBuf,

    /// Directory of dependency catalogs. Extracted catalogs are saved here too.
    #[arg(long = "symbol-table-dir")]
    symbol_table_dir: Option<PathBuf>,

    /// Builtin scope and standard-library snapshot (e.g. "1.21").
    #[arg(long = "builtin-version")]
    builtin_version: Option<String>,

    /// Catalog of cgo symbols (package `C`).
    #[arg(long = "cgo-symbols-path")]
    cgo_symbols_path: Option<PathBuf>,

    /// Configuration file. Defaults to `symex.toml` in the working directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the bundle here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Also emit allocation reports.
    #[arg(long, default_value_t = false)]
    allocated: bool,

    /// Keep only allocations of packages under this prefix.
    #[arg(long = "filter-prefix")]
    filter_prefix: Option<String>,

    #[arg(long, default_value_t = false)]
    pretty: bool,

    /// How untyped constants are written to catalogs.
    #[arg(long = "untyped-constants", value_enum)]
    untyped_constants: Option<UntypedArg>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum UntypedArg {
    /// Keep the untyped family
    Preserve,
    /// Coerce to the default type and warn
    Default,
}

impl From<UntypedArg> for UntypedConstMode {
    fn from(v: UntypedArg) -> Self {
        match v {
            UntypedArg::Preserve => UntypedConstMode::Preserve,
            UntypedArg::Default => UntypedConstMode::Default,
        }
    }
}

impl Cli {
    /// File settings with command-line flags on top.
    fn settings(&self) -> miette::Result<ExtractorConfig> {
        let mut config = match &self.config {
            Some(path) => ExtractorConfig::from_file(path)?,
            None => {
                let cwd = std::env::current_dir().into_diagnostic()?;
                ExtractorConfig::discover(&cwd)?.unwrap_or_default()
            }
        };
        if let Some(dir) = &self.symbol_table_dir {
            config.symbol_table_dir = Some(dir.clone());
        }
        if let Some(v) = &self.builtin_version {
            config.builtin_version = Some(v.clone());
        }
        if let Some(p) = &self.cgo_symbols_path {
            config.cgo_symbols_path = Some(p.clone());
        }
        if let Some(mode) = self.untyped_constants {
            config.untyped_constants = mode.into();
        }
        config.pretty |= self.pretty;
        config.allocated |= self.allocated;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "symex=debug" } else { "symex=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = cli.settings()?;
    run(&cli, &config)
}

fn run(cli: &Cli, config: &ExtractorConfig) -> miette::Result<()> {
    let version = config.builtin_version()?;
    let universe = Universe::new(version);
    let options = config.driver_options();
    let store = config
        .symbol_table_dir
        .as_ref()
        .map(|dir| CatalogStore::new(dir).with_version(version));

    let packages = input::load_packages(&cli.package_path)?;
    let waves = input::waves(&packages)?;
    info!(
        target: "symex::cli",
        packages = packages.len(),
        waves = waves.len(),
        builtin_version = %version.display(),
        "starting extraction"
    );

    let mut deps = PackageSet::new();
    if let Some(path) = &config.cgo_symbols_path {
        deps.insert(load_cgo(path)?);
    }

    let mut bundle = report::OutputBundle::default();
    let mut failed = Vec::new();
    let run_paths: Vec<&str> = packages.iter().map(|p| p.path.as_str()).collect();
    for wave in waves {
        let mut ready = Vec::with_capacity(wave.len());
        for i in wave {
            if let Some(store) = &store {
                let imports = packages[i].imports();
                let external = imports
                    .iter()
                    .map(String::as_str)
                    .filter(|path| !run_paths.contains(path));
                if let Err(e) = store.load_dependencies(external, &mut deps) {
                    error!(target: "symex::cli", package = %packages[i].path, "{e}");
                    failed.push(packages[i].path.clone());
                    continue;
                }
            }
            ready.push(i);
        }

        let results: Vec<(usize, Result<Extraction, FatalError>)> = ready
            .par_iter()
            .map(|&i| {
                let driver = PackageDriver::with_options(&universe, &deps, options);
                (i, driver.extract(&packages[i]))
            })
            .collect();

        for (i, result) in results {
            let extraction = match result {
                Ok(x) => x,
                Err(e) => {
                    error!(target: "symex::cli", package = %packages[i].path, "{e}");
                    failed.push(packages[i].path.clone());
                    continue;
                }
            };
            report::log_diagnostics(&extraction);
            if let Some(store) = &store {
                let allocations = config
                    .allocated
                    .then(|| report::allocation_report(&extraction, cli.filter_prefix.as_deref()));
                store.save(&extraction.catalog, allocations.as_ref(), config.pretty)?;
            }
            bundle.push(&extraction, config.allocated, cli.filter_prefix.as_deref());
            deps.insert(extraction.table);
        }
    }

    bundle.write(cli.output.as_deref(), config.pretty)?;
    if failed.is_empty() {
        Ok(())
    } else {
        Err(miette::miette!(
            code = "symex::failed",
            "extraction failed for {}",
            failed.join(", ")
        ))
    }
}
