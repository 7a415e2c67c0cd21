#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use symex_ast::Package;
use symex_core::FatalError;
use tracing::debug;

/// Read one front-end document, or every `*.json` document of a directory
/// in file-name order.
pub fn load_packages(path: &Path) -> Result<Vec<Package>, FatalError> {
    let files = if path.is_dir() {
        let entries = fs::read_dir(path)
            .map_err(|e| FatalError::InvalidInput(format!("{}: {e}", path.display())))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };
    if files.is_empty() {
        return Err(FatalError::InvalidInput(format!(
            "no package documents under {}",
            path.display()
        )));
    }

    let mut packages: Vec<Package> = Vec::with_capacity(files.len());
    for file in files {
        let text = fs::read_to_string(&file)
            .map_err(|e| FatalError::InvalidInput(format!("{}: {e}", file.display())))?;
        let pkg: Package = serde_json::from_str(&text)
            .map_err(|e| FatalError::InvalidInput(format!("{}: {e}", file.display())))?;
        if packages.iter().any(|p| p.path == pkg.path) {
            return Err(FatalError::InvalidInput(format!(
                "package {} given more than once",
                pkg.path
            )));
        }
        debug!(target: "symex::input", path = %file.display(), package = %pkg.path, files = pkg.files.len(), "read package");
        packages.push(pkg);
    }
    Ok(packages)
}

/// Group `packages` (by index) so that every package comes after the
/// packages of this run it imports. Packages of one wave are independent.
pub fn waves(packages: &[Package]) -> Result<Vec<Vec<usize>>, FatalError> {
    let index: HashMap<&str, usize> = packages
        .iter()
        .enumerate()
        .map(|(i, p)| (p.path.as_str(), i))
        .collect();
    let mut waiting_on: Vec<BTreeSet<usize>> = packages
        .iter()
        .map(|p| {
            p.imports()
                .iter()
                .filter_map(|path| index.get(path.as_str()).copied())
                .collect()
        })
        .collect();

    let mut done = vec![false; packages.len()];
    let mut waves = Vec::new();
    while done.iter().any(|d| !d) {
        let wave: Vec<usize> = (0..packages.len())
            .filter(|&i| !done[i] && waiting_on[i].is_empty())
            .collect();
        if wave.is_empty() {
            let stuck: Vec<&str> = (0..packages.len())
                .filter(|&i| !done[i])
                .map(|i| packages[i].path.as_str())
                .collect();
            return Err(FatalError::InvalidInput(format!(
                "import cycle among {}",
                stuck.join(", ")
            )));
        }
        for &i in &wave {
            done[i] = true;
        }
        for deps in &mut waiting_on {
            for i in &wave {
                deps.remove(i);
            }
        }
        waves.push(wave);
    }
    Ok(waves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use symex_ast::build::{file, import, package};

    fn pkg(path: &str, imports: &[&str]) -> Package {
        package(path, vec![file("a.go", imports.iter().map(|i| import(i)).collect(), vec![])])
    }

    #[test]
    fn imports_order_the_waves() {
        let packages = vec![
            pkg("app", &["lib/b", "fmt"]),
            pkg("lib/a", &[]),
            pkg("lib/b", &["lib/a"]),
            pkg("tool", &["lib/a"]),
        ];
        let waves = waves(&packages).expect("acyclic");
        assert_eq!(waves, vec![vec![1], vec![2, 3], vec![0]]);
    }

    #[test]
    fn cycles_are_rejected() {
        let packages = vec![pkg("x", &["y"]), pkg("y", &["x"]), pkg("z", &[])];
        let err = waves(&packages).expect_err("cycle");
        assert!(err.to_string().contains("x, y"), "{err}");
    }
}
