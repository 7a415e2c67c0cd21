use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use symex_types::BUILTIN_PACKAGE;

/// One line of an allocation report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub package: String,
    pub name: String,
    pub count: u32,
}

/// Multiset of external `(package, identifier)` references of one file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllocationIndex {
    counts: BTreeMap<(String, String), u32>,
}

impl AllocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, package: &str, name: &str) {
        *self
            .counts
            .entry((package.to_string(), name.to_string()))
            .or_insert(0) += 1;
    }

    /// Record a reference seen from `own`; references into `own` and into the
    /// builtin scope are skipped.
    pub fn record_external(&mut self, own: &str, package: &str, name: &str) {
        if package.is_empty() || package == own || package == BUILTIN_PACKAGE {
            return;
        }
        self.record(package, name);
    }

    pub fn count(&self, package: &str, name: &str) -> u32 {
        self.counts
            .get(&(package.to_string(), name.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn merge(&mut self, other: &AllocationIndex) {
        for ((package, name), n) in &other.counts {
            *self
                .counts
                .entry((package.clone(), name.clone()))
                .or_insert(0) += n;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Entries sorted by package, then name.
    pub fn entries(&self) -> Vec<AllocationEntry> {
        self.counts
            .iter()
            .map(|((package, name), count)| AllocationEntry {
                package: package.clone(),
                name: name.clone(),
                count: *count,
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAllocations {
    pub file: String,
    pub symbols: Vec<AllocationEntry>,
}

/// Persisted usage report of a package: per file and in total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationReport {
    pub package: String,
    pub files: Vec<FileAllocations>,
    pub total: Vec<AllocationEntry>,
}

/// Per-file indexes of one package.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageAllocations {
    package: String,
    files: BTreeMap<String, AllocationIndex>,
}

impl PackageAllocations {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn file_mut(&mut self, file: &str) -> &mut AllocationIndex {
        self.files.entry(file.to_string()).or_default()
    }

    pub fn file(&self, file: &str) -> Option<&AllocationIndex> {
        self.files.get(file)
    }

    pub fn total(&self) -> AllocationIndex {
        let mut total = AllocationIndex::new();
        for index in self.files.values() {
            total.merge(index);
        }
        total
    }

    pub fn report(&self) -> AllocationReport {
        AllocationReport {
            package: self.package.clone(),
            files: self
                .files
                .iter()
                .map(|(file, index)| FileAllocations {
                    file: file.clone(),
                    symbols: index.entries(),
                })
                .collect(),
            total: self.total().entries(),
        }
    }
}
