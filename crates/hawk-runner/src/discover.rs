use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::validate_test_id;

/// Lists test ids in `tests_dir`: entry names minus extension, without `base_test`.
///
/// The result is sorted and free of duplicates (`foo.sv` and `foo.svh` are one test).
/// Entries whose stem is not a valid test id are skipped with a warning.
pub fn discover_tests(tests_dir: &Path, base_test: &str) -> Result<Vec<String>> {
    let mut out = BTreeSet::new();
    for entry in std::fs::read_dir(tests_dir)
        .with_context(|| format!("read tests dir: {}", tests_dir.display()))?
    {
        let entry =
            entry.with_context(|| format!("read entry in {}", tests_dir.display()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            tracing::warn!("skipping non UTF-8 test entry: {:?}", entry.path());
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name);
        if stem == base_test {
            continue;
        }
        if let Err(err) = validate_test_id(stem) {
            tracing::warn!("skipping test entry {name:?}: {err}");
            continue;
        }
        out.insert(stem.to_string());
    }
    Ok(out.into_iter().collect())
}

/// Substring filter, or exact id match with `exact`.
pub fn filter_tests(tests: Vec<String>, filter: Option<&str>, exact: bool) -> Vec<String> {
    let Some(filter) = filter else {
        return tests;
    };
    tests
        .into_iter()
        .filter(|t| if exact { t == filter } else { t.contains(filter) })
        .collect()
}
