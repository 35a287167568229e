use std::path::Path;

use serde::Serialize;

pub const BYPRODUCT_DIRS: &[&str] = &["csrc", "simv.daidir"];
pub const BYPRODUCT_FILES: &[&str] = &["novas_dump.log", "simv", "tr_db.log", "ucli.key", "vc_hdrs.h"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub removed: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<CleanSkip>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanSkip {
    pub name: String,
    pub reason: String,
}

/// Removes the known compile/simulate byproducts under `work_dir`, plus the
/// simulation output tree at `sim_root` (relative to `work_dir`).
///
/// Best effort: absent items are ignored, failures are recorded in `skipped`.
pub fn clean_byproducts(work_dir: &Path, sim_root: &Path) -> CleanReport {
    let mut report = CleanReport::default();

    for name in BYPRODUCT_DIRS {
        let res = std::fs::remove_dir_all(work_dir.join(name));
        record(&mut report, name, res);
    }
    let sim_name = sim_root.display().to_string();
    let res = std::fs::remove_dir_all(work_dir.join(sim_root));
    record(&mut report, &sim_name, res);
    for name in BYPRODUCT_FILES {
        let res = std::fs::remove_file(work_dir.join(name));
        record(&mut report, name, res);
    }

    report
}

fn record(report: &mut CleanReport, name: &str, res: std::io::Result<()>) {
    match res {
        Ok(()) => {
            tracing::info!("removed {name}");
            report.removed.push(name.to_string());
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!("could not remove {name}: {err}");
            report.skipped.push(CleanSkip {
                name: name.to_string(),
                reason: err.to_string(),
            });
        }
    }
}

/// Removes a directory tree, treating absence as success.
pub fn remove_dir_all_if_exists(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}
