use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, error, info, warn};

use crate::{
    error::RetouchError,
    io::natural_cmp,
    types::ProcessedFileRecord,
};

/// Prefix of the intermediate names used between the two rename phases
pub const TEMP_PREFIX: &str = "__temp_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenamePhase {
    Unprocessed,
    TempNamed,
    FinalNamed,
}

/// One output file moving through the rename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameEntry {
    pub original_base: String,
    pub current: PathBuf,
    pub phase: RenamePhase,
}

impl RenameEntry {
    pub fn new(record: ProcessedFileRecord) -> Self {
        Self {
            original_base: record.original_base,
            current: record.output,
            phase: RenamePhase::Unprocessed,
        }
    }

    fn extension(&self) -> String {
        self.current
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn dir(&self) -> PathBuf {
        self.current.parent().map(Path::to_path_buf).unwrap_or_default()
    }

    fn sibling(&self, stem: &str) -> PathBuf {
        let ext = self.extension();
        if ext.is_empty() {
            self.dir().join(stem)
        } else {
            self.dir().join(format!("{stem}.{ext}"))
        }
    }

    fn move_to(&mut self, target: PathBuf, phase: RenamePhase) -> Result<(), RetouchError> {
        fs::rename(&self.current, &target).map_err(|source| RetouchError::Rename {
            from: self.current.clone(),
            to: target.clone(),
            source,
        })?;
        debug!(from = %self.current.display(), to = %target.display(), ?phase, "Renamed");
        self.current = target;
        self.phase = phase;
        Ok(())
    }
}

/// Outcome of a rename run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameReport {
    /// Final paths, winner first
    pub renamed: Vec<PathBuf>,
    pub failed: usize,
    /// Intermediate files still present once the rename finished
    pub leftover_temp: Vec<PathBuf>,
}

/// Renames outputs to `{article}.ext` and `{article}_{n}.ext` in two phases,
/// so no file is ever moved onto a name another file in the batch still holds
#[derive(Debug, Clone)]
pub struct Renamer {
    article: String,
}

impl Renamer {
    pub fn new(article: impl Into<String>) -> Self {
        Self { article: article.into() }
    }

    pub fn article(&self) -> &str {
        &self.article
    }

    /// Rename every record. Individual failures are logged and counted;
    /// the file keeps whatever name it had at that point.
    pub fn rename(&self, records: Vec<ProcessedFileRecord>) -> RenameReport {
        let mut entries: Vec<RenameEntry> = records.into_iter().map(RenameEntry::new).collect();
        let mut report = RenameReport::default();
        if entries.is_empty() {
            return report;
        }
        info!(count = entries.len(), article = %self.article, "🏷️ Renaming outputs");

        report.failed += self.to_temp_names(&mut entries);

        let mut pending: Vec<&mut RenameEntry> = entries
            .iter_mut()
            .filter(|entry| entry.phase == RenamePhase::TempNamed)
            .collect();
        pending.sort_by(|a, b| {
            natural_cmp(&a.original_base, &b.original_base).then_with(|| a.current.cmp(&b.current))
        });

        if let Some(index) = self.winner_index(&pending) {
            let target = pending[index].sibling(&self.article);
            if target.exists() {
                warn!(target = %target.display(), "Article name already taken, numbering every file");
            } else {
                let winner = pending.remove(index);
                match winner.move_to(target, RenamePhase::FinalNamed) {
                    Ok(()) => report.renamed.push(winner.current.clone()),
                    Err(err) => {
                        error!(error = %err, "Rename failed");
                        report.failed += 1;
                    }
                }
            }
        }

        let mut number = 1u32;
        for entry in pending {
            let target = loop {
                let candidate = entry.sibling(&format!("{}_{number}", self.article));
                number += 1;
                if !candidate.exists() {
                    break candidate;
                }
            };
            match entry.move_to(target, RenamePhase::FinalNamed) {
                Ok(()) => report.renamed.push(entry.current.clone()),
                Err(err) => {
                    error!(error = %err, "Rename failed");
                    report.failed += 1;
                }
            }
        }

        let dirs: BTreeSet<PathBuf> = entries.iter().map(RenameEntry::dir).collect();
        report.leftover_temp = dirs.iter().flat_map(|dir| leftover_temp_files(dir)).collect();
        for path in &report.leftover_temp {
            warn!(file = %path.display(), "Temporary file left behind, check for naming conflicts");
        }
        report
    }

    /// Phase one: move every entry to a temporary name. Returns the number
    /// of failures.
    fn to_temp_names(&self, entries: &mut [RenameEntry]) -> usize {
        let mut counter = 0usize;
        let mut failed = 0;
        for entry in entries.iter_mut() {
            let target = loop {
                let candidate = entry.sibling(&format!("{TEMP_PREFIX}{counter}_{}", entry.original_base));
                counter += 1;
                if !candidate.exists() {
                    break candidate;
                }
            };
            if let Err(err) = entry.move_to(target, RenamePhase::TempNamed) {
                error!(error = %err, "Temporary rename failed, file keeps its name");
                failed += 1;
            }
        }
        failed
    }

    /// Entry whose original name matches the article, else the first one
    fn winner_index(&self, pending: &[&mut RenameEntry]) -> Option<usize> {
        if pending.is_empty() {
            return None;
        }
        let article = self.article.to_lowercase();
        let matched = pending
            .iter()
            .position(|entry| entry.original_base.to_lowercase() == article);
        Some(matched.unwrap_or(0))
    }
}

/// Files in `dir` still carrying the temporary prefix
pub fn leftover_temp_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut leftovers: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with(TEMP_PREFIX))
        })
        .collect();
    leftovers.sort();
    leftovers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> ProcessedFileRecord {
        let path = dir.join(name);
        fs::write(&path, name.as_bytes()).expect("Should write file");
        ProcessedFileRecord {
            original_base: crate::io::base_name(&path),
            output: path,
        }
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .expect("Should read dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_numbering_follows_natural_order() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let records = vec![
            touch(dir.path(), "img10.jpg"),
            touch(dir.path(), "img2.jpg"),
            touch(dir.path(), "img1.jpg"),
        ];

        let report = Renamer::new("SKU1").rename(records);
        assert_eq!(report.failed, 0);
        assert!(report.leftover_temp.is_empty());
        assert_eq!(names(dir.path()), vec!["SKU1.jpg", "SKU1_1.jpg", "SKU1_2.jpg"]);
        assert_eq!(fs::read(dir.path().join("SKU1.jpg")).unwrap(), b"img1.jpg");
        assert_eq!(fs::read(dir.path().join("SKU1_2.jpg")).unwrap(), b"img10.jpg");
    }

    #[test]
    fn test_matching_name_wins() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let records = vec![touch(dir.path(), "a.jpg"), touch(dir.path(), "sku1.jpg"), touch(dir.path(), "b.jpg")];

        Renamer::new("SKU1").rename(records);
        assert_eq!(fs::read(dir.path().join("SKU1.jpg")).unwrap(), b"sku1.jpg");
        assert_eq!(fs::read(dir.path().join("SKU1_1.jpg")).unwrap(), b"a.jpg");
        assert_eq!(fs::read(dir.path().join("SKU1_2.jpg")).unwrap(), b"b.jpg");
    }

    #[test]
    fn test_swapping_names_inside_batch() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        // SKU1_1 must become SKU1 while z takes over SKU1_1
        let records = vec![touch(dir.path(), "SKU1_1.jpg"), touch(dir.path(), "z.jpg")];

        let report = Renamer::new("SKU1").rename(records);
        assert_eq!(report.renamed.len(), 2);
        assert_eq!(fs::read(dir.path().join("SKU1.jpg")).unwrap(), b"SKU1_1.jpg");
        assert_eq!(fs::read(dir.path().join("SKU1_1.jpg")).unwrap(), b"z.jpg");
    }

    #[test]
    fn test_foreign_files_are_skipped() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        fs::write(dir.path().join("SKU1.jpg"), b"foreign").expect("Should write file");
        fs::write(dir.path().join("SKU1_2.jpg"), b"foreign").expect("Should write file");
        let records = vec![touch(dir.path(), "a.jpg"), touch(dir.path(), "b.jpg")];

        Renamer::new("SKU1").rename(records);
        assert_eq!(fs::read(dir.path().join("SKU1.jpg")).unwrap(), b"foreign");
        assert_eq!(fs::read(dir.path().join("SKU1_1.jpg")).unwrap(), b"a.jpg");
        assert_eq!(fs::read(dir.path().join("SKU1_3.jpg")).unwrap(), b"b.jpg");
    }

    #[test]
    fn test_missing_file_is_counted_not_fatal() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let ghost = ProcessedFileRecord {
            output: dir.path().join("ghost.jpg"),
            original_base: "ghost".into(),
        };
        let records = vec![ghost, touch(dir.path(), "real.jpg")];

        let report = Renamer::new("SKU1").rename(records);
        assert_eq!(report.failed, 1);
        assert_eq!(names(dir.path()), vec!["SKU1.jpg"]);
    }

    #[test]
    fn test_leftover_temp_files_are_reported() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        fs::write(dir.path().join("__temp_9_old.jpg"), b"stale").expect("Should write file");
        let report = Renamer::new("SKU1").rename(vec![touch(dir.path(), "a.jpg")]);
        assert_eq!(report.leftover_temp, vec![dir.path().join("__temp_9_old.jpg")]);
    }
}
