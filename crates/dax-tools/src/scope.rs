// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use dax_config::ScopeConfig;

use crate::pathglob::glob_match;

/// Directories never included in the baseline scan.
const SKIP_DIRS: &[&str] = &["target", "node_modules", ".git"];

/// Accounts per-session file and LOC deltas against the declared limits.
///
/// Per-session state: sharing a tracker across concurrent turns requires
/// external synchronization.
pub struct ScopeTracker {
    work_dir: PathBuf,
    limits: ScopeConfig,
    /// file → LOC at baseline, for files matching the allowed patterns
    baseline: HashMap<String, usize>,
    files_modified: BTreeSet<String>,
    files_added: usize,
    files_removed: usize,
    loc_added: usize,
    loc_removed: usize,
}

/// Point-in-time scope metrics plus the limit verdict.
#[derive(Debug, Clone)]
pub struct ScopeStatus {
    pub files_modified: Vec<String>,
    pub baseline_files: usize,
    pub baseline_loc: usize,
    pub files_added: usize,
    pub files_removed: usize,
    pub loc_added: usize,
    pub loc_removed: usize,
    /// loc_added + loc_removed
    pub changed_loc: usize,
    pub touched_files_count: usize,
    pub warnings: Vec<String>,
    pub within_limits: bool,
}

/// Verdict of the pre-write expansion check consumed by the policy gate.
#[derive(Debug, Clone)]
pub struct ScopeExpansionCheck {
    pub needs_approval: bool,
    pub reason: String,
    pub touched_files: usize,
    pub max_files: Option<usize>,
    pub changed_loc: usize,
    pub max_loc: Option<usize>,
}

impl ScopeTracker {
    pub fn new(work_dir: impl Into<PathBuf>, limits: ScopeConfig) -> Self {
        Self {
            work_dir: work_dir.into(),
            limits,
            baseline: HashMap::new(),
            files_modified: BTreeSet::new(),
            files_added: 0,
            files_removed: 0,
            loc_added: 0,
            loc_removed: 0,
        }
    }

    /// Scan the source tree once, recording file → LOC for every file that
    /// matches an allowed pattern.  Subsequent accounting is pure delta
    /// arithmetic — no rescans.
    pub fn initialize(&mut self) -> std::io::Result<()> {
        self.baseline.clear();
        let walker = WalkDir::new(&self.work_dir).into_iter().filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !(e.file_type().is_dir()
                && (SKIP_DIRS.contains(&name.as_ref()) || name.starts_with('.')))
        });
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = self.relative(entry.path());
            if !self.in_scope(&rel) {
                continue;
            }
            if let Ok(content) = std::fs::read_to_string(entry.path()) {
                self.baseline.insert(rel, count_lines(&content));
            }
        }
        debug!(
            files = self.baseline.len(),
            work_dir = %self.work_dir.display(),
            "scope baseline established"
        );
        Ok(())
    }

    /// Record a pending change.  Called before the write happens.
    ///
    /// `old = None` means the file is being created; `new = None` means it
    /// is being deleted.  Paths outside the allowed patterns are ignored.
    pub fn track_file_change(&mut self, path: &str, old: Option<&str>, new: Option<&str>) {
        let rel = self.relative(Path::new(path));
        if !self.in_scope(&rel) {
            return;
        }
        self.files_modified.insert(rel);
        match (old, new) {
            (None, Some(new)) => {
                self.files_added += 1;
                self.loc_added += count_lines(new);
            }
            (Some(old), None) => {
                self.files_removed += 1;
                self.loc_removed += count_lines(old);
            }
            (Some(old), Some(new)) => {
                let before = count_lines(old);
                let after = count_lines(new);
                if after >= before {
                    self.loc_added += after - before;
                } else {
                    self.loc_removed += before - after;
                }
            }
            (None, None) => {}
        }
    }

    pub fn get_status(&self) -> ScopeStatus {
        let changed_loc = self.loc_added + self.loc_removed;
        let touched = self.files_modified.len();

        let mut warnings = Vec::new();
        if let Some(max_loc) = self.limits.max_loc {
            if changed_loc > max_loc {
                warnings.push(format!("changed LOC {changed_loc} exceeds limit {max_loc}"));
            }
        }
        if let Some(max_files) = self.limits.max_files {
            if touched > max_files {
                warnings.push(format!("touched files {touched} exceeds limit {max_files}"));
            }
        }

        ScopeStatus {
            files_modified: self.files_modified.iter().cloned().collect(),
            baseline_files: self.baseline.len(),
            baseline_loc: self.baseline.values().sum(),
            files_added: self.files_added,
            files_removed: self.files_removed,
            loc_added: self.loc_added,
            loc_removed: self.loc_removed,
            changed_loc,
            touched_files_count: touched,
            within_limits: warnings.is_empty(),
            warnings,
        }
    }

    pub fn check_scope_expansion(&self) -> ScopeExpansionCheck {
        let status = self.get_status();
        ScopeExpansionCheck {
            needs_approval: !status.within_limits,
            reason: status.warnings.join("; "),
            touched_files: status.touched_files_count,
            max_files: self.limits.max_files,
            changed_loc: status.changed_loc,
            max_loc: self.limits.max_loc,
        }
    }

    /// One-line summary for the system prompt.
    pub fn summary(&self) -> String {
        let mut parts = vec![format!(
            "allowed patterns: {}",
            self.limits.allowed_patterns.join(", ")
        )];
        if let Some(n) = self.limits.max_files {
            parts.push(format!("max files: {n}"));
        }
        if let Some(n) = self.limits.max_loc {
            parts.push(format!("max LOC: {n}"));
        }
        parts.join("; ")
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.work_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn in_scope(&self, rel: &str) -> bool {
        self.limits
            .allowed_patterns
            .iter()
            .any(|pat| glob_match(pat, rel))
    }
}

fn count_lines(content: &str) -> usize {
    content.lines().count()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_files: Option<usize>, max_loc: Option<usize>) -> ScopeConfig {
        ScopeConfig {
            max_files,
            max_loc,
            allowed_patterns: vec!["src/**".into()],
        }
    }

    fn tracker(max_files: Option<usize>, max_loc: Option<usize>) -> ScopeTracker {
        ScopeTracker::new("/work", limits(max_files, max_loc))
    }

    // ── Pattern membership ────────────────────────────────────────────────────

    #[test]
    fn out_of_scope_changes_are_ignored() {
        let mut t = tracker(Some(1), Some(10));
        t.track_file_change("docs/readme.md", None, Some("hello\n"));
        let status = t.get_status();
        assert_eq!(status.touched_files_count, 0);
        assert_eq!(status.changed_loc, 0);
        assert!(status.within_limits);
    }

    #[test]
    fn absolute_paths_are_relativized_against_work_dir() {
        let mut t = tracker(None, None);
        t.track_file_change("/work/src/a.ts", None, Some("one\ntwo\n"));
        let status = t.get_status();
        assert_eq!(status.files_modified, vec!["src/a.ts"]);
    }

    // ── Delta accounting ──────────────────────────────────────────────────────

    #[test]
    fn new_file_counts_added_files_and_loc() {
        let mut t = tracker(None, None);
        t.track_file_change("src/a.ts", None, Some("a\nb\nc\n"));
        let status = t.get_status();
        assert_eq!(status.files_added, 1);
        assert_eq!(status.loc_added, 3);
        assert_eq!(status.changed_loc, 3);
    }

    #[test]
    fn deleted_file_counts_removed_loc() {
        let mut t = tracker(None, None);
        t.track_file_change("src/a.ts", Some("a\nb\n"), None);
        let status = t.get_status();
        assert_eq!(status.files_removed, 1);
        assert_eq!(status.loc_removed, 2);
    }

    #[test]
    fn edit_counts_line_delta_only() {
        let mut t = tracker(None, None);
        t.track_file_change("src/a.ts", Some("a\nb\n"), Some("a\nb\nc\nd\n"));
        let status = t.get_status();
        assert_eq!(status.loc_added, 2);
        assert_eq!(status.loc_removed, 0);
        t.track_file_change("src/a.ts", Some("a\nb\nc\nd\n"), Some("a\n"));
        assert_eq!(t.get_status().loc_removed, 3);
    }

    #[test]
    fn same_file_twice_is_one_touched_file() {
        let mut t = tracker(None, None);
        t.track_file_change("src/a.ts", None, Some("x\n"));
        t.track_file_change("src/a.ts", Some("x\n"), Some("x\ny\n"));
        assert_eq!(t.get_status().touched_files_count, 1);
    }

    // ── Limits ────────────────────────────────────────────────────────────────

    #[test]
    fn loc_limit_breach_produces_warning() {
        let mut t = tracker(None, Some(2));
        t.track_file_change("src/a.ts", None, Some("1\n2\n3\n"));
        let status = t.get_status();
        assert!(!status.within_limits);
        assert!(status.warnings[0].contains("changed LOC 3 exceeds limit 2"));
    }

    #[test]
    fn file_limit_breach_produces_warning() {
        let mut t = tracker(Some(1), None);
        t.track_file_change("src/a.ts", None, Some("x\n"));
        t.track_file_change("src/b.ts", None, Some("x\n"));
        let status = t.get_status();
        assert!(!status.within_limits);
        assert!(status
            .warnings
            .iter()
            .any(|w| w.contains("touched files 2 exceeds limit 1")));
    }

    #[test]
    fn within_limits_has_no_warnings() {
        let mut t = tracker(Some(5), Some(100));
        t.track_file_change("src/a.ts", None, Some("x\n"));
        let status = t.get_status();
        assert!(status.within_limits);
        assert!(status.warnings.is_empty());
    }

    #[test]
    fn expansion_check_mirrors_status() {
        let mut t = tracker(Some(1), None);
        t.track_file_change("src/a.ts", None, Some("x\n"));
        assert!(!t.check_scope_expansion().needs_approval);
        t.track_file_change("src/b.ts", None, Some("x\n"));
        let check = t.check_scope_expansion();
        assert!(check.needs_approval);
        assert_eq!(check.touched_files, 2);
        assert_eq!(check.max_files, Some(1));
        assert!(check.reason.contains("exceeds limit"));
    }

    // ── Baseline scan ─────────────────────────────────────────────────────────

    #[test]
    fn initialize_scans_only_allowed_patterns() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("src/a.ts"), "1\n2\n3\n").unwrap();
        std::fs::write(dir.path().join("src/b.ts"), "1\n").unwrap();
        std::fs::write(dir.path().join("docs/x.md"), "ignored\n").unwrap();

        let mut t = ScopeTracker::new(dir.path(), limits(None, None));
        t.initialize().unwrap();
        let status = t.get_status();
        assert_eq!(status.baseline_files, 2);
        assert_eq!(status.baseline_loc, 4);
    }

    #[test]
    fn initialize_skips_hidden_and_build_dirs() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["src", "src/node_modules", "src/.cache"] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        std::fs::write(dir.path().join("src/a.ts"), "x\n").unwrap();
        std::fs::write(dir.path().join("src/node_modules/dep.ts"), "y\n").unwrap();
        std::fs::write(dir.path().join("src/.cache/tmp.ts"), "z\n").unwrap();

        let mut t = ScopeTracker::new(dir.path(), limits(None, None));
        t.initialize().unwrap();
        assert_eq!(t.get_status().baseline_files, 1);
    }

    // ── Summary ───────────────────────────────────────────────────────────────

    #[test]
    fn summary_names_patterns_and_limits() {
        let t = tracker(Some(4), Some(200));
        let s = t.summary();
        assert!(s.contains("src/**"));
        assert!(s.contains("max files: 4"));
        assert!(s.contains("max LOC: 200"));
    }
}
