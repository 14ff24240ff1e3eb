// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use regex::Regex;
use serde::{Deserialize, Serialize};

use dax_config::ContractConfig;

/// File extensions the validator applies to.
const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    /// Blocks the write
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub path: String,
    /// Machine-readable rule code, e.g. `forbidden.type`
    pub code: String,
    /// 1-indexed line number
    pub line: usize,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub valid: bool,
    pub violations: Vec<Violation>,
}

/// Per-file rule engine applied to candidate writes.
///
/// Pure and stateless after construction; safe to share across sessions.
pub struct ContractValidator {
    forbidden_types: Vec<(String, Regex)>,
    forbidden_apis: Vec<String>,
    forbid_default_export: bool,
    max_nesting: Option<u32>,
}

impl ContractValidator {
    pub fn from_config(cfg: &ContractConfig) -> Self {
        let forbidden_types = cfg
            .forbidden
            .types
            .iter()
            .filter_map(|pat| Regex::new(pat).ok().map(|re| (pat.clone(), re)))
            .collect();
        let forbid_default_export = cfg
            .forbidden
            .patterns
            .iter()
            .any(|p| p == "default export");
        Self {
            forbidden_types,
            forbidden_apis: cfg.forbidden.apis.clone(),
            forbid_default_export,
            max_nesting: cfg.architecture.max_nesting,
        }
    }

    /// Validate one candidate file.  Non-source paths pass untouched.
    pub fn validate(&self, content: &str, path: &str) -> ValidationReport {
        if !is_source_file(path) {
            return ValidationReport {
                valid: true,
                violations: Vec::new(),
            };
        }

        let mut violations = Vec::new();
        let skip_debug_rule = is_test_file(path);
        let mut depth: i64 = 0;

        for (idx, line) in content.lines().enumerate() {
            let lineno = idx + 1;

            for (pattern, re) in &self.forbidden_types {
                if re.is_match(line) {
                    violations.push(Violation {
                        path: path.to_string(),
                        code: "forbidden.type".into(),
                        line: lineno,
                        severity: Severity::Error,
                        message: format!("forbidden type pattern {pattern:?}"),
                    });
                }
            }

            for api in &self.forbidden_apis {
                if line.contains(api.as_str()) {
                    violations.push(Violation {
                        path: path.to_string(),
                        code: "forbidden.api".into(),
                        line: lineno,
                        severity: Severity::Error,
                        message: format!("forbidden API {api:?}"),
                    });
                }
            }

            if self.forbid_default_export && line.contains("export default") {
                violations.push(Violation {
                    path: path.to_string(),
                    code: "forbidden.pattern".into(),
                    line: lineno,
                    severity: Severity::Error,
                    message: "default export is forbidden".into(),
                });
            }

            if !skip_debug_rule
                && (line.contains("console.log(") || line.contains("console.debug("))
            {
                violations.push(Violation {
                    path: path.to_string(),
                    code: "no_debug_prints".into(),
                    line: lineno,
                    severity: Severity::Warning,
                    message: "debug print in non-test file".into(),
                });
            }

            // Running brace depth.  Warn once, on the line where the depth
            // first crosses the threshold, not on every line inside the
            // too-deep block.
            if let Some(max_nesting) = self.max_nesting {
                let start_depth = depth;
                let mut line_peak = depth;
                for ch in line.chars() {
                    match ch {
                        '{' => {
                            depth += 1;
                            line_peak = line_peak.max(depth);
                        }
                        '}' => depth -= 1,
                        _ => {}
                    }
                }
                let limit = i64::from(max_nesting);
                if line_peak > limit && start_depth <= limit {
                    violations.push(Violation {
                        path: path.to_string(),
                        code: "architecture.max_nesting".into(),
                        line: lineno,
                        severity: Severity::Warning,
                        message: format!("nesting depth {line_peak} exceeds {max_nesting}"),
                    });
                }
            }
        }

        ValidationReport {
            valid: !violations.iter().any(|v| v.severity == Severity::Error),
            violations,
        }
    }

    /// Validate a batch of `(path, content)` pairs, concatenating reports.
    pub fn validate_batch(&self, files: &[(String, String)]) -> ValidationReport {
        let mut violations = Vec::new();
        for (path, content) in files {
            violations.extend(self.validate(content, path).violations);
        }
        ValidationReport {
            valid: !violations.iter().any(|v| v.severity == Severity::Error),
            violations,
        }
    }
}

fn is_source_file(path: &str) -> bool {
    path.rsplit('.')
        .next()
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn is_test_file(path: &str) -> bool {
    path.contains(".test.") || path.contains(".spec.")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(yaml: &str) -> ContractValidator {
        let cfg: ContractConfig = serde_yaml::from_str(yaml).unwrap();
        ContractValidator::from_config(&cfg)
    }

    // ── Forbidden types ───────────────────────────────────────────────────────

    #[test]
    fn forbidden_type_regex_is_an_error() {
        let v = validator("forbidden:\n  types: [': any', 'as any']");
        let report = v.validate("const x: any = 1;\n", "src/a.ts");
        assert!(!report.valid);
        assert_eq!(report.violations[0].code, "forbidden.type");
        assert_eq!(report.violations[0].line, 1);
        assert_eq!(report.violations[0].severity, Severity::Error);
    }

    #[test]
    fn clean_file_is_valid() {
        let v = validator("forbidden:\n  types: [': any']");
        let report = v.validate("const x: number = 1;\n", "src/a.ts");
        assert!(report.valid);
        assert!(report.violations.is_empty());
    }

    // ── Forbidden APIs ────────────────────────────────────────────────────────

    #[test]
    fn forbidden_api_substring_is_an_error() {
        let v = validator("forbidden:\n  apis: ['eval(']");
        let report = v.validate("const y = eval(code);\n", "src/a.ts");
        assert!(!report.valid);
        assert_eq!(report.violations[0].code, "forbidden.api");
    }

    // ── Named patterns ────────────────────────────────────────────────────────

    #[test]
    fn default_export_pattern_is_an_error() {
        let v = validator("forbidden:\n  patterns: ['default export']");
        let report = v.validate("export default class Foo {}\n", "src/a.tsx");
        assert!(!report.valid);
        assert_eq!(report.violations[0].code, "forbidden.pattern");
    }

    #[test]
    fn named_export_is_fine() {
        let v = validator("forbidden:\n  patterns: ['default export']");
        assert!(v.validate("export class Foo {}\n", "src/a.tsx").valid);
    }

    // ── Nesting ───────────────────────────────────────────────────────────────

    #[test]
    fn deep_nesting_warns_but_does_not_block() {
        let v = validator("architecture:\n  max_nesting: 2");
        let code = "function f() {\n  if (a) {\n    if (b) {\n    }\n  }\n}\n";
        let report = v.validate(code, "src/a.ts");
        assert!(report.valid, "warnings alone keep the file valid");
        let nesting: Vec<&Violation> = report
            .violations
            .iter()
            .filter(|v| v.code == "architecture.max_nesting")
            .collect();
        assert_eq!(nesting.len(), 1);
        assert_eq!(nesting[0].line, 3);
        assert_eq!(nesting[0].severity, Severity::Warning);
    }

    #[test]
    fn shallow_nesting_is_silent() {
        let v = validator("architecture:\n  max_nesting: 3");
        let code = "function f() {\n  if (a) {\n  }\n}\n";
        assert!(v.validate(code, "src/a.ts").violations.is_empty());
    }

    // ── Debug prints ──────────────────────────────────────────────────────────

    #[test]
    fn console_log_warns_in_source_files() {
        let v = validator("{}");
        let report = v.validate("console.log('hi');\n", "src/a.ts");
        assert!(report.valid);
        assert_eq!(report.violations[0].code, "no_debug_prints");
        assert_eq!(report.violations[0].severity, Severity::Warning);
    }

    #[test]
    fn console_log_allowed_in_test_files() {
        let v = validator("{}");
        assert!(v.validate("console.log('hi');\n", "src/a.test.ts").violations.is_empty());
        assert!(v.validate("console.log('hi');\n", "src/a.spec.tsx").violations.is_empty());
    }

    // ── Source predicate ──────────────────────────────────────────────────────

    #[test]
    fn non_source_files_pass_untouched() {
        let v = validator("forbidden:\n  apis: ['eval(']");
        assert!(v.validate("eval(anything)", "README.md").valid);
        assert!(v.validate("eval(anything)", "src/main.rs").valid);
    }

    #[test]
    fn all_source_extensions_are_validated() {
        let v = validator("forbidden:\n  apis: ['eval(']");
        for path in ["a.ts", "a.tsx", "a.js", "a.jsx"] {
            assert!(!v.validate("eval(x)\n", path).valid, "{path}");
        }
    }

    // ── Batch ─────────────────────────────────────────────────────────────────

    #[test]
    fn batch_concatenates_violations() {
        let v = validator("forbidden:\n  apis: ['eval(']");
        let files = vec![
            ("src/a.ts".to_string(), "eval(x)\n".to_string()),
            ("src/b.ts".to_string(), "clean\n".to_string()),
            ("src/c.ts".to_string(), "eval(y)\n".to_string()),
        ];
        let report = v.validate_batch(&files);
        assert!(!report.valid);
        assert_eq!(report.violations.len(), 2);
        assert_eq!(report.violations[0].path, "src/a.ts");
        assert_eq!(report.violations[1].path, "src/c.ts");
    }
}
