// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. System-wide default
    paths.push(PathBuf::from("/etc/dax/config.yaml"));
    paths.push(PathBuf::from("/etc/dax/config.yml"));

    // 2. XDG / home
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/dax/config.yaml"));
        paths.push(home.join(".config/dax/config.yml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("dax/config.yaml"));
        paths.push(cfg.join("dax/config.yml"));
    }

    // 3. Workspace-local
    paths.push(PathBuf::from(".dax/config.yaml"));
    paths.push(PathBuf::from(".dax/config.yml"));
    paths.push(PathBuf::from(".dax.yaml"));
    paths.push(PathBuf::from(".dax.yml"));
    paths.push(PathBuf::from("dax.yaml"));
    paths.push(PathBuf::from("dax.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files, then applying
/// environment overrides.  The `extra` argument may provide an explicit path
/// (e.g. `--config` CLI flag), which takes priority over every file layer.
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    // Deserialize the merged YAML value into Config, falling back to defaults
    // when the merged value is empty (no config files found).
    let mut config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty())
    {
        Config::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Environment variables win over every file layer.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(url) = std::env::var("DAX_API_URL") {
        if !url.is_empty() {
            config.api_url = Some(url);
        }
    }
    if let Ok(policy) = std::env::var("DAX_POLICY") {
        if !policy.is_empty() {
            config.policy = policy;
        }
    }
    if env_flag("DAX_TUI") {
        config.tui.force_tui = true;
    }
    if env_flag("DAX_TUI_ALLOW_PIPE") {
        config.tui.allow_pipe = true;
    }
}

/// A flag env var is set when present and not one of "", "0", "false".
fn env_flag(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => !matches!(v.as_str(), "" | "0" | "false"),
        Err(_) => false,
    }
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
