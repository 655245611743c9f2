use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;

use crate::encoding::{EncodingStrategy, NewlineStyle};
use crate::files::BackupNaming;
use crate::lifecycle::ApplyOptions;
use crate::verify::standard_verifiers;

/// Looked up at the project root, first match wins.
pub const CONFIG_FILES: [&str; 3] = [".linepatch.yaml", ".linepatch.yml", ".linepatch.json"];

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub encoding: EncodingConfig,
    pub newline: Option<NewlineStyle>,
    pub backup: BackupConfig,
    pub verify: VerifyConfig,
    pub change_log: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    #[serde(rename = "override")]
    pub override_label: Option<String>,
    pub candidates: Option<Vec<String>>,
    pub detector_hint: Option<bool>,
    pub allow_uncertain: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BackupConfig {
    pub suffix: Option<String>,
    pub deleted_suffix: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct VerifyConfig {
    pub brace_balance: Option<bool>,
    pub shrink_guard: Option<bool>,
    pub min_result_ratio: Option<f64>,
}

/// Settings given on the command line; these win over the config file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub encoding: Option<String>,
    pub allow_uncertain: Option<bool>,
    pub no_verify: bool,
    pub no_change_log: bool,
}

pub fn load_config(path: &Path) -> Result<ProjectConfig> {
    let data = fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
    let config = if path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
    {
        serde_json::from_slice(&data)
            .with_context(|| format!("parsing config {}", path.display()))?
    } else {
        serde_yaml::from_slice(&data)
            .with_context(|| format!("parsing config {}", path.display()))?
    };
    Ok(config)
}

/// Loads the first config file found at `root`, or the defaults.
pub fn discover(root: &Path) -> Result<(Option<PathBuf>, ProjectConfig)> {
    for name in CONFIG_FILES {
        let candidate = root.join(name);
        if candidate.is_file() {
            debug!(path = %candidate.display(), "loading project config");
            let config = load_config(&candidate)?;
            return Ok((Some(candidate), config));
        }
    }
    Ok((None, ProjectConfig::default()))
}

pub fn merge_overrides(base: &ProjectConfig, overrides: &CliOverrides) -> ProjectConfig {
    let mut merged = base.clone();
    if let Some(encoding) = &overrides.encoding {
        merged.encoding.override_label = Some(encoding.clone());
    }
    if let Some(allow) = overrides.allow_uncertain {
        merged.encoding.allow_uncertain = Some(allow);
    }
    if overrides.no_verify {
        merged.verify.brace_balance = Some(false);
        merged.verify.shrink_guard = Some(false);
    }
    if overrides.no_change_log {
        merged.change_log = Some(false);
    }
    merged
}

impl ProjectConfig {
    pub fn encoding_strategy(&self) -> Result<EncodingStrategy> {
        let mut strategy = EncodingStrategy::new(self.encoding.override_label.as_deref())?;
        if let Some(candidates) = &self.encoding.candidates {
            if candidates.is_empty() {
                bail!("encoding.candidates must list at least one encoding");
            }
            strategy = strategy.with_candidates(candidates)?;
        }
        if let Some(hint) = self.encoding.detector_hint {
            strategy = strategy.with_detector_hint(hint);
        }
        if let Some(newline) = self.newline {
            strategy = strategy.with_default_newline(newline);
        }
        Ok(strategy)
    }

    pub fn backup_naming(&self) -> Result<BackupNaming> {
        let mut naming = BackupNaming::default();
        if let Some(suffix) = &self.backup.suffix {
            naming.suffix = suffix.clone();
        }
        if let Some(suffix) = &self.backup.deleted_suffix {
            naming.deleted_suffix = suffix.clone();
        }
        for suffix in [&naming.suffix, &naming.deleted_suffix] {
            if !suffix.starts_with('.') || suffix.len() < 2 || suffix.contains(['/', '\\']) {
                bail!("backup suffix '{suffix}' must start with '.' and name no directory");
            }
        }
        if naming.suffix == naming.deleted_suffix {
            bail!("backup.suffix and backup.deleted_suffix must differ");
        }
        Ok(naming)
    }

    /// Library options for a batch, before per-run flags such as dry-run.
    pub fn apply_options(&self) -> Result<ApplyOptions> {
        let ratio = self.verify.min_result_ratio.unwrap_or(0.1);
        if !(0.0..=1.0).contains(&ratio) {
            bail!("verify.min_result_ratio must be between 0 and 1, got {ratio}");
        }
        let shrink = self.verify.shrink_guard.unwrap_or(true).then_some(ratio);
        Ok(ApplyOptions {
            encoding: self.encoding_strategy()?,
            allow_uncertain: self.encoding.allow_uncertain.unwrap_or(false),
            backup: self.backup_naming()?,
            verifiers: standard_verifiers(self.verify.brace_balance.unwrap_or(true), shrink),
            change_log: self.change_log.unwrap_or(true),
            ..ApplyOptions::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn yaml_and_json_by_extension() {
        let temp = tempdir().expect("temp dir");
        let yaml = temp.path().join(".linepatch.yaml");
        fs::write(
            &yaml,
            "encoding:\n  override: euc-kr\n  allow_uncertain: true\nnewline: crlf\nverify:\n  brace_balance: false\n",
        )
        .expect("write yaml");
        let config = load_config(&yaml).expect("yaml config");
        assert_eq!(config.encoding.override_label.as_deref(), Some("euc-kr"));
        assert_eq!(config.newline, Some(NewlineStyle::Crlf));
        assert_eq!(config.verify.brace_balance, Some(false));

        let json = temp.path().join("settings.json");
        fs::write(&json, r#"{"backup": {"suffix": ".orig"}, "change_log": false}"#)
            .expect("write json");
        let config = load_config(&json).expect("json config");
        assert_eq!(config.backup.suffix.as_deref(), Some(".orig"));
        assert_eq!(config.change_log, Some(false));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join(".linepatch.yaml");
        fs::write(&path, "encodings: {}\n").expect("write");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn discover_falls_back_to_defaults() {
        let temp = tempdir().expect("temp dir");
        let (path, config) = discover(temp.path()).expect("discover");
        assert!(path.is_none());
        assert_eq!(config, ProjectConfig::default());

        fs::write(temp.path().join(".linepatch.json"), "{\"newline\": \"lf\"}").expect("write");
        let (path, config) = discover(temp.path()).expect("discover");
        assert!(path.is_some());
        assert_eq!(config.newline, Some(NewlineStyle::Lf));
    }

    #[test]
    fn cli_overrides_win() {
        let base = ProjectConfig {
            encoding: EncodingConfig {
                override_label: Some("gbk".to_string()),
                ..EncodingConfig::default()
            },
            ..ProjectConfig::default()
        };
        let merged = merge_overrides(
            &base,
            &CliOverrides {
                encoding: Some("shift_jis".to_string()),
                no_verify: true,
                ..CliOverrides::default()
            },
        );
        assert_eq!(merged.encoding.override_label.as_deref(), Some("shift_jis"));
        let options = merged.apply_options().expect("options");
        assert!(options.verifiers.is_empty());
        assert!(options.change_log);
    }

    #[test]
    fn invalid_settings_fail_early() {
        let mut config = ProjectConfig::default();
        config.backup.suffix = Some("bak".to_string());
        assert!(config.apply_options().is_err());

        let mut config = ProjectConfig::default();
        config.verify.min_result_ratio = Some(1.5);
        assert!(config.apply_options().is_err());

        let mut config = ProjectConfig::default();
        config.encoding.candidates = Some(vec!["utf-16le".to_string()]);
        assert!(config.apply_options().is_err());
    }
}
