use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, ensure};

use crate::canvas::EditorOptions;
use crate::export::delivery::DeliveryOptions;

pub const DEFAULT_DATA_DIR: &str = ".blockcanvas";
pub const DEFAULT_EXPORT_DIR: &str = "exports";
pub const DEFAULT_LOG_DIR: &str = "logs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorSettings {
    pub data_dir: PathBuf,
    pub export_dir: PathBuf,
    pub snap_to_grid: bool,
    pub orthogonal_edges: bool,
    pub open_exports: bool,
    pub save_dialog: bool,
}

impl EditorSettings {
    pub fn from_env() -> Result<Self> {
        // Load .env if present, but do not fail if file does not exist.
        let _ = dotenvy::dotenv();

        let data_dir = parse_dir_env("BLOCKCANVAS_DATA_DIR", DEFAULT_DATA_DIR)?;
        let export_dir = parse_dir_env("BLOCKCANVAS_EXPORT_DIR", DEFAULT_EXPORT_DIR)?;

        Ok(Self {
            data_dir,
            export_dir,
            snap_to_grid: parse_bool_env("BLOCKCANVAS_SNAP_TO_GRID", true)?,
            orthogonal_edges: parse_bool_env("BLOCKCANVAS_ORTHOGONAL_EDGES", false)?,
            open_exports: parse_bool_env("BLOCKCANVAS_OPEN_EXPORTS", true)?,
            save_dialog: parse_bool_env("BLOCKCANVAS_SAVE_DIALOG", true)?,
        })
    }

    pub fn editor_options(&self) -> EditorOptions {
        EditorOptions {
            snap_to_grid: self.snap_to_grid,
            orthogonal_edges: self.orthogonal_edges,
        }
    }

    pub fn delivery_options(&self) -> DeliveryOptions {
        DeliveryOptions {
            save_dialog: self.save_dialog,
            export_dir: self.export_dir.clone(),
            open_in_viewer: self.open_exports,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// `EnvFilter` directive for the rolling file log; `None` disables it.
    pub file_filter: Option<String>,
    pub log_dir: PathBuf,
}

impl LogSettings {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Ok(Self {
            file_filter: read_optional_env("BLOCKCANVAS_FILE_LOG"),
            log_dir: parse_dir_env("BLOCKCANVAS_LOG_DIR", DEFAULT_LOG_DIR)?,
        })
    }
}

fn read_optional_env(name: &str) -> Option<String> {
    env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    })
}

fn parse_dir_env(name: &str, default: &str) -> Result<PathBuf> {
    match env::var(name) {
        Ok(raw) => {
            ensure!(!raw.trim().is_empty(), "{name} cannot be empty");
            Ok(PathBuf::from(raw.trim()))
        }
        Err(_) => Ok(PathBuf::from(default)),
    }
}

fn parse_bool_env(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => parse_bool(&raw).with_context(|| format!("failed to parse {name} as bool")),
        Err(_) => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("invalid boolean `{other}`; expected true or false")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_values_accept_common_spellings() {
        for raw in ["1", "true", "TRUE", " yes ", "on"] {
            assert!(parse_bool(raw).expect("truthy value"), "{raw}");
        }
        for raw in ["0", "false", "No", "off"] {
            assert!(!parse_bool(raw).expect("falsy value"), "{raw}");
        }
        let error = parse_bool("maybe").expect_err("not a bool");
        assert!(error.to_string().contains("maybe"));
    }

    #[test]
    fn settings_map_onto_editor_and_delivery_options() {
        let settings = EditorSettings {
            data_dir: PathBuf::from("data"),
            export_dir: PathBuf::from("out"),
            snap_to_grid: false,
            orthogonal_edges: true,
            open_exports: false,
            save_dialog: true,
        };
        assert_eq!(
            settings.editor_options(),
            EditorOptions {
                snap_to_grid: false,
                orthogonal_edges: true,
            }
        );
        let delivery = settings.delivery_options();
        assert_eq!(delivery.export_dir, PathBuf::from("out"));
        assert!(delivery.save_dialog);
        assert!(!delivery.open_in_viewer);
    }
}
