use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_path(prefix: &str) -> PathBuf {
    let now_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "blockcanvas_{prefix}_{}_{}",
        std::process::id(),
        now_ns
    ))
}

pub fn remove_dir_if_exists(path: &Path) {
    let _ = std::fs::remove_dir_all(path);
}

/// Unattended configuration: no dialogs, no external viewer, everything
/// under `root`.
pub fn apply_editor_test_env(command: &mut Command, root: &Path) {
    command.env("BLOCKCANVAS_DATA_DIR", root.join("data").as_os_str());
    command.env("BLOCKCANVAS_EXPORT_DIR", root.join("exports").as_os_str());
    command.env("BLOCKCANVAS_SNAP_TO_GRID", "true");
    command.env("BLOCKCANVAS_ORTHOGONAL_EDGES", "false");
    command.env("BLOCKCANVAS_OPEN_EXPORTS", "false");
    command.env("BLOCKCANVAS_SAVE_DIALOG", "false");
    command.env("RUST_LOG", "error");
    command.env("BLOCKCANVAS_FILE_LOG", "error");
    command.env("BLOCKCANVAS_LOG_DIR", root.join("logs").as_os_str());
}
