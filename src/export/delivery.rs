use std::fmt::{self, Display, Formatter};
use std::future::Future;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{ExportArtifact, ExportError};

pub type DeliveryFuture<'a> =
    Pin<Box<dyn Future<Output = Result<DeliveryReceipt, DeliveryError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryKind {
    SaveDialog,
    Download,
    OpenInViewer,
    Clipboard,
}

impl DeliveryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SaveDialog => "save_dialog",
            Self::Download => "download",
            Self::OpenInViewer => "open_in_viewer",
            Self::Clipboard => "clipboard",
        }
    }
}

impl Display for DeliveryKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub kind: DeliveryKind,
    pub filename: String,
    /// Where the artifact landed, when it landed on disk.
    pub location: Option<PathBuf>,
}

impl DeliveryReceipt {
    pub fn describe(&self) -> String {
        match (&self.kind, &self.location) {
            (DeliveryKind::Clipboard, _) => format!("{} copied to clipboard", self.filename),
            (DeliveryKind::OpenInViewer, Some(path)) => format!("opened {}", path.display()),
            (_, Some(path)) => format!("saved {}", path.display()),
            (_, None) => format!("delivered {}", self.filename),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("dialog was dismissed")]
    Cancelled,
    #[error("strategy is unavailable: {0}")]
    Unavailable(String),
    #[error("failed to write `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}")]
    LaunchStatus {
        program: String,
        status: std::process::ExitStatus,
    },
    #[error("clipboard rejected the content: {0}")]
    Clipboard(String),
    #[error("delivery task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub kind: DeliveryKind,
    pub message: String,
}

impl Display for AttemptFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

pub trait DeliveryStrategy: Send + Sync {
    fn kind(&self) -> DeliveryKind;

    fn deliver<'a>(&'a self, artifact: &'a ExportArtifact) -> DeliveryFuture<'a>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOptions {
    pub save_dialog: bool,
    pub export_dir: PathBuf,
    pub open_in_viewer: bool,
}

/// Ordered fallback chain. Strategies run one at a time; the first success
/// wins and later strategies are never started.
#[derive(Default)]
pub struct DeliveryChain {
    strategies: Vec<Box<dyn DeliveryStrategy>>,
}

impl DeliveryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save dialog, export directory, system viewer, then clipboard. Disabled
    /// strategies are left out of the chain entirely.
    pub fn standard(options: &DeliveryOptions, clipboard: Box<dyn ClipboardSink>) -> Self {
        let mut chain = Self::new();
        if options.save_dialog {
            chain.push(SaveDialogStrategy::new(Some(options.export_dir.clone())));
        }
        chain.push(DownloadStrategy::new(options.export_dir.clone()));
        if options.open_in_viewer {
            chain.push(OpenInViewerStrategy::new(
                std::env::temp_dir().join("blockcanvas"),
            ));
        }
        chain.push(ClipboardStrategy::new(clipboard));
        chain
    }

    pub fn with(mut self, strategy: impl DeliveryStrategy + 'static) -> Self {
        self.push(strategy);
        self
    }

    pub fn push(&mut self, strategy: impl DeliveryStrategy + 'static) {
        self.strategies.push(Box::new(strategy));
    }

    pub fn kinds(&self) -> Vec<DeliveryKind> {
        self.strategies.iter().map(|strategy| strategy.kind()).collect()
    }

    pub async fn deliver(&self, artifact: &ExportArtifact) -> Result<DeliveryReceipt, ExportError> {
        let mut failures = Vec::new();
        for strategy in &self.strategies {
            let kind = strategy.kind();
            debug!(strategy = %kind, filename = %artifact.filename, "attempting delivery");
            match strategy.deliver(artifact).await {
                Ok(receipt) => {
                    info!(
                        strategy = %kind,
                        filename = %artifact.filename,
                        failed_attempts = failures.len(),
                        "export delivered"
                    );
                    return Ok(receipt);
                }
                Err(error) => {
                    warn!(strategy = %kind, error = %error, "delivery attempt failed; falling back");
                    failures.push(AttemptFailure {
                        kind,
                        message: error.to_string(),
                    });
                }
            }
        }

        warn!(filename = %artifact.filename, attempts = failures.len(), "all delivery strategies failed");
        Err(ExportError::FallbackExhausted {
            filename: artifact.filename.clone(),
            failures,
        })
    }
}

impl fmt::Debug for DeliveryChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryChain")
            .field("strategies", &self.kinds())
            .finish()
    }
}

pub struct SaveDialogStrategy {
    start_dir: Option<PathBuf>,
}

impl SaveDialogStrategy {
    pub fn new(start_dir: Option<PathBuf>) -> Self {
        Self { start_dir }
    }
}

impl DeliveryStrategy for SaveDialogStrategy {
    fn kind(&self) -> DeliveryKind {
        DeliveryKind::SaveDialog
    }

    fn deliver<'a>(&'a self, artifact: &'a ExportArtifact) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let filename = artifact.filename.clone();
            let extension = artifact.extension().to_owned();
            let start_dir = self.start_dir.clone();
            let picked = tokio::task::spawn_blocking(move || {
                let mut dialog = rfd::FileDialog::new()
                    .set_file_name(&filename)
                    .add_filter(extension.to_uppercase(), &[extension.as_str()]);
                if let Some(dir) = start_dir.filter(|dir| dir.is_dir()) {
                    dialog = dialog.set_directory(dir);
                }
                dialog.save_file()
            })
            .await?;

            let path = picked.ok_or(DeliveryError::Cancelled)?;
            write_artifact(&path, &artifact.bytes).await?;
            Ok(DeliveryReceipt {
                kind: DeliveryKind::SaveDialog,
                filename: artifact.filename.clone(),
                location: Some(path),
            })
        })
    }
}

/// Writes into a fixed directory without overwriting earlier exports.
pub struct DownloadStrategy {
    dir: PathBuf,
}

impl DownloadStrategy {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl DeliveryStrategy for DownloadStrategy {
    fn kind(&self) -> DeliveryKind {
        DeliveryKind::Download
    }

    fn deliver<'a>(&'a self, artifact: &'a ExportArtifact) -> DeliveryFuture<'a> {
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.dir)
                .await
                .map_err(|source| DeliveryError::Io {
                    path: self.dir.clone(),
                    source,
                })?;
            let path = write_unique(&self.dir, &artifact.filename, &artifact.bytes).await?;
            Ok(DeliveryReceipt {
                kind: DeliveryKind::Download,
                filename: artifact.filename.clone(),
                location: Some(path),
            })
        })
    }
}

/// `name.ext` for attempt 0, then `name (1).ext`, `name (2).ext`, ...
pub fn candidate_path(dir: &Path, filename: &str, attempt: usize) -> PathBuf {
    if attempt == 0 {
        return dir.join(filename);
    }
    match filename.rsplit_once('.') {
        Some((stem, extension)) => dir.join(format!("{stem} ({attempt}).{extension}")),
        None => dir.join(format!("{filename} ({attempt})")),
    }
}

/// Claims the first free candidate name with an exclusive create, so a file
/// that appears between attempts is skipped rather than overwritten.
async fn write_unique(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf, DeliveryError> {
    let mut attempt = 0usize;
    loop {
        let path = candidate_path(dir, filename, attempt);
        attempt += 1;
        let opened = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        let mut file = match opened {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "export name taken");
                continue;
            }
            Err(source) => return Err(DeliveryError::Io { path, source }),
        };
        let written = match file.write_all(bytes).await {
            Ok(()) => file.flush().await,
            Err(error) => Err(error),
        };
        return match written {
            Ok(()) => Ok(path),
            Err(source) => Err(DeliveryError::Io { path, source }),
        };
    }
}

async fn write_artifact(path: &Path, bytes: &[u8]) -> Result<(), DeliveryError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| DeliveryError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Stages the artifact in a scratch directory and hands it to the platform
/// opener.
pub struct OpenInViewerStrategy {
    staging_dir: PathBuf,
}

impl OpenInViewerStrategy {
    pub fn new(staging_dir: PathBuf) -> Self {
        Self { staging_dir }
    }
}

impl DeliveryStrategy for OpenInViewerStrategy {
    fn kind(&self) -> DeliveryKind {
        DeliveryKind::OpenInViewer
    }

    fn deliver<'a>(&'a self, artifact: &'a ExportArtifact) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let (program, leading_args) = system_opener().ok_or_else(|| {
                DeliveryError::Unavailable("no system opener on this platform".to_owned())
            })?;
            tokio::fs::create_dir_all(&self.staging_dir)
                .await
                .map_err(|source| DeliveryError::Io {
                    path: self.staging_dir.clone(),
                    source,
                })?;
            let path = self.staging_dir.join(&artifact.filename);
            write_artifact(&path, &artifact.bytes).await?;

            let status = tokio::process::Command::new(program)
                .args(leading_args)
                .arg(&path)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map_err(|source| DeliveryError::Launch {
                    program: program.to_owned(),
                    source,
                })?;
            if !status.success() {
                return Err(DeliveryError::LaunchStatus {
                    program: program.to_owned(),
                    status,
                });
            }
            Ok(DeliveryReceipt {
                kind: DeliveryKind::OpenInViewer,
                filename: artifact.filename.clone(),
                location: Some(path),
            })
        })
    }
}

fn system_opener() -> Option<(&'static str, &'static [&'static str])> {
    if cfg!(target_os = "windows") {
        Some(("cmd", &["/C", "start", ""]))
    } else if cfg!(target_os = "macos") {
        Some(("open", &[]))
    } else if cfg!(any(target_os = "linux", target_os = "freebsd", target_os = "openbsd")) {
        Some(("xdg-open", &[]))
    } else {
        None
    }
}

pub trait ClipboardSink: Send + Sync {
    fn copy_text(&self, text: &str) -> Result<(), DeliveryError>;
}

/// Headless stand-in for a clipboard: the content goes to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl ClipboardSink for StdoutSink {
    fn copy_text(&self, text: &str) -> Result<(), DeliveryError> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{text}")
            .and_then(|()| stdout.flush())
            .map_err(|error| DeliveryError::Clipboard(error.to_string()))
    }
}

pub struct ClipboardStrategy {
    sink: Box<dyn ClipboardSink>,
}

impl ClipboardStrategy {
    pub fn new(sink: Box<dyn ClipboardSink>) -> Self {
        Self { sink }
    }
}

impl DeliveryStrategy for ClipboardStrategy {
    fn kind(&self) -> DeliveryKind {
        DeliveryKind::Clipboard
    }

    fn deliver<'a>(&'a self, artifact: &'a ExportArtifact) -> DeliveryFuture<'a> {
        Box::pin(async move {
            self.sink.copy_text(&artifact.clipboard_text)?;
            Ok(DeliveryReceipt {
                kind: DeliveryKind::Clipboard,
                filename: artifact.filename.clone(),
                location: None,
            })
        })
    }
}
