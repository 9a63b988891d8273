use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use blockcanvas::canvas::viewport::ViewportState;
use blockcanvas::config::{EditorSettings, LogSettings};
use blockcanvas::export::delivery::{DeliveryChain, StdoutSink};
use blockcanvas::export::{ExportKind, ExportRequest};
use blockcanvas::layout::LayoutStore;
use blockcanvas::layout::document::parse_layout_document;
use blockcanvas::layout::migrate::{MigrationRules, migrate_document};
use blockcanvas::layout::persist::FileKeyValueStore;
use blockcanvas::studio::run_studio;

#[derive(Debug, Parser)]
#[command(name = "blockcanvas", about = "Interactive block-diagram editor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Open the interactive editor.
    Studio {
        /// Start from this layout JSON instead of the persisted one.
        #[arg(long)]
        layout: Option<PathBuf>,
    },
    /// Render a layout to SVG or PNG without opening a window.
    Export {
        #[arg(long)]
        layout: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Svg)]
        format: OutputFormat,
        /// Write here directly; otherwise the delivery fallback chain runs.
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        orthogonal: bool,
    },
    /// Rewrite a legacy layout file with current ids and labels.
    Migrate {
        #[arg(long)]
        layout: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Push a small fixed diagram through the delivery chain.
    TestExport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Svg,
    Png,
}

impl From<OutputFormat> for ExportKind {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Svg => ExportKind::Svg,
            OutputFormat::Png => ExportKind::Png,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_settings = LogSettings::from_env().context("failed to load logging configuration")?;
    let _log_guard = init_tracing(&log_settings)?;

    let cli = Cli::parse();
    let settings = EditorSettings::from_env().context("failed to load configuration")?;

    match cli.command {
        Commands::Studio { layout } => run_studio(&settings, layout.as_deref())?,
        Commands::Export {
            layout,
            format,
            output,
            orthogonal,
        } => {
            let store = load_layout(&settings, layout.as_deref())?;
            let request = ExportRequest {
                kind: format.into(),
                store,
                viewport: ViewportState::default(),
                orthogonal: orthogonal || settings.orthogonal_edges,
            };
            export(&settings, request, output.as_deref()).await?;
        }
        Commands::Migrate { layout, output } => migrate(&layout, output.as_deref())?,
        Commands::TestExport => {
            let request = ExportRequest {
                kind: ExportKind::Test,
                store: LayoutStore::empty(),
                viewport: ViewportState::default(),
                orthogonal: false,
            };
            export(&settings, request, None).await?;
        }
    }

    Ok(())
}

fn load_layout(settings: &EditorSettings, path: Option<&Path>) -> Result<LayoutStore> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read layout {}", path.display()))?;
            LayoutStore::from_json(&raw)
                .with_context(|| format!("failed to import layout {}", path.display()))
        }
        None => LayoutStore::load(&FileKeyValueStore::new(settings.data_dir.clone())),
    }
}

async fn export(settings: &EditorSettings, request: ExportRequest, output: Option<&Path>) -> Result<()> {
    let kind = request.kind;
    let artifact = tokio::task::spawn_blocking(move || request.build())
        .await
        .context("export task panicked")?
        .with_context(|| format!("failed to build {} export", kind.as_str()))?;

    if let Some(path) = output {
        std::fs::write(path, &artifact.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), bytes = artifact.bytes.len(), "export written");
        return Ok(());
    }

    let chain = DeliveryChain::standard(&settings.delivery_options(), Box::new(StdoutSink));
    let receipt = chain
        .deliver(&artifact)
        .await
        .with_context(|| format!("failed to deliver {}", artifact.filename))?;
    eprintln!("{}", receipt.describe());
    Ok(())
}

fn migrate(layout: &Path, output: Option<&Path>) -> Result<()> {
    let raw = std::fs::read_to_string(layout)
        .with_context(|| format!("failed to read layout {}", layout.display()))?;
    let mut document = parse_layout_document(&raw)
        .with_context(|| format!("failed to parse layout {}", layout.display()))?;
    let report = migrate_document(&mut document, &MigrationRules::default());
    info!(
        renamed_nodes = report.renamed_nodes,
        rewritten_labels = report.rewritten_labels,
        rehomed_edges = report.rehomed_edges,
        normalized_edge_labels = report.normalized_edge_labels,
        "migration pass finished"
    );

    let json = serde_json::to_string_pretty(&document).context("failed to serialize migrated layout")?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn init_tracing(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,blockcanvas=debug"));
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .with_filter(env_filter);

    let (file_layer, guard) = match &settings.file_filter {
        Some(directive) => {
            let filter = EnvFilter::try_new(directive)
                .with_context(|| format!("invalid BLOCKCANVAS_FILE_LOG directive `{directive}`"))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("blockcanvas")
                .filename_suffix("log")
                .build(&settings.log_dir)
                .with_context(|| {
                    format!("failed to open log directory {}", settings.log_dir.display())
                })?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;
    Ok(guard)
}
