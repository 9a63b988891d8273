use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use eframe::egui;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{info, warn};

use crate::canvas::{EditRequest, Editor};
use crate::config::EditorSettings;
use crate::export::delivery::{ClipboardSink, DeliveryChain, DeliveryError};
use crate::export::{ExportKind, ExportRequest};
use crate::layout::LayoutStore;
use crate::layout::persist::{FileKeyValueStore, KeyValueStore};

pub mod canvas;
pub mod events;

use self::canvas::show_editor_canvas;
use self::events::{StudioCommand, StudioEvent};

const APP_TITLE: &str = "blockcanvas studio";

pub fn run_studio(settings: &EditorSettings, layout_path: Option<&Path>) -> Result<()> {
    let runtime_handle = Handle::try_current().context("studio requires a tokio runtime")?;
    let kv = FileKeyValueStore::new(settings.data_dir.clone());
    let store = load_initial_layout(&kv, layout_path)?;

    let (command_tx, command_rx) = unbounded_channel::<StudioCommand>();
    let (event_tx, event_rx) = unbounded_channel::<StudioEvent>();
    let app_settings = settings.clone();
    let delivery_options = settings.delivery_options();

    info!(
        data_dir = %settings.data_dir.display(),
        export_dir = %settings.export_dir.display(),
        nodes = store.node_count(),
        edges = store.edges().len(),
        "starting native studio"
    );

    eframe::run_native(
        APP_TITLE,
        eframe::NativeOptions::default(),
        Box::new(move |cc| {
            let clipboard = EguiClipboard(cc.egui_ctx.clone());
            let chain = DeliveryChain::standard(&delivery_options, Box::new(clipboard));
            spawn_export_worker(&runtime_handle, chain, command_rx, event_tx, cc.egui_ctx.clone());
            Ok(Box::new(StudioApp::new(
                app_settings,
                store,
                kv,
                command_tx,
                event_rx,
            )))
        }),
    )
    .map_err(|error| anyhow::anyhow!("studio UI exited with error: {error}"))
}

fn load_initial_layout(kv: &dyn KeyValueStore, layout_path: Option<&Path>) -> Result<LayoutStore> {
    let Some(path) = layout_path else {
        return LayoutStore::load(kv);
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read layout {}", path.display()))?;
    LayoutStore::from_json(&raw).with_context(|| format!("failed to import layout {}", path.display()))
}

fn spawn_export_worker(
    handle: &Handle,
    chain: DeliveryChain,
    mut command_rx: UnboundedReceiver<StudioCommand>,
    event_tx: UnboundedSender<StudioEvent>,
    repaint: egui::Context,
) {
    let _task = handle.spawn(async move {
        while let Some(command) = command_rx.recv().await {
            let request = match command {
                StudioCommand::Export(request) => request,
                StudioCommand::Shutdown => break,
            };
            let kind = request.kind;
            if event_tx.send(StudioEvent::ExportStarted { kind }).is_err() {
                break;
            }

            let artifact = match tokio::task::spawn_blocking(move || request.build()).await {
                Ok(Ok(artifact)) => Ok(artifact),
                Ok(Err(error)) => Err(error.to_string()),
                Err(error) => Err(format!("export task failed: {error}")),
            };
            let event = match artifact {
                Ok(artifact) => match chain.deliver(&artifact).await {
                    Ok(receipt) => StudioEvent::ExportDelivered { kind, receipt },
                    Err(error) => StudioEvent::ExportFailed {
                        kind,
                        error: error.to_string(),
                    },
                },
                Err(error) => StudioEvent::ExportFailed { kind, error },
            };
            if event_tx.send(event).is_err() {
                break;
            }
            repaint.request_repaint();
        }
    });
}

struct EguiClipboard(egui::Context);

impl ClipboardSink for EguiClipboard {
    fn copy_text(&self, text: &str) -> Result<(), DeliveryError> {
        self.0.copy_text(text.to_owned());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingEdit {
    request: EditRequest,
    buffer: String,
    focused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ImportDialog {
    open: bool,
    buffer: String,
}

struct StudioApp {
    settings: EditorSettings,
    editor: Editor,
    kv: FileKeyValueStore,
    command_tx: UnboundedSender<StudioCommand>,
    event_rx: UnboundedReceiver<StudioEvent>,
    pending_edit: Option<PendingEdit>,
    import: ImportDialog,
    alert: Option<String>,
    status: String,
    exports_in_flight: usize,
    runtime_disconnected: bool,
}

impl StudioApp {
    fn new(
        settings: EditorSettings,
        store: LayoutStore,
        kv: FileKeyValueStore,
        command_tx: UnboundedSender<StudioCommand>,
        event_rx: UnboundedReceiver<StudioEvent>,
    ) -> Self {
        let editor = Editor::new(store, settings.editor_options());
        Self {
            settings,
            editor,
            kv,
            command_tx,
            event_rx,
            pending_edit: None,
            import: ImportDialog::default(),
            alert: None,
            status: "Ready".to_owned(),
            exports_in_flight: 0,
            runtime_disconnected: false,
        }
    }

    fn drain_events(&mut self) {
        loop {
            match self.event_rx.try_recv() {
                Ok(event) => self.apply_event(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.runtime_disconnected {
                        warn!("studio export worker disconnected");
                        self.alert =
                            Some("Export worker disconnected. Restart studio to export.".to_owned());
                    }
                    self.runtime_disconnected = true;
                    self.exports_in_flight = 0;
                    break;
                }
            }
        }
    }

    fn apply_event(&mut self, event: StudioEvent) {
        self.status = event.status_line();
        match event {
            StudioEvent::ExportStarted { .. } => {}
            StudioEvent::ExportDelivered { .. } => {
                self.exports_in_flight = self.exports_in_flight.saturating_sub(1);
            }
            StudioEvent::ExportFailed { .. } => {
                self.exports_in_flight = self.exports_in_flight.saturating_sub(1);
                self.alert = Some(self.status.clone());
            }
        }
    }

    fn request_export(&mut self, kind: ExportKind) {
        let request = ExportRequest {
            kind,
            store: self.editor.store().clone(),
            viewport: self.editor.viewport().state(),
            orthogonal: self.editor.options().orthogonal_edges,
        };
        if let Err(error) = self.command_tx.send(StudioCommand::Export(request)) {
            self.runtime_disconnected = true;
            self.alert = Some(format!("Failed to queue {} export: {error}", kind.as_str()));
            return;
        }
        self.exports_in_flight += 1;
        self.status = format!("Queued {} export...", kind.as_str());
    }

    fn persist_if_dirty(&mut self) {
        if self.editor.is_interacting() || !self.editor.take_dirty() {
            return;
        }
        if let Err(error) = self.editor.store().save(&self.kv) {
            warn!(error = %format!("{error:#}"), "failed to persist layout");
            self.status = format!("Layout not saved: {error}");
        }
    }

    fn render_toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal_wrapped(|ui| {
            if ui.button("−").on_hover_text("Zoom out").clicked() {
                self.editor.viewport_mut().zoom_out();
            }
            ui.label(format!("{:.0}%", self.editor.viewport().scale() * 100.0));
            if ui.button("+").on_hover_text("Zoom in").clicked() {
                self.editor.viewport_mut().zoom_in();
            }
            if ui.button("Reset view").clicked() {
                self.editor.viewport_mut().reset();
            }
            ui.separator();

            let mut snap = self.editor.options().snap_to_grid;
            if ui.checkbox(&mut snap, "Snap to grid").changed() {
                self.editor.set_snap_to_grid(snap);
            }
            let mut orthogonal = self.editor.options().orthogonal_edges;
            if ui.checkbox(&mut orthogonal, "Orthogonal edges").changed() {
                self.editor.set_orthogonal_edges(orthogonal);
            }
            ui.separator();

            let can_export = !self.runtime_disconnected;
            for (kind, label) in [
                (ExportKind::Svg, "Export SVG"),
                (ExportKind::Png, "Export PNG"),
                (ExportKind::Layout, "Export layout"),
                (ExportKind::Test, "Test export"),
            ] {
                if ui.add_enabled(can_export, egui::Button::new(label)).clicked() {
                    self.request_export(kind);
                }
            }
            if ui.button("Import layout").clicked() {
                self.import.open = true;
            }
        });
    }

    fn render_status_bar(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label(&self.status);
            if self.exports_in_flight > 0 {
                ui.spinner();
            }
            ui.separator();
            ui.label(format!(
                "{} blocks | {} connectors | exports to {}",
                self.editor.store().node_count(),
                self.editor.store().edges().len(),
                self.settings.export_dir.display()
            ));
        });
    }

    fn render_edit_window(&mut self, ctx: &egui::Context) {
        let Some(pending) = self.pending_edit.as_mut() else {
            return;
        };
        let mut response = None;
        let mut dismissed = false;
        egui::Window::new(pending.request.prompt())
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                let edit = ui.text_edit_singleline(&mut pending.buffer);
                if !pending.focused {
                    edit.request_focus();
                    pending.focused = true;
                }
                let submitted = edit.lost_focus() && ui.input(|input| input.key_pressed(egui::Key::Enter));
                ui.horizontal(|ui| {
                    if ui.button("OK").clicked() || submitted {
                        response = Some(pending.buffer.clone());
                    }
                    if ui.button("Cancel").clicked() {
                        dismissed = true;
                    }
                });
            });

        if response.is_some() || dismissed {
            if let Some(pending) = self.pending_edit.take() {
                self.editor.commit_edit(&pending.request, response.as_deref());
            }
        }
    }

    fn render_import_window(&mut self, ctx: &egui::Context) {
        if !self.import.open {
            return;
        }
        let mut open = self.import.open;
        let mut submit = false;
        egui::Window::new("Import layout JSON")
            .open(&mut open)
            .default_width(420.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().max_height(320.0).show(ui, |ui| {
                    ui.add(
                        egui::TextEdit::multiline(&mut self.import.buffer)
                            .code_editor()
                            .desired_rows(12)
                            .hint_text("Paste an exported layout..."),
                    );
                });
                submit = ui.button("Import").clicked();
            });
        self.import.open = open;

        if submit {
            match self.editor.import_json(&self.import.buffer) {
                Ok(()) => {
                    self.import = ImportDialog::default();
                    self.status = "Layout imported".to_owned();
                }
                Err(error) => {
                    warn!(error = %error, "layout import rejected");
                    self.alert = Some(format!("Import failed: {error}"));
                }
            }
        }
    }

    fn render_alert(&mut self, ctx: &egui::Context) {
        let Some(message) = self.alert.clone() else {
            return;
        };
        egui::Window::new("blockcanvas")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label(message);
                if ui.button("OK").clicked() {
                    self.alert = None;
                }
            });
    }
}

impl Drop for StudioApp {
    fn drop(&mut self) {
        let _ = self.command_tx.send(StudioCommand::Shutdown);
        if !self.editor.take_dirty() {
            return;
        }
        if let Err(error) = self.editor.store().save(&self.kv) {
            warn!(error = %format!("{error:#}"), "failed to persist layout on exit");
        }
    }
}

impl eframe::App for StudioApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();

        egui::TopBottomPanel::top("studio_toolbar").show(ctx, |ui| self.render_toolbar(ui));
        egui::TopBottomPanel::bottom("studio_status").show(ctx, |ui| self.render_status_bar(ui));
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                let output = show_editor_canvas(ui, &mut self.editor);
                if let Some(request) = output.edit_request {
                    if self.pending_edit.is_none() {
                        self.pending_edit = Some(PendingEdit {
                            buffer: request.current().to_owned(),
                            request,
                            focused: false,
                        });
                    }
                }
            });

        self.render_edit_window(ctx);
        self.render_import_window(ctx);
        self.render_alert(ctx);
        self.persist_if_dirty();

        if self.exports_in_flight > 0 {
            ctx.request_repaint_after(Duration::from_millis(120));
        }
    }
}
