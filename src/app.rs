use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;

use egui::{Color32, RichText, ScrollArea};
use log::{debug, info, warn};

use crate::engine::{spawn_conversion, ConversionEngine};
use crate::types::{
    ConversionRequest, ConversionSettings, FileStatus, LogEntry, OutputMode, ProgressMessage,
    RunSummary, TargetFormat,
};

#[derive(Clone, Debug, PartialEq)]
enum Dialog {
    /// Holds the request as it was when the user pressed CONVERT.
    ConfirmReplace(ConversionRequest),
    ConfirmQuit,
    Notice {
        title: String,
        message: String,
        success: bool,
    },
}

pub struct ImageConverterApp {
    engine: ConversionEngine,
    settings: ConversionSettings,

    // Conversion state
    is_converting: bool,
    cancel_flag: Arc<AtomicBool>,
    progress_rx: Option<Receiver<ProgressMessage>>,
    worker: Option<JoinHandle<()>>,
    current_progress: usize,
    total_files: usize,
    percent: u8,
    close_confirmed: bool,

    // UI state
    queue_count: usize,
    queued_folder: Option<String>,
    log_entries: Vec<LogEntry>,
    scroll_to_bottom: bool,
    dialog: Option<Dialog>,
}

impl ImageConverterApp {
    pub fn new() -> Self {
        Self {
            engine: ConversionEngine::new(),
            settings: ConversionSettings::default(),
            is_converting: false,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            progress_rx: None,
            worker: None,
            current_progress: 0,
            total_files: 0,
            percent: 0,
            close_confirmed: false,
            queue_count: 0,
            queued_folder: None,
            log_entries: Vec::new(),
            scroll_to_bottom: false,
            dialog: None,
        }
    }

    fn add_log(&mut self, entry: LogEntry) {
        self.log_entries.push(entry);
        self.scroll_to_bottom = true;
    }

    fn notice(&mut self, title: &str, message: impl Into<String>, success: bool) {
        self.dialog = Some(Dialog::Notice {
            title: title.to_string(),
            message: message.into(),
            success,
        });
    }

    fn selected_folder(&self) -> Option<PathBuf> {
        let folder = self.settings.folder.trim();
        if folder.is_empty() {
            return None;
        }
        let path = PathBuf::from(folder);
        path.is_dir().then_some(path)
    }

    fn update_queue_count(&mut self) {
        self.queued_folder = Some(self.settings.folder.clone());
        self.queue_count = self
            .selected_folder()
            .and_then(|dir| self.engine.list_images(&dir).ok())
            .map(|files| files.len())
            .unwrap_or(0);
    }

    fn set_folder(&mut self, folder: &Path) {
        self.settings.folder = folder.display().to_string();
        self.update_queue_count();
    }

    fn request_start(&mut self) {
        if self.is_converting {
            return;
        }

        if self.selected_folder().is_none() {
            self.notice("Warning", "Please select a valid folder containing images!", false);
            return;
        }

        let request = self.settings.to_request();
        if request.output_mode == OutputMode::ReplaceInPlace {
            self.dialog = Some(Dialog::ConfirmReplace(request));
            return;
        }

        self.start_conversion(request);
    }

    /// The form stays read-only while a run or a dialog is active.
    fn form_locked(&self) -> bool {
        self.is_converting || self.dialog.is_some()
    }

    fn start_conversion(&mut self, request: ConversionRequest) {
        self.log_entries.clear();
        self.cancel_flag.store(false, Ordering::Relaxed);
        self.current_progress = 0;
        self.total_files = self.queue_count;
        self.percent = 0;

        let (tx, rx) = channel();
        match spawn_conversion(request.clone(), tx, Arc::clone(&self.cancel_flag)) {
            Ok(handle) => {
                info!(
                    "Started converting {} to {}",
                    request.source_directory.display(),
                    request.target_format
                );
                self.is_converting = true;
                self.worker = Some(handle);
                self.progress_rx = Some(rx);
                self.add_log(LogEntry::Info(format!(
                    "Converting images in {} to {}...",
                    request.source_directory.display(),
                    request.target_format
                )));
            }
            Err(e) => {
                self.add_log(LogEntry::Error(format!("Could not start conversion: {}", e)));
            }
        }
    }

    /// Closing is allowed right away unless a run is active and the user has
    /// not yet agreed to abandon it.
    fn request_close(&mut self) -> bool {
        if !self.is_converting || self.close_confirmed {
            return true;
        }
        self.dialog = Some(Dialog::ConfirmQuit);
        false
    }

    /// Cancels the active run and blocks until the worker has stopped.
    fn confirm_quit(&mut self) {
        info!("Quit requested during conversion, waiting for worker");
        self.close_confirmed = true;
        self.cancel_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("Conversion worker panicked");
            }
        }
        self.process_progress_messages();
        self.is_converting = false;
    }

    fn open_current_folder(&mut self) {
        let Some(folder) = self.selected_folder() else {
            self.add_log(LogEntry::Warning("Please select a folder first".to_string()));
            return;
        };

        if let Err(e) = open::that_detached(&folder) {
            self.add_log(LogEntry::Warning(format!("Error opening folder: {}", e)));
        }
    }

    fn process_progress_messages(&mut self) {
        // Collect all messages first to avoid borrow checker issues
        let mut messages = Vec::new();
        let mut disconnected = false;
        if let Some(rx) = &self.progress_rx {
            loop {
                match rx.try_recv() {
                    Ok(msg) => messages.push(msg),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }

        for msg in messages {
            self.handle_message(msg);
        }

        // Worker went away without sending its summary
        if disconnected && self.is_converting {
            warn!("Conversion worker stopped without a summary");
            self.conversion_finished(RunSummary::failed(
                "Conversion failed: the worker stopped unexpectedly",
            ));
        }
    }

    fn handle_message(&mut self, msg: ProgressMessage) {
        match msg {
            ProgressMessage::Started { total } => {
                self.total_files = total;
                self.add_log(LogEntry::Info(format!("Processing {} file(s)...", total)));
            }
            ProgressMessage::Progress {
                percent,
                message,
                current,
                total,
                outcome,
            } => {
                self.percent = percent;
                self.current_progress = current;
                self.total_files = total;
                match outcome.status {
                    FileStatus::Converted => {
                        debug!(
                            "{} written as {}",
                            outcome.source_filename,
                            outcome.destination_filename.as_deref().unwrap_or("?")
                        );
                        self.add_log(LogEntry::Info(message));
                    }
                    FileStatus::Errored => {
                        debug!(
                            "{} skipped: {}",
                            outcome.source_filename,
                            outcome.error_detail.as_deref().unwrap_or("unknown error")
                        );
                        self.add_log(LogEntry::Warning(message));
                    }
                }
            }
            ProgressMessage::Finished(summary) => self.conversion_finished(summary),
        }
    }

    fn conversion_finished(&mut self, summary: RunSummary) {
        info!(
            "Run finished ({:?}): {} of {} converted, {} failed",
            summary.status, summary.succeeded_count, summary.total_files, summary.failed_count
        );
        self.is_converting = false;
        self.progress_rx = None;
        if let Some(handle) = self.worker.take() {
            // The worker sends the summary as its last action
            let _ = handle.join();
        }

        if summary.is_success() {
            self.current_progress = self.total_files;
            self.percent = 100;
        } else {
            self.current_progress = 0;
            self.percent = 0;
        }
        self.update_queue_count();

        if self.close_confirmed {
            return;
        }

        if summary.is_success() {
            self.add_log(LogEntry::Success(summary.final_message.clone()));
            self.notice("Success", summary.final_message, true);
        } else {
            self.add_log(LogEntry::Error(summary.final_message.clone()));
            self.notice("Error", summary.final_message, false);
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        if self.form_locked() {
            return;
        }

        let dropped: Vec<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|file| file.path.clone())
                .collect()
        });

        if let Some(path) = dropped.first() {
            let folder = if path.is_dir() {
                Some(path.as_path())
            } else {
                path.parent()
            };
            if let Some(folder) = folder {
                self.set_folder(folder);
            }
        }
    }

    fn render_input_section(&mut self, ui: &mut egui::Ui) {
        let locked = self.form_locked();
        ui.label(
            RichText::new("Select a folder containing images and choose the output format.")
                .color(Color32::GRAY),
        );
        ui.add_space(10.0);

        ui.horizontal(|ui| {
            ui.add_sized([100.0, 20.0], egui::Label::new("Images Folder:"));
            ui.add_enabled(
                !locked,
                egui::TextEdit::singleline(&mut self.settings.folder)
                    .hint_text("Click Browse to select folder...")
                    .desired_width(ui.available_width() - 90.0),
            );
            if ui
                .add_enabled(!locked, egui::Button::new("Browse..."))
                .clicked()
            {
                if let Some(folder) = rfd::FileDialog::new()
                    .set_title("Select Folder with Images")
                    .pick_folder()
                {
                    self.set_folder(&folder);
                }
            }
        });

        ui.add_space(5.0);

        ui.add_enabled_ui(!locked, |ui| {
            ui.horizontal(|ui| {
                ui.add_sized([100.0, 20.0], egui::Label::new("Output Format:"));
                egui::ComboBox::from_id_salt("target_format")
                    .selected_text(self.settings.target_format.label())
                    .show_ui(ui, |ui| {
                        for format in TargetFormat::ALL {
                            ui.selectable_value(
                                &mut self.settings.target_format,
                                format,
                                format.label(),
                            );
                        }
                    });
            });

            ui.horizontal(|ui| {
                ui.add_sized([100.0, 20.0], egui::Label::new("Output Method:"));
                egui::ComboBox::from_id_salt("output_mode")
                    .selected_text(self.settings.output_mode.label())
                    .width(300.0)
                    .show_ui(ui, |ui| {
                        for mode in OutputMode::ALL {
                            ui.selectable_value(&mut self.settings.output_mode, mode, mode.label());
                        }
                    });
            });
        });
    }

    fn render_progress_section(&mut self, ui: &mut egui::Ui) {
        let fraction = if self.total_files > 0 {
            self.current_progress as f32 / self.total_files as f32
        } else {
            0.0
        };

        ui.horizontal(|ui| {
            let queue_text = if self.is_converting {
                format!(
                    "{} remaining",
                    self.total_files.saturating_sub(self.current_progress)
                )
            } else {
                format!(
                    "{} image{} in queue",
                    self.queue_count,
                    if self.queue_count == 1 { "" } else { "s" }
                )
            };

            ui.add(
                egui::ProgressBar::new(fraction)
                    .desired_width(ui.available_width() - 140.0)
                    .text(format!(
                        "{}% ({}/{})",
                        self.percent, self.current_progress, self.total_files
                    )),
            );
            ui.label(RichText::new(queue_text).small().color(Color32::GRAY));
        });
    }

    fn render_controls_section(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let convert = egui::Button::new(RichText::new("CONVERT").strong())
                .min_size(egui::vec2(120.0, 40.0));
            if ui.add_enabled(!self.form_locked(), convert).clicked() {
                self.request_start();
            }

            let open_folder = egui::Button::new(RichText::new("OPEN FOLDER").strong())
                .min_size(egui::vec2(120.0, 40.0));
            if ui.add(open_folder).clicked() {
                self.open_current_folder();
            }
        });
    }

    fn render_log_section(&mut self, ui: &mut egui::Ui) {
        ui.heading("Log");
        ui.add_space(5.0);

        let scroll_area = ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(true);

        scroll_area.show(ui, |ui| {
            if self.log_entries.is_empty() {
                ui.label(
                    RichText::new("Conversion progress will appear here...")
                        .color(Color32::DARK_GRAY)
                        .monospace(),
                );
            }

            for entry in &self.log_entries {
                let (color, text) = match entry {
                    LogEntry::Info(s) => (Color32::LIGHT_GRAY, s),
                    LogEntry::Success(s) => (Color32::from_rgb(100, 255, 100), s),
                    LogEntry::Error(s) => (Color32::from_rgb(255, 100, 100), s),
                    LogEntry::Warning(s) => (Color32::from_rgb(255, 200, 100), s),
                };

                ui.label(RichText::new(text).color(color).monospace());
            }

            if self.scroll_to_bottom {
                ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
                self.scroll_to_bottom = false;
            }
        });
    }

    fn render_dialog(&mut self, ctx: &egui::Context) {
        let Some(dialog) = self.dialog.clone() else {
            return;
        };

        let (title, message, success) = match &dialog {
            Dialog::ConfirmReplace(_) => (
                "Confirm Replacement",
                "This will permanently replace your original images. Continue?",
                None,
            ),
            Dialog::ConfirmQuit => (
                "Conversion in Progress",
                "A conversion is in progress. Are you sure you want to quit?",
                None,
            ),
            Dialog::Notice {
                title,
                message,
                success,
            } => (title.as_str(), message.as_str(), Some(*success)),
        };

        let mut answer = None;
        egui::Window::new(title)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                let color = match success {
                    Some(true) => Color32::from_rgb(100, 255, 100),
                    Some(false) => Color32::from_rgb(255, 200, 100),
                    None => Color32::WHITE,
                };
                ui.label(RichText::new(message).color(color));
                ui.add_space(10.0);
                ui.horizontal(|ui| {
                    if success.is_some() {
                        if ui.button("OK").clicked() {
                            answer = Some(true);
                        }
                    } else {
                        if ui.button("Yes").clicked() {
                            answer = Some(true);
                        }
                        if ui.button("No").clicked() {
                            answer = Some(false);
                        }
                    }
                });
            });

        if let Some(answer) = answer {
            if self.answer_dialog(answer) {
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
        }
    }

    /// Applies the user's answer to the open dialog. Returns `true` when the
    /// window should close.
    fn answer_dialog(&mut self, answer: bool) -> bool {
        match (self.dialog.take(), answer) {
            (Some(Dialog::ConfirmReplace(request)), true) => {
                self.start_conversion(request);
                false
            }
            (Some(Dialog::ConfirmQuit), true) => {
                self.confirm_quit();
                true
            }
            _ => false,
        }
    }
}

impl eframe::App for ImageConverterApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_progress_messages();

        if ctx.input(|i| i.viewport().close_requested()) && !self.request_close() {
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
        }

        // Request repaint if converting
        if self.is_converting {
            ctx.request_repaint();
        }

        self.handle_dropped_files(ctx);
        if self.queued_folder.as_deref() != Some(self.settings.folder.as_str()) {
            self.update_queue_count();
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(10.0);

            ui.group(|ui| {
                self.render_input_section(ui);
            });

            ui.add_space(10.0);
            self.render_progress_section(ui);
            ui.add_space(10.0);

            ui.group(|ui| {
                self.render_controls_section(ui);
            });

            ui.add_space(10.0);

            ui.group(|ui| {
                self.render_log_section(ui);
            });
        });

        self.render_dialog(ctx);
    }
}
