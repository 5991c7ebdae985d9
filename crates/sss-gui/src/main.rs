use chrono::Local;
use eframe::{App, egui};
use egui::Color32;
use std::path::{Path, PathBuf};

use sss_core::{
    Direction, Origin, PlanEntry, PresetChoice, SyncConfig, SyncError, SyncPlan, SyncSession,
    SyncState, TitleCatalog, TitleId,
};
use tracing::warn;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_FILE: &str = "sss.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortColumn {
    Title,
    TitleId,
    Status,
    RyujinxDate,
    CitronDate,
}

struct ProfilePicker {
    candidates: Vec<String>,
    selected: usize,
}

enum Action {
    PickRyujinx,
    PickCitron,
    Refresh,
    Sync(TitleId),
    SyncAll,
    Sort(SortColumn),
    ChooseProfile(String),
    OpenFolder(PathBuf),
}

struct State {
    config: SyncConfig,
    session: Option<SyncSession>,
    plan: SyncPlan,
    warnings: Vec<String>,
    status: String,
    only_unsynced: bool,
    sort: SortColumn,
    sort_reverse: bool,
    picker: Option<ProfilePicker>,
}

struct AppGui {
    state: State,
}

impl AppGui {
    fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let config = SyncConfig::load(Path::new(CONFIG_FILE)).unwrap_or_else(|e| {
            warn!(error = %e, "ignoring unreadable config");
            SyncConfig::default()
        });
        let mut app = Self {
            state: State {
                config,
                session: None,
                plan: SyncPlan::default(),
                warnings: Vec::new(),
                status: String::new(),
                only_unsynced: false,
                sort: SortColumn::Title,
                sort_reverse: false,
                picker: None,
            },
        };
        if app.state.config.validate().is_ok() {
            app.refresh();
        } else {
            app.state.status = "Pick the Ryujinx and Citron folders to begin".into();
        }
        app
    }

    fn session(&mut self) -> &mut SyncSession {
        let config = &self.state.config;
        self.state.session.get_or_insert_with(|| {
            let catalog = TitleCatalog::load_or_fetch(&config.catalog_path, &config.catalog_url)
                .unwrap_or_else(|e| {
                    warn!(error = %e, "title catalog unavailable");
                    TitleCatalog::default()
                });
            SyncSession::new(config.clone(), Box::new(catalog), None)
        })
    }

    fn refresh(&mut self) {
        if self.state.config.validate().is_err() {
            return;
        }
        let result = self.session().scan();
        let scan = match result {
            Ok(s) => s,
            Err(e) => {
                self.state.status = format!("Scan failed: {}", e);
                return;
            }
        };
        self.state.warnings = scan
            .skipped
            .iter()
            .map(|s| format!("Skipped {} folder {}: {}", s.origin, s.folder, s.reason))
            .collect();
        match &scan.profile_error {
            Some(SyncError::AmbiguousProfile { candidates }) => {
                self.state.picker = Some(ProfilePicker {
                    candidates: candidates.clone(),
                    selected: 0,
                });
            }
            Some(e) => self.state.warnings.push(format!("Citron: {}", e)),
            None => {}
        }
        let plan = self.session().plan(&scan);
        self.state.status = format!(
            "{} game(s), {} out of sync",
            plan.entries.len(),
            plan.pending().count()
        );
        self.state.plan = plan;
        self.sort_plan();
    }

    fn sort_plan(&mut self) {
        let col = self.state.sort;
        let time = |e: &PlanEntry, o: Origin| e.unit(o).map(|u| u.modified);
        self.state.plan.entries.sort_by(|a, b| match col {
            SortColumn::Title => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortColumn::TitleId => a.title_id.cmp(&b.title_id),
            SortColumn::Status => a.state.label().cmp(b.state.label()),
            SortColumn::RyujinxDate => time(a, Origin::Ryujinx).cmp(&time(b, Origin::Ryujinx)),
            SortColumn::CitronDate => time(a, Origin::Citron).cmp(&time(b, Origin::Citron)),
        });
        if self.state.sort_reverse {
            self.state.plan.entries.reverse();
        }
    }

    fn pick_folder(&mut self, origin: Origin) {
        let Some(dir) = rfd::FileDialog::new().set_directory(".").pick_folder() else {
            return;
        };
        match origin {
            Origin::Ryujinx => self.state.config.ryujinx_base = dir,
            Origin::Citron => self.state.config.citron_base = dir,
        }
        if let Err(e) = self.state.config.save(Path::new(CONFIG_FILE)) {
            self.state.status = format!("Could not save settings: {}", e);
        }
        // Paths changed: identity map, catalog and profile are rebuilt.
        self.state.session = None;
        self.state.picker = None;
        self.refresh();
    }

    fn sync_one(&mut self, title_id: &TitleId) {
        let Some(entry) = self.state.plan.get(title_id).cloned() else {
            return;
        };
        match self.session().sync_entry(&entry) {
            Ok(Some(r)) => {
                self.refresh();
                self.state.status = match r.backup {
                    Some(b) => format!("Synced {}; backup at {}", entry.name, b.display()),
                    None => format!("Synced {}", entry.name),
                };
            }
            Ok(None) => self.state.status = format!("{}: nothing to do", entry.name),
            Err(e) => self.state.status = format!("Sync of {} failed: {}", entry.name, e),
        }
    }

    fn sync_all(&mut self) {
        let plan = self.state.plan.clone();
        let report = self.session().sync_all(&plan);
        self.refresh();
        self.state.status = format!(
            "Synced {}, failed {}",
            report.transferred.len(),
            report.failed.len()
        );
        for (id, e) in report.failed {
            self.state.warnings.push(format!("{}: {}", id, e));
        }
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::PickRyujinx => self.pick_folder(Origin::Ryujinx),
            Action::PickCitron => self.pick_folder(Origin::Citron),
            Action::Refresh => self.refresh(),
            Action::Sync(id) => self.sync_one(&id),
            Action::SyncAll => self.sync_all(),
            Action::Sort(col) => {
                if self.state.sort == col {
                    self.state.sort_reverse = !self.state.sort_reverse;
                } else {
                    self.state.sort = col;
                    self.state.sort_reverse = false;
                }
                self.sort_plan();
            }
            Action::OpenFolder(path) => {
                if let Err(e) = open_folder(&path) {
                    self.state.status = format!("Couldn't open {}: {}", path.display(), e);
                }
            }
            Action::ChooseProfile(name) => {
                self.state.picker = None;
                self.session().set_disambiguator(Box::new(PresetChoice(name)));
                self.refresh();
            }
        }
    }
}

fn state_color(state: SyncState) -> Color32 {
    match state {
        SyncState::Match => Color32::from_rgb(0x3a, 0x9a, 0x3a),
        SyncState::RyujinxNewer => Color32::from_rgb(0xd0, 0x8a, 0x20),
        SyncState::CitronNewer => Color32::from_rgb(0x30, 0x90, 0xc0),
        SyncState::OnlyInRyujinx => Color32::from_rgb(0xc0, 0x40, 0x40),
        SyncState::OnlyInCitron => Color32::from_rgb(0x70, 0x60, 0xc0),
        SyncState::NeedsInitialization => Color32::GRAY,
    }
}

fn fmt_time(entry: &PlanEntry, origin: Origin) -> String {
    entry
        .unit(origin)
        .map(|u| {
            u.modified
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| "-".into())
}

fn open_folder(path: &Path) -> std::io::Result<()> {
    let opener = if cfg!(windows) {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    std::process::Command::new(opener).arg(path).spawn()?;
    Ok(())
}

fn path_label(p: &Path) -> String {
    if p.as_os_str().is_empty() {
        "(not set)".into()
    } else {
        p.display().to_string()
    }
}

impl App for AppGui {
    fn update(&mut self, ctx: &egui::Context, _: &mut eframe::Frame) {
        let mut actions: Vec<Action> = Vec::new();

        egui::TopBottomPanel::top("paths").show(ctx, |ui| {
            egui::Grid::new("path_grid").num_columns(3).show(ui, |ui| {
                ui.label("Ryujinx:");
                ui.label(path_label(&self.state.config.ryujinx_base));
                if ui.button("Browse").clicked() {
                    actions.push(Action::PickRyujinx);
                }
                ui.end_row();
                ui.label("Citron:");
                ui.label(path_label(&self.state.config.citron_base));
                if ui.button("Browse").clicked() {
                    actions.push(Action::PickCitron);
                }
                ui.end_row();
            });
            ui.label(format!(
                "Click an arrow to sync. Backups go to {}.",
                self.state.config.backup_dir.display()
            ));
            ui.horizontal(|ui| {
                if ui.button("Sync All").clicked() {
                    actions.push(Action::SyncAll);
                }
                if ui.button("Refresh").clicked() {
                    actions.push(Action::Refresh);
                }
                ui.checkbox(&mut self.state.only_unsynced, "Show only unsynced entries");
                if let Some(p) = self.state.session.as_ref().and_then(|s| s.active_profile()) {
                    ui.separator();
                    ui.label(format!("Citron profile: {}", p));
                }
            });
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.label(&self.state.status);
            for w in &self.state.warnings {
                ui.colored_label(Color32::from_rgb(0xc0, 0x80, 0x20), w);
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    egui::Grid::new("saves")
                        .num_columns(6)
                        .striped(true)
                        .show(ui, |ui| {
                            for (label, col) in [
                                ("Title", SortColumn::Title),
                                ("TitleID", SortColumn::TitleId),
                                ("Status", SortColumn::Status),
                                ("Ryujinx Date", SortColumn::RyujinxDate),
                                ("Citron Date", SortColumn::CitronDate),
                            ] {
                                let marker = match (self.state.sort == col, self.state.sort_reverse) {
                                    (true, false) => " ▲",
                                    (true, true) => " ▼",
                                    _ => "",
                                };
                                if ui.button(format!("{label}{marker}")).clicked() {
                                    actions.push(Action::Sort(col));
                                }
                            }
                            ui.strong("Action");
                            ui.end_row();

                            for e in &self.state.plan.entries {
                                if self.state.only_unsynced && e.state == SyncState::Match {
                                    continue;
                                }
                                let title = ui.add(egui::Label::new(&e.name).sense(egui::Sense::click()));
                                title.context_menu(|ui| {
                                    for (label, origin) in [
                                        ("Open Ryujinx Save Folder", Origin::Ryujinx),
                                        ("Open Citron Save Folder", Origin::Citron),
                                    ] {
                                        if let Some(u) = e.unit(origin)
                                            && ui.button(label).clicked()
                                        {
                                            actions.push(Action::OpenFolder(u.path.clone()));
                                            ui.close_menu();
                                        }
                                    }
                                    if let Some(s) = &self.state.session {
                                        let dir = s.vault().title_dir(&e.title_id, &e.name);
                                        if dir.is_dir() && ui.button("Open Backup Folder").clicked() {
                                            actions.push(Action::OpenFolder(dir));
                                            ui.close_menu();
                                        }
                                    }
                                });
                                ui.monospace(e.title_id.as_str());
                                ui.colored_label(state_color(e.state), e.state.label());
                                ui.label(fmt_time(e, Origin::Ryujinx));
                                ui.label(fmt_time(e, Origin::Citron));
                                match e.direction() {
                                    Some(d) => {
                                        let tip = match d {
                                            Direction::RyujinxToCitron => "Copy Ryujinx save to Citron",
                                            Direction::CitronToRyujinx => "Copy Citron save to Ryujinx",
                                        };
                                        if ui.button(d.arrow()).on_hover_text(tip).clicked() {
                                            actions.push(Action::Sync(e.title_id.clone()));
                                        }
                                    }
                                    None => {
                                        ui.label("");
                                    }
                                }
                                ui.end_row();
                            }
                        });
                });
        });

        if let Some(picker) = &mut self.state.picker {
            egui::Window::new("Select Citron Profile")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label("Multiple save folders found. Select one:");
                    for (i, c) in picker.candidates.iter().enumerate() {
                        ui.radio_value(&mut picker.selected, i, c);
                    }
                    if ui.button("OK").clicked()
                        && let Some(c) = picker.candidates.get(picker.selected)
                    {
                        actions.push(Action::ChooseProfile(c.clone()));
                    }
                });
        }

        for a in actions {
            self.apply(a);
        }
    }
}

fn main() -> eframe::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let native_options = eframe::NativeOptions {
        viewport: egui::viewport::ViewportBuilder::default()
            .with_inner_size([1100.0, 700.0])
            .with_min_inner_size([800.0, 500.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Switch Save Sync",
        native_options,
        Box::new(|cc| Ok(Box::new(AppGui::new(cc)))),
    )
}
