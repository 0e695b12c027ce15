use chrono::{DateTime, Local, Utc};
use crossbeam_channel::{Receiver, unbounded};
use eframe::egui;
use std::collections::HashSet;
use std::f32::consts::PI;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use super::APP_TITLE;
use super::image::ThumbPool;
use crate::MediaAsset;
use crate::config::AppContext;
use crate::grouper::{DisplayItem, SectionOrder, group_by_day};
use crate::scanner::{self, ScanOutcome};
use crate::state::GalleryState;

const TILE_SPACING: f32 = 4.0;
const STATUS_TIMEOUT_SECS: u64 = 8;

pub struct GalleryApp {
    state: GalleryState,
    ctx: AppContext,
    paths: Vec<String>,
    section_order: SectionOrder,

    scan_rx: Option<Receiver<anyhow::Result<ScanOutcome>>>,
    scan_progress_rx: Option<Receiver<(usize, usize)>>,
    scan_batch_rx: Option<Receiver<Vec<MediaAsset>>>,
    scan_progress: (usize, usize),
    // Assets streamed in so far; the final outcome replaces them wholesale.
    streamed_assets: Vec<MediaAsset>,
    stream_started_at: Option<DateTime<Utc>>,

    thumbs: ThumbPool,
    status_set_time: Option<Instant>,
    last_window_size: Option<(u32, u32)>,
    last_title: String,
    initial_scale_applied: bool,
}

impl GalleryApp {
    pub fn new(ctx: AppContext, paths: Vec<String>, section_order: SectionOrder) -> Self {
        let mut state = GalleryState::new();
        state.begin_load();
        let thumb_size = ctx.gui.thumb_size.unwrap_or(256);
        Self {
            state,
            ctx,
            paths,
            section_order,
            scan_rx: None,
            scan_progress_rx: None,
            scan_batch_rx: None,
            scan_progress: (0, 0),
            streamed_assets: Vec::new(),
            stream_started_at: None,
            thumbs: ThumbPool::new(thumb_size),
            status_set_time: None,
            last_window_size: None,
            last_title: String::new(),
            initial_scale_applied: false,
        }
    }

    pub fn run(self) -> Result<(), eframe::Error> {
        let width = self.ctx.gui.width.unwrap_or(1280) as f32;
        let height = self.ctx.gui.height.unwrap_or(720) as f32;
        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default().with_inner_size([width, height]),
            ..Default::default()
        };
        eframe::run_native(
            APP_TITLE,
            options,
            Box::new(move |cc| {
                egui_extras::install_image_loaders(&cc.egui_ctx);
                Ok(Box::new(self))
            }),
        )
    }

    fn request_reload(&mut self) {
        // begin_load refuses while a fetch is already in flight, so a held
        // F5 cannot pile up racing scans.
        if self.state.begin_load() {
            self.thumbs.clear();
        }
    }

    /// Spawn a scan when one was requested, drain its channels, and fold the
    /// final outcome (or error) into the gallery state.
    fn check_reload(&mut self) -> bool {
        if self.state.is_loading && self.scan_rx.is_none() {
            let (tx, rx) = unbounded();
            let (prog_tx, prog_rx) = unbounded();
            let (batch_tx, batch_rx) = unbounded();
            self.scan_rx = Some(rx);
            self.scan_progress_rx = Some(prog_rx);
            self.scan_batch_rx = Some(batch_rx);
            self.scan_progress = (0, 0);
            self.streamed_assets.clear();
            self.stream_started_at = Some(Utc::now());

            let paths = self.paths.clone();
            let extensions = self.ctx.scan.extensions.clone();
            thread::spawn(move || {
                let result = scanner::scan_media(&paths, &extensions, Some(prog_tx), Some(batch_tx));
                let _ = tx.send(result);
            });
        }

        let mut changed = false;

        if let Some(prog_rx) = &self.scan_progress_rx {
            while let Ok(progress) = prog_rx.try_recv() {
                self.scan_progress = progress;
                changed = true;
            }
        }

        if let Some(batch_rx) = &self.scan_batch_rx {
            let mut got_batch = false;
            while let Ok(batch) = batch_rx.try_recv() {
                self.streamed_assets.extend(batch);
                got_batch = true;
            }
            if got_batch {
                // Provisional regroup so the grid fills in while the scan
                // runs; undated assets borrow the scan start time until the
                // final outcome carries the real fetch timestamp.
                let fallback = self.stream_started_at.unwrap_or_else(Utc::now);
                let items =
                    group_by_day(&self.streamed_assets, fallback, &Local, self.section_order);
                self.state.stage(items);
                changed = true;
            }
        }

        if let Some(rx) = &self.scan_rx
            && let Ok(result) = rx.try_recv()
        {
            match result {
                Ok(outcome) => {
                    // Same fallback the staged views used, so the undated
                    // section cannot hop dates across a midnight boundary
                    // between staging and the final grouping.
                    let fallback = fetch_fallback(self.stream_started_at, &outcome);
                    let items = group_by_day(&outcome.assets, fallback, &Local, self.section_order);
                    self.state.publish(items);
                }
                Err(e) => self.state.fail(&e.to_string()),
            }
            self.status_set_time = Some(Instant::now());
            self.scan_rx = None;
            self.scan_progress_rx = None;
            self.scan_batch_rx = None;
            self.streamed_assets = Vec::new();
            self.stream_started_at = None;
            changed = true;
        }

        changed
    }
}

impl eframe::App for GalleryApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.initial_scale_applied {
            if let Some(scale) = self.ctx.gui.font_scale
                && (scale - 1.0).abs() > f32::EPSILON
            {
                ctx.set_pixels_per_point(ctx.pixels_per_point() * scale);
            }
            self.initial_scale_applied = true;
        }

        let mut needs_repaint = self.check_reload();
        if self.thumbs.poll(ctx) {
            needs_repaint = true;
        }

        if let Some(rect) = ctx.input(|i| i.viewport().inner_rect) {
            self.last_window_size = Some((rect.width() as u32, rect.height() as u32));
        }

        if ctx.input(|i| i.key_pressed(egui::Key::F5) || i.key_pressed(egui::Key::R)) {
            self.request_reload();
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Q) || i.key_pressed(egui::Key::Escape)) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        let title = window_title(self.state.is_loading, self.scan_progress, self.state.asset_count);
        if title != self.last_title {
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(title.clone()));
            self.last_title = title;
        }

        if let Some(t) = self.status_set_time
            && t.elapsed().as_secs() >= STATUS_TIMEOUT_SECS
        {
            self.state.status_message = None;
            self.status_set_time = None;
        }

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if self.state.is_loading {
                    ui.spinner();
                    ui.label(format!(
                        "Scanning {}/{}",
                        self.scan_progress.0, self.scan_progress.1
                    ));
                } else if let Some((msg, is_error)) = &self.state.status_message {
                    let color = if *is_error {
                        egui::Color32::LIGHT_RED
                    } else {
                        egui::Color32::GRAY
                    };
                    ui.colored_label(color, msg);
                } else {
                    ui.label(format!(
                        "{} photos in {} sections",
                        self.state.asset_count, self.state.section_count
                    ));
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Reload (F5)").clicked() {
                        self.request_reload();
                    }
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.state.items.is_empty() && !self.state.is_loading {
                ui.centered_and_justified(|ui| {
                    ui.label("No photos found.");
                });
                return;
            }

            let columns = self.ctx.gui.columns.unwrap_or(4).max(1);
            let tile = ((ui.available_width() - TILE_SPACING * (columns as f32 - 1.0))
                / columns as f32)
                .max(16.0);

            let mut visible: HashSet<PathBuf> = HashSet::new();
            let state = &self.state;
            let thumbs = &mut self.thumbs;

            egui::ScrollArea::vertical().auto_shrink(false).show(ui, |ui| {
                ui.spacing_mut().item_spacing = egui::vec2(TILE_SPACING, TILE_SPACING);
                let mut row: Vec<&MediaAsset> = Vec::with_capacity(columns);
                for item in &state.items {
                    match item {
                        DisplayItem::Section { date } => {
                            flush_row(ui, &mut row, tile, thumbs, &mut visible);
                            ui.add_space(6.0);
                            ui.label(egui::RichText::new(date).strong().size(16.0));
                        }
                        DisplayItem::Tile { asset } => {
                            row.push(asset);
                            if row.len() == columns {
                                flush_row(ui, &mut row, tile, thumbs, &mut visible);
                            }
                        }
                    }
                }
                flush_row(ui, &mut row, tile, thumbs, &mut visible);
            });

            thumbs.set_active_window(&visible);
        });

        if needs_repaint {
            ctx.request_repaint();
        } else if self.state.is_loading || self.thumbs.pending() > 0 {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }

    fn on_exit(&mut self) {
        let mut gui_config = self.ctx.gui.clone();
        if let Some((w, h)) = self.last_window_size {
            gui_config.width = Some(w);
            gui_config.height = Some(h);
        }
        if let Err(e) = self.ctx.save_gui_config(&gui_config) {
            eprintln!("Error saving config: {}", e);
        }
    }
}

/// Fallback timestamp for undated assets of one fetch. The moment the GUI
/// started the scan wins over the worker's own stamp: staging already
/// grouped against it, and both passes must agree.
fn fetch_fallback(started_at: Option<DateTime<Utc>>, outcome: &ScanOutcome) -> DateTime<Utc> {
    started_at.unwrap_or(outcome.fetched_at)
}

fn window_title(is_loading: bool, progress: (usize, usize), asset_count: usize) -> String {
    if is_loading {
        format!("{} | Scanning {}/{}", APP_TITLE, progress.0, progress.1)
    } else {
        format!("{} | {} photos", APP_TITLE, asset_count)
    }
}

fn flush_row(
    ui: &mut egui::Ui,
    row: &mut Vec<&MediaAsset>,
    tile: f32,
    thumbs: &mut ThumbPool,
    visible: &mut HashSet<PathBuf>,
) {
    if row.is_empty() {
        return;
    }
    ui.horizontal(|ui| {
        for asset in row.drain(..) {
            let (rect, _response) =
                ui.allocate_exact_size(egui::vec2(tile, tile), egui::Sense::hover());
            if !ui.is_rect_visible(rect) {
                continue;
            }
            visible.insert(asset.path.clone());
            if let Some(texture) = thumbs.texture(&asset.path) {
                paint_tile(ui, rect, texture, asset.orientation);
            } else {
                ui.painter().rect_filled(rect, 2.0, egui::Color32::from_gray(40));
                thumbs.request(&asset.path);
            }
        }
    });
}

/// Paint a thumbnail into its cell, honoring the EXIF orientation and
/// fitting the (possibly rotated) image inside the cell.
fn paint_tile(ui: &mut egui::Ui, rect: egui::Rect, texture: &egui::TextureHandle, orientation: u8) {
    let tex_size = texture.size_vec2();
    let angle = match orientation {
        3 => PI,
        6 => PI / 2.0,
        8 => 3.0 * PI / 2.0,
        _ => 0.0,
    };
    // Orientations 6 and 8 swap width and height on screen
    let swapped = matches!(orientation, 6 | 8);
    let visual = if swapped {
        egui::vec2(tex_size.y, tex_size.x)
    } else {
        tex_size
    };
    let scale = (rect.width() / visual.x).min(rect.height() / visual.y);
    let visual_size = visual * scale;
    // paint_at sizes the un-rotated quad, so swap back for the paint rect
    let paint_size = if swapped {
        egui::vec2(visual_size.y, visual_size.x)
    } else {
        visual_size
    };
    let paint_rect = egui::Rect::from_center_size(rect.center(), paint_size);
    egui::Image::from_texture((texture.id(), tex_size))
        .rotate(angle, egui::Vec2::splat(0.5))
        .paint_at(ui, paint_rect);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TakenAt;
    use chrono::TimeZone;
    use std::path::PathBuf;

    #[test]
    fn test_staged_and_final_grouping_share_fallback_across_midnight() {
        // Scan starts just before midnight, the worker stamps its outcome
        // just after; the undated section must not hop dates between the
        // staged and the final grouping.
        let started = Utc.with_ymd_and_hms(2024, 3, 14, 23, 59, 58).unwrap();
        let outcome = ScanOutcome {
            assets: vec![MediaAsset {
                path: PathBuf::from("a.jpg"),
                taken_at: TakenAt::Unknown,
                orientation: 1,
            }],
            fetched_at: Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 2).unwrap(),
        };
        let fallback = fetch_fallback(Some(started), &outcome);
        let staged = group_by_day(&outcome.assets, started, &Utc, SectionOrder::Scan);
        let published = group_by_day(&outcome.assets, fallback, &Utc, SectionOrder::Scan);
        assert_eq!(staged, published);
    }

    #[test]
    fn test_fetch_fallback_defaults_to_outcome_stamp() {
        let outcome = ScanOutcome {
            assets: Vec::new(),
            fetched_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        };
        assert_eq!(fetch_fallback(None, &outcome), outcome.fetched_at);
    }

    #[test]
    fn test_window_title() {
        assert_eq!(window_title(true, (40, 120), 0), "phgrid | Scanning 40/120");
        assert_eq!(window_title(false, (0, 0), 7), "phgrid | 7 photos");
        // Identical inputs yield the identical string, so the cached-title
        // comparison suppresses the resend.
        assert_eq!(window_title(false, (0, 0), 7), window_title(false, (0, 0), 7));
    }
}
