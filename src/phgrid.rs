use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use clap::Parser;
use std::path::PathBuf;

use crate::config::AppContext;
use crate::grouper::{DisplayItem, SectionOrder, group_by_day};

mod config;
mod grouper;
mod gui;
mod scanner;
mod state;

/// When a photo was taken. `Known` is the camera's wall-clock time, kept
/// naive: EXIF datetimes carry no zone, and the recorded calendar date must
/// not shift with the viewer's offset. `Unknown` means the file carried no
/// usable EXIF timestamp; the substitution with fetch time happens at read
/// time via `resolve`, so callers (and tests) control the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakenAt {
    Known(NaiveDateTime),
    Unknown,
}

impl TakenAt {
    /// The wall-clock time this asset is dated by. The fetch-time fallback
    /// is an absolute instant and is viewed in `tz`; a known capture time is
    /// already wall-clock and passes through untouched.
    pub fn resolve<Tz: TimeZone>(self, fallback: DateTime<Utc>, tz: &Tz) -> NaiveDateTime {
        match self {
            TakenAt::Known(ts) => ts,
            TakenAt::Unknown => fallback.with_timezone(tz).naive_local(),
        }
    }
}

/// One image record from the media listing.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub taken_at: TakenAt,
    pub orientation: u8, // EXIF orientation (1-8)
}

// --- CLI Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about = "Shows photos in a grid, grouped by the date they were taken.", long_about = None)]
struct Cli {
    #[arg(required = true)]
    paths: Vec<String>,

    /// Section order: scan (first-seen, default), newest, oldest
    #[arg(long)]
    section_order: Option<String>,

    /// Number of grid columns
    #[arg(long)]
    columns: Option<usize>,

    /// Thumbnail edge length in pixels
    #[arg(long, value_name = "PIXELS")]
    thumb_size: Option<u32>,

    /// Print the sectioned listing to stdout instead of opening a window
    #[arg(long)]
    no_gui: bool,
}

impl Cli {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref order) = self.section_order
            && SectionOrder::parse(order).is_none()
        {
            return Err(format!("Invalid section order '{}'. Use one of: scan, newest, oldest", order));
        }

        if let Some(cols) = self.columns
            && cols == 0
        {
            return Err("Columns must be at least 1".to_string());
        }

        if let Some(size) = self.thumb_size
            && !(32..=2048).contains(&size)
        {
            return Err(format!("Thumbnail size must be 32-2048 pixels. Got {}.", size));
        }

        Ok(())
    }
}

fn run_listing(paths: &[String], ctx: &AppContext, order: SectionOrder) -> anyhow::Result<()> {
    let outcome = scanner::scan_media(paths, &ctx.scan.extensions, None, None)?;
    let items = group_by_day(&outcome.assets, outcome.fetched_at, &chrono::Local, order);

    let mut sections = 0usize;
    let mut photos = 0usize;
    for item in &items {
        match item {
            DisplayItem::Section { date } => {
                println!("\n=== {} ===", date);
                sections += 1;
            }
            DisplayItem::Tile { asset } => {
                println!("  {}", asset.path.display());
                photos += 1;
            }
        }
    }
    println!("\n{} photos in {} sections.", photos, sections);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let mut ctx = AppContext::new()?;

    // CLI overrides config
    if args.columns.is_some() {
        ctx.gui.columns = args.columns;
    }
    if args.thumb_size.is_some() {
        ctx.gui.thumb_size = args.thumb_size;
    }

    let order = args
        .section_order
        .as_deref()
        .or(ctx.gui.section_order.as_deref())
        .and_then(SectionOrder::parse)
        .unwrap_or_default();

    if args.no_gui {
        return run_listing(&args.paths, &ctx, order);
    }

    let app = gui::GalleryApp::new(ctx, args.paths.clone(), order);
    if let Err(e) = app.run() {
        eprintln!("GUI Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
