use eframe::egui;
use crossbeam_channel::{Receiver, Sender, unbounded};
use fast_image_resize::images::Image as FastImage;
use fast_image_resize::{PixelType, ResizeOptions, Resizer};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::thread;

/// Background thumbnail decoder feeding the grid. Paths go out over a
/// channel, decoded + downscaled images come back; workers skip files that
/// have scrolled out of the active window.
pub(super) struct ThumbPool {
    cache: HashMap<PathBuf, egui::TextureHandle>,
    loading: HashSet<PathBuf>,
    request_tx: Sender<PathBuf>,
    result_rx: Receiver<(PathBuf, Option<egui::ColorImage>)>,
    active_window: Arc<RwLock<HashSet<PathBuf>>>,
}

impl ThumbPool {
    pub(super) fn new(thumb_size: u32) -> Self {
        let active_window = Arc::new(RwLock::new(HashSet::new()));
        let (request_tx, result_rx) = spawn_thumb_loader_pool(active_window.clone(), thumb_size);
        Self {
            cache: HashMap::new(),
            loading: HashSet::new(),
            request_tx,
            result_rx,
            active_window,
        }
    }

    /// Drain finished thumbnails into textures. Returns true if any arrived.
    pub(super) fn poll(&mut self, ctx: &egui::Context) -> bool {
        let mut got_any = false;
        while let Ok((path, maybe_image)) = self.result_rx.try_recv() {
            self.loading.remove(&path);
            if let Some(image) = maybe_image {
                let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
                let texture = ctx.load_texture(name, image, egui::TextureOptions::LINEAR);
                self.cache.insert(path, texture);
                got_any = true;
            }
        }
        got_any
    }

    pub(super) fn request(&mut self, path: &Path) {
        if self.cache.contains_key(path) || self.loading.contains(path) {
            return;
        }
        self.loading.insert(path.to_path_buf());
        let _ = self.request_tx.send(path.to_path_buf());
    }

    pub(super) fn texture(&self, path: &Path) -> Option<&egui::TextureHandle> {
        self.cache.get(path)
    }

    pub(super) fn pending(&self) -> usize {
        self.loading.len()
    }

    /// Publish which tiles are on screen and evict textures far outside it.
    /// A few screens worth of slack keeps short back-scrolls cheap.
    pub(super) fn set_active_window(&mut self, visible: &HashSet<PathBuf>) {
        if let Ok(mut window) = self.active_window.write() {
            window.clear();
            window.extend(visible.iter().cloned());
        }
        let cap = (visible.len() * 4).max(256);
        if self.cache.len() > cap {
            self.cache.retain(|k, _| visible.contains(k));
            self.loading.retain(|k| visible.contains(k));
        }
    }

    pub(super) fn clear(&mut self) {
        self.cache.clear();
        self.loading.clear();
        if let Ok(mut window) = self.active_window.write() {
            window.clear();
        }
    }
}

fn spawn_thumb_loader_pool(
    active_window: Arc<RwLock<HashSet<PathBuf>>>,
    thumb_size: u32,
) -> (Sender<PathBuf>, Receiver<(PathBuf, Option<egui::ColorImage>)>) {
    let (tx, rx) = unbounded::<PathBuf>();
    let (result_tx, result_rx) = unbounded();

    let num_threads = thread::available_parallelism().map(|n| n.get()).unwrap_or(4).min(8);

    for _ in 0..num_threads {
        let rx_clone = rx.clone();
        let tx_clone = result_tx.clone();
        let window_clone = active_window.clone();

        thread::spawn(move || {
            while let Ok(path) = rx_clone.recv() {
                // Skip if no longer in the active window
                if let Ok(window) = window_clone.read()
                    && !window.contains(&path)
                {
                    let _ = tx_clone.send((path, None));
                    continue;
                }

                let result = load_thumbnail(&path, thumb_size);
                let _ = tx_clone.send((path, result));
            }
        });
    }

    (tx, result_rx)
}

fn load_thumbnail(path: &Path, thumb_size: u32) -> Option<egui::ColorImage> {
    let bytes = fs::read(path).ok()?;

    // Chain with_guessed_format(). If it fails (IO error), fall back to a fresh reader.
    let mut reader = image::ImageReader::new(std::io::Cursor::new(&bytes))
        .with_guessed_format()
        .unwrap_or_else(|_| image::ImageReader::new(std::io::Cursor::new(&bytes)));

    // Fall back to the file extension if the magic bytes didn't match
    if reader.format().is_none()
        && let Ok(fmt) = image::ImageFormat::from_path(path)
    {
        reader.set_format(fmt);
    }

    let dyn_img = reader.decode().ok()?;
    let (w, h) = (dyn_img.width() as usize, dyn_img.height() as usize);
    let buf = dyn_img.to_rgba8();

    if w.max(h) <= thumb_size as usize {
        let pixels = buf.as_flat_samples();
        return Some(egui::ColorImage::from_rgba_unmultiplied([w, h], pixels.as_slice()));
    }

    // Downscale so the longest edge is thumb_size (SIMD resize)
    let scale = thumb_size as f32 / w.max(h) as f32;
    let new_w = ((w as f32 * scale).round() as usize).max(1);
    let new_h = ((h as f32 * scale).round() as usize).max(1);

    let src_image =
        FastImage::from_vec_u8(w as u32, h as u32, buf.into_raw(), PixelType::U8x4).ok()?;
    let mut dst_image = FastImage::new(new_w as u32, new_h as u32, PixelType::U8x4);

    let mut resizer = Resizer::new();
    resizer.resize(&src_image, &mut dst_image, &ResizeOptions::default()).ok()?;

    Some(egui::ColorImage::from_rgba_unmultiplied([new_w, new_h], dst_image.buffer()))
}
