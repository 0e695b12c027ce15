use crate::grouper::DisplayItem;

/// The single observable gallery state. The whole `items` vector is replaced
/// on publish, never mutated in place; a failed fetch leaves the previous
/// items on screen.
pub struct GalleryState {
    pub items: Vec<DisplayItem>,
    pub asset_count: usize,
    pub section_count: usize,
    pub is_loading: bool,
    pub status_message: Option<(String, bool)>, // (text, is_error)
}

impl GalleryState {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            asset_count: 0,
            section_count: 0,
            is_loading: false,
            status_message: None,
        }
    }

    /// Request a (re)load. Returns false while a fetch is already in flight:
    /// loads are serialized instead of racing last-writer-wins.
    pub fn begin_load(&mut self) -> bool {
        if self.is_loading {
            return false;
        }
        self.is_loading = true;
        true
    }

    /// Replace the displayed items while a fetch is still streaming in.
    pub fn stage(&mut self, items: Vec<DisplayItem>) {
        self.asset_count = items
            .iter()
            .filter(|i| matches!(i, DisplayItem::Tile { .. }))
            .count();
        self.section_count = items.len() - self.asset_count;
        self.items = items;
    }

    /// Replace the displayed items wholesale with a completed fetch.
    pub fn publish(&mut self, items: Vec<DisplayItem>) {
        self.stage(items);
        self.is_loading = false;
        self.status_message = Some((
            format!("{} photos in {} sections.", self.asset_count, self.section_count),
            false,
        ));
    }

    /// Record a failed fetch. Prior items stay intact.
    pub fn fail(&mut self, err: &str) {
        self.is_loading = false;
        self.status_message = Some((format!("Fetch failed: {}", err), true));
    }
}
