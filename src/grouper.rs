use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::collections::HashMap;

use crate::MediaAsset;

/// How date sections are ordered in the output.
/// `Scan` keeps the order in which distinct dates are first encountered
/// while walking the input; the other two sort sections chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SectionOrder {
    #[default]
    Scan,
    Newest,
    Oldest,
}

impl SectionOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "scan" => Some(SectionOrder::Scan),
            "newest" => Some(SectionOrder::Newest),
            "oldest" => Some(SectionOrder::Oldest),
            _ => None,
        }
    }
}

/// One row element of the gallery: a full-width date header or a photo tile.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayItem {
    Section { date: String },
    Tile { asset: MediaAsset },
}

/// Formats a wall-clock timestamp as the calendar-date key of its section.
pub fn day_key(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%d").to_string()
}

/// Partitions assets into date sections and flattens the result into one
/// ordered sequence of header and tile items.
///
/// Grouping is a stable group-by: assets keep their relative input order
/// within a section, and with `SectionOrder::Scan` sections appear in the
/// order their dates are first encountered. Assets without a capture
/// timestamp fall into the section of `fetched_at`, viewed in `tz` (the app
/// passes `chrono::Local`, tests pass `Utc` for determinism); a known
/// capture date never shifts with the viewer's timezone.
pub fn group_by_day<Tz: TimeZone>(
    assets: &[MediaAsset],
    fetched_at: DateTime<Utc>,
    tz: &Tz,
    order: SectionOrder,
) -> Vec<DisplayItem> {
    let mut keys: Vec<String> = Vec::new();
    let mut groups: Vec<Vec<&MediaAsset>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for asset in assets {
        let key = day_key(asset.taken_at.resolve(fetched_at, tz));
        let idx = *index.entry(key.clone()).or_insert_with(|| {
            keys.push(key);
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[idx].push(asset);
    }

    let mut section_order: Vec<usize> = (0..keys.len()).collect();
    match order {
        SectionOrder::Scan => {}
        // "%Y-%m-%d" keys are zero-padded, so string order is date order
        SectionOrder::Newest => section_order.sort_by(|&a, &b| keys[b].cmp(&keys[a])),
        SectionOrder::Oldest => section_order.sort_by(|&a, &b| keys[a].cmp(&keys[b])),
    }

    let mut items = Vec::with_capacity(assets.len() + keys.len());
    for idx in section_order {
        items.push(DisplayItem::Section { date: keys[idx].clone() });
        for asset in &groups[idx] {
            items.push(DisplayItem::Tile { asset: (*asset).clone() });
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TakenAt;
    use chrono::{FixedOffset, NaiveDate};
    use std::path::PathBuf;

    fn asset(name: &str, taken_at: TakenAt) -> MediaAsset {
        MediaAsset {
            path: PathBuf::from(name),
            taken_at,
            orientation: 1,
        }
    }

    fn known(y: i32, mo: u32, d: u32, h: u32) -> TakenAt {
        TakenAt::Known(
            NaiveDate::from_ymd_opt(y, mo, d)
                .unwrap()
                .and_hms_opt(h, 0, 0)
                .unwrap(),
        )
    }

    fn fetch_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn tile_paths(items: &[DisplayItem]) -> Vec<&str> {
        items
            .iter()
            .filter_map(|i| match i {
                DisplayItem::Tile { asset } => asset.path.to_str(),
                _ => None,
            })
            .collect()
    }

    fn section_dates(items: &[DisplayItem]) -> Vec<&str> {
        items
            .iter()
            .filter_map(|i| match i {
                DisplayItem::Section { date } => Some(date.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        let items = group_by_day(&[], fetch_time(), &Utc, SectionOrder::Scan);
        assert!(items.is_empty());
    }

    #[test]
    fn test_single_date_gets_exactly_one_header() {
        let assets = vec![
            asset("a.jpg", known(2024, 3, 14, 8)),
            asset("b.jpg", known(2024, 3, 14, 12)),
            asset("c.jpg", known(2024, 3, 14, 23)),
        ];
        let items = group_by_day(&assets, fetch_time(), &Utc, SectionOrder::Scan);
        assert_eq!(section_dates(&items), vec!["2024-03-14"]);
        assert_eq!(tile_paths(&items), vec!["a.jpg", "b.jpg", "c.jpg"]);
        assert!(matches!(items[0], DisplayItem::Section { .. }));
    }

    #[test]
    fn test_output_length_is_input_plus_distinct_dates() {
        let assets = vec![
            asset("a.jpg", known(2024, 3, 14, 8)),
            asset("b.jpg", known(2024, 3, 15, 8)),
            asset("c.jpg", known(2024, 3, 14, 9)),
            asset("d.jpg", known(2024, 3, 16, 8)),
        ];
        let items = group_by_day(&assets, fetch_time(), &Utc, SectionOrder::Scan);
        assert_eq!(items.len(), assets.len() + 3);
    }

    #[test]
    fn test_no_asset_duplicated_or_dropped() {
        let assets = vec![
            asset("a.jpg", known(2024, 3, 14, 8)),
            asset("b.jpg", known(2024, 3, 15, 8)),
            asset("c.jpg", known(2024, 3, 14, 9)),
            asset("d.jpg", TakenAt::Unknown),
            asset("e.jpg", known(2024, 3, 15, 10)),
        ];
        let items = group_by_day(&assets, fetch_time(), &Utc, SectionOrder::Scan);
        let mut out = tile_paths(&items);
        assert_eq!(out.len(), assets.len());
        out.sort_unstable();
        assert_eq!(out, vec!["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"]);
    }

    #[test]
    fn test_stable_first_seen_section_order() {
        // Asset 2 has no timestamp and lands in the fetch-time section,
        // which is appended after the first-encountered date.
        let assets = vec![
            asset("1.jpg", known(2024, 3, 14, 10)),
            asset("2.jpg", TakenAt::Unknown),
            asset("3.jpg", known(2024, 3, 14, 12)),
        ];
        let items = group_by_day(&assets, fetch_time(), &Utc, SectionOrder::Scan);
        let expected = vec![
            DisplayItem::Section { date: "2024-03-14".to_string() },
            DisplayItem::Tile { asset: assets[0].clone() },
            DisplayItem::Tile { asset: assets[2].clone() },
            DisplayItem::Section { date: "2024-06-01".to_string() },
            DisplayItem::Tile { asset: assets[1].clone() },
        ];
        assert_eq!(items, expected);
    }

    #[test]
    fn test_idempotent() {
        let assets = vec![
            asset("a.jpg", known(2024, 3, 14, 8)),
            asset("b.jpg", TakenAt::Unknown),
            asset("c.jpg", known(2022, 1, 28, 8)),
        ];
        let first = group_by_day(&assets, fetch_time(), &Utc, SectionOrder::Scan);
        let second = group_by_day(&assets, fetch_time(), &Utc, SectionOrder::Scan);
        assert_eq!(first, second);
    }

    #[test]
    fn test_every_tile_run_follows_matching_header() {
        let assets = vec![
            asset("a.jpg", known(2024, 3, 14, 8)),
            asset("b.jpg", known(2024, 3, 15, 8)),
            asset("c.jpg", known(2024, 3, 14, 9)),
            asset("d.jpg", TakenAt::Unknown),
        ];
        for order in [SectionOrder::Scan, SectionOrder::Newest, SectionOrder::Oldest] {
            let items = group_by_day(&assets, fetch_time(), &Utc, order);
            let mut current: Option<String> = None;
            for item in &items {
                match item {
                    DisplayItem::Section { date } => current = Some(date.clone()),
                    DisplayItem::Tile { asset } => {
                        let expected = day_key(asset.taken_at.resolve(fetch_time(), &Utc));
                        assert_eq!(current.as_deref(), Some(expected.as_str()));
                    }
                }
            }
        }
    }

    #[test]
    fn test_chronological_section_orders() {
        let assets = vec![
            asset("a.jpg", known(2024, 3, 14, 8)),
            asset("b.jpg", known(2022, 1, 28, 8)),
            asset("c.jpg", known(2024, 2, 10, 8)),
        ];
        let newest = group_by_day(&assets, fetch_time(), &Utc, SectionOrder::Newest);
        assert_eq!(section_dates(&newest), vec!["2024-03-14", "2024-02-10", "2022-01-28"]);

        let oldest = group_by_day(&assets, fetch_time(), &Utc, SectionOrder::Oldest);
        assert_eq!(section_dates(&oldest), vec!["2022-01-28", "2024-02-10", "2024-03-14"]);

        // Re-sorting sections must not disturb in-section asset order
        let both = group_by_day(
            &[
                asset("x.jpg", known(2024, 3, 14, 9)),
                asset("y.jpg", known(2024, 3, 13, 9)),
                asset("z.jpg", known(2024, 3, 14, 8)),
            ],
            fetch_time(),
            &Utc,
            SectionOrder::Oldest,
        );
        assert_eq!(tile_paths(&both), vec!["y.jpg", "x.jpg", "z.jpg"]);
    }

    #[test]
    fn test_known_capture_date_ignores_viewer_timezone() {
        // Evening shot: the camera recorded 23:30 on the 14th. Viewed from
        // UTC+2 the section must still be the camera's date, not the 15th.
        let late = TakenAt::Known(
            NaiveDate::from_ymd_opt(2024, 3, 14)
                .unwrap()
                .and_hms_opt(23, 30, 0)
                .unwrap(),
        );
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let from_utc = group_by_day(&[asset("a.jpg", late)], fetch_time(), &Utc, SectionOrder::Scan);
        let from_plus_two =
            group_by_day(&[asset("a.jpg", late)], fetch_time(), &plus_two, SectionOrder::Scan);
        assert_eq!(section_dates(&from_utc), vec!["2024-03-14"]);
        assert_eq!(section_dates(&from_plus_two), vec!["2024-03-14"]);
    }

    #[test]
    fn test_unknown_fallback_uses_viewer_timezone() {
        // Fetch time is an absolute instant; an undated photo fetched at
        // 23:30 UTC belongs to the 15th for a UTC+2 viewer.
        let fetched = Utc.with_ymd_and_hms(2024, 3, 14, 23, 30, 0).unwrap();
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let items = group_by_day(&[asset("a.jpg", TakenAt::Unknown)], fetched, &plus_two, SectionOrder::Scan);
        assert_eq!(section_dates(&items), vec!["2024-03-15"]);
        let items = group_by_day(&[asset("a.jpg", TakenAt::Unknown)], fetched, &Utc, SectionOrder::Scan);
        assert_eq!(section_dates(&items), vec!["2024-03-14"]);
    }

    #[test]
    fn test_section_order_parse() {
        assert_eq!(SectionOrder::parse("scan"), Some(SectionOrder::Scan));
        assert_eq!(SectionOrder::parse("NEWEST"), Some(SectionOrder::Newest));
        assert_eq!(SectionOrder::parse("oldest"), Some(SectionOrder::Oldest));
        assert_eq!(SectionOrder::parse("sideways"), None);
    }
}
