use chrono::{DateTime, Utc};

use crate::extract::{ExtractStats, Extractor};
use crate::report::{known_items, project};
use crate::types::{RawMessage, ReportRow, Sale, Window};
use crate::windows::{ALL_TIME, WindowedIndexes, build_all};

/// Result of one batch run over an export.
#[derive(Debug)]
pub struct Analysis {
    pub sales: Vec<Sale>,
    pub diagnostics: ExtractStats,
    pub indexes: WindowedIndexes,
    pub rows: Vec<ReportRow>,
    pub known_items: Vec<String>,
}

/// Classify the messages, build every window and project the report rows.
///
/// `windows` must contain the unbounded [`ALL_TIME`] window; it decides which
/// servers and characters the report enumerates.
pub fn analyze(
    extractor: &Extractor,
    messages: &[RawMessage],
    reference: DateTime<Utc>,
    windows: &[Window],
    selected: &[String],
) -> Analysis {
    let (sales, diagnostics) = extractor.extract_all(messages);
    let indexes = build_all(&sales, reference, windows);
    log::info!("built {} window(s) at {reference}", indexes.len());

    let rows = match indexes.get(ALL_TIME) {
        Some(all) => project(all, &indexes, selected),
        None => {
            log::warn!("no '{ALL_TIME}' window configured, report is empty");
            Vec::new()
        }
    };
    let known_items = known_items(&sales);

    Analysis {
        sales,
        diagnostics,
        indexes,
        rows,
        known_items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::SaleGrammar;
    use crate::windows::default_windows;
    use chrono::TimeZone;

    fn message(character: &str, item: &str, qty: u32, price: &str, ts: &str) -> RawMessage {
        RawMessage {
            text: format!(
                "Вы успешно продали предмет\nСервер: Alpha\nПерсонаж: {character}\nНазвание: {item}\nКол-во: {qty}\nЦена продажи: ${price}"
            ),
            timestamp: format!("{ts} UTC+00:00"),
        }
    }

    #[test]
    fn end_to_end_from_raw_messages() {
        let extractor = Extractor::new(SaleGrammar::DEFAULT, chrono_tz::UTC).unwrap();
        let reference = Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap();
        let messages = vec![
            message("Frodo #1", "Sword", 2, "100", "30.06.2025 10:00:00"),
            RawMessage {
                text: "Привет!".into(),
                timestamp: "30.06.2025 10:30:00".into(),
            },
            message("Frodo #1", "Sword", 3, "50", "30.06.2025 11:00:00"),
            message("Mr. Underhill #1", "Shield", 1, "1 000,50", "15.06.2025 09:00:00"),
        ];
        let selected = vec!["Sword".to_string(), "Shield".to_string()];

        let analysis = analyze(&extractor, &messages, reference, &default_windows(), &selected);

        assert_eq!(analysis.sales.len(), 3);
        assert_eq!(analysis.diagnostics.not_a_sale, 1);
        assert_eq!(analysis.known_items, ["Shield", "Sword"]);

        let day = analysis.indexes.get("day").unwrap();
        let frodo = day.character("Alpha", "1").unwrap();
        assert_eq!(frodo.items["Sword"].count, 5);
        assert_eq!(frodo.items["Sword"].sum, 150.0);
        assert!(!frodo.items.contains_key("Shield"));

        let month = analysis.indexes.get("month").unwrap();
        assert_eq!(
            month.character("Alpha", "1").unwrap().items["Shield"].sum,
            1000.5
        );

        // The latest sale carries the "Frodo" label.
        assert!(analysis.rows.contains(&ReportRow::Character {
            server: "Alpha".into(),
            identity_key: "1".into(),
            display_name: "Frodo".into(),
        }));
    }

    #[test]
    fn missing_all_time_window_yields_no_rows() {
        let extractor = Extractor::new(SaleGrammar::DEFAULT, chrono_tz::UTC).unwrap();
        let reference = Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap();
        let messages = vec![message("Frodo", "Sword", 1, "1", "30.06.2025 10:00:00")];
        let windows = vec![Window::trailing("day", chrono::TimeDelta::hours(24))];

        let analysis = analyze(&extractor, &messages, reference, &windows, &[]);
        assert!(analysis.rows.is_empty());
        assert_eq!(analysis.known_items, ["Sword"]);
    }
}
