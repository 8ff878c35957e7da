use std::collections::{BTreeSet, HashSet};

use crate::types::{Character, Index, ItemStats, ReportRow, Sale};
use crate::windows::WindowedIndexes;

/// Project the per-window indexes into ordered display rows.
///
/// Servers and characters are enumerated from `all`, sorted by server name and
/// then by current display name. Every window in `windows` gets a section for
/// each character; a window lacking the server or character gets a
/// [`ReportRow::NoData`] marker instead of item rows.
pub fn project(all: &Index, windows: &WindowedIndexes, selected: &[String]) -> Vec<ReportRow> {
    let mut rows = Vec::new();

    for server in all.servers.values() {
        rows.push(ReportRow::Server {
            name: server.name.clone(),
        });

        let mut characters: Vec<&Character> = server.characters.values().collect();
        characters.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.identity_key.cmp(&b.identity_key))
        });

        for character in characters {
            rows.push(ReportRow::Character {
                server: server.name.clone(),
                identity_key: character.identity_key.clone(),
                display_name: character.display_name.clone(),
            });

            for entry in windows.iter() {
                let window = &entry.window.name;
                rows.push(ReportRow::Window {
                    name: window.clone(),
                });

                match entry.index.character(&server.name, &character.identity_key) {
                    Some(found) => push_character_rows(&mut rows, window, found, selected),
                    None => rows.push(ReportRow::NoData {
                        window: window.clone(),
                    }),
                }
            }
        }
    }

    rows
}

fn push_character_rows(
    rows: &mut Vec<ReportRow>,
    window: &str,
    character: &Character,
    selected: &[String],
) {
    for item in selected {
        if let Some(stats) = character.items.get(item) {
            rows.push(ReportRow::Item {
                window: window.to_string(),
                item: item.clone(),
                count: stats.count,
                sum: stats.sum,
                average: stats.average(),
            });
        }
    }

    // A repeated selection still counts its item once.
    let distinct: HashSet<&str> = selected.iter().map(String::as_str).collect();
    let selected_total = total(
        character
            .items
            .iter()
            .filter(|(name, _)| distinct.contains(name.as_str()))
            .map(|(_, stats)| stats),
    );
    let overall_total = total(character.items.values());

    rows.push(ReportRow::Totals {
        window: window.to_string(),
        selected_count: selected_total.count,
        selected_sum: selected_total.sum,
        overall_count: overall_total.count,
        overall_sum: overall_total.sum,
    });
}

fn total<'a>(stats: impl Iterator<Item = &'a ItemStats>) -> ItemStats {
    stats.fold(ItemStats::default(), |mut acc, s| {
        acc.add(s.count, s.sum);
        acc
    })
}

/// Every distinct item name seen across all sales, sorted.
pub fn known_items(sales: &[Sale]) -> Vec<String> {
    sales
        .iter()
        .map(|s| s.item.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(String::from)
        .collect()
}
