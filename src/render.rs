use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::extract::ExtractStats;
use crate::types::ReportRow;
use crate::utils::{NumberFormatOptions, format_amount, format_number};

/// Everything the report sink receives for one run.
#[derive(Debug, Serialize)]
pub struct ReportOutput<'a> {
    pub reference_time: DateTime<Utc>,
    pub export: Option<String>,
    pub rows: &'a [ReportRow],
    pub known_items: &'a [String],
    pub diagnostics: &'a ExtractStats,
}

pub fn render_json(output: &ReportOutput<'_>, pretty: bool) -> Result<String> {
    let json = if pretty {
        simd_json::to_string_pretty(output)?
    } else {
        simd_json::to_string(output)?
    };
    Ok(json)
}

struct PendingItem<'a> {
    item: &'a str,
    count: String,
    sum: String,
    average: String,
}

pub fn render_text<W: Write>(
    out: &mut W,
    output: &ReportOutput<'_>,
    options: &NumberFormatOptions,
) -> Result<()> {
    if let Some(export) = &output.export {
        writeln!(out, "Export: {export}")?;
    }

    let mut pending: Vec<PendingItem<'_>> = Vec::new();

    for row in output.rows {
        match row {
            ReportRow::Server { name } => {
                writeln!(out)?;
                writeln!(out, "Server: {name}")?;
            }
            ReportRow::Character {
                identity_key,
                display_name,
                ..
            } => {
                if identity_key == display_name {
                    writeln!(out, "Character {display_name}:")?;
                } else {
                    writeln!(out, "Character {display_name} #{identity_key}:")?;
                }
            }
            ReportRow::Window { name } => {
                pending.clear();
                writeln!(out, "  -- {name} --")?;
            }
            ReportRow::NoData { .. } => {
                writeln!(out, "    (no data)")?;
            }
            ReportRow::Item {
                item,
                count,
                sum,
                average,
                ..
            } => pending.push(PendingItem {
                item,
                count: format_number(*count, options),
                sum: format_amount(*sum, options),
                average: format_amount(*average, options),
            }),
            ReportRow::Totals {
                selected_sum,
                overall_sum,
                ..
            } => {
                write_item_table(out, &pending)?;
                pending.clear();
                writeln!(
                    out,
                    "    Selected items total: {}",
                    format_amount(*selected_sum, options)
                )?;
                writeln!(
                    out,
                    "    Overall total:        {}",
                    format_amount(*overall_sum, options)
                )?;
            }
        }
    }

    writeln!(out)?;
    writeln!(out, "All sold items:")?;
    for item in output.known_items {
        writeln!(out, " - {item}")?;
    }

    let stats = output.diagnostics;
    if stats.has_defaults() {
        writeln!(out)?;
        writeln!(
            out,
            "Note: {} quantity and {} price field(s) could not be parsed and were counted as 0.",
            stats.defaulted_quantity, stats.defaulted_price
        )?;
    }

    Ok(())
}

fn write_item_table<W: Write>(out: &mut W, items: &[PendingItem<'_>]) -> Result<()> {
    const HEADERS: [&str; 4] = ["Item", "Qty", "Sales", "Avg price"];

    let w_item = column_width(HEADERS[0], items.iter().map(|i| i.item));
    let w_count = column_width(HEADERS[1], items.iter().map(|i| i.count.as_str()));
    let w_sum = column_width(HEADERS[2], items.iter().map(|i| i.sum.as_str()));

    writeln!(
        out,
        "    {:<w_item$}  {:>w_count$}  {:>w_sum$}  {}",
        HEADERS[0], HEADERS[1], HEADERS[2], HEADERS[3]
    )?;
    for i in items {
        writeln!(
            out,
            "    {:<w_item$}  {:>w_count$}  {:>w_sum$}  {}",
            i.item, i.count, i.sum, i.average
        )?;
    }
    Ok(())
}

fn column_width<'a>(header: &str, cells: impl Iterator<Item = &'a str>) -> usize {
    cells
        .map(|c| c.chars().count())
        .chain(std::iter::once(header.chars().count()))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_rows() -> Vec<ReportRow> {
        vec![
            ReportRow::Server {
                name: "Alpha".into(),
            },
            ReportRow::Character {
                server: "Alpha".into(),
                identity_key: "1".into(),
                display_name: "Frodo".into(),
            },
            ReportRow::Window { name: "all".into() },
            ReportRow::Item {
                window: "all".into(),
                item: "Sword".into(),
                count: 5,
                sum: 150.0,
                average: 30.0,
            },
            ReportRow::Totals {
                window: "all".into(),
                selected_count: 5,
                selected_sum: 150.0,
                overall_count: 6,
                overall_sum: 160.0,
            },
            ReportRow::Window { name: "day".into() },
            ReportRow::NoData {
                window: "day".into(),
            },
            ReportRow::Character {
                server: "Alpha".into(),
                identity_key: "Sam".into(),
                display_name: "Sam".into(),
            },
        ]
    }

    fn output<'a>(
        rows: &'a [ReportRow],
        items: &'a [String],
        stats: &'a ExtractStats,
    ) -> ReportOutput<'a> {
        ReportOutput {
            reference_time: Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap(),
            export: None,
            rows,
            known_items: items,
            diagnostics: stats,
        }
    }

    #[test]
    fn renders_sections_tables_and_item_list() {
        let rows = sample_rows();
        let items = vec!["Rope".to_string(), "Sword".to_string()];
        let stats = ExtractStats::default();

        let mut buf = Vec::new();
        render_text(
            &mut buf,
            &output(&rows, &items, &stats),
            &NumberFormatOptions::default(),
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();

        let expected = "\nServer: Alpha\n\
            Character Frodo #1:\n  \
            -- all --\n    \
            Item   Qty    Sales  Avg price\n    \
            Sword    5  $150.00  $30.00\n    \
            Selected items total: $150.00\n    \
            Overall total:        $160.00\n  \
            -- day --\n    \
            (no data)\n\
            Character Sam:\n\
            \nAll sold items:\n - Rope\n - Sword\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn mentions_defaulted_fields() {
        let stats = ExtractStats {
            defaulted_price: 2,
            ..Default::default()
        };
        let mut buf = Vec::new();
        render_text(
            &mut buf,
            &output(&[], &[], &stats),
            &NumberFormatOptions::default(),
        )
        .unwrap();

        assert!(
            String::from_utf8(buf)
                .unwrap()
                .contains("0 quantity and 2 price field(s)")
        );
    }

    #[test]
    fn json_tags_rows_by_kind() {
        let rows = sample_rows();
        let stats = ExtractStats::default();
        let json = render_json(&output(&rows, &[], &stats), false).unwrap();

        assert!(json.contains(r#""kind":"no_data""#));
        assert!(json.contains(r#""kind":"totals""#));
        assert!(json.contains(r#""selected_count":5"#));
    }
}
