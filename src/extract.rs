//! Recognizes sale notifications and pulls structured fields out of them.
//!
//! The notification body follows one fixed layout:
//!
//! ```text
//! Сервер: <server>
//! Персонаж: <character>
//! Название: <item>          (or "Предмет:")
//! Кол-во: <quantity>        (or "Количество:")
//! Цена продажи: $<price>
//! ```
//!
//! Fields may be separated by any whitespace, including none at all when the
//! export flattened `<br>` tags away.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::{debug, info, warn};
use regex::Regex;
use serde::Serialize;

use crate::types::{RawMessage, Sale};

/// Layout of a timestamp as written by the chat export.
pub const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Everything from this marker on is dropped before the timestamp is parsed.
const UTC_MARKER: &str = " UTC";

/// Legacy item names and their current canonical names.
pub const BUILTIN_ALIASES: &[(&str, &str)] = &[("Улучшенный эпинефрин", "Адреналин")];

/// Labels that make up the sale notification layout.
#[derive(Debug, Clone, Copy)]
pub struct SaleGrammar {
    /// Phrase that must appear somewhere in a successful sale notification.
    pub marker: &'static str,
    pub server: &'static [&'static str],
    pub character: &'static [&'static str],
    pub item: &'static [&'static str],
    pub quantity: &'static [&'static str],
    pub price: &'static [&'static str],
    pub currency: &'static str,
}

impl SaleGrammar {
    pub const DEFAULT: SaleGrammar = SaleGrammar {
        marker: "Вы успешно продали предмет",
        server: &["Сервер:"],
        character: &["Персонаж:"],
        item: &["Название:", "Предмет:"],
        quantity: &["Кол-во:", "Количество:"],
        price: &["Цена продажи:"],
        currency: "$",
    };

    fn pattern(&self) -> String {
        fn alt(labels: &[&str]) -> String {
            let escaped: Vec<String> = labels.iter().map(|l| regex::escape(l)).collect();
            format!("(?:{})", escaped.join("|"))
        }

        format!(
            r"(?s){}\s*(.+?)\s*{}\s*(.+?)\s*{}\s*(.+?)\s*{}\s*([0-9]+)\s*{}\s*{}([0-9\s,]+)",
            alt(self.server),
            alt(self.character),
            alt(self.item),
            alt(self.quantity),
            alt(self.price),
            regex::escape(self.currency),
        )
    }
}

impl Default for SaleGrammar {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Why a message did not produce a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotASale,
    BadTimestamp,
    GrammarMismatch,
}

/// Outcome counters for one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractStats {
    pub messages: u64,
    pub sales: u64,
    pub not_a_sale: u64,
    pub bad_timestamp: u64,
    pub grammar_mismatch: u64,
    pub defaulted_quantity: u64,
    pub defaulted_price: u64,
}

impl ExtractStats {
    pub fn has_defaults(&self) -> bool {
        self.defaulted_quantity > 0 || self.defaulted_price > 0
    }
}

/// A parsed sale plus flags for numeric fields that fell back to zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub sale: Sale,
    pub quantity_defaulted: bool,
    pub price_defaulted: bool,
}

/// Compiled sale grammar bound to the timezone export timestamps are written in.
#[derive(Debug, Clone)]
pub struct Extractor {
    grammar: SaleGrammar,
    pattern: Regex,
    timezone: Tz,
    aliases: BTreeMap<String, String>,
}

impl Extractor {
    pub fn new(grammar: SaleGrammar, timezone: Tz) -> Result<Self> {
        let pattern = Regex::new(&grammar.pattern()).context("Failed to compile sale grammar")?;
        let aliases = BUILTIN_ALIASES
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();

        Ok(Self {
            grammar,
            pattern,
            timezone,
            aliases,
        })
    }

    /// Add legacy-name rewrites on top of the built-in table. Later entries win.
    pub fn with_aliases<I, K, V>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (from, to) in aliases {
            self.aliases
                .insert(from.into().trim().to_string(), to.into().trim().to_string());
        }
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Extract a sale from one message, or `None` if it is not a well-formed sale.
    pub fn extract(&self, text: &str, timestamp: &str) -> Option<Sale> {
        self.classify(text, timestamp).ok().map(|e| e.sale)
    }

    /// Like [`Extractor::extract`], but reports why a message was rejected.
    pub fn classify(&self, text: &str, timestamp: &str) -> Result<Extracted, Rejection> {
        if !text.contains(self.grammar.marker) {
            return Err(Rejection::NotASale);
        }

        let time = parse_timestamp(timestamp, self.timezone).ok_or(Rejection::BadTimestamp)?;
        let caps = self.pattern.captures(text).ok_or(Rejection::GrammarMismatch)?;

        let item = caps[3].trim();
        let item = self.aliases.get(item).map(String::as_str).unwrap_or(item);
        let quantity = caps[4].trim().parse::<u64>().ok();
        let price = normalize_price(&caps[5]);

        Ok(Extracted {
            sale: Sale {
                time,
                server: caps[1].trim().to_string(),
                character: caps[2].trim().to_string(),
                item: item.to_string(),
                quantity: quantity.unwrap_or(0),
                price: price.unwrap_or(0.0),
            },
            quantity_defaulted: quantity.is_none(),
            price_defaulted: price.is_none(),
        })
    }

    /// Run every message through the extractor, keeping only sales.
    pub fn extract_all(&self, messages: &[RawMessage]) -> (Vec<Sale>, ExtractStats) {
        let mut sales = Vec::new();
        let mut stats = ExtractStats::default();

        for msg in messages {
            stats.messages += 1;
            match self.classify(&msg.text, &msg.timestamp) {
                Ok(extracted) => {
                    stats.sales += 1;
                    if extracted.quantity_defaulted {
                        stats.defaulted_quantity += 1;
                    }
                    if extracted.price_defaulted {
                        stats.defaulted_price += 1;
                    }
                    sales.push(extracted.sale);
                }
                Err(Rejection::NotASale) => stats.not_a_sale += 1,
                Err(reason) => {
                    debug!("skipping message at {:?}: {reason:?}", msg.timestamp);
                    match reason {
                        Rejection::BadTimestamp => stats.bad_timestamp += 1,
                        _ => stats.grammar_mismatch += 1,
                    }
                }
            }
        }

        info!(
            "extracted {} sales from {} messages ({} bad timestamps, {} unmatched)",
            stats.sales, stats.messages, stats.bad_timestamp, stats.grammar_mismatch
        );
        if stats.has_defaults() {
            warn!(
                "{} quantities and {} prices could not be parsed and were counted as 0",
                stats.defaulted_quantity, stats.defaulted_price
            );
        }

        (sales, stats)
    }
}

/// Parse an export timestamp like `"05.03.2025 14:07:09 UTC+03:00"`.
///
/// The UTC suffix is dropped and the wall-clock time is read in `tz`.
/// Times that do not exist in `tz` (DST gaps) are rejected; ambiguous ones
/// resolve to the earlier instant.
pub fn parse_timestamp(raw: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let wall = raw.split(UTC_MARKER).next().unwrap_or(raw).trim();
    let naive = NaiveDateTime::parse_from_str(wall, TIMESTAMP_FORMAT).ok()?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Normalize price text such as `"12 345,67"` or `"1,234,567"` into an amount.
///
/// Whitespace is removed. A single comma is the decimal separator; several
/// commas are thousands separators.
pub fn normalize_price(raw: &str) -> Option<f64> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let normalized = match compact.matches(',').count() {
        0 => compact,
        1 => compact.replace(',', "."),
        _ => compact.replace(',', ""),
    };
    normalized.parse::<f64>().ok().filter(|p| p.is_finite())
}
