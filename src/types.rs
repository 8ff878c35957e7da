use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// One recognized item sale pulled out of a chat notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub time: DateTime<Utc>,
    pub server: String,
    /// Raw character label, possibly carrying a `#id` suffix.
    pub character: String,
    pub item: String,
    pub quantity: u64,
    pub price: f64,
}

/// Raw message as handed over by a document source, before classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub text: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemStats {
    pub count: u64,
    pub sum: f64,
}

impl ItemStats {
    pub fn add(&mut self, quantity: u64, price: f64) {
        self.count = self.count.saturating_add(quantity);
        self.sum += price;
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub identity_key: String,
    pub display_name: String,
    pub last_seen: DateTime<Utc>,
    pub items: BTreeMap<String, ItemStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub name: String,
    /// Keyed by identity key.
    pub characters: BTreeMap<String, Character>,
}

/// Per-window aggregation result: server name -> server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub servers: BTreeMap<String, Server>,
}

impl Index {
    pub fn server(&self, name: &str) -> Option<&Server> {
        self.servers.get(name)
    }

    pub fn character(&self, server: &str, identity_key: &str) -> Option<&Character> {
        self.server(server).and_then(|s| s.characters.get(identity_key))
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// A named trailing lookback. `span == None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub name: String,
    pub span: Option<TimeDelta>,
}

impl Window {
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            span: None,
        }
    }

    pub fn trailing(name: impl Into<String>, span: TimeDelta) -> Self {
        Self {
            name: name.into(),
            span: Some(span),
        }
    }

    /// Zero-length spans are treated the same as unbounded ones.
    pub fn is_unbounded(&self) -> bool {
        self.span.is_none_or(|s| s.is_zero())
    }

    /// Whether a sale made at `time` falls inside the window ending at `reference`.
    pub fn contains(&self, reference: DateTime<Utc>, time: DateTime<Utc>) -> bool {
        match self.span {
            Some(span) if !self.is_unbounded() => reference - time <= span,
            _ => true,
        }
    }
}

/// One display-ready line of the report, in enumeration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportRow {
    Server {
        name: String,
    },
    Character {
        server: String,
        identity_key: String,
        display_name: String,
    },
    Window {
        name: String,
    },
    /// The window's index has no entry for this server/character.
    NoData {
        window: String,
    },
    Item {
        window: String,
        item: String,
        count: u64,
        sum: f64,
        average: f64,
    },
    Totals {
        window: String,
        selected_count: u64,
        selected_sum: f64,
        overall_count: u64,
        overall_sum: f64,
    },
}
