use chrono::{DateTime, TimeDelta, Utc};

use crate::aggregate::build_index;
use crate::types::{Index, Sale, Window};

/// Name of the unbounded window every report is enumerated from.
pub const ALL_TIME: &str = "all";

/// The standard report windows. A "month" is a fixed 30 days.
pub fn default_windows() -> Vec<Window> {
    vec![
        Window::unbounded(ALL_TIME),
        Window::trailing("day", TimeDelta::hours(24)),
        Window::trailing("week", TimeDelta::days(7)),
        Window::trailing("month", TimeDelta::days(30)),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowIndex {
    pub window: Window,
    pub index: Index,
}

/// One independently built index per window, in the order the windows were given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowedIndexes {
    entries: Vec<WindowIndex>,
}

impl WindowedIndexes {
    pub fn get(&self, name: &str) -> Option<&Index> {
        self.entries
            .iter()
            .find(|e| e.window.name == name)
            .map(|e| &e.index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowIndex> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Build every window's index against the same reference instant.
pub fn build_all(sales: &[Sale], reference: DateTime<Utc>, windows: &[Window]) -> WindowedIndexes {
    let entries = windows
        .iter()
        .map(|window| {
            let index = build_index(sales, reference, window);
            if index.is_empty() {
                log::debug!("window {}: no sales", window.name);
            } else {
                log::debug!("window {}: {} server(s)", window.name, index.servers.len());
            }
            WindowIndex {
                window: window.clone(),
                index,
            }
        })
        .collect();

    WindowedIndexes { entries }
}
