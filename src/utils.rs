use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

use num_format::{Locale, ToFormattedString};

static WARNED_MESSAGES: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

pub fn warn_once(message: impl Into<String>) {
    let message = message.into();
    let cache = WARNED_MESSAGES.get_or_init(|| Mutex::new(HashSet::new()));

    if let Ok(mut warned) = cache.lock()
        && warned.insert(message.clone())
    {
        eprintln!("{message}");
    }
}

#[derive(Clone)]
pub struct NumberFormatOptions {
    pub use_comma: bool,
    pub locale: String,
    pub decimal_places: usize,
}

impl Default for NumberFormatOptions {
    fn default() -> Self {
        Self {
            use_comma: false,
            locale: "en".to_string(),
            decimal_places: 2,
        }
    }
}

impl NumberFormatOptions {
    fn locale(&self) -> Locale {
        match self.locale.as_str() {
            "de" => Locale::de,
            "fr" => Locale::fr,
            "es" => Locale::es,
            "it" => Locale::it,
            "ja" => Locale::ja,
            "ko" => Locale::ko,
            "ru" => Locale::ru,
            "zh" => Locale::zh,
            _ => Locale::en,
        }
    }
}

/// Format a quantity for display.
pub fn format_number(n: impl Into<u64>, options: &NumberFormatOptions) -> String {
    let n: u64 = n.into();
    if options.use_comma {
        n.to_formatted_string(&options.locale())
    } else {
        n.to_string()
    }
}

/// Format a money amount as `$1234.50`, grouping the whole part when commas are on.
pub fn format_amount(amount: f64, options: &NumberFormatOptions) -> String {
    let fixed = format!("{:.prec$}", amount.abs(), prec = options.decimal_places);
    let sign = if amount < 0.0 && fixed.bytes().any(|b| matches!(b, b'1'..=b'9')) {
        "-"
    } else {
        ""
    };

    if !options.use_comma {
        return format!("{sign}${fixed}");
    }

    let locale = options.locale();
    let (whole, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let whole = whole
        .parse::<u64>()
        .map(|w| w.to_formatted_string(&locale))
        .unwrap_or_else(|_| whole.to_string());

    if frac.is_empty() {
        format!("{sign}${whole}")
    } else {
        format!("{sign}${whole}{}{frac}", locale.decimal())
    }
}

/// Get the system's local timezone as an IANA timezone string (e.g., "America/Chicago")
pub fn get_local_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}
