use chrono::{DateTime, Utc};

/// Display name and merge key for a character label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub display_name: String,
    pub key: String,
}

/// Split a raw label such as `"Frodo #12345"` into its display name and identity key.
///
/// The part after the last `#` is the key. Labels without a `#`, or with nothing
/// after it, are keyed by their trimmed display name.
pub fn resolve_identity(label: &str) -> Identity {
    let (display_name, key) = match label.rfind('#') {
        Some(pos) => (label[..pos].trim(), label[pos + 1..].trim()),
        None => (label.trim(), ""),
    };

    let key = if key.is_empty() { display_name } else { key };

    Identity {
        display_name: display_name.to_string(),
        key: key.to_string(),
    }
}

/// Whether an observation at `candidate` supersedes one at `current`.
///
/// Only strictly later observations win, so on an exact tie the first one
/// processed keeps its display name.
pub fn is_more_current(candidate: DateTime<Utc>, current: DateTime<Utc>) -> bool {
    candidate > current
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn splits_name_and_numeric_tag() {
        let id = resolve_identity("Frodo #12345");
        assert_eq!(id.display_name, "Frodo");
        assert_eq!(id.key, "12345");
    }

    #[test]
    fn untagged_label_is_its_own_key() {
        let id = resolve_identity("  Samwise ");
        assert_eq!(id.display_name, "Samwise");
        assert_eq!(id.key, "Samwise");
    }

    #[test]
    fn uses_last_hash_as_separator() {
        let id = resolve_identity("Bilbo #the #7");
        assert_eq!(id.display_name, "Bilbo #the");
        assert_eq!(id.key, "7");
    }

    #[test]
    fn empty_tag_falls_back_to_name() {
        let id = resolve_identity("Merry #  ");
        assert_eq!(id.display_name, "Merry");
        assert_eq!(id.key, "Merry");
    }

    #[test]
    fn only_strictly_later_observations_win() {
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert!(is_more_current(t + chrono::TimeDelta::seconds(1), t));
        assert!(!is_more_current(t, t));
        assert!(!is_more_current(t - chrono::TimeDelta::seconds(1), t));
    }
}
