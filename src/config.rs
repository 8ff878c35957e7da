use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub export: ExportConfig,
    pub report: ReportConfig,
    pub formatting: FormattingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory holding the `ChatExport_*` folders.
    pub base_dir: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub selected_items: Vec<String>,
    /// IANA timezone the export timestamps are written in. Empty means the system timezone.
    pub timezone: String,
    /// Extra legacy item name -> canonical name rewrites.
    pub aliases: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FormattingConfig {
    pub number_comma: bool,
    pub locale: String,
    pub decimal_places: usize,
}

impl Default for FormattingConfig {
    fn default() -> Self {
        Self {
            number_comma: false,
            locale: "en".to_string(),
            decimal_places: 2,
        }
    }
}

thread_local! {
    static TEST_CONFIG_PATH: RefCell<Option<PathBuf>> = const { RefCell::new(None) };
}

#[cfg(test)]
pub fn set_test_config_path(path: PathBuf) {
    TEST_CONFIG_PATH.with(|p| *p.borrow_mut() = Some(path));
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        #[cfg(test)]
        {
            if let Some(path) = TEST_CONFIG_PATH.with(|p| p.borrow().clone()) {
                return Ok(path);
            }
        }

        Ok(dirs::home_dir()
            .context("Could not find home directory")?
            .join(".marketstat.toml"))
    }

    pub fn load() -> Result<Option<Config>> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        Ok(Some(config))
    }

    pub fn save(&self, silent: bool) -> Result<()> {
        let config_path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, content).context("Failed to write config file")?;

        if !silent {
            println!("✅ Configuration saved to: {}", config_path.display());
        }

        Ok(())
    }

    /// A run needs both an export directory and at least one selected item.
    pub fn is_complete(&self) -> bool {
        !self.export.base_dir.trim().is_empty() && !self.report.selected_items.is_empty()
    }

    pub fn set_base_dir(&mut self, dir: &str) {
        self.export.base_dir = dir.trim().to_string();
    }

    pub fn set_selected_items<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.report.selected_items = items
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    /// Repeats are kept; each one gets its own report row.
    pub fn add_selected_item(&mut self, item: &str) {
        let item = item.trim();
        if !item.is_empty() {
            self.report.selected_items.push(item.to_string());
        }
    }

    /// Returns whether the item was selected.
    pub fn remove_selected_item(&mut self, item: &str) -> bool {
        let before = self.report.selected_items.len();
        self.report.selected_items.retain(|i| i != item.trim());
        before != self.report.selected_items.len()
    }

    /// Timezone for export timestamps, falling back to the system one.
    pub fn timezone(&self) -> chrono_tz::Tz {
        let name = if self.report.timezone.trim().is_empty() {
            crate::utils::get_local_timezone()
        } else {
            self.report.timezone.trim().to_string()
        };

        name.parse().unwrap_or_else(|_| {
            crate::utils::warn_once(format!("⚠️  Unknown timezone '{name}', using UTC"));
            chrono_tz::UTC
        })
    }
}

/// Load the config, asking for the missing pieces when running interactively.
///
/// `base_dir` replaces the configured export directory for this run.
pub fn load_or_collect(base_dir: Option<&str>) -> Result<Config> {
    let stdin = std::io::stdin();
    let interactive = stdin.is_terminal();
    resolve_config(base_dir, interactive, &mut stdin.lock(), &mut std::io::stdout())
}

/// Only the answers typed at the prompt are saved; the `base_dir` override is not.
fn resolve_config<R: BufRead, W: Write>(
    base_dir: Option<&str>,
    interactive: bool,
    input: &mut R,
    output: &mut W,
) -> Result<Config> {
    let mut stored = Config::load()?.unwrap_or_default();
    let mut config = stored.clone();
    if let Some(dir) = base_dir {
        config.set_base_dir(dir);
    }
    if config.is_complete() {
        return Ok(config);
    }

    if !interactive {
        anyhow::bail!(
            "Configuration incomplete: run `marketstat config init` and set base-dir and selected-items"
        );
    }

    collect_interactively(&mut config, input, output)?;
    if base_dir.is_none() {
        stored.export.base_dir = config.export.base_dir.clone();
    }
    stored.report.selected_items = config.report.selected_items.clone();
    stored.save(false)?;
    Ok(config)
}

/// Prompt for whatever the config is missing: the export directory, then
/// item names one per line until a blank line.
pub fn collect_interactively<R: BufRead, W: Write>(
    config: &mut Config,
    input: &mut R,
    output: &mut W,
) -> Result<()> {
    if config.export.base_dir.trim().is_empty() {
        write!(output, "Path to the directory with ChatExport_* folders: ")?;
        output.flush()?;
        let mut line = String::new();
        input.read_line(&mut line)?;
        config.set_base_dir(&line);
    }

    if config.report.selected_items.is_empty() {
        writeln!(output, "Item names to report on (empty line to finish):")?;
        output.flush()?;
        loop {
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 || line.trim().is_empty() {
                break;
            }
            config.add_selected_item(&line);
        }
    }

    if !config.is_complete() {
        anyhow::bail!("A base directory and at least one item are required");
    }
    Ok(())
}

// CLI helper functions
pub fn create_default_config(overwrite: bool) -> Result<()> {
    let config = Config::default();
    if !std::fs::exists(Config::config_path()?)? || overwrite {
        config.save(true)?;

        println!("📝 Created default configuration file.");
        println!("📍 Point it at your chat exports and pick items:");
        println!("   marketstat config set base-dir ...");
        println!("   marketstat config set selected-items \"Item A,Item B\"");
        println!("or edit");
        println!("   {}", Config::config_path()?.display());
    } else {
        println!("Configuration already exists.  Pass `--overwrite` to overwrite.");
    }

    Ok(())
}

pub fn show_config() -> Result<()> {
    match Config::load()? {
        Some(config) => {
            println!("🔧 Current configuration:");
            println!(
                "   Base Dir: {}",
                if config.export.base_dir.is_empty() {
                    "Not set"
                } else {
                    config.export.base_dir.as_str()
                }
            );
            println!("   Selected Items:");
            for item in &config.report.selected_items {
                println!("     - {item}");
            }
            println!(
                "   Timezone: {}",
                if config.report.timezone.is_empty() {
                    "System"
                } else {
                    config.report.timezone.as_str()
                }
            );
            for (from, to) in &config.report.aliases {
                println!("   Alias: {from} -> {to}");
            }
            println!("   Number Comma: {}", config.formatting.number_comma);
            println!("   Locale: {}", config.formatting.locale);
            println!("   Decimal Places: {}", config.formatting.decimal_places);
        }
        None => {
            println!("❌ No configuration file found.");
            println!("   Run 'marketstat config init' to create one.");
        }
    }
    Ok(())
}

pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?.unwrap_or_default();

    match key {
        "base-dir" => config.set_base_dir(value),
        "selected-items" => config.set_selected_items(value.split(',')),
        "add-item" => config.add_selected_item(value),
        "remove-item" => {
            if !config.remove_selected_item(value) {
                anyhow::bail!("Item not selected: {}", value);
            }
        }
        "timezone" => {
            let value = value.trim();
            if !value.is_empty() {
                value
                    .parse::<chrono_tz::Tz>()
                    .map_err(|_| anyhow::anyhow!("Unknown timezone: {}", value))?;
            }
            config.report.timezone = value.to_string();
        }
        "number-comma" => {
            let enabled = value
                .parse::<bool>()
                .context("Invalid boolean value. Use 'true' or 'false'")?;
            config.formatting.number_comma = enabled;
        }
        "locale" => {
            config.formatting.locale = value.to_string();
        }
        "decimal-places" => {
            let places = value.parse::<usize>().context("Invalid number value")?;
            config.formatting.decimal_places = places;
        }
        _ => anyhow::bail!("Unknown config key: {}", key),
    }

    config.save(false)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn setup_test_config() -> (TempDir, PathBuf) {
        let dir = TempDir::new().expect("tempdir");
        let config_path = dir.path().join(".marketstat.toml");
        set_test_config_path(config_path.clone());
        (dir, config_path)
    }

    #[test]
    fn default_config_round_trip() {
        let (_dir, _path) = setup_test_config();
        create_default_config(true).expect("create_default_config");

        let loaded = Config::load()
            .expect("load config")
            .expect("config should exist");

        assert_eq!(loaded, Config::default());
        assert_eq!(loaded.formatting.locale, "en");
        assert!(!loaded.is_complete());
    }

    #[test]
    fn missing_config_loads_as_none() {
        let (_dir, _path) = setup_test_config();
        assert!(Config::load().expect("load config").is_none());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let (_dir, path) = setup_test_config();
        fs::write(
            &path,
            "[export]\nbase_dir = \"/data/tg\"\n\n[report]\nselected_items = [\"Sword\"]\n\n[report.aliases]\n\"Old Sword\" = \"Sword\"\n",
        )
        .unwrap();

        let cfg = Config::load().unwrap().unwrap();
        assert!(cfg.is_complete());
        assert_eq!(cfg.export.base_dir, "/data/tg");
        assert_eq!(cfg.report.aliases["Old Sword"], "Sword");
        assert_eq!(cfg.formatting.decimal_places, 2);
    }

    #[test]
    fn set_config_value_behaviour() {
        let (_dir, _path) = setup_test_config();
        create_default_config(true).expect("create_default_config");

        set_config_value("base-dir", " /data/tg ").expect("set base-dir");
        set_config_value("selected-items", "Sword, Shield ,,Bow").expect("set items");
        set_config_value("add-item", "Rope").expect("add item");
        set_config_value("add-item", "Sword").expect("add repeated item");
        set_config_value("remove-item", "Shield").expect("remove item");
        set_config_value("timezone", "Europe/Moscow").expect("set timezone");
        set_config_value("number-comma", "true").expect("set number-comma");
        set_config_value("locale", "de").expect("set locale");
        set_config_value("decimal-places", "3").expect("set decimal-places");

        let cfg = Config::load()
            .expect("load config")
            .expect("config should exist");

        assert_eq!(cfg.export.base_dir, "/data/tg");
        assert_eq!(cfg.report.selected_items, ["Sword", "Bow", "Rope", "Sword"]);
        assert_eq!(cfg.report.timezone, "Europe/Moscow");
        assert_eq!(cfg.timezone(), chrono_tz::Europe::Moscow);
        assert!(cfg.formatting.number_comma);
        assert_eq!(cfg.formatting.locale, "de");
        assert_eq!(cfg.formatting.decimal_places, 3);

        let err = set_config_value("unknown-key", "value").unwrap_err();
        let msg = format!("{err}");
        assert!(
            msg.contains("Unknown config key"),
            "unexpected error message: {msg}"
        );
        let err = set_config_value("number-comma", "not-a-bool").unwrap_err();
        let msg = format!("{err}");
        assert!(
            msg.contains("Invalid boolean value"),
            "unexpected error message: {msg}"
        );
        assert!(set_config_value("timezone", "Mars/Olympus").is_err());
        assert!(set_config_value("remove-item", "Lembas").is_err());
    }

    #[test]
    fn interactive_collection_fills_missing_fields() {
        let mut config = Config::default();
        let mut input = Cursor::new("/data/tg\nSword\n  Shield  \nSword\n\nignored\n");
        let mut output = Vec::new();

        collect_interactively(&mut config, &mut input, &mut output).unwrap();

        assert_eq!(config.export.base_dir, "/data/tg");
        assert_eq!(config.report.selected_items, ["Sword", "Shield", "Sword"]);
        assert!(String::from_utf8(output).unwrap().contains("ChatExport_*"));
    }

    #[test]
    fn interactive_collection_keeps_existing_values() {
        let mut config = Config::default();
        config.set_base_dir("/existing");
        let mut input = Cursor::new("Bow\n");
        let mut output = Vec::new();

        collect_interactively(&mut config, &mut input, &mut output).unwrap();

        assert_eq!(config.export.base_dir, "/existing");
        assert_eq!(config.report.selected_items, ["Bow"]);
    }

    #[test]
    fn interactive_collection_requires_items() {
        let mut config = Config::default();
        let mut input = Cursor::new("/data/tg\n\n");
        let mut output = Vec::new();

        assert!(collect_interactively(&mut config, &mut input, &mut output).is_err());
    }

    #[test]
    fn base_dir_override_is_not_saved() {
        let (_dir, _path) = setup_test_config();
        let mut input = Cursor::new("Sword\nSword\n\n");
        let mut output = Vec::new();

        let config = resolve_config(Some("/tmp/one-run"), true, &mut input, &mut output).unwrap();
        assert_eq!(config.export.base_dir, "/tmp/one-run");
        assert_eq!(config.report.selected_items, ["Sword", "Sword"]);

        let saved = Config::load().unwrap().unwrap();
        assert_eq!(saved.export.base_dir, "");
        assert_eq!(saved.report.selected_items, ["Sword", "Sword"]);
    }

    #[test]
    fn typed_base_dir_is_saved() {
        let (_dir, _path) = setup_test_config();
        let mut input = Cursor::new("/data/tg\nBow\n\n");
        let mut output = Vec::new();

        resolve_config(None, true, &mut input, &mut output).unwrap();

        let saved = Config::load().unwrap().unwrap();
        assert_eq!(saved.export.base_dir, "/data/tg");
        assert_eq!(saved.report.selected_items, ["Bow"]);
    }

    #[test]
    fn incomplete_config_without_terminal_points_to_init() {
        let (_dir, _path) = setup_test_config();
        let mut input = Cursor::new("");
        let mut output = Vec::new();

        let err = resolve_config(None, false, &mut input, &mut output).unwrap_err();
        assert!(format!("{err}").contains("marketstat config init"));
        assert!(Config::load().unwrap().is_none());
    }
}
