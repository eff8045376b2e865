use std::{fs, path::Path};

use anyhow::Context;
use order_sync::{settings::DEFAULT_PAGE_SIZE_OPTIONS, ViewSettings};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "order_console.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub order_id: String,
    pub page_size: usize,
    pub page_size_options: Vec<usize>,
    pub log: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            order_id: "801".into(),
            page_size: 5,
            page_size_options: DEFAULT_PAGE_SIZE_OPTIONS.to_vec(),
            log: "info".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    order_id: Option<String>,
    page_size: Option<usize>,
    page_size_options: Option<Vec<usize>>,
    log: Option<String>,
}

impl Settings {
    /// Rejects a default page size that is not one of the allowed options.
    pub fn view_settings(&self) -> anyhow::Result<ViewSettings> {
        let mut view = ViewSettings {
            page_size_options: self.page_size_options.clone(),
            ..ViewSettings::default()
        };
        view.default_page_size = view
            .validate_page_size(self.page_size)
            .context("invalid page_size setting")?;
        Ok(view)
    }
}

/// Defaults, then the TOML file, then environment overrides.
///
/// A missing default file is skipped; a missing explicit `--config` file is an error.
pub fn load_settings(explicit: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let path = explicit.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(path) {
        Ok(raw) => {
            apply_file(&mut settings, &raw)
                .with_context(|| format!("failed to parse '{}'", path.display()))?;
        }
        Err(err) if explicit.is_some() => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()));
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.order_id {
        settings.order_id = v;
    }
    if let Some(v) = file_cfg.page_size {
        settings.page_size = v;
    }
    if let Some(v) = file_cfg.page_size_options {
        settings.page_size_options = v;
    }
    if let Some(v) = file_cfg.log {
        settings.log = v;
    }
    Ok(())
}

/// `APP__*` wins over the older unprefixed name. Unparseable numbers are ignored.
fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    for key in ["ORDER_CONSOLE_PAGE_SIZE", "APP__PAGE_SIZE"] {
        if let Some(parsed) = var(key).and_then(|v| v.trim().parse::<usize>().ok()) {
            settings.page_size = parsed;
        }
    }
    if let Some(v) = var("APP__ORDER_ID") {
        settings.order_id = v;
    }
    if let Some(v) = var("APP__LOG") {
        settings.log = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
