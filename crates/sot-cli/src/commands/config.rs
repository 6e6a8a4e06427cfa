/// Settings command handlers
use anyhow::Result;
use sot_storage::{Database, Settings};
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct SettingRow {
    #[tabled(rename = "Key")]
    key: &'static str,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Default")]
    default: String,
}

fn setting_rows(settings: &Settings) -> Result<Vec<SettingRow>> {
    let defaults = Settings::default();
    Settings::KEYS
        .iter()
        .map(|&key| {
            Ok(SettingRow {
                key,
                value: settings.get(key)?,
                default: defaults.get(key)?,
            })
        })
        .collect()
}

pub fn handle_config_show() -> Result<()> {
    let db = Database::new(None)?;
    let settings = db.get_settings()?;

    println!("{}", Table::new(setting_rows(&settings)?));
    println!("\nsessionTimeout is in minutes (0 = never expire)");
    Ok(())
}

pub fn handle_config_get(key: &str) -> Result<()> {
    let db = Database::new(None)?;
    let value = db.get_settings()?.get(key)?;
    println!("{key} = {value}");
    Ok(())
}

pub fn handle_config_set(key: &str, value: &str) -> Result<()> {
    let db = Database::new(None)?;
    let settings = db.set_setting(key, value)?;
    println!("Set {key} = {}", settings.get(key)?);
    Ok(())
}

pub fn handle_config_reset() -> Result<()> {
    let db = Database::new(None)?;
    db.reset_settings()?;
    println!("Settings restored to defaults.");
    Ok(())
}
