use std::path::PathBuf;

use crate::db::{open_data_dir, DB_FILE};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, settings_path, shellexpand_path};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings()?;
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    save_settings(&settings)?;

    let resolved = PathBuf::from(&settings.data_dir);
    open_data_dir(&resolved)?;
    std::fs::create_dir_all(resolved.join("exports"))?;

    println!("Initialized salonbook at {}", resolved.display());
    println!("Database:  {}", resolved.join(DB_FILE).display());
    println!("Settings:  {}", settings_path().display());
    Ok(())
}
