//! Config command handlers.

use anyhow::{Context, Result};
use uncling_core::config;

pub fn path() {
    println!("{}", config::paths::config_path().display());
}

pub fn init() -> Result<()> {
    let config_path = config::paths::config_path();
    config::Config::init(&config_path)
        .with_context(|| format!("init config at {}", config_path.display()))?;
    println!("Created config at {}", config_path.display());
    Ok(())
}

pub fn set(key: &str, value: &str) -> Result<()> {
    let config_path = config::paths::config_path();
    config::Config::set_value_to(&config_path, key, value)
        .with_context(|| format!("set {key} in {}", config_path.display()))?;
    println!("Set {key} = {value}");
    Ok(())
}
