//! Config command implementation - print or write the default configuration

use anyhow::Result;
use std::path::PathBuf;

use crate::config::Config;

pub fn execute(config: &Config, output: Option<PathBuf>, effective: bool) -> Result<()> {
    let selected = if effective { config.clone() } else { Config::default() };
    match output {
        Some(path) => {
            selected.save_to_file(&path)?;
            log::info!("Configuration written to: {}", path.display());
        }
        None if effective => print!("{}", toml::to_string_pretty(&selected)?),
        None => print!("{}", Config::example_toml()?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_effective_config() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("kmerpath.toml");
        let mut config = Config::default();
        config.compactor.key_length = 21;

        execute(&config, Some(path.clone()), true)?;
        assert_eq!(Config::load_from_file(&path)?, config);

        execute(&config, Some(path.clone()), false)?;
        assert_eq!(Config::load_from_file(&path)?, Config::default());
        Ok(())
    }
}
