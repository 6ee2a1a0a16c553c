use crate::config::GlobalOptions;
use crate::error::CliError;
use libtally::config::ChannelConfig;
use log::*;
use std::path::{Path, PathBuf};

pub fn base_path() -> PathBuf {
    let mut home = std::env::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.push(".tally");
    home
}

pub fn default_config_path() -> PathBuf {
    base_path().join("config.yml")
}

pub fn default_data_dir() -> PathBuf {
    base_path().join("data")
}

pub fn load_config_file<P: AsRef<Path>>(path: P) -> Result<ChannelConfig, CliError> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let config = serde_yml::from_reader(reader)?;
    Ok(config)
}

impl GlobalOptions {
    /// Reads the configuration file and applies the command-line overrides.
    ///
    /// An explicitly named file must exist. A missing default file just means the defaults are used. The CLI always
    /// persists channels, so a data directory is filled in when neither the file nor the flags name one.
    pub fn channel_config(&self) -> Result<ChannelConfig, CliError> {
        let mut config = match &self.config_file {
            Some(path) if !path.exists() => return Err(CliError::MissingConfig(path.clone())),
            Some(path) => load_config_file(path)?,
            None => {
                let path = default_config_path();
                if path.exists() {
                    load_config_file(&path)?
                } else {
                    debug!("No configuration file at {}. Using defaults", path.display());
                    ChannelConfig::default()
                }
            }
        };
        if let Some(dir) = &self.data_dir {
            config.data_dir = Some(dir.clone());
        }
        if config.data_dir.is_none() {
            config.data_dir = Some(default_data_dir());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use libtally::config::SettlementMode;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "settlement: manual\nblock_interval_secs: 60\n").unwrap();
        let options = GlobalOptions { config_file: Some(path), data_dir: None };
        let config = options.channel_config().unwrap();
        assert_eq!(config.settlement, SettlementMode::Manual);
        assert_eq!(config.block_interval_secs, 60);
        assert_eq!(config.default_timeout_blocks, ChannelConfig::default().default_timeout_blocks);
        assert_eq!(config.data_dir, Some(default_data_dir()));
    }

    #[test]
    fn flag_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let saved = ChannelConfig { data_dir: Some(PathBuf::from("/from/file")), ..Default::default() };
        std::fs::write(&path, serde_yml::to_string(&saved).unwrap()).unwrap();
        assert_eq!(load_config_file(&path).unwrap(), saved);

        let options = GlobalOptions { config_file: Some(path.clone()), data_dir: Some(dir.path().to_path_buf()) };
        assert_eq!(options.channel_config().unwrap().data_dir, Some(dir.path().to_path_buf()));
        let options = GlobalOptions { config_file: Some(path), data_dir: None };
        assert_eq!(options.channel_config().unwrap().data_dir, Some(PathBuf::from("/from/file")));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let options = GlobalOptions { config_file: Some(PathBuf::from("/nonexistent/tally.yml")), data_dir: None };
        assert!(matches!(options.channel_config(), Err(CliError::MissingConfig(_))));
    }
}
