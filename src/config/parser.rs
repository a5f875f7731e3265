use crate::config::types::FileConfig;
use crate::ConfigError;
use std::path::Path;

/// Loads and parses a TOML configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(FileConfig)` - Successfully parsed file settings
/// * `Err(ConfigError)` - Failed to read or parse the file
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use site_gleaner::config::load_file_config;
///
/// let file = load_file_config(Path::new("gleaner.toml")).unwrap();
/// println!("Extra seeds: {}", file.seeds.len());
/// ```
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_file_config(&content)
}

/// Parses configuration file content
pub fn parse_file_config(content: &str) -> Result<FileConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}
