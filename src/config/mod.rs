// Configuration management module
// TOML settings for the Ollama connection, chunking, retrieval, storage and prompts

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{Config, ConfigError, OllamaConfig, StorageConfig};

/// Resolve the configuration directory, honouring an explicit override
#[inline]
pub fn resolve_config_dir(
    base_dir: Option<&std::path::Path>,
) -> Result<std::path::PathBuf, ConfigError> {
    base_dir.map_or_else(Config::default_dir, |dir| Ok(dir.to_path_buf()))
}
