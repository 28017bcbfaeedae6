use super::load_existing_config as load_existing_config_impl;
use crate::config::Config;
use tempfile::TempDir;

#[test]
fn load_existing_config_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = load_existing_config_impl(temp_dir.path()).expect("config loaded successfully");
    assert!(!config.ollama.host.is_empty());
    assert!(config.ollama.port > 0);
    assert!(!config.ollama.embedding_model.is_empty());
    assert!(config.ollama.batch_size > 0);
    assert_eq!(config.get_base_dir(), temp_dir.path());
}

#[test]
fn load_existing_config_from_disk() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut saved = Config::with_base_dir(temp_dir.path());
    saved.storage.collection = "handbook".to_string();
    saved.save().expect("should save config");

    let config = load_existing_config_impl(temp_dir.path()).expect("config loaded successfully");
    assert_eq!(config.storage.collection, "handbook");
}

#[test]
fn load_existing_config_falls_back_on_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(
        temp_dir.path().join("config.toml"),
        "[chunking]\nchunk_size = 10\noverlap = 10\n",
    )
    .expect("should write config");

    let config = load_existing_config_impl(temp_dir.path()).expect("config loaded successfully");
    assert_eq!(config.chunking.chunk_size, 600);
}
