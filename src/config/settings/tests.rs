use super::*;
use crate::query::prompt::PromptStyle;
use crate::retriever::SearchMode;
use tempfile::TempDir;

fn default_config() -> Config {
    Config::with_base_dir("/tmp/docs-rag-test")
}

#[test]
fn default_values() {
    let config = default_config();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.embedding_model, "nomic-embed-text:latest");
    assert_eq!(config.ollama.generation_model, "llama3.2:3b");
    assert_eq!(config.ollama.embedding_dimension, None);
    assert_eq!(config.chunking.chunk_size, 600);
    assert_eq!(config.chunking.overlap, 80);
    assert_eq!(config.retrieval.k, 3);
    assert_eq!(config.retrieval.mode, SearchMode::Plain);
    assert_eq!(config.storage.collection, "kb_docs");
    assert_eq!(config.prompt.style, PromptStyle::Qa);
}

#[test]
fn config_validation() {
    let config = default_config();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.embedding_model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.generation_model = "  ".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.timeout_seconds = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.ollama.embedding_dimension = Some(0);
    assert!(invalid_config.validate().is_err());
}

#[test]
fn chunking_validation() {
    let mut config = default_config();
    config.chunking.overlap = config.chunking.chunk_size;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::OverlapTooLarge(600, 600))
    ));

    let mut config = default_config();
    config.chunking.chunk_size = 0;
    config.chunking.overlap = 0;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidChunkSize(0))
    ));
}

#[test]
fn retrieval_validation() {
    let mut config = default_config();
    config.retrieval.k = 0;
    assert!(matches!(config.validate(), Err(ConfigError::InvalidTopK(0))));

    let mut config = default_config();
    config.retrieval.k = 10;
    config.retrieval.fetch_k = 5;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidFetchK(5, 10))
    ));

    let mut config = default_config();
    config.retrieval.lambda = 1.5;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidLambda(_))
    ));

    let mut config = default_config();
    config.retrieval.lambda = f32::NAN;
    assert!(config.validate().is_err());
}

#[test]
fn storage_and_prompt_validation() {
    let mut config = default_config();
    config.storage.collection = "../elsewhere".to_string();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidCollection(_))
    ));

    let mut config = default_config();
    config.prompt.max_prompt_chars = 10;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidPromptLimit(10))
    ));
}

#[test]
fn ollama_url_generation() {
    let config = default_config();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn https_url_generation() {
    let mut config = default_config();
    config.ollama.protocol = "https".to_string();
    config.ollama.host = "secure.example.com".to_string();
    config.ollama.port = 443;

    let url = config
        .ollama_url()
        .expect("should generate https url successfully");
    assert_eq!(url.as_str(), "https://secure.example.com/");
}

#[test]
fn toml_serialization() {
    let config = default_config();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let mut parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    parsed_config.base_dir = config.base_dir.clone();
    assert_eq!(config, parsed_config);
}

#[test]
fn setter_validation() {
    let mut config = OllamaConfig::default();

    assert!(config.set_protocol("https".to_string()).is_ok());
    assert!(config.set_host("example.com".to_string()).is_ok());
    assert!(config.set_port(8080).is_ok());
    assert!(config.set_embedding_model("new-model".to_string()).is_ok());
    assert!(config.set_generation_model("llama3.1".to_string()).is_ok());
    assert!(config.set_batch_size(128).is_ok());
    assert!(config.set_embedding_dimension(Some(384)).is_ok());
    assert!(config.set_embedding_dimension(None).is_ok());
    assert!(config.set_timeout_seconds(30).is_ok());

    assert!(config.set_protocol("ftp".to_string()).is_err());
    assert!(config.set_protocol("HTTP".to_string()).is_err()); // case sensitive
    assert!(config.set_port(0).is_err());
    assert!(config.set_embedding_model(String::new()).is_err());
    assert!(config.set_generation_model(String::new()).is_err());
    assert!(config.set_batch_size(0).is_err());
    assert!(config.set_batch_size(1001).is_err());
    assert!(config.set_embedding_dimension(Some(0)).is_err());
    assert!(config.set_timeout_seconds(0).is_err());

    assert_eq!(config.protocol, "https");
    assert_eq!(config.host, "example.com");
    assert_eq!(config.generation_model, "llama3.1");
    assert_eq!(config.timeout(), Duration::from_secs(30));
}

#[test]
fn load_missing_config() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("should load defaults");

    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.ollama, OllamaConfig::default());
    assert_eq!(config.collections_dir(), temp_dir.path().join("collections"));
}

#[test]
fn save_and_load() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::with_base_dir(temp_dir.path());
    config.ollama.host = "remote.ollama.com".to_string();
    config.chunking.chunk_size = 400;
    config.chunking.overlap = 50;
    config.retrieval.mode = SearchMode::Diverse;
    config.retrieval.k = 2;
    config.retrieval.fetch_k = 5;

    config.save().expect("should save config");
    assert!(config.config_file_path().exists());

    let loaded = Config::load(temp_dir.path()).expect("should load config");
    assert_eq!(loaded, config);
}

#[test]
fn save_rejects_invalid_config() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::with_base_dir(temp_dir.path());
    config.ollama.port = 0;

    assert!(config.save().is_err());
    assert!(!config.config_file_path().exists());
}
