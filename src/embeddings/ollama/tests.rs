use super::*;
use crate::config::OllamaConfig;

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        embedding_model: "test-embedder".to_string(),
        generation_model: "test-generator".to_string(),
        batch_size: 128,
        embedding_dimension: Some(384),
        timeout_seconds: 45,
        retry_attempts: 2,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.embedding_model(), "test-embedder");
    assert_eq!(client.generation_model(), "test-generator");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.embedding_dimension, Some(384));
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, 2);
    assert_eq!(client.timeout, Duration::from_secs(45));
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);
    assert_eq!(client.timeout, Duration::from_secs(60));

    let client = client.with_retry_attempts(0);
    assert_eq!(client.retry_attempts, 1);
}

#[test]
fn invalid_host_is_configuration_error() {
    let config = OllamaConfig {
        host: "bad host name".to_string(),
        ..OllamaConfig::default()
    };
    assert!(matches!(
        OllamaClient::new(&config),
        Err(RagError::Configuration(_))
    ));
}

#[test]
fn empty_batch_makes_no_request() {
    let config = OllamaConfig {
        port: 1,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");
    let embeddings = client.embed_texts(&[]).expect("empty input should succeed");
    assert!(embeddings.is_empty());
}

#[test]
fn generate_request_shape() {
    let request = GenerateRequest {
        model: "llama3.2:3b",
        prompt: "hello",
        stream: false,
        options: GenerateOptions { temperature: 0.0 },
        format: Some("json"),
    };
    let json = serde_json::to_value(&request).expect("should serialize");
    assert_eq!(json["stream"], false);
    assert_eq!(json["options"]["temperature"], 0.0);
    assert_eq!(json["format"], "json");

    let request = GenerateRequest {
        format: None,
        ..request
    };
    let json = serde_json::to_value(&request).expect("should serialize");
    assert!(json.get("format").is_none());
}

#[test]
fn latest_tag_is_implicit() {
    assert!(model_matches("nomic-embed-text:latest", "nomic-embed-text"));
    assert!(model_matches("nomic-embed-text", "nomic-embed-text:latest"));
    assert!(model_matches("llama3.2:3b", "llama3.2:3b"));
    assert!(!model_matches("llama3.2:1b", "llama3.2:3b"));
    assert!(!model_matches("llama3.2:latest", "llama3.2:3b"));
}
