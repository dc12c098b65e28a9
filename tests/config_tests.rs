//! Configuration loaded from files and fed into a registry.

mod common;

use std::io::Write;
use std::time::Duration;

use colloquy::config::Config;
use colloquy::error::ColloquyError;
use colloquy::models::ProviderKey;

use common::{openai_text, registry_with, Reply, ScriptedBackend};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn file_settings_survive_a_round_trip() {
    let original = Config::default()
        .with_api_key(ProviderKey::Anthropic, "ant")
        .with_base_url(ProviderKey::OpenAi, "http://localhost:8080/v1")
        .with_bedrock("AKID", "secret", "eu-central-1")
        .with_request_timeout(Duration::from_millis(1500))
        .with_retry_interval(Duration::from_millis(250))
        .with_max_tool_turns(4);

    let file = write_config(&original.to_toml_string().unwrap());
    let loaded = Config::from_file(file.path()).unwrap();

    assert_eq!(loaded, original);
}

#[test]
fn missing_and_malformed_files_are_configuration_errors() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ColloquyError::Configuration(_)));

    let file = write_config("max_retries = \"three\"");
    let err = Config::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ColloquyError::Configuration(_)));

    let file = write_config("[providers.mystery]\napi_key = \"x\"");
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn environment_overlays_file_values() {
    let file = write_config(
        r#"
        default_model = "claude-3-5-haiku-20241022"
        max_retries = 1

        [providers.openai]
        api_key = "from-file"
        "#,
    );
    let config = Config::from_file(file.path())
        .unwrap()
        .merge_env(|name| match name {
            "OPENAI_API_KEY" => Some("from-env".into()),
            "COLLOQUY_MAX_RETRIES" => Some("5".into()),
            "ANTHROPIC_API_KEY" => Some("   ".into()),
            _ => None,
        })
        .unwrap();

    assert_eq!(config.api_key(ProviderKey::OpenAi), Some("from-env"));
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.default_model, "claude-3-5-haiku-20241022");
    assert!(!config.has_credentials(ProviderKey::Anthropic));
}

#[tokio::test]
async fn file_config_drives_the_session() {
    let file = write_config(
        r#"
        default_model = "gpt-4o-mini"
        retry_interval = 0.001
        retry_interval_randomness = 0.0
        max_retries = 1

        [providers.openai]
        api_key = "sk-file"
        base_url = "http://proxy.internal/v1/"
        "#,
    );
    let config = Config::from_file(file.path()).unwrap();
    let backend = ScriptedBackend::new([
        Reply::status(502, "bad gateway"),
        Reply::Json(openai_text("through the proxy", 3, 2)),
    ]);
    let registry = registry_with(config, backend.clone());
    let mut chat = registry.chat().unwrap();

    let reply = chat.ask("hi").await.unwrap();

    assert_eq!(reply.text(), "through the proxy");
    assert_eq!(chat.model().id, "gpt-4o-mini");
    let request = &backend.requests()[1];
    assert_eq!(request.url, "http://proxy.internal/v1/chat/completions");
    assert_eq!(request.headers["authorization"], "Bearer sk-file");
    assert_eq!(request.body["model"], "gpt-4o-mini");
}

#[test]
fn debug_output_hides_secrets() {
    let config = Config::default().with_bedrock("AKIDSECRET", "very-secret", "us-west-2");
    let rendered = format!("{config:?}");

    assert!(!rendered.contains("very-secret"));
    assert!(!rendered.contains("AKIDSECRET"));
    assert!(rendered.contains("us-west-2"));
}
