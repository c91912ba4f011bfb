//! Configuration loading from disk.

use ai_orchestrator::{ConfigError, ConfigLoader, ModelRole, Orchestrator};
use std::path::PathBuf;

/// Temp file that is removed on drop.
struct TempConfig(PathBuf);

impl TempConfig {
    fn new(extension: &str, contents: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "ai-orchestrator-{}.{}",
            uuid::Uuid::new_v4(),
            extension
        ));
        std::fs::write(&path, contents).expect("write temp config");
        Self(path)
    }
}

impl Drop for TempConfig {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

const DOC: &str = r#"
llm:
  default_provider: openai
  model_roles:
    primary: [gpt-4o-mini]
    reserve: [gemini-1.5-flash]
providers:
  openai:
    base_url: https://api.openai.com/v1
    api_key: ${FOO}
    models:
      chat: [ { name: gpt-4o-mini } ]
  gemini:
    base_url: https://generativelanguage.googleapis.com/v1beta
    api_key: key-${FOO}-suffix
    models:
      flash: [ { name: gemini-1.5-flash } ]
"#;

fn loader() -> ConfigLoader {
    ConfigLoader::new().with_env(|name| match name {
        "FOO" => Some("bar".to_string()),
        "LOOP_A" => Some("${LOOP_B}".to_string()),
        "LOOP_B" => Some("${LOOP_A}".to_string()),
        _ => None,
    })
}

#[tokio::test]
async fn secret_substitution_round_trip() {
    let file = TempConfig::new("yaml", DOC);
    let config = loader().load(&file.0).await.unwrap();

    assert_eq!(config.providers["openai"].api_key.as_deref(), Some("bar"));
    assert_eq!(
        config.providers["gemini"].api_key.as_deref(),
        Some("key-bar-suffix")
    );
    assert_eq!(config.llm.fastest_cache_ttl_secs, 60);
    assert_eq!(config.llm.retry.max_attempts, 3);
}

#[tokio::test]
async fn json_documents_are_accepted() {
    let doc = r#"{
        "llm": {"default_provider": "openai", "model_roles": {"primary": ["m1"]}},
        "providers": {"openai": {"base_url": "https://api.openai.com/v1", "models": {"chat": [{"name": "m1"}]}}}
    }"#;
    let file = TempConfig::new("json", doc);
    let config = loader().load(&file.0).await.unwrap();
    assert_eq!(config.llm.model_roles.primary, vec!["m1"]);
}

#[tokio::test]
async fn missing_variable_fails_the_load() {
    let file = TempConfig::new("yml", &DOC.replace("${FOO}", "${MISSING}"));
    let err = loader().load(&file.0).await.unwrap_err();
    assert!(
        matches!(err, ConfigError::UnresolvedVariable { ref name, .. } if name == "MISSING"),
        "{:?}",
        err
    );
}

#[tokio::test]
async fn circular_reference_is_detected() {
    let file = TempConfig::new("yaml", &DOC.replace("${FOO}", "${LOOP_A}"));
    let err = loader().load(&file.0).await.unwrap_err();
    assert!(matches!(err, ConfigError::CircularReference { .. }), "{:?}", err);
}

#[tokio::test]
async fn unsafe_paths_are_rejected_before_reading() {
    let wrong_ext = TempConfig::new("txt", DOC);
    assert!(matches!(
        loader().load(&wrong_ext.0).await.unwrap_err(),
        ConfigError::InvalidPath { .. }
    ));

    let missing = std::env::temp_dir().join(format!("missing-{}.yaml", uuid::Uuid::new_v4()));
    assert!(matches!(
        loader().load(&missing).await.unwrap_err(),
        ConfigError::InvalidPath { .. }
    ));

    assert!(matches!(
        loader().load(std::env::temp_dir()).await.unwrap_err(),
        ConfigError::InvalidPath { .. }
    ));
}

#[tokio::test]
async fn engine_builds_from_path() -> anyhow::Result<()> {
    let file = TempConfig::new("yaml", DOC);
    let engine = Orchestrator::builder()
        .config_path(&file.0)
        .with_env(|name| (name == "FOO").then(|| "bar".to_string()))
        .build()
        .await?;

    let reserve = engine
        .registry()
        .get_model_by_name("gemini-1.5-flash")
        .ok_or_else(|| anyhow::anyhow!("reserve model not registered"))?;
    assert_eq!(reserve.role, ModelRole::Reserve);
    assert_eq!(engine.registry().len(), 2);
    Ok(())
}

#[tokio::test]
async fn builder_without_source_fails() {
    let err = Orchestrator::builder().build().await.unwrap_err();
    assert!(err.is_validation());
}
