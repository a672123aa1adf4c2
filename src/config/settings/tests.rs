use super::*;
use std::collections::HashMap;
use tempfile::TempDir;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.service.base_url, "https://api.openai.com/v1/");
    assert_eq!(config.service.api_key, None);
    assert_eq!(config.service.timeout_seconds, 30);
    assert_eq!(config.retrieval.embedding_model, "text-embedding-3-small");
    assert_eq!(config.retrieval.embedding_dimension, 1536);
    assert_eq!(config.retrieval.metric, DistanceMetric::Euclidean);
    assert_eq!(config.retrieval.default_k, 3);
    assert_eq!(config.generation.chat_model, "gpt-4o");
    assert_eq!(config.generation.temperature, 0.0);
    assert_eq!(config.generation.assistant_name, "Lisa");
    assert!(config.validate().is_ok());
}

#[test]
fn config_validation() {
    let config = Config::default();

    let mut invalid_config = config.clone();
    invalid_config.service.base_url = "not a url".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidUrl(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.service.base_url = "ftp://example.com/".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.service.timeout_seconds = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.service.batch_size = 2049;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.embedding_model = "  ".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidModel(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.retrieval.embedding_dimension = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.default_k = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidDefaultK(0))
    ));

    let mut invalid_config = config.clone();
    invalid_config.retrieval.query_column = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.generation.temperature = 2.5;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.generation.query_prompt = "No placeholders here".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::MissingPlaceholder("{query}"))
    ));
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    assert!(toml_str.contains("metric = \"L2\""));

    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config.service, parsed_config.service);
    assert_eq!(config.retrieval, parsed_config.retrieval);
    assert_eq!(config.generation, parsed_config.generation);
}

#[test]
fn partial_toml_uses_defaults() {
    let config: Config = toml::from_str(
        r#"
        [retrieval]
        metric = "COSINE"
        default_k = 5
        "#,
    )
    .expect("should parse partial toml");

    assert_eq!(config.retrieval.metric, DistanceMetric::Cosine);
    assert_eq!(config.retrieval.default_k, 5);
    assert_eq!(config.retrieval.embedding_dimension, 1536);
    assert_eq!(config.service, ServiceConfig::default());
}

#[test]
fn invalid_metric_in_toml_fails() {
    let result: std::result::Result<Config, toml::de::Error> = toml::from_str(
        r#"
        [retrieval]
        metric = "MANHATTAN"
        "#,
    );
    assert!(result.is_err());
}

#[test]
fn load_missing_config_uses_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load_with(temp_dir.path(), no_env).expect("should load defaults");

    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.retrieval, RetrievalConfig::default());
    assert_eq!(
        config.index_path(),
        temp_dir.path().join("vector_store").join("support.index")
    );
}

#[test]
fn save_then_load_round_trips() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_dir = temp_dir.path().join(".support-rag");

    let mut config = Config {
        base_dir: config_dir.clone(),
        ..Config::default()
    };
    config
        .retrieval
        .set_metric("cosine")
        .expect("should set metric");
    config
        .generation
        .set_chat_model("gpt-4o-mini".to_string())
        .expect("should set model");
    config.save().expect("should save config");

    assert!(config_dir.join("config.toml").exists());
    let loaded = Config::load_with(&config_dir, no_env).expect("should load config");
    assert_eq!(loaded, config);
}

#[test]
fn load_rejects_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[retrieval]\ndefault_k = 0\n",
    )
    .expect("should write config");

    let result = Config::load_with(temp_dir.path(), no_env);
    assert!(result.is_err());
}

#[test]
fn env_overrides_take_precedence() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load_with(
        temp_dir.path(),
        env(&[
            ("OPENAI_API_KEY", "sk-env"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("EMBEDDING_MODEL", "text-embedding-3-large"),
            ("EMBEDDING_DIMENSION", "3072"),
            ("DISTANCE_METRIC", "Cosine"),
            ("INDEX_FILE_PATH", "/var/lib/support/faiss.index"),
            ("DEFAULT_K", "5"),
            ("TEMPERATURE", "0.7"),
        ]),
    )
    .expect("should load with overrides");

    assert_eq!(config.require_api_key().expect("key is set"), "sk-env");
    assert_eq!(config.generation.chat_model, "gpt-4o-mini");
    assert_eq!(config.retrieval.embedding_model, "text-embedding-3-large");
    assert_eq!(config.retrieval.embedding_dimension, 3072);
    assert_eq!(config.retrieval.metric, DistanceMetric::Cosine);
    assert_eq!(
        config.index_path(),
        PathBuf::from("/var/lib/support/faiss.index")
    );
    assert_eq!(config.retrieval.default_k, 5);
    assert!((config.generation.temperature - 0.7).abs() < f32::EPSILON);
}

#[test]
fn chat_model_wins_over_alias() {
    let mut config = Config::default();
    config
        .apply_overrides(env(&[("CHAT_MODEL", "primary"), ("OPENAI_MODEL", "alias")]))
        .expect("should apply overrides");
    assert_eq!(config.generation.chat_model, "primary");
}

#[test]
fn invalid_metric_override_fails_fast() {
    let mut config = Config::default();
    let result = config.apply_overrides(env(&[("DISTANCE_METRIC", "HAMMING")]));
    assert!(matches!(result, Err(ConfigError::InvalidMetric(value)) if value == "HAMMING"));
    assert_eq!(config.retrieval.metric, DistanceMetric::Euclidean);
}

#[test]
fn non_numeric_override_fails() {
    let mut config = Config::default();
    let result = config.apply_overrides(env(&[("DEFAULT_K", "three")]));
    assert!(matches!(
        result,
        Err(ConfigError::InvalidEnvValue {
            var: "DEFAULT_K",
            ..
        })
    ));
}

#[test]
fn empty_override_is_ignored() {
    let mut config = Config::default();
    config
        .apply_overrides(env(&[("EMBEDDING_MODEL", "  ")]))
        .expect("blank values are ignored");
    assert_eq!(config.retrieval.embedding_model, "text-embedding-3-small");
}

#[test]
fn require_api_key_rejects_missing_or_blank() {
    let mut config = Config::default();
    assert!(matches!(
        config.require_api_key(),
        Err(ConfigError::MissingApiKey)
    ));

    config.service.api_key = Some("   ".to_string());
    assert!(config.require_api_key().is_err());

    let error: SupportError = ConfigError::MissingApiKey.into();
    assert!(matches!(error, SupportError::Config(_)));
}

#[test]
fn relative_paths_resolve_against_base_dir() {
    let config = Config {
        base_dir: PathBuf::from("/home/agent/.support-rag"),
        ..Config::default()
    };
    assert_eq!(
        config.corpus_path(),
        PathBuf::from("/home/agent/.support-rag/data/corpus.csv")
    );
    assert_eq!(
        config.resolve_path(Path::new("/abs/corpus.csv")),
        PathBuf::from("/abs/corpus.csv")
    );
}

#[test]
fn greeting_uses_assistant_name() {
    let mut config = Config::default();
    assert_eq!(
        config.greeting(),
        "Hi, I'm Lisa, your AI-assisted assistant! How can I help you today?"
    );
    config.generation.assistant_name = "Max".to_string();
    assert!(config.greeting().starts_with("Hi, I'm Max"));
}

#[test]
fn setter_validation() {
    let mut service = ServiceConfig::default();
    assert!(service.set_base_url("http://localhost:8080/v1/".to_string()).is_ok());
    assert!(service.set_timeout_seconds(120).is_ok());
    assert!(service.set_batch_size(256).is_ok());
    assert!(service.set_base_url("nope".to_string()).is_err());
    assert!(service.set_timeout_seconds(301).is_err());
    assert!(service.set_batch_size(0).is_err());
    assert_eq!(service.base_url, "http://localhost:8080/v1/");

    let mut retrieval = RetrievalConfig::default();
    assert!(retrieval.set_embedding_dimension(768).is_ok());
    assert!(retrieval.set_default_k(10).is_ok());
    assert!(retrieval.set_metric("l2").is_ok());
    assert!(retrieval.set_embedding_dimension(0).is_err());
    assert!(retrieval.set_default_k(0).is_err());
    assert!(retrieval.set_metric("dot").is_err());
    assert!(retrieval.set_embedding_model(String::new()).is_err());

    let mut generation = GenerationConfig::default();
    assert!(generation.set_temperature(1.0).is_ok());
    assert!(generation.set_temperature(-0.1).is_err());
    assert!(generation.set_chat_model(" ".to_string()).is_err());
}
