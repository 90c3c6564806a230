use super::*;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

fn lookup_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
    move |name| {
        pairs
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| (*value).to_string())
    }
}

#[test]
fn defaults_apply_when_only_api_key_is_set() {
    let config = Config::from_lookup(lookup_from(&[("OPENROUTER_API_KEY", "sk-test")]))
        .expect("config should load with defaults");

    assert_eq!(config.generation.api_key, "sk-test");
    assert_eq!(
        config.generation.base_url.as_str(),
        "https://openrouter.ai/api/v1"
    );
    assert_eq!(config.generation.model, "openai/gpt-oss-20b:free");
    assert_eq!(
        config.embeddings.base_url.as_str(),
        "http://localhost:11434/v1"
    );
    assert_eq!(config.embeddings.model, "BAAI/bge-small-en-v1.5");
    assert!(config.embeddings.normalize);
    assert_eq!(config.embeddings.api_key, None);
    assert_eq!(config.embeddings.batch_size, 32);
    assert_eq!(config.chunking.chunk_size, 1000);
    assert_eq!(config.chunking.overlap, 200);
    assert_eq!(config.retrieval_top_k, 4);
    assert_eq!(config.data_dir, PathBuf::from("./data"));
    assert_eq!(config.provider_timeout, None);
    assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8000");
}

#[test]
fn missing_api_key_is_rejected() {
    let result = Config::from_lookup(lookup_from(&[]));
    assert!(matches!(
        result,
        Err(ConfigError::MissingVar("OPENROUTER_API_KEY"))
    ));
}

#[test]
fn blank_api_key_counts_as_missing() {
    let result = Config::from_lookup(lookup_from(&[("OPENROUTER_API_KEY", "   ")]));
    assert!(matches!(
        result,
        Err(ConfigError::MissingVar("OPENROUTER_API_KEY"))
    ));
}

#[test]
fn overrides_take_effect() {
    let config = Config::from_lookup(lookup_from(&[
        ("OPENROUTER_API_KEY", "sk-test"),
        ("GENERATION_BASE_URL", "http://localhost:9999/v1"),
        ("GENERATION_MODEL", "some/other-model"),
        ("EMBEDDINGS_BASE_URL", "http://embeddings.internal:8080/v1"),
        ("EMBEDDINGS_MODEL", "custom-embedder"),
        ("EMBEDDINGS_API_KEY", "sk-embed"),
        ("EMBEDDINGS_NORMALIZE", "false"),
        ("EMBEDDINGS_BATCH_SIZE", "8"),
        ("CHUNK_SIZE", "500"),
        ("CHUNK_OVERLAP", "50"),
        ("RETRIEVAL_TOP_K", "7"),
        ("DATA_DIR", "/var/lib/cardio-rag"),
        ("PROVIDER_TIMEOUT_SECS", "30"),
        ("BIND_ADDR", "0.0.0.0:9000"),
    ]))
    .expect("config should load with overrides");

    assert_eq!(
        config.generation.base_url.as_str(),
        "http://localhost:9999/v1"
    );
    assert_eq!(config.generation.model, "some/other-model");
    assert_eq!(
        config.embeddings.base_url.as_str(),
        "http://embeddings.internal:8080/v1"
    );
    assert_eq!(config.embeddings.model, "custom-embedder");
    assert_eq!(config.embeddings.api_key.as_deref(), Some("sk-embed"));
    assert!(!config.embeddings.normalize);
    assert_eq!(config.embeddings.batch_size, 8);
    assert_eq!(config.chunking.chunk_size, 500);
    assert_eq!(config.chunking.overlap, 50);
    assert_eq!(config.retrieval_top_k, 7);
    assert_eq!(config.data_dir, PathBuf::from("/var/lib/cardio-rag"));
    assert_eq!(config.provider_timeout, Some(Duration::from_secs(30)));
    assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9000");
}

#[test]
fn zero_timeout_means_no_timeout() {
    let config = Config::from_lookup(lookup_from(&[
        ("OPENROUTER_API_KEY", "sk-test"),
        ("PROVIDER_TIMEOUT_SECS", "0"),
    ]))
    .expect("config should load");

    assert_eq!(config.provider_timeout, None);
}

#[test]
fn invalid_base_url_is_rejected() {
    let result = Config::from_lookup(lookup_from(&[
        ("OPENROUTER_API_KEY", "sk-test"),
        ("GENERATION_BASE_URL", "not a url"),
    ]));
    assert!(matches!(result, Err(ConfigError::InvalidUrl(_))));
}

#[test]
fn non_numeric_top_k_is_rejected() {
    let result = Config::from_lookup(lookup_from(&[
        ("OPENROUTER_API_KEY", "sk-test"),
        ("RETRIEVAL_TOP_K", "banana"),
    ]));
    assert!(matches!(
        result,
        Err(ConfigError::InvalidVar("RETRIEVAL_TOP_K", _))
    ));
}

#[test]
fn zero_top_k_is_rejected() {
    let result = Config::from_lookup(lookup_from(&[
        ("OPENROUTER_API_KEY", "sk-test"),
        ("RETRIEVAL_TOP_K", "0"),
    ]));
    assert!(matches!(result, Err(ConfigError::InvalidTopK(0))));
}

#[test]
fn overlap_must_stay_below_chunk_size() {
    let result = Config::from_lookup(lookup_from(&[
        ("OPENROUTER_API_KEY", "sk-test"),
        ("CHUNK_SIZE", "100"),
        ("CHUNK_OVERLAP", "100"),
    ]));
    assert!(matches!(result, Err(ConfigError::OverlapTooLarge(100, 100))));
}

#[test]
fn zero_chunk_size_is_rejected() {
    let result = Config::from_lookup(lookup_from(&[
        ("OPENROUTER_API_KEY", "sk-test"),
        ("CHUNK_SIZE", "0"),
    ]));
    assert!(matches!(result, Err(ConfigError::InvalidChunkSize(0))));
}

#[test]
fn batch_size_boundary_validation() {
    for (value, ok) in [("1", true), ("1000", true), ("0", false), ("1001", false)] {
        let result = Config::from_lookup(lookup_from(&[("OPENROUTER_API_KEY", "sk-test")]))
            .map(|mut config| {
                config.embeddings.batch_size = value.parse().expect("numeric test value");
                config
            })
            .and_then(|config| config.validate().map(|()| config));

        assert_eq!(result.is_ok(), ok, "batch size {value}");
    }
}

#[test]
fn bool_values_accept_common_spellings() {
    for (value, expected) in [("1", true), ("yes", true), ("FALSE", false), ("no", false)] {
        let config = Config::from_lookup(move |name| match name {
            "OPENROUTER_API_KEY" => Some("sk-test".to_string()),
            "EMBEDDINGS_NORMALIZE" => Some(value.to_string()),
            _ => None,
        })
        .expect("config should load");
        assert_eq!(config.embeddings.normalize, expected, "value {value}");
    }

    let result = Config::from_lookup(lookup_from(&[
        ("OPENROUTER_API_KEY", "sk-test"),
        ("EMBEDDINGS_NORMALIZE", "maybe"),
    ]));
    assert!(matches!(
        result,
        Err(ConfigError::InvalidVar("EMBEDDINGS_NORMALIZE", _))
    ));
}

#[test]
fn invalid_bind_addr_is_rejected() {
    let result = Config::from_lookup(lookup_from(&[
        ("OPENROUTER_API_KEY", "sk-test"),
        ("BIND_ADDR", "localhost"),
    ]));
    assert!(matches!(result, Err(ConfigError::InvalidBindAddr(_))));
}

#[test]
fn path_helpers_derive_from_data_dir() {
    let config = Config::from_lookup(lookup_from(&[
        ("OPENROUTER_API_KEY", "sk-test"),
        ("DATA_DIR", "/srv/rag"),
    ]))
    .expect("config should load");

    assert_eq!(config.index_path(), PathBuf::from("/srv/rag/index.json"));
    assert_eq!(config.uploads_dir(), PathBuf::from("/srv/rag/uploads"));
}

#[test]
fn embedding_profile_reflects_settings() {
    let config = Config::from_lookup(lookup_from(&[
        ("OPENROUTER_API_KEY", "sk-test"),
        ("EMBEDDINGS_MODEL", "custom-embedder"),
        ("EMBEDDINGS_NORMALIZE", "false"),
    ]))
    .expect("config should load");

    let profile = config.embedding_profile();
    assert_eq!(profile.model, "custom-embedder");
    assert!(!profile.normalize);
}

#[test]
#[serial]
fn from_env_reads_process_environment() {
    // SAFETY: `#[serial]` keeps this test from racing other tests over the
    // process environment.
    unsafe {
        env::set_var("OPENROUTER_API_KEY", "sk-env-test");
        env::set_var("RETRIEVAL_TOP_K", "2");
    }

    let config = Config::from_env().expect("config should load from environment");
    assert_eq!(config.generation.api_key, "sk-env-test");
    assert_eq!(config.retrieval_top_k, 2);

    // SAFETY: same serial guarantee as above.
    unsafe {
        env::remove_var("OPENROUTER_API_KEY");
        env::remove_var("RETRIEVAL_TOP_K");
    }
}

#[test]
#[serial]
fn from_env_fails_fast_without_api_key() {
    // SAFETY: `#[serial]` keeps this test from racing other tests over the
    // process environment.
    unsafe {
        env::remove_var("OPENROUTER_API_KEY");
    }

    let result = Config::from_env();
    assert!(matches!(
        result,
        Err(ConfigError::MissingVar("OPENROUTER_API_KEY"))
    ));
}

#[test]
fn error_display_messages() {
    let errors = vec![
        ConfigError::MissingVar("OPENROUTER_API_KEY"),
        ConfigError::InvalidVar("RETRIEVAL_TOP_K", "banana".to_string()),
        ConfigError::InvalidUrl("not a url".to_string()),
        ConfigError::InvalidModel(String::new()),
        ConfigError::InvalidBatchSize(0),
        ConfigError::OverlapTooLarge(100, 100),
        ConfigError::InvalidBindAddr("localhost".to_string()),
    ];

    for error in errors {
        let message = format!("{error}");
        assert!(!message.is_empty());
        assert!(message.len() > 10); // Ensure meaningful error messages
    }
}
