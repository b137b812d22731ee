//! Configuration Loading Tests
//!
//! File loading, environment expansion and validation failures.

#[cfg(test)]
mod tests {
    use media_uploadr::config::{Config, ConfigError, ConfigLoader};
    use serial_test::serial;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    fn validation_message(result: Result<Config, ConfigError>) -> String {
        match result {
            Err(ConfigError::ValidationError(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_full_config_from_file() {
        let file = write_config(
            r#"
storage:
  endpoint: "https://storage.example.com"
  bucket: "media"
  public_base_url: "https://cdn.example.com"
  timeout_seconds: 12
relay:
  url: "https://app.example.com/api/uploads"
  timeout_seconds: 45
upload:
  max_bytes: 1048576
  allowed_mime_types: ["image/png", "image/jpeg"]
  compression_quality: 70
  max_retries: 5
  deadline_seconds: 90
compression:
  enabled: false
logging:
  level: "debug"
  format: "pretty"
"#,
        );

        let config = ConfigLoader::load(file.path()).unwrap();

        assert_eq!(config.storage.timeout(), Duration::from_secs(12));
        let relay = config.relay.as_ref().unwrap();
        assert_eq!(relay.url, "https://app.example.com/api/uploads");
        assert_eq!(relay.timeout(), Duration::from_secs(45));
        assert_eq!(config.upload.max_bytes, 1_048_576);
        assert_eq!(config.upload.allowed_mime_types.len(), 2);
        assert_eq!(config.upload.compression_quality, 70);
        assert_eq!(config.upload.max_retries, 5);
        assert_eq!(config.upload.deadline(), Some(Duration::from_secs(90)));
        assert!(!config.compression.enabled);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = Config::load("/definitely/not/here/config.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    #[serial]
    fn test_env_placeholders_are_expanded() {
        std::env::set_var("MEDIA_UPLOADR_TEST_ENDPOINT", "http://10.0.0.5:9000");
        std::env::set_var("MEDIA_UPLOADR_TEST_TOKEN", "tok-123");

        let file = write_config(
            r#"
storage:
  endpoint: "${MEDIA_UPLOADR_TEST_ENDPOINT}"
  bucket: "${MEDIA_UPLOADR_TEST_BUCKET:-uploads}"
  access_token: "${MEDIA_UPLOADR_TEST_TOKEN}"
"#,
        );
        let config = ConfigLoader::load(file.path()).unwrap();

        std::env::remove_var("MEDIA_UPLOADR_TEST_ENDPOINT");
        std::env::remove_var("MEDIA_UPLOADR_TEST_TOKEN");

        assert_eq!(config.storage.endpoint, "http://10.0.0.5:9000");
        assert_eq!(config.storage.bucket, "uploads");
        assert_eq!(config.storage.access_token.as_deref(), Some("tok-123"));
    }

    #[test]
    #[serial]
    fn test_unset_placeholder_without_default_fails_validation() {
        std::env::remove_var("MEDIA_UPLOADR_TEST_MISSING");

        let result = ConfigLoader::from_yaml(
            r#"
storage:
  endpoint: "${MEDIA_UPLOADR_TEST_MISSING}"
  bucket: "media"
"#,
        );

        assert!(validation_message(result).contains("storage endpoint"));
    }

    #[test]
    fn test_rejects_out_of_range_quality() {
        let result = ConfigLoader::from_yaml(
            r#"
storage:
  endpoint: "http://localhost:9000"
  bucket: "media"
upload:
  compression_quality: 0
"#,
        );
        assert!(validation_message(result).contains("compression_quality"));
    }

    #[test]
    fn test_rejects_zero_retries() {
        let result = ConfigLoader::from_yaml(
            r#"
storage:
  endpoint: "http://localhost:9000"
  bucket: "media"
upload:
  max_retries: 0
"#,
        );
        assert!(validation_message(result).contains("max_retries"));
    }

    #[test]
    fn test_rejects_small_part_size() {
        let result = ConfigLoader::from_yaml(
            r#"
storage:
  endpoint: "http://localhost:9000"
  bucket: "media"
  part_size: 1024
"#,
        );
        assert!(validation_message(result).contains("part_size"));
    }

    #[test]
    fn test_rejects_bad_relay_url() {
        let result = ConfigLoader::from_yaml(
            r#"
storage:
  endpoint: "http://localhost:9000"
  bucket: "media"
relay:
  url: "ftp://relay.example.com"
"#,
        );
        assert!(validation_message(result).contains("relay url"));
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let result = ConfigLoader::from_yaml(
            r#"
storage:
  endpoint: "http://localhost:9000"
  bucket: "media"
logging:
  format: "xml"
"#,
        );
        assert!(validation_message(result).contains("log format"));
    }

    #[test]
    fn test_example_config_parses() {
        let content = std::fs::read_to_string(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/config.example.yaml"
        ))
        .unwrap();
        let config = ConfigLoader::from_yaml(&content).unwrap();
        assert!(config.relay.is_none());
    }
}
