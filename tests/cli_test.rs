//! Command-line Tests
//!
//! Runs the built binary against temporary configs and a mock backend.

#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use predicates::prelude::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};
    use wiremock::matchers::{header, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_file(endpoint: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "storage:\n  endpoint: \"{endpoint}\"\n  bucket: \"media\"\n  timeout_seconds: 5\nupload:\n  max_retries: 1\n"
        )
        .unwrap();
        file
    }

    fn binary() -> Command {
        let mut cmd = Command::cargo_bin("media-uploadr").unwrap();
        cmd.env_remove("RUST_LOG");
        cmd
    }

    #[test]
    fn test_help_lists_subcommands() {
        binary()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("upload"))
            .stdout(predicate::str::contains("delete"))
            .stdout(predicate::str::contains("probe"));
    }

    #[test]
    fn test_missing_config_fails() {
        binary()
            .args(["--config", "/definitely/not/here.yaml", "probe"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to load configuration"));
    }

    #[test]
    fn test_probe_prints_json_report_when_offline() {
        let config = config_file("http://127.0.0.1:9");

        binary()
            .arg("--config")
            .arg(config.path())
            .arg("probe")
            .assert()
            .success()
            .stdout(predicate::str::contains("\"connected\": false"))
            .stdout(predicate::str::contains("\"can_upload\": false"));
    }

    #[test]
    fn test_upload_rejects_unsupported_file_type() {
        let config = config_file("http://127.0.0.1:9");
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, b"not an image").unwrap();

        binary()
            .arg("--config")
            .arg(config.path())
            .arg("upload")
            .arg("--file")
            .arg(&file)
            .args(["--path", "docs/1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not supported"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upload_prints_public_url() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/media/avatars/42_\d+_[0-9a-f]{12}\.png$"))
            .and(header("content-type", "application/octet-stream"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = config_file(&server.uri());
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("avatar.png");
        std::fs::write(&file, b"\x89PNG\r\n\x1a\nsmall").unwrap();

        let prefix = format!("{}/media/avatars/42_", server.uri());
        let config_path = config.path().to_path_buf();
        let output = tokio::task::spawn_blocking(move || {
            binary()
                .arg("--config")
                .arg(&config_path)
                .arg("upload")
                .arg("--file")
                .arg(&file)
                .args(["--path", "avatars/42"])
                .output()
                .unwrap()
        })
        .await
        .unwrap();

        assert!(output.status.success(), "{output:?}");
        let stdout = String::from_utf8(output.stdout).unwrap();
        assert!(stdout.trim().starts_with(&prefix), "{stdout}");
        assert!(stdout.trim().ends_with(".png"));
    }
}
