//! Client for a hosted, Piston-compatible execution API.
//!
//! Used as an alternative to the local service for non-JavaScript languages.
//! The client is pass-through: it forwards source and stdin and renders the
//! API's compile/run sections into one text block.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::language::Language;

const COMPILE_TIMEOUT_MS: u64 = 10_000;
const RUN_TIMEOUT_MS: u64 = 3_000;

#[derive(Error, Debug)]
pub enum HostedError {
    #[error("HTTP error! status: {0}")]
    Status(u16),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One source file in a hosted execution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

/// Body of `POST <base>/execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostedRequest {
    pub language: String,
    pub version: String,
    pub files: Vec<SourceFile>,
    pub stdin: String,
    pub args: Vec<String>,
    pub compile_timeout: u64,
    pub run_timeout: u64,
    pub compile_memory_limit: i64,
    pub run_memory_limit: i64,
}

impl HostedRequest {
    pub fn new(language: Language, code: &str, stdin: &str) -> Self {
        Self {
            language: hosted_language_id(language).to_string(),
            version: "*".to_string(),
            files: vec![SourceFile {
                name: hosted_file_name(language).to_string(),
                content: code.to_string(),
            }],
            stdin: stdin.to_string(),
            args: Vec::new(),
            compile_timeout: COMPILE_TIMEOUT_MS,
            run_timeout: RUN_TIMEOUT_MS,
            compile_memory_limit: -1,
            run_memory_limit: -1,
        }
    }
}

/// Output of one stage as reported by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StageReport {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub code: Option<i32>,
    #[serde(default)]
    pub signal: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HostedResponse {
    #[serde(default)]
    pub compile: Option<StageReport>,
    #[serde(default)]
    pub run: Option<StageReport>,
}

impl HostedResponse {
    /// Compile errors first, then run stdout and stderr, then an exit note
    /// when the process was killed by a signal. A killed process usually has
    /// no exit code, and still gets the note.
    pub fn render(&self) -> String {
        let mut text = String::new();

        if let Some(compile) = &self.compile {
            if !compile.stderr.is_empty() {
                text.push_str("Compilation Error:\n");
                text.push_str(&compile.stderr);
                text.push('\n');
            }
        }

        if let Some(run) = &self.run {
            text.push_str(&run.stdout);
            text.push_str(&run.stderr);
            if let Some(signal) = &run.signal {
                match run.code {
                    Some(0) => {}
                    Some(code) => text.push_str(&format!("\nProcess exited with code {code}")),
                    None => text.push_str(&format!("\nProcess exited with code null (signal {signal})")),
                }
            }
        }

        if text.is_empty() {
            "No output".to_string()
        } else {
            text
        }
    }
}

/// Language identifier understood by the hosted API.
pub const fn hosted_language_id(language: Language) -> &'static str {
    match language {
        Language::JavaScript => "javascript",
        Language::Python => "python",
        Language::Java => "java",
        Language::Cpp => "c++",
    }
}

/// File name the hosted API receives the source under.
pub const fn hosted_file_name(language: Language) -> &'static str {
    match language {
        Language::JavaScript => "index.js",
        Language::Python => "main.py",
        Language::Java => "Main.java",
        Language::Cpp => "main.cpp",
    }
}

/// HTTP client for the hosted API.
#[derive(Debug, Clone)]
pub struct HostedClient {
    base_url: String,
    http: reqwest::Client,
}

impl HostedClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Submit `code` and return the API's raw response.
    #[instrument(skip(self, code, stdin), fields(base_url = %self.base_url))]
    pub async fn execute(&self, language: Language, code: &str, stdin: &str) -> Result<HostedResponse, HostedError> {
        let request = HostedRequest::new(language, code, stdin);
        let response = self
            .http
            .post(format!("{}/execute", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HostedError::Status(status.as_u16()));
        }

        let body: HostedResponse = response.json().await?;
        debug!(
            compiled = body.compile.is_some(),
            exit_code = body.run.as_ref().and_then(|r| r.code),
            "Hosted execution finished"
        );
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn request_shape() {
        let request = HostedRequest::new(Language::Cpp, "int main(){}", "Coder");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "language": "c++",
                "version": "*",
                "files": [{"name": "main.cpp", "content": "int main(){}"}],
                "stdin": "Coder",
                "args": [],
                "compile_timeout": 10000,
                "run_timeout": 3000,
                "compile_memory_limit": -1,
                "run_memory_limit": -1
            })
        );
    }

    #[test]
    fn render_run_only() {
        let response: HostedResponse = serde_json::from_value(json!({
            "run": {"stdout": "Hello, Rupesh!\n", "stderr": "", "code": 0, "signal": null}
        }))
        .unwrap();
        assert_eq!(response.render(), "Hello, Rupesh!\n");
    }

    #[test]
    fn render_compile_error_comes_first() {
        let response: HostedResponse = serde_json::from_value(json!({
            "compile": {"stdout": "", "stderr": "main.cpp:1:13: error: expected ';'", "code": 1, "signal": null},
            "run": {"stdout": "", "stderr": "", "code": null, "signal": null}
        }))
        .unwrap();
        assert_eq!(
            response.render(),
            "Compilation Error:\nmain.cpp:1:13: error: expected ';'\n"
        );
    }

    #[test]
    fn render_appends_exit_note_for_signals() {
        let response: HostedResponse = serde_json::from_value(json!({
            "run": {"stdout": "partial", "stderr": "Segmentation fault", "code": 139, "signal": "SIGSEGV"}
        }))
        .unwrap();
        assert_eq!(
            response.render(),
            "partialSegmentation fault\nProcess exited with code 139"
        );
    }

    #[test]
    fn render_exit_note_without_exit_code() {
        let response: HostedResponse = serde_json::from_value(json!({
            "run": {"stdout": "partial", "code": null, "signal": "SIGKILL"}
        }))
        .unwrap();
        assert_eq!(
            response.render(),
            "partial\nProcess exited with code null (signal SIGKILL)"
        );
    }

    #[test]
    fn render_no_note_for_clean_exit_with_signal_field() {
        let response: HostedResponse = serde_json::from_value(json!({
            "run": {"stdout": "done\n", "stderr": "", "code": 0, "signal": "SIGTERM"}
        }))
        .unwrap();
        assert_eq!(response.render(), "done\n");
    }

    #[test]
    fn render_no_note_without_signal() {
        let response: HostedResponse = serde_json::from_value(json!({
            "run": {"stdout": "", "stderr": "Traceback", "code": 1, "signal": null}
        }))
        .unwrap();
        assert_eq!(response.render(), "Traceback");
    }

    #[test]
    fn render_empty_is_no_output() {
        assert_eq!(HostedResponse::default().render(), "No output");
    }

    #[tokio::test]
    async fn execute_posts_to_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .and(body_partial_json(json!({"language": "python", "stdin": "Rupesh"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "language": "python",
                "version": "3.10.0",
                "run": {"stdout": "Hello, Rupesh!\n", "stderr": "", "code": 0, "signal": null, "output": "Hello, Rupesh!\n"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HostedClient::new(format!("{}/", server.uri()));
        let response = client
            .execute(Language::Python, "print(f\"Hello, {input()}!\")", "Rupesh")
            .await
            .unwrap();
        assert_eq!(response.render(), "Hello, Rupesh!\n");
    }

    #[tokio::test]
    async fn non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = HostedClient::new(server.uri());
        let err = client.execute(Language::Java, "", "").await.unwrap_err();
        assert!(matches!(err, HostedError::Status(429)));
        assert_eq!(err.to_string(), "HTTP error! status: 429");
    }
}
