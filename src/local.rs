//! Local JavaScript evaluation.
//!
//! JavaScript never reaches the execution service. It is evaluated in a
//! disposable `node` worker whose `console.log` is bound to an explicit
//! output channel: each call becomes one framed JSON line on the worker's
//! stdout, and the host collects those frames into an [`OutputSink`]. Nothing
//! in the host process is patched, and the worker is killed on every exit
//! path.

use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, instrument};

use crate::config::LocalConfig;

/// Prefix marking a line as a sink frame rather than raw worker output.
const FRAME_MARKER: char = '\u{1e}';

/// Text rendered when the program logged nothing.
pub const NO_OUTPUT: &str = "Code executed successfully (no output)";

/// Worker bootstrap, run with `node -e`. Reads the program from stdin and
/// evaluates it with `console.log` bound to the frame channel.
const WORKER_PRELUDE: &str = r#"
const emit = (frame) => process.stdout.write('\u001e' + JSON.stringify(frame) + '\n');
const encode = (value) => {
  if (value !== null && typeof value === 'object') {
    try {
      JSON.stringify(value);
      return { json: value };
    } catch (_) {
      return { text: String(value) };
    }
  }
  return { text: String(value) };
};
const fail = (err) => {
  const message = err && err.message !== undefined ? String(err.message) : String(err);
  const stack = err && err.stack ? String(err.stack) : '';
  emit({ error: { message, stack } });
  process.exitCode = 1;
};
console.log = (...args) => emit({ log: args.map(encode) });
process.on('uncaughtException', fail);
process.on('unhandledRejection', fail);
globalThis.require = require;
let source = '';
process.stdin.setEncoding('utf8');
process.stdin.on('data', (chunk) => { source += chunk; });
process.stdin.on('end', () => {
  try {
    require('vm').runInThisContext(source, { filename: 'index.js' });
  } catch (err) {
    fail(err);
  }
});
"#;

#[derive(Error, Debug)]
pub enum LocalEvalError {
    /// The program threw.
    #[error("Error: {message}\n{stack}")]
    Raised { message: String, stack: String },

    #[error("Evaluation timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    #[error("Failed to start JavaScript worker '{program}': {source}")]
    Unavailable {
        program: String,
        source: std::io::Error,
    },

    /// The worker died without reporting a program error.
    #[error("JavaScript worker failed: {0}")]
    Worker(String),

    #[error("Failed to talk to JavaScript worker: {0}")]
    Io(#[from] std::io::Error),
}

/// One argument passed to `console.log`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogValue {
    /// Objects and arrays, pretty-printed on render.
    Json(serde_json::Value),
    /// Primitives, already stringified by the worker.
    Text(String),
}

impl LogValue {
    fn render(&self) -> String {
        match self {
            Self::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            Self::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Frame {
    Log(Vec<LogValue>),
    Error { message: String, stack: String },
}

/// Collected output of one evaluation.
#[derive(Debug, Default)]
pub struct OutputSink {
    lines: Vec<String>,
    raised: Option<(String, String)>,
}

impl OutputSink {
    /// Record one `console.log` call; arguments are joined by a space.
    pub fn log(&mut self, values: &[LogValue]) {
        let line = values
            .iter()
            .map(LogValue::render)
            .collect::<Vec<_>>()
            .join(" ");
        self.lines.push(line);
    }

    /// Record a line the program wrote without going through `console.log`.
    pub fn raw(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    /// Feed one stdout line from the worker.
    fn accept(&mut self, line: &str) {
        let Some(payload) = line.strip_prefix(FRAME_MARKER) else {
            self.raw(line);
            return;
        };
        match serde_json::from_str::<Frame>(payload) {
            Ok(Frame::Log(values)) => self.log(&values),
            // First error wins; later ones are usually fallout.
            Ok(Frame::Error { message, stack }) => {
                self.raised.get_or_insert((message, stack));
            }
            Err(e) => {
                debug!(error = %e, "Unreadable sink frame");
                self.raw(payload);
            }
        }
    }

    /// Logged lines joined by newlines, or [`NO_OUTPUT`].
    pub fn render(&self) -> String {
        if self.lines.is_empty() {
            NO_OUTPUT.to_string()
        } else {
            self.lines.join("\n")
        }
    }

    fn finish(self) -> Result<String, LocalEvalError> {
        match self.raised {
            Some((message, stack)) => Err(LocalEvalError::Raised { message, stack }),
            None => Ok(self.render()),
        }
    }
}

/// A running worker plus the sink it writes to.
///
/// Dropping the session kills the worker, so early returns and timeouts
/// cannot leak a process.
struct EvalSession {
    child: Child,
    sink: OutputSink,
}

impl EvalSession {
    fn open(program: &str) -> Result<Self, LocalEvalError> {
        let child = Command::new(program)
            .arg("-e")
            .arg(WORKER_PRELUDE)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LocalEvalError::Unavailable {
                program: program.to_string(),
                source,
            })?;
        Ok(Self {
            child,
            sink: OutputSink::default(),
        })
    }

    async fn evaluate(mut self, code: &str) -> Result<String, LocalEvalError> {
        let mut stdin = self.child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        stdin.write_all(code.as_bytes()).await?;
        drop(stdin); // Close stdin to signal EOF

        let stdout = self.child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let mut stderr = self.child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let mut lines = BufReader::new(stdout).lines();
        let mut stderr_buf = String::new();
        let sink = &mut self.sink;
        let (read_stdout, read_stderr) = tokio::join!(
            async {
                while let Some(line) = lines.next_line().await? {
                    sink.accept(&line);
                }
                Ok::<_, std::io::Error>(())
            },
            stderr.read_to_string(&mut stderr_buf),
        );
        read_stdout?;
        read_stderr?;

        let status = self.child.wait().await?;
        if !stderr_buf.is_empty() {
            debug!(stderr = %stderr_buf, "JavaScript worker stderr");
        }

        if self.sink.raised.is_none() && !status.success() {
            let detail = stderr_buf.trim_end();
            return Err(LocalEvalError::Worker(if detail.is_empty() {
                status.to_string()
            } else {
                detail.to_string()
            }));
        }

        self.sink.finish()
    }
}

/// Evaluates JavaScript in disposable worker processes.
#[derive(Debug, Clone)]
pub struct LocalEvaluator {
    program: String,
    timeout: Duration,
}

impl LocalEvaluator {
    pub fn new(config: &LocalConfig) -> Self {
        Self {
            program: config.node_program.clone(),
            timeout: config.timeout(),
        }
    }

    /// Evaluate `code` and return everything it logged.
    #[instrument(skip(self, code), fields(code_len = code.len()))]
    pub async fn evaluate(&self, code: &str) -> Result<String, LocalEvalError> {
        let session = EvalSession::open(&self.program)?;
        tokio::time::timeout(self.timeout, session.evaluate(code))
            .await
            .map_err(|_| LocalEvalError::TimedOut(self.timeout))?
    }
}

fn missing_pipe(name: &str) -> std::io::Error {
    std::io::Error::other(format!("Failed to open {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node_available() -> bool {
        std::process::Command::new("node")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn evaluator(timeout_ms: u64) -> LocalEvaluator {
        LocalEvaluator::new(&LocalConfig {
            node_program: "node".into(),
            timeout_ms,
        })
    }

    #[test]
    fn sink_renders_primitives_and_objects() {
        let mut sink = OutputSink::default();
        sink.log(&[LogValue::Text("answer".into()), LogValue::Text("42".into())]);
        sink.log(&[LogValue::Json(json!({"b": 1, "a": [true, null]}))]);
        assert_eq!(
            sink.render(),
            "answer 42\n{\n  \"b\": 1,\n  \"a\": [\n    true,\n    null\n  ]\n}"
        );
    }

    #[test]
    fn sink_empty_render() {
        assert_eq!(OutputSink::default().render(), NO_OUTPUT);
    }

    #[test]
    fn sink_separates_frames_from_raw_lines() {
        let mut sink = OutputSink::default();
        sink.accept("\u{1e}{\"log\":[{\"text\":\"framed\"}]}");
        sink.accept("written directly");
        sink.accept("\u{1e}not json");
        assert_eq!(sink.render(), "framed\nwritten directly\nnot json");
    }

    #[test]
    fn sink_error_frame_replaces_output() {
        let mut sink = OutputSink::default();
        sink.accept("\u{1e}{\"log\":[{\"text\":\"before\"}]}");
        sink.accept("\u{1e}{\"error\":{\"message\":\"boom\",\"stack\":\"Error: boom\\n    at index.js:1:7\"}}");
        let err = sink.finish().unwrap_err();
        assert_eq!(err.to_string(), "Error: boom\nError: boom\n    at index.js:1:7");
    }

    #[tokio::test]
    async fn missing_worker_is_unavailable() {
        let evaluator = LocalEvaluator::new(&LocalConfig {
            node_program: "definitely-not-node-xyz".into(),
            timeout_ms: 1000,
        });
        let err = evaluator.evaluate("console.log(1)").await.unwrap_err();
        assert!(matches!(err, LocalEvalError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn node_logs_values() {
        if !node_available() {
            return;
        }
        let out = evaluator(5000)
            .evaluate("console.log('Hello World!'); console.log(1, {a: [1, 2]}); console.log(null, undefined)")
            .await
            .unwrap();
        assert_eq!(
            out,
            "Hello World!\n1 {\n  \"a\": [\n    1,\n    2\n  ]\n}\nnull undefined"
        );
    }

    #[tokio::test]
    async fn node_no_output() {
        if !node_available() {
            return;
        }
        let out = evaluator(5000).evaluate("const x = 1 + 1;").await.unwrap();
        assert_eq!(out, NO_OUTPUT);
    }

    #[tokio::test]
    async fn node_thrown_error_has_message_and_stack() {
        if !node_available() {
            return;
        }
        let err = evaluator(5000)
            .evaluate("console.log('lost'); null.prop;")
            .await
            .unwrap_err();
        let LocalEvalError::Raised { message, stack } = &err else {
            panic!("expected raised error, got {err:?}");
        };
        assert!(message.contains("Cannot read properties of null"));
        assert!(stack.contains("TypeError"));
        assert!(err.to_string().starts_with("Error: Cannot read"));
    }

    #[tokio::test]
    async fn node_infinite_loop_times_out() {
        if !node_available() {
            return;
        }
        let err = evaluator(500).evaluate("while (true) {}").await.unwrap_err();
        assert!(matches!(err, LocalEvalError::TimedOut(_)));
    }
}
