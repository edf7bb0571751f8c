//! Editor-side run routing.
//!
//! JavaScript is evaluated locally; every other language goes either to the
//! in-process execution service or to the hosted API. All three paths
//! answer with the same [`ExecuteResponse`] shape.

use tracing::{debug, info};

use crate::dispatcher::Dispatcher;
use crate::hosted::HostedClient;
use crate::language::Language;
use crate::local::LocalEvaluator;
use crate::server::ExecuteResponse;

/// Where non-JavaScript code is sent.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Build and run on this machine.
    Service(Dispatcher),
    /// Forward to a Piston-compatible API.
    Hosted(HostedClient),
}

#[derive(Debug, Clone)]
pub struct RunRouter {
    local: LocalEvaluator,
    backend: Backend,
}

impl RunRouter {
    pub const fn new(local: LocalEvaluator, backend: Backend) -> Self {
        Self { local, backend }
    }

    /// Run `code` and return what the editor's output pane would show.
    ///
    /// `stdin` is only forwarded to the hosted API.
    pub async fn run(&self, language: Language, code: &str, stdin: &str) -> ExecuteResponse {
        match (language, &self.backend) {
            (Language::JavaScript, _) => {
                info!("Evaluating JavaScript locally");
                match self.local.evaluate(code).await {
                    Ok(output) => ExecuteResponse::Output { output },
                    Err(e) => error_response(e.to_string()),
                }
            }
            (_, Backend::Service(dispatcher)) => {
                if !stdin.is_empty() {
                    debug!("Ignoring stdin for local service execution");
                }
                dispatcher.execute(language.as_str(), code).await.into()
            }
            (_, Backend::Hosted(client)) => {
                info!(%language, "Submitting to hosted API");
                match client.execute(language, code, stdin).await {
                    Ok(response) => ExecuteResponse::Output {
                        output: response.render(),
                    },
                    Err(e) => error_response(e.to_string()),
                }
            }
        }
    }
}

fn error_response(error: String) -> ExecuteResponse {
    ExecuteResponse::Error { error, stage: None }
}
