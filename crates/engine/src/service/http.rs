//! [`ExecutionService`] backed by the orchestrator REST API.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use corral_api::{ApiError, ExecutionDocument, OrchestratorClient};
use corral_types::{ConnectionParams, ExecutionStatus, ParameterSet};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use super::{ExecutionService, ResolvedWorkflow, ServiceConnector, WorkflowLookup};
use crate::error::ProvisionError;

/// Connector that builds an [`HttpExecutionService`] per connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

impl ServiceConnector for HttpConnector {
    fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn ExecutionService>, ProvisionError> {
        let url = params
            .url
            .as_deref()
            .ok_or_else(|| ProvisionError::remote("connect", "no orchestrator URL configured for the component or the run"))?;
        debug!(url, verify_ssl = params.verify_ssl, "connecting to orchestrator");
        let client = OrchestratorClient::new(url, &params.credentials, params.verify_ssl)
            .map_err(|error| ProvisionError::remote("connect", error.to_string()))?;
        debug!(base_url = %client.base_url(), "orchestrator session ready");
        Ok(Arc::new(HttpExecutionService::new(client)))
    }
}

/// Session with one orchestrator endpoint.
///
/// The execution document of the last terminal status query is kept so the
/// following output fetch for the same execution needs no second request.
#[derive(Debug)]
pub struct HttpExecutionService {
    client: OrchestratorClient,
    finished: Mutex<Option<FinishedDocument>>,
}

#[derive(Debug)]
struct FinishedDocument {
    workflow_id: String,
    execution_id: String,
    document: ExecutionDocument,
}

impl HttpExecutionService {
    pub fn new(client: OrchestratorClient) -> Self {
        Self {
            client,
            finished: Mutex::new(None),
        }
    }

    fn take_finished(&self, workflow_id: &str, execution_id: &str) -> Option<ExecutionDocument> {
        let mut finished = self.finished.lock().ok()?;
        match finished.as_ref() {
            Some(cached) if cached.workflow_id == workflow_id && cached.execution_id == execution_id => {
                finished.take().map(|cached| cached.document)
            }
            _ => None,
        }
    }
}

#[async_trait]
impl ExecutionService for HttpExecutionService {
    async fn resolve_workflow(&self, lookup: &WorkflowLookup) -> Result<ResolvedWorkflow, ProvisionError> {
        match lookup {
            WorkflowLookup::Id { id, .. } => {
                let summary = self
                    .client
                    .workflow_by_id(id)
                    .await
                    .map_err(|error| map_lookup_error(lookup, error))?;
                Ok(ResolvedWorkflow {
                    id: summary.id,
                    name: summary.name,
                })
            }
            WorkflowLookup::Name(name) => {
                let mut matches = self
                    .client
                    .workflows_by_name(name)
                    .await
                    .map_err(|error| map_lookup_error(lookup, error))?;
                if matches.len() > 1 {
                    warn!(workflow = %name, matches = matches.len(), "several workflows share this name; using the first");
                }
                if matches.is_empty() {
                    return Err(ProvisionError::not_found(lookup.label()));
                }
                let summary = matches.swap_remove(0);
                Ok(ResolvedWorkflow {
                    id: summary.id,
                    name: summary.name,
                })
            }
        }
    }

    async fn submit_execution(&self, workflow_id: &str, parameters: &ParameterSet) -> Result<String, ProvisionError> {
        self.client
            .start_execution(workflow_id, parameters)
            .await
            .map_err(|error| ProvisionError::remote("submit execution", error.to_string()))
    }

    async fn query_status(&self, workflow_id: &str, execution_id: &str) -> Result<ExecutionStatus, ProvisionError> {
        let document = self
            .client
            .execution(workflow_id, execution_id)
            .await
            .map_err(|error| ProvisionError::remote("query execution status", error.to_string()))?;
        let status = document.status();
        if status.state.is_terminal()
            && let Ok(mut finished) = self.finished.lock()
        {
            *finished = Some(FinishedDocument {
                workflow_id: workflow_id.to_string(),
                execution_id: execution_id.to_string(),
                document,
            });
        }
        Ok(status)
    }

    async fn fetch_output_parameters(
        &self,
        workflow_id: &str,
        execution_id: &str,
    ) -> Result<IndexMap<String, Value>, ProvisionError> {
        if let Some(document) = self.take_finished(workflow_id, execution_id) {
            return Ok(document.outputs());
        }
        self.client
            .execution(workflow_id, execution_id)
            .await
            .map(|document| document.outputs())
            .map_err(|error| ProvisionError::remote("fetch output parameters", error.to_string()))
    }
}

fn map_lookup_error(lookup: &WorkflowLookup, error: ApiError) -> ProvisionError {
    if error.is_not_found() {
        ProvisionError::not_found(lookup.label())
    } else {
        ProvisionError::remote("resolve workflow", error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use corral_types::{Credentials, ExecutionState};
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    use super::*;

    fn params(url: Option<&str>) -> ConnectionParams {
        ConnectionParams {
            url: url.map(str::to_string),
            credentials: Credentials::new(Some("admin".into()), Some("secret".into())),
            verify_ssl: true,
        }
    }

    #[test]
    fn connect_requires_a_url() {
        let error = HttpConnector.connect(&params(None)).err().expect("missing url must fail");
        assert!(matches!(error, ProvisionError::Remote { .. }));
    }

    #[test]
    fn connect_rejects_plain_http_for_remote_hosts() {
        let error = HttpConnector
            .connect(&params(Some("http://vco.example.com/vco/api/")))
            .err()
            .expect("http must be rejected");
        assert!(error.to_string().contains("https"));
    }

    #[test]
    fn connect_accepts_https_endpoints() {
        assert!(HttpConnector.connect(&params(Some("https://vco.example.com:8281/vco/api/"))).is_ok());
    }

    #[test]
    fn lookup_not_found_maps_to_not_found() {
        let lookup = WorkflowLookup::Name("Provision Linux".into());
        let error = map_lookup_error(&lookup, ApiError::not_found("workflow"));
        assert!(matches!(error, ProvisionError::NotFound { .. }));
    }

    fn session(server: &MockServer) -> Arc<dyn ExecutionService> {
        HttpConnector
            .connect(&params(Some(&format!("{}/vco/api/", server.uri()))))
            .expect("local mock server is a valid endpoint")
    }

    fn execution_document(state: &str) -> serde_json::Value {
        json!({
            "id": "exec-1",
            "state": state,
            "start-date": "2024-05-01T10:00:00.000+00:00",
            "end-date": "2024-05-01T10:00:45.000+00:00",
            "output-parameters": [
                { "name": "hostname", "type": "string", "scope": "local", "value": { "string": { "value": "web01" } } }
            ]
        })
    }

    #[tokio::test]
    async fn terminal_status_and_outputs_share_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vco/api/workflows/wf-1/executions/exec-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(execution_document("completed")))
            .expect(1)
            .mount(&server)
            .await;
        let service = session(&server);

        let status = service.query_status("wf-1", "exec-1").await.unwrap();
        assert_eq!(status.state, ExecutionState::Completed);
        assert_eq!(status.run_time(), Some(chrono::Duration::seconds(45)));

        let outputs = service.fetch_output_parameters("wf-1", "exec-1").await.unwrap();
        assert_eq!(outputs.get("hostname"), Some(&json!("web01")));
    }

    #[tokio::test]
    async fn outputs_of_another_execution_are_fetched_fresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vco/api/workflows/wf-1/executions/exec-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(execution_document("running")))
            .expect(2)
            .mount(&server)
            .await;
        let service = session(&server);

        let status = service.query_status("wf-1", "exec-1").await.unwrap();
        assert!(status.state.is_alive());
        service.fetch_output_parameters("wf-1", "exec-1").await.unwrap();
    }

    #[tokio::test]
    async fn name_lookup_without_matches_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vco/api/workflows"))
            .and(query_param("conditions", "name=Provision Linux"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "link": [], "total": 0 })))
            .mount(&server)
            .await;
        let service = session(&server);

        let error = service
            .resolve_workflow(&WorkflowLookup::Name("Provision Linux".into()))
            .await
            .unwrap_err();
        assert!(matches!(error, ProvisionError::NotFound { .. }));
    }

    #[tokio::test]
    async fn status_query_failure_is_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vco/api/workflows/wf-1/executions/exec-1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;
        let service = session(&server);

        let error = service.query_status("wf-1", "exec-1").await.unwrap_err();
        assert!(matches!(error, ProvisionError::Remote { ref operation, .. } if operation == "query execution status"));
    }
}
