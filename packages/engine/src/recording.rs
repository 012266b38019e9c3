//! An [`EngineApi`] that never leaves the process.
//!
//! [`RecordingEngine`] keeps every request it receives, answers compute
//! calls from a caller-supplied responder, and acknowledges exports with
//! synthetic pending operations. The `plan` command uses it to print the
//! exact requests a run would send; tests use it to inspect them.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use greenspace_engine_models::{
    ExportImageRequest, ExportTableRequest, Expression, ListOperationsResponse, Operation,
    OperationMetadata, OperationState,
};
use serde::Serialize;

use crate::{EngineApi, EngineError};

/// A request captured by [`RecordingEngine`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordedRequest {
    /// `value:compute`.
    Compute {
        /// Evaluated expression.
        expression: Expression,
    },
    /// `image:export`.
    ExportImage {
        /// Submitted request body.
        request: ExportImageRequest,
    },
    /// `table:export`.
    ExportTable {
        /// Submitted request body.
        request: ExportTableRequest,
    },
}

impl RecordedRequest {
    /// Export description, if this is an export.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Compute { .. } => None,
            Self::ExportImage { request } => Some(&request.description),
            Self::ExportTable { request } => Some(&request.description),
        }
    }
}

type Responder = dyn Fn(&Expression) -> Result<serde_json::Value, EngineError> + Send + Sync;
type Rejector = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Records requests instead of sending them.
pub struct RecordingEngine {
    project: String,
    responder: Box<Responder>,
    rejector: Box<Rejector>,
    requests: Mutex<Vec<RecordedRequest>>,
    operations: Mutex<Vec<Operation>>,
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingEngine {
    /// An engine whose compute calls all evaluate to `null` and which
    /// accepts every export.
    #[must_use]
    pub fn new() -> Self {
        Self {
            project: "dry-run".to_string(),
            responder: Box::new(|_| Ok(serde_json::Value::Null)),
            rejector: Box::new(|_| None),
            requests: Mutex::new(Vec::new()),
            operations: Mutex::new(Vec::new()),
        }
    }

    /// Answers compute calls with `responder`.
    #[must_use]
    pub fn with_responder(
        mut self,
        responder: impl Fn(&Expression) -> Result<serde_json::Value, EngineError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.responder = Box::new(responder);
        self
    }

    /// Rejects exports for which `rejector` returns a message.
    #[must_use]
    pub fn with_export_rejection(
        mut self,
        rejector: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.rejector = Box::new(rejector);
        self
    }

    /// Every request received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Export requests only.
    #[must_use]
    pub fn exports(&self) -> Vec<RecordedRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| !matches!(r, RecordedRequest::Compute { .. }))
            .cloned()
            .collect()
    }

    fn accept(
        &self,
        description: &str,
        request_id: Option<&str>,
        recorded: RecordedRequest,
    ) -> Result<Operation, EngineError> {
        if let Some(message) = (self.rejector)(description) {
            return Err(EngineError::Api {
                status: 400,
                message,
            });
        }

        let mut operations = lock(&self.operations);
        lock(&self.requests).push(recorded);

        if let Some(existing) = request_id.and_then(|id| {
            operations
                .iter()
                .find(|op| op.name.ends_with(&format!("/{id}")))
        }) {
            return Ok(existing.clone());
        }

        let id = request_id.map_or_else(|| operations.len().to_string(), str::to_string);
        let operation = Operation {
            name: format!("projects/{}/operations/{id}", self.project),
            metadata: Some(OperationMetadata {
                state: OperationState::Pending,
                description: Some(description.to_string()),
                create_time: None,
                update_time: None,
                progress: None,
            }),
            done: false,
            error: None,
        };
        operations.push(operation.clone());
        Ok(operation)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl EngineApi for RecordingEngine {
    async fn compute(&self, expression: &Expression) -> Result<serde_json::Value, EngineError> {
        lock(&self.requests).push(RecordedRequest::Compute {
            expression: expression.clone(),
        });
        (self.responder)(expression)
    }

    async fn export_image(&self, request: &ExportImageRequest) -> Result<Operation, EngineError> {
        self.accept(
            &request.description,
            request.request_id.as_deref(),
            RecordedRequest::ExportImage {
                request: request.clone(),
            },
        )
    }

    async fn export_table(&self, request: &ExportTableRequest) -> Result<Operation, EngineError> {
        self.accept(
            &request.description,
            request.request_id.as_deref(),
            RecordedRequest::ExportTable {
                request: request.clone(),
            },
        )
    }

    async fn list_operations(
        &self,
        _page_token: Option<&str>,
    ) -> Result<ListOperationsResponse, EngineError> {
        Ok(ListOperationsResponse {
            operations: lock(&self.operations).clone(),
            next_page_token: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use greenspace_engine_models::{FileExportOptions, FileFormat};

    use super::*;
    use crate::list_all_operations;

    fn table_request(description: &str, request_id: &str) -> ExportTableRequest {
        ExportTableRequest {
            expression: Expression {
                values: BTreeMap::new(),
                result: "0".to_string(),
            },
            description: description.to_string(),
            file_export_options: FileExportOptions {
                file_format: FileFormat::Csv,
                drive_destination: None,
                gcs_destination: None,
            },
            request_id: Some(request_id.to_string()),
        }
    }

    #[tokio::test]
    async fn repeated_request_id_returns_the_same_operation() {
        let engine = RecordingEngine::new();

        let first = engine
            .export_table(&table_request("boundingCircleValues_Accra20230321", "abc"))
            .await
            .unwrap();
        let second = engine
            .export_table(&table_request("boundingCircleValues_Accra20230321", "abc"))
            .await
            .unwrap();

        assert_eq!(first.name, second.name);
        assert_eq!(engine.exports().len(), 2);
        assert_eq!(list_all_operations(&engine).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejection_surfaces_as_api_error() {
        let engine = RecordingEngine::new().with_export_rejection(|description| {
            description
                .contains("Lagos")
                .then(|| "quota exceeded".to_string())
        });

        let err = engine
            .export_table(&table_request("boundingCircleValues_Lagos20230321", "x"))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Api { status: 400, .. }));
        assert!(engine.exports().is_empty());
    }

    #[tokio::test]
    async fn compute_uses_responder() {
        let engine = RecordingEngine::new().with_responder(|_| Ok(serde_json::json!(42)));
        let expression = Expression {
            values: BTreeMap::new(),
            result: "0".to_string(),
        };

        assert_eq!(
            engine.compute(&expression).await.unwrap(),
            serde_json::json!(42)
        );
        assert_eq!(engine.requests().len(), 1);
    }
}
