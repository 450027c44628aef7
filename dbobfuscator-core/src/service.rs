//! Run submission and tracking.
//!
//! [`ObfuscationService`] is the entry point shared by the CLI and the HTTP
//! surface: it validates a plan against the origin schema, registers a run
//! and launches the copy pipeline as a tracked, cancellable task.

use crate::Result;
use crate::adapters::Connector;
use crate::config::{ConnectionInfo, ObfuscatorConfig};
use crate::copy::{CopyOrchestrator, RunEndpoints};
use crate::error::ObfuscatorError;
use crate::models::{ObfuscationPlan, RunProgress};
use crate::progress::ProgressTracker;
use crate::validation::{collect_schema_model, validate_plan};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

/// A request to copy `origin` into `destination` while masking per `plan`.
#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    #[serde(rename = "Model")]
    pub plan: ObfuscationPlan,
    #[serde(rename = "Origin")]
    pub origin: ConnectionInfo,
    #[serde(rename = "Destination")]
    pub destination: ConnectionInfo,
}

/// Handle to a launched run.
///
/// Dropping the handle detaches the run; it keeps going and stays visible
/// through [`ObfuscationService::status`].
#[derive(Debug)]
pub struct RunHandle {
    run_id: String,
    cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Asks the run to stop at the next batch boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the run to end.
    ///
    /// # Errors
    /// Returns the run's fatal error, or [`ObfuscatorError::Task`] if the
    /// task panicked.
    pub async fn wait(self) -> Result<()> {
        self.task
            .await
            .map_err(|source| ObfuscatorError::Task { source })?
    }
}

/// Validates, launches and tracks obfuscation runs.
#[derive(Clone)]
pub struct ObfuscationService {
    connector: Arc<dyn Connector>,
    orchestrator: CopyOrchestrator,
    progress: ProgressTracker,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl fmt::Debug for ObfuscationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObfuscationService")
            .field("orchestrator", &self.orchestrator)
            .field("runs", &self.progress.len())
            .field("active_tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl ObfuscationService {
    /// Creates a service opening databases through `connector`.
    ///
    /// # Errors
    /// Returns a configuration error for invalid obfuscator settings.
    pub fn new(connector: Arc<dyn Connector>, config: &ObfuscatorConfig) -> Result<Self> {
        let progress = ProgressTracker::new();
        let orchestrator = CopyOrchestrator::new(config, progress.clone())?;
        Ok(Self {
            connector,
            orchestrator,
            progress,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    /// Builder method to make every run's masking reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.orchestrator = self.orchestrator.with_seed(seed);
        self
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Reads the live schema behind `info` as a plan template.
    ///
    /// # Errors
    /// Returns connection and introspection errors, or
    /// [`ObfuscatorError::TableStructure`] for tables without a primary key.
    pub async fn schema_info(&self, info: &ConnectionInfo) -> Result<ObfuscationPlan> {
        let adapter = self.connector.connect(info).await?;
        let model = collect_schema_model(adapter.as_ref()).await;
        adapter.close().await;
        model
    }

    /// Validates `request` and launches it.
    ///
    /// The run id is registered before this returns, with a total of one per
    /// planned table.
    ///
    /// # Errors
    /// Returns connection or validation errors; nothing is registered then.
    pub async fn submit(&self, request: RunRequest) -> Result<RunHandle> {
        if self.shutdown.is_cancelled() {
            return Err(ObfuscatorError::Cancelled);
        }

        let RunRequest {
            plan,
            origin,
            destination,
        } = request;

        let adapter = self.connector.connect(&origin).await?;
        let validation = validate_plan(&plan, adapter.as_ref()).await;
        adapter.close().await;
        validation?;

        let run_id = Uuid::new_v4().to_string();
        self.progress.register(&run_id, plan.len());

        let cancel = self.shutdown.child_token();
        let task = {
            let orchestrator = self.orchestrator.clone();
            let connector = Arc::clone(&self.connector);
            let endpoints = RunEndpoints {
                origin,
                destination,
            };
            let run_id = run_id.clone();
            let cancel = cancel.clone();

            self.tasks.spawn(async move {
                orchestrator
                    .run(&run_id, &plan, &endpoints, connector.as_ref(), &cancel)
                    .await
            })
        };

        tracing::info!(run_id = %run_id, "Obfuscation was started");
        Ok(RunHandle {
            run_id,
            cancel,
            task,
        })
    }

    pub fn status(&self, run_id: &str) -> Option<RunProgress> {
        self.progress.get(run_id)
    }

    /// Forgets every tracked run.
    pub fn clear_progress(&self) {
        self.progress.clear_all();
    }

    /// Cancels every run and waits for their tasks to finish.
    ///
    /// Later submissions are refused.
    pub async fn shutdown(&self) {
        tracing::info!(active = self.tasks.len(), "Shutting down obfuscation runs");
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryConnector;
    use crate::adapters::MemoryDatabase;
    use crate::adapters::memory::primary_key_column;
    use crate::models::{CellValue, RawColumn, RunStatus};

    fn info(schema: &str) -> ConnectionInfo {
        ConnectionInfo::new("app", "secret", "localhost:3306", schema)
    }

    fn setup() -> (ObfuscationService, MemoryDatabase, MemoryDatabase) {
        let origin = MemoryDatabase::new();
        origin.add_table(
            "accounts",
            vec![primary_key_column("id", "int"), RawColumn::new("owner", "varchar(16)")],
            &[],
        );
        origin
            .push_row("accounts", vec![CellValue::Int(1), CellValue::from("alice")])
            .unwrap();
        let destination = MemoryDatabase::new();

        let connector = MemoryConnector::new();
        connector.register("prod", origin.clone());
        connector.register("staging", destination.clone());

        let config = ObfuscatorConfig {
            slice_size: 100,
            dispersion_percent: 10,
        };
        let service = ObfuscationService::new(Arc::new(connector), &config)
            .unwrap()
            .with_seed(11);
        (service, origin, destination)
    }

    async fn request(service: &ObfuscationService) -> RunRequest {
        let plan = service.schema_info(&info("prod")).await.unwrap();
        RunRequest {
            plan,
            origin: info("prod"),
            destination: info("staging"),
        }
    }

    #[tokio::test]
    async fn test_submit_runs_to_completion() {
        let (service, _, destination) = setup();
        let handle = service.submit(request(&service).await).await.unwrap();
        let run_id = handle.run_id().to_string();

        handle.wait().await.unwrap();

        let progress = service.status(&run_id).unwrap();
        assert_eq!(progress.status(), RunStatus::Completed);
        assert_eq!(progress.total_count, 1);
        assert_eq!(
            destination.column_values("accounts", "owner").unwrap(),
            vec![CellValue::from("6384e2b2184bcbf5")]
        );
    }

    #[tokio::test]
    async fn test_invalid_plan_is_not_registered() {
        let (service, _, _) = setup();
        let mut request = request(&service).await;
        if let Some(columns) = request.plan.get_mut("accounts") {
            columns[0].needs_obfuscation = true;
        }

        let error = service.submit(request).await.unwrap_err();
        assert!(matches!(error, ObfuscatorError::SchemaMismatch { .. }));
        assert!(service.progress().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_origin() {
        let (service, _, _) = setup();
        let error = service.schema_info(&info("missing")).await.unwrap_err();
        assert!(matches!(error, ObfuscatorError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_unknown_destination_fails_the_run() {
        let (service, _, _) = setup();
        let mut request = request(&service).await;
        request.destination = info("missing");

        let handle = service.submit(request).await.unwrap();
        let run_id = handle.run_id().to_string();
        assert!(handle.wait().await.is_err());

        let progress = service.status(&run_id).unwrap();
        assert_eq!(progress.status(), RunStatus::Failed);
        assert_eq!(progress.finished_count, 0);
        let error = progress.last_error.unwrap();
        assert!(error.starts_with("Database connection failed"), "{}", error);
        assert!(error.contains("Unknown database 'missing'"), "{}", error);
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_runs() {
        let (service, _, _) = setup();
        service.shutdown().await;

        let error = service.submit(request(&service).await).await.unwrap_err();
        assert!(matches!(error, ObfuscatorError::Cancelled));
    }

    #[tokio::test]
    async fn test_clear_progress() {
        let (service, _, _) = setup();
        let handle = service.submit(request(&service).await).await.unwrap();
        let run_id = handle.run_id().to_string();
        handle.wait().await.unwrap();

        service.clear_progress();
        assert!(service.status(&run_id).is_none());
    }
}
