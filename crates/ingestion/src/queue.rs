//! Analysis queue
//!
//! A single actor task owns every project, the active project id and the
//! in-flight flags. Callers talk to it through a cloneable [`QueueHandle`];
//! provider calls run in spawned tasks that post their outcome back.
//!
//! After every message the actor re-evaluates the active project:
//! 1. nothing happens while a file is being analyzed;
//! 2. otherwise the first pending file in stored order is analyzed;
//! 3. once nothing is pending, a settled project with at least three
//!    completed files and no theme gets one outlier pass.
//!
//! Adding files bumps the project's batch generation. An outlier result
//! from an older generation is discarded, so a theme is never stamped over
//! files it did not see.

use paperlens_common::context::{DocumentAnalyzer, OutlierDetector, MIN_FILES_FOR_COHESION};
use paperlens_common::errors::LlmError;
use paperlens_common::metrics;
use paperlens_common::models::{
    AnalysisStatus, AnalyzedFile, ChatMessage, DocumentAnalysis, OutlierReport, Project,
    ProjectSummary, ThemePreference,
};
use paperlens_common::store::ProjectStore;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use crate::catalog::ProjectCatalog;
use crate::errors::IngestionError;
use crate::upload::{accept_pdfs, AddFilesOutcome, UploadedFile};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Progress notifications published by the queue
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    FileStarted {
        project_id: Uuid,
        file_id: Uuid,
    },
    FileCompleted {
        project_id: Uuid,
        file_id: Uuid,
        title: String,
    },
    FileFailed {
        project_id: Uuid,
        file_id: Uuid,
        error: String,
    },
    OutlierPassStarted {
        project_id: Uuid,
        generation: u64,
    },
    OutlierPassCompleted {
        project_id: Uuid,
        main_theme: String,
        outliers: usize,
    },
    OutlierPassFailed {
        project_id: Uuid,
        error: String,
    },
    /// A pass finished after newer files were added; its result was dropped
    OutlierPassDiscarded {
        project_id: Uuid,
        generation: u64,
    },
    /// Nothing pending, processing or awaiting an outlier pass
    Settled {
        project_id: Uuid,
    },
}

enum Command {
    CreateProject {
        nickname: String,
        reply: oneshot::Sender<Project>,
    },
    ListProjects {
        reply: oneshot::Sender<Vec<ProjectSummary>>,
    },
    SelectProject {
        id: Uuid,
        reply: oneshot::Sender<Result<Project, IngestionError>>,
    },
    Snapshot {
        id: Uuid,
        reply: oneshot::Sender<Result<Project, IngestionError>>,
    },
    ActiveProject {
        reply: oneshot::Sender<Option<Uuid>>,
    },
    AddFiles {
        id: Uuid,
        files: Vec<UploadedFile>,
        reply: oneshot::Sender<Result<AddFilesOutcome, IngestionError>>,
    },
    AppendMessages {
        id: Uuid,
        messages: Vec<ChatMessage>,
        reply: oneshot::Sender<Result<(), IngestionError>>,
    },
    Theme {
        reply: oneshot::Sender<Option<ThemePreference>>,
    },
    SetTheme {
        theme: ThemePreference,
        reply: oneshot::Sender<Result<(), IngestionError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Outcomes posted back by spawned provider calls
enum Finished {
    Analysis {
        project_id: Uuid,
        file_id: Uuid,
        outcome: Result<DocumentAnalysis, LlmError>,
        elapsed: Duration,
    },
    Outliers {
        project_id: Uuid,
        generation: u64,
        outcome: Result<OutlierReport, LlmError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlight {
    project_id: Uuid,
    file_id: Uuid,
}

pub struct AnalysisQueue {
    catalog: ProjectCatalog,
    analyzer: DocumentAnalyzer,
    detector: OutlierDetector,
    active: Option<Uuid>,
    /// The one file being analyzed, across all projects
    processing: Option<InFlight>,
    /// Outlier pass running per project, keyed to the generation it saw
    outlier_in_flight: HashMap<Uuid, u64>,
    generations: HashMap<Uuid, u64>,
    /// Generation at which a project's last outlier pass failed
    outlier_failed_at: HashMap<Uuid, u64>,
    theme: Option<ThemePreference>,
    commands: mpsc::Receiver<Command>,
    results_tx: mpsc::UnboundedSender<Finished>,
    results: mpsc::UnboundedReceiver<Finished>,
    events: broadcast::Sender<QueueEvent>,
}

impl AnalysisQueue {
    /// Load stored state and start the actor
    pub async fn start(
        store: ProjectStore,
        analyzer: DocumentAnalyzer,
        detector: OutlierDetector,
    ) -> QueueHandle {
        let theme = store.load_theme().await;
        let catalog = ProjectCatalog::load(store).await;

        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (results_tx, results) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let queue = Self {
            catalog,
            analyzer,
            detector,
            active: None,
            processing: None,
            outlier_in_flight: HashMap::new(),
            generations: HashMap::new(),
            outlier_failed_at: HashMap::new(),
            theme,
            commands,
            results_tx,
            results,
            events: events.clone(),
        };

        tokio::spawn(queue.run().instrument(info_span!("analysis_queue")));

        QueueHandle {
            commands: command_tx,
            events,
        }
    }

    async fn run(mut self) {
        info!(projects = self.catalog.len(), "Analysis queue started");
        self.catalog.persist().await;

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.catalog.persist().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(finished) = self.results.recv() => self.handle_finished(finished),
            }

            self.catalog.persist().await;
        }

        self.catalog.persist().await;
        info!("Analysis queue stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::CreateProject { nickname, reply } => {
                let project = Project::new(nickname);
                info!(project_id = %project.id, nickname = %project.nickname, "Project created");
                self.active = Some(project.id);
                let _ = reply.send(project.clone());
                self.catalog.insert(project);
            }
            Command::ListProjects { reply } => {
                let _ = reply.send(self.catalog.summaries());
            }
            Command::SelectProject { id, reply } => {
                let result = self.snapshot(id);
                if result.is_ok() {
                    debug!(project_id = %id, "Project selected");
                    self.active = Some(id);
                }
                let _ = reply.send(result);
            }
            Command::Snapshot { id, reply } => {
                let _ = reply.send(self.snapshot(id));
            }
            Command::ActiveProject { reply } => {
                let _ = reply.send(self.active);
            }
            Command::AddFiles { id, files, reply } => {
                let _ = reply.send(self.add_files(id, files));
            }
            Command::AppendMessages { id, messages, reply } => {
                let result = match self.catalog.get_mut(id) {
                    Some(project) => {
                        for message in messages {
                            project.push_message(message);
                        }
                        Ok(())
                    }
                    None => Err(IngestionError::ProjectNotFound(id)),
                };
                let _ = reply.send(result);
            }
            Command::Theme { reply } => {
                let _ = reply.send(self.theme);
            }
            Command::SetTheme { theme, reply } => {
                self.theme = Some(theme);
                let result = self
                    .catalog
                    .store()
                    .save_theme(theme)
                    .await
                    .map_err(IngestionError::from);
                let _ = reply.send(result);
            }
            Command::Shutdown { .. } => {}
        }

        self.evaluate();
    }

    fn snapshot(&self, id: Uuid) -> Result<Project, IngestionError> {
        self.catalog
            .get(id)
            .map(Project::without_payloads)
            .ok_or(IngestionError::ProjectNotFound(id))
    }

    #[instrument(skip(self, files), fields(project_id = %id, files = files.len()))]
    fn add_files(
        &mut self,
        id: Uuid,
        files: Vec<UploadedFile>,
    ) -> Result<AddFilesOutcome, IngestionError> {
        if self.catalog.get(id).is_none() {
            return Err(IngestionError::ProjectNotFound(id));
        }
        if self.active != Some(id) {
            return Err(IngestionError::ProjectNotActive(id));
        }

        let (accepted, rejected) = accept_pdfs(files);
        let ids: Vec<Uuid> = accepted.iter().map(|f| f.id).collect();

        if !accepted.is_empty() {
            let project = self
                .catalog
                .get_mut(id)
                .ok_or(IngestionError::ProjectNotFound(id))?;
            project.add_files(accepted);
            let generation = self.generations.entry(id).or_insert(0);
            *generation += 1;
            info!(accepted = ids.len(), rejected, generation = *generation, "Files queued");
        }

        Ok(AddFilesOutcome {
            accepted: ids,
            rejected,
        })
    }

    fn generation(&self, project_id: Uuid) -> u64 {
        self.generations.get(&project_id).copied().unwrap_or(0)
    }

    fn handle_finished(&mut self, finished: Finished) {
        let project_id = match finished {
            Finished::Analysis {
                project_id,
                file_id,
                outcome,
                elapsed,
            } => {
                self.finish_analysis(project_id, file_id, outcome, elapsed);
                project_id
            }
            Finished::Outliers {
                project_id,
                generation,
                outcome,
            } => {
                self.finish_outliers(project_id, generation, outcome);
                project_id
            }
        };

        self.evaluate();

        let busy = self.processing.map(|f| f.project_id) == Some(project_id)
            || self.outlier_in_flight.contains_key(&project_id)
            || self.needs_outlier_pass(project_id);
        let settled = self
            .catalog
            .get(project_id)
            .map(Project::is_settled)
            .unwrap_or(false);
        if settled && !busy {
            self.emit(QueueEvent::Settled { project_id });
        }
    }

    fn finish_analysis(
        &mut self,
        project_id: Uuid,
        file_id: Uuid,
        outcome: Result<DocumentAnalysis, LlmError>,
        elapsed: Duration,
    ) {
        if self.processing == Some(InFlight { project_id, file_id }) {
            self.processing = None;
        }
        metrics::record_analysis(elapsed.as_secs_f64(), outcome.is_ok());

        let Some(file) = self
            .catalog
            .get_mut(project_id)
            .and_then(|p| p.file_mut(file_id))
        else {
            warn!(%project_id, %file_id, "Analysis finished for an unknown file");
            return;
        };

        let event = match outcome {
            Ok(analysis) => {
                let title = analysis.title.clone();
                file.mark_completed(analysis);
                info!(%project_id, %file_id, title = %title, elapsed_ms = elapsed.as_millis() as u64, "File analyzed");
                QueueEvent::FileCompleted {
                    project_id,
                    file_id,
                    title,
                }
            }
            Err(e) => {
                let error = e.to_string();
                file.mark_failed(error.clone());
                warn!(%project_id, %file_id, error = %error, "File analysis failed");
                QueueEvent::FileFailed {
                    project_id,
                    file_id,
                    error,
                }
            }
        };
        self.emit(event);
    }

    fn finish_outliers(
        &mut self,
        project_id: Uuid,
        generation: u64,
        outcome: Result<OutlierReport, LlmError>,
    ) {
        if self.outlier_in_flight.get(&project_id) == Some(&generation) {
            self.outlier_in_flight.remove(&project_id);
        }

        if generation != self.generation(project_id) {
            info!(%project_id, generation, current = self.generation(project_id), "Discarding stale outlier pass");
            metrics::record_outlier_pass("discarded");
            self.emit(QueueEvent::OutlierPassDiscarded {
                project_id,
                generation,
            });
            return;
        }

        match outcome {
            Ok(report) => {
                let Some(project) = self.catalog.get_mut(project_id) else {
                    return;
                };
                project.apply_outlier_report(&report);
                metrics::record_outlier_pass("completed");
                info!(%project_id, theme = %report.main_theme, outliers = report.outliers.len(), "Outlier pass applied");
                self.emit(QueueEvent::OutlierPassCompleted {
                    project_id,
                    main_theme: report.main_theme,
                    outliers: report.outliers.len(),
                });
            }
            Err(e) => {
                warn!(%project_id, generation, error = %e, "Outlier pass failed; waiting for new files before retrying");
                self.outlier_failed_at.insert(project_id, generation);
                metrics::record_outlier_pass("failed");
                self.emit(QueueEvent::OutlierPassFailed {
                    project_id,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Start whatever work the active project is ready for
    fn evaluate(&mut self) {
        let Some(project_id) = self.active else {
            return;
        };
        if self.processing.is_some() {
            return;
        }

        loop {
            let Some(project) = self.catalog.get(project_id) else {
                return;
            };
            metrics::set_pending_files(project.count_with_status(AnalysisStatus::Pending));

            let Some(file) = self
                .catalog
                .get_mut(project_id)
                .and_then(Project::next_pending_mut)
            else {
                break;
            };
            let file_id = file.id;

            match file.payload.clone() {
                Some(payload) => {
                    file.mark_processing();
                    let file_name = file.file_name.clone();
                    self.processing = Some(InFlight {
                        project_id,
                        file_id,
                    });
                    self.spawn_analysis(project_id, file_id, file_name, payload);
                    return;
                }
                None => {
                    let error = crate::catalog::PAYLOAD_UNAVAILABLE.to_string();
                    file.mark_failed(error.clone());
                    self.emit(QueueEvent::FileFailed {
                        project_id,
                        file_id,
                        error,
                    });
                }
            }
        }

        self.maybe_start_outlier_pass(project_id);
    }

    /// Settled, unthemed, enough completed files, and no failed pass at
    /// the current generation
    fn needs_outlier_pass(&self, project_id: Uuid) -> bool {
        let generation = self.generation(project_id);
        self.catalog.get(project_id).is_some_and(|project| {
            project.is_settled()
                && project.theme_description.is_none()
                && project.completed_count() >= MIN_FILES_FOR_COHESION
                && self.outlier_failed_at.get(&project_id) != Some(&generation)
        })
    }

    fn maybe_start_outlier_pass(&mut self, project_id: Uuid) {
        // A stale pass for the same project must come back before a new one starts
        if !self.needs_outlier_pass(project_id) || self.outlier_in_flight.contains_key(&project_id) {
            return;
        }
        let generation = self.generation(project_id);
        let Some(project) = self.catalog.get(project_id) else {
            return;
        };

        let files: Vec<AnalyzedFile> = project
            .completed_files()
            .map(AnalyzedFile::without_payload)
            .collect();

        self.outlier_in_flight.insert(project_id, generation);
        self.emit(QueueEvent::OutlierPassStarted {
            project_id,
            generation,
        });

        let detector = self.detector.clone();
        let results = self.results_tx.clone();
        tokio::spawn(
            async move {
                let outcome = detector.detect(&files).await;
                let _ = results.send(Finished::Outliers {
                    project_id,
                    generation,
                    outcome,
                });
            }
            .instrument(info_span!("outlier_pass", %project_id, generation)),
        );
    }

    fn spawn_analysis(
        &self,
        project_id: Uuid,
        file_id: Uuid,
        file_name: String,
        payload: paperlens_common::models::FilePayload,
    ) {
        self.emit(QueueEvent::FileStarted {
            project_id,
            file_id,
        });

        let analyzer = self.analyzer.clone();
        let results = self.results_tx.clone();
        tokio::spawn(
            async move {
                let started = Instant::now();
                let outcome = analyzer.analyze(&file_name, &payload).await;
                let _ = results.send(Finished::Analysis {
                    project_id,
                    file_id,
                    outcome,
                    elapsed: started.elapsed(),
                });
            }
            .instrument(info_span!("analyze_file", %project_id, %file_id)),
        );
    }

    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Cloneable front door to the analysis queue
#[derive(Clone)]
pub struct QueueHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<QueueEvent>,
}

impl QueueHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, IngestionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| IngestionError::QueueClosed)?;
        response.await.map_err(|_| IngestionError::QueueClosed)
    }

    /// Create a project; it becomes the active one
    pub async fn create_project(&self, nickname: impl Into<String>) -> Result<Project, IngestionError> {
        let nickname = nickname.into();
        self.request(|reply| Command::CreateProject { nickname, reply })
            .await
    }

    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>, IngestionError> {
        self.request(|reply| Command::ListProjects { reply }).await
    }

    /// Make a project active and return its snapshot
    pub async fn select_project(&self, id: Uuid) -> Result<Project, IngestionError> {
        self.request(|reply| Command::SelectProject { id, reply })
            .await?
    }

    /// Snapshot of a project without file payloads
    pub async fn project(&self, id: Uuid) -> Result<Project, IngestionError> {
        self.request(|reply| Command::Snapshot { id, reply }).await?
    }

    pub async fn active_project(&self) -> Result<Option<Uuid>, IngestionError> {
        self.request(|reply| Command::ActiveProject { reply }).await
    }

    /// Queue the PDFs of a batch on the active project
    pub async fn add_files(
        &self,
        id: Uuid,
        files: Vec<UploadedFile>,
    ) -> Result<AddFilesOutcome, IngestionError> {
        self.request(|reply| Command::AddFiles { id, files, reply })
            .await?
    }

    /// Append chat turns to any project
    pub async fn append_messages(
        &self,
        id: Uuid,
        messages: Vec<ChatMessage>,
    ) -> Result<(), IngestionError> {
        self.request(|reply| Command::AppendMessages { id, messages, reply })
            .await?
    }

    pub async fn theme(&self) -> Result<Option<ThemePreference>, IngestionError> {
        self.request(|reply| Command::Theme { reply }).await
    }

    pub async fn set_theme(&self, theme: ThemePreference) -> Result<(), IngestionError> {
        self.request(|reply| Command::SetTheme { theme, reply })
            .await?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Persist and stop the actor. In-flight provider calls are abandoned.
    pub async fn shutdown(&self) -> Result<(), IngestionError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperlens_common::errors::LlmError;
    use paperlens_common::llm::{GenerateRequest, GenerateResponse, MockModelClient, ModelClient};
    use paperlens_common::models::ThematicStatus;
    use paperlens_common::retry::RetryPolicy;
    use serde_json::json;
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(5);

    fn respond(request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        if !request.has_inline_data() {
            let outliers: Vec<_> = if request.prompt_text().contains("\"filename\": \"law.pdf\"") {
                vec![json!({"filename": "law.pdf", "reason": "Legal scholarship"})]
            } else {
                vec![]
            };
            return Ok(GenerateResponse::from_text(
                json!({"mainTheme": "Soil ecology", "outliers": outliers}).to_string(),
            ));
        }

        let prompt = request.prompt_text();
        let name = prompt
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("File name: "))
            .unwrap_or("unknown")
            .to_string();
        if name.starts_with("bad") {
            return Err(LlmError::Provider {
                status: 400,
                message: "INVALID_ARGUMENT unreadable document".into(),
            });
        }

        Ok(GenerateResponse::from_text(
            json!({
                "title": format!("Study {}", name),
                "summary": "Summary",
                "keyPoints": ["Point"],
                "citation": {
                    "title": format!("Study {}", name),
                    "authors": ["Doe, J."],
                    "literatureType": "Primary Research",
                    "mainTopic": "Soil ecology"
                },
                "thematicTags": ["soil"]
            })
            .to_string(),
        ))
    }

    fn mock(latency_ms: u64) -> Arc<MockModelClient> {
        Arc::new(
            MockModelClient::new()
                .with_latency(Duration::from_millis(latency_ms))
                .with_handler(respond),
        )
    }

    /// Outlier passes run far longer than file analysis
    struct SlowOutlierClient;

    #[async_trait::async_trait]
    impl ModelClient for SlowOutlierClient {
        async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError> {
            let delay = if request.has_inline_data() { 5 } else { 300 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            respond(&request)
        }

        fn provider_name(&self) -> &str {
            "slow-outliers"
        }
    }

    async fn start(client: Arc<dyn ModelClient>, store: ProjectStore) -> QueueHandle {
        let analyzer = DocumentAnalyzer::new(client.clone(), "extract", RetryPolicy::none());
        let detector = OutlierDetector::new(client, "synth", RetryPolicy::none());
        AnalysisQueue::start(store, analyzer, detector).await
    }

    fn pdfs(names: &[&str]) -> Vec<UploadedFile> {
        names
            .iter()
            .map(|n| UploadedFile::new(*n, Some("application/pdf".into()), b"%PDF-1.7".to_vec()))
            .collect()
    }

    fn outlier_calls(client: &MockModelClient) -> usize {
        client.requests().iter().filter(|r| !r.has_inline_data()).count()
    }

    fn analyzed_names(client: &MockModelClient) -> Vec<String> {
        client
            .requests()
            .iter()
            .filter(|r| r.has_inline_data())
            .filter_map(|r| {
                r.prompt_text()
                    .lines()
                    .next()
                    .and_then(|l| l.strip_prefix("File name: "))
                    .map(str::to_string)
            })
            .collect()
    }

    /// Collect events until the project settles
    async fn settle(events: &mut broadcast::Receiver<QueueEvent>, project_id: Uuid) -> Vec<QueueEvent> {
        let mut seen = Vec::new();
        loop {
            let event = tokio::time::timeout(WAIT, events.recv())
                .await
                .expect("queue did not settle in time")
                .expect("event channel closed");
            let done = event == QueueEvent::Settled { project_id };
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    #[tokio::test]
    async fn test_files_drain_in_order_one_at_a_time() {
        let client = mock(15);
        let queue = start(client.clone(), ProjectStore::in_memory()).await;
        let project = queue.create_project("Soils").await.unwrap();
        let mut events = queue.subscribe();

        let outcome = queue
            .add_files(project.id, pdfs(&["d.pdf", "a.pdf", "c.pdf", "b.pdf"]))
            .await
            .unwrap();
        assert_eq!(outcome.accepted.len(), 4);
        settle(&mut events, project.id).await;

        assert_eq!(analyzed_names(&client), vec!["d.pdf", "a.pdf", "c.pdf", "b.pdf"]);
        assert_eq!(client.max_in_flight(), 1);

        let snapshot = queue.project(project.id).await.unwrap();
        assert_eq!(snapshot.count_with_status(AnalysisStatus::Pending), 0);
        assert_eq!(snapshot.count_with_status(AnalysisStatus::Completed), 4);
        assert!(snapshot.files.iter().all(|f| f.payload.is_none()));
    }

    #[tokio::test]
    async fn test_at_most_one_file_processing() {
        let client = mock(20);
        let queue = start(client.clone(), ProjectStore::in_memory()).await;
        let project = queue.create_project("Soils").await.unwrap();
        let mut events = queue.subscribe();

        queue
            .add_files(project.id, pdfs(&["a.pdf", "b.pdf", "c.pdf"]))
            .await
            .unwrap();

        for _ in 0..3 {
            let snapshot = queue.project(project.id).await.unwrap();
            assert!(snapshot.count_with_status(AnalysisStatus::Processing) <= 1);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        settle(&mut events, project.id).await;
    }

    #[tokio::test]
    async fn test_outlier_pass_once_per_settled_batch() {
        let client = mock(20);
        let queue = start(client.clone(), ProjectStore::in_memory()).await;
        let project = queue.create_project("Soils").await.unwrap();
        let mut events = queue.subscribe();

        queue
            .add_files(project.id, pdfs(&["a.pdf", "b.pdf", "law.pdf"]))
            .await
            .unwrap();
        let seen = settle(&mut events, project.id).await;
        assert!(seen.contains(&QueueEvent::OutlierPassCompleted {
            project_id: project.id,
            main_theme: "Soil ecology".into(),
            outliers: 1,
        }));
        assert_eq!(outlier_calls(&client), 1);

        let snapshot = queue.project(project.id).await.unwrap();
        assert_eq!(snapshot.theme_description.as_deref(), Some("Soil ecology"));
        assert_eq!(snapshot.files[2].thematic_status(), ThematicStatus::Outlier);
        assert_eq!(snapshot.files[2].outlier_reason(), Some("Legal scholarship"));

        // Chat activity does not trigger another pass
        queue
            .append_messages(project.id, vec![ChatMessage::user("Q"), ChatMessage::ai("A")])
            .await
            .unwrap();
        let snapshot = queue.project(project.id).await.unwrap();
        assert_eq!(snapshot.chat_history.len(), 2);
        assert_eq!(outlier_calls(&client), 1);

        // New files reset the theme and cause exactly one more pass
        queue
            .add_files(project.id, pdfs(&["d.pdf", "e.pdf"]))
            .await
            .unwrap();
        let snapshot = queue.project(project.id).await.unwrap();
        assert!(snapshot.theme_description.is_none());

        settle(&mut events, project.id).await;
        assert_eq!(outlier_calls(&client), 2);

        let snapshot = queue.project(project.id).await.unwrap();
        assert_eq!(snapshot.theme_description.as_deref(), Some("Soil ecology"));
        assert!(snapshot
            .files
            .iter()
            .all(|f| f.thematic_status() != ThematicStatus::Unknown));
    }

    #[tokio::test]
    async fn test_fewer_than_three_completed_skips_outlier_pass() {
        let client = mock(5);
        let queue = start(client.clone(), ProjectStore::in_memory()).await;
        let project = queue.create_project("Small").await.unwrap();
        let mut events = queue.subscribe();

        queue
            .add_files(project.id, pdfs(&["a.pdf", "b.pdf", "bad.pdf"]))
            .await
            .unwrap();
        settle(&mut events, project.id).await;

        assert_eq!(outlier_calls(&client), 0);
        let snapshot = queue.project(project.id).await.unwrap();
        assert!(snapshot.theme_description.is_none());
    }

    #[tokio::test]
    async fn test_failed_file_does_not_stop_queue() {
        let client = mock(5);
        let queue = start(client.clone(), ProjectStore::in_memory()).await;
        let project = queue.create_project("Mixed").await.unwrap();
        let mut events = queue.subscribe();

        queue
            .add_files(project.id, pdfs(&["bad.pdf", "a.pdf", "b.pdf", "c.pdf"]))
            .await
            .unwrap();
        settle(&mut events, project.id).await;

        let snapshot = queue.project(project.id).await.unwrap();
        let bad = &snapshot.files[0];
        assert_eq!(bad.status(), AnalysisStatus::Error);
        assert!(bad.error().unwrap_or_default().contains("400"));
        assert!(bad.result().is_none());
        assert_eq!(snapshot.completed_count(), 3);
        assert_eq!(bad.thematic_status(), ThematicStatus::Unknown);
        assert_eq!(outlier_calls(&client), 1);
    }

    #[tokio::test]
    async fn test_stale_outlier_result_is_discarded() {
        let client = mock(50);
        let queue = start(client.clone(), ProjectStore::in_memory()).await;
        let project = queue.create_project("Race").await.unwrap();
        let mut events = queue.subscribe();

        queue
            .add_files(project.id, pdfs(&["a.pdf", "b.pdf", "c.pdf"]))
            .await
            .unwrap();

        loop {
            let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
            if matches!(event, QueueEvent::OutlierPassStarted { .. }) {
                break;
            }
        }
        queue.add_files(project.id, pdfs(&["d.pdf"])).await.unwrap();

        let seen = settle(&mut events, project.id).await;
        assert!(seen
            .iter()
            .any(|e| matches!(e, QueueEvent::OutlierPassDiscarded { generation: 1, .. })));
        assert_eq!(outlier_calls(&client), 2);

        let snapshot = queue.project(project.id).await.unwrap();
        assert!(snapshot.theme_description.is_some());
        assert!(snapshot
            .files
            .iter()
            .all(|f| f.thematic_status() == ThematicStatus::Aligned));
    }

    #[tokio::test]
    async fn test_failed_outlier_pass_waits_for_new_files() {
        let client = Arc::new(MockModelClient::new().with_handler(|request| {
            if request.has_inline_data() {
                respond(request)
            } else {
                Err(LlmError::Provider {
                    status: 500,
                    message: "INTERNAL".into(),
                })
            }
        }));
        let queue = start(client.clone(), ProjectStore::in_memory()).await;
        let project = queue.create_project("Flaky").await.unwrap();
        let mut events = queue.subscribe();

        queue
            .add_files(project.id, pdfs(&["a.pdf", "b.pdf", "c.pdf"]))
            .await
            .unwrap();
        let seen = settle(&mut events, project.id).await;
        assert!(seen
            .iter()
            .any(|e| matches!(e, QueueEvent::OutlierPassFailed { .. })));

        queue.append_messages(project.id, vec![ChatMessage::user("Q")]).await.unwrap();
        queue.project(project.id).await.unwrap();
        assert_eq!(outlier_calls(&client), 1);

        queue.add_files(project.id, pdfs(&["d.pdf"])).await.unwrap();
        settle(&mut events, project.id).await;
        assert_eq!(outlier_calls(&client), 2);
    }

    #[tokio::test]
    async fn test_upload_requires_active_project() {
        let queue = start(mock(0), ProjectStore::in_memory()).await;
        let first = queue.create_project("First").await.unwrap();
        let second = queue.create_project("Second").await.unwrap();

        assert_eq!(queue.active_project().await.unwrap(), Some(second.id));
        assert!(matches!(
            queue.add_files(first.id, pdfs(&["a.pdf"])).await,
            Err(IngestionError::ProjectNotActive(id)) if id == first.id
        ));
        assert!(matches!(
            queue.add_files(Uuid::new_v4(), pdfs(&["a.pdf"])).await,
            Err(IngestionError::ProjectNotFound(_))
        ));

        queue.select_project(first.id).await.unwrap();
        assert_eq!(queue.active_project().await.unwrap(), Some(first.id));
    }

    #[tokio::test]
    async fn test_non_pdf_uploads_are_dropped() {
        let queue = start(mock(5), ProjectStore::in_memory()).await;
        let project = queue.create_project("Filter").await.unwrap();
        let mut events = queue.subscribe();

        let mut batch = pdfs(&["a.pdf", "b.pdf"]);
        batch.push(UploadedFile::new("notes.txt", Some("text/plain".into()), b"hi".to_vec()));

        let outcome = queue.add_files(project.id, batch).await.unwrap();
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.rejected, 1);

        settle(&mut events, project.id).await;
        let snapshot = queue.project(project.id).await.unwrap();
        assert_eq!(snapshot.files.len(), 2);
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let store = ProjectStore::in_memory();
        let client = mock(5);

        let queue = start(client.clone(), store.clone()).await;
        let project = queue.create_project("Persistent").await.unwrap();
        let mut events = queue.subscribe();
        queue.add_files(project.id, pdfs(&["a.pdf"])).await.unwrap();
        settle(&mut events, project.id).await;
        queue
            .append_messages(project.id, vec![ChatMessage::user("Q")])
            .await
            .unwrap();
        queue.set_theme(ThemePreference::Dark).await.unwrap();
        let before = queue.project(project.id).await.unwrap();
        queue.shutdown().await.unwrap();

        let restarted = start(client, store).await;
        let summaries = restarted.list_projects().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].completed_count, 1);
        assert_eq!(restarted.project(project.id).await.unwrap(), before);
        assert_eq!(restarted.theme().await.unwrap(), Some(ThemePreference::Dark));
        assert_eq!(restarted.active_project().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_outlier_passes_run_per_project() {
        let queue = start(Arc::new(SlowOutlierClient), ProjectStore::in_memory()).await;
        let mut events = queue.subscribe();

        let first = queue.create_project("First").await.unwrap();
        queue
            .add_files(first.id, pdfs(&["a.pdf", "b.pdf", "c.pdf"]))
            .await
            .unwrap();
        loop {
            let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
            if event == (QueueEvent::OutlierPassStarted { project_id: first.id, generation: 1 }) {
                break;
            }
        }

        let second = queue.create_project("Second").await.unwrap();
        queue
            .add_files(second.id, pdfs(&["d.pdf", "e.pdf", "f.pdf"]))
            .await
            .unwrap();

        let seen = settle(&mut events, second.id).await;
        assert!(seen.iter().any(|e| matches!(
            e,
            QueueEvent::OutlierPassCompleted { project_id, .. } if *project_id == second.id
        )));
        assert!(queue.project(second.id).await.unwrap().theme_description.is_some());

        let mut later = Vec::new();
        while let Ok(Ok(event)) = tokio::time::timeout(Duration::from_millis(400), events.recv()).await {
            later.push(event);
        }
        assert!(!later.contains(&QueueEvent::Settled { project_id: second.id }));
        assert!(seen
            .iter()
            .chain(&later)
            .any(|e| *e == QueueEvent::Settled { project_id: first.id }));
        assert!(queue.project(first.id).await.unwrap().theme_description.is_some());
    }

    #[tokio::test]
    async fn test_progress_is_stored_while_running() {
        let store = ProjectStore::in_memory();
        let queue = start(mock(5), store.clone()).await;
        let project = queue.create_project("Live").await.unwrap();
        let mut events = queue.subscribe();

        queue
            .add_files(project.id, pdfs(&["a.pdf", "b.pdf", "c.pdf"]))
            .await
            .unwrap();

        let completed = loop {
            let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
            if let QueueEvent::FileCompleted { file_id, .. } = event {
                break file_id;
            }
        };
        // Any reply comes after the previous message was persisted
        queue.active_project().await.unwrap();

        let stored = store.load_projects().await;
        let file = stored[0].file(completed).unwrap();
        assert_eq!(file.status(), AnalysisStatus::Completed);

        settle(&mut events, project.id).await;
        queue.active_project().await.unwrap();

        let stored = store.load_projects().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].theme_description.as_deref(), Some("Soil ecology"));
        assert_eq!(stored[0].count_with_status(AnalysisStatus::Completed), 3);
    }

    #[tokio::test]
    async fn test_handle_reports_closed_queue() {
        let queue = start(mock(0), ProjectStore::in_memory()).await;
        queue.shutdown().await.unwrap();
        let err = tokio_test::assert_err!(queue.list_projects().await);
        assert!(matches!(err, IngestionError::QueueClosed));
    }
}
