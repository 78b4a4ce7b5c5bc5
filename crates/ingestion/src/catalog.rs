//! In-memory project collection mirrored to the store

use paperlens_common::models::{AnalysisStatus, Project, ProjectSummary};
use paperlens_common::store::ProjectStore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Error recorded on files whose bytes did not survive a restart
pub const PAYLOAD_UNAVAILABLE: &str = "File payload unavailable after reload; upload the file again";

pub struct ProjectCatalog {
    projects: Vec<Project>,
    store: ProjectStore,
    dirty: bool,
}

impl ProjectCatalog {
    /// Load every stored project.
    ///
    /// Files left pending or processing by a previous run have no bytes any
    /// more; they are marked failed so the queue does not wait on them.
    pub async fn load(store: ProjectStore) -> Self {
        let mut projects = store.load_projects().await;
        let mut repaired = 0usize;

        for project in &mut projects {
            for file in &mut project.files {
                let unfinished = matches!(
                    file.status(),
                    AnalysisStatus::Pending | AnalysisStatus::Processing
                );
                if unfinished && file.payload.is_none() {
                    file.mark_failed(PAYLOAD_UNAVAILABLE);
                    repaired += 1;
                }
            }
        }

        if repaired > 0 {
            warn!(files = repaired, "Marked unfinished files without payload as failed");
        }
        info!(projects = projects.len(), backend = store.backend_name(), "Project catalog loaded");

        Self {
            projects,
            store,
            dirty: repaired > 0,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// Mutable access; the catalog is persisted on the next [`Self::persist`]
    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Project> {
        let project = self.projects.iter_mut().find(|p| p.id == id)?;
        self.dirty = true;
        Some(project)
    }

    pub fn insert(&mut self, project: Project) {
        self.projects.push(project);
        self.dirty = true;
    }

    pub fn summaries(&self) -> Vec<ProjectSummary> {
        self.projects.iter().map(Project::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    /// Write the collection if anything changed since the last write.
    ///
    /// Failures are logged and retried on the next change.
    pub async fn persist(&mut self) {
        if !self.dirty {
            return;
        }
        match self.store.save_projects(&self.projects).await {
            Ok(()) => self.dirty = false,
            Err(e) => error!(error = %e, "Failed to persist projects"),
        }
    }
}
