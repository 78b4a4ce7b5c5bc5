//! Upload boundary
//!
//! Only PDFs enter a project. Anything else in a batch is dropped quietly.

use paperlens_common::models::{AnalyzedFile, FilePayload};
use serde::Serialize;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

use crate::errors::IngestionError;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

const GENERIC_MEDIA_TYPE: &str = "application/octet-stream";

/// One file as received from a client, before filtering
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }

    /// Declared media type, falling back to the `.pdf` extension when the
    /// client sent no type or a generic one
    pub fn is_pdf(&self) -> bool {
        let declared = self
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty());

        match declared.as_deref() {
            Some(PDF_MEDIA_TYPE) => true,
            None | Some(GENERIC_MEDIA_TYPE) => has_pdf_extension(&self.file_name),
            Some(_) => false,
        }
    }
}

fn has_pdf_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Result of adding a batch to a project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFilesOutcome {
    /// Ids of the new pending files, in upload order
    pub accepted: Vec<Uuid>,
    /// Files dropped because they are not PDFs
    pub rejected: usize,
}

/// Turn the PDFs of a batch into pending files; returns them with the
/// number of files dropped
pub fn accept_pdfs(files: Vec<UploadedFile>) -> (Vec<AnalyzedFile>, usize) {
    let total = files.len();
    let accepted: Vec<AnalyzedFile> = files
        .into_iter()
        .filter(|file| {
            let keep = file.is_pdf();
            if !keep {
                debug!(
                    file_name = %file.file_name,
                    content_type = ?file.content_type,
                    "Dropping non-PDF upload"
                );
            }
            keep
        })
        .map(|file| AnalyzedFile::pending(file.file_name, FilePayload::new(file.bytes, PDF_MEDIA_TYPE)))
        .collect();

    let rejected = total - accepted.len();
    (accepted, rejected)
}

/// Read every file of a directory, sorted by name. Filtering happens when
/// the batch is added.
pub async fn read_dir_files(dir: &Path) -> Result<Vec<UploadedFile>, IngestionError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(&path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        files.push(UploadedFile::new(file_name, None, bytes));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperlens_common::models::{AnalysisStatus, Project};

    fn upload(name: &str, content_type: Option<&str>) -> UploadedFile {
        UploadedFile::new(name, content_type.map(str::to_string), b"%PDF-1.7".to_vec())
    }

    #[test]
    fn test_declared_type_wins() {
        assert!(upload("paper.bin", Some("application/pdf")).is_pdf());
        assert!(upload("paper.pdf", Some("Application/PDF; charset=binary")).is_pdf());
        assert!(!upload("paper.pdf", Some("text/plain")).is_pdf());
    }

    #[test]
    fn test_extension_fallback() {
        assert!(upload("paper.PDF", None).is_pdf());
        assert!(upload("paper.pdf", Some("application/octet-stream")).is_pdf());
        assert!(!upload("notes.txt", None).is_pdf());
        assert!(!upload("pdf", None).is_pdf());
    }

    #[test]
    fn test_batch_with_text_file_adds_two_pending_and_resets_theme() {
        let mut project = Project::new("Mixed batch");
        project.theme_description = Some("Ecology".into());

        let (accepted, rejected) = accept_pdfs(vec![
            upload("a.pdf", Some("application/pdf")),
            upload("notes.txt", Some("text/plain")),
            upload("b.pdf", Some("application/pdf")),
        ]);
        assert_eq!(rejected, 1);

        assert_eq!(project.add_files(accepted), 2);
        assert_eq!(project.count_with_status(AnalysisStatus::Pending), 2);
        assert!(project.theme_description.is_none());
        assert_eq!(project.files[1].file_name, "b.pdf");
        assert_eq!(
            project.files[0].payload.as_ref().map(|p| p.media_type()),
            Some(PDF_MEDIA_TYPE)
        );
    }

    #[tokio::test]
    async fn test_read_dir_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"%PDF-b").unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"%PDF-a").unwrap();
        std::fs::write(dir.path().join("readme.md"), b"# hi").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let files = tokio_test::assert_ok!(read_dir_files(dir.path()).await);
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf", "readme.md"]);

        let (accepted, rejected) = accept_pdfs(files);
        assert_eq!(accepted.len(), 2);
        assert_eq!(rejected, 1);
    }
}
