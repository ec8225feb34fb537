use std::fmt::Write;
use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::extract::{classify, extract, Classification};

#[derive(Clone, Debug)]
pub struct IngestLimits {
    pub max_depth: usize,
    pub max_file_bytes: u64,
}

impl Default for IngestLimits {
    fn default() -> Self {
        IngestLimits {
            max_depth: 16,
            max_file_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Per-file outcome counts of one ingestion run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub loaded: usize,
    pub failed: usize,
    pub unsupported: usize,
    pub oversized: usize,
    pub ignored: usize,
}

/// Immutable snapshot of the reference corpus.
#[derive(Clone, Debug, Default)]
pub struct KnowledgeBase {
    text: String,
    report: IngestReport,
}

impl KnowledgeBase {
    pub fn build(root: &Path, limits: &IngestLimits) -> Self {
        let mut knowledge_base = KnowledgeBase::default();

        if !root.exists() {
            warn!("Knowledge base directory {} does not exist", root.display());
            return knowledge_base;
        }

        info!("Scanning knowledge base directory {}", root.display());

        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(limits.max_depth)
            .follow_links(false);

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot read knowledge base entry: {}", e);
                    knowledge_base.report.failed += 1;
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                debug!("Entering directory {}", entry.path().display());
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            knowledge_base.ingest_file(root, entry.path(), limits);
        }

        info!(
            "Knowledge base ready: {} chars, {} loaded, {} failed, {} unsupported, {} oversized",
            knowledge_base.text.chars().count(),
            knowledge_base.report.loaded,
            knowledge_base.report.failed,
            knowledge_base.report.unsupported,
            knowledge_base.report.oversized,
        );

        knowledge_base
    }

    fn ingest_file(&mut self, root: &Path, path: &Path, limits: &IngestLimits) {
        let kind = match classify(path) {
            Classification::Supported(kind) => kind,
            Classification::Unsupported => {
                warn!("Skipping {}: legacy format, convert it to .docx", path.display());
                self.report.unsupported += 1;
                return;
            }
            Classification::Ignored => {
                self.report.ignored += 1;
                return;
            }
        };

        match std::fs::metadata(path) {
            Ok(metadata) if metadata.len() > limits.max_file_bytes => {
                warn!(
                    "Skipping {}: {} bytes exceeds the {} byte limit",
                    path.display(),
                    metadata.len(),
                    limits.max_file_bytes
                );
                self.report.oversized += 1;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Cannot stat {}: {}", path.display(), e);
                self.report.failed += 1;
                return;
            }
        }

        match extract(path, kind) {
            Ok(text) => {
                let source = path.strip_prefix(root).unwrap_or(path);
                let _ = write!(
                    self.text,
                    "\n[Source: {} file {}]\n{}\n",
                    kind.label(),
                    source.display(),
                    text
                );
                self.report.loaded += 1;
                debug!("Loaded {} file {}", kind.label(), source.display());
            }
            Err(e) => {
                warn!("Failed to read {} file {}: {}", kind.label(), path.display(), e);
                self.report.failed += 1;
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn report(&self) -> &IngestReport {
        &self.report
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::knowledge::extract::tests::{write_docx, write_pdf};

    fn source_tags(text: &str) -> usize {
        text.matches("[Source: ").count()
    }

    #[test]
    fn missing_root_yields_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let knowledge_base = KnowledgeBase::build(&dir.path().join("nope"), &IngestLimits::default());

        assert!(knowledge_base.is_empty());
        assert_eq!(knowledge_base.text(), "");
        assert_eq!(knowledge_base.report(), &IngestReport::default());
    }

    #[test]
    fn one_block_per_extracted_file_across_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("2024").join("majors");
        fs::create_dir_all(&nested).unwrap();

        write_docx(&dir.path().join("overview.docx"), &["Khoa Công nghệ Thông tin"]);
        write_docx(&nested.join("ai.docx"), &["Ngành Trí tuệ nhân tạo", "Chỉ tiêu: 100"]);
        fs::write(dir.path().join("legacy.doc"), b"binary").unwrap();
        fs::write(nested.join("notes.txt"), b"ignored").unwrap();
        fs::write(nested.join("broken.pdf"), b"garbage").unwrap();

        let knowledge_base = KnowledgeBase::build(dir.path(), &IngestLimits::default());
        let text = knowledge_base.text();

        assert_eq!(source_tags(text), 2);
        assert!(text.contains("[Source: Word file overview.docx]\nKhoa Công nghệ Thông tin\n"));
        assert!(text.contains("Ngành Trí tuệ nhân tạo\nChỉ tiêu: 100"));
        assert!(!text.contains("ignored"));
        assert!(!text.contains("broken.pdf"));

        assert_eq!(
            knowledge_base.report(),
            &IngestReport {
                loaded: 2,
                failed: 1,
                unsupported: 1,
                oversized: 0,
                ignored: 1,
            }
        );
    }

    #[test]
    fn pdf_files_load_as_tagged_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("diem-chuan");
        fs::create_dir_all(&nested).unwrap();
        write_pdf(&nested.join("2024.pdf"), &[Some("CNTT 25.5"), None, Some("AI 26.1")]);

        let knowledge_base = KnowledgeBase::build(dir.path(), &IngestLimits::default());
        let expected_source = Path::new("diem-chuan").join("2024.pdf");

        assert_eq!(
            knowledge_base.text(),
            format!(
                "\n[Source: PDF file {}]\nCNTT 25.5\nAI 26.1\n\n",
                expected_source.display()
            )
        );
        assert_eq!(knowledge_base.report().loaded, 1);
        assert_eq!(knowledge_base.report().failed, 0);
    }

    #[test]
    fn depth_limit_stops_the_walk() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("a").join("b");
        fs::create_dir_all(&deep).unwrap();
        write_docx(&dir.path().join("top.docx"), &["top"]);
        write_docx(&deep.join("deep.docx"), &["deep"]);

        let limits = IngestLimits {
            max_depth: 2,
            ..Default::default()
        };
        let knowledge_base = KnowledgeBase::build(dir.path(), &limits);

        assert_eq!(source_tags(knowledge_base.text()), 1);
        assert!(knowledge_base.text().contains("top"));
        assert!(!knowledge_base.text().contains("deep"));
    }

    #[test]
    fn oversized_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_docx(&dir.path().join("big.docx"), &["x".repeat(4096).as_str()]);

        let limits = IngestLimits {
            max_file_bytes: 16,
            ..Default::default()
        };
        let knowledge_base = KnowledgeBase::build(dir.path(), &limits);

        assert!(knowledge_base.is_empty());
        assert_eq!(knowledge_base.report().oversized, 1);
    }
}
