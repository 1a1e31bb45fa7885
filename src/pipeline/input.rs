//! Uploaded documents as the pipeline sees them.
//!
//! The HTTP layer hands over each multipart file part as an
//! [`UploadedDocument`]: its filename plus the raw bytes, already fully
//! buffered. Content is not required to be a PDF; the OCR provider is the
//! authority on what it can read. We only sniff the `%PDF` magic bytes so a
//! mismatch shows up in the logs next to the provider's eventual error.

use tracing::{debug, warn};

/// One uploaded file.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    pub filename: String,
    pub content: Vec<u8>,
}

impl std::fmt::Debug for UploadedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedDocument")
            .field("filename", &self.filename)
            .field("bytes", &self.content.len())
            .finish()
    }
}

impl UploadedDocument {
    /// Wrap an upload, naming it `document-{index}` when the part had no filename.
    pub fn new(index: usize, filename: Option<&str>, content: Vec<u8>) -> Self {
        let filename = match filename {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => format!("document-{index}"),
        };
        let doc = Self { filename, content };
        if doc.looks_like_pdf() {
            debug!("Received PDF '{}' ({} bytes)", doc.filename, doc.content.len());
        } else {
            warn!(
                "Upload '{}' does not start with %PDF (first bytes: {:?})",
                doc.filename,
                doc.magic()
            );
        }
        doc
    }

    /// Whether the content starts with the PDF magic bytes.
    pub fn looks_like_pdf(&self) -> bool {
        self.content.starts_with(b"%PDF")
    }

    fn magic(&self) -> &[u8] {
        &self.content[..self.content.len().min(4)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unnamed_parts_get_positional_names() {
        let doc = UploadedDocument::new(2, None, b"%PDF-1.7".to_vec());
        assert_eq!(doc.filename, "document-2");
        let doc = UploadedDocument::new(0, Some("  "), Vec::new());
        assert_eq!(doc.filename, "document-0");
    }

    #[test]
    fn sniffs_pdf_magic() {
        assert!(UploadedDocument::new(0, Some("a.pdf"), b"%PDF-1.4\n".to_vec()).looks_like_pdf());
        assert!(!UploadedDocument::new(0, Some("a.txt"), b"hello".to_vec()).looks_like_pdf());
        assert!(!UploadedDocument::new(0, Some("empty"), Vec::new()).looks_like_pdf());
    }

    #[test]
    fn debug_omits_content() {
        let doc = UploadedDocument::new(0, Some("scan.pdf"), vec![b'x'; 1024]);
        let dbg = format!("{doc:?}");
        assert!(dbg.contains("1024"));
        assert!(!dbg.contains("xxxx"));
    }
}
