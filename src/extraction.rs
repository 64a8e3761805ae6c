//! Text extraction for uploaded Markdown and plain-text files.

use std::path::Path;

use async_trait::async_trait;

use crate::workflow::{ExtractionError, Extractor, RawDocument};

const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Extracts markdown and plain-text uploads as-is.
///
/// PDF and office formats are rendered upstream; anything else is rejected.
#[derive(Debug, Clone, Copy)]
pub struct PlainTextExtractor {
    max_bytes: usize,
}

impl PlainTextExtractor {
    /// Extractor that refuses uploads larger than `max_bytes`.
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl Extractor for PlainTextExtractor {
    async fn extract(&self, input: &RawDocument) -> Result<String, ExtractionError> {
        let extension = Path::new(&input.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ExtractionError::UnsupportedType(input.file_name.clone()));
        }

        if input.bytes.len() > self.max_bytes {
            return Err(ExtractionError::TooLarge {
                size: input.bytes.len(),
                limit: self.max_bytes,
            });
        }

        let text = String::from_utf8(input.bytes.clone())?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text).trim();
        if text.is_empty() {
            return Err(ExtractionError::Empty);
        }

        tracing::debug!(file = %input.file_name, chars = text.len(), "Extracted text");
        Ok(text.replace("\r\n", "\n"))
    }
}
