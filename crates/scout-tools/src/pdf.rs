use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use scout_core::{Error, Tool, ToolOutput};

use crate::http::{truncate_output, HttpClient};
use crate::web::MAX_PAGE_CHARS;

/// Pages read from the start of a document.
pub const MAX_PDF_PAGES: usize = 20;

pub struct ExtractPdfTool {
    http: Arc<HttpClient>,
}

impl ExtractPdfTool {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    async fn extract(&self, url: &str) -> Result<String, Error> {
        let bytes = self.http.get_bytes(url).await?;
        debug!(url, bytes = bytes.len(), "PDF downloaded");
        let pages = extract_pages(bytes).await?;

        let mut text = format!("Source PDF: {}\n\n", url);
        for page in pages.iter().take(MAX_PDF_PAGES) {
            text.push_str(page);
            text.push_str("\n\n");
        }
        Ok(truncate_output(&text, MAX_PAGE_CHARS))
    }
}

/// Extract the text of every page. Parsing runs on the blocking pool and a
/// panicking parser surfaces as an error.
pub async fn extract_pages(bytes: Vec<u8>) -> Result<Vec<String>, Error> {
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
        .await
        .map_err(|e| {
            warn!(error = %e, "PDF parser aborted");
            Error::tool("extract_pdf", format!("PDF parser aborted: {}", e))
        })?
        .map_err(|e| Error::tool("extract_pdf", format!("not a readable PDF: {}", e)))
}

#[async_trait]
impl Tool for ExtractPdfTool {
    fn name(&self) -> &str {
        "extract_pdf"
    }

    fn description(&self) -> &str {
        "Extract text from a PDF at the given URL."
    }

    fn input_description(&self) -> &str {
        "The URL of the PDF"
    }

    async fn invoke(&self, input: &str) -> ToolOutput {
        match self.extract(input.trim()).await {
            Ok(text) => ToolOutput::success(text),
            Err(e) => ToolOutput::error(format!("Error extracting PDF content: {}", e)),
        }
    }
}
