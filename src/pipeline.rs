// src/pipeline.rs

use crate::error::Result;
use crate::fields::{InvoiceRecord, MatchMode, extract_fields_with};
use crate::llm_extract::LanguageModel;
use crate::pdf_extract::TextSource;
use crate::sheets::RowSink;
use tracing::{Instrument, error, info, info_span};

/// One uploaded invoice.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// What happened to a single document.
#[derive(Debug)]
pub struct DocumentOutcome {
    pub name: String,
    /// The extracted record, or why extraction failed.
    pub result: std::result::Result<InvoiceRecord, String>,
    /// Sinks that rejected the row, as `"<sink>: <error>"`.
    pub sink_errors: Vec<String>,
}

impl DocumentOutcome {
    pub fn is_clean(&self) -> bool {
        self.result.is_ok() && self.sink_errors.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<DocumentOutcome>,
    /// Sinks whose `finish` failed, as `"<sink>: <error>"`.
    pub finish_errors: Vec<String>,
}

impl RunSummary {
    /// Documents that failed or were not written to every sink.
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_clean()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.failures() == 0 && self.finish_errors.is_empty()
    }
}

/// Text source → model → field extraction, one document at a time.
pub struct Pipeline<'a> {
    source: &'a dyn TextSource,
    model: &'a dyn LanguageModel,
    match_mode: MatchMode,
}

impl<'a> Pipeline<'a> {
    pub fn new(source: &'a dyn TextSource, model: &'a dyn LanguageModel, match_mode: MatchMode) -> Self {
        Self {
            source,
            model,
            match_mode,
        }
    }

    /// Extract the record for one document without touching any sink.
    pub async fn record_for(&self, doc: &Document) -> Result<InvoiceRecord> {
        let text = self.source.read_text(&doc.name, &doc.bytes).await?;
        info!(chars = text.len(), "Document text ready");
        let reply = self.model.generate(&text).await?;
        Ok(extract_fields_with(&reply, self.match_mode))
    }

    /// Process every document in order, appending each record to every
    /// sink, then finish every sink. Document, append and finish failures
    /// are all recorded in the summary.
    pub async fn run(&self, documents: &[Document], sinks: &mut [Box<dyn RowSink>]) -> RunSummary {
        let mut summary = RunSummary::default();

        for doc in documents {
            let span = info_span!("document", name = %doc.name);
            let outcome = self.process(doc, sinks).instrument(span).await;
            summary.outcomes.push(outcome);
        }

        for sink in sinks.iter_mut() {
            if let Err(e) = sink.finish().await {
                error!(sink = sink.name(), error = %e, "Sink finish failed");
                summary.finish_errors.push(format!("{}: {e}", sink.name()));
            }
        }

        info!(
            documents = summary.outcomes.len(),
            failures = summary.failures(),
            finish_errors = summary.finish_errors.len(),
            "Run complete"
        );
        summary
    }

    async fn process(&self, doc: &Document, sinks: &mut [Box<dyn RowSink>]) -> DocumentOutcome {
        let record = match self.record_for(doc).await {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "Extraction failed, skipping document");
                return DocumentOutcome {
                    name: doc.name.clone(),
                    result: Err(e.to_string()),
                    sink_errors: Vec::new(),
                };
            }
        };

        let (filled, total) = record.coverage();
        info!(
            filled,
            total,
            invoice_number = ?record.get("Invoice Number"),
            vendor = ?record.get("Vendor Name"),
            amount = ?record.get("Invoice Amount"),
            "Fields extracted"
        );

        let row = record.to_row();
        let mut sink_errors = Vec::new();
        for sink in sinks.iter_mut() {
            if let Err(e) = sink.append_row(&row).await {
                error!(sink = sink.name(), error = %e, "Row append failed");
                sink_errors.push(format!("{}: {e}", sink.name()));
            }
        }

        DocumentOutcome {
            name: doc.name.clone(),
            result: Ok(record),
            sink_errors,
        }
    }
}
