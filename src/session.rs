//! One upload session: the loaded document, its mapping and the target schema.
//!
//! The session owns its [`CsvDocument`] and [`MappingTable`] exclusively.
//! Loading a new file replaces both together, and a failed parse leaves the
//! previous state untouched.

use log::{info, warn};

use crate::{
    bulk::{BulkIngest, BulkApi, BulkJob, Clock, JobOutcome, Operation, PollPolicy},
    config::IngestConfig,
    error::{IngestError, IngestResult, MappingError},
    mapping::MappingTable,
    matching::{self, MatchSuggestion},
    payload,
    schema::{SchemaApi, TargetField},
    suggest::{self, FieldCreationReport, FieldSuggestion},
    tokenizer::CsvDocument,
};

pub struct UploadSession {
    object: String,
    operation: Operation,
    document: Option<CsvDocument>,
    mapping: MappingTable,
    fields: Vec<TargetField>,
    poll: PollPolicy,
    last_job: Option<BulkJob>,
}

impl UploadSession {
    pub fn new(object: impl Into<String>, operation: Operation) -> Self {
        Self {
            object: object.into(),
            operation,
            document: None,
            mapping: MappingTable::new(),
            fields: Vec::new(),
            poll: PollPolicy::default(),
            last_job: None,
        }
    }

    /// Session for the configured object, operation and poll policy.
    pub fn from_config(config: &IngestConfig) -> Self {
        let mut session = Self::new(&config.object, config.operation);
        session.poll = config.poll;
        session
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn document(&self) -> Option<&CsvDocument> {
        self.document.as_ref()
    }

    pub fn mapping(&self) -> &MappingTable {
        &self.mapping
    }

    pub fn mapping_mut(&mut self) -> &mut MappingTable {
        &mut self.mapping
    }

    pub fn fields(&self) -> &[TargetField] {
        &self.fields
    }

    pub fn set_fields(&mut self, fields: Vec<TargetField>) {
        self.fields = fields;
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.poll
    }

    pub fn set_poll_policy(&mut self, policy: PollPolicy) {
        self.poll = policy;
    }

    /// Job of the most recent upload attempt that got past submission.
    pub fn last_job(&self) -> Option<&BulkJob> {
        self.last_job.as_ref()
    }

    /// Parses `text` and, on success, replaces the document and clears the mapping.
    pub fn load_text(&mut self, text: &str) -> IngestResult<&CsvDocument> {
        let parsed = CsvDocument::parse(text)?;
        info!(
            "Loaded {} column(s) and {} row(s)",
            parsed.headers().len(),
            parsed.row_count()
        );
        self.mapping = MappingTable::new();
        Ok(self.document.insert(parsed))
    }

    /// Fetches the object's fields from the schema capability.
    pub async fn refresh_fields(&mut self, api: &dyn SchemaApi) -> IngestResult<&[TargetField]> {
        let fields = api.list_fields(&self.object).await.map_err(|err| match err {
            IngestError::Schema(_) => err,
            other => IngestError::Schema(other.to_string()),
        })?;
        info!("Described {} field(s) on {}", fields.len(), self.object);
        self.fields = fields;
        Ok(&self.fields)
    }

    fn writable_fields(&self) -> Vec<TargetField> {
        self.fields
            .iter()
            .filter(|field| self.operation.writes(field))
            .cloned()
            .collect()
    }

    /// Match suggestions for every loaded header against the writable fields.
    pub fn match_suggestions(&self) -> IngestResult<Vec<MatchSuggestion>> {
        let doc = self.require_document()?;
        Ok(matching::suggest_mappings(
            doc.headers(),
            &self.writable_fields(),
        ))
    }

    /// Applies match suggestions to unassigned headers. Returns how many were applied.
    pub fn auto_map(&mut self) -> IngestResult<usize> {
        let suggestions = self.match_suggestions()?;
        Ok(self.mapping.auto_assign(&suggestions))
    }

    pub fn validate(&self) -> Result<(), MappingError> {
        self.mapping.validate(&self.fields, self.operation)
    }

    /// New-field proposals for headers left unmapped.
    pub fn field_suggestions(&self) -> IngestResult<Vec<FieldSuggestion>> {
        let doc = self.require_document()?;
        Ok(suggest::suggest_fields(doc, &self.mapping, &self.fields))
    }

    /// Creates the given fields, then re-reads the schema so new fields become
    /// mappable. Per-field failures and a failed re-read are returned in the
    /// report; the report itself is always returned.
    pub async fn create_fields(
        &mut self,
        api: &dyn SchemaApi,
        suggestions: &[FieldSuggestion],
    ) -> FieldCreationReport {
        let mut report = suggest::create_fields(api, &self.object, suggestions).await;
        if !report.created.is_empty()
            && let Err(err) = self.refresh_fields(api).await
        {
            warn!(
                "Fields were created on {} but re-reading them failed: {err}",
                self.object
            );
            report.refresh_error = Some(err);
        }
        report
    }

    pub fn render_payload(&self) -> IngestResult<String> {
        payload::render_payload(self.document.as_ref(), &self.mapping)
    }

    /// Validates, renders and runs a bulk job for the loaded document under
    /// the session's poll policy.
    pub async fn upload(&mut self, api: &dyn BulkApi, clock: &dyn Clock) -> IngestResult<JobOutcome> {
        let payload = self.render_payload()?;
        self.validate()?;
        let mut ingest = BulkIngest::new(api, clock, self.poll);
        let result = ingest.run(&self.object, self.operation, &payload).await;
        self.last_job = ingest.job().cloned();
        result
    }

    fn require_document(&self) -> IngestResult<&CsvDocument> {
        self.document
            .as_ref()
            .ok_or_else(|| IngestError::State("no CSV document has been loaded".to_string()))
    }
}
