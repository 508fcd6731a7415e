//! The confirmation gate.
//!
//! Runs one attempt from question to audit record: schema, optional
//! context, generation, policy evaluation, the confirmation branch and
//! execution. Every attempt ends with exactly one audit write, whatever
//! the outcome.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::attempt::{ConfirmationState, QueryAttempt};
use crate::audit::{AuditRecord, AuditSink, AuditStatus};
use crate::config::Config;
use crate::context::{ContextDoc, ContextRetriever, KeywordRetriever};
use crate::db::{DatabaseClient, QueryResult, Schema};
use crate::error::{GateError, Result};
use crate::llm::{create_client, LlmClient, SqlGenerator};
use crate::safety::{OperationKind, SafetyPolicy};

/// Gate settings, fixed at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct GateSettings {
    pub allow_destructive_queries: bool,
    pub max_query_complexity: u32,
    pub allowed_tables: Vec<String>,
    pub restrict_to_schema_tables: bool,
    pub enable_schema_cache: bool,
    pub enable_context: bool,
    pub max_context_chunks: usize,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl GateSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allow_destructive_queries: config.safety.allow_destructive_queries,
            max_query_complexity: config.safety.max_query_complexity,
            allowed_tables: config.safety.allowed_tables.clone(),
            restrict_to_schema_tables: config.safety.restrict_to_schema_tables,
            enable_schema_cache: config.features.enable_schema_cache,
            enable_context: config.features.enable_context,
            max_context_chunks: config.features.max_context_chunks,
        }
    }
}

/// One request to the gate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateRequest {
    pub query: String,
    pub use_context: bool,
    pub confirm_destructive: bool,
}

impl GateRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn confirmed(mut self) -> Self {
        self.confirm_destructive = true;
        self
    }

    pub fn with_context(mut self) -> Self {
        self.use_context = true;
        self
    }
}

/// Non-fault result of an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// The statement ran.
    Executed {
        sql: String,
        explanation: String,
        confidence: f64,
        result: QueryResult,
        warnings: Vec<String>,
    },
    /// A destructive statement is held until the caller resubmits with
    /// confirmation.
    ConfirmationRequired {
        operation: OperationKind,
        sql: String,
        explanation: String,
        confidence: f64,
        warning: String,
        warnings: Vec<String>,
    },
    /// The statement failed validation and never ran.
    Rejected {
        sql: String,
        explanation: String,
        confidence: f64,
        errors: Vec<String>,
        warnings: Vec<String>,
    },
}

impl GateOutcome {
    pub fn sql(&self) -> &str {
        match self {
            Self::Executed { sql, .. }
            | Self::ConfirmationRequired { sql, .. }
            | Self::Rejected { sql, .. } => sql,
        }
    }

    pub fn audit_status(&self) -> AuditStatus {
        match self {
            Self::Executed { .. } => AuditStatus::Executed,
            Self::ConfirmationRequired { .. } => AuditStatus::AwaitingConfirmation,
            Self::Rejected { .. } => AuditStatus::Rejected,
        }
    }
}

/// Schema introspection cache shared by all attempts.
#[derive(Debug)]
pub struct SchemaCache {
    enabled: bool,
    cached: RwLock<Option<Arc<Schema>>>,
}

impl SchemaCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            cached: RwLock::new(None),
        }
    }

    /// Returns the cached schema, introspecting on a miss.
    pub async fn get(&self, db: &dyn DatabaseClient) -> Result<Arc<Schema>> {
        if self.enabled {
            if let Some(schema) = self.cached.read().await.as_ref() {
                return Ok(Arc::clone(schema));
            }
        }

        let schema = Arc::new(db.introspect_schema().await?);
        debug!(tables = schema.tables.len(), "Introspected schema");

        if self.enabled {
            *self.cached.write().await = Some(Arc::clone(&schema));
        }
        Ok(schema)
    }

    /// Drops the cached schema; the next attempt introspects again.
    pub async fn invalidate(&self) {
        self.cached.write().await.take();
    }

    pub async fn is_cached(&self) -> bool {
        self.cached.read().await.is_some()
    }
}

/// Runs query attempts through the safety policy and the confirmation flow.
pub struct ConfirmationGate {
    db: Arc<dyn DatabaseClient>,
    generator: SqlGenerator,
    retriever: Option<Arc<dyn ContextRetriever>>,
    audit: Arc<dyn AuditSink>,
    policy: SafetyPolicy,
    settings: GateSettings,
    schema_cache: SchemaCache,
}

impl ConfirmationGate {
    pub fn new(
        db: Arc<dyn DatabaseClient>,
        generator: SqlGenerator,
        audit: Arc<dyn AuditSink>,
        settings: GateSettings,
    ) -> Self {
        let policy = SafetyPolicy::new().with_allowed_tables(settings.allowed_tables.clone());
        Self {
            db,
            generator,
            retriever: None,
            audit,
            policy,
            schema_cache: SchemaCache::new(settings.enable_schema_cache),
            settings,
        }
    }

    /// Connects the collaborators named in `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let db: Arc<dyn DatabaseClient> = Arc::from(crate::db::connect(&config.database).await?);
        let client: Arc<dyn LlmClient> = Arc::from(create_client(&config.llm)?);
        let generator = SqlGenerator::new(client).with_query_logging(config.logging.log_queries);
        let audit = crate::audit::from_config(&config.audit).await?;

        info!(
            database = config.database.backend.as_str(),
            llm = %config.llm.provider,
            context = config.features.enable_context,
            "Gate ready"
        );

        Ok(Self::new(db, generator, audit, GateSettings::from_config(config))
            .with_retriever(Arc::new(
                KeywordRetriever::new().with_max_chunks(config.features.max_stored_chunks),
            )))
    }

    /// Wires a context retriever. Ignored unless `enable_context` is set.
    pub fn with_retriever(mut self, retriever: Arc<dyn ContextRetriever>) -> Self {
        if self.settings.enable_context {
            self.retriever = Some(retriever);
        } else {
            debug!("Context retrieval disabled; retriever not wired");
        }
        self
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    pub fn database(&self) -> &Arc<dyn DatabaseClient> {
        &self.db
    }

    pub fn retriever(&self) -> Option<&Arc<dyn ContextRetriever>> {
        self.retriever.as_ref()
    }

    pub fn schema_cache(&self) -> &SchemaCache {
        &self.schema_cache
    }

    /// Current schema, through the cache.
    pub async fn schema(&self) -> Result<Arc<Schema>> {
        self.schema_cache.get(self.db.as_ref()).await.map_err(as_schema_error)
    }

    /// Handles one attempt.
    ///
    /// Returns `Err` for collaborator failures and cancellation. The audit
    /// sink is called exactly once in every case and its own failure is
    /// only logged.
    pub async fn handle(
        &self,
        request: &GateRequest,
        cancel: &CancellationToken,
    ) -> Result<GateOutcome> {
        let start = Instant::now();
        let mut attempt = QueryAttempt::new(&request.query, request.confirm_destructive);

        let result = self.run(&mut attempt, request, cancel).await;

        let status = match &result {
            Ok(outcome) => outcome.audit_status(),
            Err(GateError::Cancelled) => {
                attempt.set_error(&GateError::Cancelled);
                AuditStatus::Cancelled
            }
            Err(e) => {
                attempt.set_error(e);
                if attempt.state() != ConfirmationState::Failed {
                    if let Err(transition) = attempt.transition(ConfirmationState::Failed) {
                        error!("{}", transition);
                    }
                }
                AuditStatus::Failed
            }
        };

        self.write_audit(&attempt.to_record(status)).await;

        let duration_ms = start.elapsed().as_millis();
        let operation = attempt
            .verdict()
            .map_or(OperationKind::Unknown, |v| v.operation);
        match &result {
            Ok(outcome) => info!(
                status = %outcome.audit_status(),
                operation = %operation,
                duration_ms,
                "Query attempt finished"
            ),
            Err(GateError::Cancelled) => warn!(duration_ms, "Query attempt cancelled"),
            Err(e) => error!(duration_ms, category = e.category(), "Query attempt failed: {}", e),
        }

        result
    }

    async fn run(
        &self,
        attempt: &mut QueryAttempt,
        request: &GateRequest,
        cancel: &CancellationToken,
    ) -> Result<GateOutcome> {
        let schema = until_cancelled(cancel, self.schema()).await?;
        if schema.is_empty() {
            return Err(GateError::schema("database schema is empty"));
        }

        let context = self.retrieve_context(request, cancel).await?;

        let generated =
            until_cancelled(cancel, self.generator.generate(&request.query, &schema, &context))
                .await?;
        attempt.set_generated(&generated);

        let allow_destructive =
            self.settings.allow_destructive_queries && request.confirm_destructive;
        let mut verdict = self
            .policy_for(&schema)
            .evaluate(&generated.sql, allow_destructive);

        if verdict.complexity_score > self.settings.max_query_complexity {
            verdict.warnings.push(format!(
                "Query complexity {} exceeds the configured limit of {}",
                verdict.complexity_score, self.settings.max_query_complexity
            ));
        }
        debug!(
            operation = %verdict.operation,
            complexity = verdict.complexity_score,
            valid = verdict.is_valid,
            "Policy evaluated"
        );
        attempt.set_verdict(verdict.clone());

        if verdict.requires_confirmation && !request.confirm_destructive {
            attempt.transition(ConfirmationState::AwaitingConfirmation)?;
            warn!(operation = %verdict.operation, "Holding statement for confirmation");
            return Ok(GateOutcome::ConfirmationRequired {
                operation: verdict.operation,
                warning: format!(
                    "This {} operation will modify data. Please confirm.",
                    verdict.operation
                ),
                sql: generated.sql,
                explanation: generated.explanation,
                confidence: attempt.confidence(),
                warnings: verdict.warnings,
            });
        }

        if !verdict.is_valid {
            attempt.transition(ConfirmationState::Rejected)?;
            warn!(
                operation = %verdict.operation,
                errors = verdict.errors.len(),
                "Statement rejected"
            );
            return Ok(GateOutcome::Rejected {
                errors: verdict.error_messages(),
                sql: generated.sql,
                explanation: generated.explanation,
                confidence: attempt.confidence(),
                warnings: verdict.warnings,
            });
        }

        attempt.transition(ConfirmationState::Approved)?;
        attempt.transition(ConfirmationState::Executed)?;

        let result = until_cancelled(cancel, self.db.execute_query(&generated.sql))
            .await
            .map_err(as_execution_error)?;
        attempt.set_result(&result);

        let mut warnings = verdict.warnings;
        warnings.extend(result.truncation_warning());

        Ok(GateOutcome::Executed {
            sql: generated.sql,
            explanation: generated.explanation,
            confidence: attempt.confidence(),
            result,
            warnings,
        })
    }

    async fn retrieve_context(
        &self,
        request: &GateRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContextDoc>> {
        let retriever = match &self.retriever {
            Some(retriever) if request.use_context && self.settings.enable_context => retriever,
            _ => return Ok(Vec::new()),
        };

        let limit = self.settings.max_context_chunks;
        match until_cancelled(cancel, retriever.retrieve(&request.query, limit)).await {
            Ok(mut docs) => {
                docs.truncate(limit);
                info!(count = docs.len(), "Retrieved context documents");
                Ok(docs)
            }
            Err(GateError::Cancelled) => Err(GateError::Cancelled),
            Err(e) => {
                warn!("Context retrieval failed, continuing without context: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// The configured policy, or one restricted to the schema's tables.
    fn policy_for(&self, schema: &Schema) -> SafetyPolicy {
        if self.policy.allowed_tables().is_none() && self.settings.restrict_to_schema_tables {
            SafetyPolicy::new().with_allowed_tables(schema.table_names())
        } else {
            self.policy.clone()
        }
    }

    async fn write_audit(&self, record: &AuditRecord) {
        if let Err(e) = self.audit.record(record).await {
            error!(status = %record.status, "Failed to write audit record: {}", e);
        }
    }
}

impl std::fmt::Debug for ConfirmationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationGate")
            .field("policy", &self.policy)
            .field("settings", &self.settings)
            .field("context", &self.retriever.is_some())
            .finish_non_exhaustive()
    }
}

/// Races `future` against cancellation; cancellation wins ties.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(GateError::Cancelled),
        result = future => result,
    }
}

fn as_schema_error(e: GateError) -> GateError {
    match e {
        GateError::Schema(_) | GateError::Unavailable(_) | GateError::Cancelled => e,
        other => GateError::schema(other.to_string()),
    }
}

fn as_execution_error(e: GateError) -> GateError {
    match e {
        GateError::Query(_) | GateError::Unavailable(_) | GateError::Cancelled => e,
        other => GateError::query(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::db::{FailingDatabaseClient, FailurePoint, MockDatabaseClient};
    use crate::llm::MockLlmClient;
    use std::time::Duration;

    struct Harness {
        gate: ConfirmationGate,
        db: Arc<MockDatabaseClient>,
        audit: Arc<MemoryAuditSink>,
    }

    fn settings() -> GateSettings {
        GateSettings {
            allow_destructive_queries: true,
            ..GateSettings::default()
        }
    }

    fn harness(llm: MockLlmClient, settings: GateSettings) -> Harness {
        let db = Arc::new(MockDatabaseClient::with_sample_schema());
        let audit = Arc::new(MemoryAuditSink::new());
        let gate = ConfirmationGate::new(
            db.clone(),
            SqlGenerator::new(Arc::new(llm)),
            audit.clone(),
            settings,
        );
        Harness { gate, db, audit }
    }

    async fn handle(gate: &ConfirmationGate, request: GateRequest) -> Result<GateOutcome> {
        gate.handle(&request, &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn test_select_executes() {
        let h = harness(MockLlmClient::new(), settings());
        let outcome = handle(&h.gate, GateRequest::new("Show me all users")).await.unwrap();

        match outcome {
            GateOutcome::Executed { sql, result, .. } => {
                assert_eq!(sql, "SELECT * FROM users");
                assert_eq!(result.row_count, 1);
            }
            other => panic!("Expected Executed, got {other:?}"),
        }
        assert_eq!(h.db.executed(), vec!["SELECT * FROM users".to_string()]);
        let records = h.audit.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AuditStatus::Executed);
        assert_eq!(records[0].row_count, Some(1));
    }

    #[tokio::test]
    async fn test_delete_needs_confirmation_then_runs() {
        let h = harness(MockLlmClient::new(), settings());

        let first = handle(&h.gate, GateRequest::new("Delete the user")).await.unwrap();
        match &first {
            GateOutcome::ConfirmationRequired {
                operation,
                warning,
                ..
            } => {
                assert_eq!(*operation, OperationKind::Delete);
                assert_eq!(warning, "This DELETE operation will modify data. Please confirm.");
            }
            other => panic!("Expected ConfirmationRequired, got {other:?}"),
        }
        assert!(h.db.executed().is_empty());

        let second = handle(&h.gate, GateRequest::new("Delete the user").confirmed())
            .await
            .unwrap();
        assert!(matches!(second, GateOutcome::Executed { .. }));
        assert_eq!(second.sql(), first.sql());
        assert_eq!(h.db.executed(), vec!["DELETE FROM users WHERE id = 1".to_string()]);

        let statuses: Vec<_> = h.audit.records().iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![AuditStatus::AwaitingConfirmation, AuditStatus::Executed]
        );
    }

    #[tokio::test]
    async fn test_default_settings_run_confirmed_delete() {
        let h = harness(MockLlmClient::new(), GateSettings::default());

        let first = handle(&h.gate, GateRequest::new("Delete the user")).await.unwrap();
        assert!(matches!(first, GateOutcome::ConfirmationRequired { .. }));

        let second = handle(&h.gate, GateRequest::new("Delete the user").confirmed())
            .await
            .unwrap();
        assert!(matches!(second, GateOutcome::Executed { .. }));
        assert_eq!(h.db.executed(), vec!["DELETE FROM users WHERE id = 1".to_string()]);
    }

    #[tokio::test]
    async fn test_confirmation_without_global_permission_is_rejected() {
        let settings = GateSettings {
            allow_destructive_queries: false,
            ..GateSettings::default()
        };
        let h = harness(MockLlmClient::new(), settings);
        let outcome = handle(&h.gate, GateRequest::new("Delete the user").confirmed())
            .await
            .unwrap();
        match outcome {
            GateOutcome::Rejected { errors, .. } => {
                assert_eq!(errors, vec!["DELETE operation requires confirmation before it can run"]);
            }
            other => panic!("Expected Rejected, got {other:?}"),
        }
        assert!(h.db.executed().is_empty());
    }

    #[tokio::test]
    async fn test_dangerous_pattern_is_rejected() {
        let llm = MockLlmClient::new().with_sql("sneaky", "SELECT * FROM users -- hi", 0.4);
        let h = harness(llm, settings());
        let outcome = handle(&h.gate, GateRequest::new("sneaky")).await.unwrap();
        match outcome {
            GateOutcome::Rejected { errors, .. } => {
                assert_eq!(errors, vec!["Dangerous pattern detected: line comment"]);
            }
            other => panic!("Expected Rejected, got {other:?}"),
        }
        assert_eq!(h.audit.records()[0].status, AuditStatus::Rejected);
    }

    #[tokio::test]
    async fn test_schema_tables_restrict_statements() {
        let llm = MockLlmClient::new().with_sql("secrets", "SELECT * FROM secrets", 0.9);
        let h = harness(
            llm,
            GateSettings {
                restrict_to_schema_tables: true,
                ..settings()
            },
        );
        match handle(&h.gate, GateRequest::new("secrets")).await.unwrap() {
            GateOutcome::Rejected { errors, .. } => {
                assert_eq!(errors, vec!["Unauthorized table: secrets"]);
            }
            other => panic!("Expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_complexity_limit_adds_warning() {
        let h = harness(
            MockLlmClient::new(),
            GateSettings {
                max_query_complexity: 20,
                ..settings()
            },
        );
        match handle(&h.gate, GateRequest::new("Show me all users")).await.unwrap() {
            GateOutcome::Executed { warnings, .. } => {
                assert_eq!(
                    warnings,
                    vec!["Query complexity 25 exceeds the configured limit of 20"]
                );
            }
            other => panic!("Expected Executed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generation_failure_is_audited_with_zero_confidence() {
        let h = harness(MockLlmClient::failing("rate limited"), settings());
        let err = handle(&h.gate, GateRequest::new("Show me all users"))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Llm(_)));

        let records = h.audit.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AuditStatus::Failed);
        assert_eq!(records[0].confidence, 0.0);
        assert_eq!(records[0].sql, None);
    }

    #[tokio::test]
    async fn test_execution_failure_is_audited_with_sql() {
        let audit = Arc::new(MemoryAuditSink::new());
        let gate = ConfirmationGate::new(
            Arc::new(FailingDatabaseClient::new(FailurePoint::Execute, "relation missing")),
            SqlGenerator::new(Arc::new(MockLlmClient::new())),
            audit.clone(),
            settings(),
        );
        let err = handle(&gate, GateRequest::new("Show me all users"))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Query(_)));

        let records = audit.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AuditStatus::Failed);
        assert_eq!(records[0].sql.as_deref(), Some("SELECT * FROM users"));
        assert!(records[0].confidence > 0.0);
    }

    #[tokio::test]
    async fn test_missing_remote_function_is_unavailable() {
        let gate = ConfirmationGate::new(
            Arc::new(FailingDatabaseClient::new(FailurePoint::Unavailable, "no rpc")),
            SqlGenerator::new(Arc::new(MockLlmClient::new())),
            Arc::new(MemoryAuditSink::new()),
            settings(),
        );
        let err = handle(&gate, GateRequest::new("Show me all users"))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_schema_failure() {
        let audit = Arc::new(MemoryAuditSink::new());
        let gate = ConfirmationGate::new(
            Arc::new(FailingDatabaseClient::new(FailurePoint::Schema, "down")),
            SqlGenerator::new(Arc::new(MockLlmClient::new())),
            audit.clone(),
            settings(),
        );
        let err = handle(&gate, GateRequest::new("Show me all users"))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Schema(_)));
        assert_eq!(audit.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_schema_is_an_error() {
        let gate = ConfirmationGate::new(
            Arc::new(MockDatabaseClient::new()),
            SqlGenerator::new(Arc::new(MockLlmClient::new())),
            Arc::new(MemoryAuditSink::new()),
            settings(),
        );
        let err = handle(&gate, GateRequest::new("Show me all users"))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Schema(_)));
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_change_outcome() {
        let gate = ConfirmationGate::new(
            Arc::new(MockDatabaseClient::with_sample_schema()),
            SqlGenerator::new(Arc::new(MockLlmClient::new())),
            Arc::new(MemoryAuditSink::failing("disk full")),
            settings(),
        );
        let outcome = handle(&gate, GateRequest::new("Show me all users")).await.unwrap();
        assert!(matches!(outcome, GateOutcome::Executed { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_during_generation_is_audited() {
        let h = harness(
            MockLlmClient::new().with_delay(Duration::from_secs(30)),
            settings(),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = h
            .gate
            .handle(&GateRequest::new("Show me all users"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Cancelled));

        let records = h.audit.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AuditStatus::Cancelled);
        assert_eq!(records[0].confidence, 0.0);
        assert!(h.db.executed().is_empty());
    }

    #[tokio::test]
    async fn test_schema_cache() {
        let h = harness(MockLlmClient::new(), settings());
        assert!(!h.gate.schema_cache().is_cached().await);
        h.gate.schema().await.unwrap();
        assert!(h.gate.schema_cache().is_cached().await);
        h.gate.schema_cache().invalidate().await;
        assert!(!h.gate.schema_cache().is_cached().await);
    }

    #[tokio::test]
    async fn test_context_only_when_enabled_and_requested() {
        let retriever = Arc::new(KeywordRetriever::new());
        retriever.add_document("vip users have role vip", None).unwrap();
        let llm = MockLlmClient::new().with_sql("vip", "SELECT * FROM users WHERE role = 'vip'", 0.8);

        let disabled = harness(llm.clone(), settings());
        let gate = disabled.gate.with_retriever(retriever.clone());
        assert!(gate.retriever().is_none());

        let enabled = harness(
            llm,
            GateSettings {
                enable_context: true,
                max_context_chunks: 1,
                ..settings()
            },
        );
        let gate = enabled.gate.with_retriever(retriever);
        assert!(gate.retriever().is_some());
        let outcome = handle(&gate, GateRequest::new("list vip users").with_context())
            .await
            .unwrap();
        assert!(matches!(outcome, GateOutcome::Executed { .. }));
    }

    #[tokio::test]
    async fn test_from_config_with_mock_collaborators() {
        let mut config = Config::default();
        config.database.backend = crate::db::DatabaseBackend::Mock;
        config.llm.provider = crate::llm::LlmProvider::Mock;
        config.audit.enabled = false;
        config.features.enable_context = true;

        let gate = ConfirmationGate::from_config(&config).await.unwrap();
        assert!(gate.retriever().is_some());

        let outcome = handle(&gate, GateRequest::new("Show me all users")).await.unwrap();
        assert_eq!(outcome.sql(), "SELECT * FROM users");
    }
}
