//! One query attempt and its confirmation state machine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::audit::{AuditRecord, AuditStatus};
use crate::db::QueryResult;
use crate::error::{GateError, Result};
use crate::llm::{clamp_confidence, GeneratedSql};
use crate::safety::{OperationKind, ValidationVerdict};

/// Where an attempt stands in the confirmation flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationState {
    Drafted,
    AwaitingConfirmation,
    Approved,
    Rejected,
    Executed,
    Failed,
}

impl ConfirmationState {
    /// Returns true if the gate may move from `self` to `next`.
    pub fn can_transition_to(self, next: ConfirmationState) -> bool {
        use ConfirmationState::*;
        matches!(
            (self, next),
            (Drafted, AwaitingConfirmation)
                | (Drafted, Rejected)
                | (Drafted, Approved)
                | (Drafted, Failed)
                | (Approved, Executed)
                | (Executed, Failed)
        )
    }

    /// Terminal states end the attempt.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::AwaitingConfirmation | Self::Rejected | Self::Executed | Self::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drafted => "drafted",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Executed => "executed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConfirmationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running an approved statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub row_count: usize,
    pub error: Option<String>,
}

/// Mutable record of one user interaction, owned by the gate.
#[derive(Debug, Clone)]
pub struct QueryAttempt {
    question: String,
    confirm_destructive: bool,
    state: ConfirmationState,
    sql: Option<String>,
    explanation: Option<String>,
    confidence: f64,
    verdict: Option<ValidationVerdict>,
    execution: Option<ExecutionOutcome>,
    error: Option<String>,
    started_at: DateTime<Utc>,
}

impl QueryAttempt {
    pub fn new(question: impl Into<String>, confirm_destructive: bool) -> Self {
        Self {
            question: question.into(),
            confirm_destructive,
            state: ConfirmationState::Drafted,
            sql: None,
            explanation: None,
            confidence: 0.0,
            verdict: None,
            execution: None,
            error: None,
            started_at: Utc::now(),
        }
    }

    pub fn state(&self) -> ConfirmationState {
        self.state
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn verdict(&self) -> Option<&ValidationVerdict> {
        self.verdict.as_ref()
    }

    pub fn execution(&self) -> Option<&ExecutionOutcome> {
        self.execution.as_ref()
    }

    /// Moves to `next`, refusing transitions the state machine does not allow.
    pub fn transition(&mut self, next: ConfirmationState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(GateError::internal(format!(
                "illegal confirmation transition {} -> {}",
                self.state, next
            )));
        }
        tracing::trace!(from = %self.state, to = %next, "Attempt transition");
        self.state = next;
        Ok(())
    }

    pub fn set_generated(&mut self, generated: &GeneratedSql) {
        self.sql = Some(generated.sql.clone());
        self.explanation = Some(generated.explanation.clone());
        self.confidence = clamp_confidence(generated.confidence);
    }

    pub fn set_verdict(&mut self, verdict: ValidationVerdict) {
        self.verdict = Some(verdict);
    }

    pub fn set_result(&mut self, result: &QueryResult) {
        self.execution = Some(ExecutionOutcome {
            success: true,
            row_count: result.row_count,
            error: None,
        });
    }

    /// Records a collaborator failure. Execution failures are also kept on
    /// the execution outcome.
    pub fn set_error(&mut self, error: &GateError) {
        let message = error.to_string();
        if self.state == ConfirmationState::Executed {
            self.execution = Some(ExecutionOutcome {
                success: false,
                row_count: 0,
                error: Some(message.clone()),
            });
        }
        self.error = Some(message);
    }

    /// Audit status implied by the current state.
    pub fn audit_status(&self) -> AuditStatus {
        match self.state {
            ConfirmationState::AwaitingConfirmation => AuditStatus::AwaitingConfirmation,
            ConfirmationState::Rejected => AuditStatus::Rejected,
            ConfirmationState::Executed => AuditStatus::Executed,
            ConfirmationState::Drafted
            | ConfirmationState::Approved
            | ConfirmationState::Failed => AuditStatus::Failed,
        }
    }

    /// Freezes the attempt into an audit record.
    pub fn to_record(&self, status: AuditStatus) -> AuditRecord {
        let verdict = self.verdict.as_ref();
        AuditRecord {
            question: self.question.clone(),
            sql: self.sql.clone(),
            explanation: self.explanation.clone(),
            confidence: self.confidence,
            operation: verdict.map_or(OperationKind::Unknown, |v| v.operation),
            status,
            confirm_destructive: self.confirm_destructive,
            errors: verdict.map(|v| v.error_messages()).unwrap_or_default(),
            warnings: verdict.map(|v| v.warnings.clone()).unwrap_or_default(),
            complexity_score: verdict.map(|v| v.complexity_score),
            row_count: self.execution.as_ref().map(|e| e.row_count),
            error_message: self.error.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::SafetyPolicy;
    use ConfirmationState::*;

    const ALL: [ConfirmationState; 6] = [
        Drafted,
        AwaitingConfirmation,
        Approved,
        Rejected,
        Executed,
        Failed,
    ];

    #[test]
    fn test_terminal_states_have_no_exit_except_execution_failure() {
        for from in ALL {
            for to in ALL {
                if from.is_terminal() && from.can_transition_to(to) {
                    assert_eq!((from, to), (Executed, Failed));
                }
            }
        }
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let mut attempt = QueryAttempt::new("Show users", false);
        let err = attempt.transition(Executed).unwrap_err();
        assert!(matches!(err, GateError::Internal(_)));
        assert_eq!(attempt.state(), Drafted);

        attempt.transition(AwaitingConfirmation).unwrap();
        assert!(attempt.transition(Approved).is_err());
        assert_eq!(attempt.state(), AwaitingConfirmation);
    }

    #[test]
    fn test_happy_path() {
        let mut attempt = QueryAttempt::new("Show users", false);
        attempt.transition(Approved).unwrap();
        attempt.transition(Executed).unwrap();
        attempt.set_result(&QueryResult::new());
        assert_eq!(attempt.audit_status(), AuditStatus::Executed);
        assert_eq!(attempt.execution().map(|e| e.success), Some(true));
    }

    #[test]
    fn test_record_carries_verdict_and_confidence() {
        let mut attempt = QueryAttempt::new("Delete user 5", false);
        attempt.set_generated(&GeneratedSql {
            sql: "DELETE FROM users WHERE id = 5".to_string(),
            explanation: "Deletes user 5".to_string(),
            confidence: 1.7,
        });
        attempt.set_verdict(SafetyPolicy::new().evaluate("DELETE FROM users WHERE id = 5", false));
        attempt.transition(AwaitingConfirmation).unwrap();

        let record = attempt.to_record(attempt.audit_status());
        assert_eq!(record.status, AuditStatus::AwaitingConfirmation);
        assert_eq!(record.confidence, 1.0);
        assert_eq!(record.operation, OperationKind::Delete);
        assert_eq!(record.errors.len(), 1);
        assert_eq!(record.complexity_score, Some(0));
        assert!(record.finished_at >= record.started_at);
    }

    #[test]
    fn test_failure_before_generation_has_zero_confidence() {
        let mut attempt = QueryAttempt::new("Show users", false);
        attempt.transition(Failed).unwrap();
        attempt.set_error(&GateError::llm("timeout"));
        let record = attempt.to_record(attempt.audit_status());
        assert_eq!(record.status, AuditStatus::Failed);
        assert_eq!(record.confidence, 0.0);
        assert_eq!(record.sql, None);
        assert_eq!(record.operation, OperationKind::Unknown);
        assert!(record.error_message.unwrap().contains("timeout"));
    }

    #[test]
    fn test_execution_failure_is_kept() {
        let mut attempt = QueryAttempt::new("Show users", false);
        attempt.transition(Approved).unwrap();
        attempt.transition(Executed).unwrap();
        attempt.set_error(&GateError::query("relation does not exist"));
        attempt.transition(Failed).unwrap();
        let execution = attempt.execution().unwrap();
        assert!(!execution.success);
        assert!(execution.error.as_deref().unwrap().contains("relation"));
    }
}
