//! Safety policy evaluation.
//!
//! Composes classification, pattern scanning, complexity scoring and the
//! optional table allow-list into a single [`ValidationVerdict`].

use std::collections::BTreeSet;

use tracing::{debug, trace};

use super::{
    complexity_score, scan, ClassifyError, OperationKind, Statement, ValidationVerdict, Violation,
};

/// Read-only safety policy.
///
/// Evaluation is pure: the same SQL and permission always produce the same
/// verdict, and a policy can be shared across threads without locking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafetyPolicy {
    allowed_tables: Option<BTreeSet<String>>,
}

impl SafetyPolicy {
    /// Creates a policy with no table allow-list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts statements to the given tables.
    ///
    /// An empty list leaves the policy unrestricted.
    pub fn with_allowed_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tables: BTreeSet<String> = tables.into_iter().map(Into::into).collect();
        self.allowed_tables = (!tables.is_empty()).then_some(tables);
        self
    }

    /// Returns the allow-list, if one is configured.
    pub fn allowed_tables(&self) -> Option<&BTreeSet<String>> {
        self.allowed_tables.as_ref()
    }

    /// Evaluates one SQL string.
    ///
    /// A destructive statement evaluated without `allow_destructive` comes
    /// back invalid with `requires_confirmation` set and a single error;
    /// callers re-evaluate with permission once a human has confirmed.
    pub fn evaluate(&self, sql: &str, allow_destructive: bool) -> ValidationVerdict {
        trace!(sql = %sql, "Evaluating SQL");

        let statement = match Statement::parse(sql) {
            Ok(statement) => statement,
            Err(ClassifyError::Parse(reason)) => {
                debug!(reason = %reason, "SQL rejected: parse failure");
                return ValidationVerdict::rejected(OperationKind::Unknown, Violation::Parse(reason));
            }
            Err(ClassifyError::MultipleStatements(kind)) => {
                debug!(operation = %kind, "SQL rejected: multiple statements");
                return ValidationVerdict::rejected(kind, Violation::MultipleStatements);
            }
        };

        let operation = statement.kind();
        let is_destructive = operation.is_destructive();

        if is_destructive && !allow_destructive {
            debug!(operation = %operation, "SQL needs confirmation");
            return ValidationVerdict {
                is_valid: false,
                is_destructive: true,
                requires_confirmation: true,
                errors: vec![Violation::PermissionRequired(operation)],
                warnings: Vec::new(),
                complexity_score: 0,
                operation,
            };
        }

        let mut errors: Vec<Violation> = scan(sql)
            .into_iter()
            .map(Violation::DangerousPattern)
            .collect();

        let mut warnings = Vec::new();
        if operation.filters_rows() && !statement.has_where_clause() {
            warnings.push(format!(
                "{} without WHERE clause will affect ALL rows!",
                operation
            ));
        }

        let complexity = complexity_score(&statement);

        if let Some(allowed) = &self.allowed_tables {
            errors.extend(
                statement
                    .referenced_tables()
                    .iter()
                    .filter(|table| !allowed.contains(*table))
                    .map(|table| Violation::UnauthorizedTable(table.clone())),
            );
        }

        if operation == OperationKind::Unknown {
            warnings.push(
                "Could not determine the operation type. Please review carefully.".to_string(),
            );
        }

        let is_valid = errors.is_empty();
        debug!(
            operation = %operation,
            is_valid,
            errors = errors.len(),
            complexity,
            "SQL evaluated"
        );

        ValidationVerdict {
            is_valid,
            is_destructive,
            requires_confirmation: is_destructive,
            errors,
            warnings,
            complexity_score: complexity,
            operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::DangerousPattern;
    use pretty_assertions::assert_eq;

    const DESTRUCTIVE: [&str; 7] = [
        "INSERT INTO users (name) VALUES ('a')",
        "UPDATE users SET name = 'x' WHERE id = 1",
        "DELETE FROM users WHERE id = 1",
        "CREATE TABLE t (id INT)",
        "DROP TABLE users",
        "ALTER TABLE users ADD COLUMN phone TEXT",
        "TRUNCATE TABLE logs",
    ];

    #[test]
    fn test_select_never_requires_confirmation() {
        let policy = SafetyPolicy::new();
        for sql in [
            "SELECT * FROM users",
            "SELECT * FROM users WHERE id = 1",
            "select count(*) from orders",
        ] {
            for allow in [false, true] {
                let verdict = policy.evaluate(sql, allow);
                assert!(!verdict.requires_confirmation, "SQL: '{}'", sql);
                assert!(verdict.is_valid, "SQL: '{}'", sql);
                assert_eq!(verdict.operation, OperationKind::Select);
            }
        }
    }

    #[test]
    fn test_destructive_always_requires_confirmation() {
        let policy = SafetyPolicy::new();
        for sql in DESTRUCTIVE {
            for allow in [false, true] {
                let verdict = policy.evaluate(sql, allow);
                assert!(verdict.requires_confirmation, "SQL: '{}'", sql);
                assert!(verdict.is_destructive, "SQL: '{}'", sql);
            }
        }
    }

    #[test]
    fn test_insert_without_permission() {
        let verdict = SafetyPolicy::new().evaluate("INSERT INTO users (name) VALUES ('a')", false);
        assert!(!verdict.is_valid);
        assert!(verdict.requires_confirmation);
        assert_eq!(
            verdict.errors,
            vec![Violation::PermissionRequired(OperationKind::Insert)]
        );
        assert!(verdict.error_messages()[0].contains("INSERT"));
        assert_eq!(verdict.complexity_score, 0);
    }

    #[test]
    fn test_permission_branch_skips_pattern_scan() {
        let verdict = SafetyPolicy::new().evaluate("DELETE FROM users -- all of them", false);
        assert_eq!(
            verdict.errors,
            vec![Violation::PermissionRequired(OperationKind::Delete)]
        );
    }

    #[test]
    fn test_update_without_where_warns() {
        let verdict = SafetyPolicy::new().evaluate("UPDATE x SET y=1", true);
        assert!(verdict.is_valid);
        assert_eq!(verdict.warnings.len(), 1);
        assert!(verdict.warnings[0].contains("ALL rows"));
    }

    #[test]
    fn test_delete_with_where_has_no_warning() {
        let verdict = SafetyPolicy::new().evaluate("DELETE FROM users WHERE id = 3", true);
        assert!(verdict.is_valid);
        assert!(verdict.warnings.is_empty());
    }

    #[test]
    fn test_multiple_statements() {
        let verdict = SafetyPolicy::new().evaluate("SELECT * FROM users; DROP TABLE users;", true);
        assert!(!verdict.is_valid);
        assert_eq!(verdict.errors, vec![Violation::MultipleStatements]);
        assert_eq!(verdict.operation, OperationKind::Select);
        assert_eq!(verdict.complexity_score, 0);
        assert!(!verdict.requires_confirmation);
    }

    #[test]
    fn test_parse_failure() {
        let verdict = SafetyPolicy::new().evaluate("   ", false);
        assert!(!verdict.is_valid);
        assert_eq!(verdict.errors.len(), 1);
        assert!(matches!(verdict.errors[0], Violation::Parse(_)));
        assert_eq!(verdict.operation, OperationKind::Unknown);
        assert!(!verdict.is_destructive);
    }

    #[test]
    fn test_dangerous_patterns_are_all_collected() {
        let verdict = SafetyPolicy::new().evaluate("SELECT sp_who() /* x */ -- y", false);
        assert!(!verdict.is_valid);
        assert_eq!(
            verdict.errors,
            vec![
                Violation::DangerousPattern(DangerousPattern::LineComment),
                Violation::DangerousPattern(DangerousPattern::BlockComment),
                Violation::DangerousPattern(DangerousPattern::StoredProcedure),
            ]
        );
    }

    #[test]
    fn test_allow_list_rejects_other_tables() {
        let policy = SafetyPolicy::new().with_allowed_tables(["orders"]);
        let verdict = policy.evaluate("SELECT * FROM users", false);
        assert!(!verdict.is_valid);
        assert_eq!(
            verdict.error_messages(),
            vec!["Unauthorized table: users".to_string()]
        );

        assert!(policy.evaluate("SELECT * FROM orders", false).is_valid);
    }

    #[test]
    fn test_allow_list_reports_each_table() {
        let policy = SafetyPolicy::new().with_allowed_tables(["orders"]);
        let verdict = policy.evaluate(
            "SELECT * FROM users JOIN orders ON users.id = orders.user_id JOIN payments ON payments.order_id = orders.id",
            false,
        );
        assert_eq!(
            verdict.errors,
            vec![
                Violation::UnauthorizedTable("users".to_string()),
                Violation::UnauthorizedTable("payments".to_string()),
            ]
        );
    }

    #[test]
    fn test_keyword_alias_does_not_hide_a_table() {
        let policy = SafetyPolicy::new().with_allowed_tables(["orders"]);
        for sql in [
            "SELECT * FROM orders data, secrets",
            "SELECT * FROM orders id, secrets",
            "SELECT * FROM orders name, secrets",
        ] {
            let verdict = policy.evaluate(sql, false);
            assert!(!verdict.is_valid, "SQL: '{}'", sql);
            assert_eq!(
                verdict.error_messages(),
                vec!["Unauthorized table: secrets".to_string()],
                "SQL: '{}'",
                sql
            );
        }
    }

    #[test]
    fn test_empty_allow_list_is_unrestricted() {
        let policy = SafetyPolicy::new().with_allowed_tables(Vec::<String>::new());
        assert!(policy.allowed_tables().is_none());
        assert!(policy.evaluate("SELECT * FROM anything", false).is_valid);
    }

    #[test]
    fn test_unknown_kind_warns() {
        let verdict = SafetyPolicy::new().evaluate("WITH a AS (SELECT 1) SELECT * FROM a", false);
        assert!(verdict.is_valid);
        assert!(!verdict.requires_confirmation);
        assert_eq!(verdict.operation, OperationKind::Unknown);
        assert_eq!(verdict.warnings.len(), 1);
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let policy = SafetyPolicy::new().with_allowed_tables(["users"]);
        let inputs = [
            ("SELECT * FROM users JOIN orders ON users.id = orders.uid", false),
            ("DELETE FROM users", false),
            ("DELETE FROM users", true),
            ("SELECT 1; SELECT 2", true),
            ("SELECT xp_cmdshell('x') -- y", true),
        ];
        for (sql, allow) in inputs {
            assert_eq!(policy.evaluate(sql, allow), policy.evaluate(sql, allow));
        }
    }

    #[test]
    fn test_complexity_is_reported() {
        let verdict = SafetyPolicy::new().evaluate("SELECT * FROM t", false);
        assert_eq!(verdict.complexity_score, 25);
    }

    #[test]
    fn test_policy_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SafetyPolicy>();
    }
}
