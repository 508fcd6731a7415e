//! Dangerous-pattern scanning over raw SQL text.
//!
//! Runs on the untokenized string, so it also sees inside comments and
//! string literals that the classifier skips.

use regex::Regex;
use std::sync::OnceLock;

/// A structural pattern associated with injection or procedure abuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DangerousPattern {
    /// `;` followed by more SQL.
    StatementChaining,
    /// `--`
    LineComment,
    /// `/*`
    BlockComment,
    /// `xp_` (SQL Server extended procedures).
    ExtendedProcedure,
    /// `exec(`
    ExecCall,
    /// `sp_` (stored procedures).
    StoredProcedure,
}

impl DangerousPattern {
    /// Every pattern, in the order they are tested and reported.
    pub const ALL: [DangerousPattern; 6] = [
        Self::StatementChaining,
        Self::LineComment,
        Self::BlockComment,
        Self::ExtendedProcedure,
        Self::ExecCall,
        Self::StoredProcedure,
    ];

    /// Returns a short human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StatementChaining => "statement chaining",
            Self::LineComment => "line comment",
            Self::BlockComment => "block comment",
            Self::ExtendedProcedure => "extended procedure call",
            Self::ExecCall => "exec call",
            Self::StoredProcedure => "stored procedure call",
        }
    }

    /// The procedure patterns are anchored at a word boundary, so a prefix
    /// buried inside a longer identifier (`resp_code`, `myexec(`) does not
    /// fire while `sp_who` and `dbo.sp_who` still do.
    fn source(&self) -> &'static str {
        match self {
            Self::StatementChaining => r";\s*\w",
            Self::LineComment => r"--",
            Self::BlockComment => r"/\*",
            Self::ExtendedProcedure => r"(?i)\bxp_",
            Self::ExecCall => r"(?i)\bexec\s*\(",
            Self::StoredProcedure => r"(?i)\bsp_",
        }
    }
}

fn compiled() -> &'static [(DangerousPattern, Regex)] {
    static PATTERNS: OnceLock<Vec<(DangerousPattern, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        DangerousPattern::ALL
            .iter()
            .map(|p| {
                let regex = Regex::new(p.source()).expect("built-in pattern is valid");
                (*p, regex)
            })
            .collect()
    })
}

/// Returns every pattern that matches `sql`, in [`DangerousPattern::ALL`] order.
pub fn scan(sql: &str) -> Vec<DangerousPattern> {
    compiled()
        .iter()
        .filter(|(_, regex)| regex.is_match(sql))
        .map(|(pattern, _)| *pattern)
        .collect()
}
