//! SQL statement classification and allow-list.
//!
//! Model output is executed verbatim, so the only gate between the model and
//! the database is [`StatementPolicy`]. Classification looks at the leading
//! keyword and is not a parser: it is meant for coarse capability checks.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

/// Coarse statement category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    /// SELECT, VALUES, TABLE, SHOW, EXPLAIN and read-only WITH queries.
    Select,
    Insert,
    Update,
    Delete,
    /// CREATE, ALTER, DROP, TRUNCATE, COMMENT, GRANT, REVOKE and
    /// `SELECT … INTO`, which creates a table.
    Ddl,
    /// Anything unrecognised, including empty input.
    Other,
}

impl StatementKind {
    pub const ALL: [StatementKind; 6] = [
        StatementKind::Select,
        StatementKind::Insert,
        StatementKind::Update,
        StatementKind::Delete,
        StatementKind::Ddl,
        StatementKind::Other,
    ];

    /// Classifies a statement by its leading keyword.
    ///
    /// Leading whitespace, comments and parentheses are skipped. A `WITH`
    /// query counts as the data-modifying kind it contains, if any. A query
    /// with an `INTO` clause creates a table and counts as DDL.
    pub fn classify(sql: &str) -> Self {
        let words = keywords(sql);
        let Some(first) = words.first() else {
            return StatementKind::Other;
        };
        let creates_table = || words.iter().any(|w| w == "INTO");

        match first.as_str() {
            "WITH" => words[1..]
                .iter()
                .find_map(|w| match w.as_str() {
                    "INSERT" => Some(StatementKind::Insert),
                    "UPDATE" => Some(StatementKind::Update),
                    "DELETE" => Some(StatementKind::Delete),
                    _ => None,
                })
                .unwrap_or_else(|| {
                    if creates_table() {
                        StatementKind::Ddl
                    } else {
                        StatementKind::Select
                    }
                }),
            "SELECT" if creates_table() => StatementKind::Ddl,
            other => Self::from_leading_keyword(other),
        }
    }

    /// Whether statements of this kind can change database state.
    pub fn writes(&self) -> bool {
        !matches!(self, StatementKind::Select)
    }

    fn from_leading_keyword(word: &str) -> Self {
        match word {
            "SELECT" | "VALUES" | "TABLE" | "SHOW" | "EXPLAIN" => StatementKind::Select,
            "INSERT" => StatementKind::Insert,
            "UPDATE" => StatementKind::Update,
            "DELETE" => StatementKind::Delete,
            "CREATE" | "ALTER" | "DROP" | "TRUNCATE" | "COMMENT" | "GRANT" | "REVOKE" => {
                StatementKind::Ddl
            }
            _ => StatementKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Select => "select",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
            StatementKind::Ddl => "ddl",
            StatementKind::Other => "other",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatementKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::Configuration(format!("unknown statement kind '{}'", s.trim())))
    }
}

/// Allow-list of statement kinds the executor may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementPolicy {
    allowed: BTreeSet<StatementKind>,
}

impl StatementPolicy {
    /// Permits every statement kind.
    pub fn allow_all() -> Self {
        Self {
            allowed: StatementKind::ALL.into_iter().collect(),
        }
    }

    /// Permits only row-reading statements.
    pub fn read_only() -> Self {
        Self::only([StatementKind::Select])
    }

    pub fn only(kinds: impl IntoIterator<Item = StatementKind>) -> Self {
        Self {
            allowed: kinds.into_iter().collect(),
        }
    }

    pub fn allows(&self, kind: StatementKind) -> bool {
        self.allowed.contains(&kind)
    }

    /// False when only row-reading kinds are allowed. The executor then runs
    /// statements in a read-only transaction.
    pub fn permits_writes(&self) -> bool {
        self.allowed.iter().any(StatementKind::writes)
    }

    /// Classifies `sql` and returns its kind if the policy permits it.
    ///
    /// # Errors
    /// Returns `AppError::UnsafeSql` when the kind is not on the allow-list.
    pub fn check(&self, sql: &str) -> Result<StatementKind, AppError> {
        let kind = StatementKind::classify(sql);
        if self.allows(kind) {
            Ok(kind)
        } else {
            Err(AppError::UnsafeSql(format!(
                "{} statements are not permitted by the configured allow-list",
                kind
            )))
        }
    }
}

impl Default for StatementPolicy {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl FromStr for StatementPolicy {
    type Err = AppError;

    /// Parses `all` or a comma-separated list such as `select,insert`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::allow_all());
        }
        let kinds = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(StatementKind::from_str)
            .collect::<Result<BTreeSet<_>, _>>()?;
        if kinds.is_empty() {
            return Err(AppError::Configuration("statement allow-list is empty".into()));
        }
        Ok(Self { allowed: kinds })
    }
}

/// Upper-cased words of `sql`, ignoring comments, string literals and quoted
/// identifiers.
fn keywords(sql: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '-' if chars.peek() == Some(&'-') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            '\'' | '"' => {
                for next in chars.by_ref() {
                    if next == c {
                        break;
                    }
                }
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                current.push(c.to_ascii_uppercase());
                continue;
            }
            _ => {}
        }
        if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
