//! 查询执行模块
//!
//! Runs one SQL statement on a fresh PostgreSQL connection and reports the
//! result as an [`ExecutionOutcome`]. Errors never escape: they come back as
//! `ExecutionOutcome::Failed`.

use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use common::config::DatabaseSettings;
use common::errors::{AppError, AppResult};
use common::models::query::{ColumnInfo, ExecutionOutcome};
use common::utils::statement::StatementPolicy;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::postgres::types::{Oid, PgInterval};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgHasArrayType, PgRow, PgTypeKind, Postgres};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::types::{Decimal, Uuid};
use sqlx::{Column, Connection, Executor, Row, Statement, TypeInfo, ValueRef};
use std::fmt::Write as _;
use std::net::IpAddr;

/// Executes statements against the configured database.
///
/// Every call opens its own connection and closes it before returning; there
/// is no pool.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    settings: DatabaseSettings,
    policy: StatementPolicy,
}

impl QueryExecutor {
    pub fn new(settings: DatabaseSettings, policy: StatementPolicy) -> Self {
        Self { settings, policy }
    }

    /// Runs `sql` verbatim.
    ///
    /// A statement whose description has columns is fetched and its
    /// transaction rolled back; any other statement is executed and committed.
    /// When the policy permits no write kind the transaction is opened read
    /// only, so the database refuses writes the classifier cannot see.
    pub async fn execute(&self, sql: &str) -> ExecutionOutcome {
        let kind = match self.policy.check(sql) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!(error = %e, "statement rejected");
                return ExecutionOutcome::failed(e);
            }
        };

        let start = Instant::now();
        let outcome = match self.run(sql).await {
            Ok(outcome) => outcome,
            Err(e) => ExecutionOutcome::failed(e),
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            ExecutionOutcome::Rows { row_count, .. } => {
                tracing::info!(kind = %kind, rows = row_count, elapsed_ms, "statement returned rows")
            }
            ExecutionOutcome::Acknowledged { rows_affected } => {
                tracing::info!(kind = %kind, rows_affected, elapsed_ms, "statement committed")
            }
            ExecutionOutcome::Failed { message } => {
                tracing::warn!(kind = %kind, elapsed_ms, error = %message, "statement failed")
            }
        }
        outcome
    }

    async fn run(&self, sql: &str) -> AppResult<ExecutionOutcome> {
        let mut conn = self.connect().await?;
        let read_only = !self.policy.permits_writes();
        let result = run_statement(&mut conn, sql, read_only).await;
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "closing connection failed");
        }
        result
    }

    async fn connect(&self) -> AppResult<PgConnection> {
        let timeout = Duration::from_secs(self.settings.connect_timeout_secs);
        let options = self.connect_options();

        tokio::time::timeout(timeout, PgConnection::connect_with(&options))
            .await
            .map_err(|_| {
                AppError::DatabaseConnection(format!(
                    "timed out after {}s connecting to {}:{}",
                    timeout.as_secs(),
                    self.settings.host,
                    self.settings.port
                ))
            })?
            .map_err(|e| AppError::DatabaseConnection(e.to_string()))
    }

    fn connect_options(&self) -> PgConnectOptions {
        let settings = &self.settings;
        let mut options = PgConnectOptions::new_without_pgpass()
            .host(&settings.host)
            .port(settings.port);
        if let Some(database) = &settings.database {
            options = options.database(database);
        }
        if let Some(user) = &settings.user {
            options = options.username(user);
        }
        if let Some(password) = &settings.password {
            options = options.password(password);
        }
        options
    }
}

async fn run_statement(
    conn: &mut PgConnection,
    sql: &str,
    read_only: bool,
) -> AppResult<ExecutionOutcome> {
    let mut tx = conn.begin().await.map_err(query_error)?;
    if read_only {
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
    }

    let statement = (&mut *tx).prepare(sql).await.map_err(query_error)?;
    let columns: Vec<ColumnInfo> = statement
        .columns()
        .iter()
        .map(|column| ColumnInfo {
            name: column.name().to_string(),
            data_type: column.type_info().name().to_string(),
        })
        .collect();

    if columns.is_empty() {
        let result = statement
            .query()
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        tx.commit().await.map_err(query_error)?;
        return Ok(ExecutionOutcome::Acknowledged {
            rows_affected: result.rows_affected(),
        });
    }

    let rows = statement
        .query()
        .fetch_all(&mut *tx)
        .await
        .map_err(query_error)?;
    tx.rollback().await.map_err(query_error)?;

    let rows = rows
        .iter()
        .map(row_to_json)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(ExecutionOutcome::rows(columns, rows))
}

fn query_error(e: sqlx::Error) -> AppError {
    AppError::DatabaseQuery(e.to_string())
}

fn row_to_json(row: &PgRow) -> AppResult<Vec<Value>> {
    (0..row.len()).map(|idx| cell_to_json(row, idx)).collect()
}

fn decode<'r, T>(row: &'r PgRow, idx: usize) -> AppResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<T, _>(idx).map_err(query_error)
}

/// Converts one cell into JSON. Exact numeric values keep their precision as
/// strings; types without a known decoding become a `<TYPE>` placeholder.
fn cell_to_json(row: &PgRow, idx: usize) -> AppResult<Value> {
    let raw = row.try_get_raw(idx).map_err(query_error)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let type_info = row.column(idx).type_info();
    let type_name = type_info.name();
    let value = match type_name {
        "BOOL" => Value::Bool(decode(row, idx)?),
        "INT2" => json!(decode::<i16>(row, idx)?),
        "INT4" => json!(decode::<i32>(row, idx)?),
        "INT8" => json!(decode::<i64>(row, idx)?),
        "OID" => json!(decode::<Oid>(row, idx)?.0),
        "FLOAT4" => json!(decode::<f32>(row, idx)?),
        "FLOAT8" => json!(decode::<f64>(row, idx)?),
        "NUMERIC" => match decode::<Decimal>(row, idx) {
            Ok(decimal) => Value::String(decimal.to_string()),
            // NaN, infinities and values beyond 28 digits
            Err(_) => Value::String(
                raw.as_bytes()
                    .ok()
                    .and_then(numeric_text)
                    .unwrap_or_else(|| placeholder(type_name)),
            ),
        },
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "XML" => Value::String(decode(row, idx)?),
        "TIMESTAMPTZ" => Value::String(decode::<DateTime<Utc>>(row, idx)?.to_rfc3339()),
        "TIMESTAMP" => Value::String(decode::<NaiveDateTime>(row, idx)?.to_string()),
        "DATE" => Value::String(decode::<NaiveDate>(row, idx)?.to_string()),
        "TIME" => Value::String(decode::<NaiveTime>(row, idx)?.to_string()),
        "INTERVAL" => {
            let interval = decode::<PgInterval>(row, idx)?;
            Value::String(format!(
                "{} mons {} days {} us",
                interval.months, interval.days, interval.microseconds
            ))
        }
        "UUID" => Value::String(decode::<Uuid>(row, idx)?.to_string()),
        "JSON" | "JSONB" => decode::<Value>(row, idx)?,
        "BYTEA" => Value::String(format!("\\x{}", hex::encode(decode::<Vec<u8>>(row, idx)?))),
        "INET" | "CIDR" => Value::String(
            decode::<IpAddr>(row, idx)
                .map(|addr| addr.to_string())
                .or_else(|_| decode::<IpNetwork>(row, idx).map(|net| net.to_string()))?,
        ),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => array::<String>(row, idx, type_name),
        "BOOL[]" => array::<bool>(row, idx, type_name),
        "INT2[]" => array::<i16>(row, idx, type_name),
        "INT4[]" => array::<i32>(row, idx, type_name),
        "INT8[]" => array::<i64>(row, idx, type_name),
        "FLOAT4[]" => array::<f32>(row, idx, type_name),
        "FLOAT8[]" => array::<f64>(row, idx, type_name),
        "UUID[]" => array::<Uuid>(row, idx, type_name),
        "DATE[]" => array::<NaiveDate>(row, idx, type_name),
        // enum labels travel as their text in binary format too
        _ if matches!(type_info.kind(), PgTypeKind::Enum(_)) => row
            .try_get_unchecked::<String, _>(idx)
            .map(Value::String)
            .unwrap_or_else(|_| Value::String(placeholder(type_name))),
        other => Value::String(placeholder(other)),
    };
    Ok(value)
}

fn placeholder(type_name: &str) -> String {
    format!("<{}>", type_name)
}

/// One-dimensional arrays become JSON arrays. Anything sqlx cannot decode,
/// such as multi-dimensional arrays, becomes a placeholder.
fn array<T>(row: &PgRow, idx: usize, type_name: &str) -> Value
where
    T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres> + PgHasArrayType + Serialize,
{
    row.try_get::<Vec<Option<T>>, _>(idx)
        .map(|items| json!(items))
        .unwrap_or_else(|_| Value::String(placeholder(type_name)))
}

/// Renders the binary NUMERIC wire value as PostgreSQL prints it.
///
/// Layout: digit count, weight, sign and display scale as big-endian 16-bit
/// words, followed by base-10000 digits.
fn numeric_text(bytes: &[u8]) -> Option<String> {
    let word = |i: usize| -> Option<i16> {
        Some(i16::from_be_bytes([*bytes.get(2 * i)?, *bytes.get(2 * i + 1)?]))
    };
    let ndigits = usize::try_from(word(0)?).ok()?;
    let weight = i64::from(word(1)?);
    let sign = word(2)? as u16;
    let dscale = usize::try_from(word(3)?).ok()?;

    match sign {
        0xC000 => return Some("NaN".to_string()),
        0xD000 => return Some("Infinity".to_string()),
        0xF000 => return Some("-Infinity".to_string()),
        0x0000 | 0x4000 => {}
        _ => return None,
    }

    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<Option<Vec<i16>>>()?;
    let digit = |pos: i64| -> i16 {
        usize::try_from(pos)
            .ok()
            .and_then(|pos| digits.get(pos).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == 0x4000 {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        for pos in 0..=weight {
            let _ = if pos == 0 {
                write!(text, "{}", digit(pos))
            } else {
                write!(text, "{:04}", digit(pos))
            };
        }
    }
    if dscale > 0 {
        let mut fraction = String::new();
        let mut pos = weight + 1;
        while fraction.len() < dscale {
            let _ = write!(fraction, "{:04}", digit(pos));
            pos += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Some(text)
}
