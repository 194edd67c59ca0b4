//! SQLite-backed trace storage.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use agenttrace_core::{RecordId, SubStep, TokenUsage, TraceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, Row};
use tracing::{debug, info};

use crate::context::CallContext;
use crate::store::{StoreError, TraceFilter, TraceStore};

const SELECT_COLUMNS: &str = r#"SELECT id, trace_id, session_id, agent_name, model, status,
       input_prompt, output_prompt, latency_ms, timestamp, created_at,
       input_tokens, output_tokens, total_tokens, estimated_cost_usd, sub_steps
       FROM traces"#;

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// SQLite-backed [`TraceStore`].
///
/// Blocking SQLite calls run on the tokio blocking pool.
#[derive(Clone)]
pub struct SqliteTraceStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTraceStore {
    /// Opens (or creates) a trace database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("failed to create db directory: {e}")))?;
        }
        let conn = Connection::open(path)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
        let store = Self::from_connection(conn)?;
        info!(path = %path.display(), "Trace store initialized");
        Ok(store)
    }

    /// Creates an in-memory trace store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` on the blocking pool, checking `ctx` once the connection lock
    /// is held.
    async fn run_blocking<T, F>(&self, ctx: &CallContext, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let task_ctx = ctx.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))?;
            // The context may have fired while waiting for the lock.
            task_ctx.check()?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
    }

    /// Reads can be abandoned at any point.
    async fn read<T, F>(&self, ctx: &CallContext, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        ctx.run(self.run_blocking(ctx, f)).await
    }

    /// Writes are awaited once started so the caller sees what was committed.
    async fn write<T, F>(&self, ctx: &CallContext, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        ctx.check()?;
        self.run_blocking(ctx, f).await
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS traces (
            id TEXT PRIMARY KEY,
            trace_id TEXT NOT NULL UNIQUE,
            session_id TEXT NOT NULL,
            agent_name TEXT NOT NULL,
            model TEXT NOT NULL,
            status TEXT NOT NULL,
            input_prompt TEXT NOT NULL,
            output_prompt TEXT NOT NULL,
            latency_ms INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            input_tokens INTEGER NOT NULL,
            output_tokens INTEGER NOT NULL,
            total_tokens INTEGER NOT NULL,
            estimated_cost_usd REAL NOT NULL,
            sub_steps TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_traces_timestamp ON traces(timestamp DESC, trace_id);
        CREATE INDEX IF NOT EXISTS idx_traces_agent ON traces(agent_name, timestamp DESC);
        "#,
    )?;
    Ok(())
}

fn insert_record(conn: &Connection, record: &TraceRecord) -> Result<(), StoreError> {
    let sub_steps = serde_json::to_string(&record.sub_steps)?;

    let result = conn.execute(
        r#"INSERT INTO traces
           (id, trace_id, session_id, agent_name, model, status,
            input_prompt, output_prompt, latency_ms, timestamp, created_at,
            input_tokens, output_tokens, total_tokens, estimated_cost_usd, sub_steps)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"#,
        params![
            record.id.to_string(),
            record.trace_id,
            record.session_id,
            record.agent_name,
            record.model,
            record.status,
            record.input_prompt,
            record.output_prompt,
            record.latency_ms as i64,
            record.timestamp.timestamp_micros(),
            record.created_at.timestamp_micros(),
            record.token_usage.input_tokens as i64,
            record.token_usage.output_tokens as i64,
            record.token_usage.total as i64,
            record.token_usage.estimated_cost,
            sub_steps,
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
            Err(StoreError::DuplicateKey(record.trace_id.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<TraceRecord> {
    let id: String = row.get(0)?;
    let sub_steps: String = row.get(15)?;

    Ok(TraceRecord {
        id: id.parse::<RecordId>().map_err(|e| conversion_error(0, Type::Text, e))?,
        trace_id: row.get(1)?,
        session_id: row.get(2)?,
        agent_name: row.get(3)?,
        model: row.get(4)?,
        status: row.get(5)?,
        input_prompt: row.get(6)?,
        output_prompt: row.get(7)?,
        latency_ms: row.get::<_, i64>(8)? as u64,
        timestamp: micros_to_datetime(9, row.get(9)?)?,
        created_at: micros_to_datetime(10, row.get(10)?)?,
        token_usage: TokenUsage {
            input_tokens: row.get::<_, i64>(11)? as u64,
            output_tokens: row.get::<_, i64>(12)? as u64,
            total: row.get::<_, i64>(13)? as u64,
            estimated_cost: row.get(14)?,
        },
        sub_steps: serde_json::from_str::<Vec<SubStep>>(&sub_steps)
            .map_err(|e| conversion_error(15, Type::Text, e))?,
    })
}

fn micros_to_datetime(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| conversion_error(idx, Type::Integer, format!("timestamp out of range: {micros}")))
}

fn conversion_error(idx: usize, ty: Type, e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, e.into())
}

/// Lower bound in stored precision; a sub-microsecond bound rounds up.
fn lower_bound_micros(from: &DateTime<Utc>) -> i64 {
    let micros = from.timestamp_micros();
    if from.timestamp_subsec_nanos() % 1_000 != 0 {
        micros + 1
    } else {
        micros
    }
}

fn query_records(conn: &Connection, filter: &TraceFilter) -> Result<Vec<TraceRecord>, StoreError> {
    let mut sql = format!("{SELECT_COLUMNS} WHERE 1=1");
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref agent) = filter.agent_name {
        sql.push_str(" AND agent_name = ?");
        params_vec.push(Box::new(agent.clone()));
    }

    if let Some(ref from) = filter.from {
        sql.push_str(" AND timestamp >= ?");
        params_vec.push(Box::new(lower_bound_micros(from)));
    }

    if let Some(ref to) = filter.to {
        sql.push_str(" AND timestamp <= ?");
        params_vec.push(Box::new(to.timestamp_micros()));
    }

    sql.push_str(" ORDER BY timestamp DESC, trace_id ASC LIMIT ? OFFSET ?");
    params_vec.push(Box::new(i64::from(filter.limit)));
    params_vec.push(Box::new(i64::from(filter.offset)));

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), row_to_record)?;

    let mut traces = Vec::new();
    for row in rows {
        traces.push(row?);
    }

    Ok(traces)
}

#[async_trait]
impl TraceStore for SqliteTraceStore {
    async fn insert(&self, ctx: &CallContext, record: &TraceRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.write(ctx, move |conn| {
            insert_record(conn, &record)?;
            debug!(trace_id = %record.trace_id, record_id = %record.id, "Inserted trace");
            Ok(())
        })
        .await
    }

    async fn get_by_id(&self, ctx: &CallContext, id: RecordId) -> Result<TraceRecord, StoreError> {
        self.read(ctx, move |conn| {
            let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
            match conn.query_row(&sql, params![id.to_string()], row_to_record) {
                Ok(record) => Ok(record),
                Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::NotFound(id.to_string())),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn query(&self, ctx: &CallContext, filter: &TraceFilter) -> Result<Vec<TraceRecord>, StoreError> {
        let filter = filter.clone();
        self.read(ctx, move |conn| query_records(conn, &filter)).await
    }
}
