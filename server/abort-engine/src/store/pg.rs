//! PostgreSQL-backed incident store.

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_builder::QueryBuilder;
use sqlx_core::row::Row;
use sqlx_postgres::{PgPool, PgRow, Postgres};

use super::IncidentStore;
use crate::channels::{ChannelEntry, ChannelList};
use crate::error::{EngineError, StoreError};
use crate::types::{IncidentId, Ring, SignalId, SignalRecord, Timestamp};

/// Idempotent schema. Timestamps are stored as sortable UTC text.
const SCHEMA: &[&str] = &[
  r#"
  CREATE TABLE IF NOT EXISTS channels (
    name TEXT PRIMARY KEY,
    ring TEXT NOT NULL
  )
  "#,
  r#"
  CREATE TABLE IF NOT EXISTS current_channels (
    name TEXT PRIMARY KEY REFERENCES channels (name),
    message TEXT NOT NULL DEFAULT ''
  )
  "#,
  r#"
  CREATE TABLE IF NOT EXISTS abort_signals (
    signal_id BIGSERIAL PRIMARY KEY,
    channel TEXT NOT NULL REFERENCES channels (name),
    message TEXT NOT NULL,
    channel_ts TEXT NOT NULL,
    abort_ts TEXT NOT NULL,
    reset_count BIGINT NOT NULL,
    trigger_count BIGINT NOT NULL,
    interrupt_count BIGINT NOT NULL
  )
  "#,
  "CREATE INDEX IF NOT EXISTS abort_signals_message_idx ON abort_signals (message)",
  "CREATE INDEX IF NOT EXISTS abort_signals_abort_ts_idx ON abort_signals (abort_ts)",
  r#"
  CREATE TABLE IF NOT EXISTS aborts (
    abort_id BIGSERIAL PRIMARY KEY,
    abort_time TEXT NOT NULL UNIQUE
  )
  "#,
  r#"
  CREATE TABLE IF NOT EXISTS abort_list (
    abort_id BIGINT NOT NULL REFERENCES aborts (abort_id),
    signal_id BIGINT NOT NULL REFERENCES abort_signals (signal_id),
    PRIMARY KEY (abort_id, signal_id)
  )
  "#,
];

/// Which signals to read back.
#[derive(Debug, Clone, Default)]
pub struct SignalFilter {
  pub ring: Option<Ring>,
  /// Only the earliest signal per (incident, channel).
  pub first_per_channel: bool,
  /// Also return signals not linked to any incident.
  pub include_unattached: bool,
  pub incident_after: Option<Timestamp>,
  pub incident_before: Option<Timestamp>,
  pub signal_after: Option<Timestamp>,
  pub signal_before: Option<Timestamp>,
}

/// One signal joined with its incident and ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRow {
  pub abort_id: Option<IncidentId>,
  pub abort_ts: Timestamp,
  pub channel: String,
  pub message: String,
  pub ring: Ring,
  pub reset_count: i64,
  pub trigger_count: i64,
  pub interrupt_count: i64,
}

#[derive(Debug, Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
    let pool = PgPool::connect(database_url).await?;
    Ok(Self { pool })
  }

  /// Create missing tables and indexes.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    for statement in SCHEMA {
      query::<Postgres>(statement).execute(&self.pool).await?;
    }
    Ok(())
  }

  /// Add unknown channels to `channels` (existing rings are kept) and replace
  /// `current_channels` with `list`.
  pub async fn register_channels(&self, list: &ChannelList) -> Result<(), StoreError> {
    let mut tx = self.pool.begin().await?;
    for entry in list.iter() {
      query::<Postgres>("INSERT INTO channels (name, ring) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING")
        .bind(&entry.id)
        .bind(entry.ring.as_str())
        .execute(&mut *tx)
        .await?;
    }
    query::<Postgres>("DELETE FROM current_channels")
      .execute(&mut *tx)
      .await?;
    for entry in list.iter() {
      query::<Postgres>("INSERT INTO current_channels (name, message) VALUES ($1, $2)")
        .bind(&entry.id)
        .bind(&entry.message)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
  }

  /// Register channels without touching the current list.
  pub async fn insert_channels(&self, channels: &[(String, Ring)]) -> Result<(), StoreError> {
    let mut tx = self.pool.begin().await?;
    for (name, ring) in channels {
      query::<Postgres>("INSERT INTO channels (name, ring) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING")
        .bind(name)
        .bind(ring.as_str())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
  }

  /// The channel list of the next run.
  pub async fn fetch_current_channels(&self) -> Result<ChannelList, EngineError> {
    let rows = query::<Postgres>(
      r#"
      SELECT c.name, ch.ring, c.message
      FROM current_channels c
      JOIN channels ch ON ch.name = c.name
      ORDER BY ch.ring, c.name
      "#,
    )
    .fetch_all(&self.pool)
    .await
    .map_err(StoreError::from)?;

    let entries = rows
      .iter()
      .map(|row| -> Result<_, StoreError> {
        Ok(ChannelEntry {
          id: row.try_get::<String, _>("name")?,
          ring: ring_column(row, "ring")?,
          message: row.try_get::<String, _>("message")?,
        })
      })
      .collect::<Result<Vec<_>, StoreError>>()?;
    ChannelList::from_entries(entries)
  }

  /// Signals ordered by incident, then reset/trigger/interrupt counts.
  pub async fn fetch_abort_signals(&self, filter: &SignalFilter) -> Result<Vec<SignalRow>, StoreError> {
    let join = if filter.include_unattached {
      "LEFT JOIN"
    } else {
      "JOIN"
    };

    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM (SELECT ");
    if filter.first_per_channel {
      qb.push("DISTINCT ON (a.abort_id, s.channel) ");
    }
    qb.push(
      "a.abort_id, s.abort_ts, s.channel, s.message, ch.ring, \
       s.reset_count, s.trigger_count, s.interrupt_count \
       FROM abort_signals s ",
    );
    qb.push(format!(
      "{join} abort_list l ON l.signal_id = s.signal_id \
       {join} aborts a ON a.abort_id = l.abort_id \
       JOIN channels ch ON ch.name = s.channel WHERE TRUE"
    ));
    if let Some(ring) = filter.ring {
      qb.push(" AND ch.ring = ").push_bind(ring.as_str());
    }
    if let Some(t) = filter.incident_after {
      qb.push(" AND a.abort_time > ").push_bind(t.to_string());
    }
    if let Some(t) = filter.incident_before {
      qb.push(" AND a.abort_time < ").push_bind(t.to_string());
    }
    if let Some(t) = filter.signal_after {
      qb.push(" AND s.abort_ts > ").push_bind(t.to_string());
    }
    if let Some(t) = filter.signal_before {
      qb.push(" AND s.abort_ts < ").push_bind(t.to_string());
    }
    if filter.first_per_channel {
      qb.push(" ORDER BY a.abort_id, s.channel, s.abort_ts");
    }
    qb.push(") AS signals ORDER BY abort_id, reset_count, trigger_count, interrupt_count, abort_ts");

    let rows = qb.build().fetch_all(&self.pool).await?;
    rows
      .iter()
      .map(|row| -> Result<_, StoreError> {
        Ok(SignalRow {
          abort_id: row.try_get::<Option<i64>, _>("abort_id")?.map(IncidentId),
          abort_ts: timestamp_column(row, "abort_ts")?,
          channel: row.try_get("channel")?,
          message: row.try_get("message")?,
          ring: ring_column(row, "ring")?,
          reset_count: row.try_get("reset_count")?,
          trigger_count: row.try_get("trigger_count")?,
          interrupt_count: row.try_get("interrupt_count")?,
        })
      })
      .collect()
  }
}

fn ring_column(row: &PgRow, column: &str) -> Result<Ring, StoreError> {
  let raw: String = row.try_get(column)?;
  Ring::from_str_loose(&raw).ok_or_else(|| StoreError::Corrupt(format!("{}: unknown ring {:?}", column, raw)))
}

fn timestamp_column(row: &PgRow, column: &str) -> Result<Timestamp, StoreError> {
  let raw: String = row.try_get(column)?;
  Timestamp::parse(&raw).map_err(|e| StoreError::Corrupt(format!("{}: {}", column, e)))
}

/// A unique violation on `aborts.abort_time` means another incident already owns `time`.
fn incident_time_error(err: sqlx_core::Error, time: Timestamp) -> StoreError {
  match &err {
    sqlx_core::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateIncidentTime(time),
    _ => StoreError::Database(err),
  }
}

#[async_trait]
impl IncidentStore for PgStore {
  async fn insert_incident(&self, time: Timestamp) -> Result<IncidentId, StoreError> {
    let row = query::<Postgres>("INSERT INTO aborts (abort_time) VALUES ($1) RETURNING abort_id")
      .bind(time.to_string())
      .fetch_one(&self.pool)
      .await
      .map_err(|e| incident_time_error(e, time))?;
    Ok(IncidentId(row.try_get::<i64, _>("abort_id")?))
  }

  async fn update_incident_time(&self, id: IncidentId, time: Timestamp) -> Result<(), StoreError> {
    let result = query::<Postgres>("UPDATE aborts SET abort_time = $1 WHERE abort_id = $2")
      .bind(time.to_string())
      .bind(id.0)
      .execute(&self.pool)
      .await
      .map_err(|e| incident_time_error(e, time))?;
    if result.rows_affected() == 0 {
      return Err(StoreError::UnknownIncident(id));
    }
    Ok(())
  }

  async fn insert_signal_records(
    &self,
    records: &[SignalRecord],
    incident: Option<IncidentId>,
  ) -> Result<Vec<SignalId>, StoreError> {
    let mut tx = self.pool.begin().await?;
    let mut ids = Vec::with_capacity(records.len());
    for record in records {
      let row = query::<Postgres>(
        r#"
        INSERT INTO abort_signals
          (channel, message, channel_ts, abort_ts, reset_count, trigger_count, interrupt_count)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING signal_id
        "#,
      )
      .bind(&record.channel)
      .bind(&record.message)
      .bind(record.channel_ts.to_string())
      .bind(record.abort_ts.to_string())
      .bind(record.reset_count)
      .bind(record.trigger_count)
      .bind(record.interrupt_count)
      .fetch_one(&mut *tx)
      .await?;
      ids.push(SignalId(row.try_get::<i64, _>("signal_id")?));
    }

    if let Some(abort_id) = incident {
      for id in &ids {
        query::<Postgres>("INSERT INTO abort_list (abort_id, signal_id) VALUES ($1, $2)")
          .bind(abort_id.0)
          .bind(id.0)
          .execute(&mut *tx)
          .await?;
      }
    }

    tx.commit().await?;
    Ok(ids)
  }
}
