//! SQLite-backed status store.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, ToSql, TransactionBehavior};
use tracing::{debug, info, warn};

use super::error::db_err;
use super::{
    generate_order_id, NewOrder, Order, OrderFilter, OrderStatus, PurgeCandidate, Scene,
    SceneCompletion, SceneFilter, SceneRef, SceneStatus, SceneToProcess, StatusError, StatusStore,
};
use crate::options::ProductOptions;

const SCENE_COLUMNS: &str = "s.order_id, s.scene_id, s.status, s.processing_location, s.job_name, \
     s.product_location, s.checksum_location, s.completion_date, s.log, s.note, s.created_at, s.updated_at";

const ORDER_COLUMNS: &str =
    "o.id, o.submitter, o.options, o.status, o.note, o.created_at, o.completion_date, o.notified_at";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed-width UTC timestamps so that string comparison orders correctly.
pub(crate) fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn conversion_err(idx: usize, e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

fn parse_ts(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn parse_opt_ts(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(idx, &v)).transpose()
}

fn parse_status<T: FromStr<Err = String>>(idx: usize, value: &str) -> rusqlite::Result<T> {
    value.parse().map_err(|e: String| conversion_err(idx, e))
}

/// Result of a conditional scene update.
enum Transition {
    Applied,
    Refused(SceneStatus),
    Missing,
}

/// SQLite-backed status store.
pub struct SqliteStatusStore {
    conn: Mutex<Connection>,
}

impl SqliteStatusStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StatusError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        // journal_mode reports the resulting mode as a row.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
            .map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests and single-process runs.
    pub fn in_memory() -> Result<Self, StatusError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StatusError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                submitter TEXT NOT NULL,
                options TEXT NOT NULL,
                status TEXT NOT NULL,
                note TEXT,
                created_at TEXT NOT NULL,
                completion_date TEXT,
                notified_at TEXT
            );

            CREATE TABLE IF NOT EXISTS scenes (
                order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
                scene_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                status TEXT NOT NULL,
                processing_location TEXT,
                job_name TEXT,
                product_location TEXT,
                checksum_location TEXT,
                completion_date TEXT,
                log TEXT,
                note TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (order_id, scene_id)
            );

            CREATE TABLE IF NOT EXISTS configuration (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
            CREATE INDEX IF NOT EXISTS idx_scenes_status ON scenes(status);
            CREATE INDEX IF NOT EXISTS idx_scenes_completion ON scenes(status, completion_date);
            "#,
        )
        .map_err(db_err)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StatusError> {
        self.conn
            .lock()
            .map_err(|_| StatusError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_scene(row: &rusqlite::Row) -> rusqlite::Result<Scene> {
        let status: String = row.get(2)?;
        let created_at: String = row.get(10)?;
        let updated_at: String = row.get(11)?;

        Ok(Scene {
            order_id: row.get(0)?,
            scene_id: row.get(1)?,
            status: parse_status(2, &status)?,
            processing_location: row.get(3)?,
            job_name: row.get(4)?,
            product_location: row.get(5)?,
            checksum_location: row.get(6)?,
            completion_date: parse_opt_ts(7, row.get(7)?)?,
            log: row.get(8)?,
            note: row.get(9)?,
            created_at: parse_ts(10, &created_at)?,
            updated_at: parse_ts(11, &updated_at)?,
        })
    }

    fn row_to_order(row: &rusqlite::Row) -> rusqlite::Result<Order> {
        let options: String = row.get(2)?;
        let status: String = row.get(3)?;
        let created_at: String = row.get(5)?;

        Ok(Order {
            id: row.get(0)?,
            submitter: row.get(1)?,
            options: serde_json::from_str(&options).map_err(|e| conversion_err(2, e))?,
            status: parse_status(3, &status)?,
            note: row.get(4)?,
            created_at: parse_ts(5, &created_at)?,
            completion_date: parse_opt_ts(6, row.get(6)?)?,
            notified_at: parse_opt_ts(7, row.get(7)?)?,
        })
    }

    fn row_to_scene_to_process(row: &rusqlite::Row) -> rusqlite::Result<SceneToProcess> {
        let options: String = row.get(2)?;
        let options: ProductOptions =
            serde_json::from_str(&options).map_err(|e| conversion_err(2, e))?;
        Ok(SceneToProcess {
            order_id: row.get(0)?,
            scene_id: row.get(1)?,
            options,
        })
    }

    /// Conditional update of one scene. `assignments` are extra `col = ?`
    /// fragments with their values.
    fn apply_transition(
        conn: &Connection,
        scene: &SceneRef,
        to: SceneStatus,
        assignments: &[(&str, &dyn ToSql)],
        at: &str,
    ) -> Result<Transition, StatusError> {
        let allowed = to
            .predecessors()
            .iter()
            .chain(std::iter::once(&to))
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sets = vec!["status = ?", "updated_at = ?"];
        sets.extend(assignments.iter().map(|(fragment, _)| *fragment));

        let sql = format!(
            "UPDATE scenes SET {} WHERE order_id = ? AND scene_id = ? AND status IN ({})",
            sets.join(", "),
            allowed
        );

        let status = to.as_str();
        let mut values: Vec<&dyn ToSql> = vec![&status, &at];
        values.extend(assignments.iter().map(|(_, value)| *value));
        values.push(&scene.order_id);
        values.push(&scene.scene_id);

        let changed = conn.execute(&sql, values.as_slice()).map_err(db_err)?;
        if changed > 0 {
            return Ok(Transition::Applied);
        }

        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM scenes WHERE order_id = ? AND scene_id = ?",
                params![scene.order_id, scene.scene_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        match current {
            None => Ok(Transition::Missing),
            Some(current) => Ok(Transition::Refused(
                current.parse().map_err(StatusError::Database)?,
            )),
        }
    }

    fn complete_order_if_finished(
        conn: &Connection,
        order_id: &str,
        at: &str,
    ) -> Result<bool, StatusError> {
        let changed = conn
            .execute(
                "UPDATE orders SET status = 'complete', completion_date = ?2
                 WHERE id = ?1 AND status = 'ordered'
                   AND EXISTS (SELECT 1 FROM scenes WHERE order_id = ?1)
                   AND NOT EXISTS (
                       SELECT 1 FROM scenes WHERE order_id = ?1
                       AND status NOT IN ('complete', 'unavailable', 'purged')
                   )",
                params![order_id, at],
            )
            .map_err(db_err)?;
        if changed > 0 {
            info!(order_id = %order_id, "Order complete");
        }
        Ok(changed > 0)
    }

    /// Apply one transition in its own transaction, completing the order
    /// when the target status is terminal.
    fn transition(
        &self,
        scene: &SceneRef,
        to: SceneStatus,
        assignments: &[(&str, &dyn ToSql)],
    ) -> Result<bool, StatusError> {
        let at = format_ts(&now());
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let outcome = Self::apply_transition(&tx, scene, to, assignments, &at)?;
        if matches!(outcome, Transition::Applied) && to.counts_toward_completion() {
            Self::complete_order_if_finished(&tx, &scene.order_id, &at)?;
        }
        tx.commit().map_err(db_err)?;

        Ok(Self::report(scene, to, outcome))
    }

    fn report(scene: &SceneRef, to: SceneStatus, outcome: Transition) -> bool {
        match outcome {
            Transition::Applied => {
                debug!(order_id = %scene.order_id, scene_id = %scene.scene_id, status = %to, "Scene transitioned");
                true
            }
            Transition::Refused(current) => {
                warn!(
                    order_id = %scene.order_id,
                    scene_id = %scene.scene_id,
                    from = %current,
                    to = %to,
                    "Refused scene transition"
                );
                false
            }
            Transition::Missing => {
                warn!(order_id = %scene.order_id, scene_id = %scene.scene_id, to = %to, "Transition for unknown scene");
                false
            }
        }
    }

    fn validate_new_order(request: &NewOrder) -> Result<(String, Vec<String>), StatusError> {
        let submitter = request.submitter.trim().to_string();
        if submitter.is_empty() {
            return Err(StatusError::InvalidOrder("submitter is required".to_string()));
        }
        if request.scenes.is_empty() {
            return Err(StatusError::InvalidOrder(
                "at least one scene is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut scenes = Vec::with_capacity(request.scenes.len());
        for raw in &request.scenes {
            let scene = raw.trim();
            if scene.is_empty() {
                return Err(StatusError::InvalidOrder("empty scene id".to_string()));
            }
            if !seen.insert(scene.to_string()) {
                return Err(StatusError::InvalidOrder(format!(
                    "duplicate scene id: {}",
                    scene
                )));
            }
            scenes.push(scene.to_string());
        }
        Ok((submitter, scenes))
    }
}

impl StatusStore for SqliteStatusStore {
    fn create_order(&self, request: NewOrder) -> Result<Order, StatusError> {
        let (submitter, scenes) = Self::validate_new_order(&request)?;
        let options_json = serde_json::to_string(&request.options)
            .map_err(|e| StatusError::Database(e.to_string()))?;

        let created_at = now();
        let at = format_ts(&created_at);
        let base_id = generate_order_id(&submitter, created_at);

        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let mut id = base_id.clone();
        let mut suffix = 1;
        while tx
            .query_row("SELECT 1 FROM orders WHERE id = ?", params![id], |_| Ok(()))
            .optional()
            .map_err(db_err)?
            .is_some()
        {
            suffix += 1;
            id = format!("{}-{}", base_id, suffix);
        }

        tx.execute(
            "INSERT INTO orders (id, submitter, options, status, note, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                id,
                submitter,
                options_json,
                OrderStatus::Ordered.as_str(),
                request.note,
                at
            ],
        )
        .map_err(db_err)?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO scenes (order_id, scene_id, position, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
                )
                .map_err(db_err)?;
            for (position, scene) in scenes.iter().enumerate() {
                stmt.execute(params![
                    id,
                    scene,
                    position as i64,
                    SceneStatus::Submitted.as_str(),
                    at,
                    at
                ])
                .map_err(db_err)?;
            }
        }

        tx.commit().map_err(db_err)?;
        info!(order_id = %id, scenes = scenes.len(), "Order created");

        Ok(Order {
            id,
            submitter,
            options: request.options,
            status: OrderStatus::Ordered,
            note: request.note,
            created_at,
            completion_date: None,
            notified_at: None,
        })
    }

    fn get_order(&self, order_id: &str) -> Result<Option<Order>, StatusError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM orders o WHERE o.id = ?", ORDER_COLUMNS),
            params![order_id],
            Self::row_to_order,
        )
        .optional()
        .map_err(db_err)
    }

    fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StatusError> {
        let conn = self.lock()?;

        let mut conditions = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(status) = filter.status {
            conditions.push("o.status = ?");
            values.push(Box::new(status.as_str()));
        }
        if let Some(ref submitter) = filter.submitter {
            conditions.push("o.submitter = ?");
            values.push(Box::new(submitter.clone()));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        values.push(Box::new(filter.limit));
        values.push(Box::new(filter.offset));

        let sql = format!(
            "SELECT {} FROM orders o {} ORDER BY o.created_at ASC, o.id ASC LIMIT ? OFFSET ?",
            ORDER_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt
            .query_map(refs.as_slice(), Self::row_to_order)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn get_scene(&self, scene: &SceneRef) -> Result<Option<Scene>, StatusError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM scenes s WHERE s.order_id = ? AND s.scene_id = ?",
                SCENE_COLUMNS
            ),
            params![scene.order_id, scene.scene_id],
            Self::row_to_scene,
        )
        .optional()
        .map_err(db_err)
    }

    fn list_scenes(&self, filter: &SceneFilter) -> Result<Vec<Scene>, StatusError> {
        let conn = self.lock()?;

        let mut conditions = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(ref order_id) = filter.order_id {
            conditions.push("s.order_id = ?");
            values.push(Box::new(order_id.clone()));
        }
        if let Some(status) = filter.status {
            conditions.push("s.status = ?");
            values.push(Box::new(status.as_str()));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        values.push(Box::new(filter.limit));
        values.push(Box::new(filter.offset));

        let sql = format!(
            "SELECT {} FROM scenes s JOIN orders o ON o.id = s.order_id {} \
             ORDER BY o.created_at ASC, s.order_id ASC, s.position ASC LIMIT ? OFFSET ?",
            SCENE_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt
            .query_map(refs.as_slice(), Self::row_to_scene)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn count_scenes_by_status(&self) -> Result<Vec<(SceneStatus, i64)>, StatusError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM scenes GROUP BY status ORDER BY status")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                Ok((parse_status::<SceneStatus>(0, &status)?, row.get(1)?))
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn scenes_to_process(&self, limit: usize) -> Result<Vec<SceneToProcess>, StatusError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT s.order_id, s.scene_id, o.options FROM scenes s
                 JOIN orders o ON o.id = s.order_id
                 WHERE s.status = 'on_cache'
                 ORDER BY o.created_at ASC, s.order_id ASC, s.position ASC
                 LIMIT ?",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![limit as i64], Self::row_to_scene_to_process)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn scenes_in_error(&self, order_id: Option<&str>) -> Result<Vec<SceneToProcess>, StatusError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT s.order_id, s.scene_id, o.options FROM scenes s
                 JOIN orders o ON o.id = s.order_id
                 WHERE s.status = 'error' AND (?1 IS NULL OR s.order_id = ?1)
                 ORDER BY o.created_at ASC, s.order_id ASC, s.position ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![order_id], Self::row_to_scene_to_process)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn queue_scenes(
        &self,
        scenes: &[SceneRef],
        location: &str,
        job_name: &str,
    ) -> Result<usize, StatusError> {
        let at = format_ts(&now());
        let no_log: Option<String> = None;
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let mut queued = 0;
        for scene in scenes {
            let outcome = Self::apply_transition(
                &tx,
                scene,
                SceneStatus::Queued,
                &[
                    ("processing_location = ?", &location),
                    ("job_name = ?", &job_name),
                    ("log = ?", &no_log),
                ],
                &at,
            )?;
            if Self::report(scene, SceneStatus::Queued, outcome) {
                queued += 1;
            }
        }

        // Dropping the transaction on any error above rolls every scene back.
        tx.commit().map_err(db_err)?;
        info!(job_name = %job_name, queued, requested = scenes.len(), "Scenes queued");
        Ok(queued)
    }

    fn update_status(
        &self,
        scene: &SceneRef,
        location: &str,
        status: SceneStatus,
    ) -> Result<bool, StatusError> {
        if !status.is_generic_target() {
            warn!(
                order_id = %scene.order_id,
                scene_id = %scene.scene_id,
                to = %status,
                "Status needs its dedicated operation; generic update refused"
            );
            return Ok(false);
        }
        let no_log: Option<String> = None;
        self.transition(
            scene,
            status,
            &[("processing_location = ?", &location), ("log = ?", &no_log)],
        )
    }

    fn set_error(&self, scene: &SceneRef, location: &str, log: &str) -> Result<bool, StatusError> {
        self.transition(
            scene,
            SceneStatus::Error,
            &[("processing_location = ?", &location), ("log = ?", &log)],
        )
    }

    fn set_unavailable(
        &self,
        scene: &SceneRef,
        location: &str,
        log: &str,
        note: Option<&str>,
    ) -> Result<bool, StatusError> {
        self.transition(
            scene,
            SceneStatus::Unavailable,
            &[
                ("processing_location = ?", &location),
                ("log = ?", &log),
                ("note = ?", &note),
            ],
        )
    }

    fn mark_complete(&self, completion: &SceneCompletion) -> Result<bool, StatusError> {
        let at = format_ts(&now());
        self.transition(
            &completion.scene_ref(),
            SceneStatus::Complete,
            &[
                ("processing_location = ?", &completion.location),
                ("product_location = ?", &completion.product_location),
                ("checksum_location = ?", &completion.checksum_location),
                ("log = ?", &completion.log),
                ("completion_date = COALESCE(completion_date, ?)", &at),
            ],
        )
    }

    fn scenes_to_purge(&self, cutoff: DateTime<Utc>) -> Result<Vec<PurgeCandidate>, StatusError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT order_id, scene_id, product_location, checksum_location, completion_date
                 FROM scenes
                 WHERE status = 'complete' AND completion_date IS NOT NULL AND completion_date < ?
                 ORDER BY completion_date ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![format_ts(&cutoff)], |row| {
                let completion_date: String = row.get(4)?;
                Ok(PurgeCandidate {
                    order_id: row.get(0)?,
                    scene_id: row.get(1)?,
                    product_location: row.get(2)?,
                    checksum_location: row.get(3)?,
                    completion_date: parse_ts(4, &completion_date)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn mark_purged(&self, scene: &SceneRef) -> Result<bool, StatusError> {
        self.transition(scene, SceneStatus::Purged, &[])
    }

    fn complete_finished_orders(&self) -> Result<Vec<Order>, StatusError> {
        let at = format_ts(&now());
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let completed = tx
            .execute(
                "UPDATE orders SET status = 'complete', completion_date = ?1
                 WHERE status = 'ordered'
                   AND EXISTS (SELECT 1 FROM scenes s WHERE s.order_id = orders.id)
                   AND NOT EXISTS (
                       SELECT 1 FROM scenes s WHERE s.order_id = orders.id
                       AND s.status NOT IN ('complete', 'unavailable', 'purged')
                   )",
                params![at],
            )
            .map_err(db_err)?;
        if completed > 0 {
            info!(completed, "Completed finished orders");
        }

        let pending = {
            let mut stmt = tx
                .prepare(&format!(
                    "SELECT {} FROM orders o WHERE o.status = 'complete' AND o.notified_at IS NULL
                     ORDER BY o.completion_date ASC, o.id ASC",
                    ORDER_COLUMNS
                ))
                .map_err(db_err)?;
            let rows = stmt.query_map([], Self::row_to_order).map_err(db_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)?
        };

        tx.commit().map_err(db_err)?;
        Ok(pending)
    }

    fn mark_order_notified(&self, order_id: &str) -> Result<bool, StatusError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE orders SET notified_at = ? WHERE id = ? AND status = 'complete' AND notified_at IS NULL",
                params![format_ts(&now()), order_id],
            )
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    fn reset_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
        log: &str,
    ) -> Result<Vec<SceneRef>, StatusError> {
        let cutoff = format_ts(&cutoff);
        let at = format_ts(&now());
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let stale: Vec<(SceneRef, Option<String>, String)> = {
            let mut stmt = tx
                .prepare(
                    "SELECT order_id, scene_id, processing_location, updated_at FROM scenes
                     WHERE status = 'processing' AND updated_at < ?",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![cutoff], |row| {
                    Ok((
                        SceneRef::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                        row.get(2)?,
                        row.get(3)?,
                    ))
                })
                .map_err(db_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)?
        };

        let mut reset = Vec::with_capacity(stale.len());
        for (scene, location, since) in stale {
            let message = format!(
                "{} (location: {}, processing since {})",
                log,
                location.as_deref().unwrap_or("unknown"),
                since
            );
            let changed = tx
                .execute(
                    "UPDATE scenes SET status = 'error', log = ?, updated_at = ?
                     WHERE order_id = ? AND scene_id = ? AND status = 'processing' AND updated_at < ?",
                    params![message, at, scene.order_id, scene.scene_id, cutoff],
                )
                .map_err(db_err)?;
            if changed > 0 {
                warn!(order_id = %scene.order_id, scene_id = %scene.scene_id, since = %since, "Stale processing scene moved to error");
                reset.push(scene);
            }
        }

        tx.commit().map_err(db_err)?;
        Ok(reset)
    }

    fn count_stale_queued(&self, cutoff: DateTime<Utc>) -> Result<i64, StatusError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM scenes WHERE status = 'queued' AND updated_at < ?",
            params![format_ts(&cutoff)],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>, StatusError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM configuration WHERE key = ?",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), StatusError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO configuration (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    const LANDSAT: &str = "LT50440341996220XXX01";
    const LANDSAT_2: &str = "LE70290302003142EDC00";
    const MODIS: &str = "MOD09GA.A2014001.h10v04.005.2014002032553";

    fn create_test_store() -> SqliteStatusStore {
        SqliteStatusStore::in_memory().unwrap()
    }

    fn create_order(store: &SqliteStatusStore, scenes: &[&str]) -> Order {
        store
            .create_order(NewOrder {
                submitter: "analyst@example.org".to_string(),
                options: ProductOptions::new().with("include_sr", true),
                scenes: scenes.iter().map(|s| s.to_string()).collect(),
                note: None,
            })
            .unwrap()
    }

    fn scene(order: &Order, scene_id: &str) -> SceneRef {
        SceneRef::new(&order.id, scene_id)
    }

    fn status_of(store: &SqliteStatusStore, scene: &SceneRef) -> SceneStatus {
        store.get_scene(scene).unwrap().unwrap().status
    }

    /// Walk a scene forward to `processing`.
    fn to_processing(store: &SqliteStatusStore, scene: &SceneRef) {
        assert!(store.update_status(scene, "intake", SceneStatus::OnCache).unwrap());
        assert_eq!(
            store.queue_scenes(std::slice::from_ref(scene), "dispatcher", "job-1").unwrap(),
            1
        );
        assert!(store.update_status(scene, "worker-1", SceneStatus::Processing).unwrap());
    }

    fn completion(scene: &SceneRef) -> SceneCompletion {
        SceneCompletion {
            order_id: scene.order_id.clone(),
            scene_id: scene.scene_id.clone(),
            location: "worker-1".to_string(),
            product_location: format!("/cache/orders/{}/product.tar.gz", scene.order_id),
            checksum_location: format!("/cache/orders/{}/product.md5", scene.order_id),
            log: Some("ok".to_string()),
        }
    }

    #[test]
    fn test_create_order() {
        let store = create_test_store();
        let order = create_order(&store, &[LANDSAT, MODIS]);

        assert!(order.id.starts_with("analyst-"));
        assert_eq!(order.status, OrderStatus::Ordered);

        let fetched = store.get_order(&order.id).unwrap().unwrap();
        assert_eq!(fetched, order);

        let scenes = store
            .list_scenes(&SceneFilter::new().with_order(&order.id))
            .unwrap();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].scene_id, LANDSAT);
        assert_eq!(scenes[1].scene_id, MODIS);
        assert!(scenes.iter().all(|s| s.status == SceneStatus::Submitted));
    }

    #[test]
    fn test_create_order_id_collision_gets_suffix() {
        let store = create_test_store();
        let first = create_order(&store, &[LANDSAT]);
        let second = create_order(&store, &[LANDSAT]);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_create_order_validation() {
        let store = create_test_store();
        let bad = |submitter: &str, scenes: Vec<&str>| {
            store.create_order(NewOrder {
                submitter: submitter.to_string(),
                options: ProductOptions::new(),
                scenes: scenes.into_iter().map(String::from).collect(),
                note: None,
            })
        };

        assert!(matches!(bad("", vec![LANDSAT]), Err(StatusError::InvalidOrder(_))));
        assert!(matches!(bad("a@b", vec![]), Err(StatusError::InvalidOrder(_))));
        assert!(matches!(bad("a@b", vec!["  "]), Err(StatusError::InvalidOrder(_))));
        assert!(matches!(
            bad("a@b", vec![LANDSAT, LANDSAT]),
            Err(StatusError::InvalidOrder(_))
        ));
        assert!(store.list_orders(&OrderFilter::new()).unwrap().is_empty());
    }

    #[test]
    fn test_get_nonexistent() {
        let store = create_test_store();
        assert!(store.get_order("nobody-010101-000000").unwrap().is_none());
        assert!(store
            .get_scene(&SceneRef::new("nobody", LANDSAT))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_refused_transition_returns_false() {
        let store = create_test_store();
        let order = create_order(&store, &[LANDSAT]);
        let s = scene(&order, LANDSAT);

        assert!(!store.update_status(&s, "x", SceneStatus::Complete).unwrap());
        assert!(!store.update_status(&s, "x", SceneStatus::Processing).unwrap());
        assert!(!store.mark_complete(&completion(&s)).unwrap());
        assert_eq!(status_of(&store, &s), SceneStatus::Submitted);
    }

    #[test]
    fn test_update_status_refuses_dedicated_targets() {
        let store = create_test_store();
        let order = create_order(&store, &[LANDSAT]);
        let s = scene(&order, LANDSAT);
        to_processing(&store, &s);

        // Permitted edges, but each needs its own operation.
        for status in [
            SceneStatus::Complete,
            SceneStatus::Error,
            SceneStatus::Unavailable,
        ] {
            assert!(!store.update_status(&s, "worker-1", status).unwrap());
        }
        assert_eq!(status_of(&store, &s), SceneStatus::Processing);
        assert_eq!(
            store.get_order(&order.id).unwrap().unwrap().status,
            OrderStatus::Ordered
        );

        assert!(store.mark_complete(&completion(&s)).unwrap());
        assert!(!store.update_status(&s, "finalizer", SceneStatus::Purged).unwrap());

        let stored = store.get_scene(&s).unwrap().unwrap();
        assert_eq!(stored.status, SceneStatus::Complete);
        assert!(stored.completion_date.is_some());
        assert!(stored.product_location.is_some());
    }

    #[test]
    fn test_unknown_scene_returns_false() {
        let store = create_test_store();
        let s = SceneRef::new("missing", LANDSAT);
        assert!(!store.update_status(&s, "x", SceneStatus::OnCache).unwrap());
    }

    #[test]
    fn test_reapplying_status_is_idempotent() {
        let store = create_test_store();
        let order = create_order(&store, &[LANDSAT]);
        let s = scene(&order, LANDSAT);

        assert!(store.update_status(&s, "intake", SceneStatus::OnCache).unwrap());
        assert!(store.update_status(&s, "intake", SceneStatus::OnCache).unwrap());
        assert_eq!(status_of(&store, &s), SceneStatus::OnCache);
    }

    #[test]
    fn test_scenes_to_process_ordering() {
        let store = create_test_store();
        let first = create_order(&store, &[LANDSAT_2, LANDSAT]);
        let second = create_order(&store, &[MODIS]);

        for (order, id) in [(&second, MODIS), (&first, LANDSAT), (&first, LANDSAT_2)] {
            store
                .update_status(&scene(order, id), "intake", SceneStatus::OnCache)
                .unwrap();
        }

        let ready = store.scenes_to_process(10).unwrap();
        let ids: Vec<&str> = ready.iter().map(|s| s.scene_id.as_str()).collect();
        assert_eq!(ids, vec![LANDSAT_2, LANDSAT, MODIS]);
        assert!(ready[0].options.flag("include_sr"));

        assert_eq!(store.scenes_to_process(1).unwrap().len(), 1);
    }

    #[test]
    fn test_queue_scenes_skips_ineligible() {
        let store = create_test_store();
        let order = create_order(&store, &[LANDSAT, MODIS]);
        let ready = scene(&order, LANDSAT);
        let not_ready = scene(&order, MODIS);
        store
            .update_status(&ready, "intake", SceneStatus::OnCache)
            .unwrap();

        let queued = store
            .queue_scenes(&[ready.clone(), not_ready.clone()], "dispatcher", "job-7")
            .unwrap();
        assert_eq!(queued, 1);

        let queued_scene = store.get_scene(&ready).unwrap().unwrap();
        assert_eq!(queued_scene.status, SceneStatus::Queued);
        assert_eq!(queued_scene.job_name.as_deref(), Some("job-7"));
        assert_eq!(status_of(&store, &not_ready), SceneStatus::Submitted);
        assert!(store.scenes_to_process(10).unwrap().is_empty());
    }

    #[test]
    fn test_order_completes_when_all_scenes_finish() {
        let store = create_test_store();
        let order = create_order(&store, &[LANDSAT, MODIS]);
        let landsat = scene(&order, LANDSAT);
        let modis = scene(&order, MODIS);

        to_processing(&store, &landsat);
        assert!(store.mark_complete(&completion(&landsat)).unwrap());
        assert_eq!(
            store.get_order(&order.id).unwrap().unwrap().status,
            OrderStatus::Ordered
        );

        assert!(store
            .set_unavailable(&modis, "intake", "input missing", Some("not archived"))
            .unwrap());
        let finished = store.get_order(&order.id).unwrap().unwrap();
        assert_eq!(finished.status, OrderStatus::Complete);
        assert!(finished.completion_date.is_some());

        let modis_scene = store.get_scene(&modis).unwrap().unwrap();
        assert_eq!(modis_scene.note.as_deref(), Some("not archived"));
    }

    #[test]
    fn test_error_keeps_order_open_and_can_be_retried() {
        let store = create_test_store();
        let order = create_order(&store, &[LANDSAT]);
        let s = scene(&order, LANDSAT);

        to_processing(&store, &s);
        assert!(store.set_error(&s, "worker-1", "cfmask exited 2").unwrap());
        assert_eq!(
            store.get_scene(&s).unwrap().unwrap().log.as_deref(),
            Some("cfmask exited 2")
        );
        assert!(store.complete_finished_orders().unwrap().is_empty());

        let retry = store.scenes_in_error(Some(&order.id)).unwrap();
        assert_eq!(retry.len(), 1);
        assert!(store.scenes_in_error(Some("other")).unwrap().is_empty());

        assert_eq!(store.queue_scenes(&[s.clone()], "retry", "job-2").unwrap(), 1);
        assert_eq!(status_of(&store, &s), SceneStatus::Queued);
        assert!(store.get_scene(&s).unwrap().unwrap().log.is_none());
    }

    #[test]
    fn test_mark_complete_records_locations() {
        let store = create_test_store();
        let order = create_order(&store, &[LANDSAT]);
        let s = scene(&order, LANDSAT);
        to_processing(&store, &s);

        let done = completion(&s);
        assert!(store.mark_complete(&done).unwrap());
        let stored = store.get_scene(&s).unwrap().unwrap();
        assert_eq!(stored.status, SceneStatus::Complete);
        assert_eq!(stored.product_location.as_deref(), Some(done.product_location.as_str()));
        assert_eq!(stored.checksum_location.as_deref(), Some(done.checksum_location.as_str()));
        let first_completion = stored.completion_date.unwrap();

        // A duplicate report keeps the original completion date.
        assert!(store.mark_complete(&done).unwrap());
        let again = store.get_scene(&s).unwrap().unwrap();
        assert_eq!(again.completion_date, Some(first_completion));
    }

    #[test]
    fn test_purge_cutoff_is_exclusive() {
        let store = create_test_store();
        let order = create_order(&store, &[LANDSAT]);
        let s = scene(&order, LANDSAT);
        to_processing(&store, &s);
        store.mark_complete(&completion(&s)).unwrap();
        let completed_at = store.get_scene(&s).unwrap().unwrap().completion_date.unwrap();

        assert!(store.scenes_to_purge(completed_at).unwrap().is_empty());
        let candidates = store
            .scenes_to_purge(completed_at + ChronoDuration::microseconds(1))
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].scene_ref(), s);

        assert!(store.mark_purged(&s).unwrap());
        assert_eq!(status_of(&store, &s), SceneStatus::Purged);
        assert!(store
            .scenes_to_purge(completed_at + ChronoDuration::days(1))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_mark_purged_only_from_complete() {
        let store = create_test_store();
        let order = create_order(&store, &[LANDSAT]);
        let s = scene(&order, LANDSAT);
        to_processing(&store, &s);
        store.set_error(&s, "worker-1", "boom").unwrap();

        assert!(!store.mark_purged(&s).unwrap());
        assert_eq!(status_of(&store, &s), SceneStatus::Error);
    }

    #[test]
    fn test_complete_finished_orders_and_notification_guard() {
        let store = create_test_store();
        let order = create_order(&store, &[LANDSAT]);
        let s = scene(&order, LANDSAT);
        to_processing(&store, &s);
        store.mark_complete(&completion(&s)).unwrap();

        let pending = store.complete_finished_orders().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, order.id);

        assert!(store.mark_order_notified(&order.id).unwrap());
        assert!(!store.mark_order_notified(&order.id).unwrap());
        assert!(store.complete_finished_orders().unwrap().is_empty());
        assert!(store.get_order(&order.id).unwrap().unwrap().notified_at.is_some());
    }

    #[test]
    fn test_mark_notified_requires_complete_order() {
        let store = create_test_store();
        let order = create_order(&store, &[LANDSAT]);
        assert!(!store.mark_order_notified(&order.id).unwrap());
    }

    #[test]
    fn test_reset_stale_processing() {
        let store = create_test_store();
        let order = create_order(&store, &[LANDSAT, MODIS]);
        let stale = scene(&order, LANDSAT);
        let queued = scene(&order, MODIS);
        to_processing(&store, &stale);
        store.update_status(&queued, "intake", SceneStatus::OnCache).unwrap();
        store.queue_scenes(&[queued.clone()], "dispatcher", "job-1").unwrap();

        let past = Utc::now() - ChronoDuration::hours(1);
        assert!(store.reset_stale_processing(past, "stale").unwrap().is_empty());

        let future = Utc::now() + ChronoDuration::hours(1);
        let reset = store
            .reset_stale_processing(future, "no progress reported")
            .unwrap();
        assert_eq!(reset, vec![stale.clone()]);

        let scene = store.get_scene(&stale).unwrap().unwrap();
        assert_eq!(scene.status, SceneStatus::Error);
        let log = scene.log.unwrap();
        assert!(log.starts_with("no progress reported"));
        assert!(log.contains("worker-1"));

        assert_eq!(status_of(&store, &queued), SceneStatus::Queued);
        assert_eq!(store.count_stale_queued(future).unwrap(), 1);
        assert_eq!(store.count_stale_queued(past).unwrap(), 0);
    }

    #[test]
    fn test_count_scenes_by_status() {
        let store = create_test_store();
        let order = create_order(&store, &[LANDSAT, MODIS, LANDSAT_2]);
        store
            .update_status(&scene(&order, MODIS), "intake", SceneStatus::OnCache)
            .unwrap();

        let counts = store.count_scenes_by_status().unwrap();
        assert!(counts.contains(&(SceneStatus::Submitted, 2)));
        assert!(counts.contains(&(SceneStatus::OnCache, 1)));
    }

    #[test]
    fn test_list_orders_with_filter() {
        let store = create_test_store();
        let open = create_order(&store, &[LANDSAT]);
        let done = create_order(&store, &[MODIS]);
        store
            .set_unavailable(&scene(&done, MODIS), "intake", "gone", None)
            .unwrap();

        let complete = store
            .list_orders(&OrderFilter::new().with_status(OrderStatus::Complete))
            .unwrap();
        assert_eq!(complete.len(), 1);
        assert_eq!(complete[0].id, done.id);

        let ordered = store
            .list_orders(&OrderFilter::new().with_status(OrderStatus::Ordered))
            .unwrap();
        assert_eq!(ordered[0].id, open.id);

        let by_submitter = store
            .list_orders(&OrderFilter::new().with_submitter("someone-else"))
            .unwrap();
        assert!(by_submitter.is_empty());

        let paged = store
            .list_orders(&OrderFilter::new().with_limit(1).with_offset(1))
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].id, done.id);
    }

    #[test]
    fn test_settings() {
        let store = create_test_store();
        assert!(store.get_setting("landsat.ftp.host").unwrap().is_none());
        store.set_setting("landsat.ftp.host", "edclpdsftp").unwrap();
        store.set_setting("landsat.ftp.host", "edclxs").unwrap();
        assert_eq!(
            store.get_setting("landsat.ftp.host").unwrap().as_deref(),
            Some("edclxs")
        );
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("status.db");

        let order_id = {
            let store = SqliteStatusStore::new(&db_path).unwrap();
            create_order(&store, &[LANDSAT]).id
        };

        let reopened = SqliteStatusStore::new(&db_path).unwrap();
        let order = reopened.get_order(&order_id).unwrap().unwrap();
        assert_eq!(order.submitter, "analyst@example.org");
    }
}
