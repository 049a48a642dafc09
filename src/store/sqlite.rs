use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::schema::SCHEMA;
use super::{MAX_LIST_ITEMS, ReleaseStore, SeekAttr};
use crate::error::{Error, Result};
use crate::types::{GitInfo, ReleasePatch};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn encode_record(record: &GitInfo) -> Result<String> {
    serde_json::to_string(record)
        .map_err(|e| Error::Internal(format!("encode release record: {e}")))
}

fn decode_record(raw: &str) -> Result<GitInfo> {
    serde_json::from_str(raw).map_err(|e| Error::Internal(format!("decode release record: {e}")))
}

impl ReleaseStore for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn create(
        &self,
        namespace: &str,
        app: &str,
        revision: &str,
        record: &GitInfo,
    ) -> Result<GitInfo> {
        let mut stored = record.clone();
        stored.created_at = Utc::now();
        let raw = encode_record(&stored)?;

        let result = self.conn().execute(
            "INSERT INTO releases (namespace, app, revision, record, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                namespace,
                app,
                revision,
                raw,
                format_datetime(&stored.created_at)
            ],
        );

        match result {
            Ok(_) => Ok(stored),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::AlreadyExists)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn update(
        &self,
        namespace: &str,
        app: &str,
        revision: &str,
        patch: &ReleasePatch,
    ) -> Result<GitInfo> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let raw: Option<String> = tx
            .query_row(
                "SELECT record FROM releases WHERE namespace = ?1 AND app = ?2 AND revision = ?3",
                params![namespace, app, revision],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = raw else {
            return Err(Error::NotFound);
        };

        let mut record = decode_record(&raw)?;
        for (name, size) in &patch.files {
            record.files.insert(name.clone(), *size);
        }
        if let Some(status) = &patch.status {
            record.status = status.clone();
        }

        tx.execute(
            "UPDATE releases SET record = ?4 WHERE namespace = ?1 AND app = ?2 AND revision = ?3",
            params![namespace, app, revision, encode_record(&record)?],
        )?;
        tx.commit()?;

        Ok(record)
    }

    fn get(&self, namespace: &str, app: &str, revision: &str) -> Result<Option<GitInfo>> {
        let conn = self.conn();
        let raw: Option<String> = conn
            .query_row(
                "SELECT record FROM releases WHERE namespace = ?1 AND app = ?2 AND revision = ?3",
                params![namespace, app, revision],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|raw| decode_record(&raw)).transpose()
    }

    fn list(&self, namespace: &str, app: &str) -> Result<Vec<GitInfo>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT record FROM releases WHERE namespace = ?1 AND app = ?2
             ORDER BY rowid LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![namespace, app, MAX_LIST_ITEMS as i64], |row| {
            row.get::<_, String>(0)
        })?;

        let mut records = Vec::new();
        for raw in rows {
            records.push(decode_record(&raw?)?);
        }
        Ok(records)
    }

    fn seek(
        &self,
        namespace: &str,
        app: &str,
        attr: SeekAttr,
        value: &str,
    ) -> Result<Vec<GitInfo>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT record FROM releases WHERE namespace = ?1 AND app = ?2 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![namespace, app], |row| row.get::<_, String>(0))?;

        let mut matches = Vec::new();
        for raw in rows {
            let record = decode_record(&raw?)?;
            let field = match attr {
                SeekAttr::Source => &record.source_type,
                SeekAttr::KubeRef => &record.kube_ref,
                SeekAttr::Status => &record.status,
            };
            if field == value {
                matches.push(record);
            }
        }
        Ok(matches)
    }
}
