//! [`EnrollmentStore`] — identity → reference embeddings, backed by SQLite.
//!
//! The store is read wholesale with [`load`](EnrollmentStore::load) and
//! written either one identity at a time with
//! [`insert`](EnrollmentStore::insert) or wholesale with
//! [`save`](EnrollmentStore::save). Every write runs in a single transaction,
//! so a crash mid-write leaves the previous contents intact.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rollcall_core::{Embedding, Enrollment};
use rusqlite::{params, Connection, OptionalExtension as _};

use crate::encode::{decode_vector, encode_vector};
use crate::error::EnrollmentError;
use crate::schema::SCHEMA;

type Result<T, E = EnrollmentError> = std::result::Result<T, E>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

pub struct EnrollmentStore {
    conn: Connection,
}

impl EnrollmentStore {
    /// Open (or create) a store at `path` and run schema initialisation.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init(conn)
    }

    /// Open an in-memory store — useful for testing.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn contains(&self, identity: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM enrollments WHERE identity = ?1",
                params![identity],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(found)
    }

    /// Enrolled identities in enrollment order.
    pub fn identities(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT identity FROM enrollments ORDER BY seq")?;
        let identities = stmt
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(identities)
    }

    pub fn len(&self) -> Result<usize> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM enrollments", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Load every enrollment, in enrollment order.
    ///
    /// Fails with [`EnrollmentError::MalformedRecord`] if any identity has no
    /// reference embedding or a corrupt one.
    pub fn load(&self) -> Result<Vec<Enrollment>> {
        let mut stmt = self
            .conn
            .prepare("SELECT identity, created_at FROM enrollments ORDER BY seq")?;
        let heads = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut refs_stmt = self.conn.prepare(
            "SELECT dim, model_version, vector FROM reference_embeddings
             WHERE identity = ?1 ORDER BY position",
        )?;

        let mut gallery = Vec::with_capacity(heads.len());
        for (identity, created_at) in heads {
            let raw = refs_stmt
                .query_map(params![identity], |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, Option<String>>(1)?,
                        r.get::<_, Vec<u8>>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let references = raw
                .into_iter()
                .map(|(dim, model_version, blob)| decode_reference(&identity, dim, model_version, &blob))
                .collect::<Result<Vec<_>>>()?;

            if references.is_empty() {
                return Err(EnrollmentError::MalformedRecord {
                    identity,
                    reason: "no reference embedding".into(),
                });
            }

            gallery.push(Enrollment {
                identity,
                references,
                created_at,
            });
        }

        tracing::debug!(students = gallery.len(), "loaded enrollment store");
        Ok(gallery)
    }

    /// Add one new identity. Rejects an identity that is already enrolled.
    pub fn insert(&mut self, enrollment: &Enrollment) -> Result<()> {
        let tx = self.conn.transaction()?;
        let exists = tx
            .query_row(
                "SELECT 1 FROM enrollments WHERE identity = ?1",
                params![enrollment.identity],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            return Err(EnrollmentError::DuplicateIdentity(enrollment.identity.clone()));
        }

        insert_enrollment(&tx, enrollment)?;
        tx.commit()?;

        tracing::info!(
            identity = %enrollment.identity,
            references = enrollment.references.len(),
            "enrollment stored"
        );
        Ok(())
    }

    /// Replace the whole store with `gallery`, preserving its order.
    pub fn save(&mut self, gallery: &[Enrollment]) -> Result<()> {
        let mut seen = HashSet::new();
        if let Some(dup) = gallery.iter().find(|e| !seen.insert(e.identity.as_str())) {
            return Err(EnrollmentError::DuplicateIdentity(dup.identity.clone()));
        }

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM reference_embeddings", [])?;
        tx.execute("DELETE FROM enrollments", [])?;
        for enrollment in gallery {
            insert_enrollment(&tx, enrollment)?;
        }
        tx.commit()?;

        tracing::info!(students = gallery.len(), "enrollment store saved");
        Ok(())
    }
}

fn insert_enrollment(conn: &Connection, enrollment: &Enrollment) -> Result<()> {
    conn.execute(
        "INSERT INTO enrollments (identity, created_at) VALUES (?1, ?2)",
        params![enrollment.identity, enrollment.created_at],
    )?;
    for (position, reference) in enrollment.references.iter().enumerate() {
        conn.execute(
            "INSERT INTO reference_embeddings (identity, position, dim, model_version, vector)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                enrollment.identity,
                position as i64,
                reference.dim() as i64,
                reference.model_version,
                encode_vector(&reference.values),
            ],
        )?;
    }
    Ok(())
}

fn decode_reference(
    identity: &str,
    dim: i64,
    model_version: Option<String>,
    blob: &[u8],
) -> Result<Embedding> {
    let malformed = |reason: String| EnrollmentError::MalformedRecord {
        identity: identity.to_string(),
        reason,
    };

    let values = decode_vector(blob)
        .ok_or_else(|| malformed(format!("embedding blob of {} bytes is not f32-aligned", blob.len())))?;
    if values.is_empty() || values.len() as i64 != dim {
        return Err(malformed(format!(
            "embedding has {} values, record says {dim}",
            values.len()
        )));
    }

    Ok(Embedding {
        values,
        model_version,
    })
}
