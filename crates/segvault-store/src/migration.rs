//! Database schema migrations for SQLite.
//!
//! A simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 2;

/// Initialize or migrate the database schema.
///
/// Idempotent: it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, segvault_core::now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        2 => apply_v2(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: catalog and payment ledger.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE videos (
            video_id TEXT PRIMARY KEY,
            root_secret_enc BLOB,             -- CBOR envelope, never plaintext
            duration_ms INTEGER NOT NULL,
            mode TEXT NOT NULL,               -- dek | seal | both
            created_at INTEGER NOT NULL
        );

        CREATE TABLE renditions (
            video_id TEXT NOT NULL REFERENCES videos(video_id),
            scheme TEXT NOT NULL,             -- dek | seal
            name TEXT NOT NULL,
            bitrate INTEGER NOT NULL,
            width INTEGER NOT NULL,
            height INTEGER NOT NULL,
            PRIMARY KEY (video_id, scheme, name)
        );

        CREATE TABLE segments (
            video_id TEXT NOT NULL,
            scheme TEXT NOT NULL,
            rendition TEXT NOT NULL,
            seg_idx INTEGER NOT NULL,         -- -1 for init
            blob_id TEXT NOT NULL,
            iv BLOB,                          -- 12 bytes, NULL for init
            size INTEGER NOT NULL,
            stored_dek BLOB,                  -- legacy envelope; NULL when derived
            PRIMARY KEY (video_id, scheme, rendition, seg_idx),
            FOREIGN KEY (video_id, scheme, rendition)
                REFERENCES renditions(video_id, scheme, name)
        );

        CREATE TABLE access_records (
            video_id TEXT NOT NULL,
            payer TEXT NOT NULL,
            chain TEXT NOT NULL,
            kind TEXT NOT NULL,               -- payment | subscription
            paid_segments BLOB NOT NULL,      -- CBOR array of u32
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (video_id, payer, chain)
        );

        CREATE INDEX idx_access_payer ON access_records(payer);
        "#,
    )?;

    Ok(())
}

/// Migration v2: threshold path (sealed roots and creator channels).
fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        ALTER TABLE videos ADD COLUMN sealed_root BLOB;
        ALTER TABLE videos ADD COLUMN channel_id TEXT;

        CREATE TABLE creator_configs (
            channel_id TEXT PRIMARY KEY,
            policy_object BLOB NOT NULL,      -- CBOR ObjectRef
            package_id BLOB NOT NULL,         -- 32 bytes
            fee INTEGER NOT NULL,
            metadata BLOB NOT NULL            -- CBOR map
        );
        "#,
    )?;

    Ok(())
}
