//! Schema migration system.
//!
//! Migrations are static SQL strings keyed by version number. Applied
//! versions are tracked in a `_migrations` table so running them is
//! idempotent.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// A single migration definition.
struct Migration {
    /// Monotonically increasing version number (1, 2, 3, ...).
    version: u32,
    /// Human-readable description.
    description: &'static str,
    /// Raw SQL to execute. May contain multiple statements separated by `;`.
    sql: &'static str,
}

/// All migrations in order. Add new migrations to the end of this array.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "initial schema — users, requests, subscriptions",
    sql: r#"
        CREATE TABLE users (
            id            TEXT PRIMARY KEY,
            username      TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role          TEXT NOT NULL DEFAULT 'employee' CHECK(role IN ('admin', 'employee')),
            created_at    INTEGER NOT NULL
        );
        CREATE INDEX idx_users_username ON users(username);

        CREATE TABLE requests (
            id           TEXT PRIMARY KEY,
            kind         TEXT NOT NULL,
            status       TEXT NOT NULL DEFAULT 'Pending' CHECK(status IN ('Pending','Approved','Rejected')),
            details      TEXT NOT NULL DEFAULT '{}',
            admin_note   TEXT,
            requester_id TEXT NOT NULL REFERENCES users(id),
            created_at   INTEGER NOT NULL
        );
        CREATE INDEX idx_requests_requester ON requests(requester_id);
        CREATE INDEX idx_requests_status ON requests(status);

        CREATE TABLE subscriptions (
            id                TEXT PRIMARY KEY,
            name              TEXT NOT NULL,
            cost              REAL NOT NULL DEFAULT 0.0 CHECK(cost >= 0.0),
            category          TEXT,
            renewal_date      INTEGER NOT NULL,
            status            TEXT NOT NULL DEFAULT 'Active',
            custom_attributes TEXT NOT NULL DEFAULT '{}',
            owner_id          TEXT NOT NULL REFERENCES users(id),
            created_at        INTEGER NOT NULL
        );
        CREATE INDEX idx_subscriptions_owner ON subscriptions(owner_id);

        -- Write-time dedup guard: concurrent merges for the same
        -- (owner, name) pair have at most one winner.
        CREATE UNIQUE INDEX idx_subscriptions_owner_name ON subscriptions(owner_id, name);
    "#,
}];

// ── public API ───────────────────────────────────────────────────────

/// Run all pending migrations against `conn`.
///
/// This is a **synchronous** function — call it from `spawn_blocking`.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    ensure_migrations_table(conn)?;

    let current = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        debug!(current_version = current, "database schema is up to date");
        return Ok(());
    }

    info!(
        current_version = current,
        pending = pending.len(),
        "running pending migrations"
    );

    for migration in pending {
        apply(conn, migration)?;
    }

    Ok(())
}

/// Return the latest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    let version: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::Migration {
            version: 0,
            message: format!("failed to read current version: {e}"),
        })?;
    Ok(version)
}

// ── internals ────────────────────────────────────────────────────────

fn ensure_migrations_table(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        );",
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to create _migrations table: {e}"),
    })?;
    Ok(())
}

/// Apply a single migration inside a transaction.
fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    info!(
        version = migration.version,
        description = migration.description,
        "applying migration"
    );

    // `conn.transaction()` needs `&mut Connection`, so the transaction is
    // managed manually here.
    conn.execute_batch("BEGIN IMMEDIATE;")
        .map_err(|e| StoreError::Migration {
            version: migration.version,
            message: format!("failed to begin transaction: {e}"),
        })?;

    let result = (|| -> StoreResult<()> {
        conn.execute_batch(migration.sql)
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                message: format!("SQL execution failed: {e}"),
            })?;

        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![migration.version, migration.description, now],
        )
        .map_err(|e| StoreError::Migration {
            version: migration.version,
            message: format!("failed to record migration: {e}"),
        })?;

        Ok(())
    })();

    match &result {
        Ok(()) => {
            conn.execute_batch("COMMIT;")
                .map_err(|e| StoreError::Migration {
                    version: migration.version,
                    message: format!("failed to commit: {e}"),
                })?;
        }
        Err(err) => {
            warn!(version = migration.version, %err, "migration failed, rolling back");
            let _ = conn.execute_batch("ROLLBACK;");
        }
    }

    result
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        conn
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[1].version > window[0].version,
                "migration versions must be strictly increasing: {} >= {}",
                window[0].version,
                window[1].version,
            );
        }
    }

    #[test]
    fn run_all_is_idempotent() {
        let conn = setup_conn();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        assert_eq!(current_version(&conn).unwrap(), 1);
    }

    #[test]
    fn migrations_create_all_tables() {
        let conn = setup_conn();
        run_all(&conn).unwrap();

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name",
                )
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .map(|r| r.unwrap())
                .collect()
        };

        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"requests".to_string()));
        assert!(tables.contains(&"subscriptions".to_string()));
    }

    #[test]
    fn role_check_constraint_enforced() {
        let conn = setup_conn();
        run_all(&conn).unwrap();

        let bad_role = conn.execute(
            "INSERT INTO users (id, username, password_hash, role, created_at) \
             VALUES ('u1', 'eve', 'x', 'superuser', 0)",
            [],
        );
        assert!(bad_role.is_err());
    }

    #[test]
    fn owner_name_uniqueness_enforced() {
        let conn = setup_conn();
        run_all(&conn).unwrap();

        conn.execute(
            "INSERT INTO users (id, username, password_hash, created_at) \
             VALUES ('u1', 'alice', 'x', 0)",
            [],
        )
        .unwrap();

        conn.execute(
            "INSERT INTO subscriptions (id, name, cost, renewal_date, owner_id, created_at) \
             VALUES ('s1', 'Zoom', 14.99, 0, 'u1', 0)",
            [],
        )
        .unwrap();

        // Same (owner, name) again must violate the unique index.
        let dup = conn.execute(
            "INSERT INTO subscriptions (id, name, cost, renewal_date, owner_id, created_at) \
             VALUES ('s2', 'Zoom', 9.99, 0, 'u1', 0)",
            [],
        );
        assert!(dup.is_err());

        // A different owner may track the same name.
        conn.execute(
            "INSERT INTO users (id, username, password_hash, created_at) \
             VALUES ('u2', 'bob', 'x', 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO subscriptions (id, name, cost, renewal_date, owner_id, created_at) \
             VALUES ('s3', 'Zoom', 14.99, 0, 'u2', 0)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn negative_cost_rejected() {
        let conn = setup_conn();
        run_all(&conn).unwrap();

        conn.execute(
            "INSERT INTO users (id, username, password_hash, created_at) \
             VALUES ('u1', 'alice', 'x', 0)",
            [],
        )
        .unwrap();

        let bad_cost = conn.execute(
            "INSERT INTO subscriptions (id, name, cost, renewal_date, owner_id, created_at) \
             VALUES ('s1', 'Zoom', -1.0, 0, 'u1', 0)",
            [],
        );
        assert!(bad_cost.is_err());
    }
}
