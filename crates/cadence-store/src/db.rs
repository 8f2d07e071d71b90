use std::time::Duration;

use rusqlite::Connection;

use crate::error::Result;

/// Open a connection tuned for several runner processes sharing one file.
///
/// WAL lets readers proceed while a claim holds the write lock, and the busy
/// timeout makes a competing claimer wait for that lock instead of failing.
pub fn open(path: &str, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

/// Initialise the scheduler schema in `conn`. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_jobs_table(conn)?;
    create_job_executions_table(conn)?;
    Ok(())
}

fn create_jobs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id                  TEXT    NOT NULL PRIMARY KEY,
            type                TEXT    NOT NULL,   -- HTTP | AMQP
            status              TEXT    NOT NULL DEFAULT 'RUNNING',
            execute_at          TEXT,               -- one-off jobs
            cron_schedule       TEXT,               -- recurring jobs
            http_job            TEXT,               -- JSON, credentials encrypted
            amqp_job            TEXT,               -- JSON, connection encrypted
            created_at          TEXT    NOT NULL,
            updated_at          TEXT    NOT NULL,
            next_run            TEXT,               -- NULL once a one-off job ran
            locked_until        TEXT,               -- lease expiry
            locked_by           TEXT,               -- lease holder instance id
            number_of_runs      INTEGER NOT NULL DEFAULT 0,
            allowed_failed_runs INTEGER,
            tags                TEXT    NOT NULL DEFAULT '[]'   -- JSON array
        ) STRICT;

        -- Claim query: WHERE next_run <= ? ... ORDER BY next_run
        CREATE INDEX IF NOT EXISTS idx_jobs_next_run ON jobs (next_run);
        ",
    )?;
    Ok(())
}

/// No foreign key to `jobs`: deleting a job keeps its audit trail.
fn create_job_executions_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS job_executions (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id            TEXT    NOT NULL,
            status            TEXT    NOT NULL,   -- SUCCESSFUL | FAILED
            start_time        TEXT    NOT NULL,
            end_time          TEXT    NOT NULL,
            error_message     TEXT,
            number_of_retries INTEGER NOT NULL DEFAULT 0,
            created_at        TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_job_executions_job
            ON job_executions (job_id, start_time DESC);
        ",
    )?;
    Ok(())
}
