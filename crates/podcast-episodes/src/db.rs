use rusqlite::{Connection, Result};

/// Initialise the episode table. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_episodes_table(conn)?;
    Ok(())
}

/// `guid` is the primary key: the last line of defence against duplicates
/// when a startup sync races a scheduled one.
fn create_episodes_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS episodes (
            guid          TEXT NOT NULL PRIMARY KEY,
            title         TEXT NOT NULL,
            description   TEXT NOT NULL,
            pub_date      TEXT NOT NULL,
            link          TEXT NOT NULL,
            image         TEXT,
            podcast_name  TEXT NOT NULL,
            created_at    TEXT NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_episodes_pub_date
            ON episodes(pub_date DESC);",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM episodes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }
}
