/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */
use rusqlite::{Connection, Transaction};

use crate::error::{debug, warn, Result};

const CREATE_TABLES_SQL: &str = include_str!("schema.sql");

pub const NAME: &str = "notification prefs db";
pub const END_VERSION: u32 = 2;

/// Brings the schema up to [`END_VERSION`], tracking it in `PRAGMA user_version`.
pub fn init(conn: &mut Connection) -> Result<()> {
    // A single connection, no foreign keys, no temp tables and a handful of statements, so there
    // is nothing else to set up.
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version == END_VERSION {
        return Ok(());
    }
    if version > END_VERSION {
        warn!(
            "Loaded future schema version {} of {} (we only understand version {}). \
             Optimistically continuing.",
            version, NAME, END_VERSION
        );
        return Ok(());
    }
    let tx = conn.transaction()?;
    if version == 0 {
        debug!("Creating {} at version {}", NAME, END_VERSION);
        tx.execute_batch(CREATE_TABLES_SQL)?;
    } else {
        upgrade_from(&tx, version)?;
    }
    tx.pragma_update(None, "user_version", END_VERSION)?;
    tx.commit()?;
    Ok(())
}

fn upgrade_from(tx: &Transaction<'_>, version: u32) -> Result<()> {
    debug!("Upgrading {} from version {}", NAME, version);
    tx.execute_batch(CREATE_TABLES_SQL)?;
    if version < 2 {
        // Version 1 kept a single failed cleanup in the meta table.
        tx.execute_batch(
            "INSERT OR IGNORE INTO pending_unsubscribes (endpoint, failed_at)
                SELECT value, 0 FROM meta_data WHERE key = 'pending_unsubscribe_endpoint';
             DELETE FROM meta_data WHERE key = 'pending_unsubscribe_endpoint';",
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::internal::storage::{Storage, Store};

    fn user_version(conn: &Connection) -> u32 {
        conn.query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_create_and_reopen() {
        error_support::init_for_tests();
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("prefs.sqlite");

        let db = Store::open(&path).expect("should open");
        assert_eq!(user_version(&db), END_VERSION);
        db.set_meta("key-1", "value-1").unwrap();
        drop(db);

        // reopening must keep what was stored
        let db = Store::open(&path).expect("should reopen");
        assert_eq!(db.get_meta("key-1").unwrap().unwrap(), "value-1");
    }

    #[test]
    fn test_future_version() {
        error_support::init_for_tests();
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("prefs.sqlite");

        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(CREATE_TABLES_SQL).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO meta_data (key, value) VALUES ('notifications_enabled', 'true');
            PRAGMA user_version = 7;
            "#,
        )
        .unwrap();
        drop(conn);

        let db = Store::open(&path).expect("should open");
        assert_eq!(user_version(&db), 7);
        assert_eq!(db.get_notifications_enabled().unwrap(), Some(true));
    }

    #[test]
    fn test_upgrade_moves_pending_cleanup() {
        error_support::init_for_tests();
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("prefs.sqlite");

        // what a version 1 database looked like
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE meta_data (key TEXT PRIMARY KEY, value NOT NULL) WITHOUT ROWID;
            INSERT INTO meta_data (key, value)
                VALUES ('pending_unsubscribe_endpoint', 'https://push.example.com/old');
            INSERT INTO meta_data (key, value) VALUES ('notifications_prompt_shown', 'true');
            PRAGMA user_version = 1;
            "#,
        )
        .unwrap();
        drop(conn);

        let db = Store::open(&path).expect("should upgrade");
        assert_eq!(user_version(&db), END_VERSION);
        assert_eq!(
            db.get_pending_unsubscribes().unwrap(),
            vec!["https://push.example.com/old".to_string()]
        );
        assert_eq!(db.get_meta("pending_unsubscribe_endpoint").unwrap(), None);
        assert!(db.get_prompt_shown().unwrap());
    }
}
