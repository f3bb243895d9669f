/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */
use std::{ops::Deref, path::Path};

use rusqlite::{named_params, Connection, OptionalExtension};

use crate::error::{debug, Error, Result};

use super::schema;

const NOTIFICATIONS_ENABLED: &str = "notifications_enabled";
const PROMPT_SHOWN: &str = "notifications_prompt_shown";

pub trait Storage: Sized {
    fn open<P: AsRef<Path>>(path: P) -> Result<Self>;

    // The user's choices get special helpers.
    fn get_notifications_enabled(&self) -> Result<Option<bool>>;
    fn set_notifications_enabled(&self, enabled: bool) -> Result<()>;

    fn get_prompt_shown(&self) -> Result<bool>;
    fn set_prompt_shown(&self) -> Result<()>;

    /// Endpoints whose backend cleanup failed, oldest failure first.
    fn get_pending_unsubscribes(&self) -> Result<Vec<String>>;
    fn add_pending_unsubscribe(&self, endpoint: &str) -> Result<()>;
    /// Returns whether the endpoint was pending.
    fn remove_pending_unsubscribe(&self, endpoint: &str) -> Result<bool>;

    // And general purpose meta with hard-coded key names spread everywhere.
    fn get_meta(&self, key: &str) -> Result<Option<String>>;
    fn set_meta(&self, key: &str, value: &str) -> Result<()>;
    fn delete_meta(&self, key: &str) -> Result<bool>;
}

pub struct PrefsDb {
    pub db: Connection,
}

impl PrefsDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        // By default, file open errors are StorageSqlErrors and aren't super helpful.
        // Instead, remap to StorageError and provide the path to the file that couldn't be opened.
        let mut db = Connection::open(path).map_err(|orig| {
            Error::StorageError(format!(
                "Could not open database file {:?} - {}",
                &path.as_os_str(),
                orig,
            ))
        })?;
        schema::init(&mut db)?;
        Ok(Self { db })
    }

    pub fn open_in_memory() -> Result<Self> {
        #[cfg(test)]
        error_support::init_for_tests();

        let mut db = Connection::open_in_memory()?;
        schema::init(&mut db)?;
        Ok(Self { db })
    }
}

impl Deref for PrefsDb {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        &self.db
    }
}

impl Storage for PrefsDb {
    fn get_notifications_enabled(&self) -> Result<Option<bool>> {
        // Anything but the two values we write is treated as "never chose".
        Ok(match self.get_meta(NOTIFICATIONS_ENABLED)?.as_deref() {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        })
    }

    fn set_notifications_enabled(&self, enabled: bool) -> Result<()> {
        self.set_meta(NOTIFICATIONS_ENABLED, if enabled { "true" } else { "false" })
    }

    fn get_prompt_shown(&self) -> Result<bool> {
        Ok(self.get_meta(PROMPT_SHOWN)?.as_deref() == Some("true"))
    }

    fn set_prompt_shown(&self) -> Result<()> {
        self.set_meta(PROMPT_SHOWN, "true")
    }

    fn get_pending_unsubscribes(&self) -> Result<Vec<String>> {
        let mut stmt = self.db.prepare_cached(
            "SELECT endpoint FROM pending_unsubscribes ORDER BY failed_at, endpoint",
        )?;
        let endpoints = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(endpoints)
    }

    fn add_pending_unsubscribe(&self, endpoint: &str) -> Result<()> {
        debug!(
            "remembering {} for backend cleanup",
            error_support::redact_url(endpoint)
        );
        // A repeat failure keeps its original place in the queue.
        let query = "INSERT OR IGNORE INTO pending_unsubscribes (endpoint, failed_at)
                     VALUES (:endpoint, CAST(strftime('%s', 'now') AS INTEGER))";
        self.db
            .prepare_cached(query)?
            .execute(named_params! { ":endpoint": endpoint })?;
        Ok(())
    }

    fn remove_pending_unsubscribe(&self, endpoint: &str) -> Result<bool> {
        let affected_rows = self
            .db
            .prepare_cached("DELETE FROM pending_unsubscribes WHERE endpoint = :endpoint")?
            .execute(named_params! { ":endpoint": endpoint })?;
        Ok(affected_rows == 1)
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.db
            .prepare_cached("SELECT value FROM meta_data WHERE key = :key LIMIT 1")?
            .query_row(named_params! { ":key": key }, |row| row.get(0))
            .optional()
            .map_err(Error::StorageSqlError)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let query = "INSERT OR REPLACE INTO meta_data (key, value) VALUES (:k, :v)";
        self.db
            .prepare_cached(query)?
            .execute(named_params! { ":k": key, ":v": value })?;
        Ok(())
    }

    fn delete_meta(&self, key: &str) -> Result<bool> {
        let affected_rows = self
            .db
            .prepare_cached("DELETE FROM meta_data WHERE key = :key")?
            .execute(named_params! { ":key": key })?;
        Ok(affected_rows == 1)
    }

    #[cfg(not(test))]
    fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        PrefsDb::open(path)
    }

    #[cfg(test)]
    fn open<P: AsRef<Path>>(_path: P) -> Result<Self> {
        PrefsDb::open_in_memory()
    }
}
