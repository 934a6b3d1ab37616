//! SQLite record store.
//!
//! A named database file holding the two collections as tables keyed by
//! path. SQLite compares TEXT keys byte-wise by default, which is the order
//! the prefix ranges assume.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};

use mountvfs_types::Content;

use super::{DirectoryRecord, FileRecord, KeyRange, RecordStore, from_millis, to_millis};
use crate::vfs::{VfsError, VfsResult};

const SCHEMA: &str = r#"
-- File records, one row per canonical path
CREATE TABLE IF NOT EXISTS files (
    path TEXT PRIMARY KEY,
    content BLOB NOT NULL,
    is_binary INTEGER NOT NULL,
    size INTEGER NOT NULL,
    mtime INTEGER NOT NULL,
    ctime INTEGER NOT NULL
);

-- Directory markers, one row per canonical path
CREATE TABLE IF NOT EXISTS directories (
    path TEXT PRIMARY KEY,
    ctime INTEGER NOT NULL
);
"#;

const FILE_COLUMNS: &str = "path, content, is_binary, size, mtime, ctime";

/// Record store persisted in a SQLite database.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRecordStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteRecordStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> VfsResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.as_ref().to_path_buf()),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> VfsResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Raw column values of a `files` row.
struct FileRow {
    path: String,
    content: Vec<u8>,
    is_binary: bool,
    size: i64,
    mtime: i64,
    ctime: i64,
}

impl FileRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            content: row.get(1)?,
            is_binary: row.get(2)?,
            size: row.get(3)?,
            mtime: row.get(4)?,
            ctime: row.get(5)?,
        })
    }

    fn into_record(self) -> VfsResult<FileRecord> {
        let content = if self.is_binary {
            Content::Binary(self.content)
        } else {
            let text = String::from_utf8(self.content).map_err(|_| {
                VfsError::other(format!("corrupt text record: {}", self.path))
            })?;
            Content::Text(text)
        };
        Ok(FileRecord {
            path: self.path,
            content,
            size: self.size.max(0) as u64,
            mtime: from_millis(self.mtime),
            ctime: from_millis(self.ctime),
        })
    }
}

fn insert_file(conn: &Connection, record: &FileRecord) -> rusqlite::Result<()> {
    conn.prepare_cached(
        "INSERT OR REPLACE INTO files (path, content, is_binary, size, mtime, ctime)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?
    .execute(params![
        record.path,
        record.content.as_bytes(),
        record.is_binary(),
        record.size as i64,
        to_millis(record.mtime),
        to_millis(record.ctime),
    ])?;
    Ok(())
}

fn insert_dir(conn: &Connection, record: &DirectoryRecord) -> rusqlite::Result<()> {
    // OR IGNORE: an existing marker keeps its original ctime.
    conn.prepare_cached("INSERT OR IGNORE INTO directories (path, ctime) VALUES (?1, ?2)")?
        .execute(params![record.path, to_millis(record.ctime)])?;
    Ok(())
}

fn select_file(conn: &Connection, path: &str) -> VfsResult<Option<FileRecord>> {
    let row = conn
        .prepare_cached(&format!("SELECT {FILE_COLUMNS} FROM files WHERE path = ?1"))?
        .query_row(params![path], FileRow::from_row)
        .optional()?;
    row.map(FileRow::into_record).transpose()
}

fn select_dir(conn: &Connection, path: &str) -> VfsResult<Option<DirectoryRecord>> {
    let row = conn
        .prepare_cached("SELECT path, ctime FROM directories WHERE path = ?1")?
        .query_row(params![path], |row| {
            Ok(DirectoryRecord {
                path: row.get(0)?,
                ctime: from_millis(row.get(1)?),
            })
        })
        .optional()?;
    Ok(row)
}

fn scan_keys(conn: &Connection, table: &str, range: &KeyRange) -> VfsResult<Vec<String>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT path FROM {table} WHERE path >= ?1 AND path < ?2 ORDER BY path"
    ))?;
    let keys = stmt
        .query_map(params![range.start, range.end], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(keys)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get_file(&self, path: &str) -> VfsResult<Option<FileRecord>> {
        let conn = self.conn.lock();
        select_file(&conn, path)
    }

    async fn get_files(&self, paths: &[String]) -> VfsResult<Vec<FileRecord>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(record) = select_file(&tx, path)? {
                records.push(record);
            }
        }
        tx.commit()?;
        Ok(records)
    }

    async fn existing_file_keys(&self, paths: &[String]) -> VfsResult<Vec<String>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut keys = Vec::new();
        {
            let mut stmt = tx.prepare_cached("SELECT path FROM files WHERE path = ?1")?;
            for path in paths {
                if let Some(key) = stmt
                    .query_row(params![path], |row| row.get::<_, String>(0))
                    .optional()?
                {
                    keys.push(key);
                }
            }
        }
        tx.commit()?;
        Ok(keys)
    }

    async fn put_file(&self, record: FileRecord) -> VfsResult<()> {
        let conn = self.conn.lock();
        insert_file(&conn, &record)?;
        Ok(())
    }

    async fn put_files(&self, records: Vec<FileRecord>) -> VfsResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for record in &records {
            insert_file(&tx, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> VfsResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM files WHERE path = ?1", params![path])?;
        Ok(())
    }

    async fn scan_file_keys(&self, range: &KeyRange) -> VfsResult<Vec<String>> {
        let conn = self.conn.lock();
        scan_keys(&conn, "files", range)
    }

    async fn get_dir(&self, path: &str) -> VfsResult<Option<DirectoryRecord>> {
        let conn = self.conn.lock();
        select_dir(&conn, path)
    }

    async fn get_dirs(&self, paths: &[String]) -> VfsResult<Vec<DirectoryRecord>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(record) = select_dir(&tx, path)? {
                records.push(record);
            }
        }
        tx.commit()?;
        Ok(records)
    }

    async fn put_dirs(&self, records: Vec<DirectoryRecord>) -> VfsResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for record in &records {
            insert_dir(&tx, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn delete_dir(&self, path: &str) -> VfsResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM directories WHERE path = ?1", params![path])?;
        Ok(())
    }

    async fn scan_dir_keys(&self, range: &KeyRange) -> VfsResult<Vec<String>> {
        let conn = self.conn.lock();
        scan_keys(&conn, "directories", range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_text_and_binary_round_trip() {
        let store = SqliteRecordStore::in_memory().unwrap();
        store
            .put_files(vec![
                FileRecord::new("/t.txt", Content::from("text"), None),
                FileRecord::new("/b.bin", Content::from(vec![0u8, 159, 146, 150]), None),
            ])
            .await
            .unwrap();

        let text = store.get_file("/t.txt").await.unwrap().unwrap();
        assert_eq!(text.content, Content::from("text"));
        assert!(!text.is_binary());

        let bin = store.get_file("/b.bin").await.unwrap().unwrap();
        assert_eq!(bin.content, Content::from(vec![0u8, 159, 146, 150]));
        assert_eq!(bin.size, 4);
    }

    #[tokio::test]
    async fn test_range_scan_is_bytewise() {
        let store = SqliteRecordStore::in_memory().unwrap();
        store
            .put_dirs(vec![
                DirectoryRecord::new("/docs"),
                DirectoryRecord::new("/docs/a"),
                DirectoryRecord::new("/docs/é"),
                DirectoryRecord::new("/docs2"),
            ])
            .await
            .unwrap();

        let keys = store.scan_dir_keys(&KeyRange::prefix("/docs/")).await.unwrap();
        assert_eq!(keys, ["/docs/a", "/docs/é"]);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("vfs.db");
        {
            let store = SqliteRecordStore::open(&db).unwrap();
            store
                .put_file(FileRecord::new("/keep", Content::from("me"), None))
                .await
                .unwrap();
            store.put_dirs(vec![DirectoryRecord::new("/d")]).await.unwrap();
        }

        let store = SqliteRecordStore::open(&db).unwrap();
        assert_eq!(store.path(), Some(db.as_path()));
        assert!(store.get_file("/keep").await.unwrap().is_some());
        assert!(store.get_dir("/d").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_dirs_skips_missing() {
        let store = SqliteRecordStore::in_memory().unwrap();
        store.put_dirs(vec![DirectoryRecord::new("/a")]).await.unwrap();
        let found = store
            .get_dirs(&["/a".to_string(), "/b".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "/a");
    }

    #[tokio::test]
    async fn test_existing_file_keys() {
        let store = SqliteRecordStore::in_memory().unwrap();
        store
            .put_file(FileRecord::new("/big.bin", Content::from(vec![7u8; 4096]), None))
            .await
            .unwrap();
        store.put_dirs(vec![DirectoryRecord::new("/dir")]).await.unwrap();

        let keys = store
            .existing_file_keys(&["/big.bin".to_string(), "/dir".to_string(), "/no".to_string()])
            .await
            .unwrap();
        assert_eq!(keys, ["/big.bin"]);
    }
}
