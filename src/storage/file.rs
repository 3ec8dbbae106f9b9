//! File-per-key storage backend.

use super::adapter::StorageAdapter;
use crate::error::{Result, VaultError};
use async_trait::async_trait;
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Magic bytes for entry files.
const ENTRY_MAGIC: &[u8; 4] = b"SVK\0";

/// Current entry format version.
const ENTRY_VERSION: u8 = 2;

/// Extension of committed entry files.
const ENTRY_EXT: &str = "kv";

/// Header length: magic, version, key length, content length.
const HEADER_LEN: usize = 4 + 1 + 4 + 8;

/// Trailer length: CRC32 of key and content.
const TRAILER_LEN: usize = 4;

/// Durable key-value storage keeping each key in its own file.
///
/// File names are the hex SHA-256 of the key, so names stay the same
/// length however deep the key is. Each file carries the key itself, the
/// content and a CRC32 of both; entries that fail verification read back
/// as absent. The directory is locked for exclusive use while the storage
/// is open.
pub struct FileStorage {
    /// Directory holding entry files.
    path: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Counter for unique temporary file names.
    next_tmp: AtomicU64,
}

impl FileStorage {
    /// Open (creating if needed) storage rooted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let display = path.display().to_string();
        fs::create_dir_all(&path).map_err(|e| VaultError::storage(&display, e))?;

        let lock_file =
            File::create(path.join("LOCK")).map_err(|e| VaultError::storage(&display, e))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| VaultError::storage(&display, "locked by another process"))?;

        Ok(Self {
            path,
            _lock_file: lock_file,
            next_tmp: AtomicU64::new(0),
        })
    }

    /// Directory this storage lives in.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List every readable key.
    pub fn keys(&self) -> Result<Vec<String>> {
        let display = self.path.display().to_string();
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.path).map_err(|e| VaultError::storage(&display, e))? {
            let entry = entry.map_err(|e| VaultError::storage(&display, e))?;
            let file_path = entry.path();
            if file_path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            let bytes = match fs::read(&file_path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(VaultError::storage(&display, e)),
            };
            if let Some((key, _)) = decode_entry(&bytes) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn file_stem(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.path
            .join(format!("{}.{}", Self::file_stem(key), ENTRY_EXT))
    }

    fn tmp_path(&self, key: &str) -> PathBuf {
        let n = self.next_tmp.fetch_add(1, Ordering::Relaxed);
        self.path
            .join(format!("{}.{}.tmp", Self::file_stem(key), n))
    }
}

/// Frame `key` and `content` into the on-disk entry layout.
fn encode_entry(key: &str, content: &[u8]) -> Vec<u8> {
    let key = key.as_bytes();
    let mut buf = Vec::with_capacity(HEADER_LEN + key.len() + content.len() + TRAILER_LEN);
    buf.extend_from_slice(ENTRY_MAGIC);
    buf.push(ENTRY_VERSION);
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(content.len() as u64).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(content);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(key);
    hasher.update(content);
    buf.extend_from_slice(&hasher.finalize().to_le_bytes());
    buf
}

/// Unframe an entry into its key and content.
///
/// Returns `None` for anything that fails verification, including length
/// fields that do not fit the file.
fn decode_entry(bytes: &[u8]) -> Option<(String, String)> {
    if bytes.len() < HEADER_LEN + TRAILER_LEN || &bytes[0..4] != ENTRY_MAGIC {
        return None;
    }
    if bytes[4] != ENTRY_VERSION {
        return None;
    }
    let key_len = u32::from_le_bytes(<[u8; 4]>::try_from(&bytes[5..9]).ok()?);
    let content_len = u64::from_le_bytes(<[u8; 8]>::try_from(&bytes[9..HEADER_LEN]).ok()?);
    let key_len = usize::try_from(key_len).ok()?;
    let content_len = usize::try_from(content_len).ok()?;

    let body_len = key_len.checked_add(content_len)?;
    let total = body_len.checked_add(HEADER_LEN + TRAILER_LEN)?;
    if bytes.len() != total {
        return None;
    }

    let body = &bytes[HEADER_LEN..HEADER_LEN + body_len];
    let crc = u32::from_le_bytes(<[u8; 4]>::try_from(&bytes[HEADER_LEN + body_len..]).ok()?);
    if crc != crc32fast::hash(body) {
        return None;
    }

    let (key, content) = body.split_at(key_len);
    let key = String::from_utf8(key.to_vec()).ok()?;
    let content = String::from_utf8(content.to_vec()).ok()?;
    Some((key, content))
}

#[async_trait]
impl StorageAdapter for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let bytes = match tokio::fs::read(self.entry_path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(VaultError::storage(key, e)),
        };

        match decode_entry(&bytes) {
            Some((stored_key, value)) if stored_key == key => Ok(Some(value)),
            Some((stored_key, _)) => {
                debug!(key, stored_key = %stored_key, "entry file holds a different key");
                Ok(None)
            }
            None => {
                debug!(key, "discarding unreadable storage entry");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let tmp = self.tmp_path(key);
        tokio::fs::write(&tmp, encode_entry(key, value.as_bytes()))
            .await
            .map_err(|e| VaultError::storage(key, e))?;
        tokio::fs::rename(&tmp, self.entry_path(key))
            .await
            .map_err(|e| VaultError::storage(key, e))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VaultError::storage(key, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_set_and_get() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path().join("kv")).unwrap();

        storage
            .set("storage/cart/", r#"{"items":[1,2,3]}"#.to_string())
            .await
            .unwrap();
        let value = storage.get("storage/cart/").await.unwrap();
        assert_eq!(value.as_deref(), Some(r#"{"items":[1,2,3]}"#));
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(storage.get("nope/").await.unwrap(), None);
        storage.remove("nope/").await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_entry_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.set("a/", "{\"x\":1}".to_string()).await.unwrap();

        let path = storage.entry_path("a/");
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 5;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        assert_eq!(storage.get("a/").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_and_remove() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.set("a/", "1".into()).await.unwrap();
        storage.set("a/b/", "2".into()).await.unwrap();

        assert_eq!(storage.keys().unwrap(), vec!["a/", "a/b/"]);

        storage.remove("a/").await.unwrap();
        assert_eq!(storage.keys().unwrap(), vec!["a/b/"]);
    }

    #[tokio::test]
    async fn test_reopen_persists() {
        let dir = TempDir::new().unwrap();
        {
            let storage = FileStorage::open(dir.path()).unwrap();
            storage.set("k/", "v".into()).await.unwrap();
        }
        let storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(storage.get("k/").await.unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = TempDir::new().unwrap();
        let _first = FileStorage::open(dir.path()).unwrap();
        assert!(matches!(
            FileStorage::open(dir.path()),
            Err(VaultError::Storage { .. })
        ));
    }

    #[test]
    fn test_entry_framing() {
        let framed = encode_entry("a/", b"hello");
        assert_eq!(
            decode_entry(&framed),
            Some(("a/".to_string(), "hello".to_string()))
        );
        assert_eq!(decode_entry(&framed[..framed.len() - 1]), None);
        assert_eq!(decode_entry(b"junk"), None);
    }

    #[test]
    fn test_oversized_length_fields_read_as_absent() {
        let mut framed = encode_entry("a/", b"hello");
        framed[9..HEADER_LEN].copy_from_slice(&u64::MAX.to_le_bytes());
        assert_eq!(decode_entry(&framed), None);

        let mut framed = encode_entry("a/", b"hello");
        framed[5..9].copy_from_slice(&u32::MAX.to_le_bytes());
        assert_eq!(decode_entry(&framed), None);
    }

    #[tokio::test]
    async fn test_corrupt_length_on_disk_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.set("a/", "{}".to_string()).await.unwrap();

        let path = storage.entry_path("a/");
        let mut bytes = fs::read(&path).unwrap();
        bytes[9..HEADER_LEN].copy_from_slice(&u64::MAX.to_le_bytes());
        fs::write(&path, bytes).unwrap();

        assert_eq!(storage.get("a/").await.unwrap(), None);
        assert!(storage.keys().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_long_keys() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let key = format!("storage/{}", "preferences_notification/".repeat(12));
        assert!(key.len() > 255);

        storage.set(&key, r#"{"muted":true}"#.to_string()).await.unwrap();
        assert_eq!(
            storage.get(&key).await.unwrap().as_deref(),
            Some(r#"{"muted":true}"#)
        );
        assert_eq!(storage.keys().unwrap(), vec![key.clone()]);

        storage.remove(&key).await.unwrap();
        assert_eq!(storage.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entry_under_wrong_name_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.set("a/", "1".to_string()).await.unwrap();
        fs::copy(storage.entry_path("a/"), storage.entry_path("b/")).unwrap();

        assert_eq!(storage.get("b/").await.unwrap(), None);
        assert_eq!(storage.get("a/").await.unwrap().as_deref(), Some("1"));
    }
}
