//! One file per session under a save directory.
//!
//! Each file holds an 8-byte big-endian unix timestamp (the expiry)
//! followed by the encrypted payload.

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::Id;
use crate::store::{Error, OpenContext, SessionStore, unix_now};

const HEADER_LEN: usize = 8;

/// A filesystem-backed session store.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
    prefix: String,
}

impl FileStore {
    /// Creates a store writing `sess_<id>` files under `dir`.
    ///
    /// An [`OpenContext::save_path`] given at open time takes precedence.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: "sess_".to_string(),
        }
    }

    /// Sets the file name prefix. Defaults to `sess_`.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, session_id: &Id) -> PathBuf {
        self.dir.join(format!("{}{}", self.prefix, session_id))
    }

    async fn read_record(&self, path: &Path) -> Result<Option<(i64, Vec<u8>)>, Error> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        if bytes.len() < HEADER_LEN {
            tracing::warn!(path = %path.display(), "truncated session file");
            return Ok(None);
        }

        let (header, payload) = bytes.split_at(HEADER_LEN);
        let mut expires_at = [0u8; HEADER_LEN];
        expires_at.copy_from_slice(header);

        Ok(Some((i64::from_be_bytes(expires_at), payload.to_vec())))
    }

    async fn write_record(&self, path: &Path, expires_at: i64, payload: &[u8]) -> Result<(), Error> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&expires_at.to_be_bytes());
        bytes.extend_from_slice(payload);

        // each write gets its own sibling file, renamed over the record so
        // readers never see a partial one
        let mut tmp_name = path.file_name().map(OsStr::to_os_string).unwrap_or_default();
        tmp_name.push(format!(".{}.tmp", Id::generate()));
        let tmp = path.with_file_name(tmp_name);

        fs::write(&tmp, &bytes).await?;
        if let Err(err) = fs::rename(&tmp, path).await {
            remove_if_exists(&tmp).await?;
            return Err(err.into());
        }
        Ok(())
    }
}

async fn remove_if_exists(path: &Path) -> Result<bool, Error> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

impl SessionStore for FileStore {
    #[tracing::instrument(name = "opening file store", skip(self, cx))]
    async fn open(&mut self, cx: &OpenContext) -> Result<(), Error> {
        if let Some(save_path) = &cx.save_path {
            self.dir = save_path.clone();
        }

        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn get(&mut self, session_id: &Id) -> Result<Option<Vec<u8>>, Error> {
        let path = self.path(session_id);
        match self.read_record(&path).await? {
            Some((expires_at, payload)) if expires_at > unix_now() => Ok(Some(payload)),
            Some(_) => {
                remove_if_exists(&path).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&mut self, session_id: &Id, payload: &[u8], ttl_secs: i64) -> Result<bool, Error> {
        let path = self.path(session_id);
        self.write_record(&path, unix_now() + ttl_secs, payload).await?;
        Ok(true)
    }

    async fn touch(&mut self, session_id: &Id, ttl_secs: i64) -> Result<bool, Error> {
        let path = self.path(session_id);
        match self.read_record(&path).await? {
            Some((expires_at, payload)) if expires_at > unix_now() => {
                self.write_record(&path, unix_now() + ttl_secs, &payload).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&mut self, session_id: &Id) -> Result<bool, Error> {
        remove_if_exists(&self.path(session_id)).await
    }

    #[tracing::instrument(name = "collecting expired session files", skip(self))]
    async fn gc(&mut self, _max_lifetime_secs: i64) -> Result<u64, Error> {
        let now = unix_now();
        let mut removed = 0;
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_session_file = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(&self.prefix) && !name.ends_with(".tmp"))
                .unwrap_or(false);
            if !is_session_file {
                continue;
            }

            let expired = match self.read_record(&path).await? {
                Some((expires_at, _)) => expires_at <= now,
                None => true,
            };
            if expired && remove_if_exists(&path).await? {
                removed += 1;
            }
        }

        tracing::debug!(removed, "removed expired session files");
        Ok(removed)
    }

    async fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
