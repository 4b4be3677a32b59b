//! Local directory connector.
//!
//! Each snapshot is one JSON file holding a [`StoredRecord`]:
//!
//! ```text
//! <root>/[<destination>/]<world>/<data_type>/<saved_at json>.json
//! <root>/.streams/<destination>.jsonl
//! ```
//!
//! Path segments keep `[A-Za-z0-9._-]` and encode every other byte as
//! `~XX`, so no segment can climb out of the root or hide as a dotfile.
//! The file name is built from the JSON text of `saved_at`, so `"1"` and
//! `1` land in different files.
//! Identity is checked against the record contents, not the path, so load,
//! list, and delete see snapshots under every destination. New files are
//! created with `create_new`; a replace rewrites the file through a
//! temporary sibling and a rename.

use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use worldstore_core::{
    BatchConnector, Capabilities, Connector, ConnectorFailure, ConnectorState, FileSettings,
    ListOptions, LoadOptions, OpResult, SaveOptions, StreamSession, StreamingConnector,
    ValidationPolicy,
};
use worldstore_types::{ConnectorType, Operation, RecordKey, StoredRecord, WorldData};

use crate::error::DbError;
use crate::mongo::LoadQuery;
use crate::order::{by_saved_at, by_write_time, latest_per_world, world_label};

/// Directory below the root holding stream logs.
const STREAMS_DIR: &str = ".streams";

/// Encode `raw` as a single safe path segment.
pub fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, byte) in raw.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric()
            || matches!(byte, b'_' | b'-')
            || (byte == b'.' && i > 0);
        if keep {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "~{byte:02X}");
        }
    }
    if out.is_empty() {
        out.push('~');
    }
    out
}

/// Reject stream destinations that could escape the streams directory.
fn check_stream_destination(destination: &str) -> Result<(), ConnectorFailure> {
    if destination.is_empty()
        || destination.contains(['/', '\\'])
        || destination.contains("..")
    {
        return Err(ConnectorFailure::StreamState(format!(
            "stream destination '{destination}' is not a plain name"
        )));
    }
    Ok(())
}

async fn read_record(path: &Path) -> Result<StoredRecord, DbError> {
    let text = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&text)?)
}

/// Batch and streaming connector over a local directory.
#[derive(Debug)]
pub struct FileConnector {
    state: ConnectorState,
    root: PathBuf,
    session: StreamSession<File>,
}

impl FileConnector {
    /// Create a connector rooted at the configured directory. The directory
    /// is created on first use.
    pub fn new(settings: FileSettings) -> Self {
        Self {
            state: ConnectorState::new(
                &settings.name,
                "Local directory world data connector",
                ConnectorType::File,
            ),
            root: settings.directory,
            session: StreamSession::new(),
        }
    }

    /// Root directory of this connector.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a snapshot with `key` is written to under `destination`.
    pub fn snapshot_path(&self, key: &RecordKey, destination: Option<&str>) -> PathBuf {
        let mut path = self.root.clone();
        if let Some(destination) = destination {
            path.push(encode_segment(destination));
        }
        path.push(encode_segment(&key.world_name));
        path.push(encode_segment(&key.data_type));
        path.push(format!("{}.json", encode_segment(&key.saved_at.to_string())));
        path
    }

    /// Path of the stream log for `destination`.
    pub fn stream_path(&self, destination: &str) -> PathBuf {
        self.root
            .join(STREAMS_DIR)
            .join(format!("{}.jsonl", encode_segment(destination)))
    }

    /// The ensure-connected step: the root must exist and be a directory.
    async fn ensure(&self) -> Result<(), DbError> {
        fs::create_dir_all(&self.root).await.map_err(|e| {
            DbError::Unavailable(format!(
                "cannot use directory {}: {e}",
                self.root.display()
            ))
        })
    }

    /// Every readable snapshot below the root, with its path.
    async fn scan(&self) -> Result<Vec<(PathBuf, StoredRecord)>, DbError> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|ext| ext == "json") {
                    match read_record(&path).await {
                        Ok(record) => found.push((path, record)),
                        Err(e) => warn!(
                            path = %path.display(),
                            error = %e,
                            "Skipping unreadable snapshot file"
                        ),
                    }
                }
            }
        }
        Ok(found)
    }

    async fn write_new(path: &Path, record: &StoredRecord) -> Result<bool, DbError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        file.write_all(&serde_json::to_vec_pretty(record)?).await?;
        file.sync_all().await?;
        Ok(true)
    }

    async fn overwrite(path: &Path, record: &StoredRecord) -> Result<(), DbError> {
        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        let mut file = File::create(&staging).await?;
        file.write_all(&serde_json::to_vec_pretty(record)?).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&staging, path).await?;
        Ok(())
    }

    async fn try_save(
        &self,
        document: &Value,
        destination: Option<&str>,
        options: &SaveOptions,
    ) -> OpResult<()> {
        let data = ValidationPolicy::check(document)?;
        self.ensure().await?;

        let record = StoredRecord::new(&data, &options.data_type, &self.get_connector_info())
            .map_err(DbError::from)?;
        let key = record.key();
        let existing = self
            .scan()
            .await?
            .into_iter()
            .find(|(_, stored)| key.matches(stored));

        match existing {
            Some(_) if !options.replace_existing => Err(ConnectorFailure::DuplicateIdentity(key)),
            Some((path, mut stored)) => {
                stored.refresh_from(record);
                Self::overwrite(&path, &stored).await?;
                debug!(
                    connector = self.name(),
                    record = %key,
                    path = %path.display(),
                    "Replaced world data"
                );
                Ok(())
            }
            None => {
                let path = self.snapshot_path(&key, destination);
                if !Self::write_new(&path, &record).await? {
                    return Err(ConnectorFailure::Backend(format!(
                        "{} is already taken by another snapshot",
                        path.display()
                    )));
                }
                debug!(
                    connector = self.name(),
                    record = %key,
                    path = %path.display(),
                    "Saved world data"
                );
                Ok(())
            }
        }
    }

    async fn try_load(
        &self,
        source: Option<&str>,
        options: &LoadOptions,
    ) -> OpResult<Option<WorldData>> {
        self.ensure().await?;
        let mut records = self.scan().await?.into_iter().map(|(_, record)| record);
        let found = match LoadQuery::resolve(source, options) {
            LoadQuery::Latest => records.max_by(by_saved_at),
            LoadQuery::Exact(key) => records.find(|r| key.matches(r)),
            LoadQuery::NewestWrite {
                world_name,
                data_type,
            } => records
                .filter(|r| r.world_name == world_name && r.data_type == data_type)
                .max_by(by_write_time),
        };

        let Some(record) = found else {
            debug!(connector = self.name(), ?source, "No world data found");
            return Ok(None);
        };
        let value = record.payload().map_err(DbError::from)?;
        Ok(ValidationPolicy::check_owned(value).ok())
    }

    async fn try_list(&self, options: &ListOptions) -> OpResult<Vec<String>> {
        self.ensure().await?;
        let records = self.scan().await?.into_iter().map(|(_, r)| r).collect();
        Ok(latest_per_world(records, options.limit_or_default())
            .iter()
            .map(|(name, saved_at)| world_label(name, saved_at))
            .collect())
    }

    async fn try_delete(&self, identifier: &str) -> OpResult<()> {
        self.ensure().await?;
        let mut deleted: u64 = 0;
        for (path, record) in self.scan().await? {
            if record.world_name != identifier {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => deleted = deleted.saturating_add(1),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(DbError::from(e).into()),
            }
            self.prune_empty_parents(&path).await;
        }
        info!(
            connector = self.name(),
            world = identifier,
            deleted,
            "Deleted world data"
        );
        Ok(())
    }

    /// Remove now-empty directories between `path` and the root.
    async fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            // Fails on non-empty directories, which ends the walk.
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }

    async fn try_start(&self, destination: Option<&str>) -> OpResult<()> {
        let streams = self.root.join(STREAMS_DIR);
        self.session
            .start(destination, |destination| async move {
                check_stream_destination(&destination)?;
                fs::create_dir_all(&streams).await.map_err(DbError::from)?;
                let path = streams.join(format!("{}.jsonl", encode_segment(&destination)));
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await
                    .map_err(DbError::from)?;
                Ok(file)
            })
            .await
    }

    async fn try_stream(&self, document: &Value) -> OpResult<()> {
        let mut session = self.session.lock().await;
        let Some(active) = session.as_mut() else {
            return Err(ConnectorFailure::not_streaming());
        };
        let data = ValidationPolicy::check(document)?;

        let update = active.next_update(data);
        let mut line = serde_json::to_vec(&update).map_err(DbError::from)?;
        line.push(b'\n');
        active.sink.write_all(&line).await.map_err(DbError::from)?;
        active.sink.flush().await.map_err(DbError::from)?;
        active.mark_pushed();
        Ok(())
    }

    async fn try_stop(&self) -> OpResult<()> {
        if let Some(mut closed) = self.session.take().await {
            closed.sink.flush().await.map_err(DbError::from)?;
            closed.sink.sync_all().await.map_err(DbError::from)?;
        }
        Ok(())
    }
}

impl Connector for FileConnector {
    fn state(&self) -> &ConnectorState {
        &self.state
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BASE.with_batch().with_streaming()
    }

    async fn save_world_data(
        &self,
        document: &Value,
        destination: Option<&str>,
        options: &SaveOptions,
    ) -> OpResult<()> {
        let result = self.try_save(document, destination, options).await;
        self.state.finish(Operation::Save, result)
    }

    async fn load_world_data(
        &self,
        source: Option<&str>,
        options: &LoadOptions,
    ) -> OpResult<Option<WorldData>> {
        let result = self.try_load(source, options).await;
        self.state.finish(Operation::Load, result)
    }

    async fn list_available_data(&self, options: &ListOptions) -> OpResult<Vec<String>> {
        let result = self.try_list(options).await;
        self.state.finish(Operation::List, result)
    }

    async fn delete_data(&self, identifier: &str) -> OpResult<()> {
        let result = self.try_delete(identifier).await;
        self.state.finish(Operation::Delete, result)
    }
}

impl BatchConnector for FileConnector {}

/// Each push appends one JSON line to `<root>/.streams/<destination>.jsonl`
/// and returns once the line has been handed to the operating system.
impl StreamingConnector for FileConnector {
    async fn start_streaming(&self, destination: Option<&str>) -> OpResult<()> {
        let result = self.try_start(destination).await;
        self.state.finish(Operation::StartStreaming, result)
    }

    async fn stream_world_data(&self, document: &Value) -> OpResult<()> {
        let result = self.try_stream(document).await;
        self.state.finish(Operation::Stream, result)
    }

    async fn stop_streaming(&self) -> OpResult<()> {
        let result = self.try_stop().await;
        self.state.finish(Operation::StopStreaming, result)
    }

    async fn is_streaming(&self) -> bool {
        self.session.is_active().await
    }
}
