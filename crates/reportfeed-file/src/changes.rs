//! Change feed for the file-backed store.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use reportfeed_core::error::{Error, InvalidInputError};
use reportfeed_core::record::{ID_COLUMN, OWNER_COLUMN};
use reportfeed_core::{ChangeEvent, ChangeKind, Filter, RecordId, Result, TableName};

use crate::store::{ChangeLogEvent, ChangeLogOp, FileStore};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Change feed over the store's change log.
///
/// Starts at the end of the log: only writes made after subscribing are
/// reported. Dropping the feed stops the watcher and the poll task.
pub struct FileChangeFeed {
    inner: Pin<Box<dyn Stream<Item = Result<ChangeEvent>> + Send>>,
}

/// Which log entries a subscription wants.
#[derive(Debug, Clone)]
struct Selector {
    table: TableName,
    filter: Option<Filter>,
}

impl Selector {
    fn accepts(&self, event: &ChangeLogEvent) -> bool {
        if event.table != self.table.as_str() {
            return false;
        }
        match &self.filter {
            None => true,
            Some(f) if f.column == OWNER_COLUMN => event.owner.as_deref() == Some(&f.value),
            Some(f) if f.column == ID_COLUMN => event.id == f.value,
            // The log only records id and owner; anything else may match.
            Some(_) => true,
        }
    }
}

impl FileChangeFeed {
    pub(crate) fn from_store(
        store: FileStore,
        table: TableName,
        filter: Option<Filter>,
    ) -> Result<Self> {
        let store_dir = store.store_dir();
        let changes_path = store.changes_path();

        std::fs::create_dir_all(&store_dir).map_err(|e| {
            Error::InvalidInput(InvalidInputError::Other {
                message: format!("Failed to create store directory: {}", e),
            })
        })?;

        let (tx, mut rx) = mpsc::channel::<Result<ChangeEvent>>(100);

        let initial_pos = std::fs::metadata(&changes_path)
            .map(|m| m.len())
            .unwrap_or(0);

        let position = Arc::new(Mutex::new(initial_pos));
        let selector = Selector { table, filter };

        let watcher_position = position.clone();
        let watcher_path = changes_path.clone();
        let watcher_selector = selector.clone();
        let watcher_tx = tx.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if !matches!(
                    event.kind,
                    notify::EventKind::Modify(_) | notify::EventKind::Create(_)
                ) {
                    return;
                }

                let is_log = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().is_some_and(|n| n == "changes.jsonl"));

                if !is_log {
                    return;
                }

                read_new_changes(&watcher_path, &watcher_position, &watcher_selector, &watcher_tx);
            }
        })
        .map_err(|e| {
            Error::InvalidInput(InvalidInputError::Other {
                message: format!("Failed to create file watcher: {}", e),
            })
        })?;

        watcher
            .watch(&store_dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                Error::InvalidInput(InvalidInputError::Other {
                    message: format!("Failed to watch directory: {}", e),
                })
            })?;

        debug!(table = %selector.table, "Watching change log");

        tokio::spawn(async move {
            let _watcher = watcher;
            let mut interval = tokio::time::interval(POLL_INTERVAL);

            // Some filesystems never deliver notify events; the poll covers them.
            while !tx.is_closed() {
                interval.tick().await;
                read_new_changes(&changes_path, &position, &selector, &tx);
            }

            trace!("Change feed dropped, stopping watcher");
        });

        let stream = async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        };

        Ok(Self {
            inner: Box::pin(stream),
        })
    }
}

impl Stream for FileChangeFeed {
    type Item = Result<ChangeEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Read log lines appended since `position` and forward the selected ones.
///
/// The position mutex serializes the watcher thread and the poll task, so
/// each line is delivered once.
fn read_new_changes(
    changes_path: &Path,
    position: &Mutex<u64>,
    selector: &Selector,
    tx: &mpsc::Sender<Result<ChangeEvent>>,
) {
    let Ok(mut file) = File::open(changes_path) else {
        return;
    };
    let mut pos = position.lock().unwrap_or_else(|e| e.into_inner());
    if file.seek(SeekFrom::Start(*pos)).is_err() {
        return;
    }

    let mut reader = BufReader::new(&mut file);
    let mut consumed = 0u64;
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            // A line without its newline is still being written.
            Ok(_) if !line.ends_with('\n') => break,
            Ok(n) => consumed += n as u64,
        }

        if line.trim().is_empty() {
            continue;
        }
        if let Ok(event) = serde_json::from_str::<ChangeLogEvent>(&line) {
            if selector.accepts(&event) {
                // Full channel: the consumer already has a refetch queued.
                let _ = tx.try_send(Ok(to_change_event(&selector.table, &event)));
            }
        }
    }
    *pos += consumed;
}

fn to_change_event(table: &TableName, event: &ChangeLogEvent) -> ChangeEvent {
    ChangeEvent {
        table: table.clone(),
        kind: match event.op {
            ChangeLogOp::Insert => ChangeKind::Insert,
            ChangeLogOp::Update => ChangeKind::Update,
        },
        record_id: RecordId::new(event.id.as_str()).ok(),
    }
}
