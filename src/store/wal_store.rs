use std::io;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, warn};

use crate::limits::MAX_RESERVATIONS;
use crate::model::*;
use crate::wal::Wal;

use super::{IdGenerator, ReservationStore, StoreError};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the log and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued behind it.
/// 3. One flush + fsync for the whole batch.
/// 4. Acknowledge every sender with the batch result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, &mut batch);
        // Non-append commands see every append queued before them.
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

/// All or nothing: a failed batch leaves no frame of it in the log.
fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            wal.discard_pending();
            return Err(e);
        }
    }
    wal.flush_sync()
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

fn wal_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(format!("WAL error: {e}"))
}

/// Durable store: reservations indexed in memory, every mutation appended to a
/// write-ahead log first and replayed on open.
pub struct WalStore {
    reservations: DashMap<ReservationId, Reservation>,
    wal_tx: mpsc::Sender<WalCommand>,
    ids: IdGenerator,
    /// Orders existence checks, appends and compaction snapshots.
    write_lock: Mutex<()>,
}

impl WalStore {
    /// Replay the log at `path`, cut off any torn tail, and start its writer
    /// task. Must be called from inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let replay = Wal::replay(path)?;
        let dropped = Wal::truncate(path, replay.valid_len)?;
        if dropped > 0 {
            warn!(
                "dropped {dropped} bytes of torn log tail from {} at offset {}",
                path.display(),
                replay.valid_len
            );
        }
        let events = replay.events;
        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Self {
            reservations: DashMap::new(),
            wal_tx,
            ids: IdGenerator::new(),
            write_lock: Mutex::new(()),
        };
        for event in &events {
            store.apply(event);
        }
        info!(
            "replayed {} events from {}, {} live reservations",
            events.len(),
            path.display(),
            store.reservations.len()
        );
        Ok(store)
    }

    fn apply(&self, event: &Event) {
        match event {
            Event::ReservationInserted { reservation } => {
                self.reservations.insert(reservation.id, reservation.clone());
            }
            Event::ReservationDeleted { id } => {
                self.reservations.remove(id);
            }
        }
    }

    async fn wal_append(&self, event: Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event, response: tx })
            .await
            .map_err(|_| wal_error("writer shut down"))?;
        rx.await
            .map_err(|_| wal_error("writer dropped response"))?
            .map_err(wal_error)
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    fn sorted(&self) -> Vec<Reservation> {
        let mut all: Vec<Reservation> = self.reservations.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|r| r.id);
        all
    }

    /// Rewrite the log with one insert per live reservation.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let events: Vec<Event> = self
            .sorted()
            .into_iter()
            .map(|reservation| Event::ReservationInserted { reservation })
            .collect();
        let live = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| wal_error("writer shut down"))?;
        rx.await
            .map_err(|_| wal_error("writer dropped response"))?
            .map_err(wal_error)?;
        info!("compacted reservation log to {live} entries");
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl ReservationStore for WalStore {
    async fn list(&self) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.sorted())
    }

    async fn insert(&self, fields: ReservationFields) -> Result<ReservationId, StoreError> {
        let _guard = self.write_lock.lock().await;
        if self.reservations.len() >= MAX_RESERVATIONS {
            return Err(StoreError::Unavailable("limit exceeded: too many reservations".into()));
        }
        let id = self.ids.next()?;
        let event = Event::ReservationInserted {
            reservation: Reservation::from_fields(id, fields),
        };
        self.wal_append(event.clone()).await?;
        self.apply(&event);
        Ok(id)
    }

    async fn delete_by_id(&self, id: ReservationId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if !self.reservations.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        let event = Event::ReservationDeleted { id };
        self.wal_append(event.clone()).await?;
        self.apply(&event);
        Ok(())
    }
}
