mod availability;
mod conflict;
mod enrollment;
mod error;
mod mutations;
mod queries;

pub use conflict::find_conflicts;
pub use enrollment::ClassLedger;
pub use error::EngineError;

use std::collections::HashMap;
use std::io;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info};
use ulid::Ulid;

use crate::config::Config;
use crate::directory::Directory;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedTimeline = Arc<RwLock<Timeline>>;
pub type SharedLedger = Arc<Mutex<ClassLedger>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
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
    Shutdown {
        response: oneshot::Sender<io::Result<()>>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut pending = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            pending = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = pending
                    && handle_non_append(&mut wal, other).is_break()
                {
                    return;
                }
            }
            other => {
                if handle_non_append(&mut wal, other).is_break() {
                    return;
                }
            }
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &mut [(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) -> ControlFlow<()> {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
            ControlFlow::Continue(())
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
            ControlFlow::Continue(())
        }
        WalCommand::Shutdown { response } => {
            let _ = response.send(wal.flush_sync());
            ControlFlow::Break(())
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The process-wide scheduling state: every resource timeline, availability
/// ledger, class enrollment ledger, and the reservation index, backed by the WAL.
///
/// Lock order, outermost first: compaction gate, resource timelines in
/// `ResourceRef` order, class ledger.
pub struct Scheduler {
    pub(super) timelines: DashMap<ResourceRef, SharedTimeline>,
    pub(super) availability: DashMap<TrainerId, SharedTimeline>,
    pub(super) classes: DashMap<Ulid, SharedLedger>,
    /// Reservation id → reservation. Present iff its entries are on every owning timeline.
    pub(super) reservations: DashMap<Ulid, Reservation>,
    pub(super) directory: Arc<dyn Directory>,
    pub notify: Arc<NotifyHub>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold this shared; compaction holds it exclusively.
    pub(super) gate: RwLock<()>,
}

/// Plain, lock-free state rebuilt from the log before it is wrapped for sharing.
#[derive(Default)]
struct Replay {
    timelines: HashMap<ResourceRef, Timeline>,
    availability: HashMap<TrainerId, Timeline>,
    classes: HashMap<Ulid, ClassLedger>,
    reservations: HashMap<Ulid, Reservation>,
}

impl Replay {
    fn apply(&mut self, event: &Event) {
        match event {
            Event::SessionBooked {
                id,
                member_id,
                trainer_id,
                room_id,
                span,
            } => self.add_reservation(Reservation {
                id: *id,
                span: *span,
                kind: ReservationKind::PtSession {
                    member_id: *member_id,
                    trainer_id: *trainer_id,
                    room_id: *room_id,
                },
            }),
            Event::ClassCreated {
                id,
                name,
                trainer_id,
                room_id,
                span,
                capacity,
            } => {
                self.classes
                    .insert(*id, ClassLedger::new(*id, ResourceRef::room(*room_id), *capacity));
                self.add_reservation(Reservation {
                    id: *id,
                    span: *span,
                    kind: ReservationKind::GroupClass {
                        name: name.clone(),
                        trainer_id: *trainer_id,
                        room_id: *room_id,
                        capacity: *capacity,
                    },
                });
            }
            Event::ReservationCancelled { id } => {
                if let Some(reservation) = self.reservations.remove(id) {
                    for resource in reservation.resources() {
                        if let Some(tl) = self.timelines.get_mut(&resource) {
                            tl.remove_interval(*id);
                        }
                    }
                }
                self.classes.remove(id);
            }
            Event::AvailabilityDeclared { id, trainer_id, span } => {
                self.availability
                    .entry(*trainer_id)
                    .or_insert_with(|| Timeline::new(ResourceRef::trainer(*trainer_id)))
                    .insert_interval(Interval {
                        id: *id,
                        span: *span,
                        kind: IntervalKind::Availability,
                    });
            }
            Event::MemberEnrolled { class_id, member_id } => match self.classes.get_mut(class_id) {
                Some(ledger) => {
                    ledger.registrants.insert(*member_id);
                }
                None => debug!(%class_id, member_id, "replay: enrollment for unknown class skipped"),
            },
            Event::MemberUnenrolled { class_id, member_id } => {
                if let Some(ledger) = self.classes.get_mut(class_id) {
                    ledger.registrants.remove(member_id);
                }
            }
        }
    }

    fn add_reservation(&mut self, reservation: Reservation) {
        for resource in reservation.resources() {
            self.timelines
                .entry(resource)
                .or_insert_with(|| Timeline::new(resource))
                .insert_interval(reservation.to_interval());
        }
        self.reservations.insert(reservation.id, reservation);
    }

    fn verify(&self) -> Result<(), EngineError> {
        for tl in self.timelines.values().chain(self.availability.values()) {
            conflict::verify_timeline(tl)?;
        }
        Ok(())
    }
}

fn shared<T>(value: T) -> Arc<RwLock<T>> {
    Arc::new(RwLock::new(value))
}

pub(crate) fn wal_error(e: io::Error) -> EngineError {
    EngineError::WalError(e.to_string())
}

impl Scheduler {
    /// Replay the WAL at `wal_path` into fresh in-memory state and start the
    /// group-commit writer. A damaged tail is truncated before appends resume.
    /// Must be called from within a tokio runtime.
    pub fn open(wal_path: PathBuf, directory: Arc<dyn Directory>) -> Result<Self, EngineError> {
        let events = Wal::recover(&wal_path).map_err(wal_error)?;
        let wal = Wal::open(&wal_path).map_err(wal_error)?;

        let mut replay = Replay::default();
        for event in &events {
            replay.apply(event);
        }
        replay.verify()?;

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        info!(
            path = %wal_path.display(),
            events = events.len(),
            reservations = replay.reservations.len(),
            classes = replay.classes.len(),
            "schedule replayed"
        );

        Ok(Self {
            timelines: replay.timelines.into_iter().map(|(k, tl)| (k, shared(tl))).collect(),
            availability: replay.availability.into_iter().map(|(k, tl)| (k, shared(tl))).collect(),
            classes: replay
                .classes
                .into_iter()
                .map(|(k, ledger)| (k, Arc::new(Mutex::new(ledger))))
                .collect(),
            reservations: replay.reservations.into_iter().collect(),
            directory,
            notify: Arc::new(NotifyHub::new()),
            wal_tx,
            gate: RwLock::new(()),
        })
    }

    /// Open from `config`, creating the data directory, and spawn the compactor.
    pub fn start(config: &Config, directory: Arc<dyn Directory>) -> Result<Arc<Self>, EngineError> {
        std::fs::create_dir_all(&config.data_dir).map_err(wal_error)?;
        let scheduler = Arc::new(Self::open(config.wal_path(), directory)?);
        tokio::spawn(crate::compactor::run_compactor(
            Arc::downgrade(&scheduler),
            config.compact_threshold,
            config.compact_interval,
        ));
        Ok(scheduler)
    }

    /// Wait for in-flight mutations, flush the WAL, and stop the writer.
    /// Mutations after this fail with `WalError`.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let _gate = self.gate.write().await;
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Shutdown { response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(wal_error)?;
        info!("scheduler shut down, WAL flushed");
        Ok(())
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(wal_error)
    }

    /// Get or lazily create the timeline for `resource`.
    pub(super) fn timeline(&self, resource: ResourceRef) -> SharedTimeline {
        self.timelines
            .entry(resource)
            .or_insert_with(|| shared(Timeline::new(resource)))
            .value()
            .clone()
    }

    pub(super) fn existing_timeline(&self, resource: &ResourceRef) -> Option<SharedTimeline> {
        self.timelines.get(resource).map(|e| e.value().clone())
    }

    pub(super) fn availability_ledger(&self, trainer_id: TrainerId) -> SharedTimeline {
        self.availability
            .entry(trainer_id)
            .or_insert_with(|| shared(Timeline::new(ResourceRef::trainer(trainer_id))))
            .value()
            .clone()
    }

    pub(super) fn class_ledger(&self, class_id: &Ulid) -> Option<SharedLedger> {
        self.classes.get(class_id).map(|e| e.value().clone())
    }

    /// Acquire write locks on `resources` in their global order. Every guard is
    /// held until the returned vector is dropped.
    pub(super) async fn lock_timelines(
        &self,
        resources: &[ResourceRef],
    ) -> Vec<OwnedRwLockWriteGuard<Timeline>> {
        debug_assert!(
            resources.windows(2).all(|w| w[0] < w[1]),
            "resources must be sorted and distinct"
        );
        let mut guards = Vec::with_capacity(resources.len());
        for resource in resources {
            guards.push(self.timeline(*resource).write_owned().await);
        }
        guards
    }

    pub(super) fn publish(&self, resources: &[ResourceRef], event: &Event) {
        for resource in resources {
            self.notify.send(*resource, event);
        }
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
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

    pub fn is_shut_down(&self) -> bool {
        self.wal_tx.is_closed()
    }
}
