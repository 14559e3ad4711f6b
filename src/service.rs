//! Orchestrates the rules and the store.
//!
//! The service owns an explicit cache of the last snapshot it fetched. Every
//! successful mutation reloads it, so callers read their own writes without
//! any push channel from the store.

use std::future::Future;
use std::time::Instant;

use chrono::NaiveDate;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::model::*;
use crate::observability::*;
use crate::rules::{self, validate_create, ConflictKind};
use crate::store::{ReservationStore, StoreError};

pub fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The rules refused the candidate. Nothing was written.
    Conflict(ConflictKind),
    /// Cancel of an id the store no longer has.
    NotFound(ReservationId),
    /// The store failed on read or write. Retryable.
    StoreUnavailable(String),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Conflict(kind) => write!(f, "conflict: {kind}"),
            ServiceError::NotFound(id) => write!(f, "reservation not found: {id}"),
            ServiceError::StoreUnavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<ConflictKind> for ServiceError {
    fn from(kind: ConflictKind) -> Self {
        ServiceError::Conflict(kind)
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ServiceError::NotFound(id),
            StoreError::Unavailable(msg) => ServiceError::StoreUnavailable(msg),
        }
    }
}

/// Run one store call, recording latency and logging transport failures.
async fn timed<T>(
    op: &'static str,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    let start = Instant::now();
    let result = call.await;
    metrics::histogram!(STORE_DURATION_SECONDS, "op" => op).record(start.elapsed().as_secs_f64());
    if let Err(StoreError::Unavailable(e)) = &result {
        metrics::counter!(STORE_ERRORS_TOTAL, "op" => op).increment(1);
        error!("store {op} failed: {e}");
    }
    result
}

pub struct ReservationService<S> {
    store: S,
    cache: RwLock<Vec<Reservation>>,
    /// Held across reload → validate → insert so callers sharing this service
    /// never validate against each other's unwritten state.
    write_gate: Mutex<()>,
}

impl<S: ReservationStore> ReservationService<S> {
    /// Empty cache until the first `list_all`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: RwLock::new(Vec::new()),
            write_gate: Mutex::new(()),
        }
    }

    /// Construct and load the first snapshot.
    pub async fn open(store: S) -> Result<Self, ServiceError> {
        let service = Self::new(store);
        service.list_all().await?;
        Ok(service)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn reload(&self) -> Result<Vec<Reservation>, ServiceError> {
        let fresh = timed("list", self.store.list()).await?;
        metrics::gauge!(CACHED_RESERVATIONS).set(fresh.len() as f64);
        *self.cache.write().await = fresh.clone();
        Ok(fresh)
    }

    /// Fetch the whole collection in store order and refresh the cache.
    pub async fn list_all(&self) -> Result<Vec<Reservation>, ServiceError> {
        self.reload().await
    }

    /// The cache as last loaded. No I/O.
    pub async fn snapshot(&self) -> Vec<Reservation> {
        self.cache.read().await.clone()
    }

    /// Form-level pre-check over the cache. Same implementation `create` uses.
    pub async fn weekly_apartment_count(&self, apartment: &Apartment, date: NaiveDate) -> usize {
        rules::weekly_apartment_count(&self.cache.read().await, apartment, date)
    }

    /// Validate against a fresh snapshot, then write. On a conflict nothing
    /// is written and the specific kind is returned.
    pub async fn create(&self, candidate: NewReservation) -> Result<Reservation, ServiceError> {
        let _gate = self.write_gate.lock().await;
        let snapshot = self.reload().await?;

        if let Err(kind) = validate_create(&snapshot, &candidate) {
            metrics::counter!(CONFLICTS_TOTAL, "kind" => kind.label()).increment(1);
            warn!("rejected {} on {}: {kind}", candidate.apartment, candidate.date);
            return Err(kind.into());
        }

        let fields = candidate.into_fields(now_ms());
        let id = timed("insert", self.store.insert(fields.clone())).await?;
        metrics::counter!(RESERVATIONS_CREATED_TOTAL).increment(1);
        info!("reserved {} for {} as {id}", candidate.date, candidate.apartment);

        let after = self.reload().await?;
        Ok(after
            .into_iter()
            .find(|r| r.id == id)
            .unwrap_or_else(|| Reservation::from_fields(id, fields)))
    }

    /// Delete by id. A missing id is `NotFound`, never success.
    pub async fn cancel(&self, id: ReservationId) -> Result<(), ServiceError> {
        let _gate = self.write_gate.lock().await;
        if let Err(e) = timed("delete", self.store.delete_by_id(id)).await {
            if matches!(e, StoreError::NotFound(_)) {
                warn!("cancel of unknown reservation {id}");
            }
            return Err(e.into());
        }
        metrics::counter!(RESERVATIONS_CANCELLED_TOTAL).increment(1);
        info!("cancelled reservation {id}");
        self.reload().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn candidate(portal: &str, floor: &str, door: &str, date: NaiveDate) -> NewReservation {
        NewReservation::new(Apartment::parse(portal, floor, door).unwrap(), date)
    }

    /// Wraps an in-memory store and fails every call while `down` is set.
    struct FlakyStore {
        inner: InMemoryStore,
        down: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: InMemoryStore::new(),
                down: AtomicBool::new(false),
            }
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.down.load(Ordering::SeqCst) {
                Err(StoreError::Unavailable("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ReservationStore for FlakyStore {
        async fn list(&self) -> Result<Vec<Reservation>, StoreError> {
            self.check()?;
            self.inner.list().await
        }

        async fn insert(&self, fields: ReservationFields) -> Result<ReservationId, StoreError> {
            self.check()?;
            self.inner.insert(fields).await
        }

        async fn delete_by_id(&self, id: ReservationId) -> Result<(), StoreError> {
            self.check()?;
            self.inner.delete_by_id(id).await
        }
    }

    #[tokio::test]
    async fn create_stamps_and_normalizes() {
        let service = ReservationService::new(InMemoryStore::new());
        let before = now_ms();
        let r = service.create(candidate("1", "5", "a", day(2024, 6, 10))).await.unwrap();

        assert_eq!(r.door, Door::A);
        assert_eq!(r.status, ReservationStatus::Confirmed);
        assert!(r.created_at >= before);
        assert_eq!(service.store().list().await.unwrap(), vec![r]);
    }

    #[tokio::test]
    async fn create_refreshes_cache() {
        let service = ReservationService::new(InMemoryStore::new());
        assert!(service.snapshot().await.is_empty());
        let r = service.create(candidate("2", "1", "B", day(2024, 6, 11))).await.unwrap();
        assert_eq!(service.snapshot().await, vec![r]);
    }

    #[tokio::test]
    async fn conflict_writes_nothing() {
        let service = ReservationService::new(InMemoryStore::new());
        service.create(candidate("1", "5", "A", day(2024, 6, 10))).await.unwrap();

        let err = service
            .create(candidate("3", "9", "B", day(2024, 6, 10)))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Conflict(ConflictKind::DateAlreadyReserved(day(2024, 6, 10)))
        );
        assert_eq!(service.store().len(), 1);
    }

    #[tokio::test]
    async fn create_validates_against_store_not_stale_cache() {
        let store = Arc::new(InMemoryStore::new());
        let service = ReservationService::new(store.clone());

        // Another client writes directly to the store; the cache never saw it.
        store
            .insert(candidate("1", "1", "A", day(2024, 6, 12)).into_fields(0))
            .await
            .unwrap();
        assert!(service.snapshot().await.is_empty());

        let err = service
            .create(candidate("2", "2", "B", day(2024, 6, 12)))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(ConflictKind::DateAlreadyReserved(_))));
    }

    #[tokio::test]
    async fn precheck_matches_service_rule() {
        let service = ReservationService::new(InMemoryStore::new());
        let apt = Apartment::parse("1", "5", "A").unwrap();
        service.create(NewReservation::new(apt, day(2024, 6, 10))).await.unwrap();
        service.create(NewReservation::new(apt, day(2024, 6, 12))).await.unwrap();

        let lower = Apartment::parse("1", "5", "a").unwrap();
        assert_eq!(service.weekly_apartment_count(&lower, day(2024, 6, 16)).await, 2);
        assert_eq!(service.weekly_apartment_count(&apt, day(2024, 6, 17)).await, 0);

        let err = service
            .create(NewReservation::new(apt, day(2024, 6, 16)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Conflict(ConflictKind::WeeklyQuotaExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn cancel_twice_is_not_found() {
        let service = ReservationService::new(InMemoryStore::new());
        let r = service.create(candidate("1", "5", "A", day(2024, 6, 10))).await.unwrap();

        service.cancel(r.id).await.unwrap();
        assert!(service.snapshot().await.is_empty());
        assert_eq!(service.cancel(r.id).await, Err(ServiceError::NotFound(r.id)));
    }

    #[tokio::test]
    async fn store_outage_is_distinct_from_not_found() {
        let store = Arc::new(FlakyStore::new());
        let service = ReservationService::new(store.clone());
        let r = service.create(candidate("1", "5", "A", day(2024, 6, 10))).await.unwrap();

        store.down.store(true, Ordering::SeqCst);
        assert!(matches!(
            service.cancel(r.id).await,
            Err(ServiceError::StoreUnavailable(_))
        ));
        assert!(matches!(
            service.create(candidate("1", "5", "A", day(2024, 6, 11))).await,
            Err(ServiceError::StoreUnavailable(_))
        ));
        assert!(matches!(service.list_all().await, Err(ServiceError::StoreUnavailable(_))));
        // The cache keeps the last good snapshot.
        assert_eq!(service.snapshot().await, vec![r.clone()]);

        store.down.store(false, Ordering::SeqCst);
        assert_eq!(store.inner.len(), 1);
        service.cancel(r.id).await.unwrap();
    }

    #[tokio::test]
    async fn open_loads_snapshot() {
        let store = InMemoryStore::new();
        store
            .insert(candidate("3", "3", "B", day(2024, 6, 14)).into_fields(0))
            .await
            .unwrap();
        let service = ReservationService::open(store).await.unwrap();
        assert_eq!(service.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_creates_on_one_service_never_double_book() {
        let service = Arc::new(ReservationService::new(InMemoryStore::new()));
        let mut handles = Vec::new();
        for portal in ["1", "2", "3"] {
            let s = service.clone();
            handles.push(tokio::spawn(async move {
                s.create(candidate(portal, "4", "A", day(2024, 6, 12))).await
            }));
        }
        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(ServiceError::Conflict(ConflictKind::DateAlreadyReserved(_))) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(service.store().len(), 1);
    }
}
