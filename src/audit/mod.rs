//! Audit logging for planning runs
//!
//! Every run, successful or not, leaves one record with its reasoning trace.
//! Each record carries a SHA-256 of its request and one of its full content,
//! so a record altered after it was built is refused and reported. The log
//! holds a bounded number of records and drops the oldest first.

use crate::error::{ErrorKind, PlanningError};
use crate::execution::StageReport;
use crate::models::TripRequest;
use crate::stages::StageId;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Records kept when no capacity is configured.
pub const DEFAULT_AUDIT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanningOutcome {
    Success {
        days: usize,
        total_cost: f64,
    },
    Failure {
        stage: StageId,
        kind: ErrorKind,
        cause: String,
        attempts: u32,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanningRecord {
    pub audit_id: Uuid,
    pub request_id: Uuid,
    pub request: Arc<TripRequest>,
    pub request_hash: String,
    pub outcome: PlanningOutcome,
    pub stage_reports: Arc<Vec<StageReport>>,
    pub reasoning_trace: Arc<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// SHA-256 over the request, outcome, stage reports, trace and timing.
    pub record_hash: String,
}

/// The parts of a record its hash commits to.
#[derive(Serialize)]
struct RecordContent<'a> {
    request: &'a TripRequest,
    outcome: &'a PlanningOutcome,
    stage_reports: &'a [StageReport],
    reasoning_trace: &'a [String],
    created_at: &'a DateTime<Utc>,
    elapsed_ms: u64,
}

impl PlanningRecord {
    pub fn new(
        request: Arc<TripRequest>,
        outcome: PlanningOutcome,
        stage_reports: Vec<StageReport>,
        reasoning_trace: Vec<String>,
        elapsed_ms: u64,
    ) -> Self {
        let mut record = Self {
            audit_id: Uuid::new_v4(),
            request_id: request.request_id,
            request_hash: compute_hash(request.as_ref()),
            request,
            outcome,
            stage_reports: Arc::new(stage_reports),
            reasoning_trace: Arc::new(reasoning_trace),
            created_at: Utc::now(),
            elapsed_ms,
            record_hash: String::new(),
        };
        record.record_hash = record.content_hash();
        record
    }

    fn content_hash(&self) -> String {
        compute_hash(&RecordContent {
            request: &self.request,
            outcome: &self.outcome,
            stage_reports: &self.stage_reports,
            reasoning_trace: &self.reasoning_trace,
            created_at: &self.created_at,
            elapsed_ms: self.elapsed_ms,
        })
    }

    /// Both hashes still match the record's content.
    pub fn is_intact(&self) -> bool {
        self.request_id == self.request.request_id
            && compute_hash(self.request.as_ref()) == self.request_hash
            && self.content_hash() == self.record_hash
    }
}

/// Records in arrival order; the oldest is evicted once `capacity` is reached.
struct AuditStore {
    records: HashMap<Uuid, PlanningRecord>,
    order: VecDeque<Uuid>,
}

/// Bounded in-memory audit trail
pub struct AuditLog {
    capacity: usize,
    store: RwLock<AuditStore>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            store: RwLock::new(AuditStore {
                records: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
        }
    }

    /// Store a planning record, evicting the oldest when full
    pub async fn record(&self, record: PlanningRecord) -> Result<Uuid> {
        if !record.is_intact() {
            return Err(PlanningError::InvariantViolation(format!(
                "planning record {} does not match its hash",
                record.audit_id
            )));
        }

        let audit_id = record.audit_id;
        let mut store = self.store.write().await;

        if store.records.insert(audit_id, record).is_none() {
            store.order.push_back(audit_id);
        }

        while store.order.len() > self.capacity {
            if let Some(evicted) = store.order.pop_front() {
                store.records.remove(&evicted);
                debug!(audit_id = %evicted, "Evicted oldest planning record");
            }
        }

        Ok(audit_id)
    }

    /// Retrieve a record by audit ID
    pub async fn get(&self, audit_id: Uuid) -> Result<Option<PlanningRecord>> {
        let store = self.store.read().await;
        Ok(store.records.get(&audit_id).cloned())
    }

    /// All retained audit IDs for a request, oldest first
    pub async fn list_for_request(&self, request_id: Uuid) -> Result<Vec<Uuid>> {
        let store = self.store.read().await;

        Ok(store
            .order
            .iter()
            .filter(|id| {
                store
                    .records
                    .get(*id)
                    .is_some_and(|record| record.request_id == request_id)
            })
            .copied()
            .collect())
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Recompute a stored record's hashes. Unknown IDs are not intact.
    pub async fn verify_integrity(&self, audit_id: Uuid) -> Result<bool> {
        let store = self.store.read().await;
        Ok(store
            .records
            .get(&audit_id)
            .is_some_and(PlanningRecord::is_intact))
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 of a value's JSON form, hex encoded
pub fn compute_hash<T: Serialize + ?Sized>(value: &T) -> String {
    let mut hasher = Sha256::new();

    // Stream JSON directly into the hasher
    if serde_json::to_writer(&mut HashWriter(&mut hasher), value).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TravelerComposition;
    use chrono::NaiveDate;

    fn request() -> Arc<TripRequest> {
        Arc::new(TripRequest::new(
            "Lyon",
            vec!["Nice".to_string()],
            NaiveDate::from_ymd_opt(2027, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2027, 8, 4).unwrap(),
            TravelerComposition { adults: 2, children: 2 },
            3200.0,
        ))
    }

    fn success(req: &Arc<TripRequest>, trace: &str) -> PlanningRecord {
        PlanningRecord::new(
            req.clone(),
            PlanningOutcome::Success { days: 4, total_cost: 900.0 },
            Vec::new(),
            vec![trace.to_string()],
            7,
        )
    }

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let req = request();
        assert_eq!(compute_hash(req.as_ref()), compute_hash(req.as_ref()));
        assert_eq!(compute_hash(req.as_ref()).len(), 64);

        let mut other = (*req).clone();
        other.budget = 3100.0;
        assert_ne!(compute_hash(req.as_ref()), compute_hash(&other));
    }

    #[tokio::test]
    async fn test_record_and_lookup() {
        let log = AuditLog::new();
        let req = request();

        let first = log
            .record(PlanningRecord::new(
                req.clone(),
                PlanningOutcome::Failure {
                    stage: StageId::ActivityFinder,
                    kind: ErrorKind::NoCandidates,
                    cause: "nothing".to_string(),
                    attempts: 2,
                },
                Vec::new(),
                vec!["INPUT".to_string()],
                5,
            ))
            .await
            .unwrap();
        let second = log.record(success(&req, "COMPLETE")).await.unwrap();

        assert_eq!(log.list_for_request(req.request_id).await.unwrap(), vec![first, second]);
        assert!(log.verify_integrity(first).await.unwrap());
        assert!(!log.verify_integrity(Uuid::new_v4()).await.unwrap());

        let stored = log.get(first).await.unwrap().unwrap();
        assert_eq!(stored.reasoning_trace.as_slice(), ["INPUT".to_string()]);
    }

    #[tokio::test]
    async fn test_altered_record_is_refused() {
        let log = AuditLog::new();
        let req = request();

        let mut record = success(&req, "COMPLETE");
        assert!(record.is_intact());
        record.outcome = PlanningOutcome::Success { days: 4, total_cost: 90.0 };
        assert!(!record.is_intact());

        let err = log.record(record).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert!(log.is_empty().await);

        let mut record = success(&req, "COMPLETE");
        record.reasoning_trace = Arc::new(vec!["COMPLETE".to_string(), "edited".to_string()]);
        assert!(!record.is_intact());
    }

    #[tokio::test]
    async fn test_oldest_records_are_evicted() {
        let log = AuditLog::with_capacity(2);
        let req = request();

        let first = log.record(success(&req, "one")).await.unwrap();
        let second = log.record(success(&req, "two")).await.unwrap();
        let third = log.record(success(&req, "three")).await.unwrap();

        assert_eq!(log.len().await, 2);
        assert!(log.get(first).await.unwrap().is_none());
        assert_eq!(log.list_for_request(req.request_id).await.unwrap(), vec![second, third]);
    }
}
