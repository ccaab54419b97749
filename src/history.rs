use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFeatures {
    pub watermark: bool,
    pub subtitles: bool,
}

/// Processing history entry for one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub features: JobFeatures,
    pub url: Option<String>,
    pub error: Option<String>,
}

/// In-memory log of submitted jobs, newest first, capped at `limit` records.
#[derive(Debug)]
pub struct JobHistory {
    records: RwLock<Vec<JobRecord>>,
    limit: usize,
}

impl Default for JobHistory {
    fn default() -> Self {
        Self::with_limit(100)
    }
}

impl JobHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// History keeping at most `limit` records; the oldest are dropped first
    pub fn with_limit(limit: usize) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            limit: limit.max(1),
        }
    }

    pub fn open(&self, id: Uuid, features: JobFeatures) -> JobRecord {
        let record = JobRecord {
            id,
            created_at: Utc::now(),
            completed_at: None,
            status: JobStatus::Pending,
            features,
            url: None,
            error: None,
        };
        let mut records = self.write();
        records.insert(0, record.clone());
        records.truncate(self.limit);
        record
    }

    pub fn mark_processing(&self, id: Uuid) {
        self.update(id, |record| record.status = JobStatus::Processing);
    }

    pub fn complete(&self, id: Uuid, url: &str) {
        self.update(id, |record| {
            record.status = JobStatus::Completed;
            record.completed_at = Some(Utc::now());
            record.url = Some(url.to_string());
        });
    }

    pub fn fail(&self, id: Uuid, error: &str) {
        self.update(id, |record| {
            record.status = JobStatus::Failed;
            record.completed_at = Some(Utc::now());
            record.error = Some(error.to_string());
        });
    }

    pub fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.read().iter().find(|record| record.id == id).cloned()
    }

    pub fn snapshot(&self) -> Vec<JobRecord> {
        self.read().clone()
    }

    fn update<F: FnOnce(&mut JobRecord)>(&self, id: Uuid, apply: F) {
        if let Some(record) = self.write().iter_mut().find(|record| record.id == id) {
            apply(record);
        }
    }

    // The lock guards plain data, so a poisoned lock still holds a usable list.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<JobRecord>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<JobRecord>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEATURES: JobFeatures = JobFeatures {
        watermark: true,
        subtitles: false,
    };

    #[test]
    fn test_lifecycle() {
        let history = JobHistory::new();
        let id = Uuid::new_v4();

        let record = history.open(id, FEATURES);
        assert_eq!(record.status, JobStatus::Pending);

        history.mark_processing(id);
        assert_eq!(history.get(id).unwrap().status, JobStatus::Processing);

        history.complete(id, "file:///tmp/out.mp4");
        let record = history.get(id).unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert!(record.completed_at.is_some());
        assert_eq!(record.url.as_deref(), Some("file:///tmp/out.mp4"));
    }

    #[test]
    fn test_newest_first_and_failures() {
        let history = JobHistory::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        history.open(first, FEATURES);
        history.open(second, FEATURES);
        history.fail(first, "boom");

        let snapshot = history.snapshot();
        assert_eq!(snapshot[0].id, second);
        assert_eq!(snapshot[1].status, JobStatus::Failed);
        assert_eq!(snapshot[1].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_oldest_records_are_dropped_at_limit() {
        let history = JobHistory::with_limit(2);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            history.open(*id, FEATURES);
        }

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, ids[2]);
        assert_eq!(snapshot[1].id, ids[1]);
        assert!(history.get(ids[0]).is_none());

        // Updates to an evicted job are ignored
        history.fail(ids[0], "late");
        assert_eq!(history.snapshot().len(), 2);
    }

    #[test]
    fn test_record_serializes_lowercase_status() {
        let history = JobHistory::new();
        let record = history.open(Uuid::new_v4(), FEATURES);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["features"]["watermark"], true);
    }
}
