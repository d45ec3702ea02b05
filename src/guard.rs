use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use crate::clock::Clock;
use crate::error::GenerationError;
use crate::pipeline::SchedulePipeline;
use crate::settings::SettingsHandle;
use crate::store::{DayKey, ScheduleRecord, SharedStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Cron,
    Lazy,
}

/// Result of one trigger, tagged with the day it was evaluated for.
#[derive(Debug)]
pub enum Outcome {
    /// A record already existed; nothing was generated.
    Cached(NaiveDate, ScheduleRecord),
    Generated(NaiveDate, ScheduleRecord),
    /// The day already failed in this process; not retried.
    SkippedFailed(NaiveDate),
    Failed(NaiveDate, GenerationError),
}

impl Outcome {
    pub fn day(&self) -> NaiveDate {
        match self {
            Outcome::Cached(d, _)
            | Outcome::Generated(d, _)
            | Outcome::SkippedFailed(d)
            | Outcome::Failed(d, _) => *d,
        }
    }

    pub fn record(&self) -> Option<&ScheduleRecord> {
        match self {
            Outcome::Cached(_, r) | Outcome::Generated(_, r) => Some(r),
            Outcome::SkippedFailed(_) | Outcome::Failed(..) => None,
        }
    }
}

/// Serializes every generation attempt behind one lock and remembers which
/// days failed, so cron and lazy triggers generate at most once per day.
pub struct GenerationGuard {
    store: Arc<SharedStore>,
    settings: Arc<SettingsHandle>,
    pipeline: SchedulePipeline,
    clock: Arc<dyn Clock>,
    generation_lock: tokio::sync::Mutex<()>,
    failed_dates: Mutex<HashSet<String>>,
}

impl GenerationGuard {
    pub fn new(
        store: Arc<SharedStore>,
        settings: Arc<SettingsHandle>,
        pipeline: SchedulePipeline,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            settings,
            pipeline,
            clock,
            generation_lock: tokio::sync::Mutex::new(()),
            failed_dates: Mutex::new(HashSet::new()),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn is_failed(&self, day: &NaiveDate) -> bool {
        self.failed_dates
            .lock()
            .expect("failed_dates lock poisoned")
            .contains(&day.day_key())
    }

    /// Cron and lazy path: generate today's record unless it exists or
    /// already failed today.
    pub async fn ensure_today(&self, trigger: Trigger) -> Outcome {
        let today = self.today();
        if let Some(rec) = self.store.get(&today).await {
            return Outcome::Cached(today, rec);
        }
        if self.is_failed(&today) {
            tracing::debug!("Skipping {trigger:?} generation for {today}: failed earlier");
            return Outcome::SkippedFailed(today);
        }

        let _lock = self.generation_lock.lock().await;
        // Another caller may have finished while we waited.
        if let Some(rec) = self.store.get(&today).await {
            return Outcome::Cached(today, rec);
        }
        if self.is_failed(&today) {
            return Outcome::SkippedFailed(today);
        }

        tracing::info!("Generating schedule for {today} ({trigger:?})");
        self.generate_locked(today).await
    }

    /// Explicit `show`: cached record, or generate now even if today failed
    /// earlier.
    pub async fn show(&self) -> Outcome {
        let today = self.today();
        if let Some(rec) = self.store.get(&today).await {
            return Outcome::Cached(today, rec);
        }
        let _lock = self.generation_lock.lock().await;
        if let Some(rec) = self.store.get(&today).await {
            return Outcome::Cached(today, rec);
        }
        tracing::info!("No schedule for {today} yet, generating on request");
        self.generate_locked(today).await
    }

    /// Explicit `regenerate`: always generates; the existing record is
    /// replaced only on success.
    pub async fn regenerate(&self) -> Outcome {
        let today = self.today();
        let _lock = self.generation_lock.lock().await;
        tracing::info!("Regenerating schedule for {today}");
        self.generate_locked(today).await
    }

    /// Caller must hold `generation_lock`.
    async fn generate_locked(&self, today: NaiveDate) -> Outcome {
        let settings = self.settings.get().await;
        match self.pipeline.run(today, &settings).await {
            Ok(record) => {
                self.store.put(&today, record.clone()).await;
                self.failed_dates
                    .lock()
                    .expect("failed_dates lock poisoned")
                    .remove(&today.day_key());
                Outcome::Generated(today, record)
            }
            Err(e) => {
                tracing::warn!("Failed to generate schedule for {today}: {e}. Marking as failed.");
                self.failed_dates
                    .lock()
                    .expect("failed_dates lock poisoned")
                    .insert(today.day_key());
                Outcome::Failed(today, e)
            }
        }
    }
}
