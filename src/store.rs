use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::persist;

/// Anything that can be reduced to a calendar day. Keys are always
/// `yyyy-mm-dd`.
pub trait DayKey {
    fn day_key(&self) -> String;
}

impl DayKey for NaiveDate {
    fn day_key(&self) -> String {
        self.format("%Y-%m-%d").to_string()
    }
}

impl DayKey for NaiveDateTime {
    fn day_key(&self) -> String {
        self.date().day_key()
    }
}

impl<Z: TimeZone> DayKey for DateTime<Z> {
    fn day_key(&self) -> String {
        self.date_naive().day_key()
    }
}

/// Unix timestamp in seconds, read in the given zone. Clamped to years
/// 0000 through 9999.
#[derive(Debug, Clone, Copy)]
pub struct Timestamp(pub i64, pub Tz);

const MIN_TIMESTAMP: i64 = -62_167_219_200;
const MAX_TIMESTAMP: i64 = 253_402_300_799;

impl DayKey for Timestamp {
    fn day_key(&self) -> String {
        let secs = self.0.clamp(MIN_TIMESTAMP, MAX_TIMESTAMP);
        DateTime::<Utc>::from_timestamp(secs, 0)
            .unwrap_or_default()
            .with_timezone(&self.1)
            .day_key()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Ok,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    #[serde(default)]
    pub outfit: String,
    #[serde(default)]
    pub schedule: String,
    #[serde(default)]
    pub status: RecordStatus,
}

/// Outfit used when the generator ignored the JSON format.
pub const DEGRADED_OUTFIT: &str = "Casual everyday wear";

impl ScheduleRecord {
    pub fn new(outfit: impl Into<String>, schedule: impl Into<String>) -> Self {
        Self {
            outfit: outfit.into(),
            schedule: schedule.into(),
            status: RecordStatus::Ok,
        }
    }

    /// Keeps the raw generator text when no JSON object could be extracted.
    pub fn degraded(raw: impl Into<String>) -> Self {
        Self::new(DEGRADED_OUTFIT, raw)
    }

    pub fn is_degraded(&self) -> bool {
        self.outfit == DEGRADED_OUTFIT
    }
}

/// Day-keyed records. Pure data, no I/O.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleStore {
    days: BTreeMap<String, ScheduleRecord>,
}

impl ScheduleStore {
    pub fn has<D: DayKey + ?Sized>(&self, day: &D) -> bool {
        self.days.contains_key(&day.day_key())
    }

    pub fn get<D: DayKey + ?Sized>(&self, day: &D) -> Option<&ScheduleRecord> {
        self.days.get(&day.day_key())
    }

    pub fn set<D: DayKey + ?Sized>(&mut self, day: &D, record: ScheduleRecord) {
        self.days.insert(day.day_key(), record);
    }

    pub fn remove<D: DayKey + ?Sized>(&mut self, day: &D) -> Option<ScheduleRecord> {
        self.days.remove(&day.day_key())
    }

    pub fn all(&self) -> &BTreeMap<String, ScheduleRecord> {
        &self.days
    }

    /// Records for the `days` calendar days before `today`, oldest first.
    /// Days without a record are skipped.
    pub fn history(&self, today: NaiveDate, days: u32) -> Vec<(String, ScheduleRecord)> {
        (1..=days)
            .rev()
            .filter_map(|i| today.checked_sub_days(chrono::Days::new(u64::from(i))))
            .filter_map(|d| self.get(&d).map(|r| (d.day_key(), r.clone())))
            .collect()
    }
}

/// The store plus its snapshot file, behind the data lock. Every mutation
/// is written through before the lock is released.
pub struct SharedStore {
    path: PathBuf,
    inner: Mutex<ScheduleStore>,
}

impl SharedStore {
    pub fn load(path: PathBuf) -> Self {
        let store: ScheduleStore = persist::load_or_default(&path);
        tracing::info!("Loaded {} schedule records from {}", store.all().len(), path.display());
        Self {
            path,
            inner: Mutex::new(store),
        }
    }

    pub async fn has(&self, day: &impl DayKey) -> bool {
        self.inner.lock().await.has(day)
    }

    pub async fn get(&self, day: &impl DayKey) -> Option<ScheduleRecord> {
        self.inner.lock().await.get(day).cloned()
    }

    pub async fn history(&self, today: NaiveDate, days: u32) -> Vec<(String, ScheduleRecord)> {
        self.inner.lock().await.history(today, days)
    }

    /// Insert and persist. A failed write is logged; memory stays authoritative
    /// and the next successful write carries the change.
    pub async fn put(&self, day: &impl DayKey, record: ScheduleRecord) {
        let mut store = self.inner.lock().await;
        store.set(day, record);
        if let Err(e) = persist::write_json_atomic(&self.path, &*store).await {
            tracing::error!("Failed to save schedule data: {e:#}");
        }
    }

    pub async fn remove(&self, day: &impl DayKey) -> Option<ScheduleRecord> {
        let mut store = self.inner.lock().await;
        let removed = store.remove(day);
        if removed.is_some() {
            if let Err(e) = persist::write_json_atomic(&self.path, &*store).await {
                tracing::error!("Failed to save schedule data: {e:#}");
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use chrono_tz::Asia::Shanghai;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_day_key_normalizes_inputs() {
        let d = day("2026-03-09");
        assert_eq!(d.day_key(), "2026-03-09");
        assert_eq!(d.and_hms_opt(23, 59, 0).unwrap().day_key(), "2026-03-09");

        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let dt = tz.with_ymd_and_hms(2026, 3, 9, 1, 0, 0).unwrap();
        assert_eq!(dt.day_key(), "2026-03-09");
    }

    #[test]
    fn test_timestamp_uses_zone_day() {
        // 2026-03-08T20:00:00Z is already the 9th in Shanghai.
        let ts = Utc.with_ymd_and_hms(2026, 3, 8, 20, 0, 0).unwrap().timestamp();
        assert_eq!(Timestamp(ts, Shanghai).day_key(), "2026-03-09");
        assert_eq!(Timestamp(ts, chrono_tz::UTC).day_key(), "2026-03-08");
        assert_eq!(Timestamp(i64::MAX, chrono_tz::UTC).day_key(), "9999-12-31");
    }

    #[test]
    fn test_set_get_remove() {
        let mut store = ScheduleStore::default();
        let d = day("2026-01-02");
        assert!(!store.has(&d));
        store.set(&d, ScheduleRecord::new("coat", "walk"));
        assert!(store.has(&d.and_hms_opt(8, 0, 0).unwrap()));
        assert_eq!(store.get(&d).unwrap().outfit, "coat");
        assert_eq!(store.all().len(), 1);
        assert!(store.remove(&d).is_some());
        assert!(!store.has(&d));
        assert!(store.remove(&d).is_none());
    }

    #[test]
    fn test_history_is_chronological_and_bounded() {
        let mut store = ScheduleStore::default();
        store.set(&day("2026-05-07"), ScheduleRecord::new("a", "two days ago"));
        store.set(&day("2026-05-08"), ScheduleRecord::new("b", "yesterday"));
        store.set(&day("2026-05-01"), ScheduleRecord::new("c", "too old"));
        store.set(&day("2026-05-09"), ScheduleRecord::new("d", "today"));

        let hist = store.history(day("2026-05-09"), 3);
        let keys: Vec<_> = hist.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["2026-05-07", "2026-05-08"]);

        assert!(store.history(day("2026-05-09"), 0).is_empty());
    }

    #[test]
    fn test_snapshot_format() {
        let mut store = ScheduleStore::default();
        store.set(&day("2026-01-02"), ScheduleRecord::new("coat", "walk"));
        let json = serde_json::to_value(&store).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"2026-01-02": {"outfit": "coat", "schedule": "walk", "status": "ok"}})
        );

        let legacy: ScheduleStore =
            serde_json::from_str(r#"{"2026-01-03": {"outfit": "x", "schedule": "y"}}"#).unwrap();
        assert_eq!(legacy.get(&day("2026-01-03")).unwrap().status, RecordStatus::Ok);
    }

    #[test]
    fn test_degraded_record() {
        let rec = ScheduleRecord::degraded("raw text");
        assert!(rec.is_degraded());
        assert_eq!(rec.schedule, "raw text");
        assert!(!ScheduleRecord::new("a", "b").is_degraded());
    }

    #[tokio::test]
    async fn test_shared_store_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let shared = SharedStore::load(path.clone());
        let d = day("2026-02-02");
        shared.put(&d, ScheduleRecord::new("scarf", "read")).await;
        assert!(shared.has(&d).await);

        let reloaded = SharedStore::load(path);
        assert_eq!(reloaded.get(&d).await.unwrap().schedule, "read");
        assert!(reloaded.remove(&d).await.is_some());
        assert!(!SharedStore::load(dir.path().join("data.json")).has(&d).await);
    }
}
