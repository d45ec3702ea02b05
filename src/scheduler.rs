use std::sync::{Arc, Mutex};

use chrono::{DateTime, Days, LocalResult, NaiveDateTime, TimeDelta, TimeZone};
use chrono_tz::Tz;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::guard::{GenerationGuard, Trigger};
use crate::settings::ScheduleTime;

/// Fires [`GenerationGuard::ensure_today`] once a day at the configured
/// wall-clock time. The time can be changed while running.
pub struct Scheduler {
    guard: Arc<GenerationGuard>,
    clock: Arc<dyn Clock>,
    time_tx: watch::Sender<ScheduleTime>,
    job: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(guard: Arc<GenerationGuard>, clock: Arc<dyn Clock>, at: ScheduleTime) -> Self {
        let (time_tx, _) = watch::channel(at);
        Self {
            guard,
            clock,
            time_tx,
            job: Mutex::new(None),
        }
    }

    pub fn schedule_time(&self) -> ScheduleTime {
        *self.time_tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.job
            .lock()
            .expect("scheduler lock poisoned")
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Register the daily job. No-op if already running.
    pub fn start(&self) {
        let mut job = self.job.lock().expect("scheduler lock poisoned");
        if job.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let guard = self.guard.clone();
        let clock = self.clock.clone();
        let rx = self.time_tx.subscribe();
        *job = Some(tokio::spawn(run_daily(guard, clock, rx)));
        tracing::info!("Life scheduler started at {}", self.schedule_time());
    }

    pub fn stop(&self) {
        if let Some(handle) = self.job.lock().expect("scheduler lock poisoned").take() {
            handle.abort();
            tracing::info!("Life scheduler stopped");
        }
    }

    /// Move the daily job to `at` without restarting. Returns `false` if
    /// `at` is already the current time.
    pub fn update_time(&self, at: ScheduleTime) -> bool {
        let changed = self.time_tx.send_if_modified(|current| {
            if *current == at {
                return false;
            }
            *current = at;
            true
        });
        if changed {
            tracing::info!("Life scheduler rescheduled to {at}");
        }
        changed
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_daily(
    guard: Arc<GenerationGuard>,
    clock: Arc<dyn Clock>,
    mut time_rx: watch::Receiver<ScheduleTime>,
) {
    loop {
        let at = *time_rx.borrow_and_update();
        let now = clock.now();
        let Some(fire_at) = next_fire(now, at) else {
            tracing::error!("Cannot compute next run for {at}; daily job idle until rescheduled");
            if time_rx.changed().await.is_err() {
                return;
            }
            continue;
        };
        let wait = (fire_at - now).to_std().unwrap_or_default();
        tracing::debug!("Next schedule generation at {fire_at}");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                tracing::info!("Starting daily schedule generation task...");
                let outcome = guard.ensure_today(Trigger::Cron).await;
                if outcome.record().is_none() {
                    tracing::error!("Daily schedule generation produced no record: {outcome:?}");
                }
            }
            changed = time_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

/// The next instant strictly after `now` whose wall-clock time is `at`.
pub fn next_fire(now: DateTime<Tz>, at: ScheduleTime) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    for _ in 0..2 {
        let wall = day.and_hms_opt(at.hour, at.minute, 0)?;
        if let Some(candidate) = resolve_local(&tz, wall)
            && candidate > now
        {
            return Some(candidate);
        }
        day = day.checked_add_days(Days::new(1))?;
    }
    None
}

/// Ambiguous wall times (clocks going back) take the first occurrence.
/// Times skipped by clocks going forward move an hour later.
fn resolve_local(tz: &Tz, wall: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&wall) {
        LocalResult::Single(t) => Some(t),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => tz
            .from_local_datetime(&(wall + TimeDelta::hours(1)))
            .earliest(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::clock::FixedClock;
    use crate::guard::tests::harness;

    fn at(s: &str) -> ScheduleTime {
        s.parse().unwrap()
    }

    fn t(s: &str) -> DateTime<Tz> {
        in_zone(s, chrono_tz::Asia::Shanghai)
    }

    fn in_zone(s: &str, tz: Tz) -> DateTime<Tz> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&tz)
    }

    #[test]
    fn test_next_fire_later_today() {
        let next = next_fire(t("2026-10-17T05:00:00+08:00"), at("07:00")).unwrap();
        assert_eq!(next, t("2026-10-17T07:00:00+08:00"));
    }

    #[test]
    fn test_next_fire_rolls_to_tomorrow() {
        let next = next_fire(t("2026-10-17T07:00:00+08:00"), at("07:00")).unwrap();
        assert_eq!(next, t("2026-10-18T07:00:00+08:00"));
        let utc = |s| in_zone(s, chrono_tz::UTC);
        let next = next_fire(utc("2026-12-31T23:30:00+00:00"), at("00:15")).unwrap();
        assert_eq!(next, utc("2027-01-01T00:15:00+00:00"));
    }

    #[test]
    fn test_next_fire_across_daylight_saving() {
        let ny = |s| in_zone(s, chrono_tz::America::New_York);

        // Spring forward: 07:00 EST to 07:00 EDT is 23 hours.
        let now = ny("2026-03-07T07:00:00-05:00");
        let next = next_fire(now, at("07:00")).unwrap();
        assert_eq!(next, ny("2026-03-08T07:00:00-04:00"));
        assert_eq!(next - now, TimeDelta::hours(23));

        // Fall back: 25 hours.
        let now = ny("2026-10-31T07:00:00-04:00");
        let next = next_fire(now, at("07:00")).unwrap();
        assert_eq!(next - now, TimeDelta::hours(25));
    }

    #[test]
    fn test_next_fire_in_gap_and_overlap() {
        let ny = |s| in_zone(s, chrono_tz::America::New_York);

        // 02:30 does not exist on 2026-03-08.
        let next = next_fire(ny("2026-03-07T12:00:00-05:00"), at("02:30")).unwrap();
        assert_eq!(next, ny("2026-03-08T03:30:00-04:00"));

        // 01:30 happens twice on 2026-11-01; the first one wins.
        let next = next_fire(ny("2026-10-31T12:00:00-04:00"), at("01:30")).unwrap();
        assert_eq!(next, ny("2026-11-01T01:30:00-04:00"));
    }

    #[tokio::test]
    async fn test_update_time_noop_when_unchanged() {
        let h = harness(None);
        let clock = Arc::new(FixedClock::at("2026-10-17T10:30:00+08:00"));
        let sched = Scheduler::new(h.guard.clone(), clock, at("07:00"));
        let mut rx = sched.time_tx.subscribe();

        assert!(!sched.update_time(at("07:00")));
        assert!(!rx.has_changed().unwrap());

        assert!(sched.update_time(at("08:30")));
        assert!(rx.has_changed().unwrap());
        assert_eq!(sched.schedule_time(), at("08:30"));
    }

    #[tokio::test]
    async fn test_start_stop() {
        let h = harness(None);
        let clock = Arc::new(FixedClock::at("2026-10-17T10:30:00+08:00"));
        let sched = Scheduler::new(h.guard.clone(), clock, at("07:00"));
        assert!(!sched.is_running());
        sched.start();
        sched.start();
        assert!(sched.is_running());
        sched.stop();
        assert!(!sched.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_scheduled_time() {
        let h = harness(Some(r#"{"outfit":"o","schedule":"s"}"#));
        let clock = Arc::new(FixedClock::at("2026-10-17T06:59:00+08:00"));
        let sched = Scheduler::new(h.guard.clone(), clock, at("07:00"));
        sched.start();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.generator.calls(), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.generator.calls(), 1);
        assert!(h.guard.store().has(&h.guard.today()).await);
        sched.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_while_waiting() {
        let h = harness(Some(r#"{"outfit":"o","schedule":"s"}"#));
        let clock = Arc::new(FixedClock::at("2026-10-17T06:00:00+08:00"));
        let sched = Scheduler::new(h.guard.clone(), clock, at("09:00"));
        sched.start();
        tokio::task::yield_now().await;

        assert!(sched.update_time(at("06:10")));
        tokio::time::sleep(Duration::from_secs(11 * 60)).await;
        assert_eq!(h.generator.calls(), 1);
        sched.stop();
    }
}
