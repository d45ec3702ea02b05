use std::sync::Arc;

use chrono::{NaiveDate, Timelike};

use crate::calendar::period_of_day;
use crate::clock::Clock;
use crate::generator::GENERATION_SESSION;
use crate::guard::{GenerationGuard, Outcome, Trigger};
use crate::scheduler::Scheduler;
use crate::settings::{ScheduleTime, SettingsHandle};
use crate::store::{DayKey, ScheduleRecord};

pub const USAGE: &str = "Usage:\n\
    /life show - show today's schedule\n\
    /life regenerate - generate today's schedule again\n\
    /life time <HH:MM> - set the daily generation time";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifeCommand {
    Show,
    Regenerate,
    Time(Option<String>),
    Help,
}

impl LifeCommand {
    pub fn parse(action: &str, param: Option<&str>) -> Self {
        match action.trim() {
            "show" => Self::Show,
            "regenerate" => Self::Regenerate,
            "time" => Self::Time(
                param
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from),
            ),
            _ => Self::Help,
        }
    }
}

/// Command handling and the prompt hook, on top of the guard and scheduler.
pub struct LifeService {
    guard: Arc<GenerationGuard>,
    settings: Arc<SettingsHandle>,
    scheduler: Arc<Scheduler>,
    clock: Arc<dyn Clock>,
}

impl LifeService {
    pub fn new(
        guard: Arc<GenerationGuard>,
        settings: Arc<SettingsHandle>,
        scheduler: Arc<Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            guard,
            settings,
            scheduler,
            clock,
        }
    }

    pub async fn execute(&self, cmd: LifeCommand) -> String {
        match cmd {
            LifeCommand::Show => reply(self.guard.show().await),
            LifeCommand::Regenerate => reply(self.guard.regenerate().await),
            LifeCommand::Time(None) => {
                "Please give a time as HH:MM, e.g. /life time 07:30".to_string()
            }
            LifeCommand::Time(Some(t)) => self.set_time(&t).await,
            LifeCommand::Help => USAGE.to_string(),
        }
    }

    /// Today's record without triggering generation.
    pub async fn today(&self) -> (NaiveDate, Option<ScheduleRecord>) {
        let today = self.guard.today();
        (today, self.guard.store().get(&today).await)
    }

    pub async fn set_time(&self, value: &str) -> String {
        let time: ScheduleTime = match value.parse() {
            Ok(t) => t,
            Err(e) => return format!("Invalid time: {e}. Use HH:MM."),
        };
        if self.settings.set_schedule_time(time).await {
            self.scheduler.update_time(time);
        }
        format!("Daily schedule generation time set to {time}.")
    }

    /// Lazy trigger for an outgoing LLM request: make sure today's record
    /// exists, then append it to `system_prompt` as background.
    pub async fn inject(&self, session_id: &str, system_prompt: &str) -> String {
        if session_id == GENERATION_SESSION {
            return system_prompt.to_string();
        }
        let outcome = self.guard.ensure_today(Trigger::Lazy).await;
        let Some(rec) = outcome.record() else {
            return system_prompt.to_string();
        };
        let period = period_of_day(self.clock.now().hour());
        format!(
            "{system_prompt}\n[Background]\n\
             Current time of day: {period}\n\
             Today's outfit: {}\n\
             Today's plan (implicit background): {}\n\n\
             [Constraint]\n\
             Treat the above only as subconscious background that colours your tone. \
             Never bring up or report your schedule unless the user explicitly asks.",
            rec.outfit, rec.schedule
        )
    }

}

fn reply(outcome: Outcome) -> String {
    match outcome {
        Outcome::Cached(day, rec) | Outcome::Generated(day, rec) => {
            format_record(&day.day_key(), &rec)
        }
        Outcome::Failed(_, e) => format!("Generation failed: {e}. Please check the logs."),
        Outcome::SkippedFailed(day) => format!(
            "Generation for {} failed earlier. Use /life regenerate to retry.",
            day.day_key()
        ),
    }
}

pub fn format_record(day: &str, rec: &ScheduleRecord) -> String {
    let mut text = format!(
        "📅 {day}\n👗 Outfit: {}\n📝 Schedule:\n{}",
        rec.outfit, rec.schedule
    );
    if rec.is_degraded() {
        text.push_str("\n⚠️ The model did not return structured output; showing its raw reply.");
    }
    text
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use crate::guard::tests::{Harness, harness};

    pub fn service(h: &Harness) -> LifeService {
        let clock: Arc<dyn Clock> = h.clock.clone();
        let scheduler = Arc::new(Scheduler::new(
            h.guard.clone(),
            clock.clone(),
            ScheduleTime::default(),
        ));
        LifeService::new(h.guard.clone(), h.settings.clone(), scheduler, clock)
    }

    const GOOD: &str = r#"{"outfit":"denim jacket","schedule":"bookshop and ramen"}"#;

    #[test]
    fn test_parse_commands() {
        assert_eq!(LifeCommand::parse("show", None), LifeCommand::Show);
        assert_eq!(LifeCommand::parse("regenerate", Some("x")), LifeCommand::Regenerate);
        assert_eq!(
            LifeCommand::parse("time", Some(" 07:30 ")),
            LifeCommand::Time(Some("07:30".into()))
        );
        assert_eq!(LifeCommand::parse("time", Some("")), LifeCommand::Time(None));
        assert_eq!(LifeCommand::parse("", None), LifeCommand::Help);
        assert_eq!(LifeCommand::parse("dance", None), LifeCommand::Help);
    }

    #[tokio::test]
    async fn test_show_twice_is_identical() {
        let h = harness(Some(GOOD));
        let svc = service(&h);
        let first = svc.execute(LifeCommand::Show).await;
        let second = svc.execute(LifeCommand::Show).await;
        assert_eq!(first, second);
        assert!(first.starts_with("📅 2026-10-17\n👗 Outfit: denim jacket"));
        assert_eq!(h.generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_show_reports_failure() {
        let h = harness(None);
        let svc = service(&h);
        let text = svc.execute(LifeCommand::Show).await;
        assert!(text.starts_with("Generation failed: generator call failed"), "{text}");
        assert!(text.contains("provider unavailable"));
    }

    #[tokio::test]
    async fn test_reply_uses_the_generated_day() {
        let h = harness(Some(GOOD));
        let outcome = h.guard.show().await;
        h.clock.set("2026-10-18T00:00:05+08:00");
        assert!(reply(outcome).starts_with("📅 2026-10-17\n"));
    }

    #[test]
    fn test_skipped_and_degraded_replies() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        assert_eq!(
            reply(Outcome::SkippedFailed(day)),
            "Generation for 2026-10-17 failed earlier. Use /life regenerate to retry."
        );

        let text = format_record("2026-10-17", &ScheduleRecord::degraded("just vibes"));
        assert!(text.contains("📝 Schedule:\njust vibes"));
        assert!(text.ends_with("showing its raw reply."));
        assert!(!format_record("2026-10-17", &ScheduleRecord::new("a", "b")).contains("⚠️"));
    }

    #[tokio::test]
    async fn test_time_command() {
        let h = harness(None);
        let svc = service(&h);
        let settings_path = h.dir.path().join("settings.json");

        assert!(svc.execute(LifeCommand::Time(None)).await.contains("HH:MM"));
        assert!(svc.set_time("7:30").await.starts_with("Invalid time"));
        assert!(svc.set_time("25:00").await.starts_with("Invalid time"));
        assert!(!settings_path.exists());

        svc.set_time("07:00").await;
        assert!(!settings_path.exists(), "unchanged time must not be written");

        svc.set_time("06:15").await;
        assert!(settings_path.exists());
        assert_eq!(svc.scheduler.schedule_time().to_string(), "06:15");
        assert_eq!(h.settings.schedule_time().await.to_string(), "06:15");
    }

    #[tokio::test]
    async fn test_inject_appends_background() {
        let h = harness(Some(GOOD));
        let svc = service(&h);
        let prompt = svc.inject("cli:alice", "You are helpful.").await;
        assert!(prompt.starts_with("You are helpful.\n[Background]"));
        assert!(prompt.contains("Current time of day: morning"));
        assert!(prompt.contains("Today's outfit: denim jacket"));
        assert_eq!(h.generator.calls(), 1);

        svc.inject("cli:bob", "x").await;
        assert_eq!(h.generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_inject_skips_generation_session() {
        let h = harness(Some(GOOD));
        let svc = service(&h);
        assert_eq!(svc.inject(GENERATION_SESSION, "sys").await, "sys");
        assert_eq!(h.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_inject_without_record_is_passthrough() {
        let h = harness(None);
        let svc = service(&h);
        assert_eq!(svc.inject("cli:alice", "sys").await, "sys");
        assert_eq!(svc.inject("cli:alice", "sys").await, "sys");
        assert_eq!(h.generator.calls(), 1);
    }
}
