use chrono::NaiveDate;

use crate::context::ContextAssembler;
use crate::error::GenerationError;
use crate::extract;
use crate::generator::GeneratorClient;
use crate::prompt;
use crate::settings::SchedulerSettings;
use crate::store::ScheduleRecord;

/// context → prompt → generator → extraction, for one day.
pub struct SchedulePipeline {
    assembler: ContextAssembler,
    generator: GeneratorClient,
}

impl SchedulePipeline {
    pub fn new(assembler: ContextAssembler, generator: GeneratorClient) -> Self {
        Self {
            assembler,
            generator,
        }
    }

    pub async fn run(
        &self,
        today: NaiveDate,
        settings: &SchedulerSettings,
    ) -> Result<ScheduleRecord, GenerationError> {
        let ctx = self.assembler.assemble(today, settings).await;
        let prompt = prompt::build_prompt(&settings.prompt_template, &ctx)?;
        let raw = self.generator.generate(&prompt).await?;
        Ok(extract::to_record(&raw))
    }
}
