use poise::async_trait;
use tracing::{event, field, info_span, Instrument, Level};

use crate::delivery::run_cycle;
use crate::job::{Job, JobArgs, JobResult};

struct DailyFactJob;

#[async_trait]
impl Job for DailyFactJob {
    fn name(&self) -> &'static str {
        "daily_fact"
    }

    async fn run(&self, args: &JobArgs) -> JobResult {
        let span = info_span!("factbot.jobs.daily_fact", fired_at = field::display(&args.fired_at));

        async move {
            let destinations = args.registry.read().await.snapshot();
            event!(Level::DEBUG, "Found {} registered channel(s)", destinations.len());

            let report = run_cycle(destinations, &args.content, args.courier.as_ref()).await;

            if report.used_fallback_fact {
                event!(Level::WARN, "The fallback fact was posted");
            }
            event!(Level::INFO, image = report.image_attached, "Daily fact delivered. {}", report);

            anyhow::Ok(())
        }
        .instrument(span)
        .await
    }
}

pub fn daily_fact() -> Box<dyn Job> {
    Box::new(DailyFactJob {})
}
