use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use poise::async_trait;
use tokio::sync::{Notify, RwLock};
use tracing::{event, field, info, info_span, Instrument, Level};

use factbot_storage::prelude::*;

use crate::content::ContentSources;
use crate::delivery::Courier;
use crate::schedule::{plan_next, Plan, Schedule};

pub(crate) type JobResult = anyhow::Result<()>;

pub type SharedRegistry = Arc<RwLock<ChannelRegistry>>;

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, args: &JobArgs) -> JobResult;
}

/// Everything a job needs during one firing.
#[derive(Clone)]
pub struct JobArgs {
    pub registry: SharedRegistry,
    pub content: Arc<ContentSources>,
    pub courier: Arc<dyn Courier>,
    pub fired_at: DateTime<Utc>,
}

impl JobArgs {
    pub fn new(registry: SharedRegistry, content: Arc<ContentSources>, courier: Arc<dyn Courier>) -> Self {
        Self { registry, content, courier, fired_at: Utc::now() }
    }

    fn firing_at(&self, time: DateTime<Utc>) -> Self {
        Self { fired_at: time, ..self.clone() }
    }
}

/// Runs `jobs` once a day at the trigger time of `schedule`.
///
/// Nothing happens until `ready` is notified. After every firing the time is saved through `ledger`,
/// so a restart inside the trigger minute does not fire a second time that day. `clock` supplies the current time.
pub(crate) async fn job_scheduler(
    schedule: Schedule,
    jobs: &[Box<dyn Job>],
    args: JobArgs,
    ledger: Arc<dyn DeliveryLedger>,
    ready: Arc<Notify>,
    clock: impl Fn() -> DateTime<Utc>,
) -> Result<()> {
    let span = info_span!("factbot.jobs.scheduler", trigger = field::display(&schedule.trigger));

    async move {
        if jobs.is_empty() {
            info!("Job queue is empty. Skipping...");
            return anyhow::Ok(());
        }

        event!(Level::DEBUG, "Waiting for the Discord session to be ready");
        ready.notified().await;

        let now = clock();
        info!("Daily fact task is ready!");
        info!("Current UTC time: {}", now.format("%H:%M:%S"));
        info!("Current local time: {}", schedule.local_now(now).format("%H:%M:%S %Z"));
        info!("Scheduled to run at {} ({})", schedule.local_label(), schedule.trigger);

        let mut last_fired: Option<NaiveDate> = None;

        loop {
            let now = clock();
            let last_delivery = last_fired.max(last_delivery_date(ledger.as_ref()).await);

            match plan_next(now, schedule.trigger, last_delivery) {
                Plan::FireNow => {
                    info!("Daily fact task triggered!");
                    info!("UTC time: {}", now.format("%Y-%m-%d %H:%M:%S %Z"));
                    info!("Local time: {}", schedule.local_now(now).format("%Y-%m-%d %H:%M:%S %Z"));

                    run_jobs(jobs, &args.firing_at(now)).await;
                    last_fired = Some(now.date_naive());

                    if let Err(e) = ledger.record_delivery(&DeliveryState::new(now)).await {
                        event!(Level::ERROR, "Error saving the delivery state: {:?}", e);
                    }
                }
                Plan::SleepUntil(next) => {
                    let wait = (next - now).to_std().unwrap_or_default();
                    info!("Sleeping until {}", next);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
    .instrument(span)
    .await
}

async fn run_jobs(jobs: &[Box<dyn Job>], args: &JobArgs) -> (usize, usize) {
    let mut failed_jobs = 0;
    let mut completed_jobs = 0;

    for job in jobs {
        if let Err(e) = job.run(args).await {
            event!(Level::ERROR, job = job.name(), "Encountered an error during a background job: {:?}", e);
            failed_jobs += 1;
        } else {
            completed_jobs += 1;
        }
    }

    info!("Attempted all jobs in this run. Completed: {} - Failed: {}", &completed_jobs, &failed_jobs);

    (completed_jobs, failed_jobs)
}

/// The UTC date of the last recorded delivery. A ledger that can't be read counts as never delivered.
async fn last_delivery_date(ledger: &dyn DeliveryLedger) -> Option<NaiveDate> {
    match ledger.last_delivery().await {
        Ok(state) => state.map(|s| s.last_run_date()),
        Err(e) => {
            event!(Level::WARN, "Error reading the delivery state: {:?}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::anyhow;
    use chrono::TimeZone;
    use chrono_tz::Asia;
    use tokio::time::Instant;

    use super::*;
    use crate::content::{FactSource, FetchError, Payload};
    use crate::delivery::DeliveryError;

    struct CountingJob {
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    impl CountingJob {
        fn boxed(runs: &Arc<AtomicUsize>) -> Box<dyn Job> {
            Box::new(CountingJob { runs: runs.clone(), fail: false })
        }
    }

    /// A ledger whose reads and writes both fail.
    struct UnavailableLedger;

    #[async_trait]
    impl DeliveryLedger for UnavailableLedger {
        async fn last_delivery(&self) -> Result<Option<DeliveryState>> {
            Err(anyhow!("connection refused"))
        }

        async fn record_delivery(&self, _state: &DeliveryState) -> Result<()> {
            Err(anyhow!("connection refused"))
        }
    }

    /// 16:54 in Kuala Lumpur, 08:54 UTC.
    fn kl_schedule() -> Schedule {
        Schedule::new(Asia::Kuala_Lumpur, 16, 54).unwrap()
    }

    /// A clock starting at `start` that moves with tokio's (paused) time.
    fn clock_from(start: DateTime<Utc>) -> impl Fn() -> DateTime<Utc> {
        let origin = Instant::now();
        move || start + chrono::Duration::from_std(origin.elapsed()).unwrap()
    }

    #[async_trait]
    impl Job for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self, _args: &JobArgs) -> JobResult {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("boom"));
            }
            Ok(())
        }
    }

    struct NoFacts;

    #[async_trait]
    impl FactSource for NoFacts {
        async fn fetch_fact(&self) -> Result<String, FetchError> {
            Err(FetchError::EmptyFact)
        }
    }

    struct NullCourier;

    #[async_trait]
    impl Courier for NullCourier {
        async fn deliver(&self, _destination: &Destination, _payload: &Payload) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    async fn args() -> JobArgs {
        let registry = ChannelRegistry::load(Arc::new(MemoryStore::default())).await.unwrap();
        JobArgs::new(
            Arc::new(RwLock::new(registry)),
            Arc::new(ContentSources::new(Arc::new(NoFacts), "fallback")),
            Arc::new(NullCourier),
        )
    }

    #[tokio::test]
    async fn failing_job_does_not_stop_the_others() {
        let jobs: Vec<Box<dyn Job>> = vec![
            Box::new(CountingJob { runs: Arc::new(AtomicUsize::new(0)), fail: true }),
            Box::new(CountingJob { runs: Arc::new(AtomicUsize::new(0)), fail: false }),
        ];

        let (completed, failed) = run_jobs(&jobs, &args().await).await;

        assert_eq!((1, 1), (completed, failed));
    }

    #[tokio::test]
    async fn ledger_date_comes_from_last_run() {
        let store = MemoryStore::default();
        store.record_delivery(&DeliveryState::new(Utc.with_ymd_and_hms(2024, 5, 1, 8, 54, 3).unwrap())).await.unwrap();

        assert_eq!(NaiveDate::from_ymd_opt(2024, 5, 1), last_delivery_date(&store).await);
    }

    #[tokio::test]
    async fn empty_ledger_has_no_date() {
        assert_eq!(None, last_delivery_date(&MemoryStore::default()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_ready_before_firing() {
        let runs = Arc::new(AtomicUsize::new(0));
        let jobs = vec![CountingJob::boxed(&runs)];
        let ready = Arc::new(Notify::new());
        let clock = clock_from(Utc.with_ymd_and_hms(2024, 5, 1, 8, 54, 5).unwrap());

        let scheduler = tokio::time::timeout(
            Duration::from_secs(60),
            job_scheduler(kl_schedule(), &jobs, args().await, Arc::new(MemoryStore::default()), ready.clone(), clock),
        );
        let session = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            let runs_before_ready = runs.load(Ordering::SeqCst);
            ready.notify_one();
            tokio::time::sleep(Duration::from_secs(10)).await;
            runs_before_ready
        };

        let (scheduler_result, runs_before_ready) = tokio::join!(scheduler, session);

        assert!(scheduler_result.is_err(), "The scheduler should still be running");
        assert_eq!(0, runs_before_ready);
        assert_eq!(1, runs.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_per_day_when_ledger_is_down() {
        let runs = Arc::new(AtomicUsize::new(0));
        let jobs = vec![CountingJob::boxed(&runs)];
        let ready = Arc::new(Notify::new());
        ready.notify_one();
        let clock = clock_from(Utc.with_ymd_and_hms(2024, 5, 1, 8, 54, 0).unwrap());

        let first_day = tokio::time::timeout(
            Duration::from_secs(50),
            job_scheduler(kl_schedule(), &jobs, args().await, Arc::new(UnavailableLedger), ready.clone(), clock),
        )
        .await;

        assert!(first_day.is_err(), "The scheduler should still be running");
        assert_eq!(1, runs.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn fires_again_the_next_day() {
        let runs = Arc::new(AtomicUsize::new(0));
        let jobs = vec![CountingJob::boxed(&runs)];
        let ready = Arc::new(Notify::new());
        ready.notify_one();
        let clock = clock_from(Utc.with_ymd_and_hms(2024, 5, 1, 8, 54, 0).unwrap());

        let _ = tokio::time::timeout(
            Duration::from_secs(36 * 60 * 60),
            job_scheduler(kl_schedule(), &jobs, args().await, Arc::new(MemoryStore::default()), ready.clone(), clock),
        )
        .await;

        assert_eq!(2, runs.load(Ordering::SeqCst));
    }
}
