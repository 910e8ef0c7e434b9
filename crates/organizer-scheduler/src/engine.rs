use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Local};
use organizer_core::types::TaskId;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::types::{Job, JobId, JobInfo, JobState};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Shared job table plus the logic that fires due jobs.
///
/// Cheap to clone: all clones see the same table. Every read and write goes
/// through one mutex, and due jobs are removed from the table under that
/// mutex before their actions run, so a job can be fired at most once and a
/// concurrent `cancel` either finds it (not fired) or does not (fired).
#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    jobs: Mutex<HashMap<TaskId, Job>>,
    clock: Arc<dyn Clock>,
}

/// Non-owning handle stored inside job actions, so a pending job never keeps
/// its own runner alive.
#[derive(Clone)]
pub(crate) struct WeakRunner {
    inner: Weak<RunnerInner>,
}

impl WeakRunner {
    pub(crate) fn upgrade(&self) -> Option<JobRunner> {
        self.inner.upgrade().map(|inner| JobRunner { inner })
    }
}

impl JobRunner {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                jobs: Mutex::new(HashMap::new()),
                clock,
            }),
        }
    }

    pub fn now(&self) -> DateTime<Local> {
        self.inner.clock.now()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    pub(crate) fn downgrade(&self) -> WeakRunner {
        WeakRunner {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<TaskId, Job>> {
        // A panicking action runs outside the lock, so poisoning can only
        // come from a bug in this module; the map itself is still usable.
        self.inner.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Track `job` under its tag.
    ///
    /// An existing job for the same tag is left in place and `job` is
    /// dropped: replacing a reminder is the caller's job (cancel first).
    /// Returns whether the job was inserted.
    pub fn register(&self, job: Job) -> bool {
        let mut jobs = self.jobs();
        match jobs.entry(job.tag) {
            Entry::Occupied(existing) => {
                warn!(
                    task_id = %job.tag,
                    existing_job = %existing.get().id,
                    rejected_job = %job.id,
                    "task already has a pending reminder; cancel it before re-scheduling"
                );
                false
            }
            Entry::Vacant(slot) => {
                debug!(task_id = %job.tag, job_id = %job.id, fire_at = %job.fire_at, "job registered");
                slot.insert(job);
                true
            }
        }
    }

    /// Drop the job tracked for `tag`, if any. Unknown tags are ignored.
    pub fn cancel(&self, tag: TaskId) -> Option<JobInfo> {
        let removed = self.jobs().remove(&tag);
        match removed {
            Some(mut job) => {
                job.state = JobState::Cancelled;
                info!(task_id = %tag, job_id = %job.id, "job cancelled");
                Some(job.info())
            }
            None => {
                debug!(task_id = %tag, "cancel: no pending job");
                None
            }
        }
    }

    /// Remove the job for `tag` only if it is still the registration `id`.
    ///
    /// Used by a firing job to clean up after itself without touching a
    /// replacement registered under the same tag in the meantime.
    pub fn deregister(&self, tag: TaskId, id: JobId) -> bool {
        let mut jobs = self.jobs();
        match jobs.get(&tag) {
            Some(job) if job.id == id => {
                jobs.remove(&tag);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, tag: TaskId) -> bool {
        self.jobs().contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs().is_empty()
    }

    /// Pending jobs ordered by fire time.
    pub fn snapshot(&self) -> Vec<JobInfo> {
        let mut infos: Vec<JobInfo> = self.jobs().values().map(Job::info).collect();
        infos.sort_by_key(|info| info.fire_at);
        infos
    }

    /// Remove and return every job due at `now`, marked `Fired`.
    pub fn take_due(&self, now: DateTime<Local>) -> Vec<Job> {
        let mut jobs = self.jobs();
        let due_tags: Vec<TaskId> = jobs
            .values()
            .filter(|job| job.is_due(now))
            .map(|job| job.tag)
            .collect();
        due_tags
            .into_iter()
            .filter_map(|tag| jobs.remove(&tag))
            .map(|mut job| {
                job.state = JobState::Fired;
                job
            })
            .collect()
    }

    /// Fire every due job on the calling thread. Returns how many fired.
    pub fn tick(&self) -> usize {
        let due = self.take_due(self.now());
        let fired = due.len();
        for job in due {
            fire(job);
        }
        fired
    }

    /// Poll loop. Wakes every `poll_interval` until `shutdown` broadcasts
    /// `true` or its sender is dropped.
    ///
    /// With `detached` set each due job runs on the blocking pool, so a slow
    /// callback delays neither the rest of its batch nor the next scan.
    /// Otherwise the batch runs on the loop itself; on a multi-thread runtime
    /// the worker is first handed over with `block_in_place`. On a
    /// current-thread runtime inline callbacks must not block.
    ///
    /// Intervals below 1 ms are raised to 1 ms.
    pub async fn run(
        self,
        poll_interval: Duration,
        detached: bool,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        let can_block_in_place =
            Handle::current().runtime_flavor() == RuntimeFlavor::MultiThread;
        info!(
            interval_ms = poll_interval.as_millis() as u64,
            detached, "reminder loop started"
        );

        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if detached {
                        for job in self.take_due(self.now()) {
                            tokio::task::spawn_blocking(move || fire(job));
                        }
                    } else if can_block_in_place {
                        tokio::task::block_in_place(|| self.tick());
                    } else {
                        self.tick();
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(pending = self.len(), "reminder loop shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Run a job's action, logging instead of propagating any failure.
fn fire(mut job: Job) {
    info!(task_id = %job.tag, job_id = %job.id, fire_at = %job.fire_at, "firing reminder");
    if let Err(e) = job.run_action() {
        error!(task_id = %job.tag, job_id = %job.id, "reminder action failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::SchedulerError;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(tag: i64, fire_at: DateTime<Local>, hits: &Arc<AtomicUsize>) -> Job {
        let hits = Arc::clone(hits);
        Job::new(
            TaskId(tag),
            fire_at,
            Box::new(move || -> crate::error::Result<()> {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
    }

    fn runner() -> (JobRunner, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (JobRunner::new(clock.clone()), clock)
    }

    #[test]
    fn tick_fires_due_job_once() {
        let (runner, clock) = runner();
        let hits = Arc::new(AtomicUsize::new(0));
        runner.register(counting_job(1, clock.now() + ChronoDuration::seconds(2), &hits));

        assert_eq!(runner.tick(), 0);
        clock.advance(ChronoDuration::seconds(2));
        assert_eq!(runner.tick(), 1);
        assert_eq!(runner.tick(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(runner.is_empty());
    }

    #[test]
    fn cancel_before_due_prevents_fire() {
        let (runner, clock) = runner();
        let hits = Arc::new(AtomicUsize::new(0));
        runner.register(counting_job(1, clock.now() + ChronoDuration::seconds(1), &hits));

        let info = runner.cancel(TaskId(1)).expect("job was pending");
        assert_eq!(info.state, JobState::Cancelled);

        clock.advance(ChronoDuration::seconds(5));
        assert_eq!(runner.tick(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancel_unknown_tag_is_silent() {
        let (runner, _) = runner();
        assert!(runner.cancel(TaskId(99)).is_none());
        assert!(runner.cancel(TaskId(99)).is_none());
    }

    #[test]
    fn register_does_not_replace_existing_tag() {
        let (runner, clock) = runner();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let at = clock.now() + ChronoDuration::seconds(1);

        assert!(runner.register(counting_job(5, at, &first)));
        assert!(!runner.register(counting_job(5, at, &second)));
        assert_eq!(runner.len(), 1);

        clock.advance(ChronoDuration::seconds(1));
        runner.tick();
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failing_and_panicking_actions_do_not_stop_the_batch() {
        let (runner, clock) = runner();
        let hits = Arc::new(AtomicUsize::new(0));
        let at = clock.now() + ChronoDuration::seconds(1);

        runner.register(Job::new(
            TaskId(1),
            at,
            Box::new(|| -> crate::error::Result<()> {
                Err(SchedulerError::ActionFailed("notifier down".into()))
            }),
        ));
        runner.register(Job::new(TaskId(2), at, Box::new(|| -> crate::error::Result<()> { panic!("bad callback") })));
        runner.register(counting_job(3, at, &hits));

        clock.advance(ChronoDuration::seconds(1));
        assert_eq!(runner.tick(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(runner.is_empty());
    }

    #[test]
    fn take_due_leaves_future_jobs() {
        let (runner, clock) = runner();
        let hits = Arc::new(AtomicUsize::new(0));
        let now = clock.now();
        runner.register(counting_job(1, now + ChronoDuration::seconds(1), &hits));
        runner.register(counting_job(2, now + ChronoDuration::seconds(10), &hits));

        let due = runner.take_due(now + ChronoDuration::seconds(5));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].tag, TaskId(1));
        assert_eq!(due[0].state, JobState::Fired);
        assert!(runner.contains(TaskId(2)));
    }

    #[test]
    fn deregister_ignores_replacement() {
        let (runner, clock) = runner();
        let hits = Arc::new(AtomicUsize::new(0));
        let at = clock.now() + ChronoDuration::seconds(1);
        let old = counting_job(4, at, &hits);
        let old_id = old.id;
        runner.register(old);
        runner.cancel(TaskId(4));

        let replacement = counting_job(4, at, &hits);
        let new_id = replacement.id;
        runner.register(replacement);

        assert!(!runner.deregister(TaskId(4), old_id));
        assert!(runner.contains(TaskId(4)));
        assert!(runner.deregister(TaskId(4), new_id));
        assert!(!runner.contains(TaskId(4)));
    }

    #[test]
    fn snapshot_is_ordered_by_fire_time() {
        let (runner, clock) = runner();
        let hits = Arc::new(AtomicUsize::new(0));
        let now = clock.now();
        runner.register(counting_job(1, now + ChronoDuration::seconds(30), &hits));
        runner.register(counting_job(2, now + ChronoDuration::seconds(10), &hits));

        let tags: Vec<TaskId> = runner.snapshot().into_iter().map(|i| i.tag).collect();
        assert_eq!(tags, vec![TaskId(2), TaskId(1)]);
    }

    #[tokio::test]
    async fn run_loop_fires_and_stops_on_signal() {
        let (runner, clock) = runner();
        let hits = Arc::new(AtomicUsize::new(0));
        runner.register(counting_job(1, clock.now() + ChronoDuration::seconds(2), &hits));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(runner.clone().run(Duration::from_millis(10), false, rx));

        clock.advance(ChronoDuration::seconds(3));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn zero_poll_interval_is_raised() {
        let (runner, clock) = runner();
        let hits = Arc::new(AtomicUsize::new(0));
        runner.register(counting_job(1, clock.now() + ChronoDuration::seconds(1), &hits));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(runner.clone().run(Duration::ZERO, false, rx));

        clock.advance(ChronoDuration::seconds(1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        tx.send(true).unwrap();
        handle.await.expect("loop must not panic");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn inline_blocking_action_does_not_starve_runtime() {
        let (runner, clock) = runner();
        let released = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&released);
        runner.register(Job::new(
            TaskId(1),
            clock.now() + ChronoDuration::seconds(1),
            Box::new(move || -> crate::error::Result<()> {
                std::thread::sleep(Duration::from_millis(300));
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }),
        ));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(runner.clone().run(Duration::from_millis(10), false, rx));
        clock.advance(ChronoDuration::seconds(1));

        // Timers keep running while the action blocks its worker.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!released.load(Ordering::SeqCst));
        assert!(runner.is_empty());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(released.load(Ordering::SeqCst));

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn run_loop_exits_when_sender_dropped() {
        let (runner, _) = runner();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(runner.run(Duration::from_millis(10), true, rx));
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop should exit")
            .unwrap();
    }
}
