// End-to-end reminder timing against the running poll loop.
// The clock is driven by hand; the loop polls every few milliseconds so the
// tests wait for a handful of real ticks instead of real seconds.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use organizer_core::config::SchedulerConfig;
use organizer_core::types::TaskId;
use organizer_scheduler::{Clock, ManualClock, ReminderScheduler};

const SETTLE: Duration = Duration::from_millis(150);

fn fast_config(detached_fire: bool) -> SchedulerConfig {
    SchedulerConfig {
        poll_interval_ms: 10,
        detached_fire,
    }
}

type Calls = Arc<Mutex<Vec<(String, String)>>>;

fn recorder(
    calls: &Calls,
    title: &str,
    message: &str,
) -> impl FnOnce() -> Result<(), String> + Send + 'static {
    let calls = Arc::clone(calls);
    let title = title.to_string();
    let message = message.to_string();
    move || {
        calls.lock().unwrap().push((title, message));
        Ok(())
    }
}

#[tokio::test]
async fn due_reminder_fires_once_and_past_one_never() {
    let clock = Arc::new(ManualClock::starting_now());
    let scheduler = ReminderScheduler::start_with_clock(&fast_config(true), clock.clone());
    let calls: Calls = Arc::default();
    let past: Calls = Arc::default();

    scheduler.schedule_task(
        TaskId(42),
        clock.now() + ChronoDuration::seconds(2),
        recorder(&calls, "Reminder", "task 42"),
    );
    clock.advance(ChronoDuration::seconds(3));
    tokio::time::sleep(SETTLE).await;

    assert_eq!(
        *calls.lock().unwrap(),
        vec![("Reminder".to_string(), "task 42".to_string())]
    );
    assert!(!scheduler.is_scheduled(TaskId(42)));

    scheduler.schedule_task(
        TaskId(43),
        clock.now() - ChronoDuration::seconds(1),
        recorder(&past, "Reminder", "task 43"),
    );
    clock.advance(ChronoDuration::seconds(3));
    tokio::time::sleep(SETTLE).await;

    assert!(past.lock().unwrap().is_empty());
    assert_eq!(calls.lock().unwrap().len(), 1);

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn cleared_reminder_never_fires() {
    let clock = Arc::new(ManualClock::starting_now());
    let scheduler = ReminderScheduler::start_with_clock(&fast_config(false), clock.clone());
    let calls: Calls = Arc::default();

    scheduler.schedule_task(
        TaskId(7),
        clock.now() + ChronoDuration::seconds(10),
        recorder(&calls, "Reminder", "task 7"),
    );
    scheduler.clear_scheduled_task(TaskId(7));

    clock.advance(ChronoDuration::seconds(12));
    tokio::time::sleep(SETTLE).await;

    assert!(calls.lock().unwrap().is_empty());
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn edit_replaces_reminder() {
    let clock = Arc::new(ManualClock::starting_now());
    let scheduler = ReminderScheduler::start_with_clock(&fast_config(true), clock.clone());
    let calls: Calls = Arc::default();

    scheduler.schedule_task(
        TaskId(3),
        clock.now() + ChronoDuration::seconds(5),
        recorder(&calls, "Reminder", "old name"),
    );
    scheduler.clear_scheduled_task(TaskId(3));
    scheduler.schedule_task(
        TaskId(3),
        clock.now() + ChronoDuration::seconds(5),
        recorder(&calls, "Reminder", "new name"),
    );

    clock.advance(ChronoDuration::seconds(6));
    tokio::time::sleep(SETTLE).await;

    assert_eq!(
        *calls.lock().unwrap(),
        vec![("Reminder".to_string(), "new name".to_string())]
    );
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn failing_callback_does_not_stop_the_loop() {
    let clock = Arc::new(ManualClock::starting_now());
    let scheduler = ReminderScheduler::start_with_clock(&fast_config(false), clock.clone());
    let calls: Calls = Arc::default();

    scheduler.schedule_task(
        TaskId(1),
        clock.now() + ChronoDuration::seconds(1),
        || Err::<(), _>("notification daemon unavailable"),
    );
    clock.advance(ChronoDuration::seconds(2));
    tokio::time::sleep(SETTLE).await;

    scheduler.schedule_task(
        TaskId(2),
        clock.now() + ChronoDuration::seconds(1),
        recorder(&calls, "Reminder", "still alive"),
    );
    clock.advance(ChronoDuration::seconds(2));
    tokio::time::sleep(SETTLE).await;

    assert_eq!(calls.lock().unwrap().len(), 1);
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn slow_callback_does_not_hold_up_batch() {
    let clock = Arc::new(ManualClock::starting_now());
    let scheduler = ReminderScheduler::start_with_clock(&fast_config(true), clock.clone());
    let calls: Calls = Arc::default();
    let at = clock.now() + ChronoDuration::seconds(1);

    scheduler.schedule_task(TaskId(1), at, || {
        thread::sleep(Duration::from_millis(600));
        Ok::<(), String>(())
    });
    scheduler.schedule_task(TaskId(2), at, recorder(&calls, "Reminder", "fast"));

    clock.advance(ChronoDuration::seconds(1));
    tokio::time::sleep(SETTLE).await;

    assert_eq!(calls.lock().unwrap().len(), 1);
    scheduler.shutdown().await.unwrap();
}

#[test]
fn concurrent_schedule_and_clear_never_double_fires() {
    let clock = Arc::new(ManualClock::starting_now());
    let scheduler = Arc::new(ReminderScheduler::new(clock.clone()));
    let fired = Arc::new(Mutex::new(Vec::<i64>::new()));

    let ticker = {
        let scheduler = Arc::clone(&scheduler);
        thread::spawn(move || {
            for _ in 0..500 {
                scheduler.tick();
            }
        })
    };

    let workers: Vec<_> = (0..4)
        .map(|w| {
            let scheduler = Arc::clone(&scheduler);
            let clock = Arc::clone(&clock);
            let fired = Arc::clone(&fired);
            thread::spawn(move || {
                for i in 0..100 {
                    let id = w * 1_000 + i;
                    let fired = Arc::clone(&fired);
                    scheduler.schedule_task(
                        TaskId(id),
                        clock.now() + ChronoDuration::milliseconds(1),
                        move || {
                            fired.lock().unwrap().push(id);
                            Ok::<(), String>(())
                        },
                    );
                    clock.advance(ChronoDuration::milliseconds(1));
                    if i % 2 == 0 {
                        scheduler.clear_scheduled_task(TaskId(id));
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    ticker.join().unwrap();
    clock.advance(ChronoDuration::seconds(1));
    scheduler.tick();

    let mut fired = fired.lock().unwrap().clone();
    let total = fired.len();
    fired.sort_unstable();
    fired.dedup();
    assert_eq!(fired.len(), total, "a reminder fired more than once");
    assert!(scheduler.pending().is_empty());
}
