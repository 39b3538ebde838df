use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use focus_timer::clock::{Clock, ManualClock};
use focus_timer::db::Database;
use focus_timer::models::{ActivityStatus, NewActivity, Settings, TimerKind};
use focus_timer::service::TimerService;
use focus_timer::TimerError;

struct Fixture {
    _dir: TempDir,
    service: TimerService<Database, ManualClock>,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 12, 8, 30, 0).unwrap()
}

fn setup() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("timers.db")).unwrap();
    db.save_settings(1, &Settings::default(), t0()).unwrap();
    Fixture {
        _dir: dir,
        service: TimerService::new(db, ManualClock::new(t0())),
    }
}

fn new_activity(fx: &Fixture, kind: TimerKind) -> i64 {
    fx.service
        .create(kind, 1, NewActivity::titled("测试活动"))
        .unwrap()
        .id()
        .unwrap()
}

#[test]
fn test_start_pomodoro_postconditions() {
    let fx = setup();
    let id = new_activity(&fx, TimerKind::Pomodoro);

    fx.service.start_pomodoro(id, 1).unwrap();
    let stored = fx.service.get(TimerKind::Pomodoro, id, 1).unwrap();
    let p = stored.as_pomodoro().unwrap();
    assert_eq!(p.current_pomodoro_start, Some(t0()));
    assert_eq!(p.base.status, ActivityStatus::InProgress);
    assert!(!p.is_break);
    assert!(!p.is_long_break);
}

#[test]
fn test_complete_without_start_fails() {
    let fx = setup();
    let id = new_activity(&fx, TimerKind::Pomodoro);

    let err = fx.service.complete_pomodoro(id, 1).unwrap_err();
    assert!(matches!(err, TimerError::PreconditionFailed(_)));
    assert!(err.is_client_error());

    let stored = fx.service.get(TimerKind::Pomodoro, id, 1).unwrap();
    assert_eq!(stored.as_pomodoro().unwrap().pomodoro_count, 0);
    assert_eq!(stored.status(), ActivityStatus::Pending);
}

#[test]
fn test_start_then_complete_counts_once() {
    let fx = setup();
    let id = new_activity(&fx, TimerKind::Pomodoro);

    fx.service.start_pomodoro(id, 1).unwrap();
    fx.service.clock().advance(Duration::minutes(25));
    fx.service.complete_pomodoro(id, 1).unwrap();

    let stored = fx.service.get(TimerKind::Pomodoro, id, 1).unwrap();
    let p = stored.as_pomodoro().unwrap();
    assert_eq!(p.pomodoro_count, 1);
    assert!(p.current_pomodoro_start.is_none());
    assert!(p.current_break_start.is_none());
    assert_eq!(p.base.status, ActivityStatus::Completed);
}

#[test]
fn test_break_before_start_fails() {
    let fx = setup();
    let id = new_activity(&fx, TimerKind::Pomodoro);
    assert!(matches!(
        fx.service.start_break(id, 1, false),
        Err(TimerError::PreconditionFailed(_))
    ));
}

#[test]
fn test_remaining_time_after_ten_minutes() {
    let fx = setup();
    let id = new_activity(&fx, TimerKind::Pomodoro);

    fx.service.start_pomodoro(id, 1).unwrap();
    fx.service.clock().advance(Duration::minutes(10));
    assert_eq!(fx.service.remaining_time(id, 1).unwrap(), Some(Duration::minutes(15)));
}

#[test]
fn test_remaining_time_without_start_is_none() {
    let fx = setup();
    let id = new_activity(&fx, TimerKind::Pomodoro);
    assert_eq!(fx.service.remaining_time(id, 1).unwrap(), None);
}

#[test]
fn test_break_remaining_never_negative() {
    let fx = setup();
    let id = new_activity(&fx, TimerKind::Pomodoro);

    fx.service.start_pomodoro(id, 1).unwrap();
    fx.service.clock().advance(Duration::minutes(25));
    fx.service.start_break(id, 1, true).unwrap();

    fx.service.clock().advance(Duration::minutes(14));
    assert_eq!(fx.service.remaining_time(id, 1).unwrap(), Some(Duration::minutes(1)));

    fx.service.clock().advance(Duration::hours(3));
    assert_eq!(fx.service.remaining_time(id, 1).unwrap(), Some(Duration::zero()));
}

#[test]
fn test_sequential_starts_reset_marker() {
    let fx = setup();
    let id = new_activity(&fx, TimerKind::Pomodoro);

    fx.service.start_pomodoro(id, 1).unwrap();
    fx.service.clock().advance(Duration::minutes(3));
    let second = fx.service.clock().now();
    fx.service.start_pomodoro(id, 1).unwrap();

    let stored = fx.service.get(TimerKind::Pomodoro, id, 1).unwrap();
    assert_eq!(stored.as_pomodoro().unwrap().current_pomodoro_start, Some(second));
}

#[test]
fn test_stop_without_start_fails() {
    let fx = setup();
    let id = new_activity(&fx, TimerKind::Stopwatch);
    assert!(matches!(
        fx.service.stop_stopwatch(id, 1),
        Err(TimerError::PreconditionFailed(_))
    ));
    assert_eq!(fx.service.elapsed_time(id, 1).unwrap(), None);
}

#[test]
fn test_stopwatch_two_hours() {
    let fx = setup();
    let id = new_activity(&fx, TimerKind::Stopwatch);

    fx.service.start_stopwatch(id, 1).unwrap();
    fx.service.clock().advance(Duration::minutes(30));
    assert_eq!(fx.service.elapsed_time(id, 1).unwrap(), Some(Duration::minutes(30)));

    fx.service.clock().advance(Duration::minutes(90));
    fx.service.stop_stopwatch(id, 1).unwrap();

    let stored = fx.service.get(TimerKind::Stopwatch, id, 1).unwrap();
    let sw = stored.as_stopwatch().unwrap();
    assert_eq!(sw.duration, Some(Duration::hours(2)));
    assert_eq!(sw.end_time.unwrap() - sw.start_time.unwrap(), sw.duration.unwrap());
    assert_eq!(sw.base.status, ActivityStatus::Completed);

    // 停止后已用时间固定为 duration
    fx.service.clock().advance(Duration::hours(1));
    assert_eq!(fx.service.elapsed_time(id, 1).unwrap(), Some(Duration::hours(2)));
}

#[test]
fn test_cancel_is_terminal() {
    let fx = setup();
    let id = new_activity(&fx, TimerKind::Stopwatch);
    fx.service.start_stopwatch(id, 1).unwrap();

    let cancelled = fx.service.cancel(TimerKind::Stopwatch, id, 1).unwrap();
    assert_eq!(cancelled.status(), ActivityStatus::Cancelled);
    assert!(matches!(
        fx.service.cancel(TimerKind::Stopwatch, id, 1),
        Err(TimerError::PreconditionFailed(_))
    ));
}

#[test]
fn test_unknown_activity_is_not_found() {
    let fx = setup();
    assert!(matches!(
        fx.service.start_pomodoro(404, 1),
        Err(TimerError::NotFound(_))
    ));
    assert!(matches!(
        fx.service.get(TimerKind::Stopwatch, 404, 1),
        Err(TimerError::NotFound(_))
    ));
}
