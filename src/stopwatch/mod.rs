use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, TimerError};
use crate::models::{ActivityStatus, StopwatchActivity};

impl StopwatchActivity {
    /// 开始正计时，重复调用会重新开始
    pub fn start_stopwatch(&mut self, now: DateTime<Utc>) {
        self.start_time = Some(now);
        self.end_time = None;
        self.duration = None;
        self.base.status = ActivityStatus::InProgress;
    }

    /// 停止正计时，duration 精确等于 end_time - start_time
    pub fn stop_stopwatch(&mut self, now: DateTime<Utc>) -> Result<()> {
        let Some(start) = self.start_time else {
            return Err(TimerError::precondition("no running timer"));
        };
        if now < start {
            return Err(TimerError::validation("end before start"));
        }

        self.end_time = Some(now);
        self.duration = Some(now - start);
        self.base.status = ActivityStatus::Completed;
        Ok(())
    }

    /// 已用时间；停止后返回固定的时长
    pub fn elapsed_time(&self, now: DateTime<Utc>) -> Option<Duration> {
        let start = self.start_time?;
        match self.end_time {
            Some(end) => Some(end - start),
            None => Some(now - start),
        }
    }

    pub fn is_running(&self) -> bool {
        self.start_time.is_some() && self.end_time.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewActivity;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn stopwatch() -> StopwatchActivity {
        StopwatchActivity::new(1, NewActivity::titled("代码评审"), t0())
    }

    #[test]
    fn stop_without_start_fails() {
        let mut sw = stopwatch();
        let err = sw.stop_stopwatch(t0()).unwrap_err();
        assert!(matches!(err, TimerError::PreconditionFailed(_)));
        assert_eq!(sw.base.status, ActivityStatus::Pending);
        assert!(sw.end_time.is_none());
    }

    #[test]
    fn two_hour_session() {
        let mut sw = stopwatch();
        sw.start_stopwatch(t0());
        assert!(sw.is_running());
        assert_eq!(sw.base.status, ActivityStatus::InProgress);

        let t1 = t0() + Duration::hours(2);
        sw.stop_stopwatch(t1).unwrap();
        assert_eq!(sw.duration, Some(Duration::hours(2)));
        assert_eq!(sw.end_time.unwrap() - sw.start_time.unwrap(), Duration::hours(2));
        assert_eq!(sw.base.status, ActivityStatus::Completed);
        assert!(!sw.is_running());
    }

    #[test]
    fn duration_is_exact_to_the_nanosecond() {
        let mut sw = stopwatch();
        let start = t0() + Duration::nanoseconds(123_456_789);
        sw.start_stopwatch(start);
        let end = start + Duration::nanoseconds(987_654_321_001);
        sw.stop_stopwatch(end).unwrap();
        assert_eq!(sw.duration, Some(end - start));
    }

    #[test]
    fn elapsed_while_running_and_after_stop() {
        let mut sw = stopwatch();
        assert_eq!(sw.elapsed_time(t0()), None);

        sw.start_stopwatch(t0());
        assert_eq!(sw.elapsed_time(t0() + Duration::minutes(4)), Some(Duration::minutes(4)));

        sw.stop_stopwatch(t0() + Duration::minutes(5)).unwrap();
        assert_eq!(sw.elapsed_time(t0() + Duration::hours(3)), Some(Duration::minutes(5)));
    }

    #[test]
    fn restart_clears_previous_result() {
        let mut sw = stopwatch();
        sw.start_stopwatch(t0());
        sw.stop_stopwatch(t0() + Duration::minutes(1)).unwrap();

        let again = t0() + Duration::minutes(10);
        sw.start_stopwatch(again);
        assert_eq!(sw.start_time, Some(again));
        assert!(sw.end_time.is_none());
        assert!(sw.duration.is_none());
        assert_eq!(sw.base.status, ActivityStatus::InProgress);
    }

    #[test]
    fn stop_before_start_is_rejected() {
        let mut sw = stopwatch();
        sw.start_stopwatch(t0());
        let err = sw.stop_stopwatch(t0() - Duration::seconds(1)).unwrap_err();
        assert!(matches!(err, TimerError::Validation(_)));
        assert!(sw.end_time.is_none());
    }
}
