//! 按活动种类分发的计时操作和保存前校验

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, TimerError};
use crate::models::{ActivityStatus, PomodoroActivity, Settings, StopwatchActivity, TimerActivity};

impl TimerActivity {
    fn pomodoro_mut(&mut self) -> Result<&mut PomodoroActivity> {
        match self {
            Self::Pomodoro(p) => Ok(p),
            Self::Stopwatch(_) => Err(TimerError::precondition(
                "operation requires a pomodoro activity",
            )),
        }
    }

    fn stopwatch_mut(&mut self) -> Result<&mut StopwatchActivity> {
        match self {
            Self::Stopwatch(s) => Ok(s),
            Self::Pomodoro(_) => Err(TimerError::precondition(
                "operation requires a stopwatch activity",
            )),
        }
    }

    pub fn start_pomodoro(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.pomodoro_mut()?.start_pomodoro(now);
        Ok(())
    }

    pub fn start_break(&mut self, is_long_break: bool, now: DateTime<Utc>) -> Result<()> {
        self.pomodoro_mut()?.start_break(is_long_break, now)
    }

    pub fn complete_pomodoro(&mut self) -> Result<()> {
        self.pomodoro_mut()?.complete_pomodoro()
    }

    pub fn start_stopwatch(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.stopwatch_mut()?.start_stopwatch(now);
        Ok(())
    }

    pub fn stop_stopwatch(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.stopwatch_mut()?.stop_stopwatch(now)
    }

    /// 番茄钟的剩余时间；正计时没有剩余时间
    pub fn remaining_time(&self, settings: &Settings, now: DateTime<Utc>) -> Option<Duration> {
        self.as_pomodoro()?.remaining_time(settings, now)
    }

    /// 正计时的已用时间；番茄钟返回 None
    pub fn elapsed_time(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.as_stopwatch()?.elapsed_time(now)
    }

    /// 取消未结束的活动
    pub fn cancel(&mut self) -> Result<()> {
        let status = self.status();
        if status.is_terminal() {
            return Err(TimerError::precondition(format!(
                "cannot cancel a {} activity",
                status.as_str().to_ascii_lowercase()
            )));
        }
        self.base_mut().status = ActivityStatus::Cancelled;
        Ok(())
    }

    /// 保存前的实体校验
    pub fn validate(&self) -> Result<()> {
        if self.base().title.trim().is_empty() {
            return Err(TimerError::validation("title is required"));
        }

        match self {
            Self::Pomodoro(p) => {
                if p.is_long_break && !p.is_break {
                    return Err(TimerError::validation("long break flag set outside a break"));
                }
            }
            Self::Stopwatch(s) => {
                if let (Some(start), Some(end)) = (s.start_time, s.end_time) {
                    if end < start {
                        return Err(TimerError::validation("end before start"));
                    }
                }
                if let (Some(duration), Some(start), Some(end)) = (s.duration, s.start_time, s.end_time) {
                    if duration != end - start {
                        return Err(TimerError::validation(
                            "duration does not match end_time - start_time",
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
