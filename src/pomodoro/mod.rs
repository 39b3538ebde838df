use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, TimerError};
use crate::models::{ActivityStatus, PomodoroActivity, Settings};

/// 番茄钟当前阶段，由存储的时间戳推导
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PomodoroPhase {
    Idle,
    Focus,
    ShortBreak,
    LongBreak,
}

impl PomodoroActivity {
    /// 开始一个新的番茄钟，重复调用会重置开始时间
    pub fn start_pomodoro(&mut self, now: DateTime<Utc>) {
        self.current_pomodoro_start = Some(now);
        self.current_break_start = None;
        self.is_break = false;
        self.is_long_break = false;
        self.base.status = ActivityStatus::InProgress;
    }

    /// 开始休息，专注开始时间保留到完成为止
    pub fn start_break(&mut self, is_long_break: bool, now: DateTime<Utc>) -> Result<()> {
        if self.current_pomodoro_start.is_none() {
            return Err(TimerError::precondition(
                "a pomodoro must be started before taking a break",
            ));
        }

        self.current_break_start = Some(now);
        self.is_break = true;
        self.is_long_break = is_long_break;
        Ok(())
    }

    /// 完成一个番茄钟
    pub fn complete_pomodoro(&mut self) -> Result<()> {
        if self.current_pomodoro_start.is_none() {
            return Err(TimerError::precondition("no active pomodoro"));
        }

        self.pomodoro_count += 1;
        self.current_pomodoro_start = None;
        self.current_break_start = None;
        self.is_break = false;
        self.is_long_break = false;
        self.base.status = ActivityStatus::Completed;
        Ok(())
    }

    pub fn phase(&self) -> PomodoroPhase {
        match (self.is_break, self.is_long_break) {
            (true, true) if self.current_break_start.is_some() => PomodoroPhase::LongBreak,
            (true, false) if self.current_break_start.is_some() => PomodoroPhase::ShortBreak,
            (false, _) if self.current_pomodoro_start.is_some() => PomodoroPhase::Focus,
            _ => PomodoroPhase::Idle,
        }
    }

    /// 当前阶段的开始时间
    pub fn phase_started_at(&self) -> Option<DateTime<Utc>> {
        if self.is_break {
            self.current_break_start
        } else {
            self.current_pomodoro_start
        }
    }

    /// 当前阶段的总时长
    pub fn phase_length(&self, settings: &Settings) -> Duration {
        if self.is_break {
            settings.break_length(self.is_long_break)
        } else {
            settings.focus_length()
        }
    }

    /// 剩余时间，不会小于 0；当前阶段没有开始时间时返回 None
    pub fn remaining_time(&self, settings: &Settings, now: DateTime<Utc>) -> Option<Duration> {
        let started = self.phase_started_at()?;
        let remaining = self.phase_length(settings) - (now - started);
        Some(remaining.max(Duration::zero()))
    }

    /// 获取进度百分比
    pub fn progress(&self, settings: &Settings, now: DateTime<Utc>) -> f32 {
        let Some(remaining) = self.remaining_time(settings, now) else {
            return 0.0;
        };
        let total = self.phase_length(settings).num_seconds();
        if total == 0 {
            return 0.0;
        }

        ((total - remaining.num_seconds()) as f32 / total as f32) * 100.0
    }

    /// 接下来的休息是否应为长休息
    pub fn suggest_long_break(&self, settings: &Settings) -> bool {
        settings.long_break_interval > 0
            && (self.pomodoro_count + 1) % settings.long_break_interval == 0
    }
}

/// 格式化时长为 mm:ss，超过一小时为 h:mm:ss
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
