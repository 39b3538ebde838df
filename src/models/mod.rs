use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TimerError};

/// 任务优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low = 1,
    Medium = 2,
    High = 3,
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Todo,
    InProgress,
    Completed,
}

/// 任务数据模型，计时活动可以关联到任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Option<i64>,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub reminder_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(user_id: i64, title: String, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            user_id,
            title,
            description: None,
            priority: Priority::Medium,
            status: TaskStatus::Todo,
            due_date: None,
            reminder_time: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        if let Some(due) = self.due_date {
            due < now && self.status != TaskStatus::Completed
        } else {
            false
        }
    }

    /// 标记完成
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}

/// 活动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    Pending,
    InProgress,
    Completed,
    Paused,
    Cancelled,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Paused => "PAUSED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// 已完成或已取消
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityStatus {
    type Err = TimerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "PAUSED" => Ok(Self::Paused),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(TimerError::validation(format!("unknown status `{other}`"))),
        }
    }
}

/// 计时活动种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    Pomodoro,
    Stopwatch,
}

impl TimerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pomodoro => "pomodoro",
            Self::Stopwatch => "stopwatch",
        }
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 两种活动共有的字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityBase {
    pub id: Option<i64>,
    pub user_id: i64,
    pub task_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub status: ActivityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActivityBase {
    pub fn new(user_id: i64, input: NewActivity, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            user_id,
            task_id: input.task_id,
            title: input.title,
            description: input.description,
            status: ActivityStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 番茄钟活动
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PomodoroActivity {
    #[serde(flatten)]
    pub base: ActivityBase,
    /// 已完成的专注次数
    pub pomodoro_count: u32,
    pub current_pomodoro_start: Option<DateTime<Utc>>,
    pub current_break_start: Option<DateTime<Utc>>,
    pub is_break: bool,
    pub is_long_break: bool,
}

impl PomodoroActivity {
    pub fn new(user_id: i64, input: NewActivity, now: DateTime<Utc>) -> Self {
        Self {
            base: ActivityBase::new(user_id, input, now),
            pomodoro_count: 0,
            current_pomodoro_start: None,
            current_break_start: None,
            is_break: false,
            is_long_break: false,
        }
    }
}

/// 正计时活动
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopwatchActivity {
    #[serde(flatten)]
    pub base: ActivityBase,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(rename = "duration_ns", with = "duration_nanos")]
    pub duration: Option<Duration>,
}

impl StopwatchActivity {
    pub fn new(user_id: i64, input: NewActivity, now: DateTime<Utc>) -> Self {
        Self {
            base: ActivityBase::new(user_id, input, now),
            start_time: None,
            end_time: None,
            duration: None,
        }
    }
}

/// 计时活动：番茄钟或正计时
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimerActivity {
    Pomodoro(PomodoroActivity),
    Stopwatch(StopwatchActivity),
}

impl TimerActivity {
    pub fn new(kind: TimerKind, user_id: i64, input: NewActivity, now: DateTime<Utc>) -> Self {
        match kind {
            TimerKind::Pomodoro => Self::Pomodoro(PomodoroActivity::new(user_id, input, now)),
            TimerKind::Stopwatch => Self::Stopwatch(StopwatchActivity::new(user_id, input, now)),
        }
    }

    pub fn kind(&self) -> TimerKind {
        match self {
            Self::Pomodoro(_) => TimerKind::Pomodoro,
            Self::Stopwatch(_) => TimerKind::Stopwatch,
        }
    }

    pub fn base(&self) -> &ActivityBase {
        match self {
            Self::Pomodoro(p) => &p.base,
            Self::Stopwatch(s) => &s.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut ActivityBase {
        match self {
            Self::Pomodoro(p) => &mut p.base,
            Self::Stopwatch(s) => &mut s.base,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.base().id
    }

    pub fn status(&self) -> ActivityStatus {
        self.base().status
    }

    pub fn as_pomodoro(&self) -> Option<&PomodoroActivity> {
        match self {
            Self::Pomodoro(p) => Some(p),
            Self::Stopwatch(_) => None,
        }
    }

    pub fn as_stopwatch(&self) -> Option<&StopwatchActivity> {
        match self {
            Self::Stopwatch(s) => Some(s),
            Self::Pomodoro(_) => None,
        }
    }
}

/// 用户的番茄钟设置（分钟）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pomodoro_duration: u32,
    pub short_break_duration: u32,
    pub long_break_duration: u32,
    /// 多少个番茄钟后进行一次长休息
    pub long_break_interval: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pomodoro_duration: 25,
            short_break_duration: 5,
            long_break_duration: 15,
            long_break_interval: 4,
        }
    }
}

impl Settings {
    /// 所有时长必须大于 0
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("pomodoro_duration", self.pomodoro_duration),
            ("short_break_duration", self.short_break_duration),
            ("long_break_duration", self.long_break_duration),
            ("long_break_interval", self.long_break_interval),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(TimerError::validation(format!("{name} must be greater than 0")));
            }
        }
        Ok(())
    }

    pub fn focus_length(&self) -> Duration {
        Duration::minutes(i64::from(self.pomodoro_duration))
    }

    pub fn break_length(&self, is_long_break: bool) -> Duration {
        let minutes = if is_long_break {
            self.long_break_duration
        } else {
            self.short_break_duration
        };
        Duration::minutes(i64::from(minutes))
    }
}

/// 创建活动的输入
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    pub title: String,
    pub description: Option<String>,
    pub task_id: Option<i64>,
}

impl NewActivity {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// 部分更新，None 表示不修改
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub task_id: Option<Option<i64>>,
}

/// 列表筛选条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityFilter {
    pub task_id: Option<i64>,
    pub status: Option<ActivityStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// 标题或描述模糊匹配
    pub search: Option<String>,
}

impl ActivityPatch {
    pub fn apply(self, base: &mut ActivityBase) {
        if let Some(title) = self.title {
            base.title = title;
        }
        if let Some(description) = self.description {
            base.description = description;
        }
        if let Some(task_id) = self.task_id {
            base.task_id = task_id;
        }
    }
}

/// 批量更新中的一项
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityUpdate {
    pub id: i64,
    pub patch: ActivityPatch,
}

/// 任务下已完成活动的累计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusTotals {
    pub completed_pomodoros: u32,
    pub stopwatch_time: Duration,
}

impl FocusTotals {
    /// 番茄钟按用户的专注时长折算，再加上正计时
    pub fn focused_duration(&self, settings: &Settings) -> Duration {
        let pomodoro_minutes =
            i64::from(self.completed_pomodoros) * i64::from(settings.pomodoro_duration);
        Duration::minutes(pomodoro_minutes) + self.stopwatch_time
    }
}

// ==================== 提醒 ====================

/// 提醒类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderType {
    Task,
    Activity,
}

impl ReminderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "TASK",
            Self::Activity => "ACTIVITY",
        }
    }
}

impl fmt::Display for ReminderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderType {
    type Err = TimerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TASK" => Ok(Self::Task),
            "ACTIVITY" => Ok(Self::Activity),
            other => Err(TimerError::validation(format!("unknown reminder type `{other}`"))),
        }
    }
}

/// 提醒关联的对象：一个任务，或者一个计时活动
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReminderTarget {
    Task { task_id: i64 },
    Activity { kind: TimerKind, activity_id: i64 },
}

impl ReminderTarget {
    pub fn reminder_type(&self) -> ReminderType {
        match self {
            Self::Task { .. } => ReminderType::Task,
            Self::Activity { .. } => ReminderType::Activity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Option<i64>,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub target: ReminderTarget,
    pub remind_at: DateTime<Utc>,
    pub is_read: bool,
    /// 停用的提醒不会被通知，也不出现在 upcoming 中
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    pub fn new(user_id: i64, input: NewReminder, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            user_id,
            title: input.title,
            description: input.description,
            target: input.target,
            remind_at: input.remind_at,
            is_read: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn reminder_type(&self) -> ReminderType {
        self.target.reminder_type()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReminder {
    pub title: String,
    pub description: Option<String>,
    pub target: ReminderTarget,
    pub remind_at: DateTime<Utc>,
}

/// 提醒的部分更新，关联对象创建后不可改
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReminderPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub remind_at: Option<DateTime<Utc>>,
    pub is_read: Option<bool>,
    pub is_active: Option<bool>,
}

impl ReminderPatch {
    pub fn apply(self, reminder: &mut Reminder) {
        if let Some(title) = self.title {
            reminder.title = title;
        }
        if let Some(description) = self.description {
            reminder.description = description;
        }
        if let Some(remind_at) = self.remind_at {
            reminder.remind_at = remind_at;
        }
        if let Some(is_read) = self.is_read {
            reminder.is_read = is_read;
        }
        if let Some(is_active) = self.is_active {
            reminder.is_active = is_active;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReminderFilter {
    pub reminder_type: Option<ReminderType>,
    pub task_id: Option<i64>,
    pub activity: Option<(TimerKind, i64)>,
    pub remind_after: Option<DateTime<Utc>>,
    pub remind_before: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

mod duration_nanos {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value.and_then(|d| d.num_nanoseconds()) {
            Some(nanos) => s.serialize_some(&nanos),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<i64>::deserialize(d)?.map(Duration::nanoseconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("in_progress".parse::<ActivityStatus>().unwrap(), ActivityStatus::InProgress);
        assert_eq!("CANCELLED".parse::<ActivityStatus>().unwrap(), ActivityStatus::Cancelled);
        assert!(matches!(
            "running".parse::<ActivityStatus>(),
            Err(TimerError::Validation(_))
        ));
    }

    #[test]
    fn settings_reject_zero() {
        assert!(Settings::default().validate().is_ok());
        let bad = Settings {
            short_break_duration: 0,
            ..Settings::default()
        };
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("short_break_duration"));
    }

    #[test]
    fn activity_json_is_tagged_by_kind() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let mut sw = StopwatchActivity::new(1, NewActivity::titled("写报告"), now);
        sw.start_time = Some(now);
        sw.end_time = Some(now + Duration::minutes(3));
        sw.duration = Some(Duration::minutes(3));
        let activity = TimerActivity::Stopwatch(sw);

        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(json["kind"], "stopwatch");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["duration_ns"], 180_000_000_000i64);
        assert!(json.get("pomodoro_count").is_none());

        let back: TimerActivity = serde_json::from_value(json).unwrap();
        assert_eq!(back, activity);
    }

    #[test]
    fn focused_duration_uses_pomodoro_length() {
        let totals = FocusTotals {
            completed_pomodoros: 3,
            stopwatch_time: Duration::seconds(90),
        };
        let settings = Settings {
            pomodoro_duration: 50,
            ..Settings::default()
        };
        assert_eq!(
            totals.focused_duration(&settings),
            Duration::minutes(150) + Duration::seconds(90)
        );
    }

    #[test]
    fn reminder_target_decides_type() {
        let target = ReminderTarget::Activity {
            kind: TimerKind::Stopwatch,
            activity_id: 4,
        };
        assert_eq!(target.reminder_type(), ReminderType::Activity);
        assert_eq!("task".parse::<ReminderType>().unwrap(), ReminderType::Task);

        let json = serde_json::to_value(target).unwrap();
        assert_eq!(json["type"], "activity");
        assert_eq!(json["kind"], "stopwatch");
    }

    #[test]
    fn overdue_only_when_not_completed() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let mut task = Task::new(1, "发布".to_string(), now);
        task.due_date = Some(now - Duration::hours(1));
        assert!(task.is_overdue(now));
        task.complete(now);
        assert!(!task.is_overdue(now));
        assert_eq!(task.completed_at, Some(now));
    }
}
