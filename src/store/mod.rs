use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    ActivityFilter, FocusTotals, Reminder, ReminderFilter, Settings, TimerActivity, TimerKind,
};

/// 用户设置来源
pub trait SettingsProvider {
    /// 没有设置记录时返回 NotFound，不使用默认值
    fn get_settings(&self, user_id: i64) -> Result<Settings>;
}

/// 计时活动的持久化
pub trait ActivityStore {
    fn load(&self, kind: TimerKind, id: i64, user_id: i64) -> Result<Option<TimerActivity>>;

    /// 整条记录一次写入；新记录分配 id 和 created_at，每次保存刷新 updated_at
    fn save(&self, activity: &mut TimerActivity, now: DateTime<Utc>) -> Result<()>;

    /// 在一个事务内保存，任何一条失败则都不写入
    fn save_all(&self, activities: &mut [TimerActivity], now: DateTime<Utc>) -> Result<()>;

    fn list(&self, kind: TimerKind, user_id: i64, filter: &ActivityFilter) -> Result<Vec<TimerActivity>>;

    fn delete(&self, kind: TimerKind, id: i64, user_id: i64) -> Result<()>;

    /// 在一个事务内删除，返回删除条数
    fn bulk_delete(&self, kind: TimerKind, ids: &[i64], user_id: i64) -> Result<usize>;

    /// 任务下已完成活动的累计；任务不存在或不属于该用户时返回 None
    fn focus_totals(&self, task_id: i64, user_id: i64) -> Result<Option<FocusTotals>>;
}

/// 提醒的持久化
pub trait ReminderStore {
    fn load_reminder(&self, id: i64, user_id: i64) -> Result<Option<Reminder>>;

    /// 保存前检查关联的任务或活动属于同一用户
    fn save_reminder(&self, reminder: &mut Reminder, now: DateTime<Utc>) -> Result<()>;

    fn list_reminders(&self, user_id: i64, filter: &ReminderFilter) -> Result<Vec<Reminder>>;

    fn delete_reminder(&self, id: i64, user_id: i64) -> Result<()>;

    fn bulk_delete_reminders(&self, ids: &[i64], user_id: i64) -> Result<usize>;

    /// 启用且 remind_at >= now 的提醒，按时间升序
    fn upcoming_reminders(&self, user_id: i64, now: DateTime<Utc>, limit: usize) -> Result<Vec<Reminder>>;

    /// 启用、未读且 after < remind_at <= until 的提醒
    fn due_reminders(&self, user_id: i64, after: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<Reminder>>;
}
