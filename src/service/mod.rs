//! 请求层：按 (种类, id, 用户) 加载活动，执行一次状态转换并保存

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::error::{Result, TimerError};
use crate::models::{
    ActivityFilter, ActivityPatch, ActivityUpdate, NewActivity, NewReminder, Reminder,
    ReminderFilter, ReminderPatch, TimerActivity, TimerKind,
};
use crate::store::{ActivityStore, ReminderStore, SettingsProvider};

/// upcoming 返回的最大条数
pub const UPCOMING_LIMIT: usize = 10;

pub struct TimerService<S, C> {
    store: S,
    clock: C,
}

impl<S, C> TimerService<S, C>
where
    S: ActivityStore + SettingsProvider,
    C: Clock,
{
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ==================== CRUD ====================

    pub fn create(&self, kind: TimerKind, user_id: i64, input: NewActivity) -> Result<TimerActivity> {
        let now = self.clock.now();
        let mut activity = TimerActivity::new(kind, user_id, input, now);
        self.store.save(&mut activity, now)?;
        tracing::info!(%kind, id = ?activity.id(), user_id, "activity created");
        Ok(activity)
    }

    pub fn get(&self, kind: TimerKind, id: i64, user_id: i64) -> Result<TimerActivity> {
        self.store
            .load(kind, id, user_id)?
            .ok_or_else(|| TimerError::not_found(format!("{kind} activity {id}")))
    }

    pub fn list(&self, kind: TimerKind, user_id: i64, filter: &ActivityFilter) -> Result<Vec<TimerActivity>> {
        self.store.list(kind, user_id, filter)
    }

    pub fn update(&self, kind: TimerKind, id: i64, user_id: i64, patch: ActivityPatch) -> Result<TimerActivity> {
        self.transition(kind, id, user_id, |activity, _| {
            patch.apply(activity.base_mut());
            Ok(())
        })
    }

    /// 批量更新：任何一条不存在或校验失败时全部不写入
    pub fn bulk_update(
        &self,
        kind: TimerKind,
        user_id: i64,
        updates: Vec<ActivityUpdate>,
    ) -> Result<Vec<TimerActivity>> {
        if updates.is_empty() {
            return Err(TimerError::validation("no activity updates given"));
        }
        let mut seen = std::collections::HashSet::new();
        let mut activities = Vec::with_capacity(updates.len());
        for ActivityUpdate { id, patch } in updates {
            if !seen.insert(id) {
                return Err(TimerError::validation(format!("{kind} activity {id} listed twice")));
            }
            let mut activity = self.get(kind, id, user_id)?;
            patch.apply(activity.base_mut());
            activities.push(activity);
        }

        self.store.save_all(&mut activities, self.clock.now())?;
        tracing::info!(%kind, user_id, updated = activities.len(), "activities updated");
        Ok(activities)
    }

    /// 任务的累计专注时长：已完成番茄钟按用户专注时长折算，加上已完成的正计时
    pub fn focused_duration(&self, task_id: i64, user_id: i64) -> Result<Duration> {
        let totals = self
            .store
            .focus_totals(task_id, user_id)?
            .ok_or_else(|| TimerError::not_found(format!("task {task_id}")))?;
        let settings = self.store.get_settings(user_id)?;
        Ok(totals.focused_duration(&settings))
    }

    pub fn delete(&self, kind: TimerKind, id: i64, user_id: i64) -> Result<()> {
        self.store.delete(kind, id, user_id)?;
        tracing::info!(%kind, id, user_id, "activity deleted");
        Ok(())
    }

    pub fn bulk_delete(&self, kind: TimerKind, ids: &[i64], user_id: i64) -> Result<usize> {
        if ids.is_empty() {
            return Err(TimerError::validation("no activity ids given"));
        }
        let deleted = self.store.bulk_delete(kind, ids, user_id)?;
        tracing::info!(%kind, user_id, deleted, "activities deleted");
        Ok(deleted)
    }

    pub fn cancel(&self, kind: TimerKind, id: i64, user_id: i64) -> Result<TimerActivity> {
        self.transition(kind, id, user_id, |activity, _| activity.cancel())
    }

    // ==================== 番茄钟 ====================

    pub fn start_pomodoro(&self, id: i64, user_id: i64) -> Result<TimerActivity> {
        self.transition(TimerKind::Pomodoro, id, user_id, |activity, now| {
            activity.start_pomodoro(now)
        })
    }

    pub fn start_break(&self, id: i64, user_id: i64, is_long_break: bool) -> Result<TimerActivity> {
        self.transition(TimerKind::Pomodoro, id, user_id, |activity, now| {
            activity.start_break(is_long_break, now)
        })
    }

    /// 按 long_break_interval 决定长短休息
    pub fn start_scheduled_break(&self, id: i64, user_id: i64) -> Result<TimerActivity> {
        let settings = self.store.get_settings(user_id)?;
        self.transition(TimerKind::Pomodoro, id, user_id, |activity, now| {
            let is_long_break = activity
                .as_pomodoro()
                .map(|p| p.suggest_long_break(&settings))
                .unwrap_or(false);
            activity.start_break(is_long_break, now)
        })
    }

    /// 完成番茄钟；会增加计数，不要在结果不明时盲目重试
    pub fn complete_pomodoro(&self, id: i64, user_id: i64) -> Result<TimerActivity> {
        self.transition(TimerKind::Pomodoro, id, user_id, |activity, _| {
            activity.complete_pomodoro()
        })
    }

    pub fn remaining_time(&self, id: i64, user_id: i64) -> Result<Option<Duration>> {
        let activity = self.get(TimerKind::Pomodoro, id, user_id)?;
        let settings = self.store.get_settings(activity.base().user_id)?;
        Ok(activity.remaining_time(&settings, self.clock.now()))
    }

    // ==================== 正计时 ====================

    pub fn start_stopwatch(&self, id: i64, user_id: i64) -> Result<TimerActivity> {
        self.transition(TimerKind::Stopwatch, id, user_id, |activity, now| {
            activity.start_stopwatch(now)
        })
    }

    pub fn stop_stopwatch(&self, id: i64, user_id: i64) -> Result<TimerActivity> {
        self.transition(TimerKind::Stopwatch, id, user_id, |activity, now| {
            activity.stop_stopwatch(now)
        })
    }

    pub fn elapsed_time(&self, id: i64, user_id: i64) -> Result<Option<Duration>> {
        let activity = self.get(TimerKind::Stopwatch, id, user_id)?;
        Ok(activity.elapsed_time(self.clock.now()))
    }

    /// 加载、修改、保存；修改或保存失败时存储中的记录保持不变
    fn transition<F>(&self, kind: TimerKind, id: i64, user_id: i64, op: F) -> Result<TimerActivity>
    where
        F: FnOnce(&mut TimerActivity, DateTime<Utc>) -> Result<()>,
    {
        let mut activity = self.get(kind, id, user_id)?;
        let now = self.clock.now();
        if let Err(err) = op(&mut activity, now) {
            tracing::warn!(%kind, id, user_id, error = %err, "transition rejected");
            return Err(err);
        }
        self.store.save(&mut activity, now)?;
        tracing::info!(%kind, id, user_id, status = %activity.status(), "activity updated");
        Ok(activity)
    }
}

impl<S, C> TimerService<S, C>
where
    S: ReminderStore,
    C: Clock,
{
    pub fn create_reminder(&self, user_id: i64, input: NewReminder) -> Result<Reminder> {
        let now = self.clock.now();
        let mut reminder = Reminder::new(user_id, input, now);
        self.store.save_reminder(&mut reminder, now)?;
        tracing::info!(id = ?reminder.id, user_id, reminder_type = %reminder.reminder_type(), "reminder created");
        Ok(reminder)
    }

    pub fn get_reminder(&self, id: i64, user_id: i64) -> Result<Reminder> {
        self.store
            .load_reminder(id, user_id)?
            .ok_or_else(|| TimerError::not_found(format!("reminder {id}")))
    }

    pub fn list_reminders(&self, user_id: i64, filter: &ReminderFilter) -> Result<Vec<Reminder>> {
        self.store.list_reminders(user_id, filter)
    }

    pub fn update_reminder(&self, id: i64, user_id: i64, patch: ReminderPatch) -> Result<Reminder> {
        let mut reminder = self.get_reminder(id, user_id)?;
        patch.apply(&mut reminder);
        self.store.save_reminder(&mut reminder, self.clock.now())?;
        tracing::info!(id, user_id, "reminder updated");
        Ok(reminder)
    }

    /// 切换启用状态
    pub fn toggle_reminder_active(&self, id: i64, user_id: i64) -> Result<Reminder> {
        let mut reminder = self.get_reminder(id, user_id)?;
        reminder.is_active = !reminder.is_active;
        self.store.save_reminder(&mut reminder, self.clock.now())?;
        tracing::info!(id, user_id, is_active = reminder.is_active, "reminder toggled");
        Ok(reminder)
    }

    pub fn delete_reminder(&self, id: i64, user_id: i64) -> Result<()> {
        self.store.delete_reminder(id, user_id)?;
        tracing::info!(id, user_id, "reminder deleted");
        Ok(())
    }

    /// 一条都没删掉时返回 NotFound
    pub fn bulk_delete_reminders(&self, ids: &[i64], user_id: i64) -> Result<usize> {
        if ids.is_empty() {
            return Err(TimerError::validation("no reminder ids given"));
        }
        let deleted = self.store.bulk_delete_reminders(ids, user_id)?;
        if deleted == 0 {
            return Err(TimerError::not_found("reminders to delete"));
        }
        tracing::info!(user_id, deleted, "reminders deleted");
        Ok(deleted)
    }

    /// 接下来的启用提醒，最多 UPCOMING_LIMIT 条
    pub fn upcoming_reminders(&self, user_id: i64) -> Result<Vec<Reminder>> {
        self.store
            .upcoming_reminders(user_id, self.clock.now(), UPCOMING_LIMIT)
    }
}
