//! 守护进程的检查逻辑：任务提醒、用户提醒和番茄钟阶段结束通知。只读取记录，不修改活动状态。
//!
//! 每次检查覆盖 (上次检查, 本次检查] 这一段时间，检查之间的耗时或系统休眠都不会漏掉提醒；
//! 启动前已经到点的提醒和阶段不再通知。

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tokio::time::sleep;

use crate::clock::Clock;
use crate::db::Database;
use crate::error::TimerError;
use crate::models::{
    ActivityFilter, ActivityStatus, Reminder, Settings, Task, TaskStatus, TimerActivity, TimerKind,
};
use crate::notify::NotificationManager;
use crate::pomodoro::PomodoroPhase;
use crate::service::TimerService;
use crate::store::{ReminderStore, SettingsProvider};

/// 到点的番茄钟阶段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedPhase {
    pub activity_id: i64,
    pub title: String,
    pub phase: PomodoroPhase,
    pub started_at: DateTime<Utc>,
}

pub struct Watcher<C> {
    service: TimerService<Database, C>,
    notifier: NotificationManager,
    user_id: i64,
    poll_interval: Duration,
    /// 上次检查覆盖到的时间
    last_checked: DateTime<Utc>,
}

impl<C: Clock> Watcher<C> {
    pub fn new(
        service: TimerService<Database, C>,
        notifier: NotificationManager,
        user_id: i64,
        poll_interval: Duration,
    ) -> Self {
        let last_checked = service.clock().now();
        Self {
            service,
            notifier,
            user_id,
            poll_interval,
            last_checked,
        }
    }

    pub fn last_checked(&self) -> DateTime<Utc> {
        self.last_checked
    }

    /// 运行守护进程
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(user_id = self.user_id, "timer daemon started");
        let interval = self
            .poll_interval
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(30));

        loop {
            if let Err(e) = self.check() {
                tracing::error!("Error during check: {:#}", e);
            }
            sleep(interval).await;
        }
    }

    /// 执行一次检查，返回发出的通知数。查询失败时不推进检查点，下次重新覆盖这段时间
    pub fn check(&mut self) -> Result<usize> {
        let since = self.last_checked;
        let now = self.service.clock().now();

        let tasks = self.service.store().get_tasks(self.user_id)?;
        let reminders = self.service.store().due_reminders(self.user_id, since, now)?;
        let finished = self.finished_phases(since, now)?;
        self.last_checked = now;

        let mut sent = 0;
        for task in due_task_reminders(&tasks, since, now) {
            let body = format!(
                "截止时间: {}",
                task.due_date
                    .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "无".to_string())
            );
            match self.notifier.send_reminder(&task.title, &body) {
                Ok(()) => sent += 1,
                Err(e) => tracing::error!("Failed to send reminder: {}", e),
            }
        }

        for reminder in &reminders {
            tracing::info!(id = ?reminder.id, reminder_type = %reminder.reminder_type(), "reminder due");
            match self.notifier.send_reminder(&reminder.title, &reminder_body(reminder)) {
                Ok(()) => sent += 1,
                Err(e) => tracing::error!("Failed to send reminder: {}", e),
            }
        }

        for finished in finished {
            tracing::info!(
                id = finished.activity_id,
                phase = ?finished.phase,
                "pomodoro phase finished"
            );
            match self.notifier.send_phase_finished(&finished.title, finished.phase) {
                Ok(()) => sent += 1,
                Err(e) => tracing::error!("Failed to send pomodoro notification: {}", e),
            }
        }

        Ok(sent)
    }

    /// 阶段结束时间落在 (since, now] 内的进行中番茄钟
    pub fn finished_phases(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> Result<Vec<FinishedPhase>> {
        let settings = match self.service.store().get_settings(self.user_id) {
            Ok(settings) => settings,
            Err(TimerError::NotFound(_)) => {
                tracing::debug!(user_id = self.user_id, "no settings, skipping pomodoro check");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let filter = ActivityFilter {
            status: Some(ActivityStatus::InProgress),
            ..Default::default()
        };
        let activities = self.service.list(TimerKind::Pomodoro, self.user_id, &filter)?;
        Ok(collect_finished(&activities, &settings, since, now))
    }
}

/// 提醒时间落在 (since, now] 内的未完成任务
pub fn due_task_reminders(tasks: &[Task], since: DateTime<Utc>, now: DateTime<Utc>) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|task| task.status != TaskStatus::Completed)
        .filter(|task| match task.reminder_time {
            Some(reminder_time) => since < reminder_time && reminder_time <= now,
            None => false,
        })
        .collect()
}

fn reminder_body(reminder: &Reminder) -> String {
    match &reminder.description {
        Some(description) if !description.trim().is_empty() => description.clone(),
        _ => format!("提醒时间: {}", reminder.remind_at.format("%Y-%m-%d %H:%M")),
    }
}

fn collect_finished(
    activities: &[TimerActivity],
    settings: &Settings,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<FinishedPhase> {
    activities
        .iter()
        .filter_map(|activity| {
            let pomodoro = activity.as_pomodoro()?;
            let id = activity.id()?;
            let started_at = pomodoro.phase_started_at()?;
            let ends_at = started_at + pomodoro.phase_length(settings);
            if ends_at <= since || ends_at > now {
                return None;
            }
            Some(FinishedPhase {
                activity_id: id,
                title: pomodoro.base.title.clone(),
                phase: pomodoro.phase(),
                started_at,
            })
        })
        .collect()
}
