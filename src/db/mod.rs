use chrono::{DateTime, Duration, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::error::{Result, TimerError};
use crate::models::{
    ActivityBase, ActivityFilter, ActivityStatus, FocusTotals, PomodoroActivity, Priority,
    Reminder, ReminderFilter, ReminderTarget, ReminderType, Settings, StopwatchActivity, Task,
    TaskStatus, TimerActivity, TimerKind,
};
use crate::store::{ActivityStore, ReminderStore, SettingsProvider};

pub struct Database {
    conn: Connection,
}

impl Database {
    /// 打开或创建数据库
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// 内存数据库
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// 初始化数据库schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                priority INTEGER NOT NULL,
                status INTEGER NOT NULL,
                due_date TEXT,
                reminder_time TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS settings (
                user_id INTEGER PRIMARY KEY,
                pomodoro_duration INTEGER NOT NULL,
                short_break_duration INTEGER NOT NULL,
                long_break_duration INTEGER NOT NULL,
                long_break_interval INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pomodoro_activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                task_id INTEGER,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL,
                pomodoro_count INTEGER NOT NULL DEFAULT 0,
                current_pomodoro_start TEXT,
                current_break_start TEXT,
                is_break INTEGER NOT NULL DEFAULT 0,
                is_long_break INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY(task_id) REFERENCES tasks(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS stopwatch_activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                task_id INTEGER,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL,
                start_time TEXT,
                end_time TEXT,
                duration_ns INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY(task_id) REFERENCES tasks(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS reminders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                reminder_type TEXT NOT NULL,
                task_id INTEGER,
                pomodoro_activity_id INTEGER,
                stopwatch_activity_id INTEGER,
                remind_at TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY(task_id) REFERENCES tasks(id) ON DELETE CASCADE,
                FOREIGN KEY(pomodoro_activity_id) REFERENCES pomodoro_activities(id) ON DELETE CASCADE,
                FOREIGN KEY(stopwatch_activity_id) REFERENCES stopwatch_activities(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_due_date ON tasks(due_date);
            CREATE INDEX IF NOT EXISTS idx_pomodoro_user_status ON pomodoro_activities(user_id, status);
            CREATE INDEX IF NOT EXISTS idx_stopwatch_user_status ON stopwatch_activities(user_id, status);
            CREATE INDEX IF NOT EXISTS idx_reminders_user_remind_at ON reminders(user_id, remind_at);
            "#,
        )?;
        Ok(())
    }

    // ==================== Task CRUD ====================

    /// 创建任务
    pub fn create_task(&self, task: &Task) -> Result<i64> {
        if task.title.trim().is_empty() {
            return Err(TimerError::validation("title is required"));
        }
        self.conn.execute(
            "INSERT INTO tasks (user_id, title, description, priority, status, due_date,
                               reminder_time, created_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                task.user_id,
                task.title,
                task.description,
                task.priority as i32,
                task.status as i32,
                task.due_date,
                task.reminder_time,
                task.created_at,
                task.updated_at,
                task.completed_at,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(task_id = id, user_id = task.user_id, "task created");
        Ok(id)
    }

    /// 获取用户的所有任务
    pub fn get_tasks(&self, user_id: i64) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, title, description, priority, status, due_date, reminder_time,
                    created_at, updated_at, completed_at
             FROM tasks
             WHERE user_id = ?1
             ORDER BY priority DESC, due_date ASC",
        )?;

        let tasks = stmt
            .query_map(params![user_id], task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(tasks)
    }

    pub fn get_task(&self, id: i64, user_id: i64) -> Result<Option<Task>> {
        let task = self
            .conn
            .query_row(
                "SELECT id, user_id, title, description, priority, status, due_date, reminder_time,
                        created_at, updated_at, completed_at
                 FROM tasks
                 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    fn task_exists(&self, id: i64, user_id: i64) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM tasks WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn activity_exists(&self, kind: TimerKind, id: i64, user_id: i64) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?1 AND user_id = ?2", table_name(kind));
        let found: Option<i64> = self
            .conn
            .query_row(&sql, params![id, user_id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// 更新任务
    pub fn update_task(&self, task: &Task) -> Result<()> {
        let id = task
            .id
            .ok_or_else(|| TimerError::validation("task has no id"))?;
        let changed = self.conn.execute(
            "UPDATE tasks SET title = ?1, description = ?2, priority = ?3, status = ?4,
                            due_date = ?5, reminder_time = ?6, updated_at = ?7,
                            completed_at = ?8
             WHERE id = ?9 AND user_id = ?10",
            params![
                task.title,
                task.description,
                task.priority as i32,
                task.status as i32,
                task.due_date,
                task.reminder_time,
                task.updated_at,
                task.completed_at,
                id,
                task.user_id,
            ],
        )?;
        if changed == 0 {
            return Err(TimerError::not_found(format!("task {id}")));
        }
        Ok(())
    }

    /// 删除任务，关联的活动一并删除
    pub fn delete_task(&self, id: i64, user_id: i64) -> Result<()> {
        let changed = self.conn.execute(
            "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if changed == 0 {
            return Err(TimerError::not_found(format!("task {id}")));
        }
        tracing::debug!(task_id = id, user_id, "task deleted");
        Ok(())
    }

    // ==================== Settings ====================

    pub fn find_settings(&self, user_id: i64) -> Result<Option<Settings>> {
        let settings = self
            .conn
            .query_row(
                "SELECT pomodoro_duration, short_break_duration, long_break_duration, long_break_interval
                 FROM settings
                 WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(Settings {
                        pomodoro_duration: row.get(0)?,
                        short_break_duration: row.get(1)?,
                        long_break_duration: row.get(2)?,
                        long_break_interval: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(settings)
    }

    /// 保存用户设置（不存在则插入）
    pub fn save_settings(&self, user_id: i64, settings: &Settings, now: DateTime<Utc>) -> Result<()> {
        settings.validate()?;
        self.conn.execute(
            "INSERT INTO settings (user_id, pomodoro_duration, short_break_duration,
                                   long_break_duration, long_break_interval, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                pomodoro_duration = excluded.pomodoro_duration,
                short_break_duration = excluded.short_break_duration,
                long_break_duration = excluded.long_break_duration,
                long_break_interval = excluded.long_break_interval,
                updated_at = excluded.updated_at",
            params![
                user_id,
                settings.pomodoro_duration,
                settings.short_break_duration,
                settings.long_break_duration,
                settings.long_break_interval,
                now,
            ],
        )?;
        tracing::debug!(user_id, "settings saved");
        Ok(())
    }

    /// 用户没有设置时写入默认值，返回当前生效的设置
    pub fn init_settings(&self, user_id: i64, defaults: &Settings, now: DateTime<Utc>) -> Result<Settings> {
        if let Some(existing) = self.find_settings(user_id)? {
            return Ok(existing);
        }
        self.save_settings(user_id, defaults, now)?;
        Ok(*defaults)
    }

    // ==================== Timer activities ====================

    fn insert_activity(&self, activity: &TimerActivity) -> Result<i64> {
        match activity {
            TimerActivity::Pomodoro(p) => {
                self.conn.execute(
                    "INSERT INTO pomodoro_activities (user_id, task_id, title, description, status,
                        pomodoro_count, current_pomodoro_start, current_break_start, is_break,
                        is_long_break, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        p.base.user_id,
                        p.base.task_id,
                        p.base.title,
                        p.base.description,
                        p.base.status,
                        p.pomodoro_count,
                        p.current_pomodoro_start,
                        p.current_break_start,
                        p.is_break,
                        p.is_long_break,
                        p.base.created_at,
                        p.base.updated_at,
                    ],
                )?;
            }
            TimerActivity::Stopwatch(s) => {
                self.conn.execute(
                    "INSERT INTO stopwatch_activities (user_id, task_id, title, description, status,
                        start_time, end_time, duration_ns, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        s.base.user_id,
                        s.base.task_id,
                        s.base.title,
                        s.base.description,
                        s.base.status,
                        s.start_time,
                        s.end_time,
                        duration_to_nanos(s.duration)?,
                        s.base.created_at,
                        s.base.updated_at,
                    ],
                )?;
            }
        }
        Ok(self.conn.last_insert_rowid())
    }

    fn update_activity(&self, id: i64, activity: &TimerActivity) -> Result<usize> {
        let changed = match activity {
            TimerActivity::Pomodoro(p) => self.conn.execute(
                "UPDATE pomodoro_activities SET task_id = ?1, title = ?2, description = ?3,
                    status = ?4, pomodoro_count = ?5, current_pomodoro_start = ?6,
                    current_break_start = ?7, is_break = ?8, is_long_break = ?9, updated_at = ?10
                 WHERE id = ?11 AND user_id = ?12",
                params![
                    p.base.task_id,
                    p.base.title,
                    p.base.description,
                    p.base.status,
                    p.pomodoro_count,
                    p.current_pomodoro_start,
                    p.current_break_start,
                    p.is_break,
                    p.is_long_break,
                    p.base.updated_at,
                    id,
                    p.base.user_id,
                ],
            )?,
            TimerActivity::Stopwatch(s) => self.conn.execute(
                "UPDATE stopwatch_activities SET task_id = ?1, title = ?2, description = ?3,
                    status = ?4, start_time = ?5, end_time = ?6, duration_ns = ?7, updated_at = ?8
                 WHERE id = ?9 AND user_id = ?10",
                params![
                    s.base.task_id,
                    s.base.title,
                    s.base.description,
                    s.base.status,
                    s.start_time,
                    s.end_time,
                    duration_to_nanos(s.duration)?,
                    s.base.updated_at,
                    id,
                    s.base.user_id,
                ],
            )?,
        };
        Ok(changed)
    }
}

impl SettingsProvider for Database {
    fn get_settings(&self, user_id: i64) -> Result<Settings> {
        self.find_settings(user_id)?
            .ok_or_else(|| TimerError::not_found(format!("settings for user {user_id}")))
    }
}

impl ActivityStore for Database {
    fn load(&self, kind: TimerKind, id: i64, user_id: i64) -> Result<Option<TimerActivity>> {
        let sql = format!("{} WHERE id = ?1 AND user_id = ?2", select_sql(kind));
        let activity = self
            .conn
            .query_row(&sql, params![id, user_id], |row| activity_from_row(kind, row))
            .optional()?;
        Ok(activity)
    }

    fn save(&self, activity: &mut TimerActivity, now: DateTime<Utc>) -> Result<()> {
        activity.validate()?;
        let base = activity.base();
        if let Some(task_id) = base.task_id {
            if !self.task_exists(task_id, base.user_id)? {
                return Err(TimerError::validation(format!(
                    "task {task_id} does not exist or belongs to another user"
                )));
            }
        }

        match activity.id() {
            None => {
                let base = activity.base_mut();
                base.created_at = now;
                base.updated_at = now;
                let id = self.insert_activity(activity)?;
                activity.base_mut().id = Some(id);
                tracing::debug!(kind = %activity.kind(), id, "activity inserted");
            }
            Some(id) => {
                let previous = activity.base().updated_at;
                activity.base_mut().updated_at = now;
                let changed = self.update_activity(id, activity)?;
                if changed == 0 {
                    activity.base_mut().updated_at = previous;
                    return Err(TimerError::not_found(format!("{} activity {id}", activity.kind())));
                }
                tracing::debug!(kind = %activity.kind(), id, "activity updated");
            }
        }
        Ok(())
    }

    fn list(&self, kind: TimerKind, user_id: i64, filter: &ActivityFilter) -> Result<Vec<TimerActivity>> {
        let mut sql = format!("{} WHERE user_id = ?", select_sql(kind));
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(user_id)];

        if let Some(task_id) = filter.task_id {
            sql.push_str(" AND task_id = ?");
            args.push(Box::new(task_id));
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            args.push(Box::new(status));
        }
        if let Some(after) = filter.created_after {
            sql.push_str(" AND created_at >= ?");
            args.push(Box::new(after));
        }
        if let Some(before) = filter.created_before {
            sql.push_str(" AND created_at <= ?");
            args.push(Box::new(before));
        }
        push_search(&mut sql, &mut args, filter.search.as_deref());
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let activities = stmt
            .query_map(params_from_iter(args.iter()), |row| activity_from_row(kind, row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(activities)
    }

    fn delete(&self, kind: TimerKind, id: i64, user_id: i64) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?1 AND user_id = ?2", table_name(kind));
        let changed = self.conn.execute(&sql, params![id, user_id])?;
        if changed == 0 {
            return Err(TimerError::not_found(format!("{kind} activity {id}")));
        }
        tracing::debug!(%kind, id, user_id, "activity deleted");
        Ok(())
    }

    fn bulk_delete(&self, kind: TimerKind, ids: &[i64], user_id: i64) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE id = ?1 AND user_id = ?2", table_name(kind));
        let tx = self.conn.unchecked_transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for id in ids {
                deleted += stmt.execute(params![id, user_id])?;
            }
        }
        tx.commit()?;
        tracing::debug!(%kind, user_id, requested = ids.len(), deleted, "bulk delete");
        Ok(deleted)
    }

    fn save_all(&self, activities: &mut [TimerActivity], now: DateTime<Utc>) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for activity in activities.iter_mut() {
            self.save(activity, now)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn focus_totals(&self, task_id: i64, user_id: i64) -> Result<Option<FocusTotals>> {
        if !self.task_exists(task_id, user_id)? {
            return Ok(None);
        }
        let completed_pomodoros: u32 = self.conn.query_row(
            "SELECT COALESCE(SUM(pomodoro_count), 0) FROM pomodoro_activities
             WHERE task_id = ?1 AND user_id = ?2 AND status = ?3",
            params![task_id, user_id, ActivityStatus::Completed],
            |row| row.get(0),
        )?;
        let stopwatch_ns: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(duration_ns), 0) FROM stopwatch_activities
             WHERE task_id = ?1 AND user_id = ?2 AND status = ?3",
            params![task_id, user_id, ActivityStatus::Completed],
            |row| row.get(0),
        )?;
        Ok(Some(FocusTotals {
            completed_pomodoros,
            stopwatch_time: Duration::nanoseconds(stopwatch_ns),
        }))
    }
}

const REMINDER_SELECT: &str = "SELECT id, user_id, title, description, reminder_type, task_id,
        pomodoro_activity_id, stopwatch_activity_id, remind_at, is_read, is_active,
        created_at, updated_at
 FROM reminders";

impl ReminderStore for Database {
    fn load_reminder(&self, id: i64, user_id: i64) -> Result<Option<Reminder>> {
        let sql = format!("{REMINDER_SELECT} WHERE id = ?1 AND user_id = ?2");
        let reminder = self
            .conn
            .query_row(&sql, params![id, user_id], reminder_from_row)
            .optional()?;
        Ok(reminder)
    }

    fn save_reminder(&self, reminder: &mut Reminder, now: DateTime<Utc>) -> Result<()> {
        if reminder.title.trim().is_empty() {
            return Err(TimerError::validation("title is required"));
        }
        let owned = match reminder.target {
            ReminderTarget::Task { task_id } => self.task_exists(task_id, reminder.user_id)?,
            ReminderTarget::Activity { kind, activity_id } => {
                self.activity_exists(kind, activity_id, reminder.user_id)?
            }
        };
        if !owned {
            return Err(TimerError::validation(format!(
                "{} reminder target does not exist or belongs to another user",
                reminder.reminder_type()
            )));
        }

        let (task_id, pomodoro_id, stopwatch_id) = target_columns(&reminder.target);
        match reminder.id {
            None => {
                reminder.created_at = now;
                reminder.updated_at = now;
                self.conn.execute(
                    "INSERT INTO reminders (user_id, title, description, reminder_type, task_id,
                        pomodoro_activity_id, stopwatch_activity_id, remind_at, is_read,
                        is_active, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        reminder.user_id,
                        reminder.title,
                        reminder.description,
                        reminder.reminder_type(),
                        task_id,
                        pomodoro_id,
                        stopwatch_id,
                        reminder.remind_at,
                        reminder.is_read,
                        reminder.is_active,
                        reminder.created_at,
                        reminder.updated_at,
                    ],
                )?;
                let id = self.conn.last_insert_rowid();
                reminder.id = Some(id);
                tracing::debug!(id, user_id = reminder.user_id, "reminder inserted");
            }
            Some(id) => {
                let previous = reminder.updated_at;
                reminder.updated_at = now;
                let changed = self.conn.execute(
                    "UPDATE reminders SET title = ?1, description = ?2, remind_at = ?3,
                        is_read = ?4, is_active = ?5, updated_at = ?6
                     WHERE id = ?7 AND user_id = ?8",
                    params![
                        reminder.title,
                        reminder.description,
                        reminder.remind_at,
                        reminder.is_read,
                        reminder.is_active,
                        reminder.updated_at,
                        id,
                        reminder.user_id,
                    ],
                )?;
                if changed == 0 {
                    reminder.updated_at = previous;
                    return Err(TimerError::not_found(format!("reminder {id}")));
                }
                tracing::debug!(id, user_id = reminder.user_id, "reminder updated");
            }
        }
        Ok(())
    }

    fn list_reminders(&self, user_id: i64, filter: &ReminderFilter) -> Result<Vec<Reminder>> {
        let mut sql = format!("{REMINDER_SELECT} WHERE user_id = ?");
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(user_id)];

        if let Some(reminder_type) = filter.reminder_type {
            sql.push_str(" AND reminder_type = ?");
            args.push(Box::new(reminder_type));
        }
        if let Some(task_id) = filter.task_id {
            sql.push_str(" AND task_id = ?");
            args.push(Box::new(task_id));
        }
        if let Some((kind, activity_id)) = filter.activity {
            match kind {
                TimerKind::Pomodoro => sql.push_str(" AND pomodoro_activity_id = ?"),
                TimerKind::Stopwatch => sql.push_str(" AND stopwatch_activity_id = ?"),
            }
            args.push(Box::new(activity_id));
        }
        if let Some(after) = filter.remind_after {
            sql.push_str(" AND remind_at >= ?");
            args.push(Box::new(after));
        }
        if let Some(before) = filter.remind_before {
            sql.push_str(" AND remind_at <= ?");
            args.push(Box::new(before));
        }
        push_search(&mut sql, &mut args, filter.search.as_deref());
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let reminders = stmt
            .query_map(params_from_iter(args.iter()), reminder_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reminders)
    }

    fn delete_reminder(&self, id: i64, user_id: i64) -> Result<()> {
        let changed = self.conn.execute(
            "DELETE FROM reminders WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if changed == 0 {
            return Err(TimerError::not_found(format!("reminder {id}")));
        }
        tracing::debug!(id, user_id, "reminder deleted");
        Ok(())
    }

    fn bulk_delete_reminders(&self, ids: &[i64], user_id: i64) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM reminders WHERE id = ?1 AND user_id = ?2")?;
            for id in ids {
                deleted += stmt.execute(params![id, user_id])?;
            }
        }
        tx.commit()?;
        tracing::debug!(user_id, requested = ids.len(), deleted, "reminder bulk delete");
        Ok(deleted)
    }

    fn upcoming_reminders(&self, user_id: i64, now: DateTime<Utc>, limit: usize) -> Result<Vec<Reminder>> {
        let sql = format!(
            "{REMINDER_SELECT}
             WHERE user_id = ?1 AND is_active = 1 AND remind_at >= ?2
             ORDER BY remind_at ASC, id ASC
             LIMIT ?3"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(&sql)?;
        let reminders = stmt
            .query_map(params![user_id, now, limit], reminder_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reminders)
    }

    fn due_reminders(&self, user_id: i64, after: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let sql = format!(
            "{REMINDER_SELECT}
             WHERE user_id = ?1 AND is_active = 1 AND is_read = 0
               AND remind_at > ?2 AND remind_at <= ?3
             ORDER BY remind_at ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let reminders = stmt
            .query_map(params![user_id, after, until], reminder_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reminders)
    }
}

impl ToSql for ActivityStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ActivityStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: TimerError| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for ReminderType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ReminderType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: TimerError| FromSqlError::Other(Box::new(e)))
    }
}

/// 把用户输入转成 LIKE 模式，% _ \ 按字面匹配
fn like_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// 标题或描述包含搜索词（ASCII 不区分大小写）
fn push_search(sql: &mut String, args: &mut Vec<Box<dyn ToSql>>, search: Option<&str>) {
    let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) else {
        return;
    };
    let pattern = like_pattern(search);
    sql.push_str(
        " AND (title LIKE ? ESCAPE '\\' OR IFNULL(description, '') LIKE ? ESCAPE '\\')",
    );
    args.push(Box::new(pattern.clone()));
    args.push(Box::new(pattern));
}

fn target_columns(target: &ReminderTarget) -> (Option<i64>, Option<i64>, Option<i64>) {
    match *target {
        ReminderTarget::Task { task_id } => (Some(task_id), None, None),
        ReminderTarget::Activity {
            kind: TimerKind::Pomodoro,
            activity_id,
        } => (None, Some(activity_id), None),
        ReminderTarget::Activity {
            kind: TimerKind::Stopwatch,
            activity_id,
        } => (None, None, Some(activity_id)),
    }
}

fn reminder_from_row(row: &Row<'_>) -> rusqlite::Result<Reminder> {
    let reminder_type: ReminderType = row.get(4)?;
    let columns: (Option<i64>, Option<i64>, Option<i64>) = (row.get(5)?, row.get(6)?, row.get(7)?);
    let target = match (reminder_type, columns) {
        (ReminderType::Task, (Some(task_id), _, _)) => ReminderTarget::Task { task_id },
        (ReminderType::Activity, (_, Some(activity_id), _)) => ReminderTarget::Activity {
            kind: TimerKind::Pomodoro,
            activity_id,
        },
        (ReminderType::Activity, (_, None, Some(activity_id))) => ReminderTarget::Activity {
            kind: TimerKind::Stopwatch,
            activity_id,
        },
        _ => {
            let err = TimerError::validation(format!("{reminder_type} reminder has no target"));
            return Err(rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(err)));
        }
    };
    Ok(Reminder {
        id: Some(row.get(0)?),
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        target,
        remind_at: row.get(8)?,
        is_read: row.get(9)?,
        is_active: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn table_name(kind: TimerKind) -> &'static str {
    match kind {
        TimerKind::Pomodoro => "pomodoro_activities",
        TimerKind::Stopwatch => "stopwatch_activities",
    }
}

fn select_sql(kind: TimerKind) -> &'static str {
    match kind {
        TimerKind::Pomodoro => {
            "SELECT id, user_id, task_id, title, description, status, created_at, updated_at,
                    pomodoro_count, current_pomodoro_start, current_break_start, is_break, is_long_break
             FROM pomodoro_activities"
        }
        TimerKind::Stopwatch => {
            "SELECT id, user_id, task_id, title, description, status, created_at, updated_at,
                    start_time, end_time, duration_ns
             FROM stopwatch_activities"
        }
    }
}

fn base_from_row(row: &Row<'_>) -> rusqlite::Result<ActivityBase> {
    Ok(ActivityBase {
        id: Some(row.get(0)?),
        user_id: row.get(1)?,
        task_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn activity_from_row(kind: TimerKind, row: &Row<'_>) -> rusqlite::Result<TimerActivity> {
    let base = base_from_row(row)?;
    let activity = match kind {
        TimerKind::Pomodoro => TimerActivity::Pomodoro(PomodoroActivity {
            base,
            pomodoro_count: row.get(8)?,
            current_pomodoro_start: row.get(9)?,
            current_break_start: row.get(10)?,
            is_break: row.get(11)?,
            is_long_break: row.get(12)?,
        }),
        TimerKind::Stopwatch => TimerActivity::Stopwatch(StopwatchActivity {
            base,
            start_time: row.get(8)?,
            end_time: row.get(9)?,
            duration: row.get::<_, Option<i64>>(10)?.map(Duration::nanoseconds),
        }),
    };
    Ok(activity)
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: Some(row.get(0)?),
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        priority: match row.get::<_, i32>(4)? {
            1 => Priority::Low,
            2 => Priority::Medium,
            _ => Priority::High,
        },
        status: match row.get::<_, i32>(5)? {
            0 => TaskStatus::Todo,
            1 => TaskStatus::InProgress,
            _ => TaskStatus::Completed,
        },
        due_date: row.get(6)?,
        reminder_time: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

fn duration_to_nanos(duration: Option<Duration>) -> Result<Option<i64>> {
    duration
        .map(|d| {
            d.num_nanoseconds()
                .ok_or_else(|| TimerError::validation("duration out of range"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewActivity, NewReminder};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn settings_missing_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_settings(7), Err(TimerError::NotFound(_))));

        let custom = Settings {
            pomodoro_duration: 50,
            ..Settings::default()
        };
        db.save_settings(7, &custom, t0()).unwrap();
        assert_eq!(db.get_settings(7).unwrap(), custom);

        // 已有设置时 init 不覆盖
        let effective = db.init_settings(7, &Settings::default(), t0()).unwrap();
        assert_eq!(effective.pomodoro_duration, 50);
    }

    #[test]
    fn invalid_settings_are_not_stored() {
        let db = Database::open_in_memory().unwrap();
        let bad = Settings {
            long_break_interval: 0,
            ..Settings::default()
        };
        assert!(matches!(db.save_settings(1, &bad, t0()), Err(TimerError::Validation(_))));
        assert!(db.find_settings(1).unwrap().is_none());
    }

    #[test]
    fn save_assigns_id_and_timestamps() {
        let db = Database::open_in_memory().unwrap();
        let mut activity =
            TimerActivity::new(TimerKind::Pomodoro, 1, NewActivity::titled("背单词"), t0());
        let created = t0() + Duration::seconds(5);
        db.save(&mut activity, created).unwrap();

        let id = activity.id().unwrap();
        assert_eq!(activity.base().created_at, created);

        let later = created + Duration::minutes(1);
        activity.start_pomodoro(later).unwrap();
        db.save(&mut activity, later).unwrap();

        let loaded = db.load(TimerKind::Pomodoro, id, 1).unwrap().unwrap();
        assert_eq!(loaded, activity);
        assert_eq!(loaded.base().created_at, created);
        assert_eq!(loaded.base().updated_at, later);
    }

    #[test]
    fn other_users_cannot_see_or_update() {
        let db = Database::open_in_memory().unwrap();
        let mut activity =
            TimerActivity::new(TimerKind::Stopwatch, 1, NewActivity::titled("跑步"), t0());
        db.save(&mut activity, t0()).unwrap();
        let id = activity.id().unwrap();

        assert!(db.load(TimerKind::Stopwatch, id, 2).unwrap().is_none());
        assert!(db.load(TimerKind::Pomodoro, id, 1).unwrap().is_none());

        let mut stolen = activity.clone();
        stolen.base_mut().user_id = 2;
        assert!(matches!(db.save(&mut stolen, t0()), Err(TimerError::NotFound(_))));
        assert!(matches!(db.delete(TimerKind::Stopwatch, id, 2), Err(TimerError::NotFound(_))));
    }

    #[test]
    fn task_must_belong_to_owner() {
        let db = Database::open_in_memory().unwrap();
        let task_id = db.create_task(&Task::new(2, "别人的任务".to_string(), t0())).unwrap();

        let input = NewActivity {
            title: "专注".to_string(),
            description: None,
            task_id: Some(task_id),
        };
        let mut activity = TimerActivity::new(TimerKind::Pomodoro, 1, input, t0());
        assert!(matches!(db.save(&mut activity, t0()), Err(TimerError::Validation(_))));
        assert!(activity.id().is_none());
    }

    #[test]
    fn deleting_task_cascades_to_activities() {
        let db = Database::open_in_memory().unwrap();
        let task_id = db.create_task(&Task::new(1, "论文".to_string(), t0())).unwrap();
        let input = NewActivity {
            title: "写引言".to_string(),
            description: None,
            task_id: Some(task_id),
        };
        let mut activity = TimerActivity::new(TimerKind::Stopwatch, 1, input, t0());
        db.save(&mut activity, t0()).unwrap();

        db.delete_task(task_id, 1).unwrap();
        assert!(db
            .load(TimerKind::Stopwatch, activity.id().unwrap(), 1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn task_crud() {
        let db = Database::open_in_memory().unwrap();
        let mut task = Task::new(1, "买菜".to_string(), t0());
        task.priority = Priority::High;
        task.reminder_time = Some(t0() + Duration::hours(1));
        let id = db.create_task(&task).unwrap();
        db.create_task(&Task::new(1, "洗衣服".to_string(), t0())).unwrap();

        let tasks = db.get_tasks(1).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, Some(id));
        assert_eq!(tasks[0].reminder_time, task.reminder_time);
        assert!(db.get_tasks(2).unwrap().is_empty());

        let mut stored = db.get_task(id, 1).unwrap().unwrap();
        stored.complete(t0() + Duration::hours(2));
        db.update_task(&stored).unwrap();
        assert_eq!(db.get_task(id, 1).unwrap().unwrap().status, TaskStatus::Completed);

        db.delete_task(id, 1).unwrap();
        assert!(db.get_task(id, 1).unwrap().is_none());
        assert!(db.create_task(&Task::new(1, " ".to_string(), t0())).is_err());
    }

    fn reminder_for(user_id: i64, target: ReminderTarget, remind_at: DateTime<Utc>) -> Reminder {
        let input = NewReminder {
            title: "该休息了".to_string(),
            description: None,
            target,
            remind_at,
        };
        Reminder::new(user_id, input, t0())
    }

    fn saved_activity(db: &Database, kind: TimerKind, user_id: i64) -> i64 {
        let mut activity = TimerActivity::new(kind, user_id, NewActivity::titled("阅读"), t0());
        db.save(&mut activity, t0()).unwrap();
        activity.id().unwrap()
    }

    #[test]
    fn reminder_target_must_belong_to_user() {
        let db = Database::open_in_memory().unwrap();
        let task_id = db.create_task(&Task::new(2, "别人的任务".to_string(), t0())).unwrap();
        let pomodoro_id = saved_activity(&db, TimerKind::Pomodoro, 1);

        let mut foreign = reminder_for(1, ReminderTarget::Task { task_id }, t0());
        assert!(matches!(db.save_reminder(&mut foreign, t0()), Err(TimerError::Validation(_))));

        // 同一个 id 的正计时并不存在
        let wrong_kind = ReminderTarget::Activity {
            kind: TimerKind::Stopwatch,
            activity_id: pomodoro_id,
        };
        let mut reminder = reminder_for(1, wrong_kind, t0());
        assert!(matches!(db.save_reminder(&mut reminder, t0()), Err(TimerError::Validation(_))));

        let target = ReminderTarget::Activity {
            kind: TimerKind::Pomodoro,
            activity_id: pomodoro_id,
        };
        let mut reminder = reminder_for(1, target, t0() + Duration::hours(1));
        db.save_reminder(&mut reminder, t0()).unwrap();
        let loaded = db.load_reminder(reminder.id.unwrap(), 1).unwrap().unwrap();
        assert_eq!(loaded, reminder);
        assert_eq!(loaded.reminder_type(), ReminderType::Activity);
        assert!(db.load_reminder(reminder.id.unwrap(), 2).unwrap().is_none());
    }

    #[test]
    fn deleting_activity_removes_its_reminders() {
        let db = Database::open_in_memory().unwrap();
        let id = saved_activity(&db, TimerKind::Stopwatch, 1);
        let target = ReminderTarget::Activity {
            kind: TimerKind::Stopwatch,
            activity_id: id,
        };
        let mut reminder = reminder_for(1, target, t0());
        db.save_reminder(&mut reminder, t0()).unwrap();

        db.delete(TimerKind::Stopwatch, id, 1).unwrap();
        assert!(db.load_reminder(reminder.id.unwrap(), 1).unwrap().is_none());
    }

    #[test]
    fn due_reminders_use_half_open_window() {
        let db = Database::open_in_memory().unwrap();
        let task_id = db.create_task(&Task::new(1, "交报告".to_string(), t0())).unwrap();
        let target = ReminderTarget::Task { task_id };

        let mut due = reminder_for(1, target, t0() + Duration::milliseconds(200));
        db.save_reminder(&mut due, t0()).unwrap();
        let mut inactive = reminder_for(1, target, t0() + Duration::seconds(1));
        inactive.is_active = false;
        db.save_reminder(&mut inactive, t0()).unwrap();
        let mut read = reminder_for(1, target, t0() + Duration::seconds(2));
        read.is_read = true;
        db.save_reminder(&mut read, t0()).unwrap();

        assert!(db.due_reminders(1, t0() - Duration::seconds(30), t0()).unwrap().is_empty());
        let found = db
            .due_reminders(1, t0(), t0() + Duration::milliseconds(30_300))
            .unwrap();
        assert_eq!(found, vec![due.clone()]);
        // 上界包含，下界不包含
        assert_eq!(db.due_reminders(1, t0(), due.remind_at).unwrap().len(), 1);
        assert!(db.due_reminders(1, due.remind_at, t0() + Duration::hours(1)).unwrap().is_empty());
        assert!(db.due_reminders(2, t0(), t0() + Duration::hours(1)).unwrap().is_empty());
    }

    #[test]
    fn upcoming_skips_past_and_inactive() {
        let db = Database::open_in_memory().unwrap();
        let task_id = db.create_task(&Task::new(1, "准备考试".to_string(), t0())).unwrap();
        let target = ReminderTarget::Task { task_id };

        let mut ids = Vec::new();
        for minutes in [30, -5, 10, 20] {
            let mut reminder = reminder_for(1, target, t0() + Duration::minutes(minutes));
            reminder.is_active = minutes != 20;
            db.save_reminder(&mut reminder, t0()).unwrap();
            ids.push(reminder.id.unwrap());
        }

        let upcoming = db.upcoming_reminders(1, t0(), 10).unwrap();
        let found: Vec<_> = upcoming.iter().map(|r| r.id.unwrap()).collect();
        assert_eq!(found, vec![ids[2], ids[0]]);
        assert_eq!(db.upcoming_reminders(1, t0(), 1).unwrap().len(), 1);
    }

    #[test]
    fn reminder_search_is_literal() {
        let db = Database::open_in_memory().unwrap();
        let task_id = db.create_task(&Task::new(1, "整理".to_string(), t0())).unwrap();
        for title in ["progress 50%", "plain"] {
            let mut reminder = reminder_for(1, ReminderTarget::Task { task_id }, t0());
            reminder.title = title.to_string();
            db.save_reminder(&mut reminder, t0()).unwrap();
        }

        let search = |text: &str| {
            let filter = ReminderFilter {
                search: Some(text.to_string()),
                ..Default::default()
            };
            db.list_reminders(1, &filter).unwrap().len()
        };
        assert_eq!(search("%"), 1);
        assert_eq!(search("_"), 0);
        assert_eq!(search("PLAIN"), 1);

        let by_type = ReminderFilter {
            reminder_type: Some(ReminderType::Activity),
            ..Default::default()
        };
        assert!(db.list_reminders(1, &by_type).unwrap().is_empty());
    }

    #[test]
    fn focus_totals_count_completed_only() {
        let db = Database::open_in_memory().unwrap();
        let task_id = db.create_task(&Task::new(1, "毕业论文".to_string(), t0())).unwrap();
        let input = || NewActivity {
            title: "写作".to_string(),
            description: None,
            task_id: Some(task_id),
        };

        let mut done = TimerActivity::new(TimerKind::Pomodoro, 1, input(), t0());
        done.start_pomodoro(t0()).unwrap();
        done.complete_pomodoro().unwrap();
        db.save(&mut done, t0()).unwrap();

        let mut running = TimerActivity::new(TimerKind::Pomodoro, 1, input(), t0());
        running.start_pomodoro(t0()).unwrap();
        db.save(&mut running, t0()).unwrap();

        let mut stopped = TimerActivity::new(TimerKind::Stopwatch, 1, input(), t0());
        stopped.start_stopwatch(t0()).unwrap();
        stopped.stop_stopwatch(t0() + Duration::minutes(40)).unwrap();
        db.save(&mut stopped, t0()).unwrap();

        let totals = db.focus_totals(task_id, 1).unwrap().unwrap();
        assert_eq!(totals.completed_pomodoros, 1);
        assert_eq!(totals.stopwatch_time, Duration::minutes(40));
        assert!(db.focus_totals(task_id, 2).unwrap().is_none());
    }

    #[test]
    fn save_all_is_atomic() {
        let db = Database::open_in_memory().unwrap();
        let id = saved_activity(&db, TimerKind::Stopwatch, 1);
        let mut first = db.load(TimerKind::Stopwatch, id, 1).unwrap().unwrap();
        first.base_mut().title = "改过".to_string();
        let mut second = first.clone();
        second.base_mut().id = Some(id + 100);

        let mut batch = vec![first, second];
        assert!(matches!(db.save_all(&mut batch, t0()), Err(TimerError::NotFound(_))));
        let stored = db.load(TimerKind::Stopwatch, id, 1).unwrap().unwrap();
        assert_eq!(stored.base().title, "阅读");
    }
}
