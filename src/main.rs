use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use focus_timer::clock::{Clock, SystemClock};
use focus_timer::config::{init_tracing, Config};
use focus_timer::db::Database;
use focus_timer::models::{
    ActivityFilter, ActivityStatus, NewActivity, NewReminder, Priority, Reminder, ReminderFilter,
    ReminderPatch, ReminderTarget, ReminderType, Settings, Task, TaskStatus, TimerActivity,
    TimerKind,
};
use focus_timer::pomodoro::{format_duration, PomodoroPhase};
use focus_timer::service::TimerService;
use focus_timer::store::SettingsProvider;

type Service = TimerService<Database, SystemClock>;

#[derive(Parser)]
#[command(name = "timers")]
#[command(about = "Pomodoro and stopwatch activity tracker", long_about = None)]
struct Cli {
    /// Config file path (defaults to user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config)
    #[arg(short, long, global = true)]
    db_path: Option<PathBuf>,

    /// Act as this user (overrides config)
    #[arg(short, long, global = true)]
    user: Option<i64>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommand),

    /// Show or change pomodoro settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Pomodoro activities
    #[command(subcommand)]
    Pomodoro(PomodoroCommand),

    /// Stopwatch activities
    #[command(subcommand)]
    Stopwatch(StopwatchCommand),

    /// Reminders for tasks and activities
    #[command(subcommand)]
    Reminder(ReminderCommand),
}

#[derive(Subcommand)]
enum TaskCommand {
    /// Add a new task
    Add {
        /// Task title
        title: String,
        #[arg(short = 'D', long)]
        description: Option<String>,
        #[arg(short, long, value_enum, default_value_t = PriorityArg::Medium)]
        priority: PriorityArg,
        /// Due date (RFC 3339)
        #[arg(long)]
        due: Option<DateTime<Utc>>,
        /// Reminder time (RFC 3339)
        #[arg(long)]
        remind: Option<DateTime<Utc>>,
    },

    /// List all tasks
    List,

    /// Mark a task as completed
    Complete {
        /// Task ID
        id: i64,
    },

    /// Delete a task and its activities
    Delete {
        /// Task ID
        id: i64,
    },

    /// Total focus time from completed activities of a task
    Focus {
        /// Task ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum SettingsCommand {
    Show,
    /// Store the configured defaults if the user has no settings yet
    Init,
    /// Change individual values (minutes)
    Set {
        #[arg(long)]
        pomodoro: Option<u32>,
        #[arg(long)]
        short_break: Option<u32>,
        #[arg(long)]
        long_break: Option<u32>,
        /// Pomodoros between long breaks
        #[arg(long)]
        interval: Option<u32>,
    },
}

#[derive(Subcommand)]
enum PomodoroCommand {
    Create(CreateArgs),
    List(ListArgs),
    Show { id: i64 },
    /// Start (or restart) a focus interval
    Start { id: i64 },
    /// Start a break; without a flag the interval setting decides
    Break {
        id: i64,
        #[arg(long, conflicts_with = "short")]
        long: bool,
        #[arg(long)]
        short: bool,
    },
    /// Finish the current pomodoro
    Complete { id: i64 },
    Remaining { id: i64 },
    Cancel { id: i64 },
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

#[derive(Subcommand)]
enum StopwatchCommand {
    Create(CreateArgs),
    List(ListArgs),
    Show { id: i64 },
    Start { id: i64 },
    Stop { id: i64 },
    Elapsed { id: i64 },
    Cancel { id: i64 },
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

#[derive(Subcommand)]
enum ReminderCommand {
    /// Add a reminder for a task or an activity
    Add {
        title: String,
        /// When to remind (RFC 3339)
        #[arg(long)]
        at: DateTime<Utc>,
        #[arg(short = 'D', long)]
        description: Option<String>,
        #[command(flatten)]
        target: TargetArgs,
    },
    List {
        /// TASK or ACTIVITY
        #[arg(long = "type")]
        reminder_type: Option<ReminderType>,
        #[arg(long)]
        task: Option<i64>,
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Next active reminders
    Upcoming,
    /// Enable or disable a reminder
    Toggle { id: i64 },
    /// Mark a reminder as read
    Read { id: i64 },
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    #[arg(long)]
    task: Option<i64>,
    #[arg(long)]
    pomodoro: Option<i64>,
    #[arg(long)]
    stopwatch: Option<i64>,
}

impl TargetArgs {
    fn into_target(self) -> Result<ReminderTarget> {
        let target = match (self.task, self.pomodoro, self.stopwatch) {
            (Some(task_id), None, None) => ReminderTarget::Task { task_id },
            (None, Some(activity_id), None) => ReminderTarget::Activity {
                kind: TimerKind::Pomodoro,
                activity_id,
            },
            (None, None, Some(activity_id)) => ReminderTarget::Activity {
                kind: TimerKind::Stopwatch,
                activity_id,
            },
            _ => anyhow::bail!("give exactly one of --task, --pomodoro or --stopwatch"),
        };
        Ok(target)
    }
}

#[derive(Args)]
struct CreateArgs {
    title: String,
    #[arg(short = 'D', long)]
    description: Option<String>,
    /// Associated task ID
    #[arg(short, long)]
    task: Option<i64>,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    task: Option<i64>,
    /// PENDING, IN_PROGRESS, COMPLETED, PAUSED or CANCELLED
    #[arg(long)]
    status: Option<ActivityStatus>,
    /// Match title or description
    #[arg(short, long)]
    search: Option<String>,
    #[arg(long)]
    created_after: Option<DateTime<Utc>>,
    #[arg(long)]
    created_before: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, ValueEnum)]
enum PriorityArg {
    Low,
    Medium,
    High,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Medium => Priority::Medium,
            PriorityArg::High => Priority::High,
        }
    }
}

impl From<CreateArgs> for NewActivity {
    fn from(args: CreateArgs) -> Self {
        NewActivity {
            title: args.title,
            description: args.description,
            task_id: args.task,
        }
    }
}

impl From<ListArgs> for ActivityFilter {
    fn from(args: ListArgs) -> Self {
        ActivityFilter {
            task_id: args.task,
            status: args.status,
            created_after: args.created_after,
            created_before: args.created_before,
            search: args.search,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    init_tracing(&config.log_level);
    match &config.source {
        Some(path) => tracing::debug!("Using config file: {:?}", path),
        None => tracing::debug!("No config file, using defaults"),
    }

    if let Some(db_path) = cli.db_path {
        config.db_path = Some(db_path);
    }
    let user_id = cli.user.unwrap_or(config.user_id);

    // 确定数据库路径
    let db_path = config.resolve_db_path()?;
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database {:?}", db_path))?;
    let service = TimerService::new(db, SystemClock);
    let out = Output { json: cli.json };

    match cli.command {
        Commands::Task(cmd) => run_task(&service, user_id, cmd, out),
        Commands::Settings(cmd) => run_settings(&service, &config, user_id, cmd, out),
        Commands::Pomodoro(cmd) => run_pomodoro(&service, user_id, cmd, out),
        Commands::Stopwatch(cmd) => run_stopwatch(&service, user_id, cmd, out),
        Commands::Reminder(cmd) => run_reminder(&service, user_id, cmd, out),
    }
}

fn run_task(service: &Service, user_id: i64, cmd: TaskCommand, out: Output) -> Result<()> {
    let db = service.store();
    let now = service.clock().now();
    match cmd {
        TaskCommand::Add {
            title,
            description,
            priority,
            due,
            remind,
        } => {
            let mut task = Task::new(user_id, title, now);
            task.description = description;
            task.priority = priority.into();
            task.due_date = due;
            task.reminder_time = remind;
            let id = db.create_task(&task)?;
            println!("✅ Task created with ID: {}", id);
        }
        TaskCommand::List => {
            let tasks = db.get_tasks(user_id)?;
            if out.json {
                return out.print_json(&tasks);
            }
            if tasks.is_empty() {
                println!("No tasks found.");
            }
            for task in tasks {
                let status_icon = match task.status {
                    TaskStatus::Completed => "✅",
                    TaskStatus::InProgress => "🔄",
                    TaskStatus::Todo => "⭕",
                };
                let priority_icon = match task.priority {
                    Priority::High => "🔴",
                    Priority::Medium => "🟡",
                    Priority::Low => "🟢",
                };
                let overdue = if task.is_overdue(now) { " (overdue)" } else { "" };
                println!(
                    "[{}] {} {} {}{}",
                    task.id.unwrap_or_default(),
                    status_icon,
                    priority_icon,
                    task.title,
                    overdue
                );
            }
        }
        TaskCommand::Complete { id } => {
            let mut task = db
                .get_task(id, user_id)?
                .with_context(|| format!("❌ Task {} not found", id))?;
            task.complete(now);
            db.update_task(&task)?;
            println!("✅ Task {} marked as completed", id);
        }
        TaskCommand::Delete { id } => {
            db.delete_task(id, user_id)?;
            println!("🗑  Task {} deleted", id);
        }
        TaskCommand::Focus { id } => {
            let focused = service.focused_duration(id, user_id)?;
            return out.print_duration("focused", Some(focused));
        }
    }
    Ok(())
}

fn run_settings(
    service: &Service,
    config: &Config,
    user_id: i64,
    cmd: SettingsCommand,
    out: Output,
) -> Result<()> {
    let db = service.store();
    let now = service.clock().now();
    let settings = match cmd {
        SettingsCommand::Show => db.get_settings(user_id)?,
        SettingsCommand::Init => db.init_settings(user_id, &config.defaults, now)?,
        SettingsCommand::Set {
            pomodoro,
            short_break,
            long_break,
            interval,
        } => {
            let mut settings = db.find_settings(user_id)?.unwrap_or(config.defaults);
            if let Some(v) = pomodoro {
                settings.pomodoro_duration = v;
            }
            if let Some(v) = short_break {
                settings.short_break_duration = v;
            }
            if let Some(v) = long_break {
                settings.long_break_duration = v;
            }
            if let Some(v) = interval {
                settings.long_break_interval = v;
            }
            db.save_settings(user_id, &settings, now)?;
            settings
        }
    };

    if out.json {
        return out.print_json(&settings);
    }
    println!("pomodoro:      {} min", settings.pomodoro_duration);
    println!("short break:   {} min", settings.short_break_duration);
    println!("long break:    {} min", settings.long_break_duration);
    println!("long break every {} pomodoros", settings.long_break_interval);
    Ok(())
}

fn run_pomodoro(service: &Service, user_id: i64, cmd: PomodoroCommand, out: Output) -> Result<()> {
    let kind = TimerKind::Pomodoro;
    let activity = match cmd {
        PomodoroCommand::Create(args) => service.create(kind, user_id, args.into())?,
        PomodoroCommand::List(args) => {
            let activities = service.list(kind, user_id, &args.into())?;
            return out.print_list(service, &activities);
        }
        PomodoroCommand::Show { id } => service.get(kind, id, user_id)?,
        PomodoroCommand::Start { id } => service.start_pomodoro(id, user_id)?,
        PomodoroCommand::Break { id, long, short } => {
            if long || short {
                service.start_break(id, user_id, long)?
            } else {
                service.start_scheduled_break(id, user_id)?
            }
        }
        PomodoroCommand::Complete { id } => service.complete_pomodoro(id, user_id)?,
        PomodoroCommand::Remaining { id } => {
            let remaining = service.remaining_time(id, user_id)?;
            return out.print_duration("remaining", remaining);
        }
        PomodoroCommand::Cancel { id } => service.cancel(kind, id, user_id)?,
        PomodoroCommand::Delete { ids } => return delete(service, kind, user_id, &ids),
    };
    out.print_activity(service, &activity)
}

fn run_stopwatch(service: &Service, user_id: i64, cmd: StopwatchCommand, out: Output) -> Result<()> {
    let kind = TimerKind::Stopwatch;
    let activity = match cmd {
        StopwatchCommand::Create(args) => service.create(kind, user_id, args.into())?,
        StopwatchCommand::List(args) => {
            let activities = service.list(kind, user_id, &args.into())?;
            return out.print_list(service, &activities);
        }
        StopwatchCommand::Show { id } => service.get(kind, id, user_id)?,
        StopwatchCommand::Start { id } => service.start_stopwatch(id, user_id)?,
        StopwatchCommand::Stop { id } => service.stop_stopwatch(id, user_id)?,
        StopwatchCommand::Elapsed { id } => {
            let elapsed = service.elapsed_time(id, user_id)?;
            return out.print_duration("elapsed", elapsed);
        }
        StopwatchCommand::Cancel { id } => service.cancel(kind, id, user_id)?,
        StopwatchCommand::Delete { ids } => return delete(service, kind, user_id, &ids),
    };
    out.print_activity(service, &activity)
}

fn run_reminder(service: &Service, user_id: i64, cmd: ReminderCommand, out: Output) -> Result<()> {
    let reminder = match cmd {
        ReminderCommand::Add {
            title,
            at,
            description,
            target,
        } => {
            let input = NewReminder {
                title,
                description,
                target: target.into_target()?,
                remind_at: at,
            };
            service.create_reminder(user_id, input)?
        }
        ReminderCommand::List {
            reminder_type,
            task,
            search,
        } => {
            let filter = ReminderFilter {
                reminder_type,
                task_id: task,
                search,
                ..Default::default()
            };
            return out.print_reminders(&service.list_reminders(user_id, &filter)?);
        }
        ReminderCommand::Upcoming => {
            return out.print_reminders(&service.upcoming_reminders(user_id)?);
        }
        ReminderCommand::Toggle { id } => service.toggle_reminder_active(id, user_id)?,
        ReminderCommand::Read { id } => {
            let patch = ReminderPatch {
                is_read: Some(true),
                ..Default::default()
            };
            service.update_reminder(id, user_id, patch)?
        }
        ReminderCommand::Delete { ids } => {
            let deleted = service.bulk_delete_reminders(&ids, user_id)?;
            println!("🗑  Deleted {} of {} reminders", deleted, ids.len());
            return Ok(());
        }
    };
    out.print_reminders(std::slice::from_ref(&reminder))
}

fn delete(service: &Service, kind: TimerKind, user_id: i64, ids: &[i64]) -> Result<()> {
    match ids {
        [id] => {
            service.delete(kind, *id, user_id)?;
            println!("🗑  Deleted {} {}", kind, id);
        }
        _ => {
            let deleted = service.bulk_delete(kind, ids, user_id)?;
            println!("🗑  Deleted {} of {} {} activities", deleted, ids.len(), kind);
        }
    }
    Ok(())
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn print_json<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn print_duration(&self, label: &str, value: Option<chrono::Duration>) -> Result<()> {
        if self.json {
            let seconds = value.map(|d| d.num_milliseconds() as f64 / 1000.0);
            let mut body = serde_json::Map::new();
            body.insert(format!("{}_secs", label), serde_json::json!(seconds));
            return self.print_json(&body);
        }
        match value {
            Some(d) => println!("{}: {}", label, format_duration(d)),
            None => println!("{}: -", label),
        }
        Ok(())
    }

    fn print_list(&self, service: &Service, activities: &[TimerActivity]) -> Result<()> {
        if self.json {
            return self.print_json(&activities);
        }
        if activities.is_empty() {
            println!("No activities found.");
        }
        let settings = activities
            .first()
            .and_then(|a| service.store().get_settings(a.base().user_id).ok());
        let now = service.clock().now();
        for activity in activities {
            println!("{}", describe(activity, settings.as_ref(), now));
        }
        Ok(())
    }

    fn print_reminders(&self, reminders: &[Reminder]) -> Result<()> {
        if self.json {
            return self.print_json(&reminders);
        }
        if reminders.is_empty() {
            println!("No reminders found.");
        }
        for reminder in reminders {
            let state = match (reminder.is_active, reminder.is_read) {
                (false, _) => "💤",
                (true, true) => "✅",
                (true, false) => "🔔",
            };
            let target = match reminder.target {
                ReminderTarget::Task { task_id } => format!("task {}", task_id),
                ReminderTarget::Activity { kind, activity_id } => format!("{} {}", kind, activity_id),
            };
            println!(
                "[{}] {} {} @ {} ({})",
                reminder.id.unwrap_or_default(),
                state,
                reminder.title,
                reminder.remind_at.format("%Y-%m-%d %H:%M"),
                target
            );
        }
        Ok(())
    }

    fn print_activity(&self, service: &Service, activity: &TimerActivity) -> Result<()> {
        if self.json {
            return self.print_json(activity);
        }
        let settings = service.store().get_settings(activity.base().user_id).ok();
        println!("{}", describe(activity, settings.as_ref(), service.clock().now()));
        Ok(())
    }
}

fn describe(activity: &TimerActivity, settings: Option<&Settings>, now: DateTime<Utc>) -> String {
    let base = activity.base();
    let status_icon = match base.status {
        ActivityStatus::Pending => "⭕",
        ActivityStatus::InProgress => "🔄",
        ActivityStatus::Completed => "✅",
        ActivityStatus::Paused => "⏸",
        ActivityStatus::Cancelled => "❌",
    };
    let detail = match activity {
        TimerActivity::Pomodoro(p) => {
            let phase = match p.phase() {
                PomodoroPhase::Idle => "idle",
                PomodoroPhase::Focus => "focus",
                PomodoroPhase::ShortBreak => "short break",
                PomodoroPhase::LongBreak => "long break",
            };
            let remaining = settings
                .and_then(|s| p.remaining_time(s, now))
                .map(|d| format!(", {} left", format_duration(d)))
                .unwrap_or_default();
            format!("🍅 x{} ({}{})", p.pomodoro_count, phase, remaining)
        }
        TimerActivity::Stopwatch(s) => match s.elapsed_time(now) {
            Some(d) => format!("⏱ {}", format_duration(d)),
            None => "⏱ --:--".to_string(),
        },
    };
    format!(
        "[{}] {} {} {} {}",
        base.id.unwrap_or_default(),
        status_icon,
        base.title,
        detail,
        base.status
    )
}
