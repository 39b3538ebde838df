use anyhow::Result;
use notify_rust::{Notification, Timeout};

use crate::pomodoro::PomodoroPhase;

/// 通知管理器
pub struct NotificationManager {
    enabled: bool,
}

impl NotificationManager {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// 发送提醒（任务截止或用户设置的提醒）
    pub fn send_reminder(&self, title: &str, body: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        Notification::new()
            .summary(&format!("📅 {}", title))
            .body(body)
            .icon("calendar")
            .timeout(Timeout::Milliseconds(5000))
            .show()?;
        Ok(())
    }

    /// 发送阶段结束通知
    pub fn send_phase_finished(&self, activity_title: &str, phase: PomodoroPhase) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let Some((summary, body)) = phase_message(phase) else {
            return Ok(());
        };

        Notification::new()
            .summary(&format!("🍅 {}", summary))
            .body(&format!("{}\n{}", activity_title, body))
            .icon("emblem-default")
            .timeout(Timeout::Milliseconds(5000))
            .show()?;
        Ok(())
    }
}

/// 各阶段结束时的通知文案
pub fn phase_message(phase: PomodoroPhase) -> Option<(&'static str, &'static str)> {
    match phase {
        PomodoroPhase::Focus => Some(("番茄钟完成", "干得好！休息一下吧。")),
        PomodoroPhase::ShortBreak => Some(("休息时间结束", "准备开始新的番茄钟吧！")),
        PomodoroPhase::LongBreak => Some(("长休息结束", "精力恢复了，继续加油！")),
        PomodoroPhase::Idle => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_has_no_message() {
        assert!(phase_message(PomodoroPhase::Idle).is_none());
        assert_eq!(phase_message(PomodoroPhase::Focus).unwrap().0, "番茄钟完成");
    }

    #[test]
    fn disabled_manager_sends_nothing() {
        let manager = NotificationManager::new(false);
        assert!(manager.send_phase_finished("测试", PomodoroPhase::Focus).is_ok());
        assert!(manager.send_reminder("测试", "body").is_ok());
    }
}
