//! 活动日志 (仅内存, 不持久化)

use tracing::info;

/// 时间戳格式
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Default, Clone)]
pub struct ActivityLog {
    entries: Vec<String>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条带时间戳的记录, 同时输出到控制台
    pub fn add(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT);
        info!("📝 {}", message);
        self.entries.push(format!("[{}] {}", timestamp, message));
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 清空历史, 并记录一条清空记录
    pub fn clear(&mut self) {
        self.entries.clear();
        self.add("Log history cleared.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_ordered_and_stamped() {
        let mut log = ActivityLog::new();
        log.add("Camera opened.");
        log.add("Camera closed.");
        assert_eq!(log.len(), 2);
        assert!(log.entries()[0].ends_with("] Camera opened."));
        assert!(log.entries()[1].ends_with("] Camera closed."));
        // [YYYY-MM-DD HH:MM:SS]
        assert_eq!(log.entries()[0].find(']'), Some(20));
    }

    #[test]
    fn test_clear_leaves_marker() {
        let mut log = ActivityLog::new();
        log.add("a");
        log.add("b");
        log.clear();
        assert_eq!(log.len(), 1);
        assert!(log.entries()[0].ends_with("Log history cleared."));
    }
}
