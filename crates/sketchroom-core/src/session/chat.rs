//! Chat log

use crate::models::ChatEntry;

/// Append-only chat and system notification log
///
/// Entries are addressed by index. The only mutation after append is
/// clearing an entry's pending flag.
#[derive(Debug, Default)]
pub struct ChatLog {
    entries: Vec<ChatEntry>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a participant message, returning its index
    pub fn append_user(&mut self, name: &str, text: &str, pending: bool) -> usize {
        self.entries.push(ChatEntry::user(name, text, pending));
        self.entries.len() - 1
    }

    /// Append a system notification, returning its index
    pub fn append_system(&mut self, text: impl Into<String>) -> usize {
        self.entries.push(ChatEntry::system(text));
        self.entries.len() - 1
    }

    /// Clear the pending flag of a flushed entry
    ///
    /// Returns false if the entry does not exist or was not pending.
    pub fn mark_sent(&mut self, index: usize) -> bool {
        match self.entries.get_mut(index) {
            Some(entry) if entry.pending => {
                entry.pending = false;
                true
            }
            _ => false,
        }
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.pending).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatKind;

    #[test]
    fn test_append_preserves_order() {
        let mut log = ChatLog::new();
        log.append_user("Alice", "one", false);
        log.append_system("two");
        log.append_user("Bob", "three", false);

        let texts: Vec<&str> = log.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert_eq!(log.entries()[1].kind, ChatKind::System);
        assert_eq!(log.entries()[1].sender, "System");
    }

    #[test]
    fn test_mark_sent() {
        let mut log = ChatLog::new();
        let idx = log.append_user("Alice", "offline", true);
        assert_eq!(log.pending_count(), 1);

        assert!(log.mark_sent(idx));
        assert!(!log.entries()[idx].pending);
        assert_eq!(log.pending_count(), 0);

        // Second call is a no-op
        assert!(!log.mark_sent(idx));
        assert!(!log.mark_sent(99));
    }
}
