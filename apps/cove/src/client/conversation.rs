use crate::transport::ChatMessage;

/// How an entry renders relative to the local identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorship {
    /// Written by the local user; rendered on the right.
    Local,
    /// Written by anyone else. With no local identity known, everything is
    /// remote.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub author: String,
    pub text: String,
    pub authorship: Authorship,
}

/// The conversation view model: an append-only sequence whose insertion
/// order is the display order. Entries are never edited, removed, or
/// reordered for the lifetime of the activation.
#[derive(Debug, Default)]
pub struct ConversationLog {
    entries: Vec<LogEntry>,
    local_identity: Option<String>,
}

impl ConversationLog {
    pub fn new(local_identity: Option<String>) -> Self {
        Self {
            entries: Vec::new(),
            local_identity,
        }
    }

    pub fn append(&mut self, message: ChatMessage) -> &LogEntry {
        let authorship = classify(&message.author, self.local_identity.as_deref());
        self.entries.push(LogEntry {
            author: message.author,
            text: message.text,
            authorship,
        });
        self.entries.last().expect("just pushed")
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn local_identity(&self) -> Option<&str> {
        self.local_identity.as_deref()
    }
}

/// Exact, case-sensitive string equality; an absent identity never matches.
fn classify(author: &str, local_identity: Option<&str>) -> Authorship {
    match local_identity {
        Some(name) if name == author => Authorship::Local,
        _ => Authorship::Remote,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(author: &str, text: &str) -> ChatMessage {
        ChatMessage {
            author: author.into(),
            text: text.into(),
        }
    }

    #[test]
    fn classifies_self_and_other() {
        let mut log = ConversationLog::new(Some("alice".into()));
        assert_eq!(log.append(message("alice", "mine")).authorship, Authorship::Local);
        assert_eq!(log.append(message("bob", "theirs")).authorship, Authorship::Remote);
    }

    #[test]
    fn authorship_comparison_is_case_sensitive() {
        let mut log = ConversationLog::new(Some("alice".into()));
        assert_eq!(log.append(message("Alice", "??")).authorship, Authorship::Remote);
    }

    #[test]
    fn absent_identity_renders_other() {
        let mut log = ConversationLog::new(None);
        assert_eq!(log.append(message("alice", "hi")).authorship, Authorship::Remote);
        assert_eq!(log.append(message("", "")).authorship, Authorship::Remote);
    }

    #[test]
    fn append_order_is_receipt_order() {
        let mut log = ConversationLog::new(Some("a".into()));
        log.append(message("a", "1"));
        log.append(message("b", "2"));
        log.append(message("a", "3"));

        let texts: Vec<&str> = log.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["1", "2", "3"]);

        let authorship: Vec<Authorship> =
            log.entries().iter().map(|e| e.authorship).collect();
        assert_eq!(
            authorship,
            vec![Authorship::Local, Authorship::Remote, Authorship::Local]
        );
    }

    #[test]
    fn single_inbound_frame_renders_other() {
        // The round-trip scenario's tail: fresh session, one frame from bob.
        let mut log = ConversationLog::new(Some("alice".into()));
        log.append(message("bob", "hi"));
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].authorship, Authorship::Remote);
        assert_eq!(log.entries()[0].text, "hi");
    }
}
