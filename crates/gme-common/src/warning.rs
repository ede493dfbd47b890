//! Single-slot record of the latest playback anomaly.

/// Holds the most recent warning until it is read.
///
/// A new warning replaces the previous one; reading clears the slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarningSlot {
    slot: Option<String>,
}

impl WarningSlot {
    /// Empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `msg`, replacing any unread warning, and log it.
    pub fn set(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        log::warn!("{msg}");
        self.slot = Some(msg);
    }

    /// Record a message its source has already logged.
    pub fn forward(&mut self, msg: String) {
        self.slot = Some(msg);
    }

    /// Take the warning, leaving the slot empty.
    pub fn take(&mut self) -> Option<String> {
        self.slot.take()
    }

    /// Look at the warning without clearing it.
    pub fn peek(&self) -> Option<&str> {
        self.slot.as_deref()
    }

    /// Drop any unread warning.
    pub fn clear(&mut self) {
        self.slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_warning_replaces_older_and_take_clears() {
        let mut slot = WarningSlot::new();
        assert_eq!(slot.take(), None);
        slot.set("first");
        slot.set("second");
        assert_eq!(slot.peek(), Some("second"));
        assert_eq!(slot.take().as_deref(), Some("second"));
        assert_eq!(slot.take(), None);
    }
}
