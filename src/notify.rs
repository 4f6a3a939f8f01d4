use std::cell::RefCell;

// ---------------------------------------------------------------------------
// Notification sink – user-facing progress messages
// ---------------------------------------------------------------------------

/// Receives status messages from long-running pipeline stages.
///
/// Delivery is fire-and-forget: no acknowledgement, no backpressure.
/// Messages arrive in the order the stage emits them.
pub trait NotificationSink {
    fn info(&self, message: &str);

    /// Drop messages that are no longer relevant.
    fn clear(&self) {}
}

/// Sink that only writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn info(&self, message: &str) {
        log::info!("{message}");
    }
}

/// Collects messages for display in the dashboard. Every message is also
/// logged.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    messages: RefCell<Vec<String>>,
}

impl NotificationCenter {
    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }
}

impl NotificationSink for NotificationCenter {
    fn info(&self, message: &str) {
        log::info!("{message}");
        self.messages.borrow_mut().push(message.to_string());
    }

    fn clear(&self) {
        self.messages.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_keeps_emission_order() {
        let center = NotificationCenter::default();
        center.info("first");
        center.info("second");
        assert_eq!(center.messages(), ["first", "second"]);

        center.clear();
        assert!(center.is_empty());
    }
}
