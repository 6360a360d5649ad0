//! Status and activity reporting
//!
//! The supervisor pushes human-readable text through these one-way sinks.
//! [`ChannelReporter`] forwards everything into a single channel so the task
//! that owns the user-facing output sees one ordered stream.

use tokio::sync::mpsc;

/// Receives connection lifecycle text
pub trait StatusReporter: Send + Sync {
    fn report_status(&self, text: &str);
}

/// Receives per-message activity text
pub trait ActivityReporter: Send + Sync {
    fn report_activity(&self, text: &str);
}

impl<F> StatusReporter for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report_status(&self, text: &str) {
        self(text)
    }
}

impl<F> ActivityReporter for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report_activity(&self, text: &str) {
        self(text)
    }
}

/// Updates sent from the bridge to whoever displays them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// Connection lifecycle changed
    Status(String),
    /// A MIDI message was forwarded (or failed to be)
    Activity(String),
}

/// Reporter that forwards into an unbounded channel
///
/// Sending never blocks; reports are silently discarded once the receiver
/// is gone.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<BridgeEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusReporter for ChannelReporter {
    fn report_status(&self, text: &str) {
        let _ = self.tx.send(BridgeEvent::Status(text.to_string()));
    }
}

impl ActivityReporter for ChannelReporter {
    fn report_activity(&self, text: &str) {
        let _ = self.tx.send(BridgeEvent::Activity(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_channel_reporter_preserves_order() {
        let (reporter, mut rx) = ChannelReporter::new();

        reporter.report_status("scanning");
        reporter.report_activity("Note On: note 60 (velocity 100, ch 1)");
        reporter.report_status("connected");

        assert_eq!(rx.try_recv().unwrap(), BridgeEvent::Status("scanning".into()));
        assert!(matches!(rx.try_recv().unwrap(), BridgeEvent::Activity(_)));
        assert_eq!(rx.try_recv().unwrap(), BridgeEvent::Status("connected".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_reporter_without_receiver_does_not_panic() {
        let (reporter, rx) = ChannelReporter::new();
        drop(rx);

        reporter.report_status("nobody listening");
    }

    #[test]
    fn test_closure_reporter() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |text: &str| seen.lock().push(text.to_string())
        };

        sink.report_status("a");
        sink.report_activity("b");

        assert_eq!(*seen.lock(), vec!["a".to_string(), "b".to_string()]);
    }
}
