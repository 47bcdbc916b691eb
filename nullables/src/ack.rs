//! Nullable acknowledgment sink — records replies for assertions.

use async_trait::async_trait;
use rolegate_types::AckSink;
use std::sync::{Arc, Mutex};

/// Everything a trigger originator was told.
#[derive(Clone, Debug, Default)]
pub struct AckLog {
    pub replies: Vec<String>,
    pub follow_ups: Vec<String>,
}

/// A recording [`AckSink`]. The log handle survives the sink being moved
/// into a session task.
pub struct NullAckSink {
    log: Arc<Mutex<AckLog>>,
}

impl NullAckSink {
    pub fn new() -> (Self, Arc<Mutex<AckLog>>) {
        let log = Arc::new(Mutex::new(AckLog::default()));
        (Self { log: Arc::clone(&log) }, log)
    }
}

#[async_trait]
impl AckSink for NullAckSink {
    async fn reply(&mut self, text: &str) {
        self.log.lock().unwrap().replies.push(text.to_string());
    }

    async fn follow_up(&mut self, text: &str) {
        self.log.lock().unwrap().follow_ups.push(text.to_string());
    }
}
