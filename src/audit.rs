use clickhouse::Client;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    High,
}

impl Severity {
    fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub component: String,
    pub message: String,
    pub severity: Severity,
}

/// Handle for emitting audit events (non-blocking, fire-and-forget). Every
/// fail-closed decision (§4.1, §4.4) must go through `fail_closed`, which
/// is the only way to emit a `high` severity event from this crate.
#[derive(Clone)]
pub struct AuditTracker {
    tx: mpsc::UnboundedSender<AuditEvent>,
}

impl AuditTracker {
    pub fn track(&self, component: &str, message: &str, severity: Severity) {
        tracing::warn!(component, message, severity = severity.as_str(), "audit event");
        let _ = self.tx.send(AuditEvent {
            component: component.to_string(),
            message: message.to_string(),
            severity,
        });
    }

    pub fn fail_closed(&self, component: &str, message: &str) {
        self.track(component, message, Severity::High);
    }

    /// A tracker with no attached writer, for tests and standalone
    /// construction of components that require one.
    pub fn noop() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }
}

/// Spawn the background audit writer and return the tracker handle.
pub fn spawn(ch: Client) -> AuditTracker {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(audit_writer(rx, ch));
    AuditTracker { tx }
}

async fn audit_writer(mut rx: mpsc::UnboundedReceiver<AuditEvent>, ch: Client) {
    let mut buffer: Vec<AuditEvent> = Vec::new();
    let mut interval = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                buffer.push(event);
                if buffer.len() >= 500 {
                    let batch = std::mem::take(&mut buffer);
                    flush(&ch, batch).await;
                }
            }
            _ = interval.tick() => {
                if !buffer.is_empty() {
                    let batch = std::mem::take(&mut buffer);
                    flush(&ch, batch).await;
                }
            }
        }
    }
}

async fn flush(ch: &Client, events: Vec<AuditEvent>) {
    let mut values = Vec::new();
    for e in &events {
        let component = e.component.replace('\'', "\\'");
        let message = e.message.replace('\'', "\\'");
        values.push(format!(
            "('{component}', '{message}', '{}', now64(3))",
            e.severity.as_str()
        ));
    }

    if values.is_empty() {
        return;
    }

    let sql = format!(
        "INSERT INTO audit_events (component, message, severity, recorded_at) VALUES {}",
        values.join(", ")
    );

    if let Err(e) = ch.query(&sql).execute().await {
        tracing::warn!("failed to flush audit events: {e}");
    } else {
        tracing::debug!("flushed {} audit events", events.len());
    }
}
