//! Poll-based streaming to one subscriber: pane text by diff, activity log
//! entries by last seen id.

use crate::{ContextStore, Multiplexer};
use autocode_types::LogEntry;
use futures::{Sink, SinkExt};
use std::time::Duration;
use tracing::{debug, warn};

/// Remembers the last text sent on one connection.
#[derive(Debug, Default)]
pub struct PaneDiffer {
    last: String,
}

impl PaneDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the capture if it differs from the last one sent.
    pub fn next(&mut self, captured: String) -> Option<String> {
        if captured == self.last {
            return None;
        }
        self.last.clone_from(&captured);
        Some(captured)
    }
}

/// Forward changes of `session`'s pane into `sink` every `interval`, until a
/// send fails. A missing session sends nothing and keeps polling, so the
/// stream picks up again if the session is recreated.
pub async fn pump_pane<S>(
    multiplexer: &dyn Multiplexer,
    session: &str,
    interval: Duration,
    lines: usize,
    mut sink: S,
) where
    S: Sink<String> + Unpin,
{
    let mut differ = PaneDiffer::new();
    loop {
        match multiplexer.exists(session).await {
            Ok(true) => match multiplexer.capture_pane(session, lines).await {
                Ok(text) => {
                    if let Some(delta) = differ.next(text) {
                        if sink.send(delta).await.is_err() {
                            debug!(target: "autocode::ws", "Subscriber for {} went away", session);
                            return;
                        }
                    }
                }
                Err(e) => warn!(target: "autocode::ws", "Capture of {} failed: {}", session, e),
            },
            Ok(false) => {}
            Err(e) => warn!(target: "autocode::ws", "Liveness check for {} failed: {}", session, e),
        }
        tokio::time::sleep(interval).await;
    }
}

/// Most log entries fetched per poll.
const LOG_BATCH: usize = 200;

/// Forward activity log entries of `context_id` into `sink`, starting after
/// `after_id`, until a send fails. Store errors are traced and retried on the
/// next tick.
pub async fn pump_logs<S>(
    store: &ContextStore,
    context_id: uuid::Uuid,
    mut after_id: i64,
    interval: Duration,
    mut sink: S,
) where
    S: Sink<LogEntry> + Unpin,
{
    loop {
        match store.logs_after(context_id, after_id, LOG_BATCH) {
            Ok(entries) => {
                for entry in entries {
                    after_id = entry.id;
                    if sink.send(entry).await.is_err() {
                        debug!(target: "autocode::ws", "Log subscriber for {} went away", context_id);
                        return;
                    }
                }
            }
            Err(e) => warn!(target: "autocode::ws", "Reading logs of {} failed: {}", context_id, e),
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMultiplexer;
    use autocode_types::{ContextKind, ContextStatus, LogLevel, WorkContext};
    use chrono::Utc;
    use futures::StreamExt;
    use futures::channel::mpsc;
    use std::sync::Arc;

    #[test]
    fn test_differ_suppresses_repeats() {
        let mut differ = PaneDiffer::new();
        assert_eq!(differ.next("a".to_string()), Some("a".to_string()));
        assert_eq!(differ.next("a".to_string()), None);
        assert_eq!(differ.next("b".to_string()), Some("b".to_string()));
        assert_eq!(differ.next("a".to_string()), Some("a".to_string()));
    }

    #[test]
    fn test_differ_ignores_initial_empty_pane() {
        let mut differ = PaneDiffer::new();
        assert_eq!(differ.next(String::new()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_sends_only_changes() {
        let mux = Arc::new(FakeMultiplexer::new());
        mux.add_session("s");
        mux.set_pane("s", &["one", "one", "one", "two", "two"]);

        let (tx, mut rx) = mpsc::channel(16);
        let pump_mux = mux.clone();
        let handle = tokio::spawn(async move {
            pump_pane(pump_mux.as_ref(), "s", Duration::from_millis(500), 200, tx).await;
        });

        assert_eq!(rx.next().await.as_deref(), Some("one"));
        assert_eq!(rx.next().await.as_deref(), Some("two"));
        // The last frame repeats forever, so nothing else arrives.
        let more = tokio::time::timeout(Duration::from_secs(10), rx.next()).await;
        assert!(more.is_err());

        // A closed subscriber is noticed on the next send.
        drop(rx);
        mux.set_pane("s", &["three"]);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("pump should stop once the subscriber is gone")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_waits_for_missing_session() {
        let mux = Arc::new(FakeMultiplexer::new());
        mux.set_pane("s", &["hello"]);

        let (tx, mut rx) = mpsc::channel(16);
        let pump_mux = mux.clone();
        tokio::spawn(async move {
            pump_pane(pump_mux.as_ref(), "s", Duration::from_millis(500), 200, tx).await;
        });

        let nothing = tokio::time::timeout(Duration::from_secs(3), rx.next()).await;
        assert!(nothing.is_err());

        mux.add_session("s");
        assert_eq!(rx.next().await.as_deref(), Some("hello"));
    }

    fn store_with_context() -> (Arc<ContextStore>, uuid::Uuid) {
        let store = Arc::new(ContextStore::open_in_memory().unwrap());
        let now = Utc::now();
        let ctx = WorkContext {
            id: uuid::Uuid::new_v4(),
            user_id: uuid::Uuid::new_v4(),
            agent_id: uuid::Uuid::new_v4(),
            kind: ContextKind::Project,
            name: "Demo".to_string(),
            slug: "demo".to_string(),
            description: String::new(),
            architecture: String::new(),
            workspace_path: "/tmp/demo".into(),
            tmux_session: "alice-project-demo".to_string(),
            status: ContextStatus::Running,
            created_at: now,
            updated_at: now,
        };
        store.insert_context(&ctx).unwrap();
        (store, ctx.id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_pump_sends_each_entry_once() {
        let (store, id) = store_with_context();
        let seen = store.append_log(id, LogLevel::Info, "before connect").unwrap();
        store.append_log(id, LogLevel::Info, "Work loop started").unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let pump_store = store.clone();
        let handle = tokio::spawn(async move {
            pump_logs(&pump_store, id, seen.id, Duration::from_secs(1), tx).await;
        });

        let first = rx.next().await.unwrap();
        assert_eq!(first.message, "Work loop started");
        let quiet = tokio::time::timeout(Duration::from_secs(5), rx.next()).await;
        assert!(quiet.is_err());

        store.append_log(id, LogLevel::Warning, "Step 0 stalled (attempt 1/3)").unwrap();
        let next = rx.next().await.unwrap();
        assert_eq!(next.level, LogLevel::Warning);
        assert!(next.id > first.id);

        drop(rx);
        store.append_log(id, LogLevel::Info, "unseen").unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("pump should stop once the subscriber is gone")
            .unwrap();
    }
}
