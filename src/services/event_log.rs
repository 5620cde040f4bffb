//! Per-task event log with live fan-out.
//!
//! Every appended event is persisted to the task row and broadcast to live
//! subscribers in one step, under a per-task lock. `replay_then_tail`
//! snapshots the persisted history and subscribes under that same lock, so a
//! late subscriber sees the complete history followed by the live tail with
//! no gap and no duplicate across the seam.

use dashmap::DashMap;
use futures::stream::Stream;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EventKind, StreamItem, TaskEvent};
use crate::domain::ports::TaskRepository;

/// Per-subscriber broadcast buffer. A consumer that falls this many events
/// behind is dropped with a `stream_lag` item.
const DEFAULT_BUFFER: usize = 64;

struct ChannelState {
    next_sequence: u64,
    sender: broadcast::Sender<TaskEvent>,
    terminated: bool,
}

struct TaskChannel {
    state: Mutex<ChannelState>,
}

/// Append-only event log shared by the orchestrator worker and the SSE
/// facade.
pub struct EventLog {
    repo: Arc<dyn TaskRepository>,
    channels: DashMap<Uuid, Arc<TaskChannel>>,
    buffer: usize,
}

impl EventLog {
    pub fn new(repo: Arc<dyn TaskRepository>) -> Self {
        Self::with_buffer(repo, DEFAULT_BUFFER)
    }

    pub fn with_buffer(repo: Arc<dyn TaskRepository>, buffer: usize) -> Self {
        Self { repo, channels: DashMap::new(), buffer: buffer.max(16) }
    }

    /// Open the live channel for a new task. Must be called before the first
    /// append.
    pub fn register(&self, task_id: Uuid) {
        let (sender, _) = broadcast::channel(self.buffer);
        self.channels.insert(
            task_id,
            Arc::new(TaskChannel {
                state: Mutex::new(ChannelState { next_sequence: 0, sender, terminated: false }),
            }),
        );
    }

    /// Number of tasks with a live channel (i.e. currently streaming).
    pub fn live_count(&self) -> usize {
        self.channels.len()
    }

    /// Assign the next sequence number, persist, and broadcast. Appending
    /// after a terminal event is an invariant violation.
    pub async fn append(&self, task_id: Uuid, mut event: TaskEvent) -> DomainResult<TaskEvent> {
        let channel = self
            .channels
            .get(&task_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(DomainError::TaskNotFound(task_id))?;

        let mut state = channel.state.lock().await;
        if state.terminated {
            return Err(DomainError::Internal(format!(
                "append to task {task_id} after terminal event"
            )));
        }

        event.sequence = state.next_sequence;
        self.repo.append_event(task_id, &event).await?;
        state.next_sequence += 1;

        if event.kind.is_terminal() {
            state.terminated = true;
        }

        // Send errors only mean there is no live subscriber right now.
        let _ = state.sender.send(event.clone());
        drop(state);

        if event.kind.is_terminal() {
            self.channels.remove(&task_id);
        }

        Ok(event)
    }

    /// Complete persisted history followed by the live tail. For a task that
    /// is already terminal the stream ends after the replay.
    pub async fn replay_then_tail(
        &self,
        task_id: Uuid,
    ) -> DomainResult<impl Stream<Item = StreamItem> + Send + 'static> {
        let channel = self.channels.get(&task_id).map(|entry| Arc::clone(entry.value()));

        let (replay, receiver) = match channel {
            Some(channel) => {
                // Snapshot and subscribe under the append lock: everything up
                // to `next_sequence` comes from the replay, everything after
                // arrives on the receiver.
                let state = channel.state.lock().await;
                let replay = self.repo.events(task_id).await?;
                let receiver = if state.terminated { None } else { Some(state.sender.subscribe()) };
                drop(state);
                (replay, receiver)
            }
            None => {
                // No live channel: the task must at least exist.
                if self.repo.get(task_id).await?.is_none() {
                    return Err(DomainError::TaskNotFound(task_id));
                }
                (self.repo.events(task_id).await?, None)
            }
        };

        let replay_terminal = replay.last().is_some_and(|e| e.kind.is_terminal());
        let replay_len = replay.len() as u64;

        Ok(async_stream::stream! {
            for event in replay {
                let terminal = event.kind.is_terminal();
                yield StreamItem::Event(event);
                if terminal {
                    return;
                }
            }

            let mut receiver = match receiver {
                Some(receiver) => receiver,
                None => return,
            };
            if replay_terminal {
                return;
            }

            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        // Drop anything the replay already covered.
                        if event.sequence < replay_len {
                            continue;
                        }
                        let terminal = event.kind.is_terminal();
                        yield StreamItem::Event(event);
                        if terminal {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        yield StreamItem::Lagged { missed };
                        return;
                    }
                }
            }
        })
    }

    /// Convenience: append a minimal event of the given kind.
    pub async fn emit(
        &self,
        task_id: Uuid,
        kind: EventKind,
        reason: impl Into<String>,
        analysis: impl Into<String>,
    ) -> DomainResult<TaskEvent> {
        self.append(task_id, TaskEvent::new(kind, reason, analysis)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteTaskRepository};
    use crate::domain::models::Task;
    use futures::StreamExt;

    async fn setup() -> (Arc<EventLog>, Uuid) {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = Arc::new(SqliteTaskRepository::new(pool));
        let task_id = Uuid::new_v4();
        repo.create(&Task::new(task_id, "test")).await.unwrap();
        let log = Arc::new(EventLog::new(repo));
        log.register(task_id);
        (log, task_id)
    }

    #[tokio::test]
    async fn test_sequences_dense_and_increasing() {
        let (log, task_id) = setup().await;
        for i in 0..5 {
            let event = log
                .emit(task_id, EventKind::AnalysisStep, "step", format!("step {i}"))
                .await
                .unwrap();
            assert_eq!(event.sequence, i);
        }
    }

    #[tokio::test]
    async fn test_no_append_after_terminal() {
        let (log, task_id) = setup().await;
        log.emit(task_id, EventKind::InvestigationCancelled, "cancelled", "user cancel")
            .await
            .unwrap();
        let err = log.emit(task_id, EventKind::AnalysisStep, "late", "too late").await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_replay_then_tail_no_gap_no_duplicate() {
        let (log, task_id) = setup().await;

        log.emit(task_id, EventKind::InvestigationStarted, "started", "go").await.unwrap();
        log.emit(task_id, EventKind::AnalysisStep, "step", "one").await.unwrap();

        let mut stream = Box::pin(log.replay_then_tail(task_id).await.unwrap());

        // Replay phase
        for expected in 0..2u64 {
            match stream.next().await.unwrap() {
                StreamItem::Event(e) => assert_eq!(e.sequence, expected),
                StreamItem::Lagged { .. } => panic!("unexpected lag"),
            }
        }

        // Live phase
        log.emit(task_id, EventKind::AnalysisStep, "step", "two").await.unwrap();
        log.emit(task_id, EventKind::InvestigationComplete, "done", "report").await.unwrap();

        match stream.next().await.unwrap() {
            StreamItem::Event(e) => assert_eq!(e.sequence, 2),
            StreamItem::Lagged { .. } => panic!("unexpected lag"),
        }
        match stream.next().await.unwrap() {
            StreamItem::Event(e) => {
                assert_eq!(e.sequence, 3);
                assert_eq!(e.kind, EventKind::InvestigationComplete);
            }
            StreamItem::Lagged { .. } => panic!("unexpected lag"),
        }

        // Terminal event closes the stream
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_subscriber_after_terminal_gets_replay_only() {
        let (log, task_id) = setup().await;
        log.emit(task_id, EventKind::InvestigationStarted, "started", "go").await.unwrap();
        log.emit(task_id, EventKind::InvestigationComplete, "done", "report").await.unwrap();

        let mut stream = Box::pin(log.replay_then_tail(task_id).await.unwrap());
        let mut count = 0;
        while let Some(item) = stream.next().await {
            match item {
                StreamItem::Event(_) => count += 1,
                StreamItem::Lagged { .. } => panic!("unexpected lag"),
            }
        }
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let (log, _) = setup().await;
        let err = log.replay_then_tail(Uuid::new_v4()).await;
        assert!(matches!(err, Err(DomainError::TaskNotFound(_))));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_observe_same_order() {
        let (log, task_id) = setup().await;
        log.emit(task_id, EventKind::InvestigationStarted, "started", "go").await.unwrap();

        let a = log.replay_then_tail(task_id).await.unwrap();
        let b = log.replay_then_tail(task_id).await.unwrap();

        log.emit(task_id, EventKind::AnalysisStep, "step", "one").await.unwrap();
        log.emit(task_id, EventKind::InvestigationComplete, "done", "bye").await.unwrap();

        async fn collect(stream: impl Stream<Item = StreamItem> + Send) -> Vec<u64> {
            let mut stream = Box::pin(stream);
            let mut sequences = Vec::new();
            while let Some(item) = stream.next().await {
                if let StreamItem::Event(e) = item {
                    sequences.push(e.sequence);
                }
            }
            sequences
        }

        assert_eq!(collect(a).await, vec![0, 1, 2]);
        assert_eq!(collect(b).await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_live_count_drops_after_terminal() {
        let (log, task_id) = setup().await;
        assert_eq!(log.live_count(), 1);
        log.emit(task_id, EventKind::InvestigationCancelled, "cancelled", "bye")
            .await
            .unwrap();
        assert_eq!(log.live_count(), 0);
    }
}
