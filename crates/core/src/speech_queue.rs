//! Single-flight, in-order dispatch of speech chunks.
//!
//! Chunks are produced while the reply is still streaming in. `enqueue` starts
//! a drain task only when none is running, so exactly one task ever talks to
//! the speaker and chunks reach it in the order they were cut. The first chunk
//! of a turn is spoken `Sync`, the rest `Async`. A failed speak call is logged
//! and the chunk is counted as delivered.
//!
//! Whether a drain is running is published on a `watch` channel, so any number
//! of callers can wait for the queue to go idle, and a caller that stops
//! waiting leaves nothing behind.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use crate::speaker::Speaker;
use crate::types::{DeliveryMode, SpeakRequest};

#[derive(Default)]
struct QueueState {
    pending: VecDeque<String>,
    draining: bool,
    /// Chunks handed to the speaker since the turn began.
    dispatched: usize,
    failed: usize,
}

#[derive(Clone)]
pub struct SpeechQueue {
    speaker: Arc<dyn Speaker>,
    state: Arc<Mutex<QueueState>>,
    draining_tx: Arc<watch::Sender<bool>>,
}

impl SpeechQueue {
    pub fn new(speaker: Arc<dyn Speaker>) -> Self {
        let (draining_tx, _) = watch::channel(false);
        Self {
            speaker,
            state: Arc::new(Mutex::new(QueueState::default())),
            draining_tx: Arc::new(draining_tx),
        }
    }

    pub fn speaker(&self) -> &Arc<dyn Speaker> {
        &self.speaker
    }

    /// Makes the next dispatched chunk a `Sync` one again.
    pub fn begin_turn(&self) {
        let mut state = self.state();
        state.dispatched = 0;
        state.failed = 0;
    }

    pub fn enqueue(&self, chunk: String) {
        let mut state = self.state();
        state.pending.push_back(chunk);
        if state.draining {
            return;
        }
        state.draining = true;
        self.draining_tx.send_replace(true);
        let drain = Drain {
            speaker: self.speaker.clone(),
            state: self.state.clone(),
            draining_tx: self.draining_tx.clone(),
            finished: false,
        };
        tokio::spawn(drain.run());
    }

    /// Drops every chunk that has not been dispatched yet.
    pub fn clear(&self) -> usize {
        let mut state = self.state();
        let dropped = state.pending.len();
        state.pending.clear();
        if dropped > 0 {
            tracing::debug!("dropped {} queued chunk(s)", dropped);
        }
        dropped
    }

    /// Waits until no drain task is running, including one started by an
    /// earlier turn.
    pub async fn wait_idle(&self) {
        let mut draining_rx = self.draining_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = draining_rx.wait_for(|draining| !*draining).await;
    }

    pub fn is_draining(&self) -> bool {
        self.state().draining
    }

    pub fn len(&self) -> usize {
        self.state().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dispatched(&self) -> usize {
        self.state().dispatched
    }

    pub fn failed(&self) -> usize {
        self.state().failed
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    // The guard is never held across an await, a poisoned lock only means a
    // panic elsewhere and the data is still consistent.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The one running drain loop. Marks the queue idle when it runs dry, or when
/// the task is torn down early.
struct Drain {
    speaker: Arc<dyn Speaker>,
    state: Arc<Mutex<QueueState>>,
    draining_tx: Arc<watch::Sender<bool>>,
    finished: bool,
}

impl Drain {
    async fn run(mut self) {
        loop {
            let (chunk, mode) = {
                let mut guard = lock(&self.state);
                let Some(chunk) = guard.pending.pop_front() else {
                    // Flag and signal change under the lock that saw the queue empty,
                    // so a concurrent `enqueue` either lands before or spawns anew.
                    guard.draining = false;
                    self.draining_tx.send_replace(false);
                    self.finished = true;
                    return;
                };
                let mode = if guard.dispatched == 0 {
                    DeliveryMode::Sync
                } else {
                    DeliveryMode::Async
                };
                guard.dispatched += 1;
                (chunk, mode)
            };

            tracing::debug!("speaking ({}): {:?}", mode.as_str(), chunk);
            if let Err(e) = self.speaker.speak(SpeakRequest::new(&chunk, mode)).await {
                tracing::warn!("speak call failed, moving on to the next chunk: {:?}", e);
                lock(&self.state).failed += 1;
            }
        }
    }
}

impl Drop for Drain {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::error!("speech drain task stopped early, dropping queued chunks");
        let mut guard = lock(&self.state);
        guard.pending.clear();
        guard.draining = false;
        self.draining_tx.send_replace(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speaker::MockSpeaker;
    use async_trait::async_trait;
    use mockall::Sequence;
    use std::time::Duration;

    /// Records every request and fails the ones whose text matches `fail_on`.
    #[derive(Default)]
    struct RecordingSpeaker {
        calls: Mutex<Vec<SpeakRequest>>,
        in_flight: Mutex<usize>,
        max_in_flight: Mutex<usize>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl Speaker for RecordingSpeaker {
        async fn speak(&self, request: SpeakRequest) -> anyhow::Result<()> {
            {
                let mut in_flight = self.in_flight.lock().unwrap();
                *in_flight += 1;
                let mut max = self.max_in_flight.lock().unwrap();
                *max = (*max).max(*in_flight);
            }
            tokio::task::yield_now().await;
            *self.in_flight.lock().unwrap() -= 1;

            let fail = self.fail_on.as_deref() == Some(request.text());
            self.calls.lock().unwrap().push(request);
            if fail {
                anyhow::bail!("avatar rejected the task");
            }
            Ok(())
        }

        async fn interrupt(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl RecordingSpeaker {
        fn texts(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|call| call.text().to_string())
                .collect()
        }

        fn modes(&self) -> Vec<DeliveryMode> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|call| call.delivery_mode())
                .collect()
        }
    }

    fn chunks(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("Chunk number {i}.")).collect()
    }

    #[tokio::test]
    async fn test_dispatches_in_order_first_sync_then_async() {
        let speaker = Arc::new(RecordingSpeaker::default());
        let queue = SpeechQueue::new(speaker.clone());

        for chunk in chunks(5) {
            queue.enqueue(chunk);
            tokio::task::yield_now().await;
        }
        queue.wait_idle().await;

        assert_eq!(speaker.texts(), chunks(5));
        let modes = speaker.modes();
        assert_eq!(modes[0], DeliveryMode::Sync);
        assert!(modes[1..].iter().all(|mode| *mode == DeliveryMode::Async));
        assert_eq!(*speaker.max_in_flight.lock().unwrap(), 1);
        assert!(!queue.is_draining());
    }

    #[tokio::test]
    async fn test_enqueue_while_draining_does_not_start_second_loop() {
        let speaker = Arc::new(RecordingSpeaker::default());
        let queue = SpeechQueue::new(speaker.clone());

        queue.enqueue("First chunk here.".to_string());
        assert!(queue.is_draining());
        queue.enqueue("Second chunk here.".to_string());
        queue.enqueue("Third chunk here.".to_string());
        assert_eq!(queue.len(), 3);

        queue.wait_idle().await;
        assert_eq!(
            speaker.texts(),
            vec!["First chunk here.", "Second chunk here.", "Third chunk here."]
        );
        assert_eq!(*speaker.max_in_flight.lock().unwrap(), 1);
        assert_eq!(queue.dispatched(), 3);
    }

    #[tokio::test]
    async fn test_failed_chunk_does_not_block_the_rest() {
        let speaker = Arc::new(RecordingSpeaker {
            fail_on: Some("Chunk number 2.".to_string()),
            ..Default::default()
        });
        let queue = SpeechQueue::new(speaker.clone());

        for chunk in chunks(4) {
            queue.enqueue(chunk);
        }
        queue.wait_idle().await;

        assert_eq!(speaker.texts(), chunks(4));
        assert_eq!(queue.failed(), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_new_turn_starts_with_sync_again() {
        let speaker = Arc::new(RecordingSpeaker::default());
        let queue = SpeechQueue::new(speaker.clone());

        queue.begin_turn();
        queue.enqueue("Turn one, part one.".to_string());
        queue.enqueue("Turn one, part two.".to_string());
        queue.wait_idle().await;

        queue.begin_turn();
        queue.enqueue("Turn two, part one.".to_string());
        queue.wait_idle().await;

        assert_eq!(
            speaker.modes(),
            vec![DeliveryMode::Sync, DeliveryMode::Async, DeliveryMode::Sync]
        );
    }

    #[tokio::test]
    async fn test_clear_drops_pending_chunks() {
        let speaker = Arc::new(RecordingSpeaker::default());
        let queue = SpeechQueue::new(speaker.clone());

        for chunk in chunks(3) {
            queue.enqueue(chunk);
        }
        // Nothing has run yet on the current-thread runtime.
        assert_eq!(queue.clear(), 3);
        queue.wait_idle().await;

        assert!(speaker.texts().is_empty());
        assert!(!queue.is_draining());
    }

    #[tokio::test]
    async fn test_mock_speaker_sees_expected_sequence() {
        let mut mock = MockSpeaker::new();
        let mut seq = Sequence::new();
        mock.expect_speak()
            .withf(|request| {
                request.text() == "I have a headache."
                    && request.delivery_mode() == DeliveryMode::Sync
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(anyhow::anyhow!("avatar busy")));
        mock.expect_speak()
            .withf(|request| {
                request.text() == "It started yesterday."
                    && request.delivery_mode() == DeliveryMode::Async
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let queue = SpeechQueue::new(Arc::new(mock));
        queue.enqueue("I have a headache.".to_string());
        queue.enqueue("It started yesterday.".to_string());
        queue.wait_idle().await;

        assert_eq!(queue.dispatched(), 2);
        assert_eq!(queue.failed(), 1);
    }

    /// Takes `delay` to say anything and records each utterance once finished.
    struct SlowSpeaker {
        delay: Duration,
        spoken: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Speaker for SlowSpeaker {
        async fn speak(&self, request: SpeakRequest) -> anyhow::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.spoken.lock().unwrap().push(request.text().to_string());
            Ok(())
        }

        async fn interrupt(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_idle_still_tracks_drain_after_a_wait_is_abandoned() {
        let speaker = Arc::new(SlowSpeaker {
            delay: Duration::from_millis(500),
            spoken: Mutex::new(Vec::new()),
        });
        let queue = SpeechQueue::new(speaker.clone());

        queue.enqueue("First answer, said slowly.".to_string());
        let gave_up = tokio::time::timeout(Duration::from_millis(100), queue.wait_idle()).await;
        assert!(gave_up.is_err());
        assert!(queue.is_draining());

        queue.enqueue("Second answer follows.".to_string());
        queue.wait_idle().await;

        assert_eq!(
            *speaker.spoken.lock().unwrap(),
            vec!["First answer, said slowly.", "Second answer follows."]
        );
        assert!(!queue.is_draining());
    }

    #[tokio::test]
    async fn test_panicking_speaker_leaves_queue_idle() {
        let mut mock = MockSpeaker::new();
        mock.expect_speak().returning(|_| panic!("speaker crashed"));

        let queue = SpeechQueue::new(Arc::new(mock));
        queue.enqueue("This never gets said.".to_string());
        queue.enqueue("Nor does this.".to_string());
        queue.wait_idle().await;

        assert!(!queue.is_draining());
        assert!(queue.is_empty());
    }
}
