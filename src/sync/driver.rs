use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use super::engine::{Clock, RemoteCompletion, RemoteRequest, SyncEngine};
use crate::model::NoteId;
use crate::remote::NoteRemote;

/// A user intent forwarded by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Create,
    EditTitle(String),
    EditContent(String),
    Save,
    Select(NoteId),
    /// Already confirmed by the user.
    Delete(NoteId),
    Search(String),
}

/// Runs a [`SyncEngine`] on a tokio runtime.
///
/// The engine itself is only touched from the driver, one reaction at a time;
/// remote calls run on spawned tasks and report back over a channel, so user
/// intents are never blocked by the network.
pub struct SyncDriver {
    engine: SyncEngine,
    remote: Arc<dyn NoteRemote>,
    completions_tx: mpsc::UnboundedSender<RemoteCompletion>,
    completions_rx: mpsc::UnboundedReceiver<RemoteCompletion>,
    in_flight: usize,
}

/// Clock that follows tokio's (possibly paused) timer.
pub fn tokio_clock() -> Clock {
    Arc::new(|| Instant::now().into_std())
}

impl SyncDriver {
    pub fn new(engine: SyncEngine, remote: Arc<dyn NoteRemote>) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            engine: engine.with_clock(tokio_clock()),
            remote,
            completions_tx,
            completions_rx,
            in_flight: 0,
        }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Kick off startup reconciliation.
    pub fn start(&mut self) {
        if let Some(request) = self.engine.start_sync() {
            self.dispatch(request);
        }
    }

    pub fn apply(&mut self, intent: Intent) {
        tracing::trace!(?intent, "applying intent");
        let request = match intent {
            Intent::Create => Some(self.engine.create_note()),
            Intent::EditTitle(title) => {
                self.engine.edit_title(&title);
                None
            }
            Intent::EditContent(content) => {
                self.engine.edit_content(&content);
                None
            }
            Intent::Save => self.engine.save_now(),
            Intent::Select(id) => {
                if !self.engine.select(&id) {
                    tracing::warn!(note_id = %id, "cannot select unknown note");
                }
                None
            }
            Intent::Delete(id) => self.engine.delete_note(&id),
            Intent::Search(query) => {
                self.engine.set_search(&query);
                None
            }
        };
        if let Some(request) = request {
            self.dispatch(request);
        }
    }

    /// Wait for the next completion or timer and react to it. Returns false
    /// once nothing is in flight and no timer is pending.
    pub async fn step(&mut self) -> bool {
        let deadline = self.engine.next_deadline().map(Instant::from_std);
        if self.in_flight == 0 && deadline.is_none() {
            return false;
        }
        let wake_at = deadline.unwrap_or_else(far_future);
        tokio::select! {
            Some(done) = self.completions_rx.recv(), if self.in_flight > 0 => {
                self.on_completion(done);
            }
            _ = sleep_until(wake_at), if deadline.is_some() => {}
        }
        self.pump_timers();
        true
    }

    /// Drive timers and in-flight requests until everything has settled.
    pub async fn settle(&mut self) {
        while self.step().await {}
    }

    /// Like [`settle`](Self::settle) but stops as soon as nothing is in flight
    /// and no save is pending, without waiting for the status to linger back
    /// to idle.
    pub async fn flush(&mut self) {
        while self.in_flight > 0 || self.engine.has_pending_saves() {
            if !self.step().await {
                break;
            }
        }
    }

    /// Long-lived loop: react to intents, completions and timers until the
    /// intent channel closes, then settle and hand the engine back.
    pub async fn run(mut self, mut intents: mpsc::Receiver<Intent>) -> SyncEngine {
        self.start();
        loop {
            let deadline = self.engine.next_deadline().map(Instant::from_std);
            let wake_at = deadline.unwrap_or_else(far_future);
            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(intent) => self.apply(intent),
                    None => break,
                },
                Some(done) = self.completions_rx.recv(), if self.in_flight > 0 => {
                    self.on_completion(done);
                }
                _ = sleep_until(wake_at), if deadline.is_some() => {}
            }
            self.pump_timers();
        }
        self.settle().await;
        self.engine
    }

    fn on_completion(&mut self, done: RemoteCompletion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.engine.complete(done);
    }

    fn pump_timers(&mut self) {
        for request in self.engine.tick() {
            self.dispatch(request);
        }
    }

    fn dispatch(&mut self, request: RemoteRequest) {
        self.in_flight += 1;
        let remote = self.remote.clone();
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let completion = execute(remote.as_ref(), request).await;
            // The receiver only goes away with the driver itself.
            let _ = tx.send(completion);
        });
    }
}

async fn execute(remote: &dyn NoteRemote, request: RemoteRequest) -> RemoteCompletion {
    match request {
        RemoteRequest::FetchAll => RemoteCompletion::Fetched(remote.fetch_all().await),
        RemoteRequest::Create {
            local_id,
            title,
            content,
        } => {
            let result = remote.create(&title, &content).await;
            RemoteCompletion::Created {
                local_id,
                title,
                content,
                result,
            }
        }
        RemoteRequest::Update { id, title, content } => {
            let result = remote.update(&id, &title, &content).await;
            RemoteCompletion::Updated {
                id,
                title,
                content,
                result,
            }
        }
        RemoteRequest::Delete { note, index } => {
            let result = remote.delete(&note.id).await;
            RemoteCompletion::Deleted {
                note,
                index,
                result,
            }
        }
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncOptions;
    use crate::model::Note;
    use crate::remote::testing::{RemoteCall, ScriptedRemote};
    use crate::remote::{RemoteError, RemoteOutcome};
    use crate::storage::NoteCache;
    use crate::sync::SyncPhase;

    fn engine_with(notes: Vec<Note>) -> (SyncEngine, NoteCache) {
        let cache = NoteCache::in_memory();
        cache.save(&notes);
        (SyncEngine::open(cache.clone(), &SyncOptions::default()), cache)
    }

    #[tokio::test(start_paused = true)]
    async fn startup_with_unreachable_remote_keeps_cache() {
        let local = vec![Note::with_contents(NoteId::new("a"), "A", "")];
        let (engine, _cache) = engine_with(local.clone());
        let remote = Arc::new(ScriptedRemote::new());
        let mut driver = SyncDriver::new(engine, remote.clone());

        driver.start();
        driver.settle().await;

        assert_eq!(remote.calls(), vec![RemoteCall::FetchAll]);
        assert_eq!(driver.engine().notes().to_vec(), local);
        assert_eq!(driver.engine().status().phase(), SyncPhase::Idle);
        assert_eq!(driver.engine().status().message(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_edits_sends_one_update_with_the_last_text() {
        let (engine, _cache) = engine_with(vec![Note::with_contents(NoteId::new("a"), "A", "")]);
        let remote = Arc::new(ScriptedRemote::new());
        remote.on_update(Ok(RemoteOutcome::Value(Note::with_contents(
            NoteId::new("a"),
            "A",
            "abc",
        ))));
        let mut driver = SyncDriver::new(engine, remote.clone());

        for text in ["a", "ab", "abc"] {
            driver.apply(Intent::EditContent(text.to_string()));
            tokio::time::advance(Duration::from_millis(300)).await;
            driver.pump_timers();
        }
        assert!(remote.calls().is_empty());
        driver.settle().await;

        assert_eq!(
            remote.calls(),
            vec![RemoteCall::Update {
                id: NoteId::new("a"),
                title: "A".into(),
                content: "abc".into(),
            }]
        );
        assert!(!driver.engine().is_dirty());
        assert_eq!(driver.engine().status().phase(), SyncPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_returns_before_the_saved_status_lingers_out() {
        let (engine, _cache) = engine_with(vec![Note::with_contents(NoteId::new("a"), "A", "")]);
        let remote = Arc::new(ScriptedRemote::new());
        remote.on_update(Ok(RemoteOutcome::Value(Note::with_contents(
            NoteId::new("a"),
            "A",
            "body",
        ))));
        let mut driver = SyncDriver::new(engine, remote.clone());

        driver.apply(Intent::EditContent("body".into()));
        driver.apply(Intent::Save);
        driver.flush().await;

        assert_eq!(driver.in_flight, 0);
        assert_eq!(driver.engine().status().phase(), SyncPhase::Saved);
        driver.settle().await;
        assert_eq!(driver.engine().status().phase(), SyncPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn created_note_adopts_the_server_id() {
        let (engine, cache) = engine_with(vec![Note::with_contents(NoteId::new("a"), "A", "")]);
        let remote = Arc::new(ScriptedRemote::new());
        remote.on_create(Ok(RemoteOutcome::Value(Note::with_contents(
            NoteId::new("srv-9"),
            "Untitled",
            "",
        ))));
        let mut driver = SyncDriver::new(engine, remote.clone());

        driver.apply(Intent::Create);
        driver.settle().await;

        let engine = driver.engine();
        assert_eq!(engine.notes().len(), 2);
        assert_eq!(engine.selected_id(), Some(&NoteId::new("srv-9")));
        assert_eq!(cache.load_selection(), Some(NoteId::new("srv-9")));
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_rolls_back_a_failed_delete() {
        let keep = Note::with_contents(NoteId::new("keep"), "Keep", "body");
        let (engine, _cache) = engine_with(vec![keep.clone()]);
        let remote = Arc::new(ScriptedRemote::new());
        remote
            .on_fetch(Ok(RemoteOutcome::Unconfigured))
            .on_delete(Err(RemoteError::Transport("broken pipe".into())));
        let driver = SyncDriver::new(engine, remote.clone());

        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(driver.run(rx));
        tx.send(Intent::Delete(NoteId::new("keep"))).await.expect("send");
        drop(tx);
        let engine = handle.await.expect("driver task");

        assert_eq!(engine.notes().get(&NoteId::new("keep")), Some(&keep));
        assert_eq!(engine.selected_id(), Some(&NoteId::new("keep")));
        assert!(engine.status().is_error());
        let calls = remote.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.contains(&RemoteCall::FetchAll));
        assert!(calls.contains(&RemoteCall::Delete { id: NoteId::new("keep") }));
    }
}
