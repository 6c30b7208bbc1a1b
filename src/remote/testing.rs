use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{NoteRemote, RemoteOutcome, RemoteResult};
use crate::model::{Note, NoteId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    FetchAll,
    Create { title: String, content: String },
    Update { id: NoteId, title: String, content: String },
    Delete { id: NoteId },
}

/// In-process remote with queued replies. An empty queue answers
/// `Unavailable`.
#[derive(Default)]
pub struct ScriptedRemote {
    calls: Mutex<Vec<RemoteCall>>,
    fetch: Mutex<VecDeque<RemoteResult<Vec<Note>>>>,
    create: Mutex<VecDeque<RemoteResult<Note>>>,
    update: Mutex<VecDeque<RemoteResult<Note>>>,
    delete: Mutex<VecDeque<RemoteResult<()>>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_fetch(&self, reply: RemoteResult<Vec<Note>>) -> &Self {
        self.fetch.lock().push_back(reply);
        self
    }

    pub fn on_create(&self, reply: RemoteResult<Note>) -> &Self {
        self.create.lock().push_back(reply);
        self
    }

    pub fn on_update(&self, reply: RemoteResult<Note>) -> &Self {
        self.update.lock().push_back(reply);
        self
    }

    pub fn on_delete(&self, reply: RemoteResult<()>) -> &Self {
        self.delete.lock().push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().push(call);
    }
}

fn next<T>(queue: &Mutex<VecDeque<RemoteResult<T>>>) -> RemoteResult<T> {
    queue
        .lock()
        .pop_front()
        .unwrap_or(Ok(RemoteOutcome::Unavailable))
}

#[async_trait]
impl NoteRemote for ScriptedRemote {
    async fn fetch_all(&self) -> RemoteResult<Vec<Note>> {
        self.record(RemoteCall::FetchAll);
        next(&self.fetch)
    }

    async fn create(&self, title: &str, content: &str) -> RemoteResult<Note> {
        self.record(RemoteCall::Create {
            title: title.to_owned(),
            content: content.to_owned(),
        });
        next(&self.create)
    }

    async fn update(&self, id: &NoteId, title: &str, content: &str) -> RemoteResult<Note> {
        self.record(RemoteCall::Update {
            id: id.clone(),
            title: title.to_owned(),
            content: content.to_owned(),
        });
        next(&self.update)
    }

    async fn delete(&self, id: &NoteId) -> RemoteResult<()> {
        self.record(RemoteCall::Delete { id: id.clone() });
        next(&self.delete)
    }
}
