//! In-memory collaborators shared by the unit tests in this crate.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{Duration, Utc};

use meshrelay_types::conversation::{HistoryStats, Role, Summary, Turn};
use meshrelay_types::error::{RepositoryError, TransportError};
use meshrelay_types::llm::{GenerateRequest, LlmError};
use meshrelay_types::message::{Destination, InboundMessage};

use crate::llm::LlmBackend;
use crate::repository::{HistoryRepository, SummaryRepository};
use crate::transport::Transport;

/// `n` alternating user/assistant turns, `message 1` .. `message n`.
pub fn turns(user_id: &str, n: usize) -> Vec<Turn> {
    let base = Utc::now();
    (1..=n)
        .map(|i| Turn {
            id: i as i64,
            user_id: user_id.to_string(),
            role: if i % 2 == 1 { Role::User } else { Role::Assistant },
            content: format!("message {i}"),
            timestamp: base + Duration::milliseconds(i as i64),
        })
        .collect()
}

#[derive(Default)]
pub struct InMemoryHistory {
    turns: Mutex<Vec<Turn>>,
    fail_appends: AtomicBool,
}

impl InMemoryHistory {
    pub fn fail_appends(&self) {
        self.fail_appends.store(true, Ordering::SeqCst);
    }
}

impl HistoryRepository for InMemoryHistory {
    fn append_turn(
        &self,
        user_id: &str,
        role: Role,
        content: &str,
    ) -> impl Future<Output = Result<i64, RepositoryError>> + Send {
        let result = if self.fail_appends.load(Ordering::SeqCst) {
            Err(RepositoryError::Query("disk I/O error".to_string()))
        } else {
            let mut turns = self.turns.lock().unwrap();
            let id = turns.len() as i64 + 1;
            turns.push(Turn {
                id,
                user_id: user_id.to_string(),
                role,
                content: content.to_string(),
                timestamp: Utc::now(),
            });
            Ok(id)
        };
        async move { result }
    }

    fn get_history(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<Turn>, RepositoryError>> + Send {
        let mut history: Vec<Turn> = self
            .turns
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| (a.timestamp, a.id).cmp(&(b.timestamp, b.id)));
        async move { Ok(history) }
    }

    fn clear_history(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send {
        let mut turns = self.turns.lock().unwrap();
        let before = turns.len();
        turns.retain(|t| t.user_id != user_id);
        let removed = (before - turns.len()) as u64;
        async move { Ok(removed) }
    }

    fn stats(&self) -> impl Future<Output = Result<HistoryStats, RepositoryError>> + Send {
        let turns = self.turns.lock().unwrap();
        let mut users: Vec<&str> = turns.iter().map(|t| t.user_id.as_str()).collect();
        users.sort_unstable();
        users.dedup();
        let stats = HistoryStats {
            total_turns: turns.len() as u64,
            unique_users: users.len() as u64,
            oldest_turn_at: turns.iter().map(|t| t.timestamp).min(),
        };
        async move { Ok(stats) }
    }
}

#[derive(Default)]
pub struct InMemorySummaries {
    rows: Mutex<Vec<Summary>>,
}

impl InMemorySummaries {
    pub fn put(&self, summary: Summary) {
        let mut rows = self.rows.lock().unwrap();
        rows.retain(|s| s.user_id != summary.user_id);
        rows.push(summary);
    }

    pub fn get(&self, user_id: &str) -> Option<Summary> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.user_id == user_id)
            .cloned()
    }
}

impl SummaryRepository for InMemorySummaries {
    fn store_summary(
        &self,
        summary: &Summary,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send {
        self.put(summary.clone());
        async { Ok(()) }
    }

    fn get_summary(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<Summary>, RepositoryError>> + Send {
        let found = self.get(user_id);
        async move { Ok(found) }
    }

    fn clear_summary(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|s| s.user_id != user_id);
        let existed = rows.len() != before;
        async move { Ok(existed) }
    }

    fn list_summaries(&self) -> impl Future<Output = Result<Vec<Summary>, RepositoryError>> + Send {
        let rows = self.rows.lock().unwrap().clone();
        async move { Ok(rows) }
    }
}

/// Backend that replays a script, then repeats a default answer.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    default: Result<String, LlmError>,
    requests: Mutex<Vec<GenerateRequest>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn replying(text: &str) -> Self {
        Self::with_default(Ok(text.to_string()))
    }

    pub fn failing(err: LlmError) -> Self {
        Self::with_default(Err(err))
    }

    fn with_default(default: Result<String, LlmError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answers used, in order, before falling back to the default.
    pub fn then(self, answers: Vec<Result<String, LlmError>>) -> Self {
        self.script.lock().unwrap().extend(answers);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(
        &self,
        request: &GenerateRequest,
    ) -> impl Future<Output = Result<String, LlmError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let answer = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());
        async move { answer }
    }
}

/// Transport that records sends and replays queued inbound messages.
pub struct RecordingTransport {
    own_id: String,
    inbound: Mutex<VecDeque<InboundMessage>>,
    sent: Mutex<Vec<(Destination, String)>>,
    fail_after: Option<usize>,
}

impl RecordingTransport {
    pub fn new(own_id: &str) -> Self {
        Self {
            own_id: own_id.to_string(),
            inbound: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            fail_after: None,
        }
    }

    /// Reject every send after the first `n` succeed.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn push_inbound(&self, msg: InboundMessage) {
        self.inbound.lock().unwrap().push_back(msg);
    }

    pub fn sent(&self) -> Vec<(Destination, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, text)| text).collect()
    }
}

impl Transport for RecordingTransport {
    fn own_id(&self) -> &str {
        &self.own_id
    }

    fn receive(
        &self,
    ) -> impl Future<Output = Result<Option<InboundMessage>, TransportError>> + Send {
        let next = self.inbound.lock().unwrap().pop_front();
        async move { Ok(next) }
    }

    fn send(
        &self,
        destination: &Destination,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let mut sent = self.sent.lock().unwrap();
        let result = if self.fail_after.is_some_and(|n| sent.len() >= n) {
            Err(TransportError::Rejected("queue full".to_string()))
        } else {
            sent.push((destination.clone(), text.to_string()));
            Ok(())
        };
        async move { result }
    }
}
