//! Scripted history backend.
//!
//! Responses are queued per `(team, page)` and consumed in order. Unscripted
//! requests fail with a 404. Optional seeded jitter adds a random latency to
//! every response so interleavings vary reproducibly across seeds.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use ars_client::{ClientError, HistorySource};
use ars_proto::{HistoryPage, Message, TeamId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

#[derive(Debug, Clone)]
enum Reply {
    Page(HistoryPage),
    Status(u16),
    Hang,
}

#[derive(Debug, Clone)]
struct Scripted {
    delay: Duration,
    reply: Reply,
}

#[derive(Debug, Default)]
struct Backend {
    replies: HashMap<(TeamId, u32), VecDeque<Scripted>>,
    requests: Vec<(TeamId, u32)>,
    jitter: Option<(ChaCha8Rng, Duration)>,
}

/// In-memory [`HistorySource`]. Clones share one script.
#[derive(Debug, Clone, Default)]
pub struct SimHistory {
    backend: Arc<Mutex<Backend>>,
}

impl SimHistory {
    /// Empty script; every request 404s.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add up to `max` of seeded random latency to every response.
    pub fn with_jitter(self, seed: u64, max: Duration) -> Self {
        self.lock().jitter = Some((ChaCha8Rng::seed_from_u64(seed), max));
        self
    }

    /// Answer the next request for `page` of `team` immediately.
    pub fn respond(&self, team: &TeamId, page: u32, messages: Vec<Message>, has_next: bool) {
        self.respond_after(team, page, Duration::ZERO, messages, has_next);
    }

    /// Answer the next request for `page` of `team` after `delay`.
    pub fn respond_after(
        &self,
        team: &TeamId,
        page: u32,
        delay: Duration,
        messages: Vec<Message>,
        has_next: bool,
    ) {
        let reply = Reply::Page(HistoryPage::new(messages, has_next));
        self.push(team, page, Scripted { delay, reply });
    }

    /// Fail the next request for `page` of `team` with HTTP `status`.
    pub fn fail(&self, team: &TeamId, page: u32, status: u16) {
        self.push(team, page, Scripted { delay: Duration::ZERO, reply: Reply::Status(status) });
    }

    /// Never answer the next request for `page` of `team`.
    pub fn hang(&self, team: &TeamId, page: u32) {
        self.push(team, page, Scripted { delay: Duration::ZERO, reply: Reply::Hang });
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<(TeamId, u32)> {
        self.lock().requests.clone()
    }

    fn push(&self, team: &TeamId, page: u32, scripted: Scripted) {
        self.lock().replies.entry((team.clone(), page)).or_default().push_back(scripted);
    }

    fn next(&self, team: &TeamId, page: u32) -> Scripted {
        let mut backend = self.lock();
        backend.requests.push((team.clone(), page));

        let mut scripted = backend
            .replies
            .get_mut(&(team.clone(), page))
            .and_then(VecDeque::pop_front)
            .unwrap_or(Scripted { delay: Duration::ZERO, reply: Reply::Status(404) });

        if let Some((rng, max)) = backend.jitter.as_mut() {
            let extra = rng.gen_range(0..=max.as_millis() as u64);
            scripted.delay += Duration::from_millis(extra);
        }
        scripted
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HistorySource for SimHistory {
    async fn fetch(&self, team: &TeamId, page: u32) -> Result<HistoryPage, ClientError> {
        let Scripted { delay, reply } = self.next(team, page);
        debug!(%team, page, ?delay, "sim history request");

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Reply::Page(page) => Ok(page),
            Reply::Status(status) => Err(ClientError::Status { status }),
            Reply::Hang => std::future::pending().await,
        }
    }
}
