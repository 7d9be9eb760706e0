//! Per-session push scheduling and cross-session fan-out.
//!
//! Every connected client gets one session: an outbound FIFO queue and a
//! dedicated push task that sends the one-shot system description, a forced
//! first snapshot, and then cached snapshots on a fixed interval. All
//! sessions read through the shared `SampleCache`, so adding sessions does
//! not add provider load. Engine events (a confirmed kill) are fanned out to
//! every live session by a single pump task.

use ahash::AHashMap as HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::SampleCache;
use crate::provider::MetricProvider;
use crate::snapshot::PushMessage;
use crate::terminate::EngineEvent;

pub type SessionId = u64;

struct Session {
    outbound: mpsc::Sender<PushMessage>,
    pusher: JoinHandle<()>,
}

/// Cheap-to-clone handle; all state lives behind one shared allocation so
/// push tasks and the event pump see the same registry.
#[derive(Clone)]
pub struct SessionBroadcaster {
    inner: Arc<Inner>,
}

struct Inner {
    sessions: Mutex<HashMap<SessionId, Session>>,
    next_id: AtomicU64,
    cache: Arc<SampleCache>,
    provider: Arc<dyn MetricProvider>,
    push_interval: Duration,
}

impl SessionBroadcaster {
    pub fn new(
        cache: Arc<SampleCache>,
        provider: Arc<dyn MetricProvider>,
        push_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                cache,
                provider,
                push_interval,
            }),
        }
    }

    /// Spawn the pump translating engine events into fan-out pushes. On a
    /// confirmed kill every session hears about the pid, then everyone gets
    /// the recomputed process list: one coalesced refresh, not one per
    /// session.
    pub fn start_event_pump(
        &self,
        mut events: broadcast::Receiver<EngineEvent>,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(EngineEvent::ProcessKilled { pid }) => {
                        info!(pid, "fanning out kill notification");
                        inner.broadcast(PushMessage::ProcessKilled { pid }).await;
                        let records = inner.cache.processes(false).await;
                        inner.broadcast(PushMessage::ProcessData(records)).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event pump lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Register a connected client and start its push loop.
    pub async fn register(&self, outbound: mpsc::Sender<PushMessage>) -> SessionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let queue = outbound.clone();
        let pusher = tokio::spawn(push_loop(inner, id, queue));
        self.inner
            .sessions
            .lock()
            .await
            .insert(id, Session { outbound, pusher });
        info!(session = id, "session registered");
        id
    }

    /// Tear a session down deterministically: once this returns, the session
    /// is out of the registry and its push task is cancelled, so it never
    /// receives another push.
    pub async fn unregister(&self, id: SessionId) {
        self.inner.unregister(id).await;
    }

    /// Explicit pull: refresh the process view through the cache (coalesced
    /// with any other in-flight pull) and push it to the requester only.
    pub async fn request_processes(&self, id: SessionId) {
        let records = self.inner.cache.processes(false).await;
        let outbound = {
            self.inner
                .sessions
                .lock()
                .await
                .get(&id)
                .map(|s| s.outbound.clone())
        };
        if let Some(outbound) = outbound {
            if outbound
                .send(PushMessage::ProcessData(records))
                .await
                .is_err()
            {
                self.inner.unregister(id).await;
            }
        }
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.lock().await.len()
    }
}

impl Inner {
    async fn unregister(&self, id: SessionId) {
        if let Some(session) = self.sessions.lock().await.remove(&id) {
            session.pusher.abort();
            info!(session = id, "session closed");
        }
    }

    /// Push one message to every live session. Closed sessions found along
    /// the way are removed afterwards.
    async fn broadcast(&self, message: PushMessage) {
        use tokio::sync::mpsc::error::TrySendError;

        let mut dead = Vec::new();
        {
            let sessions = self.sessions.lock().await;
            for (id, session) in sessions.iter() {
                match session.outbound.try_send(message.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(session = *id, "outbound queue full, dropping broadcast");
                    }
                    Err(TrySendError::Closed(_)) => dead.push(*id),
                }
            }
        }
        for id in dead {
            self.unregister(id).await;
        }
    }
}

/// One session's scheduled stream: description once, a forced snapshot, then
/// cached snapshots every tick until the client goes away. The single queue
/// keeps snapshots in sampling order. Registry cleanup happens at the
/// transport layer (or lazily on the next broadcast), so a loop that ends
/// here just stops pushing.
async fn push_loop(inner: Arc<Inner>, id: SessionId, outbound: mpsc::Sender<PushMessage>) {
    match inner.provider.description().await {
        Ok(desc) => {
            if outbound.send(PushMessage::SystemInfo(desc)).await.is_err() {
                return;
            }
        }
        Err(e) => warn!(session = id, "system description unavailable: {e}"),
    }

    let snapshot = inner.cache.metrics(true).await;
    if outbound.send(PushMessage::Metrics(snapshot)).await.is_err() {
        return;
    }

    let mut ticker = interval(inner.push_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the forced snapshot above
    // already covered it.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if outbound.is_closed() {
            break;
        }
        let snapshot = inner.cache.metrics(false).await;
        if outbound.send(PushMessage::Metrics(snapshot)).await.is_err() {
            break;
        }
    }
    debug!(session = id, "push loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processes::ProcessSnapshotter;
    use crate::provider::mock::MockProvider;

    const INTERVAL: Duration = Duration::from_millis(1_000);

    fn engine(provider: Arc<MockProvider>) -> SessionBroadcaster {
        let cache = Arc::new(SampleCache::new(
            provider.clone(),
            ProcessSnapshotter::default(),
            Duration::from_millis(500),
            Duration::from_secs(30),
        ));
        SessionBroadcaster::new(cache, provider, INTERVAL)
    }

    async fn recv(rx: &mut mpsc::Receiver<PushMessage>) -> PushMessage {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("push not delivered in time")
            .expect("session channel closed")
    }

    #[tokio::test(start_paused = true)]
    async fn session_gets_description_forced_snapshot_then_ticks() {
        let broadcaster = engine(Arc::new(MockProvider::new()));
        let (tx, mut rx) = mpsc::channel(32);
        broadcaster.register(tx).await;

        assert!(matches!(recv(&mut rx).await, PushMessage::SystemInfo(_)));
        assert!(matches!(recv(&mut rx).await, PushMessage::Metrics(_)));
        // Periodic pushes keep coming on the timer.
        assert!(matches!(recv(&mut rx).await, PushMessage::Metrics(_)));
        assert!(matches!(recv(&mut rx).await, PushMessage::Metrics(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnecting_one_session_leaves_the_other_on_schedule() {
        let broadcaster = engine(Arc::new(MockProvider::new()));
        let (tx_a, mut rx_a) = mpsc::channel(32);
        let (tx_b, mut rx_b) = mpsc::channel(32);
        let a = broadcaster.register(tx_a).await;
        broadcaster.register(tx_b).await;

        // Both streams are live.
        assert!(matches!(recv(&mut rx_a).await, PushMessage::SystemInfo(_)));
        assert!(matches!(recv(&mut rx_b).await, PushMessage::SystemInfo(_)));
        assert!(matches!(recv(&mut rx_a).await, PushMessage::Metrics(_)));
        assert!(matches!(recv(&mut rx_b).await, PushMessage::Metrics(_)));

        broadcaster.unregister(a).await;
        assert_eq!(broadcaster.session_count().await, 1);

        // B keeps its schedule.
        assert!(matches!(recv(&mut rx_b).await, PushMessage::Metrics(_)));
        assert!(matches!(recv(&mut rx_b).await, PushMessage::Metrics(_)));

        // A's queue drains to closure without ever seeing another push.
        let leftover = tokio::time::timeout(Duration::from_secs(5), rx_a.recv()).await;
        assert!(matches!(leftover, Ok(None) | Err(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn kill_event_reaches_every_session_with_fresh_process_data() {
        let provider = Arc::new(MockProvider::new());
        let broadcaster = engine(provider);
        let (events_tx, _) = broadcast::channel(16);
        broadcaster.start_event_pump(events_tx.subscribe());

        let (tx_a, mut rx_a) = mpsc::channel(32);
        let (tx_b, mut rx_b) = mpsc::channel(32);
        broadcaster.register(tx_a).await;
        broadcaster.register(tx_b).await;

        // Let both sessions get their initial pushes out of the way.
        assert!(matches!(recv(&mut rx_a).await, PushMessage::SystemInfo(_)));
        assert!(matches!(recv(&mut rx_b).await, PushMessage::SystemInfo(_)));
        assert!(matches!(recv(&mut rx_a).await, PushMessage::Metrics(_)));
        assert!(matches!(recv(&mut rx_b).await, PushMessage::Metrics(_)));

        events_tx
            .send(EngineEvent::ProcessKilled { pid: 4321 })
            .unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            loop {
                match recv(rx).await {
                    PushMessage::ProcessKilled { pid } => {
                        assert_eq!(pid, 4321);
                        break;
                    }
                    PushMessage::Metrics(_) => continue, // timer pushes interleave
                    other => panic!("unexpected push before kill notice: {other:?}"),
                }
            }
            loop {
                match recv(rx).await {
                    PushMessage::ProcessData(_) => break,
                    PushMessage::Metrics(_) => continue,
                    other => panic!("unexpected push after kill notice: {other:?}"),
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_pulls_share_one_refresh() {
        let provider = Arc::new(MockProvider::new());
        *provider.query_delay.lock().unwrap() = Duration::from_millis(50);
        let broadcaster = engine(provider.clone());

        let (tx_a, _rx_a) = mpsc::channel(32);
        let (tx_b, _rx_b) = mpsc::channel(32);
        let a = broadcaster.register(tx_a).await;
        let b = broadcaster.register(tx_b).await;

        tokio::join!(
            broadcaster.request_processes(a),
            broadcaster.request_processes(b),
        );

        assert_eq!(
            provider
                .process_calls
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }
}
