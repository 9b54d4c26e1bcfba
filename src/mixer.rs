//! The push mixer: triggering policy, peer exchange, and the locking
//! discipline that serializes local mutation against remote sync.
//!
//! One background task watches two independent thresholds (update count and
//! elapsed time). When either fires it refreshes membership, asks the
//! candidate filter for targets, and runs a bilateral exchange with each in
//! order. Operators can force a cycle at any time through `do_mix`.
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Instant;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::candidate::{AllPeers, CandidateFilter};
use crate::error::{QuillonError, Result};
use crate::membership::MembershipView;
use crate::mixable::SharedModel;
use crate::peer_client::PeerClient;
use crate::registry::NodeRegistry;
use crate::settings::MixSettings;

/// Upper bound on how long the scheduler sleeps between threshold checks.
pub const WAKE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug)]
struct MixerState {
    update_counter: u32,
    last_mix_time: Instant,
    mix_count: u64,
    running: bool,
}

/// Byte totals accumulated over one mix cycle.
#[derive(Debug, Default)]
struct CycleStats {
    pulled_bytes: usize,
    pushed_bytes: usize,
}

struct MixerInner {
    settings: MixSettings,
    comm: PeerClient,
    membership: MembershipView,
    filter: Box<dyn CandidateFilter>,
    model: OnceLock<SharedModel>,

    state: Mutex<MixerState>,
    update_signal: Arc<Notify>,
    // Serializes scheduler cycles against forced cycles; protects no data.
    cycle_lock: Mutex<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap cloneable handle to one node's push mixer.
#[derive(Clone)]
pub struct PushMixer {
    inner: Arc<MixerInner>,
}

impl PushMixer {
    /// Build a mixer over the given registry with the default
    /// all-peers candidate filter.
    pub fn new(settings: MixSettings, registry: Arc<dyn NodeRegistry>) -> Self {
        Self::with_filter(settings, registry, Box::new(AllPeers))
    }

    pub fn with_filter(
        settings: MixSettings,
        registry: Arc<dyn NodeRegistry>,
        filter: Box<dyn CandidateFilter>,
    ) -> Self {
        let membership = MembershipView::new(registry, settings.service.clone());
        let comm = PeerClient::new(settings.rpc_timeout);
        Self {
            inner: Arc::new(MixerInner {
                settings,
                comm,
                membership,
                filter,
                model: OnceLock::new(),
                state: Mutex::new(MixerState {
                    update_counter: 0,
                    last_mix_time: Instant::now(),
                    mix_count: 0,
                    running: false,
                }),
                update_signal: Arc::new(Notify::new()),
                cycle_lock: Mutex::new(()),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Wire the mixable before `start()`. Accepting only push-capable
    /// models is enforced by the handle type itself.
    pub fn set_mixable(&self, model: SharedModel) -> Result<()> {
        self.inner
            .model
            .set(model)
            .map_err(|_| QuillonError::Config("mixable already registered".to_string()))
    }

    fn model_handle(&self) -> Result<SharedModel> {
        self.inner
            .model
            .get()
            .cloned()
            .ok_or_else(|| QuillonError::Config("no mixable registered".to_string()))
    }

    /// Start the background scheduler. Calling twice is a no-op.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().await;
            if state.running {
                return Ok(());
            }
            if self.inner.model.get().is_none() {
                return Err(QuillonError::Config(
                    "cannot start mixer without a mixable".to_string(),
                ));
            }
            state.running = true;
            state.last_mix_time = Instant::now();
        }

        // The worker holds only a weak reference, so a mixer dropped
        // without stop() winds its scheduler down on the next wake.
        let weak = Arc::downgrade(&self.inner);
        let signal = self.inner.update_signal.clone();
        let handle = tokio::spawn(async move { scheduler_loop(weak, signal).await });
        *self.inner.worker.lock().await = Some(handle);
        info!(service = %self.inner.settings.service, "push mixer started");
        Ok(())
    }

    /// Stop the scheduler and wait for it to finish, including any cycle
    /// in flight. Safe to call repeatedly or before `start()`.
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state.lock().await;
            state.running = false;
        }
        self.inner.update_signal.notify_one();

        // Join outside the state lock so a mid-cycle worker can still
        // touch counters while we wait.
        let handle = self.inner.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                warn!(%error, "mix scheduler did not shut down cleanly");
            }
            info!("push mixer stopped");
        }

        // A forced cycle may still be mid-exchange; holding the cycle
        // lock for a moment blocks until it has returned.
        let _cycle = self.inner.cycle_lock.lock().await;
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.running
    }

    /// Record one local model update. Signals the scheduler when a
    /// threshold is crossed; the signal is advisory and the scheduler
    /// re-checks on wake.
    pub async fn notify_updated(&self) {
        let crossed = {
            let mut state = self.inner.state.lock().await;
            state.update_counter = state.update_counter.saturating_add(1);
            self.count_threshold_hit(&state) || self.tick_threshold_hit(&state, Instant::now())
        };
        if crossed {
            self.inner.update_signal.notify_one();
        }
    }

    /// Run one mix cycle immediately, ignoring thresholds. Returns whether
    /// the cycle ran to completion. Refused while the mixer is stopped.
    pub async fn do_mix(&self) -> bool {
        {
            let mut state = self.inner.state.lock().await;
            if !state.running {
                warn!("forced mix refused: mixer is not running");
                return false;
            }
            state.update_counter = 0;
            state.last_mix_time = Instant::now();
        }
        info!("forced to mix by operator request");
        match self.mix().await {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "forced mix failed");
                false
            }
        }
    }

    /// Counters for operator introspection.
    pub async fn status(&self) -> HashMap<String, String> {
        let state = self.inner.state.lock().await;
        let mut status = HashMap::new();
        status.insert(
            "push_mixer.count".to_string(),
            state.update_counter.to_string(),
        );
        status.insert(
            "push_mixer.ticktime".to_string(),
            state.last_mix_time.elapsed().as_secs().to_string(),
        );
        status.insert(
            "push_mixer.mix_count".to_string(),
            state.mix_count.to_string(),
        );
        status
    }

    pub async fn mix_count(&self) -> u64 {
        self.inner.state.lock().await.mix_count
    }

    pub async fn update_counter(&self) -> u32 {
        self.inner.state.lock().await.update_counter
    }

    fn count_threshold_hit(&self, state: &MixerState) -> bool {
        self.inner.settings.count_threshold > 0
            && state.update_counter >= self.inner.settings.count_threshold
    }

    fn tick_threshold_hit(&self, state: &MixerState, now: Instant) -> bool {
        !self.inner.settings.tick_threshold.is_zero()
            && now.duration_since(state.last_mix_time) > self.inner.settings.tick_threshold
    }

    /// One scheduler wake: re-check the predicate and run a cycle if a
    /// threshold fired. Returns false once the mixer is stopped.
    async fn poll_once(&self) -> bool {
        let fire = {
            let mut state = self.inner.state.lock().await;
            if !state.running {
                return false;
            }
            let now = Instant::now();
            let count_hit = self.count_threshold_hit(&state);
            let tick_hit = self.tick_threshold_hit(&state, now);
            if count_hit || tick_hit {
                debug!(
                    trigger = if count_hit { "counter" } else { "tick" },
                    "mix threshold crossed"
                );
                // Reset before releasing the lock so updates arriving
                // during the cycle count toward the next one.
                state.update_counter = 0;
                state.last_mix_time = now;
                true
            } else {
                false
            }
        };

        if fire {
            if let Err(error) = self.mix().await {
                warn!(%error, "mix cycle failed");
            }
        }
        true
    }

    /// One full mix cycle: refresh membership, select candidates, exchange
    /// with each in order. A peer failure aborts the remainder of the
    /// cycle; state already applied from earlier peers stays applied.
    async fn mix(&self) -> Result<()> {
        let _cycle = self.inner.cycle_lock.lock().await;
        let started = Instant::now();

        let peer_total = self.inner.membership.refresh().await?;
        if peer_total == 0 {
            warn!(service = %self.inner.settings.service, "no peers registered, skipping mix");
            return Ok(());
        }

        let peers = self.inner.membership.snapshot().await;
        let candidates = self.inner.filter.select(&peers);
        if candidates.is_empty() {
            warn!(peer_total, "no mix candidates selected");
            return Ok(());
        }

        info!(peers = candidates.len(), "mix cycle starting");
        let mut stats = CycleStats::default();
        for &peer in &candidates {
            if !self.is_running().await {
                debug!("mixer stopping, cutting mix cycle short");
                return Ok(());
            }
            if let Err(error) = self.exchange_with(*peer, &mut stats).await {
                warn!(%peer, %error, "peer exchange failed, aborting mix cycle");
                return Err(error);
            }
        }

        let mix_count = {
            let mut state = self.inner.state.lock().await;
            state.mix_count += 1;
            state.mix_count
        };
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            pulled_bytes = stats.pulled_bytes,
            pushed_bytes = stats.pushed_bytes,
            mix_count,
            "mix cycle done"
        );
        Ok(())
    }

    /// The six-step bilateral exchange with one peer. The model lock is
    /// scoped to the individual callbacks and never spans a peer RPC.
    async fn exchange_with(&self, peer: SocketAddr, stats: &mut CycleStats) -> Result<()> {
        let model = self.model_handle()?;

        let my_args = {
            let model = model.read().await;
            model.get_argument()?
        };
        let her_diff = self.inner.comm.pull(peer, &my_args).await?;
        let her_args = self.inner.comm.get_pull_argument(peer).await?;
        let my_diff = {
            let model = model.read().await;
            model.pull(&her_args)?
        };
        self.inner.comm.push(peer, &my_diff).await?;
        {
            let mut model = model.write().await;
            model.push(&her_diff)?;
        }

        stats.pulled_bytes += her_diff.len();
        stats.pushed_bytes += my_diff.len();
        Ok(())
    }

    /// Inbound `pull`: serialize a diff for the caller's argument.
    pub async fn handle_pull(&self, argument: &[u8]) -> Result<Vec<u8>> {
        let model = self.model_handle()?;
        let model = model.read().await;
        model.pull(argument)
    }

    /// Inbound `get_pull_argument`: serialize our current pull argument.
    pub async fn handle_get_pull_argument(&self) -> Result<Vec<u8>> {
        let model = self.model_handle()?;
        let model = model.read().await;
        model.get_argument()
    }

    /// Inbound `push`: apply the caller's diff, then reset the mix
    /// triggers since our model just absorbed a fresh exchange.
    pub async fn handle_push(&self, diff: &[u8]) -> Result<()> {
        let model = self.model_handle()?;
        {
            let mut model = model.write().await;
            model.push(diff)?;
        }
        let mut state = self.inner.state.lock().await;
        state.update_counter = 0;
        state.last_mix_time = Instant::now();
        Ok(())
    }
}

/// Background worker: bounded wait on the update signal, then one
/// predicate-checked poll. Exits when the mixer is stopped or every
/// strong handle to it is gone.
async fn scheduler_loop(inner: Weak<MixerInner>, signal: Arc<Notify>) {
    debug!("mix scheduler loop started");
    loop {
        let _ = timeout(WAKE_INTERVAL, signal.notified()).await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let mixer = PushMixer { inner };
        if !mixer.poll_once().await {
            break;
        }
    }
    debug!("mix scheduler loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixable::PushMixable;
    use crate::model::AveragedWeights;
    use crate::registry::StaticRegistry;
    use crate::settings::ServiceName;
    use tokio::sync::RwLock;

    fn gen_mix_settings() -> MixSettings {
        MixSettings {
            count_threshold: 3,
            tick_threshold: Duration::from_secs(3600),
            rpc_timeout: Duration::from_secs(1),
            self_id: "127.0.0.1:8631".parse().unwrap(),
            service: ServiceName::new("classifier", "default"),
        }
    }

    fn gen_mixer(settings: MixSettings) -> PushMixer {
        let registry = Arc::new(StaticRegistry::new(vec![]));
        let mixer = PushMixer::new(settings, registry);
        let model: SharedModel = Arc::new(RwLock::new(AveragedWeights::new(4)));
        mixer.set_mixable(model).unwrap();
        mixer
    }

    #[tokio::test]
    async fn test_start_requires_mixable() {
        let registry = Arc::new(StaticRegistry::new(vec![]));
        let mixer = PushMixer::new(gen_mix_settings(), registry);

        let err = mixer.start().await.unwrap_err();
        assert!(matches!(err, QuillonError::Config(_)));
    }

    #[tokio::test]
    async fn test_set_mixable_twice_rejected() {
        let mixer = gen_mixer(gen_mix_settings());
        let second: SharedModel = Arc::new(RwLock::new(AveragedWeights::new(4)));
        assert!(mixer.set_mixable(second).is_err());
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_twice_are_noops() {
        let mixer = gen_mixer(gen_mix_settings());

        mixer.start().await.unwrap();
        mixer.start().await.unwrap();
        assert!(mixer.is_running().await);

        mixer.stop().await;
        assert!(!mixer.is_running().await);
        mixer.stop().await;
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let mixer = gen_mixer(gen_mix_settings());
        mixer.stop().await;
        assert!(!mixer.is_running().await);
    }

    #[tokio::test]
    async fn test_notify_updated_counts() {
        let mixer = gen_mixer(gen_mix_settings());
        mixer.notify_updated().await;
        mixer.notify_updated().await;
        assert_eq!(mixer.update_counter().await, 2);
    }

    #[tokio::test]
    async fn test_status_keys() {
        let mixer = gen_mixer(gen_mix_settings());
        mixer.notify_updated().await;

        let status = mixer.status().await;
        assert_eq!(status.get("push_mixer.count"), Some(&"1".to_string()));
        assert!(status.contains_key("push_mixer.ticktime"));
        assert_eq!(status.get("push_mixer.mix_count"), Some(&"0".to_string()));
    }

    #[tokio::test]
    async fn test_do_mix_refused_while_stopped() {
        let mixer = gen_mixer(gen_mix_settings());
        mixer.notify_updated().await;

        assert!(!mixer.do_mix().await);
        // Counters untouched by the refused request.
        assert_eq!(mixer.update_counter().await, 1);
    }

    #[tokio::test]
    async fn test_do_mix_with_no_peers_completes() {
        let mixer = gen_mixer(gen_mix_settings());
        mixer.start().await.unwrap();
        mixer.notify_updated().await;

        // Zero peers: the cycle completes without doing work, but the
        // forced path still resets the counter.
        assert!(mixer.do_mix().await);
        assert_eq!(mixer.update_counter().await, 0);
        assert_eq!(mixer.mix_count().await, 0);

        mixer.stop().await;
    }

    #[tokio::test]
    async fn test_handle_push_resets_counter() {
        let mixer = gen_mixer(gen_mix_settings());
        mixer.notify_updated().await;
        mixer.notify_updated().await;

        let diff = {
            let model = AveragedWeights::new(4);
            let argument = model.get_argument().unwrap();
            model.pull(&argument).unwrap()
        };
        mixer.handle_push(&diff).await.unwrap();
        assert_eq!(mixer.update_counter().await, 0);
    }

    #[tokio::test]
    async fn test_inbound_handlers_roundtrip_payloads() {
        let mixer = gen_mixer(gen_mix_settings());

        let argument = mixer.handle_get_pull_argument().await.unwrap();
        let diff = mixer.handle_pull(&argument).await.unwrap();
        mixer.handle_push(&diff).await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_pull_rejects_garbage() {
        let mixer = gen_mixer(gen_mix_settings());
        let err = mixer.handle_pull(&[0xff; 12]).await.unwrap_err();
        assert!(matches!(err, QuillonError::Mixable(_)));
    }
}
