//! Admission scheduler: one ordered pipeline for every translation request
//!
//! All requests pass through a single queue drained by one worker task, so
//! quota accounting and cache mutation never interleave between requests.
//! Provider calls are the only awaits inside processing; the worker does not
//! move to the next queued item until the current one (including its single
//! failover retry) has resolved.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::core::config::RelayConfig;
use crate::core::errors::{QuotaScope, RelayError, Result};
use crate::core::models::{TranslationOutcome, TranslationRequest};
use crate::providers::{DeepLClient, GeminiClient, MockTranslator, TranslationBackend};
use crate::quota::{LedgerSnapshot, QuotaLedger, RateLimiter, UnitLimiter};
use crate::relay::cache::{CacheKey, ResultCache};
use crate::relay::pool::{Credential, CredentialPool, PoolStatus};

/// A request waiting in the admission queue, with its reply channel
#[derive(Debug)]
pub struct PendingRequest {
    /// Opaque caller handle, used for coalescing and reply delivery
    pub caller: u64,
    pub request: TranslationRequest,
    pub reply: mpsc::UnboundedSender<TranslationOutcome>,
}

/// Provider readiness flags reported on session setup
#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    pub volume_ready: bool,
    pub count_ready: bool,
    pub mock_mode: bool,
}

struct QueueState {
    pending: VecDeque<PendingRequest>,
    worker_active: bool,
}

/// Everything only the worker mutates: quota state, cache, ledger
struct CoreState {
    cache: ResultCache,
    unit_limiter: UnitLimiter,
    pool: CredentialPool,
    ledger: QuotaLedger,
}

struct Inner {
    mock: Option<Arc<dyn TranslationBackend>>,
    volume: Option<Arc<dyn TranslationBackend>>,
    credential_count: usize,
    queue: Mutex<QueueState>,
    state: Mutex<CoreState>,
}

/// The admission scheduler, explicitly constructed with its pool, limiters,
/// cache and queue; one instance per process, nothing global
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Build from configuration: real provider clients, ledger state merged
    /// from disk
    pub fn new(config: RelayConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let ledger = QuotaLedger::new(config.ledger_path.clone());
        let snapshot = ledger.load();
        let now = Utc::now();

        let volume: Option<Arc<dyn TranslationBackend>> = match &config.deepl_api_key {
            Some(key) if !config.mock_mode => Some(Arc::new(DeepLClient::new(
                key.clone(),
                config.deepl_endpoint.clone(),
                config.timeout(),
            )?)),
            _ => None,
        };

        let mut credentials = Vec::new();
        if !config.mock_mode {
            for (index, key) in config.gemini_api_keys.iter().enumerate() {
                let client = GeminiClient::new(
                    key.clone(),
                    config.gemini_endpoint.clone(),
                    config.gemini_model.clone(),
                    config.timeout(),
                )?;
                credentials.push(Credential {
                    name: format!("gemini-{index}"),
                    limiter: RateLimiter::new(
                        config.short_window_limit,
                        config.short_window(),
                        config.long_window_limit,
                        config.long_window(),
                    ),
                    backend: Arc::new(client),
                });
            }
        }

        let mut pool = CredentialPool::new(credentials);
        pool.restore(&snapshot.credentials, now);

        let mut unit_limiter = UnitLimiter::new(config.monthly_char_limit);
        if let Some(volume_quota) = &snapshot.volume {
            unit_limiter.restore(volume_quota);
        }

        info!(
            credentials = pool.len(),
            volume_ready = volume.is_some(),
            mock = config.mock_mode,
            "scheduler ready"
        );

        Ok(Self::assemble(config, volume, pool, unit_limiter, ledger))
    }

    /// Dependency-injected constructor; `new` and the tests both go through
    /// here
    pub fn assemble(
        config: RelayConfig,
        volume: Option<Arc<dyn TranslationBackend>>,
        pool: CredentialPool,
        unit_limiter: UnitLimiter,
        ledger: QuotaLedger,
    ) -> Self {
        let mock: Option<Arc<dyn TranslationBackend>> = config
            .mock_mode
            .then(|| Arc::new(MockTranslator::new()) as Arc<dyn TranslationBackend>);

        Self {
            inner: Arc::new(Inner {
                mock,
                volume,
                credential_count: pool.len(),
                queue: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    worker_active: false,
                }),
                state: Mutex::new(CoreState {
                    cache: ResultCache::new(config.cache_capacity),
                    unit_limiter,
                    pool,
                    ledger,
                }),
            }),
        }
    }

    /// Provider readiness for the session handshake
    pub fn readiness(&self) -> Readiness {
        let mock = self.inner.mock.is_some();
        Readiness {
            volume_ready: mock || self.inner.volume.is_some(),
            count_ready: mock || self.inner.credential_count > 0,
            mock_mode: mock,
        }
    }

    /// Add a request to the queue, coalescing with any queued-but-unstarted
    /// request from the same caller, and wake the worker if idle
    pub async fn enqueue(&self, pending: PendingRequest) {
        let mut queue = self.inner.queue.lock().await;

        if let Some(slot) = queue
            .pending
            .iter_mut()
            .find(|p| p.caller == pending.caller)
        {
            debug!(caller = pending.caller, "coalesced queued request");
            *slot = pending;
        } else {
            queue.pending.push_back(pending);
        }

        if !queue.worker_active {
            queue.worker_active = true;
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                Inner::run_worker(inner).await;
            });
        }
    }
}

impl Inner {
    /// Single active worker: strictly serial, one request to completion at a
    /// time; a failure never aborts the loop
    async fn run_worker(inner: Arc<Inner>) {
        loop {
            let next = {
                let mut queue = inner.queue.lock().await;
                match queue.pending.pop_front() {
                    Some(pending) => Some(pending),
                    None => {
                        queue.worker_active = false;
                        None
                    }
                }
            };

            let Some(pending) = next else { break };

            match inner.process(&pending.request).await {
                Ok(text) => {
                    let _ = pending
                        .reply
                        .send(TranslationOutcome::Translated { text });
                }
                // empty input represents no real request and stays silent
                Err(RelayError::EmptyInput) => {}
                Err(err) => {
                    warn!(caller = pending.caller, "translation failed: {err}");
                    let _ = pending.reply.send(TranslationOutcome::Failed(err));
                }
            }
        }
    }

    /// Drive one request through cache lookup, routing, quota check,
    /// provider call and the single failover retry
    async fn process(&self, request: &TranslationRequest) -> Result<String> {
        if request.text.trim().is_empty() {
            return Err(RelayError::EmptyInput);
        }

        let key = CacheKey::of(request);
        let mut state = self.state.lock().await;

        if let Some(hit) = state.cache.get(&key) {
            debug!("cache hit");
            return Ok(hit.to_string());
        }

        let translated = if let Some(mock) = &self.mock {
            mock.translate(request).await?
        } else if request.style.is_none() {
            self.translate_volume(&mut state, request).await?
        } else {
            self.translate_pooled(&mut state, request).await?
        };

        state.cache.put(key, translated.clone());
        Ok(translated)
    }

    /// Volume-billed route: admission check against the monthly character
    /// budget, then a single provider call
    async fn translate_volume(
        &self,
        state: &mut CoreState,
        request: &TranslationRequest,
    ) -> Result<String> {
        let Some(volume) = &self.volume else {
            return Err(RelayError::ProviderUnavailable {
                provider: "volume".to_string(),
            });
        };

        let units = request.unit_count();
        let verdict = state.unit_limiter.check_at(units, Utc::now());
        if !verdict.allowed {
            return Err(RelayError::QuotaExceeded {
                scope: QuotaScope::Monthly,
                wait: Some(verdict.reset_in),
                remaining: verdict.remaining,
            });
        }

        match volume.translate(request).await {
            Ok(text) => {
                state.unit_limiter.record_at(units, Utc::now());
                self.flush_ledger(state);
                Ok(text)
            }
            // the remote disagrees with local accounting; surface as quota
            Err(RelayError::RemoteRateLimited { .. }) => Err(RelayError::QuotaExceeded {
                scope: QuotaScope::Monthly,
                wait: Some(verdict.reset_in),
                remaining: verdict.remaining,
            }),
            Err(err) => Err(err),
        }
    }

    /// Request-count route: pool-level admission check, credential
    /// selection, and exactly one retry on a different credential when the
    /// remote refuses with a quota error
    async fn translate_pooled(
        &self,
        state: &mut CoreState,
        request: &TranslationRequest,
    ) -> Result<String> {
        if state.pool.is_empty() {
            return Err(RelayError::ProviderUnavailable {
                provider: "count".to_string(),
            });
        }

        let status = state.pool.aggregate_status_at(Utc::now());
        if !status.allowed {
            return Err(Self::quota_error(status));
        }

        let Some(first) = state.pool.select_available_at(Utc::now(), None) else {
            return Err(self.pool_exhausted(state));
        };

        let backend = Arc::clone(&state.pool.credential(first).backend);
        match backend.translate(request).await {
            Ok(text) => {
                state.pool.record_at(first, Utc::now());
                self.flush_ledger(state);
                Ok(text)
            }
            Err(err) if err.is_quota_shaped() => {
                // keep local state pessimistic and consistent with the
                // remote truth before rotating
                warn!(
                    credential = %state.pool.credential(first).name,
                    "remote quota refusal, rotating credential"
                );
                state.pool.record_at(first, Utc::now());
                self.flush_ledger(state);
                self.retry_on_other_credential(state, request, first).await
            }
            Err(err) => Err(err),
        }
    }

    /// The single failover retry; a second quota refusal is terminal
    async fn retry_on_other_credential(
        &self,
        state: &mut CoreState,
        request: &TranslationRequest,
        failed: usize,
    ) -> Result<String> {
        let Some(next) = state.pool.select_available_at(Utc::now(), Some(failed)) else {
            return Err(self.pool_exhausted(state));
        };

        let backend = Arc::clone(&state.pool.credential(next).backend);
        match backend.translate(request).await {
            Ok(text) => {
                state.pool.record_at(next, Utc::now());
                self.flush_ledger(state);
                Ok(text)
            }
            Err(err) if err.is_quota_shaped() => {
                state.pool.record_at(next, Utc::now());
                self.flush_ledger(state);
                Err(self.pool_exhausted(state))
            }
            Err(err) => Err(err),
        }
    }

    /// Re-check the pool and build the exhaustion error; used where quota
    /// state changed since the last aggregate check
    fn pool_exhausted(&self, state: &mut CoreState) -> RelayError {
        Self::quota_error(state.pool.aggregate_status_at(Utc::now()))
    }

    /// Build the quota error for a fully exhausted pool, naming the binding
    /// window and the minimum wait until capacity frees
    fn quota_error(status: PoolStatus) -> RelayError {
        let scope = if status.daily_bound {
            QuotaScope::LongWindow
        } else {
            QuotaScope::ShortWindow
        };
        RelayError::QuotaExceeded {
            scope,
            wait: status.min_wait,
            remaining: match scope {
                QuotaScope::LongWindow => status.total_long_remaining,
                _ => status.total_short_remaining,
            },
        }
    }

    /// Write-through persistence after every consumption; a failed flush is
    /// logged, not fatal to the translation
    fn flush_ledger(&self, state: &mut CoreState) {
        let snapshot = LedgerSnapshot {
            credentials: state.pool.snapshot(),
            volume: Some(state.unit_limiter.snapshot()),
        };
        if let Err(e) = state.ledger.save(&snapshot) {
            warn!("failed to persist quota ledger: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    /// Counts calls and records the texts it saw, in order
    #[derive(Debug, Default)]
    struct CountingBackend {
        calls: AtomicUsize,
        seen: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TranslationBackend for CountingBackend {
        async fn translate(&self, request: &TranslationRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.text.clone());
            Ok(format!("tx:{}", request.text))
        }
    }

    /// Blocks each call until a permit is released by the test
    #[derive(Debug)]
    struct GatedBackend {
        gate: Semaphore,
        calls: AtomicUsize,
        seen: std::sync::Mutex<Vec<String>>,
    }

    impl GatedBackend {
        fn new() -> Self {
            Self {
                gate: Semaphore::new(0),
                calls: AtomicUsize::new(0),
                seen: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TranslationBackend for GatedBackend {
        async fn translate(&self, request: &TranslationRequest) -> Result<String> {
            let permit = self.gate.acquire().await.unwrap();
            permit.forget();
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.text.clone());
            Ok(format!("tx:{}", request.text))
        }
    }

    /// Always refuses with a remote quota error
    #[derive(Debug, Default)]
    struct QuotaRefusingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TranslationBackend for QuotaRefusingBackend {
        async fn translate(&self, _request: &TranslationRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RelayError::RemoteRateLimited { retry_after: None })
        }
    }

    fn test_config(dir: &tempfile::TempDir) -> RelayConfig {
        RelayConfig {
            ledger_path: dir.path().join("ledger.json"),
            ..Default::default()
        }
    }

    fn credential(
        name: &str,
        short_limit: usize,
        backend: Arc<dyn TranslationBackend>,
    ) -> Credential {
        Credential {
            name: name.to_string(),
            limiter: RateLimiter::new(
                short_limit,
                Duration::from_secs(60),
                1000,
                Duration::from_secs(86_400),
            ),
            backend,
        }
    }

    fn volume_scheduler(
        dir: &tempfile::TempDir,
        backend: Arc<dyn TranslationBackend>,
        monthly_limit: usize,
    ) -> Scheduler {
        let config = RelayConfig {
            monthly_char_limit: monthly_limit,
            ..test_config(dir)
        };
        let ledger = QuotaLedger::new(config.ledger_path.clone());
        Scheduler::assemble(
            config,
            Some(backend),
            CredentialPool::new(vec![]),
            UnitLimiter::new(monthly_limit),
            ledger,
        )
    }

    fn pooled_scheduler(dir: &tempfile::TempDir, credentials: Vec<Credential>) -> Scheduler {
        let config = test_config(dir);
        let ledger = QuotaLedger::new(config.ledger_path.clone());
        Scheduler::assemble(
            config,
            None,
            CredentialPool::new(credentials),
            UnitLimiter::new(500_000),
            ledger,
        )
    }

    fn pending(
        caller: u64,
        text: &str,
        reply: &mpsc::UnboundedSender<TranslationOutcome>,
    ) -> PendingRequest {
        PendingRequest {
            caller,
            request: TranslationRequest::new(text, "Japanese", "English"),
            reply: reply.clone(),
        }
    }

    fn styled(mut p: PendingRequest) -> PendingRequest {
        p.request.style = Some(crate::core::models::CaptionStyle::Cute);
        p
    }

    #[tokio::test]
    async fn test_cache_idempotence_single_provider_call() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(CountingBackend::default());
        let scheduler = volume_scheduler(&dir, backend.clone(), 500_000);
        let (tx, mut rx) = mpsc::unbounded_channel();

        scheduler.enqueue(pending(1, "こんにちは", &tx)).await;
        let first = rx.recv().await.unwrap();

        scheduler.enqueue(pending(1, "こんにちは", &tx)).await;
        let second = rx.recv().await.unwrap();

        let (TranslationOutcome::Translated { text: a }, TranslationOutcome::Translated { text: b }) =
            (first, second)
        else {
            panic!("expected two translations");
        };
        assert_eq!(a, "tx:こんにちは");
        assert_eq!(a, b);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_input_is_silently_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(CountingBackend::default());
        let scheduler = volume_scheduler(&dir, backend.clone(), 500_000);
        let (tx, mut rx) = mpsc::unbounded_channel();

        scheduler.enqueue(pending(1, "   ", &tx)).await;
        scheduler.enqueue(pending(2, "hello", &tx)).await;

        // the only outcome is for the real request
        let outcome = rx.recv().await.unwrap();
        let TranslationOutcome::Translated { text } = outcome else {
            panic!("expected a translation");
        };
        assert_eq!(text, "tx:hello");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_coalescing_replaces_queued_request() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(GatedBackend::new());
        let scheduler = volume_scheduler(&dir, backend.clone(), 500_000);
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        // worker picks up A and blocks inside the provider call
        scheduler.enqueue(pending(1, "a", &tx_a)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // B queues twice before the worker reaches it; the second replaces
        // the first in place
        scheduler.enqueue(pending(2, "b1", &tx_b)).await;
        scheduler.enqueue(pending(2, "b2", &tx_b)).await;

        backend.gate.add_permits(1);
        let TranslationOutcome::Translated { text } = rx_a.recv().await.unwrap() else {
            panic!("expected a translation for caller 1");
        };
        assert_eq!(text, "tx:a");

        backend.gate.add_permits(1);
        let TranslationOutcome::Translated { text } = rx_b.recv().await.unwrap() else {
            panic!("expected a translation for caller 2");
        };
        assert_eq!(text, "tx:b2");

        // exactly one provider call for caller 2, with the newer payload
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(*backend.seen.lock().unwrap(), vec!["a", "b2"]);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_serial_ordering_between_callers() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(GatedBackend::new());
        let scheduler = volume_scheduler(&dir, backend.clone(), 500_000);
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        scheduler.enqueue(pending(1, "a", &tx_a)).await;
        scheduler.enqueue(pending(2, "b", &tx_b)).await;

        backend.gate.add_permits(1);
        let outcome_a = rx_a.recv().await.unwrap();
        assert!(matches!(outcome_a, TranslationOutcome::Translated { .. }));

        // A's outcome arrived before B's provider call began
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(rx_b.try_recv().is_err());

        backend.gate.add_permits(1);
        let outcome_b = rx_b.recv().await.unwrap();
        assert!(matches!(outcome_b, TranslationOutcome::Translated { .. }));
        assert_eq!(*backend.seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_monthly_quota_rejected_without_provider_call() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(CountingBackend::default());
        let scheduler = volume_scheduler(&dir, backend.clone(), 3);
        let (tx, mut rx) = mpsc::unbounded_channel();

        scheduler.enqueue(pending(1, "0123456789", &tx)).await;
        let outcome = rx.recv().await.unwrap();

        let TranslationOutcome::Failed(RelayError::QuotaExceeded { scope, wait, .. }) = outcome
        else {
            panic!("expected a quota failure");
        };
        assert_eq!(scope, QuotaScope::Monthly);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        // the budget frees at the month boundary, and the caller is told so
        let wait = wait.expect("monthly rejection carries a wait estimate");
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(31 * 24 * 3600));
    }

    #[tokio::test]
    async fn test_in_flight_request_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(GatedBackend::new());
        let scheduler = volume_scheduler(&dir, backend.clone(), 500_000);
        let (tx, mut rx) = mpsc::unbounded_channel();

        // worker picks up the first request and blocks inside the call
        scheduler.enqueue(pending(1, "first", &tx)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // same caller again while the first is in flight: this one queues,
        // it does not supersede the one being processed
        scheduler.enqueue(pending(1, "second", &tx)).await;

        backend.gate.add_permits(2);
        let TranslationOutcome::Translated { text } = rx.recv().await.unwrap() else {
            panic!("expected a translation for the in-flight request");
        };
        assert_eq!(text, "tx:first");
        let TranslationOutcome::Translated { text } = rx.recv().await.unwrap() else {
            panic!("expected a translation for the queued request");
        };
        assert_eq!(text, "tx:second");

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(*backend.seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_credential_failover_retries_once() {
        let dir = tempfile::tempdir().unwrap();
        let refusing = Arc::new(QuotaRefusingBackend::default());
        let good = Arc::new(CountingBackend::default());
        let scheduler = pooled_scheduler(
            &dir,
            vec![
                credential("key-0", 5, refusing.clone()),
                credential("key-1", 5, good.clone()),
            ],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        scheduler.enqueue(styled(pending(1, "hello", &tx))).await;
        let outcome = rx.recv().await.unwrap();

        let TranslationOutcome::Translated { text } = outcome else {
            panic!("expected the retry to succeed");
        };
        assert_eq!(text, "tx:hello");
        assert_eq!(refusing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(good.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_pool_rejects_with_short_window() {
        let dir = tempfile::tempdir().unwrap();
        let good = Arc::new(CountingBackend::default());
        let scheduler = pooled_scheduler(
            &dir,
            vec![
                credential("key-0", 1, good.clone()),
                credential("key-1", 1, good.clone()),
            ],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        scheduler.enqueue(styled(pending(1, "one", &tx))).await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            TranslationOutcome::Translated { .. }
        ));
        scheduler.enqueue(styled(pending(1, "two", &tx))).await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            TranslationOutcome::Translated { .. }
        ));

        // both credentials consumed, third request is refused locally
        scheduler.enqueue(styled(pending(1, "three", &tx))).await;
        let outcome = rx.recv().await.unwrap();
        let TranslationOutcome::Failed(RelayError::QuotaExceeded { scope, wait, .. }) = outcome
        else {
            panic!("expected a quota failure");
        };
        assert_eq!(scope, QuotaScope::ShortWindow);
        let wait = wait.expect("wait estimate present");
        assert!(wait <= Duration::from_secs(60));
        assert_eq!(good.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_quota_provider_error_is_not_retried() {
        #[derive(Debug, Default)]
        struct BrokenBackend {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl TranslationBackend for BrokenBackend {
            async fn translate(&self, _request: &TranslationRequest) -> Result<String> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Err(RelayError::Provider {
                    status: Some(500),
                    message: "boom".to_string(),
                })
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let broken = Arc::new(BrokenBackend::default());
        let good = Arc::new(CountingBackend::default());
        let scheduler = pooled_scheduler(
            &dir,
            vec![
                credential("key-0", 5, broken.clone()),
                credential("key-1", 5, good.clone()),
            ],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        scheduler.enqueue(styled(pending(1, "hello", &tx))).await;
        let outcome = rx.recv().await.unwrap();

        assert!(matches!(
            outcome,
            TranslationOutcome::Failed(RelayError::Provider { .. })
        ));
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
        assert_eq!(good.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_volume_provider_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = pooled_scheduler(&dir, vec![]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        scheduler.enqueue(pending(1, "hello", &tx)).await;
        let outcome = rx.recv().await.unwrap();

        assert!(matches!(
            outcome,
            TranslationOutcome::Failed(RelayError::ProviderUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_quota_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let good = Arc::new(CountingBackend::default());
        let scheduler = pooled_scheduler(&dir, vec![credential("key-0", 1, good.clone())]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        scheduler.enqueue(styled(pending(1, "one", &tx))).await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            TranslationOutcome::Translated { .. }
        ));

        // a second scheduler over the same ledger sees the consumed window
        let config = test_config(&dir);
        let ledger = QuotaLedger::new(config.ledger_path.clone());
        let mut pool = CredentialPool::new(vec![credential("key-0", 1, good.clone())]);
        pool.restore(&ledger.load().credentials, Utc::now());
        let restarted = Scheduler::assemble(
            config,
            None,
            pool,
            UnitLimiter::new(500_000),
            ledger,
        );

        restarted.enqueue(styled(pending(1, "two", &tx))).await;
        let outcome = rx.recv().await.unwrap();
        assert!(matches!(
            outcome,
            TranslationOutcome::Failed(RelayError::QuotaExceeded { .. })
        ));
        assert_eq!(good.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mock_mode_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = RelayConfig {
            mock_mode: true,
            ..test_config(&dir)
        };
        let scheduler = Scheduler::new(config).unwrap();
        let readiness = scheduler.readiness();
        assert!(readiness.volume_ready);
        assert!(readiness.count_ready);
        assert!(readiness.mock_mode);

        let (tx, mut rx) = mpsc::unbounded_channel();
        scheduler.enqueue(pending(1, "こんにちは", &tx)).await;
        let TranslationOutcome::Translated { text } = rx.recv().await.unwrap() else {
            panic!("expected a translation");
        };
        assert_eq!(text, "[Japanese->English] こんにちは");

        // identical resubmission is served from cache with identical output
        scheduler.enqueue(pending(1, "こんにちは", &tx)).await;
        let TranslationOutcome::Translated { text: again } = rx.recv().await.unwrap() else {
            panic!("expected a translation");
        };
        assert_eq!(text, again);
    }
}
