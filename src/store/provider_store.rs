use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::token::StoredToken;
use crate::config::settings::StoreSettings;
use crate::error::{StoreError, StoreResult};
use crate::observability::metrics::*;
use crate::provider::Provider;
use crate::reporting::ErrorReporter;
use crate::store::supervisor::{panic_message, supervise, RestartPolicy, Worker};
use crate::utils::constants::TIMEOUT_REPORT_MSG;

type Credentials<P> = <P as Provider>::Credentials;
type Token<P> = StoredToken<Credentials<P>>;
type Reply<P> = oneshot::Sender<StoreResult<Token<P>>>;

pub(crate) enum Command<P: Provider> {
    Request {
        credentials: Credentials<P>,
        reply: Reply<P>,
    },
    Release {
        credentials: Credentials<P>,
        reply: oneshot::Sender<()>,
    },
    /// refresh timer fired for the entry with this generation
    Refresh {
        credentials: Credentials<P>,
        generation: u64,
    },
    Completed {
        credentials: Credentials<P>,
        epoch: u64,
        kind: AcquisitionKind,
        result: StoreResult<Token<P>>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AcquisitionKind {
    Request,
    Refresh,
}

impl AcquisitionKind {
    fn as_str(&self) -> &'static str {
        match self {
            AcquisitionKind::Request => KIND_REQUEST,
            AcquisitionKind::Refresh => KIND_REFRESH,
        }
    }
}

enum Acquisition<C> {
    Request(C),
    Refresh(StoredToken<C>),
}

/// Handle to the worker serving one provider.
///
/// All cache reads and writes happen inside the worker. Callers talk to it
/// through a bounded mailbox and wait for the answer with their own timeout.
pub struct ProviderStore<P: Provider> {
    provider: Arc<P>,
    mailbox: mpsc::Sender<Command<P>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl<P: Provider> Clone for ProviderStore<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            mailbox: self.mailbox.clone(),
            reporter: self.reporter.clone(),
        }
    }
}

impl<P: Provider> ProviderStore<P> {
    /// Spawn the worker on the current tokio runtime.
    pub fn start(
        provider: Arc<P>,
        settings: &StoreSettings,
        reporter: Arc<dyn ErrorReporter>,
    ) -> StoreResult<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|err| {
            StoreError::ProviderStoreUnavailable(format!("no tokio runtime: {}", err))
        })?;
        let (mailbox, receiver) = mpsc::channel(settings.mailbox_capacity.max(1));
        let worker = TokenWorker::<P>::new(provider.clone(), mailbox.downgrade(), settings);
        runtime.spawn(supervise(worker, receiver, RestartPolicy::from(settings)));

        Ok(Self { provider, mailbox, reporter })
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn is_alive(&self) -> bool {
        !self.mailbox.is_closed()
    }

    /// Cached token when valid, otherwise the result of the single in-flight
    /// acquisition for these credentials.
    ///
    /// The wait is bounded by `timeout` plus the provider grace period. Giving
    /// up does not cancel the acquisition, its result still lands in the cache.
    pub async fn request(&self, credentials: Credentials<P>, timeout: Duration) -> StoreResult<Token<P>> {
        let budget = timeout.saturating_add(self.provider.timeout().unwrap_or_default());
        let (reply, answer) = oneshot::channel();
        let command = Command::Request { credentials: credentials.clone(), reply };

        let exchange = async move {
            if self.mailbox.send(command).await.is_err() {
                return Err(self.unavailable("worker stopped"));
            }
            match answer.await {
                Ok(result) => result,
                Err(_) => Err(self.unavailable("worker restarted before answering")),
            }
        };

        match tokio::time::timeout(budget, exchange).await {
            Ok(result) => result,
            Err(_) => {
                self.report_timeout(&credentials, budget);
                Err(StoreError::Timeout {
                    provider: self.provider.name().to_owned(),
                    timeout: budget,
                })
            }
        }
    }

    /// Drop the cached token, releasing an absent one is fine.
    pub async fn release(&self, credentials: Credentials<P>) -> StoreResult<()> {
        let (reply, answer) = oneshot::channel();
        self.mailbox
            .send(Command::Release { credentials, reply })
            .await
            .map_err(|_| self.unavailable("worker stopped"))?;
        answer
            .await
            .map_err(|_| self.unavailable("worker restarted before answering"))
    }

    pub async fn cached_tokens(&self) -> StoreResult<usize> {
        let (reply, answer) = oneshot::channel();
        self.mailbox
            .send(Command::Count { reply })
            .await
            .map_err(|_| self.unavailable("worker stopped"))?;
        answer
            .await
            .map_err(|_| self.unavailable("worker restarted before answering"))
    }

    fn unavailable(&self, reason: &str) -> StoreError {
        StoreError::ProviderStoreUnavailable(format!("provider '{}': {}", self.provider.name(), reason))
    }

    fn report_timeout(&self, credentials: &Credentials<P>, budget: Duration) {
        let name = self.provider.name();
        get_metrics().token_request_timeouts.with_label_values(&[name]).inc();

        let cleaned = self.provider.clean_credentials(credentials);
        let mut extra = BTreeMap::new();
        extra.insert("provider".to_owned(), Value::from(name));
        extra.insert("credentials".to_owned(), Value::Object(cleaned.into_iter().collect()));
        extra.insert("timeout_ms".to_owned(), Value::from(budget.as_millis() as u64));
        self.reporter.report(TIMEOUT_REPORT_MSG, &extra);
    }
}

/// Type-erased view used by the provider registry.
pub(crate) trait StoreHandle: Send + Sync {
    fn is_alive(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl<P: Provider> StoreHandle for ProviderStore<P> {
    fn is_alive(&self) -> bool {
        ProviderStore::is_alive(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Entry<C> {
    token: StoredToken<C>,
    generation: u64,
    refresh: Option<JoinHandle<()>>,
}

impl<C> Entry<C> {
    fn cancel_refresh(&mut self) {
        if let Some(timer) = self.refresh.take() {
            timer.abort();
        }
    }
}

struct InFlight<P: Provider> {
    waiters: Vec<Reply<P>>,
    /// the token was released while this acquisition ran, its result is not cached
    released: bool,
    /// callers that arrived after the release, they need a new acquisition
    after_release: Vec<Reply<P>>,
}

impl<P: Provider> InFlight<P> {
    fn new(waiters: Vec<Reply<P>>) -> Self {
        Self {
            waiters,
            released: false,
            after_release: Vec::new(),
        }
    }
}

/// Worker state: cache, in-flight acquisitions and refresh timers.
struct TokenWorker<P: Provider> {
    name: String,
    provider: Arc<P>,
    /// weak so that timers and acquisitions never keep the worker alive
    mailbox: mpsc::WeakSender<Command<P>>,
    buffer_interval: u64,
    min_refresh_delay: Duration,
    entries: HashMap<Credentials<P>, Entry<Credentials<P>>>,
    in_flight: HashMap<Credentials<P>, InFlight<P>>,
    generation: u64,
    /// bumped on every reset, results from older epochs are dropped
    epoch: u64,
}

impl<P: Provider> TokenWorker<P> {
    fn new(provider: Arc<P>, mailbox: mpsc::WeakSender<Command<P>>, settings: &StoreSettings) -> Self {
        Self {
            name: provider.name().to_owned(),
            provider,
            mailbox,
            buffer_interval: settings.buffer_interval_seconds,
            min_refresh_delay: settings.min_refresh_delay(),
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            generation: 0,
            epoch: 0,
        }
    }

    fn on_request(&mut self, credentials: Credentials<P>, reply: Reply<P>) {
        let metrics = get_metrics();
        if let Some(entry) = self.entries.get(&credentials) {
            if entry.token.is_valid() {
                debug!("provider '{}': cache hit", self.name);
                metrics.token_requests.with_label_values(&[self.name.as_str(), OUTCOME_HIT]).inc();
                let _ = reply.send(Ok(entry.token.clone()));
                return;
            }
        }
        metrics.token_requests.with_label_values(&[self.name.as_str(), OUTCOME_MISS]).inc();

        if let Some(in_flight) = self.in_flight.get_mut(&credentials) {
            if in_flight.released {
                debug!("provider '{}': waiting for the acquisition started before release", self.name);
                in_flight.after_release.push(reply);
            } else {
                debug!("provider '{}': joining in-flight acquisition", self.name);
                in_flight.waiters.push(reply);
            }
            return;
        }

        self.in_flight
            .insert(credentials.clone(), InFlight::new(vec![reply]));
        self.spawn_acquisition(Acquisition::Request(credentials));
    }

    fn on_release(&mut self, credentials: &Credentials<P>) {
        if self.remove(credentials) {
            info!("provider '{}': token released", self.name);
        }
        if let Some(in_flight) = self.in_flight.get_mut(credentials) {
            in_flight.released = true;
        }
    }

    fn on_refresh_due(&mut self, credentials: Credentials<P>, generation: u64) {
        let stale = match self.entries.get(&credentials) {
            Some(entry) if entry.generation == generation => entry.token.clone(),
            _ => {
                debug!("provider '{}': outdated refresh ignored", self.name);
                return;
            }
        };
        if self.in_flight.contains_key(&credentials) {
            return;
        }

        debug!("provider '{}': refreshing token", self.name);
        self.in_flight
            .insert(credentials, InFlight::new(Vec::new()));
        self.spawn_acquisition(Acquisition::Refresh(stale));
    }

    fn on_completed(
        &mut self,
        credentials: Credentials<P>,
        kind: AcquisitionKind,
        result: StoreResult<Token<P>>,
    ) {
        let Some(in_flight) = self.in_flight.remove(&credentials) else {
            debug!("provider '{}': {} result without waiters dropped", self.name, kind.as_str());
            return;
        };
        if in_flight.released {
            self.on_completed_after_release(credentials, kind, result, in_flight);
            return;
        }
        let waiters = in_flight.waiters;

        match result {
            Ok(token) => {
                info!(
                    "provider '{}': token {} ok, ttl {:?}, waiters {}",
                    self.name,
                    kind.as_str(),
                    token.ttl(),
                    waiters.len()
                );
                self.store(credentials, token.clone());
                for waiter in waiters {
                    let _ = waiter.send(Ok(token.clone()));
                }
            }
            Err(err) if kind == AcquisitionKind::Refresh => {
                warn!("provider '{}': refresh failed, evicting token: {}", self.name, err);
                self.remove(&credentials);
                if !waiters.is_empty() {
                    // callers joined while the refresh ran, give them a fresh acquisition
                    self.in_flight.insert(credentials.clone(), InFlight::new(waiters));
                    self.spawn_acquisition(Acquisition::Request(credentials));
                }
            }
            Err(err) => {
                warn!("provider '{}': token request failed: {}", self.name, err);
                for waiter in waiters {
                    let _ = waiter.send(Err(err.clone()));
                }
            }
        }
    }

    /// The result is handed to callers that asked before the release and is
    /// never cached. Later callers get a new `request_token` call.
    fn on_completed_after_release(
        &mut self,
        credentials: Credentials<P>,
        kind: AcquisitionKind,
        result: StoreResult<Token<P>>,
        in_flight: InFlight<P>,
    ) {
        debug!("provider '{}': {} finished after release, not cached", self.name, kind.as_str());
        let mut pending = in_flight.after_release;

        match result {
            Ok(token) => {
                for waiter in in_flight.waiters {
                    let _ = waiter.send(Ok(token.clone()));
                }
            }
            Err(_) if kind == AcquisitionKind::Refresh => pending.extend(in_flight.waiters),
            Err(err) => {
                for waiter in in_flight.waiters {
                    let _ = waiter.send(Err(err.clone()));
                }
            }
        }

        if !pending.is_empty() {
            self.in_flight.insert(credentials.clone(), InFlight::new(pending));
            self.spawn_acquisition(Acquisition::Request(credentials));
        }
    }

    /// Run the provider call off the worker and post the result back.
    fn spawn_acquisition(&self, acquisition: Acquisition<Credentials<P>>) {
        let provider = self.provider.clone();
        let mailbox = self.mailbox.clone();
        let name = self.name.clone();
        let epoch = self.epoch;
        let (credentials, kind) = match &acquisition {
            Acquisition::Request(credentials) => (credentials.clone(), AcquisitionKind::Request),
            Acquisition::Refresh(token) => (token.credentials().clone(), AcquisitionKind::Refresh),
        };

        tokio::spawn(async move {
            let start = Instant::now();
            let call = tokio::spawn(async move {
                match &acquisition {
                    Acquisition::Request(credentials) => provider.request_token(credentials).await,
                    Acquisition::Refresh(token) => provider.refresh_token(token).await,
                }
            });

            let result = match call.await {
                Ok(Ok(token)) => Ok(token),
                Ok(Err(err)) => Err(StoreError::acquisition_failed(&err)),
                Err(join_err) => Err(StoreError::UnknownAcquisitionResult(match join_err.try_into_panic() {
                    Ok(panic) => panic_message(panic.as_ref()),
                    Err(join_err) => join_err.to_string(),
                })),
            };

            let metrics = get_metrics();
            metrics
                .token_acquisition_duration
                .with_label_values(&[name.as_str()])
                .observe(start.elapsed().as_secs_f64());
            let outcome = if result.is_ok() { RESULT_OK } else { RESULT_ERROR };
            metrics
                .token_acquisitions
                .with_label_values(&[name.as_str(), kind.as_str(), outcome])
                .inc();

            if let Some(mailbox) = mailbox.upgrade() {
                let _ = mailbox
                    .send(Command::Completed { credentials, epoch, kind, result })
                    .await;
            }
        });
    }

    fn store(&mut self, credentials: Credentials<P>, token: Token<P>) {
        self.generation += 1;
        let generation = self.generation;
        let refresh = self.schedule_refresh(&credentials, &token, generation);

        if let Some(mut previous) = self
            .entries
            .insert(credentials, Entry { token, generation, refresh })
        {
            previous.cancel_refresh();
        }
        self.update_gauge();
    }

    fn remove(&mut self, credentials: &Credentials<P>) -> bool {
        let removed = self.entries.remove(credentials).map(|mut entry| entry.cancel_refresh());
        self.update_gauge();
        removed.is_some()
    }

    /// One-shot timer posting a refresh `ttl - elapsed - buffer` seconds from now.
    fn schedule_refresh(
        &self,
        credentials: &Credentials<P>,
        token: &Token<P>,
        generation: u64,
    ) -> Option<JoinHandle<()>> {
        let delay = refresh_delay(token, self.buffer_interval, self.min_refresh_delay)?;
        debug!("provider '{}': refresh scheduled in {:?}", self.name, delay);

        let mailbox = self.mailbox.clone();
        let credentials = credentials.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(mailbox) = mailbox.upgrade() {
                let _ = mailbox.send(Command::Refresh { credentials, generation }).await;
            }
        }))
    }

    fn update_gauge(&self) {
        get_metrics()
            .cached_tokens
            .with_label_values(&[self.name.as_str()])
            .set(self.entries.len() as i64);
    }
}

/// `None` for tokens without ttl, they are kept until released.
pub(crate) fn refresh_delay<C>(token: &StoredToken<C>, buffer_interval: u64, floor: Duration) -> Option<Duration> {
    let ttl = i64::try_from(token.ttl()?).unwrap_or(i64::MAX);
    let buffer = i64::try_from(buffer_interval).unwrap_or(i64::MAX);
    let elapsed = token.elapsed_seconds_at(Utc::now());
    let seconds_wait = ttl.saturating_sub(elapsed).saturating_sub(buffer).max(0) as u64;
    Some(Duration::from_secs(seconds_wait).max(floor))
}

impl<P: Provider> Worker for TokenWorker<P> {
    type Message = Command<P>;

    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&mut self, message: Command<P>) {
        match message {
            Command::Request { credentials, reply } => self.on_request(credentials, reply),
            Command::Release { credentials, reply } => {
                self.on_release(&credentials);
                let _ = reply.send(());
            }
            Command::Refresh { credentials, generation } => self.on_refresh_due(credentials, generation),
            Command::Completed { credentials, epoch, kind, result } => {
                if epoch == self.epoch {
                    self.on_completed(credentials, kind, result);
                } else {
                    debug!("provider '{}': result from before restart dropped", self.name);
                }
            }
            Command::Count { reply } => {
                let _ = reply.send(self.entries.len());
            }
        }
    }

    fn reset(&mut self) {
        for entry in self.entries.values_mut() {
            entry.cancel_refresh();
        }
        self.entries.clear();
        // dropping the waiters wakes their callers with an error
        self.in_flight.clear();
        self.epoch += 1;
        self.update_gauge();
    }
}
