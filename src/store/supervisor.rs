use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info};

use crate::config::settings::StoreSettings;
use crate::observability::metrics::get_metrics;

/// A worker that owns its state and handles one message at a time.
/// Handlers are synchronous so a crash can be caught between messages.
pub(crate) trait Worker: Send + 'static {
    type Message: Send + 'static;

    fn name(&self) -> &str;

    fn handle(&mut self, message: Self::Message);

    /// Drop all state, as if the worker had just been started.
    fn reset(&mut self);
}

/// How many crashes are tolerated before the worker is stopped for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub max_restarts: u32,
    pub window: Duration,
}

impl From<&StoreSettings> for RestartPolicy {
    fn from(settings: &StoreSettings) -> Self {
        Self {
            max_restarts: settings.max_restarts,
            window: settings.restart_window(),
        }
    }
}

#[derive(Debug)]
struct RestartIntensity {
    policy: RestartPolicy,
    restarts: VecDeque<Instant>,
}

impl RestartIntensity {
    fn new(policy: RestartPolicy) -> Self {
        Self { policy, restarts: VecDeque::new() }
    }

    /// Record a crash, false once the policy is exceeded
    fn allow_restart(&mut self, now: Instant) -> bool {
        while let Some(oldest) = self.restarts.front() {
            if now.duration_since(*oldest) > self.policy.window {
                self.restarts.pop_front();
            } else {
                break;
            }
        }
        self.restarts.push_back(now);
        self.restarts.len() <= self.policy.max_restarts as usize
    }
}

/// Drive `worker` until every sender is gone or the restart policy gives up.
pub(crate) async fn supervise<W: Worker>(
    mut worker: W,
    mut mailbox: mpsc::Receiver<W::Message>,
    policy: RestartPolicy,
) {
    let mut intensity = RestartIntensity::new(policy);
    info!("worker '{}' started", worker.name());

    while let Some(message) = mailbox.recv().await {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker.handle(message)));
        let Err(panic) = outcome else {
            continue;
        };

        error!("worker '{}' crashed: {}", worker.name(), panic_message(panic.as_ref()));
        get_metrics().worker_restarts.with_label_values(&[worker.name()]).inc();
        worker.reset();

        if !intensity.allow_restart(Instant::now()) {
            error!(
                "worker '{}' crashed more than {} times in {:?}, stopping",
                worker.name(),
                policy.max_restarts,
                policy.window
            );
            mailbox.close();
            break;
        }
        info!("worker '{}' restarted with empty state", worker.name());
    }

    worker.reset();
    info!("worker '{}' stopped", worker.name());
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
