//! Error notifier.
//!
//! The [`Notifier`] builds notices and delivers them from a bounded queue
//! drained by a single background worker, so reporting never blocks the
//! caller. It also owns the [`Routes`] metric sink and the task that
//! periodically flushes it.

use grpcbrake_common::NotifierConfig;
use grpcbrake_domain::notice::parse_backtrace;
use grpcbrake_domain::Notice;
use parking_lot::Mutex;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::routes::Routes;
use crate::transport::{HttpTransport, Transport};
use crate::{Error, Result};

/// Frames skipped when capturing the backtrace of a notice raised by an interceptor
pub const NOTICE_STACK_DEPTH: usize = 3;

const NOTIFIER_NAME: &str = concat!("grpcbrake/", env!("CARGO_PKG_VERSION"));

/// Builds and dispatches error notices
pub trait Reporter: Send + Sync {
    /// Build a notice for `err`, skipping `depth` backtrace frames
    fn notice(
        &self,
        err: &(dyn std::error::Error + 'static),
        params: Option<serde_json::Map<String, serde_json::Value>>,
        depth: usize,
    ) -> Notice;

    /// Queue a notice for delivery and return immediately
    fn send_notice_async(&self, notice: Notice);
}

/// Notifier options
#[derive(Debug, Clone)]
pub struct NotifierOptions {
    pub enabled: bool,
    pub project_id: u64,
    pub project_key: String,
    pub host: String,
    pub environment: String,
    pub queue_capacity: usize,
    pub routes_flush_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for NotifierOptions {
    fn default() -> Self {
        Self::from_config(&NotifierConfig::default())
    }
}

impl NotifierOptions {
    pub fn from_config(config: &NotifierConfig) -> Self {
        Self {
            enabled: config.enabled,
            project_id: config.project_id,
            project_key: config.project_key.clone(),
            host: config.host.clone(),
            environment: config.environment.clone(),
            queue_capacity: config.queue_capacity,
            routes_flush_interval: config.routes_flush_interval(),
            request_timeout: config.request_timeout(),
        }
    }
}

/// Asynchronous error notifier
pub struct Notifier {
    options: NotifierOptions,
    hostname: Option<String>,
    sender: Mutex<Option<mpsc::Sender<Notice>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    flusher: Mutex<Option<JoinHandle<()>>>,
    routes: Arc<Routes>,
}

impl Notifier {
    /// Create a notifier delivering over HTTP.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(options: NotifierOptions) -> Result<Self> {
        if options.queue_capacity == 0 {
            return Err(Error::Configuration(
                "Notice queue capacity must be greater than 0".to_string(),
            ));
        }
        let transport = HttpTransport::new(
            &options.host,
            options.project_id,
            &options.project_key,
            options.request_timeout,
        )?;
        Ok(Self::with_transport(options, Arc::new(transport)))
    }

    /// Create a notifier delivering through `transport`.
    ///
    /// Must be called from within a tokio runtime. A zero queue capacity is
    /// raised to one.
    pub fn with_transport(options: NotifierOptions, transport: Arc<dyn Transport>) -> Self {
        let hostname = std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty());

        if !options.enabled {
            info!("Notifier disabled, notices and route stats will be discarded");
            return Self {
                routes: Arc::new(Routes::disabled(transport)),
                options,
                hostname,
                sender: Mutex::new(None),
                worker: Mutex::new(None),
                flusher: Mutex::new(None),
            };
        }

        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let worker = tokio::spawn(run_notice_worker(rx, Arc::clone(&transport)));

        let routes = Arc::new(Routes::new(options.environment.clone(), transport));
        let flusher = tokio::spawn(run_routes_flusher(
            Arc::clone(&routes),
            options.routes_flush_interval,
        ));

        debug!(
            environment = %options.environment,
            queue_capacity = options.queue_capacity,
            "Notifier started"
        );

        Self {
            options,
            hostname,
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            flusher: Mutex::new(Some(flusher)),
            routes,
        }
    }

    pub fn options(&self) -> &NotifierOptions {
        &self.options
    }

    /// The route metrics sink
    pub fn routes(&self) -> Arc<Routes> {
        Arc::clone(&self.routes)
    }

    /// Queue a notice without waiting.
    ///
    /// A disabled notifier discards the notice and returns `Ok`.
    pub fn try_send_notice(&self, notice: Notice) -> Result<()> {
        if !self.options.enabled {
            return Ok(());
        }

        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(Error::Closed)?;
        sender.try_send(notice).map_err(|e| match e {
            TrySendError::Full(_) => Error::QueueFull(self.options.queue_capacity),
            TrySendError::Closed(_) => Error::Closed,
        })
    }

    /// Stop accepting notices, drain the queue and flush route stats.
    ///
    /// Returns [`Error::Timeout`] if the queue is not drained within `timeout`.
    pub async fn close(&self, timeout: Duration) -> Result<()> {
        // Dropping the sender lets the worker finish once the queue is empty.
        drop(self.sender.lock().take());

        if let Some(flusher) = self.flusher.lock().take() {
            flusher.abort();
        }

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            match tokio::time::timeout(timeout, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Notice worker failed"),
                Err(_) => {
                    return Err(Error::Timeout(format!(
                        "notice queue not drained within {:?}",
                        timeout
                    )))
                }
            }
        }

        self.routes.flush().await?;
        info!("Notifier closed");
        Ok(())
    }
}

impl Reporter for Notifier {
    fn notice(
        &self,
        err: &(dyn std::error::Error + 'static),
        params: Option<serde_json::Map<String, serde_json::Value>>,
        depth: usize,
    ) -> Notice {
        let mut notice = Notice::new(err);

        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            let frames = parse_backtrace(&backtrace.to_string())
                .into_iter()
                .skip(depth)
                .collect();
            notice = notice.with_backtrace(frames, depth);
        } else {
            notice.skip_frames = depth;
        }

        if let Some(params) = params {
            notice = notice.with_params(params);
        }

        notice.set_context("notifier", NOTIFIER_NAME);
        notice.set_context("environment", self.options.environment.as_str());
        notice.set_context("os", std::env::consts::OS);
        notice.set_context("language", "Rust");
        notice.set_context("severity", "error");
        if let Some(hostname) = &self.hostname {
            notice.set_context("hostname", hostname.as_str());
        }

        notice
    }

    fn send_notice_async(&self, notice: Notice) {
        let notice_id = notice.id;
        if let Err(e) = self.try_send_notice(notice) {
            warn!(notice_id = %notice_id, error = %e, "Dropping notice");
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        if let Some(flusher) = self.flusher.get_mut().take() {
            flusher.abort();
        }
    }
}

async fn run_notice_worker(mut rx: mpsc::Receiver<Notice>, transport: Arc<dyn Transport>) {
    while let Some(notice) = rx.recv().await {
        match transport.send_notice(&notice).await {
            Ok(receipt) => debug!(
                notice_id = %notice.id,
                remote_id = ?receipt.id,
                "Notice delivered"
            ),
            Err(e) => warn!(notice_id = %notice.id, error = %e, "Failed to deliver notice"),
        }
    }
    debug!("Notice worker stopped");
}

async fn run_routes_flusher(routes: Arc<Routes>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        // Failures are logged by `flush`.
        let _ = routes.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LogTransport;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    fn options() -> NotifierOptions {
        NotifierOptions {
            project_id: 1,
            project_key: "key".to_string(),
            environment: "test".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_notice_fills_context() {
        let notifier = Notifier::with_transport(options(), Arc::new(LogTransport));
        let notice = notifier.notice(&Boom, None, NOTICE_STACK_DEPTH);

        assert_eq!(notice.message(), "boom");
        assert_eq!(notice.context_value("environment"), Some("test"));
        assert_eq!(notice.context_value("severity"), Some("error"));
        assert_eq!(notice.context_value("language"), Some("Rust"));
        assert_eq!(notice.skip_frames, NOTICE_STACK_DEPTH);
        assert!(notice.component().is_none());
    }

    #[tokio::test]
    async fn test_notice_params() {
        let notifier = Notifier::with_transport(options(), Arc::new(LogTransport));
        let mut params = serde_json::Map::new();
        params.insert("name".to_string(), serde_json::json!("world"));

        let notice = notifier.notice(&Boom, Some(params), 0);
        assert_eq!(notice.params["name"], "world");
    }

    #[tokio::test]
    async fn test_closed_notifier_rejects_notices() {
        let notifier = Notifier::with_transport(options(), Arc::new(LogTransport));
        notifier.close(Duration::from_secs(1)).await.unwrap();

        let notice = notifier.notice(&Boom, None, 0);
        assert!(matches!(notifier.try_send_notice(notice), Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_disabled_notifier_discards() {
        let notifier = Notifier::with_transport(
            NotifierOptions {
                enabled: false,
                ..options()
            },
            Arc::new(LogTransport),
        );
        let notice = notifier.notice(&Boom, None, 0);
        assert!(notifier.try_send_notice(notice).is_ok());
        notifier.close(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_new_rejects_zero_capacity() {
        let result = Notifier::new(NotifierOptions {
            queue_capacity: 0,
            ..options()
        });
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
