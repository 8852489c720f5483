//! Per-kind write-behind buffers with size+time flush and graceful-shutdown
//! drain (spec.md §4.7). Each buffered store has a name, an underlying
//! concrete sink, a size threshold, a flush interval, a mutex-protected
//! buffer, and is driven by the shared root cancellation token.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{BufferEngineConfig, BufferedStoreConfig};
use crate::model::{LogPayload, MetricPayload, ProcessPayload};
use crate::observability::traits::{Observer, ObserverEvent, ObserverMetric};
use crate::stores::traits::{LogStore, MetricStore, ProcessStore};

/// An underlying concrete store a `BufferedStore` flushes into.
#[async_trait]
pub trait Sink<T: Send + 'static>: Send + Sync {
    async fn write(&self, items: Vec<T>) -> anyhow::Result<()>;
}

#[async_trait]
impl<S: MetricStore + ?Sized> Sink<MetricPayload> for S {
    async fn write(&self, items: Vec<MetricPayload>) -> anyhow::Result<()> {
        MetricStore::write(self, items).await
    }
}

#[async_trait]
impl<S: LogStore + ?Sized> Sink<LogPayload> for S {
    async fn write(&self, items: Vec<LogPayload>) -> anyhow::Result<()> {
        LogStore::write(self, items).await
    }
}

#[async_trait]
impl<S: ProcessStore + ?Sized> Sink<ProcessPayload> for S {
    async fn write(&self, items: Vec<ProcessPayload>) -> anyhow::Result<()> {
        ProcessStore::write(self, items).await
    }
}

/// One buffered store: accumulates items and periodically (or at a size
/// threshold) flushes them to the underlying sink.
pub struct BufferedStore<T: Send + 'static> {
    name: &'static str,
    sink: Arc<dyn Sink<T>>,
    config: BufferedStoreConfig,
    buffer: Mutex<Vec<T>>,
    flush_count: AtomicU64,
    dropped: AtomicU64,
    observer: Arc<dyn Observer>,
}

impl<T: Clone + Send + Sync + 'static> BufferedStore<T> {
    pub fn new(name: &'static str, sink: Arc<dyn Sink<T>>, config: BufferedStoreConfig) -> Arc<Self> {
        Self::with_observer(name, sink, config, Arc::new(crate::observability::noop::NoopObserver))
    }

    pub fn with_observer(
        name: &'static str,
        sink: Arc<dyn Sink<T>>,
        config: BufferedStoreConfig,
        observer: Arc<dyn Observer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            sink,
            config,
            buffer: Mutex::new(Vec::new()),
            flush_count: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            observer,
        })
    }

    /// Appends under lock; flushes once the buffer reaches `buffer_size`.
    pub fn write_any(self: &Arc<Self>, item: T) {
        if !self.config.enabled {
            return;
        }
        let should_flush = {
            let mut buffer = self.buffer.lock();
            buffer.push(item);
            let len = buffer.len();
            self.observer.record_metric(&ObserverMetric::QueueDepth(len as u64));
            len >= self.config.buffer_size.max(1)
        };
        if should_flush {
            let this = self.clone();
            tokio::spawn(async move {
                this.flush().await;
            });
        }
    }

    /// Atomically swaps the buffer to empty and writes to the sink, in
    /// arrival order (FIFO). On failure, retries once iff configured,
    /// otherwise the items are dropped (counted).
    pub async fn flush(&self) {
        let items: Vec<T> = {
            let mut buffer = self.buffer.lock();
            std::mem::take(&mut *buffer)
        };
        if items.is_empty() {
            return;
        }

        self.flush_count.fetch_add(1, Ordering::Relaxed);
        let item_count = items.len();
        if let Err(err) = self.sink.write(items.clone()).await {
            tracing::warn!(store = self.name, error = %err, "buffered store flush failed");
            if self.config.retry_failed_flush {
                if let Err(err2) = self.sink.write(items).await {
                    tracing::warn!(store = self.name, error = %err2, "retry flush failed, items dropped");
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    self.observer
                        .record_metric(&ObserverMetric::DroppedItems(item_count as u64));
                    self.observer.record_event(&ObserverEvent::Flushed {
                        store: self.name,
                        item_count,
                        success: false,
                    });
                    return;
                }
            } else {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.observer
                    .record_metric(&ObserverMetric::DroppedItems(item_count as u64));
                self.observer.record_event(&ObserverEvent::Flushed {
                    store: self.name,
                    item_count,
                    success: false,
                });
                return;
            }
        }
        self.observer.record_event(&ObserverEvent::Flushed {
            store: self.name,
            item_count,
            success: true,
        });
    }

    pub fn flush_count(&self) -> u64 {
        self.flush_count.load(Ordering::Relaxed)
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.lock().len()
    }

    fn spawn_timer(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        let interval = Duration::from_secs(self.config.flush_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => {
                        this.flush().await;
                        break;
                    }
                    _ = ticker.tick() => {
                        this.flush().await;
                    }
                }
            }
        })
    }
}

/// Supervises the metrics/logs/process buffered stores.
///
/// `events` and `alerts` buffered-store configuration is accepted (spec.md
/// §6 enumerates them) but the core's event/alert paths write through
/// directly (`Emitter`, `AlertManager`); see DESIGN.md.
pub struct BufferEngine {
    pub metrics: Arc<BufferedStore<MetricPayload>>,
    pub logs: Arc<BufferedStore<LogPayload>>,
    pub process: Arc<BufferedStore<ProcessPayload>>,
    shutdown_flush_timeout: Duration,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BufferEngine {
    pub fn new(
        config: &BufferEngineConfig,
        metrics_sink: Arc<dyn Sink<MetricPayload>>,
        logs_sink: Arc<dyn Sink<LogPayload>>,
        process_sink: Arc<dyn Sink<ProcessPayload>>,
    ) -> Self {
        Self::with_observer(
            config,
            metrics_sink,
            logs_sink,
            process_sink,
            Arc::new(crate::observability::noop::NoopObserver),
        )
    }

    pub fn with_observer(
        config: &BufferEngineConfig,
        metrics_sink: Arc<dyn Sink<MetricPayload>>,
        logs_sink: Arc<dyn Sink<LogPayload>>,
        process_sink: Arc<dyn Sink<ProcessPayload>>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            metrics: BufferedStore::with_observer("metrics", metrics_sink, config.metrics.clone(), observer.clone()),
            logs: BufferedStore::with_observer("logs", logs_sink, config.logs.clone(), observer.clone()),
            process: BufferedStore::with_observer("process", process_sink, config.process.clone(), observer),
            shutdown_flush_timeout: Duration::from_secs(config.shutdown_flush_timeout_secs.max(1)),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawns one background flush-timer task per registered store.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        tasks.push(self.metrics.spawn_timer(self.shutdown.clone()));
        tasks.push(self.logs.spawn_timer(self.shutdown.clone()));
        tasks.push(self.process.spawn_timer(self.shutdown.clone()));
    }

    /// Cancels every per-store task (each performs one final flush before
    /// exiting), then forces a final `Flush` on every store — bounded by
    /// `shutdown_flush_timeout`.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        let join_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(self.shutdown_flush_timeout, join_all)
            .await
            .is_err()
        {
            tracing::warn!("buffer engine shutdown timed out waiting for flush tasks");
        }

        self.metrics.flush().await;
        self.logs.flush().await;
        self.process.flush().await;
    }
}
