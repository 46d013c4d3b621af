use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Running,
    Paused,
    Failed,
}

/// A named, long-running background worker. `update` is invoked once per
/// `interval`; `cleanup` runs exactly once, last, when the service
/// transitions out of `Failed` or stops gracefully.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;
    fn interval(&self) -> Duration;

    fn max_failures(&self) -> u32 {
        3
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn update(&self) -> Result<(), String>;

    async fn cleanup(&self) {}
}

enum Control {
    Start,
    Stop,
    Pause,
    Resume,
}

/// Owns the background task driving one service's tick loop, plus the
/// shared state readers observe. One task per service, ticking on its
/// own timer.
pub struct Supervisor {
    name: String,
    state: Arc<RwLock<ServiceState>>,
    failures: Arc<AtomicU32>,
    control: mpsc::UnboundedSender<Control>,
    handle: JoinHandle<()>,
}

impl Supervisor {
    pub fn spawn(service: Arc<dyn Service>) -> Self {
        let name = service.name().to_string();
        let state = Arc::new(RwLock::new(ServiceState::Stopped));
        let failures = Arc::new(AtomicU32::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel::<Control>();

        let task_state = state.clone();
        let task_failures = failures.clone();
        let handle = tokio::spawn(async move {
            let mut cleaned_up = false;
            let mut running = false;
            let mut interval = tokio::time::interval(service.interval());
            loop {
                tokio::select! {
                    maybe_cmd = rx.recv() => {
                        match maybe_cmd {
                            Some(Control::Start) => {
                                running = true;
                                *task_state.write().await = ServiceState::Running;
                            }
                            Some(Control::Stop) => {
                                running = false;
                                *task_state.write().await = ServiceState::Stopped;
                                if !cleaned_up {
                                    service.cleanup().await;
                                    cleaned_up = true;
                                }
                                break;
                            }
                            Some(Control::Pause) => {
                                *task_state.write().await = ServiceState::Paused;
                            }
                            Some(Control::Resume) => {
                                *task_state.write().await = ServiceState::Running;
                            }
                            None => break,
                        }
                    }
                    _ = interval.tick(), if running => {
                        let current = *task_state.read().await;
                        if current != ServiceState::Running {
                            continue;
                        }
                        match service.update().await {
                            Ok(()) => {
                                task_failures.store(0, Ordering::SeqCst);
                            }
                            Err(err) => {
                                tracing::error!(service = %service.name(), error = %err, "service tick failed");
                                let count = task_failures.fetch_add(1, Ordering::SeqCst) + 1;
                                tokio::time::sleep(service.retry_delay()).await;
                                if count >= service.max_failures() {
                                    *task_state.write().await = ServiceState::Failed;
                                    if !cleaned_up {
                                        service.cleanup().await;
                                        cleaned_up = true;
                                    }
                                    *task_state.write().await = ServiceState::Stopped;
                                    running = false;
                                }
                            }
                        }
                    }
                }
            }
        });

        Self { name, state, failures, control: tx, handle }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> ServiceState {
        *self.state.read().await
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn start(&self) {
        let _ = self.control.send(Control::Start);
    }

    pub fn stop(&self) {
        let _ = self.control.send(Control::Stop);
    }

    pub fn pause(&self) {
        let _ = self.control.send(Control::Pause);
    }

    pub fn resume(&self) {
        let _ = self.control.send(Control::Resume);
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}
