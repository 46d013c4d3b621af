use async_trait::async_trait;
use entity_engine_core::services::{Service, ServiceState, Supervisor};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct AlwaysFails {
    cleanup_calls: Arc<AtomicU32>,
}

#[async_trait]
impl Service for AlwaysFails {
    fn name(&self) -> &str {
        "always_fails"
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(20)
    }

    fn max_failures(&self) -> u32 {
        3
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_millis(1)
    }

    async fn update(&self) -> Result<(), String> {
        Err("boom".to_string())
    }

    async fn cleanup(&self) {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
    }
}

struct CountsTicks {
    ticks: Arc<AtomicU32>,
}

#[async_trait]
impl Service for CountsTicks {
    fn name(&self) -> &str {
        "counts_ticks"
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(10)
    }

    async fn update(&self) -> Result<(), String> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn repeated_failures_stop_the_service_and_clean_up_exactly_once() {
    let cleanup_calls = Arc::new(AtomicU32::new(0));
    let service = Arc::new(AlwaysFails { cleanup_calls: cleanup_calls.clone() });
    let supervisor = Supervisor::spawn(service);
    supervisor.start();

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(supervisor.state().await, ServiceState::Stopped);
    assert_eq!(cleanup_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn successful_ticks_keep_the_service_running() {
    let ticks = Arc::new(AtomicU32::new(0));
    let service = Arc::new(CountsTicks { ticks: ticks.clone() });
    let supervisor = Supervisor::spawn(service);
    supervisor.start();

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(supervisor.state().await, ServiceState::Running);
    assert_eq!(supervisor.failure_count(), 0);
    assert!(ticks.load(Ordering::SeqCst) >= 5);
}

#[tokio::test]
async fn pause_stops_ticking_until_resumed() {
    let ticks = Arc::new(AtomicU32::new(0));
    let service = Arc::new(CountsTicks { ticks: ticks.clone() });
    let supervisor = Supervisor::spawn(service);
    supervisor.start();
    tokio::time::sleep(Duration::from_millis(50)).await;

    supervisor.pause();
    assert_eq!(supervisor.state().await, ServiceState::Paused);
    let paused_count = ticks.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), paused_count);

    supervisor.resume();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(ticks.load(Ordering::SeqCst) > paused_count);
}
