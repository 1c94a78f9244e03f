//! Periodic telemetry task.
//!
//! Every period the broadcaster advances the vehicle by one drift step and
//! pushes a `DATA` line to every live client.
//!
//! # One slow client cannot stall the others
//!
//! The fan-out runs each write as its own task in a [`JoinSet`], each bounded
//! by the sink's write timeout.  A client whose write fails or times out is
//! marked dead during the pass and removed (and closed) only after the whole
//! pass has finished, so the pass never mutates the registry mid-iteration.
//!
//! # Shutdown
//!
//! The loop checks the shared `running` flag after each sleep and exits
//! without broadcasting once it is cleared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use telemetry_core::{DriftSource, ServerLine, VehicleSnapshot};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::application::registry::{Client, ClientRegistry};
use crate::application::vehicle::SharedVehicle;

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastReport {
    /// Vehicle state that was sent.
    pub snapshot: VehicleSnapshot,
    /// Clients the line reached.
    pub delivered: usize,
    /// Clients dropped because the write failed.
    pub dropped: usize,
}

pub struct Broadcaster {
    vehicle: Arc<SharedVehicle>,
    registry: Arc<ClientRegistry>,
    drift: Box<dyn DriftSource>,
    period: Duration,
}

impl Broadcaster {
    pub fn new(
        vehicle: Arc<SharedVehicle>,
        registry: Arc<ClientRegistry>,
        drift: Box<dyn DriftSource>,
        period: Duration,
    ) -> Self {
        Self {
            vehicle,
            registry,
            drift,
            period,
        }
    }

    /// Sleep, check the flag, broadcast; until `running` is cleared.
    pub async fn run(mut self, running: Arc<AtomicBool>) {
        info!("telemetry broadcaster started (period {:?})", self.period);
        loop {
            tokio::time::sleep(self.period).await;
            if !running.load(Ordering::Relaxed) {
                break;
            }
            let report = self.tick().await;
            debug!(
                "broadcast: delivered={} dropped={}",
                report.delivered, report.dropped
            );
        }
        info!("telemetry broadcaster stopped");
    }

    /// One broadcast pass: drift, then fan the `DATA` line out.
    pub async fn tick(&mut self) -> BroadcastReport {
        let step = self.drift.next_step();
        let snapshot = self.vehicle.apply_drift(step);
        let line = ServerLine::Data {
            snapshot,
            timestamp_ms: now_millis(),
        };

        let mut writes = JoinSet::new();
        for client in self.registry.snapshot_live() {
            let line = line.clone();
            writes.spawn(async move {
                let result = client.send(&line).await;
                (client, result)
            });
        }

        let mut delivered = 0;
        let mut failed: Vec<Arc<Client>> = Vec::new();
        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok((_, Ok(()))) => delivered += 1,
                Ok((client, Err(e))) => {
                    warn!("dropping client {}: {e}", client.peer());
                    client.mark_dead();
                    failed.push(client);
                }
                Err(e) => warn!("broadcast write task failed: {e}"),
            }
        }

        for client in &failed {
            if let Some(removed) = self.registry.remove(client.id()) {
                removed.close().await;
            }
        }

        BroadcastReport {
            snapshot,
            delivered,
            dropped: failed.len(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use telemetry_core::{DriftStep, RandomDrift};

    use super::*;
    use crate::application::sink::recording::RecordingSink;

    struct FixedDrift(DriftStep);

    impl DriftSource for FixedDrift {
        fn next_step(&mut self) -> DriftStep {
            self.0
        }
    }

    fn still() -> Box<dyn DriftSource> {
        Box::new(FixedDrift(DriftStep {
            speed_delta: 0.0,
            battery_drain: 0.2,
            temp_noise: 0.0,
            heading_delta: 0.0,
        }))
    }

    fn add_client(registry: &ClientRegistry, port: u16, sink: RecordingSink) -> Arc<RecordingSink> {
        let sink = Arc::new(sink);
        let peer: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        registry.add(Arc::new(Client::new(peer, sink.clone())));
        sink
    }

    fn broadcaster(registry: &Arc<ClientRegistry>, drift: Box<dyn DriftSource>) -> Broadcaster {
        Broadcaster::new(
            Arc::new(SharedVehicle::default()),
            Arc::clone(registry),
            drift,
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn test_tick_sends_data_to_every_live_client() {
        // Arrange
        let registry = Arc::new(ClientRegistry::new());
        let a = add_client(&registry, 1, RecordingSink::default());
        let b = add_client(&registry, 2, RecordingSink::default());
        let mut bc = broadcaster(&registry, still());

        // Act
        let report = bc.tick().await;

        // Assert
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, 0);
        assert!((report.snapshot.battery_pct - 99.8).abs() < 1e-9);
        for sink in [a, b] {
            let lines = sink.lines();
            assert_eq!(lines.len(), 1);
            assert!(lines[0].starts_with("DATA speed=50.0 battery=99.8 temp=35.0 heading=90.0 ts="));
        }
    }

    #[tokio::test]
    async fn test_failed_client_is_removed_after_pass() {
        // Arrange
        let registry = Arc::new(ClientRegistry::new());
        let good = add_client(&registry, 1, RecordingSink::default());
        let bad = add_client(&registry, 2, RecordingSink::failing());
        let mut bc = broadcaster(&registry, still());

        // Act
        let report = bc.tick().await;

        // Assert
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(registry.count(), 1);
        assert_eq!(good.lines().len(), 1);
        assert_eq!(bad.close_count(), 1);

        // The next pass only reaches the survivor.
        let report = bc.tick().await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 0);
    }

    #[tokio::test]
    async fn test_dead_clients_are_skipped() {
        let registry = Arc::new(ClientRegistry::new());
        let sink = add_client(&registry, 1, RecordingSink::default());
        for c in registry.snapshot() {
            c.mark_dead();
        }
        let mut bc = broadcaster(&registry, still());

        let report = bc.tick().await;

        assert_eq!(report.delivered, 0);
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn test_tick_with_no_clients_still_drifts() {
        let registry = Arc::new(ClientRegistry::new());
        let mut bc = broadcaster(&registry, Box::new(RandomDrift::seeded(7)));

        let first = bc.tick().await.snapshot;
        let second = bc.tick().await.snapshot;

        assert!(second.battery_pct < first.battery_pct);
        assert!((0.0..=120.0).contains(&second.speed_kmh));
        assert!((0.0..360.0).contains(&second.heading_deg));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exits_without_broadcasting_once_flag_cleared() {
        // Arrange
        let registry = Arc::new(ClientRegistry::new());
        let sink = add_client(&registry, 1, RecordingSink::default());
        let bc = broadcaster(&registry, still());
        let running = Arc::new(AtomicBool::new(false));

        // Act
        tokio::time::timeout(Duration::from_secs(1), bc.run(running))
            .await
            .expect("broadcaster must stop");

        // Assert
        assert!(sink.lines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_broadcasts_each_period() {
        let registry = Arc::new(ClientRegistry::new());
        let sink = add_client(&registry, 1, RecordingSink::default());
        let bc = broadcaster(&registry, still());
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(bc.run(Arc::clone(&running)));

        tokio::time::sleep(Duration::from_millis(350)).await;
        running.store(false, Ordering::Relaxed);
        task.await.unwrap();

        assert_eq!(sink.lines().len(), 3);
    }
}
