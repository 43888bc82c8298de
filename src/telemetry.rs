use crate::types::FlightPhase;
use serde::Serialize;
use tokio::sync::{broadcast, watch};

/// Everything the network side may read about the flight, published as one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub phase: FlightPhase,
    pub flight_active: bool,
    pub apogee_m: Option<f32>,
    pub degraded: bool,
    pub log_faults: u32,
    pub actuation_failed: bool,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            phase: FlightPhase::Idle,
            flight_active: false,
            apogee_m: None,
            degraded: false,
            log_faults: 0,
            actuation_failed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "alert", rename_all = "snake_case")]
pub enum Alert {
    DegradedTelemetry { consecutive_faults: u32 },
    LogFault { message: String },
    ActuationFailed { attempts: u32 },
}

impl Alert {
    /// Failures with physical consequences.
    pub fn is_critical(&self) -> bool {
        matches!(self, Alert::ActuationFailed { .. })
    }
}

/// What the gateway pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayPush {
    pub flight_active: bool,
    pub apogee: String,
    pub phase: FlightPhase,
    pub degraded: bool,
}

impl From<&TelemetrySnapshot> for GatewayPush {
    fn from(snapshot: &TelemetrySnapshot) -> Self {
        Self {
            flight_active: snapshot.flight_active,
            apogee: format!("{:.2}", snapshot.apogee_m.unwrap_or(0.0)),
            phase: snapshot.phase,
            degraded: snapshot.degraded,
        }
    }
}

/// Writer side, owned by the control loop.
pub struct TelemetryHub {
    snapshot_tx: watch::Sender<TelemetrySnapshot>,
    alert_tx: broadcast::Sender<Alert>,
}

impl TelemetryHub {
    pub fn new(alert_capacity: usize) -> Self {
        let (snapshot_tx, _) = watch::channel(TelemetrySnapshot::default());
        let (alert_tx, _) = broadcast::channel(alert_capacity.max(1));
        Self {
            snapshot_tx,
            alert_tx,
        }
    }

    /// Replaces the snapshot. Readers are only woken when it actually changed.
    pub fn publish(&self, snapshot: TelemetrySnapshot) -> bool {
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        })
    }

    /// Fire and forget. No subscribers is not an error.
    pub fn raise(&self, alert: Alert) {
        let _ = self.alert_tx.send(alert);
    }

    pub fn current(&self) -> TelemetrySnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn feed(&self) -> TelemetryFeed {
        TelemetryFeed {
            snapshot_rx: self.snapshot_tx.subscribe(),
            alert_tx: self.alert_tx.clone(),
        }
    }
}

/// Reader side, cloned into every gateway connection.
#[derive(Clone)]
pub struct TelemetryFeed {
    snapshot_rx: watch::Receiver<TelemetrySnapshot>,
    alert_tx: broadcast::Sender<Alert>,
}

impl TelemetryFeed {
    pub fn current(&self) -> TelemetrySnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn alerts(&self) -> broadcast::Receiver<Alert> {
        self.alert_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_format() -> Result<(), serde_json::Error> {
        let snapshot = TelemetrySnapshot {
            phase: FlightPhase::Descending,
            flight_active: true,
            apogee_m: Some(123.456),
            ..TelemetrySnapshot::default()
        };
        let json = serde_json::to_value(GatewayPush::from(&snapshot))?;
        assert_eq!(json["flight_active"], true);
        assert_eq!(json["apogee"], "123.46");
        assert_eq!(json["phase"], "Descending");

        let idle = serde_json::to_value(GatewayPush::from(&TelemetrySnapshot::default()))?;
        assert_eq!(idle["apogee"], "0.00");
        assert_eq!(idle["flight_active"], false);
        Ok(())
    }

    #[test]
    fn test_snapshot_is_read_whole() {
        let hub = TelemetryHub::new(4);
        let feed = hub.feed();
        let mut rx = feed.watch();

        let landed = TelemetrySnapshot {
            phase: FlightPhase::Landed,
            apogee_m: Some(88.0),
            ..TelemetrySnapshot::default()
        };
        assert!(hub.publish(landed.clone()));
        assert!(rx.has_changed().unwrap_or(false));
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen, landed);

        // Same value again wakes nobody.
        assert!(!hub.publish(landed));
        assert!(!rx.has_changed().unwrap_or(true));
    }

    #[test]
    fn test_alert_fan_out() {
        let hub = TelemetryHub::new(4);
        hub.raise(Alert::LogFault {
            message: "dropped before anyone listened".into(),
        });

        let feed = hub.feed();
        let mut a = feed.alerts();
        let mut b = feed.clone().alerts();
        hub.raise(Alert::ActuationFailed { attempts: 3 });

        let got_a = a.try_recv();
        let got_b = b.try_recv();
        assert_eq!(got_a, Ok(Alert::ActuationFailed { attempts: 3 }));
        assert_eq!(got_b, Ok(Alert::ActuationFailed { attempts: 3 }));
        assert!(Alert::ActuationFailed { attempts: 3 }.is_critical());
    }
}
