//! Diagnostic record published after each cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::readings::HvacAction;

/// Which cycle produced a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    /// No cycle has run yet.
    #[default]
    Initial,
    /// A full cycle ran but readings were missing.
    AwaitingInputs,
    Full,
    ValveOnly,
}

/// Snapshot of the last cycle. Always replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishedDiagnostics {
    /// `target - reference`, absent when either was missing.
    pub error: Option<f64>,
    pub integrator: f64,
    /// `adjusted_target - target` from the last compensation.
    pub temperature_adjustment: Option<f64>,
    /// Last commanded valve position. Absent without a valve.
    pub valve_output: Option<u8>,
    pub hvac_action: Option<HvacAction>,
    pub reference_temp: Option<f64>,
    pub target_temp: Option<f64>,
    pub trv_temp: Option<f64>,
    pub kind: CycleKind,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Single-writer channel for [`PublishedDiagnostics`].
///
/// Readers see either the previous or the new record, never a mix.
#[derive(Debug)]
pub struct DiagnosticsPublisher {
    tx: watch::Sender<PublishedDiagnostics>,
}

impl Default for DiagnosticsPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticsPublisher {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PublishedDiagnostics::default());
        Self { tx }
    }

    pub fn publish(&self, record: PublishedDiagnostics) {
        // send_replace works without live receivers
        self.tx.send_replace(record);
    }

    /// Copy of the current record.
    pub fn current(&self) -> PublishedDiagnostics {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PublishedDiagnostics> {
        self.tx.subscribe()
    }
}
