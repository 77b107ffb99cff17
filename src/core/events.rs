// Event Handling
// Cycle events emitted for whoever is presenting progress

use std::fmt;

use tokio::sync::mpsc;

use crate::error::ScanWarning;
use crate::operations::diff::ChangeSummary;
use crate::operations::executor::ActionResult;
use crate::operations::snapshot::Side;

/// States of a sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Scanning,
    Diffing,
    /// Waiting on the confirmation gate; only entered when deletions exist
    AwaitingConfirmation,
    Planning,
    Executing,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::Scanning => "scanning",
            CycleState::Diffing => "diffing",
            CycleState::AwaitingConfirmation => "awaiting confirmation",
            CycleState::Planning => "planning",
            CycleState::Executing => "executing",
        };
        f.write_str(name)
    }
}

/// Progress notifications from a running cycle
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The cycle moved to a new state
    State(CycleState),

    /// An entry was skipped while scanning one side
    ScanWarning { side: Side, warning: ScanWarning },

    /// Diff finished
    Changes(ChangeSummary),

    /// One action finished
    ActionFinished(ActionResult),
}

/// Optional event channel; sending never blocks and never fails the cycle
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<SyncEvent>>,
}

impl EventSink {
    pub fn new(sender: mpsc::UnboundedSender<SyncEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// A sink that drops every event
    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: SyncEvent) {
        if let Some(sender) = &self.sender {
            // a closed receiver just means nobody is listening anymore
            let _ = sender.send(event);
        }
    }
}
