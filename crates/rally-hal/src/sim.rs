//! In-process simulated collaborators for headless runs and tests.
//!
//! Every stub records what it was asked to do behind a cloneable handle, so a
//! test can hand the stub to the mission by value and still inspect it
//! afterwards.
//!
//! # Example
//!
//! ```rust
//! use rally_hal::actuation::VelocitySink;
//! use rally_hal::sim::RecordingDrive;
//! use rally_types::VelocityCommand;
//!
//! let drive = RecordingDrive::new();
//! let mut sink: Box<dyn VelocitySink> = Box::new(drive.clone());
//! sink.send(VelocityCommand::new(0.4, 0.0)).unwrap();
//! sink.send(VelocityCommand::stop()).unwrap();
//!
//! assert_eq!(drive.commands().len(), 2);
//! assert!(drive.last().unwrap().is_stop());
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rally_types::{Led, LedColor, MissionError, Shape, ShapeMask, VelocityCommand};
use tracing::debug;

use crate::actuation::{IndicatorSink, SoundSink, VelocitySink};
use crate::navigation::{NavGoal, NavOutcome, Navigator};
use crate::vision::Vision;

fn lock<'a, T>(component: &str, m: &'a Mutex<T>) -> Result<MutexGuard<'a, T>, MissionError> {
    m.lock().map_err(|_| MissionError::Hardware {
        component: component.to_string(),
        details: "simulated device state poisoned".to_string(),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Drive
// ────────────────────────────────────────────────────────────────────────────

/// A drive base that records every command.  Optionally faults after a fixed
/// number of commands.
#[derive(Debug, Clone, Default)]
pub struct RecordingDrive {
    commands: Arc<Mutex<Vec<VelocityCommand>>>,
    fail_after: Option<usize>,
}

impl RecordingDrive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `n` commands, then report a hardware fault on every send.
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<VelocityCommand> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<VelocityCommand> {
        self.commands.lock().ok().and_then(|c| c.last().copied())
    }
}

impl VelocitySink for RecordingDrive {
    fn send(&mut self, command: VelocityCommand) -> Result<(), MissionError> {
        let mut commands = lock("drive_base", &self.commands)?;
        if self.fail_after.is_some_and(|n| commands.len() >= n) {
            return Err(MissionError::Hardware {
                component: "drive_base".to_string(),
                details: "simulated motor fault".to_string(),
            });
        }
        commands.push(command);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Indicators and sound
// ────────────────────────────────────────────────────────────────────────────

/// LEDs that remember their current colour.
#[derive(Debug, Clone, Default)]
pub struct SimIndicators {
    state: Arc<Mutex<HashMap<Led, LedColor>>>,
}

impl SimIndicators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn color(&self, led: Led) -> LedColor {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.get(&led).copied())
            .unwrap_or_default()
    }
}

impl IndicatorSink for SimIndicators {
    fn set(&mut self, led: Led, color: LedColor) -> Result<(), MissionError> {
        debug!(?led, ?color, "sim indicator");
        lock("indicators", &self.state)?.insert(led, color);
        Ok(())
    }
}

/// A buzzer that counts beeps.
#[derive(Debug, Clone, Default)]
pub struct SimSound {
    beeps: Arc<Mutex<u32>>,
}

impl SimSound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beeps(&self) -> u32 {
        self.beeps.lock().map(|b| *b).unwrap_or(0)
    }
}

impl SoundSink for SimSound {
    fn beep(&mut self) -> Result<(), MissionError> {
        *lock("sound", &self.beeps)? += 1;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Navigation
// ────────────────────────────────────────────────────────────────────────────

/// A navigator that answers immediately and records every goal.
///
/// Goals whose label is in the failure set report [`NavOutcome::Failed`].
#[derive(Debug, Clone, Default)]
pub struct SimNavigator {
    goals: Arc<Mutex<Vec<NavGoal>>>,
    failing: Vec<String>,
}

impl SimNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every goal labelled `label` (waypoint name or frame).
    pub fn failing_on(mut self, label: impl Into<String>) -> Self {
        self.failing.push(label.into());
        self
    }

    pub fn goals(&self) -> Vec<NavGoal> {
        self.goals.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn visited(&self) -> Vec<String> {
        self.goals()
            .iter()
            .map(|g| g.label().to_string())
            .collect()
    }
}

#[async_trait]
impl Navigator for SimNavigator {
    async fn go_to(&mut self, goal: &NavGoal) -> NavOutcome {
        if let Ok(mut goals) = self.goals.lock() {
            goals.push(goal.clone());
        }
        if self.failing.iter().any(|f| f == goal.label()) {
            NavOutcome::Failed
        } else {
            NavOutcome::Succeeded
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Vision
// ────────────────────────────────────────────────────────────────────────────

/// A classifier that replays scripted answers, cycling through each script.
///
/// An empty script answers [`Shape::Unknown`] / zero objects.
#[derive(Debug, Clone, Default)]
pub struct ScriptedVision {
    shapes: HashMap<ShapeMask, VecDeque<Shape>>,
    counts: VecDeque<u32>,
}

impl ScriptedVision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shapes(mut self, mask: ShapeMask, script: impl IntoIterator<Item = Shape>) -> Self {
        self.shapes.insert(mask, script.into_iter().collect());
        self
    }

    pub fn with_counts(mut self, script: impl IntoIterator<Item = u32>) -> Self {
        self.counts = script.into_iter().collect();
        self
    }
}

fn next_cycled<T: Copy>(script: &mut VecDeque<T>) -> Option<T> {
    let value = script.pop_front()?;
    script.push_back(value);
    Some(value)
}

impl Vision for ScriptedVision {
    fn classify_shape(&mut self, mask: ShapeMask) -> Shape {
        self.shapes
            .get_mut(&mask)
            .and_then(next_cycled)
            .unwrap_or(Shape::Unknown)
    }

    fn count_objects(&mut self) -> u32 {
        next_cycled(&mut self.counts).unwrap_or(0)
    }
}
