//! Actuation sinks: drive base, indicator LEDs and the buzzer.
//!
//! Drivers implement these traits; mission code only ever talks to the
//! traits, so the simulated implementations in [`crate::sim`] and real
//! hardware drivers are interchangeable.

use rally_types::{Led, LedColor, MissionError, VelocityCommand};

/// Differential-drive velocity sink.
pub trait VelocitySink: Send {
    /// Command the drive base.
    ///
    /// # Errors
    ///
    /// Returns [`MissionError::Hardware`] if the command cannot be applied.
    fn send(&mut self, command: VelocityCommand) -> Result<(), MissionError>;
}

/// The two indicator LEDs.
pub trait IndicatorSink: Send {
    fn set(&mut self, led: Led, color: LedColor) -> Result<(), MissionError>;
}

/// One audible cue per call.
pub trait SoundSink: Send {
    fn beep(&mut self) -> Result<(), MissionError>;
}

/// LED colours that show `count` on the two indicators.
///
/// 0 → both off; 1 → LED1 primary; 2 → both primary; 3 or more → LED1
/// primary and LED2 secondary.
pub fn display_count(count: u32, primary: LedColor, secondary: LedColor) -> [(Led, LedColor); 2] {
    let (first, second) = match count {
        0 => (LedColor::Off, LedColor::Off),
        1 => (primary, LedColor::Off),
        2 => (primary, primary),
        _ => (primary, secondary),
    };
    [(Led::Led1, first), (Led::Led2, second)]
}
