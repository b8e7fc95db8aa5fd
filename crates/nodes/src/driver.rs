//! The automation driver: the pointer/keyboard collaborator every node
//! performs its side effects through.
//!
//! All calls are synchronous and block for the duration of the physical
//! action, so the engine runs nodes on blocking threads.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// A screen coordinate in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Mouse button addressed by a click or drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
            Self::Middle => write!(f, "middle"),
        }
    }
}

impl FromStr for MouseButton {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left"   => Ok(Self::Left),
            "right"  => Ok(Self::Right),
            "middle" => Ok(Self::Middle),
            other    => Err(format!("unsupported button '{other}'")),
        }
    }
}

/// Scroll wheel axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAxis {
    Vertical,
    Horizontal,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by an automation driver.
#[derive(Debug, Error, Clone)]
pub enum DriverError {
    /// The underlying input device refused an action.
    #[error("{action} failed: {message}")]
    ActionFailed {
        action: &'static str,
        message: String,
    },

    /// The driver cannot reach an input device at all.
    #[error("automation backend unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// AutomationDriver
// ---------------------------------------------------------------------------

/// Pointer and keyboard primitives consumed by the built-in nodes.
///
/// Implementations are shared between worker threads, hence `Send + Sync`.
pub trait AutomationDriver: Send + Sync {
    /// Current pointer location.
    fn pointer_location(&self) -> Point;

    /// Teleport the pointer.
    fn move_pointer(&self, to: Point) -> Result<(), DriverError>;

    /// Move the pointer along a human-like path.
    ///
    /// `jitter` is the `(low, high)` randomness band of the path and
    /// `delay_ms` the per-step pause.  Returns `false` when the smooth path
    /// could not be completed.
    fn move_pointer_smooth(&self, to: Point, jitter: (f64, f64), delay_ms: u64) -> bool;

    fn press_button(&self, button: MouseButton) -> Result<(), DriverError>;

    fn release_button(&self, button: MouseButton) -> Result<(), DriverError>;

    fn click(&self, button: MouseButton) -> Result<(), DriverError>;

    fn type_text(&self, text: &str) -> Result<(), DriverError>;

    fn tap_key(&self, key: &str) -> Result<(), DriverError>;

    fn scroll(&self, amount: i32, axis: ScrollAxis) -> Result<(), DriverError>;

    /// Block the calling thread.  Drivers that don't need real time (test
    /// doubles) may override this.
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ---------------------------------------------------------------------------
// LoggingDriver
// ---------------------------------------------------------------------------

/// Dry-run driver: logs every action and tracks a virtual pointer instead of
/// touching a real input device.
#[derive(Debug, Default)]
pub struct LoggingDriver {
    pointer: Mutex<Point>,
}

impl LoggingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_pointer(&self, to: Point) {
        if let Ok(mut pointer) = self.pointer.lock() {
            *pointer = to;
        }
    }
}

impl AutomationDriver for LoggingDriver {
    fn pointer_location(&self) -> Point {
        self.pointer.lock().map(|p| *p).unwrap_or_default()
    }

    fn move_pointer(&self, to: Point) -> Result<(), DriverError> {
        info!(x = to.x, y = to.y, "move pointer");
        self.set_pointer(to);
        Ok(())
    }

    fn move_pointer_smooth(&self, to: Point, jitter: (f64, f64), delay_ms: u64) -> bool {
        info!(x = to.x, y = to.y, low = jitter.0, high = jitter.1, delay_ms, "smooth pointer move");
        self.set_pointer(to);
        true
    }

    fn press_button(&self, button: MouseButton) -> Result<(), DriverError> {
        info!(%button, "press button");
        Ok(())
    }

    fn release_button(&self, button: MouseButton) -> Result<(), DriverError> {
        info!(%button, "release button");
        Ok(())
    }

    fn click(&self, button: MouseButton) -> Result<(), DriverError> {
        info!(%button, "click");
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), DriverError> {
        info!(chars = text.chars().count(), "type text");
        Ok(())
    }

    fn tap_key(&self, key: &str) -> Result<(), DriverError> {
        info!(key, "tap key");
        Ok(())
    }

    fn scroll(&self, amount: i32, axis: ScrollAxis) -> Result<(), DriverError> {
        info!(amount, ?axis, "scroll");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mouse_button_parses_known_names_only() {
        assert_eq!("left".parse::<MouseButton>(), Ok(MouseButton::Left));
        assert_eq!("middle".parse::<MouseButton>(), Ok(MouseButton::Middle));
        assert!("Left".parse::<MouseButton>().is_err());
    }

    #[test]
    fn logging_driver_tracks_virtual_pointer() {
        let driver = LoggingDriver::new();
        driver.move_pointer(Point::new(10, 20)).unwrap();
        assert_eq!(driver.pointer_location(), Point::new(10, 20));
        assert!(driver.move_pointer_smooth(Point::new(5, 5), (1.0, 1.2), 10));
        assert_eq!(driver.pointer_location(), Point::new(5, 5));
    }
}
