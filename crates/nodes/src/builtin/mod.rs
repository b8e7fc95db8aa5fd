//! Built-in automation nodes, one per type tag.

mod click;
mod delay;
mod keyboard;
mod mouse_move;
mod start;

pub use click::ClickNode;
pub use delay::DelayNode;
pub use keyboard::{KeyTapNode, TypeStringNode};
pub use mouse_move::MoveMouseNode;
pub use start::StartNode;

/// Type tags of the built-in nodes as they appear in flow documents.
pub mod tags {
    pub const START: &str = "Start";
    pub const MOVE_MOUSE: &str = "MoveMouse";
    pub const CLICK: &str = "Click";
    pub const TYPE_STRING: &str = "TypeString";
    pub const KEY_TAP: &str = "KeyTap";
    pub const DELAY: &str = "Delay";
}

/// Pause after keyboard actions and scroll passes so the target application
/// can catch up.
pub(crate) const SETTLE: std::time::Duration = std::time::Duration::from_millis(100);
