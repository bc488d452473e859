//! Frame identification types.
//!
//! Frames name the coordinate systems poses are expressed in, in the same
//! spirit as TF frame_id strings.

use serde::{Deserialize, Serialize};

/// Identifies a coordinate frame.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameId {
    /// World/base coordinate frame
    World,

    /// Any other frame, by name (links, tool frames, fixtures)
    Named(String),
}

impl FrameId {
    /// Name used for [`FrameId::World`] when parsing and printing.
    pub const WORLD_NAME: &'static str = "world";

    /// Create a frame from a name. `"world"` maps to [`FrameId::World`].
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        if name == Self::WORLD_NAME {
            FrameId::World
        } else {
            FrameId::Named(name)
        }
    }

    /// The frame name as it would appear in a message header.
    pub fn as_str(&self) -> &str {
        match self {
            FrameId::World => Self::WORLD_NAME,
            FrameId::Named(name) => name,
        }
    }

    /// True for a named frame with an empty or whitespace-only name.
    pub fn is_blank(&self) -> bool {
        match self {
            FrameId::World => false,
            FrameId::Named(name) => name.trim().is_empty(),
        }
    }
}

impl Default for FrameId {
    fn default() -> Self {
        FrameId::World
    }
}

impl From<&str> for FrameId {
    fn from(name: &str) -> Self {
        FrameId::named(name)
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
