//! Keyframe animation for scene node hierarchies.

pub mod clip;
pub mod mixer;

pub use clip::{AnimationClip, Interpolation, Pose, Property, Track, TrackValues};
pub use mixer::{ActionId, AnimationAction, AnimationMixer, LoopMode};
