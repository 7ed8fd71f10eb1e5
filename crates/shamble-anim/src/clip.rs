//! Keyframe tracks and clips.
//!
//! Tracks address nodes by name so a clip loaded from one file can drive a
//! hierarchy loaded from another.

use glam::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
    /// Values are stored as `(in_tangent, value, out_tangent)` triplets.
    CubicSpline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Translation,
    Rotation,
    Scale,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackValues {
    Translation(Vec<Vec3>),
    Rotation(Vec<Quat>),
    Scale(Vec<Vec3>),
}

impl TrackValues {
    pub fn property(&self) -> Property {
        match self {
            TrackValues::Translation(_) => Property::Translation,
            TrackValues::Rotation(_) => Property::Rotation,
            TrackValues::Scale(_) => Property::Scale,
        }
    }

    fn len(&self) -> usize {
        match self {
            TrackValues::Translation(v) | TrackValues::Scale(v) => v.len(),
            TrackValues::Rotation(v) => v.len(),
        }
    }
}

/// A sampled property value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pose {
    Vec3(Vec3),
    Quat(Quat),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub target: String,
    pub times: Vec<f32>,
    pub values: TrackValues,
    pub interpolation: Interpolation,
}

impl Track {
    pub fn new(
        target: impl Into<String>,
        times: Vec<f32>,
        values: TrackValues,
        interpolation: Interpolation,
    ) -> Self {
        Self {
            target: target.into(),
            times,
            values,
            interpolation,
        }
    }

    pub fn property(&self) -> Property {
        self.values.property()
    }

    pub fn end_time(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }

    /// Whether the value count matches the keyframe count.
    pub fn is_well_formed(&self) -> bool {
        let per_key = match self.interpolation {
            Interpolation::CubicSpline => 3,
            _ => 1,
        };
        !self.times.is_empty() && self.values.len() == self.times.len() * per_key
    }

    /// Samples the track at `time`, clamping outside the keyframe range.
    pub fn sample(&self, time: f32) -> Option<Pose> {
        if !self.is_well_formed() {
            return None;
        }
        let (k, t, dt) = locate(&self.times, time);
        Some(match &self.values {
            TrackValues::Translation(v) | TrackValues::Scale(v) => {
                Pose::Vec3(sample_vec3(v, self.interpolation, k, t, dt))
            }
            TrackValues::Rotation(v) => Pose::Quat(sample_quat(v, self.interpolation, k, t, dt)),
        })
    }
}

/// Returns the keyframe index at or before `time`, the normalized position
/// towards the next keyframe and the gap between the two.
fn locate(times: &[f32], time: f32) -> (usize, f32, f32) {
    let last = times.len() - 1;
    if last == 0 || time <= times[0] {
        return (0, 0.0, 0.0);
    }
    if time >= times[last] {
        return (last, 0.0, 0.0);
    }
    let next = times.partition_point(|&t| t <= time);
    let k = next - 1;
    let dt = times[next] - times[k];
    let t = if dt > 0.0 { (time - times[k]) / dt } else { 0.0 };
    (k, t, dt)
}

fn hermite(v0: Vec3, out0: Vec3, v1: Vec3, in1: Vec3, t: f32, dt: f32) -> Vec3 {
    let t2 = t * t;
    let t3 = t2 * t;
    v0 * (2.0 * t3 - 3.0 * t2 + 1.0)
        + out0 * dt * (t3 - 2.0 * t2 + t)
        + v1 * (-2.0 * t3 + 3.0 * t2)
        + in1 * dt * (t3 - t2)
}

fn sample_vec3(v: &[Vec3], mode: Interpolation, k: usize, t: f32, dt: f32) -> Vec3 {
    match mode {
        Interpolation::Step => v[k],
        Interpolation::Linear => {
            if t == 0.0 {
                v[k]
            } else {
                v[k].lerp(v[k + 1], t)
            }
        }
        Interpolation::CubicSpline => {
            if t == 0.0 {
                v[k * 3 + 1]
            } else {
                hermite(v[k * 3 + 1], v[k * 3 + 2], v[k * 3 + 4], v[k * 3 + 3], t, dt)
            }
        }
    }
}

fn sample_quat(v: &[Quat], mode: Interpolation, k: usize, t: f32, dt: f32) -> Quat {
    match mode {
        Interpolation::Step => v[k].normalize(),
        Interpolation::Linear => {
            if t == 0.0 {
                v[k].normalize()
            } else {
                v[k].normalize().slerp(v[k + 1].normalize(), t)
            }
        }
        Interpolation::CubicSpline => {
            if t == 0.0 {
                return v[k * 3 + 1].normalize();
            }
            let as_vec = |q: Quat| glam::Vec4::from(q);
            let p = |a: glam::Vec4, b: glam::Vec4, c: glam::Vec4, d: glam::Vec4| {
                let t2 = t * t;
                let t3 = t2 * t;
                a * (2.0 * t3 - 3.0 * t2 + 1.0)
                    + b * dt * (t3 - 2.0 * t2 + t)
                    + c * (-2.0 * t3 + 3.0 * t2)
                    + d * dt * (t3 - t2)
            };
            let q = p(
                as_vec(v[k * 3 + 1]),
                as_vec(v[k * 3 + 2]),
                as_vec(v[k * 3 + 4]),
                as_vec(v[k * 3 + 3]),
            );
            Quat::from_vec4(q).normalize()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub tracks: Vec<Track>,
}

impl AnimationClip {
    /// Builds a clip whose duration is the latest keyframe of any track.
    pub fn new(name: impl Into<String>, tracks: Vec<Track>) -> Self {
        let duration = tracks.iter().map(Track::end_time).fold(0.0, f32::max);
        Self {
            name: name.into(),
            duration,
            tracks,
        }
    }
}
