use std::sync::Arc;

use shamble_scene::{NodeId, Scene};

use crate::clip::{AnimationClip, Pose, Property};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    Once,
    #[default]
    Repeat,
    PingPong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionId(usize);

/// Playback state of one clip inside a mixer.
#[derive(Debug, Clone)]
pub struct AnimationAction {
    clip: Arc<AnimationClip>,
    /// Binding index per clip track, `None` for tracks that found no node.
    bindings: Vec<Option<usize>>,
    time: f32,
    time_scale: f32,
    weight: f32,
    loop_mode: LoopMode,
    running: bool,
    paused: bool,
}

impl AnimationAction {
    pub fn play(&mut self) -> &mut Self {
        self.running = true;
        self.paused = false;
        self
    }

    pub fn stop(&mut self) -> &mut Self {
        self.running = false;
        self.time = 0.0;
        self
    }

    pub fn set_loop(&mut self, mode: LoopMode) -> &mut Self {
        self.loop_mode = mode;
        self
    }

    pub fn set_time_scale(&mut self, scale: f32) -> &mut Self {
        self.time_scale = scale;
        self
    }

    pub fn set_weight(&mut self, weight: f32) -> &mut Self {
        self.weight = weight.clamp(0.0, 1.0);
        self
    }

    pub fn clip(&self) -> &Arc<AnimationClip> {
        &self.clip
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn bound_tracks(&self) -> usize {
        self.bindings.iter().flatten().count()
    }

    fn advance(&mut self, dt: f32) {
        if !self.running || self.paused || dt == 0.0 {
            return;
        }
        let duration = self.clip.duration;
        let t = self.time + dt * self.time_scale;
        self.time = match self.loop_mode {
            LoopMode::Once => {
                let clamped = t.clamp(0.0, duration);
                if clamped != t || clamped == duration {
                    // Finished: keep the last pose on screen.
                    self.paused = true;
                }
                clamped
            }
            LoopMode::Repeat if duration > 0.0 => t.rem_euclid(duration),
            LoopMode::PingPong if duration > 0.0 => t.rem_euclid(duration * 2.0),
            _ => 0.0,
        };
    }

    /// Clip-local time to sample at.
    fn sample_time(&self) -> f32 {
        let duration = self.clip.duration;
        match self.loop_mode {
            LoopMode::PingPong if self.time > duration => 2.0 * duration - self.time,
            _ => self.time,
        }
    }

    fn contributes(&self) -> bool {
        self.running && self.weight > 0.0
    }
}

#[derive(Debug, Clone)]
struct Binding {
    node: NodeId,
    property: Property,
    rest: Pose,
}

/// Drives clip playback for one node hierarchy.
#[derive(Debug, Clone)]
pub struct AnimationMixer {
    root: NodeId,
    time: f64,
    bindings: Vec<Binding>,
    actions: Vec<AnimationAction>,
}

impl AnimationMixer {
    pub fn new(root: NodeId) -> Self {
        Self {
            root,
            time: 0.0,
            bindings: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Seconds this mixer has been advanced by in total.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Returns the action for `clip`, creating it (stopped) on first use.
    pub fn clip_action(&mut self, clip: Arc<AnimationClip>, scene: &Scene) -> ActionId {
        if let Some(index) = self.actions.iter().position(|a| Arc::ptr_eq(&a.clip, &clip)) {
            return ActionId(index);
        }

        let root = self.root;
        let bindings = clip
            .tracks
            .iter()
            .map(|track| {
                let Some(node) = scene.find_by_name(root, &track.target) else {
                    log::debug!("clip '{}': no node named '{}'", clip.name, track.target);
                    return None;
                };
                Some(self.bind(scene, node, track.property()))
            })
            .collect();

        self.actions.push(AnimationAction {
            clip,
            bindings,
            time: 0.0,
            time_scale: 1.0,
            weight: 1.0,
            loop_mode: LoopMode::Repeat,
            running: false,
            paused: false,
        });
        ActionId(self.actions.len() - 1)
    }

    fn bind(&mut self, scene: &Scene, node: NodeId, property: Property) -> usize {
        if let Some(i) = self
            .bindings
            .iter()
            .position(|b| b.node == node && b.property == property)
        {
            return i;
        }
        let t = scene.node(node).transform;
        let rest = match property {
            Property::Translation => Pose::Vec3(t.translation),
            Property::Rotation => Pose::Quat(t.rotation),
            Property::Scale => Pose::Vec3(t.scale),
        };
        self.bindings.push(Binding {
            node,
            property,
            rest,
        });
        self.bindings.len() - 1
    }

    pub fn action(&self, id: ActionId) -> &AnimationAction {
        &self.actions[id.0]
    }

    pub fn action_mut(&mut self, id: ActionId) -> &mut AnimationAction {
        &mut self.actions[id.0]
    }

    pub fn actions(&self) -> impl Iterator<Item = &AnimationAction> {
        self.actions.iter()
    }

    /// Advances the mixer clock and every playing action by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        if dt == 0.0 {
            return;
        }
        self.time += f64::from(dt);
        for action in &mut self.actions {
            action.advance(dt);
        }
    }

    /// Writes the blended pose of all contributing actions into the scene.
    pub fn apply(&self, scene: &mut Scene) {
        let mut accum: Vec<Option<(Pose, f32)>> = vec![None; self.bindings.len()];

        for action in self.actions.iter().filter(|a| a.contributes()) {
            let time = action.sample_time();
            for (track, binding) in action.clip.tracks.iter().zip(&action.bindings) {
                let Some(b) = *binding else { continue };
                let Some(pose) = track.sample(time) else {
                    continue;
                };
                accum[b] = Some(match accum[b] {
                    None => (pose, action.weight),
                    Some((acc, w)) => {
                        let total = w + action.weight;
                        (blend(acc, pose, action.weight / total), total)
                    }
                });
            }
        }

        for (binding, slot) in self.bindings.iter().zip(accum) {
            let Some((pose, weight)) = slot else { continue };
            let pose = if weight < 1.0 {
                blend(binding.rest, pose, weight)
            } else {
                pose
            };
            let transform = &mut scene.node_mut(binding.node).transform;
            match (binding.property, pose) {
                (Property::Translation, Pose::Vec3(v)) => transform.translation = v,
                (Property::Scale, Pose::Vec3(v)) => transform.scale = v,
                (Property::Rotation, Pose::Quat(q)) => transform.rotation = q,
                _ => log::warn!("pose type does not match bound property {:?}", binding.property),
            }
        }
    }
}

fn blend(from: Pose, to: Pose, t: f32) -> Pose {
    match (from, to) {
        (Pose::Vec3(a), Pose::Vec3(b)) => Pose::Vec3(a.lerp(b, t)),
        (Pose::Quat(a), Pose::Quat(b)) => Pose::Quat(a.slerp(b, t)),
        (_, to) => to,
    }
}
