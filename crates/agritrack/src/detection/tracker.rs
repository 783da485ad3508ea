//! Tracker seam and the built-in center-point tracker.
//!
//! Every track carries a hit counter. A matched frame raises it by one
//! (capped at `hit_counter_max`), a missed frame lowers it by one, and the
//! track dies once the counter drops below zero. A fresh track starts at 1
//! and is only reported, with a permanent identity, once its counter exceeds
//! `initialization_delay`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{BoundingBox, Point, TrackInput, TrackedObject};

/// Common interface for multi-object trackers.
pub trait Tracker: Send {
    /// Advance one frame. Must be called for every frame, including frames
    /// with no accepted detections.
    fn update(&mut self, inputs: &[TrackInput]) -> Vec<TrackedObject>;

    /// Drop all tracks and restart identity assignment.
    fn reset(&mut self);
}

impl<T: Tracker + ?Sized> Tracker for Box<T> {
    fn update(&mut self, inputs: &[TrackInput]) -> Vec<TrackedObject> {
        (**self).update(inputs)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum center distance (pixels) for a detection to match a track.
    pub distance_threshold: f32,
    /// Upper bound on the hit counter, i.e. how many missed frames a
    /// well-established track survives.
    pub hit_counter_max: u32,
    /// A track is confirmed once its hit counter exceeds this value.
    pub initialization_delay: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 30.0,
            hit_counter_max: 60,
            initialization_delay: 3,
        }
    }
}

#[derive(Debug, Clone)]
struct Track {
    /// Permanent identity, assigned on confirmation.
    id: Option<u64>,
    center: Point,
    velocity: Point,
    hit_counter: i64,
    matched: Option<BoundingBox>,
}

impl Track {
    fn predicted(&self) -> Point {
        Point::new(self.center.x + self.velocity.x, self.center.y + self.velocity.y)
    }
}

/// Greedy nearest-center tracker with a constant-velocity estimate.
#[derive(Debug, Clone)]
pub struct CentroidTracker {
    config: TrackerConfig,
    tracks: BTreeMap<u64, Track>,
    next_slot: u64,
    next_id: u64,
}

impl CentroidTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            next_slot: 0,
            next_id: 1,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Number of live tracks, confirmed or not.
    pub fn live_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Pairs (slot, input index) by ascending distance, each used once.
    fn match_inputs(&self, inputs: &[TrackInput]) -> Vec<(u64, usize)> {
        let mut candidates: Vec<(f32, u64, usize)> = Vec::new();
        for (slot, track) in &self.tracks {
            let predicted = track.predicted();
            for (idx, input) in inputs.iter().enumerate() {
                let distance = predicted.distance(&input.center);
                if distance <= self.config.distance_threshold {
                    candidates.push((distance, *slot, idx));
                }
            }
        }
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut used_tracks = Vec::new();
        let mut used_inputs = vec![false; inputs.len()];
        let mut pairs = Vec::new();
        for (_, slot, idx) in candidates {
            if used_inputs[idx] || used_tracks.contains(&slot) {
                continue;
            }
            used_inputs[idx] = true;
            used_tracks.push(slot);
            pairs.push((slot, idx));
        }
        pairs
    }
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl Tracker for CentroidTracker {
    fn update(&mut self, inputs: &[TrackInput]) -> Vec<TrackedObject> {
        let pairs = self.match_inputs(inputs);
        let hit_max = i64::from(self.config.hit_counter_max.max(1));

        let mut matched_inputs = vec![false; inputs.len()];
        for track in self.tracks.values_mut() {
            track.matched = None;
        }
        for (slot, idx) in pairs {
            matched_inputs[idx] = true;
            if let Some(track) = self.tracks.get_mut(&slot) {
                let input = &inputs[idx];
                track.velocity = Point::new(
                    input.center.x - track.center.x,
                    input.center.y - track.center.y,
                );
                track.center = input.center;
                track.hit_counter = (track.hit_counter + 1).min(hit_max);
                track.matched = Some(input.bbox);
            }
        }

        for track in self.tracks.values_mut() {
            if track.matched.is_none() {
                track.center = track.predicted();
                track.hit_counter -= 1;
            }
        }
        self.tracks.retain(|_, t| t.hit_counter >= 0);

        for (idx, input) in inputs.iter().enumerate() {
            if matched_inputs[idx] {
                continue;
            }
            self.tracks.insert(
                self.next_slot,
                Track {
                    id: None,
                    center: input.center,
                    velocity: Point::default(),
                    hit_counter: 1,
                    matched: Some(input.bbox),
                },
            );
            self.next_slot += 1;
        }

        let delay = i64::from(self.config.initialization_delay);
        let mut reported = Vec::new();
        for track in self.tracks.values_mut() {
            if track.id.is_none() && track.hit_counter > delay {
                track.id = Some(self.next_id);
                self.next_id += 1;
            }
            if let Some(id) = track.id {
                reported.push(TrackedObject {
                    id,
                    estimate: track.center,
                    last_detection: track.matched,
                });
            }
        }
        reported
    }

    fn reset(&mut self) {
        self.tracks.clear();
        self.next_slot = 0;
        self.next_id = 1;
    }
}
