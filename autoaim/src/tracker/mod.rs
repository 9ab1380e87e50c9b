//! Per-target estimators following one physical target across frames.
//!
//! A tracker is built from the first [`Combo`] of its target with every filter
//! already initialized. Each frame the owner calls [`Tracker::update`] with the
//! matched combo, or with `None` when the target was not seen, in which case the
//! tracker predicts and stores a synthesized combo in its place.

use std::collections::VecDeque;
use std::mem;

use log::debug;
use strum::Display;

use crate::{Combo, ComboKind, Error, GyroData, Params, Result, RobotType, TrackerParams};

mod gyro;
mod kalman_filter;
mod rune;
mod vote;

pub use gyro::GyroTracker;
pub use rune::RuneTracker;
pub use vote::TypeVote;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum VanishState {
    /// The target was missing in the latest frame.
    Vanish,
    /// The target was observed in the latest frame.
    Appear,
}

/// Capability shared by every tracker kind.
pub trait Tracker {
    /// Advances the tracker to `tick` milliseconds.
    ///
    /// `combo` is the observation matched to this tracker in the frame, `None`
    /// when the target was not observed. `gyro` is the latest inertial sample.
    fn update(&mut self, combo: Option<Combo>, tick: f64, gyro: &GyroData);

    /// Applies a vanish transition by hand.
    ///
    /// [`Tracker::update`] already applies the transition of every frame, so
    /// owners calling both would count each missed frame twice. This is only
    /// for overriding the counter, e.g. resetting it after re-association.
    fn update_vanish_state(&mut self, state: VanishState);

    /// Number of consecutive frames the target has been missing.
    fn vanish_count(&self) -> u32;

    /// Fused angular velocity of the target.
    fn rotated_speed(&self) -> f32;

    /// Latest combo, observed or synthesized.
    fn front(&self) -> &Combo;

    /// Combos before [`Tracker::front`], newest first.
    fn history(&self) -> &VecDeque<Combo>;

    fn robot_type(&self) -> RobotType;

    /// Time step of the latest update in seconds.
    fn sample_time(&self) -> f32;
}

/// A tracker of any kind, for owners keeping a single pool.
#[derive(Clone, Debug)]
pub enum AnyTracker {
    Rune(RuneTracker),
    Gyro(GyroTracker),
}

impl AnyTracker {
    /// Builds the tracker matching the kind of `combo`.
    pub fn new(combo: Combo, params: &Params) -> Result<Self> {
        match combo.kind() {
            ComboKind::Rune(_) => Ok(AnyTracker::Rune(RuneTracker::new(combo, params)?)),
            ComboKind::Armor(_) => Ok(AnyTracker::Gyro(GyroTracker::new(combo, params)?)),
            ComboKind::Single => Err(Error::ComboKind {
                expected: "Armor or Rune",
                actual: combo.kind_name(),
            }),
        }
    }

    pub fn as_rune(&self) -> Option<&RuneTracker> {
        match self {
            AnyTracker::Rune(tracker) => Some(tracker),
            AnyTracker::Gyro(_) => None,
        }
    }

    pub fn as_gyro(&self) -> Option<&GyroTracker> {
        match self {
            AnyTracker::Gyro(tracker) => Some(tracker),
            AnyTracker::Rune(_) => None,
        }
    }

    fn inner(&self) -> &dyn Tracker {
        match self {
            AnyTracker::Rune(tracker) => tracker,
            AnyTracker::Gyro(tracker) => tracker,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Tracker {
        match self {
            AnyTracker::Rune(tracker) => tracker,
            AnyTracker::Gyro(tracker) => tracker,
        }
    }
}

impl Tracker for AnyTracker {
    fn update(&mut self, combo: Option<Combo>, tick: f64, gyro: &GyroData) {
        self.inner_mut().update(combo, tick, gyro);
    }

    fn update_vanish_state(&mut self, state: VanishState) {
        self.inner_mut().update_vanish_state(state);
    }

    fn vanish_count(&self) -> u32 {
        self.inner().vanish_count()
    }

    fn rotated_speed(&self) -> f32 {
        self.inner().rotated_speed()
    }

    fn front(&self) -> &Combo {
        self.inner().front()
    }

    fn history(&self) -> &VecDeque<Combo> {
        self.inner().history()
    }

    fn robot_type(&self) -> RobotType {
        self.inner().robot_type()
    }

    fn sample_time(&self) -> f32 {
        self.inner().sample_time()
    }
}

/// Bookkeeping shared by every tracker kind.
#[derive(Clone, Debug)]
struct TrackerCore {
    front: Combo,
    history: VecDeque<Combo>,
    depth: usize,
    vanish_count: u32,
    last_tick: f64,
    sample_time: f32,
    min_sample_time: f32,
    max_sample_time: f32,
}

impl TrackerCore {
    fn new(combo: Combo, params: &TrackerParams) -> Self {
        let (min_sample_time, max_sample_time) =
            if params.min_sample_time <= params.max_sample_time {
                (params.min_sample_time, params.max_sample_time)
            } else {
                (params.max_sample_time, params.min_sample_time)
            };
        Self {
            last_tick: combo.tick(),
            front: combo,
            history: VecDeque::with_capacity(params.history_depth),
            depth: params.history_depth,
            vanish_count: 0,
            sample_time: min_sample_time,
            min_sample_time,
            max_sample_time,
        }
    }

    /// Steps the clock to `tick`, returning the filter time step in seconds and
    /// the tick to stamp the new sample with.
    ///
    /// The returned tick is always greater than the previous one and the time
    /// step always lies within `[min_sample_time, max_sample_time]`.
    fn advance(&mut self, tick: f64) -> (f32, f64) {
        let elapsed = tick - self.last_tick;
        let tick = if elapsed > 0.0 {
            tick
        } else {
            debug!(
                target: "tracker",
                "non-increasing tick {tick} after {}, stepping by the minimum sample time",
                self.last_tick
            );
            self.last_tick + f64::from(self.min_sample_time) * 1000.0
        };
        // max/min rather than clamp, bounds from unvalidated params may be NaN
        let dt = (((tick - self.last_tick) / 1000.0) as f32)
            .max(self.min_sample_time)
            .min(self.max_sample_time);
        if dt == self.max_sample_time {
            debug!(target: "tracker", "time step clamped to {dt} s");
        }

        self.last_tick = tick;
        self.sample_time = dt;
        (dt, tick)
    }

    fn push(&mut self, combo: Combo) {
        let previous = mem::replace(&mut self.front, combo);
        self.history.push_front(previous);
        self.history.truncate(self.depth);
    }

    fn update_vanish_state(&mut self, state: VanishState) {
        match state {
            VanishState::Vanish => self.vanish_count = self.vanish_count.saturating_add(1),
            VanishState::Appear => self.vanish_count = 0,
        }
    }
}

/// Restamps `combo` with `tick` unless it already carries it.
fn stamped(combo: Combo, tick: f64) -> Combo {
    if combo.tick() == tick {
        combo
    } else {
        combo.clone_at(tick)
    }
}
