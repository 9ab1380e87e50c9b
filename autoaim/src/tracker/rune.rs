use std::collections::VecDeque;

use log::{info, warn};
use nalgebra::{Matrix1, Matrix2, Vector1, Vector2};

use super::{
    Tracker, TrackerCore, VanishState,
    kalman_filter::{KalmanFilter, observe_leading},
    stamped,
};
use crate::{
    Combo, Error, GyroData, Params, Result, RobotType, RuneTrackerParams,
    geometry::{direction, distance, shortest_delta_degrees, wrap_degrees},
};

/// Tracks a rune arm spinning about a fixed hub through any number of turns.
///
/// Observed angles are wrapped into `[0, 360)`. The tracker counts whole
/// revolutions so its filter sees a continuous total angle.
#[derive(Clone, Debug)]
pub struct RuneTracker {
    core: TrackerCore,
    params: RuneTrackerParams,
    /// Total angle and angular velocity, in degrees and degrees per second.
    filter: KalmanFilter<2, 1>,
    round: i32,
    total_angle: f32,
}

impl RuneTracker {
    pub fn new(combo: Combo, params: &Params) -> Result<Self> {
        if combo.as_rune().is_none() {
            return Err(Error::ComboKind {
                expected: "Rune",
                actual: combo.kind_name(),
            });
        }
        let rune = params.rune.clone();
        let angle = combo.angle();
        let filter = KalmanFilter::new(
            Vector2::new(angle, 0.0),
            Matrix2::new(
                rune.measurement_noise,
                0.0,
                0.0,
                rune.initial_speed_variance,
            ),
            observe_leading(),
            Matrix1::new(rune.measurement_noise),
        );
        info!(target: "tracker", "rune tracker created at {angle:.1} degrees");

        Ok(Self {
            core: TrackerCore::new(combo, &params.tracker),
            params: rune,
            filter,
            round: 0,
            total_angle: angle,
        })
    }

    /// Number of whole revolutions in the total angle, negative when turning clockwise.
    #[inline]
    pub fn round(&self) -> i32 {
        self.round
    }

    /// Unfiltered total angle of the latest sample in degrees.
    #[inline]
    pub fn total_angle(&self) -> f32 {
        self.total_angle
    }

    #[inline]
    pub fn filtered_angle(&self) -> f32 {
        self.filter.mean()[0]
    }

    /// Lifts the wrapped `angle` onto the revolution closest to the filtered angle.
    fn unwrap_angle(&mut self, angle: f32) {
        let reference = self.filter.mean()[0];
        let delta = shortest_delta_degrees(wrap_degrees(reference), angle);
        self.round = ((reference + delta - angle) / 360.0).round() as i32;
        self.total_angle = angle + self.round as f32 * 360.0;
    }

    fn observe(&mut self, combo: Combo, tick: f64) {
        let (dt, tick) = self.core.advance(tick);

        self.unwrap_angle(combo.angle());
        self.filter.predict(dt, self.params.process_noise);
        self.filter.update(Vector1::new(self.total_angle));

        self.core.update_vanish_state(VanishState::Appear);
        self.core.push(stamped(combo, tick));
    }

    fn vanish(&mut self, tick: f64) {
        let (dt, tick) = self.core.advance(tick);

        self.filter.predict(dt, self.params.process_noise);
        self.total_angle = self.filter.mean()[0];
        self.round = (self.total_angle / 360.0).floor() as i32;

        let last = &self.core.front;
        let angle = wrap_degrees(self.total_angle);
        let combo = match last.as_rune() {
            Some(rune) => {
                let radius = distance(&last.center(), &rune.rotation_center);
                // Screen y points down, so counter-clockwise headings negate y
                let center = rune.rotation_center + direction(-angle) * radius;
                last.predicted(center, angle, tick)
            }
            None => last.clone_at(tick),
        };

        self.core.update_vanish_state(VanishState::Vanish);
        self.core.push(combo);
    }
}

impl Tracker for RuneTracker {
    fn update(&mut self, combo: Option<Combo>, tick: f64, _gyro: &GyroData) {
        match combo {
            Some(combo) if combo.as_rune().is_some() => self.observe(combo, tick),
            Some(combo) => {
                warn!(target: "tracker", "rune tracker ignored a {} combo", combo.kind_name());
                self.vanish(tick);
            }
            None => self.vanish(tick),
        }
    }

    fn update_vanish_state(&mut self, state: VanishState) {
        self.core.update_vanish_state(state);
    }

    fn vanish_count(&self) -> u32 {
        self.core.vanish_count
    }

    /// Filtered angular velocity in degrees per second, counter-clockwise positive.
    fn rotated_speed(&self) -> f32 {
        self.filter.mean()[1]
    }

    fn front(&self) -> &Combo {
        &self.core.front
    }

    fn history(&self) -> &VecDeque<Combo> {
        &self.core.history
    }

    fn robot_type(&self) -> RobotType {
        self.core.front.robot_type()
    }

    fn sample_time(&self) -> f32 {
        self.core.sample_time
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{Point2, point};
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use rand_distr::Normal;

    use super::*;
    use crate::{ArmorParams, Blob, CameraParams, Feature, FeatureKind};

    const RADIUS: f32 = 100.0;

    fn hub() -> Point2<f32> {
        point![500.0, 500.0]
    }

    fn part(center: Point2<f32>, kind: FeatureKind) -> Feature {
        Feature::rune_part(&Blob::new(center, 10.0, 20.0, 0.0), kind).unwrap()
    }

    fn rune_at(degrees: f32, tick: f64) -> Combo {
        let target = hub() + direction(-degrees) * RADIUS;
        Combo::rune(
            &part(target, FeatureKind::RuneTarget),
            &part(hub(), FeatureKind::RuneCenter),
            tick,
        )
        .unwrap()
    }

    fn tracker(degrees: f32) -> RuneTracker {
        RuneTracker::new(rune_at(degrees, 0.0), &Params::default()).unwrap()
    }

    /// Feeds a rotation at `speed` degrees per second sampled every 10 ms.
    fn spin(tracker: &mut RuneTracker, start: f32, speed: f32, steps: usize, noise: f32) {
        let mut rng = StdRng::seed_from_u64(3);
        let noise = Normal::new(0.0f32, noise).unwrap();
        for step in 1..=steps {
            let seconds = step as f32 * 0.01;
            let angle = wrap_degrees(start + speed * seconds + rng.sample(noise));
            let tick = f64::from(seconds) * 1000.0;
            tracker.update(Some(rune_at(angle, tick)), tick, &GyroData::default());
        }
    }

    #[test]
    fn new_rejects_other_kinds() {
        let light = |x: f32| {
            Feature::light_blob(
                &Blob::new(point![x, 200.0], 5.0, 20.0, 0.0),
                &Default::default(),
            )
            .unwrap()
        };
        let armor = Combo::armor(
            &light(100.0),
            &light(150.0),
            &ArmorParams::default(),
            &CameraParams::default(),
            &GyroData::default(),
            0.0,
        )
        .unwrap();

        assert_eq!(
            RuneTracker::new(armor, &Params::default()).unwrap_err(),
            Error::ComboKind {
                expected: "Rune",
                actual: "Armor"
            }
        );
    }

    #[test]
    fn unwrap_counts_revolution() {
        let mut tracker = tracker(350.0);
        let gyro = GyroData::default();
        let mut totals = vec![tracker.total_angle()];

        for (angle, tick) in [(5.0, 10.0), (15.0, 20.0)] {
            tracker.update(Some(rune_at(angle, tick)), tick, &gyro);
            totals.push(tracker.total_angle());
            assert_eq!(tracker.round(), 1);
        }

        assert!(totals.windows(2).all(|pair| pair[0] < pair[1]));
        assert!((totals[1] - 365.0).abs() < 1e-3);
        assert!((totals[2] - 375.0).abs() < 1e-3);
    }

    #[test]
    fn unwrap_counts_backwards() {
        let mut tracker = tracker(10.0);
        tracker.update(Some(rune_at(355.0, 10.0)), 10.0, &GyroData::default());

        assert_eq!(tracker.round(), -1);
        assert!((tracker.total_angle() + 5.0).abs() < 1e-3);
    }

    #[test]
    fn estimates_speed_over_turns() {
        let mut tracker = tracker(10.0);
        spin(&mut tracker, 10.0, 90.0, 500, 0.5);

        assert!((tracker.rotated_speed() - 90.0).abs() < 5.0);
        assert_eq!(tracker.round(), 1);
        assert!((tracker.filtered_angle() - 460.0).abs() < 2.0);
    }

    #[test]
    fn estimates_clockwise_speed() {
        let mut tracker = tracker(10.0);
        spin(&mut tracker, 10.0, -90.0, 500, 0.5);

        assert!((tracker.rotated_speed() + 90.0).abs() < 5.0);
        assert_eq!(tracker.round(), -2);
    }

    #[test]
    fn vanish_predicts_and_recovers() {
        let mut tracker = tracker(0.0);
        spin(&mut tracker, 0.0, 60.0, 200, 0.0);
        let gyro = GyroData::default();
        let last_tick = tracker.front().tick();
        let before = tracker.total_angle();

        for _ in 0..10 {
            tracker.update(None, last_tick, &gyro);
        }

        assert_eq!(tracker.vanish_count(), 10);
        let mut ticks = tracker
            .history()
            .iter()
            .take(9)
            .map(Combo::tick)
            .collect::<Vec<_>>();
        ticks.insert(0, tracker.front().tick());
        assert!(ticks.windows(2).all(|pair| pair[0] > pair[1]));
        assert!(ticks[9] > last_tick);

        let front = tracker.front();
        assert!(tracker.total_angle() > before);
        assert_eq!(tracker.round(), (tracker.total_angle() / 360.0).floor() as i32);
        assert!((front.angle() - wrap_degrees(tracker.total_angle())).abs() < 1e-3);
        assert!((distance(&front.center(), &hub()) - RADIUS).abs() < 1e-2);
        let expected = hub() + direction(-front.angle()) * RADIUS;
        assert!((front.center() - expected).norm() < 1e-2);

        let tick = front.tick() + 10.0;
        let angle = wrap_degrees(tracker.total_angle() + 0.6);
        tracker.update(Some(rune_at(angle, tick)), tick, &gyro);
        assert_eq!(tracker.vanish_count(), 0);
        assert!((tracker.rotated_speed() - 60.0).abs() < 5.0);
    }

    #[test]
    fn duplicate_ticks_stay_finite() {
        let mut tracker = tracker(30.0);
        let gyro = GyroData::default();
        for _ in 0..5 {
            tracker.update(Some(rune_at(31.0, 0.0)), 0.0, &gyro);
        }

        assert!(tracker.rotated_speed().is_finite());
        assert!(tracker.filtered_angle().is_finite());
        assert!(tracker.front().tick() > tracker.history()[0].tick());
    }

    #[test]
    fn wrong_kind_update_counts_as_vanish() {
        let mut tracker = tracker(30.0);
        let light = Feature::light_blob(
            &Blob::new(point![10.0, 10.0], 5.0, 20.0, 0.0),
            &Default::default(),
        )
        .unwrap();

        tracker.update(Some(Combo::single(light, 10.0)), 10.0, &GyroData::default());

        assert_eq!(tracker.vanish_count(), 1);
        assert!(tracker.front().as_rune().is_some());
    }
}
