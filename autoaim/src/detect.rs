use std::{cmp::Ordering, fmt::Debug};

use image::{Rgb, RgbImage};
use log::debug;
#[cfg(test)]
use mockall::automock;

use crate::{
    CameraParams, DetectorParams, GyroData, RobotType,
    combo::Combo,
    feature::{Blob, Feature},
};

/// A trait for labelling armor plates with the robot they belong to.
#[cfg_attr(test, automock)]
pub trait Classifier: Debug + Send + Sync {
    /// Classifies the armor `combo` found in `image`.
    fn classify(&self, image: &RgbImage, combo: &Combo) -> RobotType;
}

/// Result of one [`ArmorDetector::find`] pass.
#[derive(Debug, Default)]
pub struct DetectInfo {
    /// Light blobs that survived filtering, sorted by center x.
    pub features: Vec<Feature>,
    /// Armor plates that survived pruning and conflict resolution.
    pub combos: Vec<Combo>,
}

/// An armor candidate referencing its lights by index into the frame's feature list.
#[derive(Debug)]
struct Candidate {
    left: usize,
    right: usize,
    combo: Combo,
}

impl Candidate {
    #[inline]
    fn error(&self) -> f32 {
        self.combo.as_armor().map(|info| info.error).unwrap_or(f32::MAX)
    }
}

/// Assembles armor plates out of the light blobs of a single frame.
#[derive(Debug)]
pub struct ArmorDetector {
    params: DetectorParams,
    camera: CameraParams,
    classifier: Option<Box<dyn Classifier>>,
}

impl ArmorDetector {
    pub fn new(params: DetectorParams, camera: CameraParams) -> Self {
        Self {
            params,
            camera,
            classifier: None,
        }
    }

    /// Attaches a classifier. Without one every armor stays [`RobotType::Unknown`].
    pub fn with_classifier(self, classifier: Box<dyn Classifier>) -> Self {
        Self {
            classifier: Some(classifier),
            ..self
        }
    }

    /// Finds the light blobs and armor plates among `blobs`.
    ///
    /// `image` is the color frame `blobs` were extracted from, `gyro` and `tick`
    /// are the inertial sample and timestamp of that frame.
    pub fn find(
        &self,
        blobs: &[Blob],
        image: &RgbImage,
        gyro: &GyroData,
        tick: f64,
    ) -> DetectInfo {
        let mut features = self.find_light_blobs(blobs);
        self.erase_bright_blobs(image, &mut features);
        features.sort_by(|a, b| a.center().x.total_cmp(&b.center().x));

        let mut candidates = self.find_armors(&features, gyro, tick);
        erase_conflicts(&mut candidates);

        let mut combos = candidates
            .into_iter()
            .map(|candidate| match self.classifier.as_ref() {
                Some(classifier) => {
                    let robot = classifier.classify(image, &candidate.combo);
                    candidate.combo.with_robot_type(robot)
                }
                None => candidate.combo,
            })
            .collect::<Vec<_>>();
        if self.params.erase_unknown && self.classifier.is_some() {
            combos.retain(|combo| combo.robot_type() != RobotType::Unknown);
        }

        DetectInfo { features, combos }
    }

    fn find_light_blobs(&self, blobs: &[Blob]) -> Vec<Feature> {
        blobs
            .iter()
            .filter(|blob| blob.area >= self.params.min_contour_area)
            .filter_map(|blob| Feature::light_blob(blob, &self.params.light_blob))
            .collect()
    }

    /// Removes light blobs sitting in an overexposed highlight.
    fn erase_bright_blobs(&self, image: &RgbImage, features: &mut Vec<Feature>) {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return;
        }

        let count = self.params.brightness_offsets as i32;
        features.retain(|feature| {
            let total = (-count..=count)
                .filter(|i| *i != 0)
                .map(|i| {
                    let offset = feature.axis() * feature.height() * i as f32 / count as f32;
                    let point = feature.center() + offset;
                    let x = (point.x as i64).clamp(0, width as i64 - 1) as u32;
                    let y = (point.y as i64).clamp(0, height as i64 - 1) as u32;
                    let Rgb([r, g, b]) = *image.get_pixel(x, y);
                    (0.3 * r as f32 + 0.6 * g as f32 + 0.1 * b as f32) as u32
                })
                .sum::<u32>();
            let bright = total > self.params.brightness_threshold;
            if bright {
                debug!(
                    target: "detector",
                    "erase bright blob at {:?} with brightness {total}",
                    feature.center()
                );
            }
            !bright
        });
    }

    /// Pairs every two `features` (sorted by center x) into armor candidates.
    ///
    /// A pair is skipped when any feature between the two contains its center
    /// inside the pair's plate, which prevents matching through another light.
    fn find_armors(&self, features: &[Feature], gyro: &GyroData, tick: f64) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        if features.len() < 2 {
            return candidates;
        }

        for i in 0..features.len() - 1 {
            for j in i + 1..features.len() {
                let Some(combo) = Combo::armor(
                    &features[i],
                    &features[j],
                    &self.params.armor,
                    &self.camera,
                    gyro,
                    tick,
                ) else {
                    continue;
                };
                if features[i + 1..j]
                    .iter()
                    .any(|between| combo.contains(between))
                {
                    debug!(target: "detector", "prune armor {i}-{j} containing another light");
                    continue;
                }
                candidates.push(Candidate {
                    left: i,
                    right: j,
                    combo,
                });
            }
        }

        candidates
    }
}

/// Drops candidates that share a light with a better candidate.
///
/// Every pair sharing a light marks one loser in a single pass: the wider one
/// when the light has the same side in both, the one with the larger error when
/// the light is on opposite sides. Any candidate marked at least once is dropped.
fn erase_conflicts(candidates: &mut Vec<Candidate>) {
    if candidates.len() < 2 {
        return;
    }

    let mut removable = vec![false; candidates.len()];
    for i in 0..candidates.len() - 1 {
        for j in i + 1..candidates.len() {
            let (first, second) = (&candidates[i], &candidates[j]);
            let ordering = if first.left == second.left || first.right == second.right {
                compare_width(first, second)
            } else if first.left == second.right || first.right == second.left {
                compare_error(first, second)
            } else {
                continue;
            };
            let loser = if ordering == Ordering::Greater { i } else { j };
            removable[loser] = true;
        }
    }

    let mut removable = removable.into_iter();
    candidates.retain(|_| !removable.next().unwrap_or(false));
}

fn compare_width(first: &Candidate, second: &Candidate) -> Ordering {
    first
        .combo
        .width()
        .total_cmp(&second.combo.width())
        .then_with(|| first.error().total_cmp(&second.error()))
        .then_with(|| (first.left, first.right).cmp(&(second.left, second.right)))
}

fn compare_error(first: &Candidate, second: &Candidate) -> Ordering {
    first
        .error()
        .total_cmp(&second.error())
        .then_with(|| first.combo.width().total_cmp(&second.combo.width()))
        .then_with(|| (first.left, first.right).cmp(&(second.left, second.right)))
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use nalgebra::point;

    use super::*;

    fn blob(x: f32, y: f32, height: f32) -> Blob {
        Blob::new(point![x, y], height / 4.0, height, 0.0)
    }

    fn detector() -> ArmorDetector {
        ArmorDetector::new(DetectorParams::default(), CameraParams::default())
    }

    fn dark() -> RgbImage {
        RgbImage::new(640, 480)
    }

    fn find(blobs: &[Blob]) -> DetectInfo {
        detector().find(blobs, &dark(), &GyroData::default(), 0.0)
    }

    fn lights(combo: &Combo) -> (f32, f32) {
        (combo.features()[0].center().x, combo.features()[1].center().x)
    }

    #[test]
    fn find_single_armor() {
        let info = find(&[blob(140.0, 200.0, 20.0), blob(100.0, 200.0, 20.0)]);

        assert_eq!(info.features.len(), 2);
        assert_eq!(info.features[0].center().x, 100.0);
        assert_eq!(info.combos.len(), 1);
        assert_eq!(lights(&info.combos[0]), (100.0, 140.0));
    }

    #[test]
    fn find_prunes_pair_containing_light() {
        let info = find(&[
            blob(100.0, 200.0, 20.0),
            blob(140.0, 200.0, 20.0),
            blob(120.0, 200.0, 10.0),
        ]);

        assert_eq!(info.features.len(), 3);
        assert!(info.combos.is_empty());
    }

    #[test]
    fn find_keeps_pair_with_light_outside() {
        let info = find(&[
            blob(100.0, 200.0, 20.0),
            blob(140.0, 200.0, 20.0),
            blob(120.0, 260.0, 10.0),
        ]);

        assert_eq!(info.combos.len(), 1);
        assert_eq!(lights(&info.combos[0]), (100.0, 140.0));
    }

    #[test]
    fn find_same_side_conflict_keeps_narrower() {
        // A-B and A-C share the left light, B is outside A-C and B-C is too close
        let a = blob(100.0, 200.0, 20.0);
        let b = blob(150.0, 212.0, 20.0);
        let c = blob(160.0, 200.0, 20.0);

        for blobs in [[a, b, c], [c, b, a], [b, c, a]] {
            let info = find(&blobs);
            assert_eq!(info.combos.len(), 1);
            assert_eq!(lights(&info.combos[0]), (100.0, 150.0));
        }
    }

    #[test]
    fn find_same_right_light_conflict_keeps_narrower() {
        // A-C and B-C share the right light, B is outside A-C and A-B is too close
        let a = blob(100.0, 200.0, 20.0);
        let b = blob(110.0, 212.0, 20.0);
        let c = blob(160.0, 200.0, 20.0);

        for blobs in [[a, b, c], [c, b, a], [b, c, a]] {
            let info = find(&blobs);
            assert_eq!(info.combos.len(), 1);
            assert_eq!(lights(&info.combos[0]), (110.0, 160.0));
        }
    }

    #[test]
    fn find_opposite_side_conflict_keeps_smaller_error() {
        let a = blob(100.0, 200.0, 20.0);
        let b = blob(150.0, 200.0, 20.0);
        let c = blob(200.0, 200.0, 24.0);

        for blobs in [[a, b, c], [c, b, a]] {
            let info = find(&blobs);
            assert_eq!(info.combos.len(), 1);
            assert_eq!(lights(&info.combos[0]), (100.0, 150.0));
        }

        let a = blob(100.0, 200.0, 24.0);
        let c = blob(200.0, 200.0, 20.0);
        for blobs in [[a, b, c], [b, a, c]] {
            let info = find(&blobs);
            assert_eq!(info.combos.len(), 1);
            assert_eq!(lights(&info.combos[0]), (150.0, 200.0));
        }
    }

    #[test]
    fn erase_conflicts_single_pass() {
        // 0-1 loses to 0-2 for being wider and 0-2 loses to 2-3 for being wider
        // at equal error. 0-1 stays dropped although its only rival 0-2 is gone.
        let feature =
            |x| Feature::light_blob(&blob(x, 200.0, 20.0), &Default::default()).unwrap();
        let combo = |left: f32, right: f32| {
            Combo::armor(
                &feature(left),
                &feature(right),
                &Default::default(),
                &Default::default(),
                &GyroData::default(),
                0.0,
            )
            .unwrap()
        };
        let mut candidates = vec![
            Candidate {
                left: 0,
                right: 1,
                combo: combo(100.0, 190.0),
            },
            Candidate {
                left: 0,
                right: 2,
                combo: combo(100.0, 160.0),
            },
            Candidate {
                left: 2,
                right: 3,
                combo: combo(160.0, 210.0),
            },
        ];
        erase_conflicts(&mut candidates);

        let survivors = candidates
            .iter()
            .map(|candidate| (candidate.left, candidate.right))
            .collect::<Vec<_>>();
        assert_eq!(survivors, vec![(2, 3)]);
    }

    #[test]
    fn find_erases_bright_blobs() {
        let white = RgbImage::from_pixel(640, 480, Rgb([255, 255, 255]));
        let blobs = [blob(100.0, 200.0, 20.0), blob(140.0, 200.0, 20.0)];
        let info = detector().find(&blobs, &white, &GyroData::default(), 0.0);

        assert!(info.features.is_empty());
        assert!(info.combos.is_empty());
    }

    #[test]
    fn find_bright_sampling_clamps_to_image() {
        // Samples run off the image on every side but must stay in bounds
        let blobs = [blob(1.0, 1.0, 200.0), blob(638.0, 478.0, 200.0)];
        let info = detector().find(&blobs, &dark(), &GyroData::default(), 0.0);

        assert_eq!(info.features.len(), 2);
    }

    #[test]
    fn find_ignores_blobs_with_non_finite_angle() {
        let broken = Blob::new(point![140.0, 200.0], 5.0, 20.0, f32::NAN);
        let info = find(&[blob(100.0, 200.0, 20.0), broken]);

        assert_eq!(info.features.len(), 1);
        assert!(info.combos.is_empty());
    }

    #[test]
    fn find_discards_small_blobs() {
        // Areas of 25 and 16
        let info = find(&[blob(100.0, 200.0, 10.0), blob(140.0, 200.0, 8.0)]);

        assert_eq!(info.features.len(), 1);
        assert_eq!(info.features[0].height(), 10.0);
    }

    #[test]
    fn find_classifies_armors() {
        let mut classifier = MockClassifier::new();
        classifier
            .expect_classify()
            .once()
            .returning(|_, _| RobotType::Hero);
        let detector = detector().with_classifier(Box::new(classifier));
        let blobs = [blob(100.0, 200.0, 20.0), blob(140.0, 200.0, 20.0)];

        let info = detector.find(&blobs, &dark(), &GyroData::default(), 0.0);
        assert_eq!(info.combos.len(), 1);
        assert_eq!(info.combos[0].robot_type(), RobotType::Hero);
    }

    #[test]
    fn find_erases_unknown_when_classified() {
        let mut classifier = MockClassifier::new();
        classifier
            .expect_classify()
            .returning(|_, _| RobotType::Unknown);
        let params = DetectorParams {
            erase_unknown: true,
            ..Default::default()
        };
        let blobs = [blob(100.0, 200.0, 20.0), blob(140.0, 200.0, 20.0)];

        let detector = ArmorDetector::new(params.clone(), CameraParams::default())
            .with_classifier(Box::new(classifier));
        let info = detector.find(&blobs, &dark(), &GyroData::default(), 0.0);
        assert!(info.combos.is_empty());

        // Without a classifier there is nothing to erase
        let detector = ArmorDetector::new(params, CameraParams::default());
        let info = detector.find(&blobs, &dark(), &GyroData::default(), 0.0);
        assert_eq!(info.combos.len(), 1);
    }
}
