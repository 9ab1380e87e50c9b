use std::collections::VecDeque;

use crate::RobotType;

/// Fixed-depth queue of per-frame type labels smoothed by majority vote.
#[derive(Clone, Debug)]
pub struct TypeVote {
    labels: VecDeque<RobotType>,
    depth: usize,
}

impl TypeVote {
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            labels: VecDeque::with_capacity(depth),
            depth,
        }
    }

    pub fn push(&mut self, label: RobotType) {
        self.labels.push_front(label);
        self.labels.truncate(self.depth);
    }

    /// The most frequent label, ties going to the most recently pushed one.
    pub fn majority(&self) -> RobotType {
        let mut majority = RobotType::Unknown;
        let mut best = 0;
        for label in &self.labels {
            let count = self.labels.iter().filter(|other| *other == label).count();
            if count > best {
                majority = *label;
                best = count;
            }
        }
        majority
    }
}
