//! Ordering of grandmaster candidates

use core::cmp::Ordering;

use crate::datastructures::common::{ClockIdentity, ClockQuality, PortIdentity};

/// The attributes of a time-aware system that decide whether it is a better
/// grandmaster than another.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SystemIdentity {
    pub priority_1: u8,
    pub clock_quality: ClockQuality,
    pub priority_2: u8,
    pub clock_identity: ClockIdentity,
}

/// A grandmaster candidate as seen through a specific port
///
/// Candidates are totally ordered. The lesser candidate is the better one.
/// The fields are compared in this order:
///
/// 1. priority1
/// 2. clockClass
/// 3. clockAccuracy
/// 4. offsetScaledLogVariance
/// 5. priority2
/// 6. grandmaster clock identity
/// 7. stepsRemoved
/// 8. identity of the port that sent the information
/// 9. number of the port that received the information
///
/// As every field takes part in the comparison, two candidates only compare
/// equal when they are identical.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PriorityVector {
    pub root: SystemIdentity,
    pub steps_removed: u16,
    pub source_port_identity: PortIdentity,
    pub port_number: u16,
}

impl PriorityVector {
    /// The vector of a system offering its own clock
    pub fn local(system: SystemIdentity) -> Self {
        Self {
            root: system,
            steps_removed: 0,
            source_port_identity: PortIdentity {
                clock_identity: system.clock_identity,
                port_number: 0,
            },
            port_number: 0,
        }
    }

    #[allow(clippy::type_complexity)]
    fn key(&self) -> (u8, u8, u8, u16, u8, ClockIdentity, u16, PortIdentity, u16) {
        let root = &self.root;
        (
            root.priority_1,
            root.clock_quality.clock_class,
            root.clock_quality.clock_accuracy,
            root.clock_quality.offset_scaled_log_variance,
            root.priority_2,
            root.clock_identity,
            self.steps_removed,
            self.source_port_identity,
            self.port_number,
        )
    }

    /// Whether `self` describes a better grandmaster path than `other`
    pub fn is_better_than(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Less
    }
}

impl PartialOrd for PriorityVector {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityVector {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system(priority_1: u8, clock_class: u8, id: u8) -> SystemIdentity {
        SystemIdentity {
            priority_1,
            clock_quality: ClockQuality {
                clock_class,
                ..Default::default()
            },
            priority_2: 248,
            clock_identity: ClockIdentity([id; 8]),
        }
    }

    fn vector(system: SystemIdentity, steps_removed: u16, sender: u8) -> PriorityVector {
        PriorityVector {
            root: system,
            steps_removed,
            source_port_identity: PortIdentity {
                clock_identity: ClockIdentity([sender; 8]),
                port_number: 1,
            },
            port_number: 1,
        }
    }

    #[test]
    fn field_priority() {
        // priority1 dominates clock class
        assert!(vector(system(10, 248, 9), 0, 9).is_better_than(&vector(system(11, 6, 1), 0, 1)));
        // clock class dominates identity
        assert!(vector(system(10, 6, 9), 0, 9).is_better_than(&vector(system(10, 7, 1), 0, 1)));
        // identity is the grandmaster tie break
        assert!(vector(system(10, 6, 1), 3, 9).is_better_than(&vector(system(10, 6, 2), 0, 1)));
        // same grandmaster: fewer steps wins
        assert!(vector(system(10, 6, 1), 1, 9).is_better_than(&vector(system(10, 6, 1), 2, 1)));
        // same grandmaster and steps: sender identity decides
        assert!(vector(system(10, 6, 1), 1, 3).is_better_than(&vector(system(10, 6, 1), 1, 4)));
    }

    #[test]
    fn total_order() {
        let candidates = [
            vector(system(10, 6, 1), 0, 1),
            vector(system(10, 6, 1), 1, 2),
            vector(system(10, 6, 2), 0, 2),
            vector(system(128, 248, 3), 0, 3),
            vector(system(128, 248, 3), 0, 4),
            vector(system(255, 248, 0), 2, 7),
            PriorityVector::local(system(248, 248, 5)),
        ];

        for a in &candidates {
            for b in &candidates {
                let forward = a.cmp(b);
                assert_eq!(forward, b.cmp(a).reverse());
                assert_eq!(forward == Ordering::Equal, a == b);

                for c in &candidates {
                    if a.is_better_than(b) && b.is_better_than(c) {
                        assert!(a.is_better_than(c));
                    }
                }
            }
        }
    }

    #[test]
    fn receiving_port_breaks_final_tie() {
        let a = vector(system(10, 6, 1), 1, 2);
        let b = PriorityVector {
            port_number: 2,
            ..a
        };
        assert!(a.is_better_than(&b));
        assert_ne!(a.cmp(&b), Ordering::Equal);
    }
}
