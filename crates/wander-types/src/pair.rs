use crate::models::UserId;

/// Canonical form of an unordered pair of distinct users.
///
/// `(a, b)` and `(b, a)` normalize to the same value: the numerically smaller
/// id is always `low`. A user cannot be paired with themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    low: UserId,
    high: UserId,
}

impl ParticipantPair {
    pub fn new(a: UserId, b: UserId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> UserId {
        self.low
    }

    pub fn high(&self) -> UserId {
        self.high
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_does_not_matter() {
        assert_eq!(ParticipantPair::new(9, 7), ParticipantPair::new(7, 9));
        let pair = ParticipantPair::new(9, 7).unwrap();
        assert_eq!(pair.low(), 7);
        assert_eq!(pair.high(), 9);
    }

    #[test]
    fn self_pair_rejected() {
        assert!(ParticipantPair::new(4, 4).is_none());
    }

    #[test]
    fn negative_ids_order_numerically() {
        let pair = ParticipantPair::new(3, -2).unwrap();
        assert_eq!(pair.low(), -2);
        assert_eq!(pair.high(), 3);
    }

    #[test]
    fn every_constructed_pair_is_strictly_ordered() {
        for a in -3..=3 {
            for b in -3..=3 {
                match ParticipantPair::new(a, b) {
                    Some(pair) => {
                        assert!(pair.low() < pair.high());
                        assert_eq!(ParticipantPair::new(b, a), Some(pair));
                    }
                    None => assert_eq!(a, b),
                }
            }
        }
    }
}
