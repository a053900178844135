//! Reconstruction of monotonic ensemble indices.

/// How a record's ensemble index is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterRule {
    /// One index per accepted record.
    Sequential,
    /// A raw counter wrapping after `period`. A wrap is detected when the
    /// counter falls below its previous value; each wrap adds `period` to the
    /// index, and one more when `fold` is set.
    Wrapping { period: usize, fold: bool },
}

/// Assigns monotonic indices to the accepted records of one kind.
///
/// Only accepted records may be counted: a skipped or corrupted record must
/// not advance the counter.
#[derive(Debug, Clone)]
pub struct EnsembleCounter {
    rule: CounterRule,
    cycles: usize,
    previous: Option<u8>,
    seen: usize,
    last: Option<usize>,
}

impl EnsembleCounter {
    pub fn new(rule: CounterRule) -> Self {
        Self {
            rule,
            cycles: 0,
            previous: None,
            seen: 0,
            last: None,
        }
    }

    /// Count an accepted record, returning its ensemble index.
    ///
    /// Wrapping rules read the record's raw counter. Records without one are
    /// indexed sequentially.
    pub fn advance(&mut self, raw: Option<u8>) -> usize {
        let index = match (self.rule, raw) {
            (CounterRule::Wrapping { period, fold }, Some(raw)) => {
                if self.previous.is_some_and(|p| raw < p) {
                    self.cycles += 1;
                }
                self.previous = Some(raw);

                let index = self.cycles * period + usize::from(raw);
                if fold { index + self.cycles } else { index }
            }
            _ => self.seen,
        };

        self.seen += 1;
        self.last = Some(self.last.map_or(index, |l| l.max(index)));

        index
    }

    /// Highest index assigned so far.
    pub fn last(&self) -> Option<usize> {
        self.last
    }

    /// Number of ensemble slots needed to hold every index assigned.
    pub fn len(&self) -> usize {
        self.last.map_or(0, |l| l + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_none()
    }

    /// Number of records counted.
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Number of detected wraps.
    pub fn cycles(&self) -> usize {
        self.cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_counts_records() {
        let mut counter = EnsembleCounter::new(CounterRule::Sequential);
        let indices: Vec<_> = [Some(9), None, Some(3)].map(|r| counter.advance(r)).into();

        assert_eq!(indices, [0, 1, 2]);
        assert_eq!(counter.len(), 3);
    }

    #[test]
    fn wrapping_folds_cycles() {
        let mut counter = EnsembleCounter::new(CounterRule::Wrapping {
            period: 255,
            fold: true,
        });

        assert_eq!(counter.advance(Some(254)), 254);
        assert_eq!(counter.advance(Some(255)), 255);
        assert_eq!(counter.advance(Some(0)), 256);
        assert_eq!(counter.cycles(), 1);
    }

    #[test]
    fn wrapping_without_fold_multiplies_cycles() {
        let mut counter = EnsembleCounter::new(CounterRule::Wrapping {
            period: 100,
            fold: false,
        });

        counter.advance(Some(99));
        assert_eq!(counter.advance(Some(1)), 101);
    }

    #[test]
    fn skipped_raw_values_leave_gaps() {
        let mut counter = EnsembleCounter::new(CounterRule::Wrapping {
            period: 255,
            fold: true,
        });

        counter.advance(Some(0));
        counter.advance(Some(2));

        assert_eq!(counter.seen(), 2);
        assert_eq!(counter.len(), 3);
    }
}
