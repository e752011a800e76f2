//! Walking the region index

use crate::buffer::line_of;
use crate::registry::{DiffRegistry, RegistryError};
use crate::variant::Variant;
use serde::{Deserialize, Serialize};

/// Direction of a navigation step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    fn delta(self) -> isize {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

/// Result of [`Navigator::advance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Moved(usize),
    /// Ran off the end without finding a stop; `current` parks on the
    /// sentinel past that end
    AtBoundary,
}

/// How [`Navigator::locate`] resolves a position between regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateMode {
    AtOrBefore,
    AtOrAfter,
    Nearest,
}

/// Stateless index arithmetic over a registry snapshot.
///
/// Holds only the region count so skip predicates may borrow the registry
/// mutably (fine-diff caching) while the walk runs.
#[derive(Debug, Clone, Copy)]
pub struct Navigator {
    len: usize,
}

impl Navigator {
    pub fn new(registry: &DiffRegistry) -> Self {
        Self {
            len: registry.len(),
        }
    }

    pub fn with_len(len: usize) -> Self {
        Self { len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sentinel an exhausted walk in `direction` parks on
    pub fn boundary(&self, direction: Direction) -> isize {
        match direction {
            Direction::Forward => self.len as isize,
            Direction::Backward => -1,
        }
    }

    /// Take `count` non-skipped stops from `current` in `direction`.
    ///
    /// `current` may be the sentinels `-1` or `len`. Hitting the boundary
    /// after at least one stop lands on the last stop found.
    pub fn advance<F>(&self, current: isize, direction: Direction, count: usize, mut skip: F) -> Step
    where
        F: FnMut(usize) -> bool,
    {
        let len = self.len as isize;
        let mut n = current.clamp(-1, len);
        let mut last_stop = None;

        for _ in 0..count.max(1) {
            loop {
                n += direction.delta();
                if n < 0 || n >= len {
                    return match last_stop {
                        Some(stop) => Step::Moved(stop),
                        None => Step::AtBoundary,
                    };
                }
                if !skip(n as usize) {
                    last_stop = Some(n as usize);
                    break;
                }
            }
        }
        last_stop.map_or(Step::AtBoundary, Step::Moved)
    }

    /// Map a 1-based user index to an internal one.
    ///
    /// Negative values count from the end (`-1` is the last region); `0`
    /// yields the before-first sentinel.
    pub fn jump(&self, n_user: isize) -> Result<isize, RegistryError> {
        if self.len == 0 {
            return Err(RegistryError::NoDifferences);
        }
        let len = self.len as isize;
        let n = match n_user {
            0 => -1,
            n if n > 0 => n - 1,
            n => len + n,
        };
        if (-1..=len).contains(&n) {
            Ok(n)
        } else {
            Err(RegistryError::BadDiffNumber {
                n: n_user,
                len: self.len,
            })
        }
    }

    /// Region of `variant` matching byte `pos` in `text`.
    ///
    /// A region whose span touches `pos` always wins. Otherwise the mode
    /// decides; `-1` or `len` come back when no region qualifies.
    pub fn locate(
        &self,
        registry: &DiffRegistry,
        variant: Variant,
        text: &str,
        pos: usize,
        mode: LocateMode,
    ) -> Result<isize, RegistryError> {
        if registry.is_empty() {
            return Err(RegistryError::NoDifferences);
        }
        let spans = registry.spans_for(variant);
        if spans.len() != registry.len() {
            return Err(RegistryError::VariantUnavailable(variant));
        }
        if let Some(hit) = spans.iter().position(|s| s.touches(pos)) {
            return Ok(hit as isize);
        }

        // First region starting after `pos`
        let next = spans.partition_point(|s| s.end < pos);
        let before = next as isize - 1;
        let after = next as isize;
        Ok(match mode {
            LocateMode::AtOrBefore => before,
            LocateMode::AtOrAfter => after,
            LocateMode::Nearest => {
                if next == 0 {
                    after
                } else if next == spans.len() {
                    before
                } else {
                    let line = line_of(text, pos);
                    let up = line - line_of(text, spans[next - 1].end);
                    let down = line_of(text, spans[next].begin) - line;
                    if up < down {
                        before
                    } else {
                        after
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::BuiltinDiff;
    use crate::registry::VariantText;
    use crate::variant::JobKind;

    #[test]
    fn test_forward_walk_visits_every_region() {
        let nav = Navigator::with_len(4);
        let mut current = nav.jump(1).unwrap();
        let mut seen = vec![current];
        for _ in 0..3 {
            match nav.advance(current, Direction::Forward, 1, |_| false) {
                Step::Moved(n) => current = n as isize,
                Step::AtBoundary => panic!("stopped early"),
            }
            seen.push(current);
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(nav.advance(current, Direction::Forward, 1, |_| false), Step::AtBoundary);
    }

    #[test]
    fn test_skip_and_count() {
        let nav = Navigator::with_len(6);
        let odd = |n: usize| n % 2 == 1;
        assert_eq!(nav.advance(-1, Direction::Forward, 1, odd), Step::Moved(0));
        assert_eq!(nav.advance(0, Direction::Forward, 2, odd), Step::Moved(4));
        assert_eq!(nav.advance(6, Direction::Backward, 1, odd), Step::Moved(4));
        // Runs out after one stop: land on it
        assert_eq!(nav.advance(0, Direction::Forward, 5, odd), Step::Moved(4));
        assert_eq!(nav.advance(4, Direction::Forward, 1, odd), Step::AtBoundary);
        assert_eq!(nav.advance(0, Direction::Backward, 1, odd), Step::AtBoundary);
        assert_eq!(nav.boundary(Direction::Forward), 6);
        assert_eq!(nav.boundary(Direction::Backward), -1);
    }

    #[test]
    fn test_jump_mapping() {
        let nav = Navigator::with_len(3);
        assert_eq!(nav.jump(1), Ok(0));
        assert_eq!(nav.jump(3), Ok(2));
        assert_eq!(nav.jump(4), Ok(3));
        assert_eq!(nav.jump(-1), Ok(2));
        assert_eq!(nav.jump(-3), Ok(0));
        assert_eq!(nav.jump(0), Ok(-1));
        assert_eq!(nav.jump(5), Err(RegistryError::BadDiffNumber { n: 5, len: 3 }));
        assert_eq!(nav.jump(-5), Err(RegistryError::BadDiffNumber { n: -5, len: 3 }));
        assert_eq!(Navigator::with_len(0).jump(1), Err(RegistryError::NoDifferences));
    }

    #[test]
    fn test_locate_modes() {
        // Regions on lines 1 and 6 of A
        let a = "k\nX\nk\nk\nk\nk\nY\nk\n";
        let b = "k\nx\nk\nk\nk\nk\ny\nk\n";
        let registry = DiffRegistry::build(
            JobKind::Compare2,
            &[
                VariantText { variant: Variant::A, text: a, offset: 0 },
                VariantText { variant: Variant::B, text: b, offset: 0 },
            ],
            &mut BuiltinDiff::new(),
        )
        .unwrap();
        let nav = Navigator::new(&registry);
        let line = |n: usize| a.match_indices('\n').nth(n - 1).map_or(0, |(i, _)| i + 1);

        assert_eq!(nav.locate(&registry, Variant::A, a, line(1), LocateMode::Nearest), Ok(0));
        assert_eq!(nav.locate(&registry, Variant::A, a, 0, LocateMode::AtOrBefore), Ok(-1));
        assert_eq!(nav.locate(&registry, Variant::A, a, 0, LocateMode::Nearest), Ok(0));
        assert_eq!(nav.locate(&registry, Variant::A, a, line(3), LocateMode::AtOrBefore), Ok(0));
        assert_eq!(nav.locate(&registry, Variant::A, a, line(3), LocateMode::AtOrAfter), Ok(1));
        // Line 3 is one line below region 0 and three above region 1
        assert_eq!(nav.locate(&registry, Variant::A, a, line(3), LocateMode::Nearest), Ok(0));
        assert_eq!(nav.locate(&registry, Variant::A, a, line(5), LocateMode::Nearest), Ok(1));
        // Tie on line 4 goes to the later region
        assert_eq!(nav.locate(&registry, Variant::A, a, line(4), LocateMode::Nearest), Ok(1));
        assert_eq!(nav.locate(&registry, Variant::A, a, a.len(), LocateMode::AtOrAfter), Ok(2));
    }
}
