//! Edge detection over sampled signals.
//!
//! A [`TrackedSignal`] remembers the previous observation and reports a
//! [`Transition`] only when its [`Edge`] rule fires. The first observation
//! establishes the baseline and never fires.

/// Rule deciding whether `previous -> current` is significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Any difference.
    Changed,
    /// Strictly greater than before: `false -> true`, or a counter increase.
    Rising,
}

impl Edge {
    #[inline]
    pub fn detect<T: PartialOrd>(self, previous: &T, current: &T) -> bool {
        match self {
            Edge::Changed => current != previous,
            Edge::Rising => current > previous,
        }
    }
}

/// A fired edge, carrying both sides so reports can describe old -> new.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition<T> {
    pub previous: T,
    pub current: T,
}

#[derive(Debug, Clone)]
pub struct TrackedSignal<T> {
    edge: Edge,
    previous: Option<T>,
}

impl<T: PartialOrd + Copy> TrackedSignal<T> {
    pub fn new(edge: Edge) -> Self {
        Self {
            edge,
            previous: None,
        }
    }

    pub fn previous(&self) -> Option<T> {
        self.previous
    }

    /// Compares against the remembered value, then remembers `current`
    /// whatever the direction of change.
    pub fn observe(&mut self, current: T) -> Option<Transition<T>> {
        let fired = self.previous.and_then(|previous| {
            self.edge
                .detect(&previous, &current)
                .then_some(Transition { previous, current })
        });
        self.previous = Some(current);
        fired
    }
}

/// Level check with no memory: fires on every sample above `limit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub limit: f64,
}

impl Threshold {
    pub fn new(limit: f64) -> Self {
        Self { limit }
    }

    #[inline]
    pub fn exceeded(&self, value: f64) -> bool {
        value > self.limit
    }
}
