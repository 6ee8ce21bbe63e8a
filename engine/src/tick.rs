//! Wrap-around simulation ticks.

/// A simulation tick: an unsigned 16-bit counter with wrap-around.
///
/// Ordering is circular. Two ticks compare through [`Tick::seq_diff`],
/// which treats the short way around the circle as the truth; there is
/// deliberately no `PartialOrd` impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tick(u16);

impl Tick {
    /// Creates a tick from a raw counter value.
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw counter value.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Advances by `n` ticks, wrapping.
    #[must_use]
    pub const fn advance(self, n: u16) -> Self {
        Self(self.0.wrapping_add(n))
    }

    /// Signed circular distance from `other` to `self`, in
    /// `[-32768, 32767]`. Positive means `self` is newer.
    #[must_use]
    pub const fn seq_diff(self, other: Self) -> i16 {
        self.0.wrapping_sub(other.0) as i16
    }

    /// Returns `true` if `self` is newer than `other` on the circle.
    #[must_use]
    pub const fn is_newer_than(self, other: Self) -> bool {
        self.seq_diff(other) > 0
    }
}

impl From<u16> for Tick {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<Tick> for u16 {
    fn from(tick: Tick) -> Self {
        tick.0
    }
}
