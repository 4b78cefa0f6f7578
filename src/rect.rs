//! Rectangles and dirty-region accumulation.
//!
//! [`Rect`] uses `x = y = -1, width = height = 0` as its empty sentinel so
//! a cleared tracker reports the same values hosts have always seen.
//! [`DirtyRectTracker`] folds every pushed rectangle into one bounding box
//! that only grows until [`DirtyRectTracker::reset`].

/// An axis-aligned rectangle in canvas pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// The "nothing tracked" sentinel.
    pub const EMPTY: Rect = Rect {
        x: -1,
        y: -1,
        width: 0,
        height: 0,
    };

    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole `width` x `height` frame.
    pub const fn full(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.x < 0 || self.y < 0 || self.width <= 0 || self.height <= 0
    }

    /// Right edge (exclusive).
    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    /// Bottom edge (exclusive).
    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    pub fn area(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        (self.width as u64).saturating_mul(self.height as u64)
    }

    /// Whether `other` lies entirely inside `self`. An empty `other` is
    /// contained by everything.
    pub fn contains(&self, other: &Rect) -> bool {
        if other.is_empty() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect {
            x,
            y,
            width: extent(x, right),
            height: extent(y, bottom),
        }
    }
}

/// Length from `origin` to the exclusive edge `far`, saturating at
/// `i32::MAX`.
fn extent(origin: i32, far: i64) -> i32 {
    i32::try_from(far - i64::from(origin)).unwrap_or(i32::MAX)
}

impl Default for Rect {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Running bounding box of every rectangle pushed since the last reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirtyRectTracker {
    rect: Rect,
}

impl DirtyRectTracker {
    pub const fn new() -> Self {
        Self { rect: Rect::EMPTY }
    }

    /// Grow the tracked box to cover `(x, y, width, height)`.
    ///
    /// The first rectangle after a reset becomes the box outright. After
    /// that the origin only moves up/left and the far edges only move
    /// down/right. Zero-area rectangles touch no pixels and are ignored.
    pub fn accumulate(&mut self, x: i32, y: i32, width: i32, height: i32) {
        let incoming = Rect::new(x, y, width, height);
        if incoming.is_empty() {
            return;
        }

        if self.rect.is_empty() {
            self.rect = incoming;
            return;
        }

        let right = self.rect.right().max(incoming.right());
        let bottom = self.rect.bottom().max(incoming.bottom());
        if incoming.x < self.rect.x {
            self.rect.x = incoming.x;
        }
        if incoming.y < self.rect.y {
            self.rect.y = incoming.y;
        }
        self.rect.width = extent(self.rect.x, right);
        self.rect.height = extent(self.rect.y, bottom);
    }

    pub fn reset(&mut self) {
        self.rect = Rect::EMPTY;
    }

    pub fn current(&self) -> Rect {
        self.rect
    }

    pub fn is_empty(&self) -> bool {
        self.rect.is_empty()
    }
}
