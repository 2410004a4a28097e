//! Full-resolution rectangles scheduled for crop/process/paste.

/// A rectangle in full-resolution pixel coordinates.
///
/// Regions built through [`Region::from_bounds`] or [`Region::full`] always lie
/// inside their frame and have non-zero width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub w: u32,
    /// Height in pixels.
    pub h: u32,
}

impl Region {
    /// Region covering a whole `width`x`height` frame.
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            w: width,
            h: height,
        }
    }

    /// Build a region from half-open float bounds `[x0, x1) x [y0, y1)`,
    /// clamped to a `width`x`height` frame.
    ///
    /// The lower edges are floored and the upper edges ceiled so the region
    /// never shrinks below the requested area. Returns `None` when nothing is
    /// left after clamping.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_bounds(x0: f64, y0: f64, x1: f64, y1: f64, width: u32, height: u32) -> Option<Self> {
        let left = x0.floor().clamp(0.0, f64::from(width)) as u32;
        let top = y0.floor().clamp(0.0, f64::from(height)) as u32;
        let right = x1.ceil().clamp(0.0, f64::from(width)) as u32;
        let bottom = y1.ceil().clamp(0.0, f64::from(height)) as u32;
        if right <= left || bottom <= top {
            return None;
        }
        Some(Self {
            x: left,
            y: top,
            w: right - left,
            h: bottom - top,
        })
    }

    /// Exclusive right edge, saturating at `u32::MAX`.
    #[must_use]
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.w)
    }

    /// Exclusive bottom edge, saturating at `u32::MAX`.
    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.h)
    }

    /// Pixel count.
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.w) * u64::from(self.h)
    }

    /// Whether pixel `(px, py)` falls inside the region.
    #[must_use]
    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// Whether `other` lies entirely inside this region.
    #[must_use]
    pub fn encloses(&self, other: &Region) -> bool {
        let edge = |origin: u32, len: u32| u64::from(origin) + u64::from(len);
        other.x >= self.x
            && other.y >= self.y
            && edge(other.x, other.w) <= edge(self.x, self.w)
            && edge(other.y, other.h) <= edge(self.y, self.h)
    }

    /// Whether the region fits inside a `width`x`height` frame.
    #[must_use]
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.w > 0
            && self.h > 0
            && self.x.checked_add(self.w).is_some_and(|r| r <= width)
            && self.y.checked_add(self.h).is_some_and(|b| b <= height)
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.w, self.h, self.x, self.y)
    }
}
