/// The surface raw pointer coordinates are measured against.
///
/// Everything that leaves the sender is in `[0, 1]` relative to this surface,
/// so the receiver never needs to know the sender's resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    /// Unit viewport: coordinates are taken as already normalized.
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width,
            height,
        }
    }

    pub fn with_origin(mut self, left: f64, top: f64) -> Self {
        self.left = left;
        self.top = top;
        self
    }

    pub fn normalize(&self, x: f64, y: f64) -> (f64, f64) {
        (
            scale(x - self.left, self.width).clamp(0.0, 1.0),
            scale(y - self.top, self.height).clamp(0.0, 1.0),
        )
    }

    pub fn normalize_delta(&self, dx: f64, dy: f64) -> (f64, f64) {
        (
            scale(dx, self.width).clamp(-1.0, 1.0),
            scale(dy, self.height).clamp(-1.0, 1.0),
        )
    }

    pub fn denormalize(&self, nx: f64, ny: f64) -> (f64, f64) {
        (
            self.left + nx.clamp(0.0, 1.0) * self.width,
            self.top + ny.clamp(0.0, 1.0) * self.height,
        )
    }
}

fn scale(value: f64, size: f64) -> f64 {
    if !value.is_finite() || !size.is_finite() || size <= 0.0 {
        return 0.0;
    }
    value / size
}
