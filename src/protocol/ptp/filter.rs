//! Low-pass smoothers used by the follower servo.
//!
//! Both filters work in `f64`. Rate ratios sit within a few hundred ppm of
//! 1.0 and offsets within the coarse threshold, so a double keeps the
//! rounding error of the running sum far below one nanosecond.

/// Fixed-window moving average (FIR).
///
/// Before the window has filled, the mean is taken over the samples present.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    buffer: Vec<f64>,
    next: usize,
    filled: usize,
    sum: f64,
    output: f64,
}

impl MovingAverage {
    /// Create a filter with `window` slots (at least one), starting at `neutral`.
    #[must_use]
    pub fn new(window: usize, neutral: f64) -> Self {
        let window = window.max(1);
        Self {
            buffer: vec![neutral; window],
            next: 0,
            filled: 0,
            sum: 0.0,
            output: neutral,
        }
    }

    /// Window capacity.
    #[must_use]
    pub fn window(&self) -> usize {
        self.buffer.len()
    }

    /// Number of valid samples currently averaged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filled
    }

    /// Whether no sample has been fed since creation or the last flush.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Whether a full window of samples has been seen.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.filled == self.buffer.len()
    }

    /// Last output.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.output
    }

    /// Push a sample over the oldest slot and return the new mean.
    #[allow(
        clippy::cast_precision_loss,
        reason = "window sizes are tiny compared to f64 mantissa"
    )]
    pub fn feed(&mut self, sample: f64) -> f64 {
        if self.filled == self.buffer.len() {
            self.sum -= self.buffer[self.next];
        } else {
            self.filled += 1;
        }
        self.buffer[self.next] = sample;
        self.sum += sample;
        self.next = (self.next + 1) % self.buffer.len();
        self.output = self.sum / self.filled as f64;
        self.output
    }

    /// Overwrite every slot with `neutral` and restart the fill count.
    ///
    /// Afterwards [`value`](Self::value) reads exactly `neutral`, and the next
    /// fed sample starts a fresh partial window.
    pub fn flush(&mut self, neutral: f64) {
        for _ in 0..self.buffer.len() {
            self.feed(neutral);
        }
        self.next = 0;
        self.filled = 0;
        self.sum = 0.0;
        self.output = neutral;
    }
}

/// Single-pole exponential smoother (IIR): `y = alpha * x + (1 - alpha) * y_prev`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialFilter {
    alpha: f64,
    previous: f64,
}

impl ExponentialFilter {
    /// Create a smoother with factor `alpha` (clamped into `0..=1`), starting at `initial`.
    #[must_use]
    pub fn new(alpha: f64, initial: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            previous: initial,
        }
    }

    /// Smoothing factor.
    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Last output.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.previous
    }

    /// Feed a sample and return the smoothed value.
    pub fn feed(&mut self, sample: f64) -> f64 {
        self.previous = self.alpha.mul_add(sample, (1.0 - self.alpha) * self.previous);
        self.previous
    }

    /// Reset the previous output to `neutral`.
    pub fn flush(&mut self, neutral: f64) {
        self.previous = neutral;
    }
}
