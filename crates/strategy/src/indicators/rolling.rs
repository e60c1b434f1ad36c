/// Relative variance below which a window is treated as constant.
const ZERO_VARIANCE_EPS: f64 = 1e-12;

/// Fixed-size circular buffer over the most recent `capacity` values.
///
/// Keeps running sums of the values (shifted by the first value ever seen,
/// which keeps cancellation small), so the moving average and the
/// population standard deviation (ddof = 0) cost O(1) per update. The sums
/// are rebuilt from the buffer once per full rotation to stop drift.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    buffer: Vec<f64>,
    capacity: usize,
    /// Slot the next push writes to.
    head: usize,
    anchor: Option<f64>,
    sum: f64,
    sum_sq: f64,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "rolling window capacity must be >= 1");
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            anchor: None,
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// True once `capacity` values have been observed.
    pub fn is_full(&self) -> bool {
        self.buffer.len() == self.capacity
    }

    pub fn push(&mut self, value: f64) {
        let anchor = *self.anchor.get_or_insert(value);
        let shifted = value - anchor;

        if self.is_full() {
            let evicted = self.buffer[self.head] - anchor;
            self.sum -= evicted;
            self.sum_sq -= evicted * evicted;
            self.buffer[self.head] = value;
        } else {
            self.buffer.push(value);
        }
        self.sum += shifted;
        self.sum_sq += shifted * shifted;

        self.head = (self.head + 1) % self.capacity;
        if self.head == 0 && self.is_full() {
            self.resync(anchor);
        }
    }

    fn resync(&mut self, anchor: f64) {
        self.sum = self.buffer.iter().map(|v| v - anchor).sum();
        self.sum_sq = self.buffer.iter().map(|v| (v - anchor) * (v - anchor)).sum();
    }

    /// Moving average, `None` until the window is full.
    pub fn mean(&self) -> Option<f64> {
        if !self.is_full() {
            return None;
        }
        let anchor = self.anchor?;
        Some(anchor + self.sum / self.capacity as f64)
    }

    /// Population standard deviation, `None` until the window is full.
    /// Constant windows report exactly `0.0`.
    pub fn std_dev(&self) -> Option<f64> {
        if !self.is_full() {
            return None;
        }
        let anchor = self.anchor?;
        let n = self.capacity as f64;
        let shifted_mean = self.sum / n;
        let variance = (self.sum_sq / n - shifted_mean * shifted_mean).max(0.0);

        let scale = (anchor + shifted_mean).abs().max(shifted_mean.abs());
        if variance <= ZERO_VARIANCE_EPS * scale * scale {
            return Some(0.0);
        }
        Some(variance.sqrt())
    }

    /// `(price - mean) / std_dev`. `None` while the window is filling or
    /// when the window has zero variance.
    pub fn z_score(&self, price: f64) -> Option<f64> {
        let mean = self.mean()?;
        let std = self.std_dev()?;
        if std == 0.0 {
            return None;
        }
        Some((price - mean) / std)
    }
}
