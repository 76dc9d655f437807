use std::time::Duration;

/// Tunables for the spin-then-block waiting discipline shared by
/// [`super::spin`] and [`super::SaturatingSemaphore`].
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    spin_max: Duration,
}

impl WaitOptions {
    pub const DEFAULT_SPIN_MAX: Duration = Duration::from_micros(2);

    pub fn new() -> Self {
        Self {
            spin_max: Self::DEFAULT_SPIN_MAX,
        }
    }

    pub fn with_spin_max(mut self, spin_max: Duration) -> Self {
        self.spin_max = spin_max;
        self
    }

    #[inline]
    pub fn spin_max(&self) -> Duration {
        self.spin_max
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::new()
    }
}
