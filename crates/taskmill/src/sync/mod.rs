mod semaphore;
mod spin;
mod wait_options;

pub use semaphore::SaturatingSemaphore;
pub use spin::{spin_pause_until, spin_yield_until, SpinResult};
pub use wait_options::WaitOptions;
