//! # Utilities Module
//!
//! Cross-cutting helpers: cooperative cancellation, the rayon pool
//! builder, numerical helpers and a small civil-date conversion for the
//! VCF header.

pub mod maths;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{PangeneError, Result};

/// Shared cancellation flag checked at loop boundaries of the DP and the
/// assembly DFS (every few thousand nodes). Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Error out when cancellation has been requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PangeneError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Create a configured rayon thread pool.
pub fn build_thread_pool(n_threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .thread_name(|i| format!("pangene-worker-{}", i))
        .build()
        .map_err(|e| PangeneError::config(format!("failed to create thread pool: {}", e)))
}

/// Today's date as `dd/mm/yy` for the VCF header.
pub fn today_ddmmyy() -> String {
    let days = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_secs() / 86_400) as i64)
        .unwrap_or(0);
    let (y, m, d) = civil_from_days(days);
    format!("{:02}/{:02}/{:02}", d, m, y % 100)
}

/// Days since 1970-01-01 to a (year, month, day) civil date.
/// Howard Hinnant's algorithm, valid for the life of this program.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (y + (m <= 2) as i64, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(flag.checkpoint().is_ok());
        clone.cancel();
        assert!(flag.is_cancelled());
        assert!(matches!(flag.checkpoint(), Err(PangeneError::Cancelled)));
    }

    #[test]
    fn test_civil_from_days() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
    }
}
