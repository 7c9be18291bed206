// src/utils/system.rs: System functions

use std::time::Duration;
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tokio::time::sleep;
use anyhow::Result;


/// Determines number of physical cores and the current CPU load.
///
/// # Returns
///
/// Result<usize, f32> physical cores, current cpu usage
pub async fn detect_cores_and_load() -> Result<(usize, f32)> {
    let refresh_kind = RefreshKind::nothing().with_cpu(Default::default());
    let mut system = System::new_with_specifics(refresh_kind);
    system.refresh_cpu_all();
    let physical_cores = System::physical_core_count().unwrap_or(1);
    sleep(Duration::from_millis(100)).await;
    system.refresh_cpu_specifics(CpuRefreshKind::nothing().with_cpu_usage());
    let cpu_load = system.global_cpu_usage();
    Ok((physical_cores, cpu_load))
}


/// Whether `jobs` concurrent STAR runs with `threads` each fit on `cores`.
pub fn oversubscribed(jobs: usize, threads: usize, cores: usize) -> bool {
    jobs.saturating_mul(threads) > cores
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_detect_cores_and_load() -> Result<()> {
        let (cores, load) = detect_cores_and_load().await?;
        assert!(cores >= 1);
        assert!(load >= 0.0);
        Ok(())
    }

    #[test]
    fn test_oversubscribed() {
        assert!(!oversubscribed(1, 10, 16));
        assert!(oversubscribed(2, 10, 16));
        assert!(!oversubscribed(4, 4, 16));
    }
}
