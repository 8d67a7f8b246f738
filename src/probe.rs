//! One-time host capability probe, run at process start

use std::sync::OnceLock;
use tracing::{info, warn};

/// What the host offers the conversion workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub logical_cpus: usize,
}

static CAPABILITIES: OnceLock<Capabilities> = OnceLock::new();

/// Probe the host once; later calls return the cached result
pub fn capabilities() -> Capabilities {
    *CAPABILITIES.get_or_init(|| {
        let logical_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        info!(logical_cpus, "host capabilities");
        Capabilities { logical_cpus }
    })
}

/// Warn when more workers are requested than there are CPUs to run them
pub fn check_worker_count(requested: usize) {
    let caps = capabilities();
    if requested > caps.logical_cpus {
        warn!(
            requested,
            available = caps.logical_cpus,
            "more workers than logical CPUs; conversion will not scale further"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_is_stable() {
        let first = capabilities();
        assert!(first.logical_cpus >= 1);
        assert_eq!(capabilities(), first);
    }
}
