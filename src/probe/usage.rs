//! OS interface counter probe.
//!
//! Reads cumulative bytes sent/received summed across every interface.
//! Counters are monotonically non-decreasing within one boot session.

use std::sync::Mutex;

use async_trait::async_trait;
use sysinfo::Networks;

use crate::probe::{ProbeError, SampleSource};
use crate::storage::UsageSample;

/// Cumulative network usage probe backed by `sysinfo`.
pub struct SystemUsageProbe {
    networks: Mutex<Networks>,
}

impl SystemUsageProbe {
    pub fn new() -> Self {
        Self {
            networks: Mutex::new(Networks::new_with_refreshed_list()),
        }
    }

    /// Read the current totals.
    ///
    /// # Errors
    /// Returns `ProbeError::Unavailable` if no interface is visible.
    pub fn read(&self) -> Result<UsageSample, ProbeError> {
        let mut networks = self
            .networks
            .lock()
            .map_err(|_| ProbeError::Unavailable("network counter lock poisoned".to_string()))?;

        // Pick up interfaces that appeared since the last read
        networks.refresh(true);

        let list = networks.list();
        if list.is_empty() {
            return Err(ProbeError::Unavailable(
                "no network interfaces found".to_string(),
            ));
        }

        let (sent, recv) = list.values().fold((0u64, 0u64), |(sent, recv), data| {
            (
                sent.saturating_add(data.total_transmitted()),
                recv.saturating_add(data.total_received()),
            )
        });

        tracing::trace!(interfaces = list.len(), sent, recv, "Interface counters read");
        Ok(UsageSample::new(sent, recv))
    }
}

impl Default for SystemUsageProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SystemUsageProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemUsageProbe").finish_non_exhaustive()
    }
}

#[async_trait]
impl SampleSource for SystemUsageProbe {
    type Sample = UsageSample;

    fn name(&self) -> &str {
        "system-usage"
    }

    async fn sample(&self) -> Result<UsageSample, ProbeError> {
        self.read().inspect_err(|e| {
            tracing::error!(error = %e, "Error getting network usage");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_do_not_decrease() {
        let probe = SystemUsageProbe::new();
        let first = match probe.read() {
            Ok(sample) => sample,
            // Containers without any interface have nothing to read
            Err(ProbeError::Unavailable(_)) => return,
            Err(e) => panic!("unexpected probe error: {e}"),
        };

        let second = probe.read().unwrap();
        assert!(second.sent_bytes >= first.sent_bytes);
        assert!(second.recv_bytes >= first.recv_bytes);
    }

    #[tokio::test]
    async fn test_sample_matches_read_contract() {
        let probe = SystemUsageProbe::default();
        match probe.sample().await {
            Ok(_) | Err(ProbeError::Unavailable(_)) => {}
            Err(e) => panic!("unexpected probe error: {e}"),
        }
    }
}
