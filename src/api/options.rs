use std::convert::TryFrom;
use tokio::time::Duration;

/// Tunables for the failover coordinator. Leave fields `None` for defaults.
#[derive(Clone, Default)]
pub struct CoordinatorOptions {
    /// Per-peer deadline for installing a branch (both phases).
    pub store_branch_timeout: Option<Duration>,
    /// Per-peer deadline for the best-effort rollback after an aborted
    /// failover. Shorter than the install timeout: the operation already
    /// failed and the caller is waiting for the verdict.
    pub cleanup_branch_timeout: Option<Duration>,
    /// Per-peer deadline for an explicit cancel.
    pub cancel_branch_timeout: Option<Duration>,
    /// How many queued requests the coordinator mailbox holds.
    pub mailbox_size: Option<usize>,
}

pub(crate) struct CoordinatorOptionsValidated {
    pub store_branch_timeout: Duration,
    pub cleanup_branch_timeout: Duration,
    pub cancel_branch_timeout: Duration,
    pub mailbox_size: usize,
}

impl CoordinatorOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.store_branch_timeout.is_zero()
            || self.cleanup_branch_timeout.is_zero()
            || self.cancel_branch_timeout.is_zero()
        {
            return Err("Branch operation timeouts must be non-zero");
        }
        if self.cleanup_branch_timeout > self.store_branch_timeout {
            return Err("Cleanup timeout must not exceed the install timeout");
        }
        if self.mailbox_size == 0 {
            return Err("Coordinator mailbox size must be non-zero");
        }

        Ok(())
    }
}

impl TryFrom<CoordinatorOptions> for CoordinatorOptionsValidated {
    type Error = &'static str;

    fn try_from(options: CoordinatorOptions) -> Result<Self, Self::Error> {
        let values = CoordinatorOptionsValidated {
            store_branch_timeout: options.store_branch_timeout.unwrap_or(Duration::from_secs(15)),
            cleanup_branch_timeout: options.cleanup_branch_timeout.unwrap_or(Duration::from_secs(5)),
            cancel_branch_timeout: options.cancel_branch_timeout.unwrap_or(Duration::from_secs(15)),
            mailbox_size: options.mailbox_size.unwrap_or(16),
        };

        values.validate()?;
        Ok(values)
    }
}
