//! Bounded wait for external readiness
//!
//! The workload serves a public domain, so the sequence waits for that name
//! to resolve before starting it. The wait is bounded: on deadline the
//! sequence proceeds with a recorded warning, because a host blocked
//! forever on DNS propagation is unreachable for remediation.

use crate::error::Result;
use crate::step::{BootstrapStep, StepContext, StepOutcome};
use std::time::Instant;
use tokio::net::lookup_host;
use tokio::time::sleep;

/// Pipeline step 4: wait for the target domain to resolve
pub struct PreconditionWait;

#[async_trait::async_trait]
impl BootstrapStep for PreconditionWait {
    fn name(&self) -> &str {
        "precondition-wait"
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome> {
        let domain = &ctx.target.domain;
        let deadline = Instant::now() + ctx.dns_timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match lookup_host((domain.as_str(), 443)).await {
                Ok(mut addrs) => {
                    if let Some(addr) = addrs.next() {
                        tracing::info!("'{}' resolves to {} after {} attempts", domain, addr, attempts);
                        return Ok(StepOutcome::Completed);
                    }
                }
                Err(e) => {
                    tracing::debug!("DNS attempt {} for '{}' failed: {}", attempts, domain, e);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let warning = format!(
                    "'{}' did not resolve within {:?} ({} attempts); proceeding anyway",
                    domain, ctx.dns_timeout, attempts
                );
                tracing::warn!("{}", warning);
                return Ok(StepOutcome::CompletedWithWarning(warning));
            }
            sleep(ctx.dns_poll_interval.min(remaining)).await;
        }
    }
}
