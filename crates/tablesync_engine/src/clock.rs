//! Clock-skew calibration.
//!
//! Batches are stamped with a skew estimate so the server can place
//! client mutations on its own timeline. The estimate is built by
//! proposing `local + offset` and folding the server's residual back in
//! until the residual falls under the tolerance.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteEndpoint;
use tablesync_core::now_millis;

/// Converges on a clock-skew estimate in milliseconds.
///
/// # Errors
///
/// Returns [`SyncError::ClockSkew`] when the residual never falls under
/// `config.clock_tolerance_ms` within `config.clock_max_rounds` rounds,
/// and propagates transport failures.
pub async fn calibrate<R: RemoteEndpoint>(remote: &R, config: &SyncConfig) -> SyncResult<i64> {
    let mut offset = 0i64;
    let mut residual = 0i64;
    for round in 1..=config.clock_max_rounds {
        let proposed = now_millis() + offset;
        residual = remote.time_delta(proposed).await?;
        offset += residual;
        if residual.abs() < config.clock_tolerance_ms {
            tracing::debug!(round, offset_ms = offset, "clock calibrated");
            return Ok(offset);
        }
        tracing::debug!(round, residual_ms = residual, "clock residual above tolerance");
    }
    Err(SyncError::ClockSkew {
        residual_ms: residual,
        rounds: config.clock_max_rounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;
    use tablesync_core::Schema;

    #[tokio::test]
    async fn converges_on_a_constant_offset() {
        let remote = MockRemote::new(Schema::new(1));
        remote.set_clock_offset_ms(3_600_000);
        let config = SyncConfig::new("acct");
        let offset = calibrate(&remote, &config).await.unwrap();
        assert!((3_599_000..=3_601_000).contains(&offset));
    }

    #[tokio::test]
    async fn aligned_clocks_calibrate_in_one_round() {
        let remote = MockRemote::new(Schema::new(1));
        let config = SyncConfig::new("acct");
        let offset = calibrate(&remote, &config).await.unwrap();
        assert!(offset.abs() < 500);
    }

    #[tokio::test]
    async fn never_converging_residual_fails_after_the_round_budget() {
        let remote = MockRemote::new(Schema::new(1));
        remote.set_stuck_residual_ms(10_000);
        let config = SyncConfig::new("acct").with_clock_max_rounds(4);
        let err = calibrate(&remote, &config).await.unwrap_err();
        match err {
            SyncError::ClockSkew { residual_ms, rounds } => {
                assert_eq!(residual_ms, 10_000);
                assert_eq!(rounds, 4);
            }
            other => panic!("expected clock skew, got {other}"),
        }
    }
}
