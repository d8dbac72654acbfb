//! Disablement Action
//!
//! Turns a flagging verdict into an outcome. In dry-run mode nothing is
//! sent to the provider. Otherwise the key is set to `Inactive` even when
//! it already is, which the provider treats as a no-op.

use tracing::debug;

use crate::policy::Verdict;
use crate::provider::{AccessKey, Account, IdentityProvider, KeyStatus};
use crate::report::{ErrorStage, Outcome};

/// Disable `key`, or record that it would have been disabled.
///
/// Never fails: provider errors become an error outcome carrying the
/// verdict and the cause.
pub async fn disable(
    provider: &dyn IdentityProvider,
    account: &Account,
    key: &AccessKey,
    verdict: &Verdict,
    dry_run: bool,
) -> Outcome {
    if dry_run {
        return Outcome::dry_run_flagged(account, key, verdict);
    }

    debug!(
        user = %account.user_name,
        key_id = %key.key_id,
        current_status = %key.status,
        "Setting access key status to Inactive"
    );

    match provider
        .set_status(&key.key_id, account, KeyStatus::Inactive)
        .await
    {
        Ok(()) => Outcome::disabled(account, key, verdict),
        Err(e) => Outcome::key_error(account, key, ErrorStage::SetStatus, &e).caused_by(verdict),
    }
}
