//! Reconciliation: comparing the local cache against canonical chain state.
//!
//! Divergence is a first-class result, not an error — callers display it.
//! The comparison is order-sensitive and element-wise: ring order defines
//! the index semantics the signature scheme consumes, so a reordered ring
//! is as wrong as a different one.

use tracing::{debug, warn};

use vexil_cloud::CloudRecord;
use vexil_store::CloudStore;

use crate::client::ChainStateClient;
use crate::error::RailError;
use crate::rpc::ChainRpc;
use crate::types::Address;

/// Outcome of checking a local record against the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileStatus {
    /// The canonical ring matches the local one exactly.
    Verified,
    /// Length, order, or any entry differs. Never a partial match.
    Mismatch,
    /// No account exists at the derived address.
    NotFoundOnChain,
}

/// Compare `record` against the canonical record for `(owner, cloud_id)`.
pub async fn reconcile<R: ChainRpc>(
    client: &ChainStateClient<R>,
    owner: &Address,
    record: &CloudRecord,
) -> Result<ReconcileStatus, RailError> {
    let Some(canonical) = client.fetch_cloud(owner, record.cloud_id).await? else {
        debug!(cloud_id = record.cloud_id, "no canonical record on chain");
        return Ok(ReconcileStatus::NotFoundOnChain);
    };

    if canonical.owner != *owner
        || canonical.cloud_id != record.cloud_id
        || canonical.ring.len() != record.addresses.len()
        || canonical
            .ring
            .iter()
            .zip(record.addresses.iter())
            .any(|(chain, local)| chain != local)
    {
        warn!(cloud_id = record.cloud_id, "local ring diverges from canonical record");
        return Ok(ReconcileStatus::Mismatch);
    }

    Ok(ReconcileStatus::Verified)
}

/// Reconcile and persist the outcome on the stored record.
///
/// Only a `Verified` outcome sets the flag; any other outcome clears it.
pub async fn reconcile_and_mark<R: ChainRpc>(
    client: &ChainStateClient<R>,
    store: &CloudStore,
    owner: &Address,
    record: &CloudRecord,
) -> Result<ReconcileStatus, RailError> {
    let status = reconcile(client, owner, record).await?;
    store
        .mark_verified(record.cloud_id, status == ReconcileStatus::Verified)
        .map_err(|e| RailError::Store(e.to_string()))?;
    Ok(status)
}
