//! Mode dispatch: routes a decoded desired-state document to the one
//! implemented reconciliation strategy.

use crate::config::{DesiredState, Mode};
use crate::facade::KernelLink;
use crate::journal::Journal;
use crate::reconciler::reconcile;
use vxfabric_common::error::{ReconcileError, ReconcileResult};

/// Dispatches on `state.Mode`. Only [`Mode::DistributeSymmetric`]
/// reaches the reconciler; the other two variants decode successfully
/// (so a document naming them is not itself a parse error) but
/// dispatch to an explicit "not implemented" error without touching
/// the kernel facade.
pub async fn dispatch(
    link: &dyn KernelLink,
    prior: Option<&DesiredState>,
    new: &DesiredState,
) -> ReconcileResult<Journal> {
    match new.Mode {
        Mode::DistributeSymmetric => reconcile(link, prior, new).await,
        Mode::Central => Err(ReconcileError::config_invalid(
            "Mode",
            "mode 'central' is not implemented",
        )),
        Mode::DistributeAsymmetric => Err(ReconcileError::config_invalid(
            "Mode",
            "mode 'distribute-asymmetric' is not implemented",
        )),
    }
}
