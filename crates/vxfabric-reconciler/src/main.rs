//! vxfabricd - VXLAN/BGP-EVPN kernel datapath reconciler
//!
//! Loads the desired-state document from `VXFABRIC_DESIRED_STATE`,
//! loads the last persisted state (if any), runs one reconciliation
//! attempt, and persists the outcome before exiting.

use std::process::ExitCode;

use tracing::{error, info, warn};

use vxfabric_reconciler::config::DesiredState;
use vxfabric_reconciler::facade::ShellKernelLink;
use vxfabric_reconciler::journal::Journal;
use vxfabric_reconciler::mode;
use vxfabric_reconciler::store::{StateRecord, StateStore};

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    info!("--- Starting vxfabricd (Rust) ---");

    let state = match DesiredState::from_env() {
        Ok(state) => state,
        Err(e) => {
            // ConfigInvalid is a fatal external error, raised before
            // any kernel mutation; no rollback is needed.
            error!(error = %e, "desired-state document rejected");
            return ExitCode::FAILURE;
        }
    };

    let store = StateStore::at_default_path();
    let prior_record = store.load().unwrap_or(None);
    let prior = prior_record.as_ref().map(|r| &r.config);

    let link = ShellKernelLink::new();
    let result = mode::dispatch(&link, prior, &state).await;
    let success = result.is_ok();

    // On failure the reconciler has already rolled every mutation from
    // this attempt back inline, so there is nothing left applied to
    // journal; an empty journal accurately reflects the attempt's net
    // effect on the kernel.
    let journal = match result {
        Ok(journal) => journal,
        Err(ref e) => {
            error!(error = %e, "reconciliation failed; rollback already attempted inline");
            Journal::new()
        }
    };
    if success {
        info!("reconciliation completed successfully");
    }

    let record = StateRecord {
        timestamp: chrono::Utc::now().to_rfc3339(),
        config: state,
        success,
        operations: journal,
    };
    if let Err(e) = store.save(&record) {
        warn!(error = %e, "failed to persist reconciliation state (best-effort, proceeding)");
    }

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();
}
