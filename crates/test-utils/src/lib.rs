//! Shared helpers for stageflow's integration tests.
//!
//! [`builders`] holds executor, task and config shortcuts; this module sets up
//! test logging and bounds async tests that drive the frame ticker.

pub mod builders;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::fmt;

static INIT: Once = Once::new();

/// Upper bound for one async runtime test; a stalled frame loop fails here
/// instead of hanging the test binary.
pub const RUNTIME_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Route `tracing` output through the test writer, once per test binary.
///
/// Reads the same `STAGEFLOW_LOG` directive as the binary, e.g.
/// `STAGEFLOW_LOG=stageflow::exec=trace cargo test --test parenting`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let directive = std::env::var(stageflow::logging::LOG_ENV).ok();
        let filter = stageflow::logging::build_filter(None, directive.as_deref());

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, failing the test once [`RUNTIME_TEST_TIMEOUT`] passes.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(RUNTIME_TEST_TIMEOUT, f)
        .await
        .expect("runtime test timed out; a frame loop probably stalled")
}
