// crates/test-utils/src/lib.rs

//! Shared helpers for rundag's integration tests.
//!
//! - [`builders`]: in-code `ConfigFile` construction.
//! - [`fake_unit`]: scriptable units plus a [`Recorder`](fake_unit::Recorder)
//!   for asserting start/finish order and concurrency.
//! - [`log_capture`]: in-memory log output for asserting on what was logged.

pub mod builders;
pub mod fake_unit;
pub mod log_capture;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Upper bound for a single scheduler run in tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a test subscriber once per test binary.
///
/// Output is captured by the test harness and only shown for failing tests.
/// `RUNDAG_LOG` takes the same directives as the binary, e.g.
/// `RUNDAG_LOG=rundag::dag=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("RUNDAG_LOG")
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, failing the test if it takes longer than [`TEST_TIMEOUT`].
///
/// A scheduler that never terminates (a unit that never finishes, a missed
/// deadlock) fails the test instead of stalling the suite.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("test timed out after {TEST_TIMEOUT:?}"),
    }
}
