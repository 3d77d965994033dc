// src/exec/unit.rs

//! The unit-of-work abstraction the scheduler drives.
//!
//! The scheduler never looks inside a unit: it only needs a display name, a
//! kind (the capability tag dependents refer to) and a way to execute it
//! against the shared context.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::dag::CapabilityTag;

/// Future returned by [`Unit::execute`].
pub type UnitFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Shared handle to a unit, as passed to the scheduler.
pub type SharedUnit<C> = Arc<dyn Unit<C>>;

/// One schedulable unit of work.
///
/// `C` is the context every unit of a run receives, unchanged.
pub trait Unit<C>: Send + Sync {
    /// Human-readable identity used in logs and outcomes.
    fn name(&self) -> &str;

    /// Capability tag this unit provides.
    fn kind(&self) -> &str;

    /// All capability tags satisfied once this unit completes.
    ///
    /// The scheduler always adds [`kind`](Unit::kind) to this set.
    fn provides(&self) -> BTreeSet<CapabilityTag> {
        BTreeSet::from([self.kind().to_string()])
    }

    /// Run the unit. Called at most once per run.
    fn execute(&self, context: Arc<C>) -> UnitFuture<'_>;
}
