//! Scheduling actions run against a session, in configured order.

pub mod preempt;

use crate::error::{SchedulerError, SchedulerResult};
use crate::framework::Session;

pub use preempt::PreemptAction;

pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run to completion against `session`. Failures are recovered
    /// locally; nothing is reported back to the caller.
    fn execute(&self, session: &mut Session);
}

/// Look up an action by its configured name.
pub fn new_action(name: &str) -> SchedulerResult<Box<dyn Action>> {
    match name {
        preempt::NAME => Ok(Box::new(PreemptAction::new())),
        other => Err(SchedulerError::UnknownAction(other.to_string())),
    }
}
