//! What happens to the remote object when its resource is deleted

use std::time::Duration;

use crate::crd::LifecycleState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionPolicy {
    /// Release the resource and leave the remote object running
    Detach,
    /// Terminate the remote object before releasing the resource
    Terminate,
}

impl DeletionPolicy {
    pub fn from_hard_link(hard_link: bool) -> Self {
        if hard_link {
            DeletionPolicy::Terminate
        } else {
            DeletionPolicy::Detach
        }
    }
}

/// Next step of a deletion pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionStep {
    /// Remove the finalizer; nothing remote is left to wait for
    Release,
    /// A delete was sent recently; look again after this long
    AwaitTeardown(Duration),
    /// Send the delete call
    Dispatch,
}

/// Decide the next deletion step from the freshly observed remote state.
///
/// `observed` is `None` when the remote object could not be found.
/// `pending_delete_age` is the age of a delete this controller already sent.
pub fn next_step(
    policy: DeletionPolicy,
    identity: Option<&str>,
    observed: Option<&LifecycleState>,
    pending_delete_age: Option<Duration>,
    max_wait: Duration,
    poll_interval: Duration,
) -> DeletionStep {
    if policy == DeletionPolicy::Detach || identity.is_none() {
        return DeletionStep::Release;
    }
    match observed {
        None => DeletionStep::Release,
        Some(state) if state.is_torn_down() => DeletionStep::Release,
        Some(_) => match pending_delete_age {
            Some(age) if age < max_wait => {
                DeletionStep::AwaitTeardown(poll_interval.min(max_wait - age))
            }
            _ => DeletionStep::Dispatch,
        },
    }
}
