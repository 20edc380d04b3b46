//! Caller identity.
//!
//! Authentication happens outside the core. By the time a call arrives, the transport has
//! resolved the caller to a person id and a role; the core trusts both and scopes every
//! operation by them.

use crate::records::Role;
use crate::{CareError, CareResult};
use care_uuid::RecordId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentityContext {
    pub actor_id: RecordId,
    pub role: Role,
}

impl IdentityContext {
    pub fn new(actor_id: RecordId, role: Role) -> Self {
        Self { actor_id, role }
    }

    /// Fails unless the caller holds one of `allowed`.
    ///
    /// A forbidden call is reported as `NotFound` on `what`, the same as a call on a
    /// resource that does not exist.
    pub fn require(&self, allowed: &[Role], what: &str) -> CareResult<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            tracing::debug!(
                "{} {} denied access to {}",
                self.role,
                self.actor_id,
                what
            );
            Err(CareError::not_found(what))
        }
    }
}
