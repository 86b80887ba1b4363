use stockroom_core::ActorId;

/// Who is performing a mutating request.
///
/// Inserted by the actor middleware; present on every mutating route.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actor_id: ActorId,
}

impl ActorContext {
    pub fn new(actor_id: ActorId) -> Self {
        Self { actor_id }
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }
}
