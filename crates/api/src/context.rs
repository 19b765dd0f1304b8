use epro_core::UserId;

/// Who is acting on a request.
///
/// Taken from the optional `x-actor-id` header; writes without it are
/// recorded without a user.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ActorContext {
    actor: Option<UserId>,
}

impl ActorContext {
    pub fn new(actor: Option<UserId>) -> Self {
        Self { actor }
    }

    pub fn actor(&self) -> Option<UserId> {
        self.actor
    }
}
