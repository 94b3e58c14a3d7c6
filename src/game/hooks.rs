//! Script Hooks
//!
//! Callbacks the world invokes when entities leave a map. Registered once as
//! a trait object on the world state.

use tracing::debug;

use crate::game::entity::Entity;

/// Scripting callbacks, run synchronously inside world operations.
pub trait ScriptHooks: Send {
    /// The entity died. Called before `on_removed`.
    fn on_death(&mut self, entity: &Entity);

    /// The entity was removed from its map for any reason.
    fn on_removed(&mut self, entity: &Entity);
}

/// Hooks that only log.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ScriptHooks for NoopHooks {
    fn on_death(&mut self, entity: &Entity) {
        debug!("Entity {} died", entity.id);
    }

    fn on_removed(&mut self, entity: &Entity) {
        debug!("Entity {} removed from {}", entity.id, entity.map_id);
    }
}
