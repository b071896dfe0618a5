//! Host functions reachable through `CALL` and `CALL_LOOP`.

use std::collections::BTreeMap;
use std::fmt;

use crate::bytecode::format::ScriptPtr;
use crate::integration::{Diagnostic, Diagnostics};
use crate::level::LevelState;
use crate::overrides::{OverrideResolver, OwnerId, Registration};

/// View of the interpreter handed to a host function.
pub struct HostContext<'a> {
    pub(crate) overrides: &'a mut OverrideResolver,
    pub(crate) level: &'a mut LevelState,
    pub(crate) diagnostics: &'a Diagnostics,
    pub(crate) active_owner: Option<OwnerId>,
}

impl HostContext<'_> {
    /// Registers an override; it takes effect at the post-dispatch resolution of this step.
    pub fn register_override(
        &mut self,
        original: ScriptPtr,
        replacement: ScriptPtr,
        owner: OwnerId,
    ) -> Registration {
        let registration = self.overrides.register(original, replacement, owner);
        if let Registration::Shadowed { by } = registration {
            self.diagnostics.emit(Diagnostic::OverrideConflict {
                original,
                owner,
                shadowed_by: by,
            });
        }
        registration
    }

    pub fn unregister_overrides(&mut self, owner: OwnerId) -> usize {
        self.overrides.unregister_all(owner)
    }

    pub fn active_owner(&self) -> Option<OwnerId> {
        self.active_owner
    }

    pub fn level(&self) -> &LevelState {
        self.level
    }

    pub fn level_mut(&mut self) -> &mut LevelState {
        self.level
    }
}

/// Signature of a host function: `(context, argument, register) -> new register`.
pub type HostFn = Box<dyn FnMut(&mut HostContext<'_>, i16, i32) -> i32>;

/// Host functions keyed by the identifier stored in the command's pointer field.
#[derive(Default)]
pub struct HostFunctions {
    functions: BTreeMap<u32, HostFn>,
}

impl HostFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, id: u32, function: F)
    where
        F: FnMut(&mut HostContext<'_>, i16, i32) -> i32 + 'static,
    {
        self.functions.insert(id, Box::new(function));
    }

    pub fn remove(&mut self, id: u32) -> bool {
        self.functions.remove(&id).is_some()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.functions.contains_key(&id)
    }

    pub(crate) fn get_mut(&mut self, id: u32) -> Option<&mut HostFn> {
        self.functions.get_mut(&id)
    }
}

impl fmt::Debug for HostFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunctions")
            .field("ids", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}
