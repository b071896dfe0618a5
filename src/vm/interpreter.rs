use tracing::{debug, instrument, trace, warn};

use crate::bytecode::format::{ComparisonOp, Opcode, ScriptPtr, SegmentedAddress};
use crate::bytecode::reader::{Command, CommandReader};
use crate::config::VmConfig;
use crate::integration::{Diagnostic, Diagnostics};
use crate::level::LevelState;
use crate::memory::{ContentMemory, SegmentService};
use crate::overrides::{OverrideResolver, OwnerId, Registration};
use crate::services::{
    PresentationQueue, PresentationService, SceneWorld, TokenService, TokenTable, WorldService,
};
use crate::{VmFault, VmResult};

use super::context::{ExecutionContext, ScriptStatus};
use super::host::{HostContext, HostFunctions};
use super::stack::ControlStack;
use super::table::{DispatchTable, Flow, OpHandler, CANONICAL_TABLE};

/// Collaborators an interpreter is assembled from.
pub struct VmParts {
    pub memory: Box<dyn SegmentService>,
    pub tokens: Box<dyn TokenService>,
    pub world: Box<dyn WorldService>,
    pub presentation: Box<dyn PresentationService>,
}

impl VmParts {
    /// Uses `memory` and the default implementation of every other service.
    pub fn new(memory: impl SegmentService + 'static) -> Self {
        Self {
            memory: Box::new(memory),
            tokens: Box::new(TokenTable::new()),
            world: Box::new(SceneWorld::new()),
            presentation: Box::new(PresentationQueue::new()),
        }
    }

    pub fn with_tokens(mut self, tokens: impl TokenService + 'static) -> Self {
        self.tokens = Box::new(tokens);
        self
    }

    pub fn with_world(mut self, world: impl WorldService + 'static) -> Self {
        self.world = Box::new(world);
        self
    }

    pub fn with_presentation(mut self, presentation: impl PresentationService + 'static) -> Self {
        self.presentation = Box::new(presentation);
        self
    }
}

/// Level script interpreter.
///
/// One interpreter owns its control stack, dispatch table, override registry and
/// collaborators. Every mutation goes through `&mut self`; the boxed collaborators are not
/// `Sync`, so an interpreter is driven from a single thread.
pub struct LevelVm {
    pub(crate) reader: CommandReader,
    pub(crate) config: VmConfig,
    pub(crate) context: ExecutionContext,
    pub(crate) stack: ControlStack,
    pub(crate) table: DispatchTable,
    pub(crate) overrides: OverrideResolver,
    pub(crate) active_owner: Option<OwnerId>,
    pub(crate) level: LevelState,
    pub(crate) memory: Box<dyn SegmentService>,
    pub(crate) tokens: Box<dyn TokenService>,
    pub(crate) world: Box<dyn WorldService>,
    pub(crate) presentation: Box<dyn PresentationService>,
    pub(crate) host: HostFunctions,
    pub(crate) diagnostics: Diagnostics,
}

impl LevelVm {
    pub fn new(config: VmConfig, parts: VmParts) -> Self {
        let level_pool = config.level_pool_bytes.min(parts.memory.available());
        Self {
            reader: CommandReader::new(config.layout),
            context: ExecutionContext::default(),
            stack: ControlStack::new(),
            table: DispatchTable::default(),
            overrides: OverrideResolver::new(),
            active_owner: None,
            level: LevelState::new(level_pool),
            memory: parts.memory,
            tokens: parts.tokens,
            world: parts.world,
            presentation: parts.presentation,
            host: HostFunctions::new(),
            diagnostics: Diagnostics::new(config.diagnostic_budget),
            config,
        }
    }

    /// Interpreter over a content image with default services.
    pub fn with_content(config: VmConfig, image: Vec<u8>) -> Self {
        let memory = ContentMemory::new(image, config.main_pool_bytes);
        Self::new(config, VmParts::new(memory))
    }

    /// Runs from `start` until the script sleeps, exits or faults, returning the pointer to
    /// resume from.
    #[instrument(skip_all, fields(start = %start))]
    pub fn execute(&mut self, start: ScriptPtr) -> VmResult<ScriptPtr> {
        self.context.status = ScriptStatus::Running;
        self.active_owner = None;
        self.diagnostics.begin_run();
        let canonical = self.select_table();

        let mut cursor = self.follow_overrides(start);
        let mut steps = 0u64;
        let result = loop {
            if self.context.status != ScriptStatus::Running {
                break Ok(cursor);
            }
            if self.config.step_limit != 0 && steps >= self.config.step_limit {
                break Err(VmFault::StepLimitExceeded {
                    limit: self.config.step_limit,
                });
            }
            steps += 1;
            match self.step(cursor, canonical) {
                Ok(next) => cursor = next,
                Err(fault) => break Err(fault),
            }
        };

        self.context.cursor = Some(cursor);
        if let Err(fault) = &result {
            self.context.status = ScriptStatus::Paused;
            warn!(%fault, %cursor, "script faulted");
        } else {
            debug!(status = ?self.context.status, %cursor, steps, "script yielded");
        }
        self.diagnostics.finish_run();
        result
    }

    fn step(&mut self, cursor: ScriptPtr, canonical: bool) -> VmResult<ScriptPtr> {
        let bytes = self
            .memory
            .buffer(cursor.buffer)
            .ok_or(VmFault::DanglingPointer { ptr: cursor })?;
        let opcode = self.reader.opcode_at(&bytes, cursor)?;
        let Some(handler) = self.handler_for(opcode, canonical) else {
            debug!(opcode, %cursor, "opcode beyond the dispatch table, pausing");
            self.context.status = ScriptStatus::Paused;
            return Ok(cursor);
        };
        let command = self.reader.decode(bytes, cursor)?;
        trace!(opcode, %cursor, "dispatch");
        let next = match handler(self, &command)? {
            Flow::Next => command.next(),
            Flow::Goto(target) => target,
            Flow::Hold => cursor,
        };
        Ok(self.follow_overrides(next))
    }

    fn handler_for(&self, opcode: u8, canonical: bool) -> Option<OpHandler> {
        let entry = if canonical {
            CANONICAL_TABLE.get(opcode as usize)
        } else {
            self.table.entry(opcode)
        };
        entry.map(|entry| entry.handler)
    }

    /// Returns true when this run must dispatch through the canonical table.
    fn select_table(&self) -> bool {
        let patched = self.table.tampered_canaries();
        if patched.is_empty() {
            return false;
        }
        warn!(?patched, "dispatch table canaries modified, using canonical table");
        self.diagnostics
            .emit(Diagnostic::DispatchTableRestored { patched });
        true
    }

    /// Resolves `ptr` and makes the author of the command it lands on the active owner.
    fn follow_overrides(&mut self, ptr: ScriptPtr) -> ScriptPtr {
        let resolution = self.overrides.resolve(ptr);
        if let Some(owner) = resolution.owner {
            if resolution.ptr != ptr || self.active_owner != Some(owner) {
                self.diagnostics.emit(Diagnostic::OverrideResolved {
                    original: ptr,
                    replacement: resolution.ptr,
                    owner,
                });
            }
        }
        self.active_owner = resolution
            .owner
            .or_else(|| self.overrides.stream_owner(resolution.ptr.buffer));
        resolution.ptr
    }

    /// Pointer the interpreter would run for `ptr` with the current overrides.
    pub fn override_resolve(&self, ptr: ScriptPtr) -> ScriptPtr {
        self.overrides.resolve(ptr).ptr
    }

    /// Owner that authored the command at the cursor, `None` for base content.
    pub fn active_owner(&self) -> Option<OwnerId> {
        self.active_owner
    }

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

    /// Installs a script buffer with the memory service and returns a pointer to its start.
    pub fn install_script(&mut self, bytes: Vec<u8>) -> ScriptPtr {
        ScriptPtr::start_of(self.memory.install(bytes))
    }

    pub fn status(&self) -> ScriptStatus {
        self.context.status
    }

    pub fn register(&self) -> i32 {
        self.context.register
    }

    pub fn set_register(&mut self, value: i32) {
        self.context.register = value;
    }

    /// Pointer at which the last run stopped.
    pub fn cursor(&self) -> Option<ScriptPtr> {
        self.context.cursor
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn stack(&self) -> &ControlStack {
        &self.stack
    }

    pub fn level(&self) -> &LevelState {
        &self.level
    }

    pub fn level_mut(&mut self) -> &mut LevelState {
        &mut self.level
    }

    pub fn memory(&self) -> &dyn SegmentService {
        self.memory.as_ref()
    }

    pub fn memory_mut(&mut self) -> &mut dyn SegmentService {
        self.memory.as_mut()
    }

    pub fn host_functions_mut(&mut self) -> &mut HostFunctions {
        &mut self.host
    }

    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.table
    }

    pub fn dispatch_table_mut(&mut self) -> &mut DispatchTable {
        &mut self.table
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    // Helpers shared by the opcode handlers.

    pub(crate) fn emit(&self, diagnostic: Diagnostic) {
        self.diagnostics.emit(diagnostic);
    }

    pub(crate) fn resolve_address(&self, address: SegmentedAddress) -> VmResult<ScriptPtr> {
        self.memory
            .resolve(address)
            .ok_or(VmFault::UnresolvedAddress { address })
    }

    pub(crate) fn command_at(&self, ptr: ScriptPtr) -> VmResult<Command> {
        let bytes = self
            .memory
            .buffer(ptr.buffer)
            .ok_or(VmFault::DanglingPointer { ptr })?;
        self.reader.decode(bytes, ptr)
    }

    /// Evaluates `register OP literal` with the operator at offset 2 and the literal at 4.
    pub(crate) fn condition(&self, command: &Command) -> VmResult<bool> {
        let raw = command.u8(2)?;
        let op = ComparisonOp::try_from(raw).map_err(|_| VmFault::InvalidComparison {
            ptr: command.ptr(),
            op: raw,
        })?;
        Ok(op.evaluate(self.context.register, command.i32(4)?))
    }

    /// Pops a memory checkpoint, reporting underflow instead of failing.
    pub(crate) fn pop_checkpoint(&mut self, opcode: Opcode) {
        if self.memory.pop_state().is_err() {
            self.emit(Diagnostic::PoolUnderflow { opcode });
        }
    }

    pub(crate) fn invoke_host(&mut self, id: u32, arg: i16) -> Option<i32> {
        let LevelVm {
            host,
            overrides,
            level,
            diagnostics,
            context,
            active_owner,
            ..
        } = self;
        let Some(function) = host.get_mut(id) else {
            diagnostics.emit(Diagnostic::UnknownHostFunction { id });
            return None;
        };
        let mut host_context = HostContext {
            overrides,
            level,
            diagnostics,
            active_owner: *active_owner,
        };
        Some(function(&mut host_context, arg, context.register))
    }
}

impl std::fmt::Debug for LevelVm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelVm")
            .field("context", &self.context)
            .field("stack_depth", &self.stack.depth())
            .field("overrides", &self.overrides.len())
            .field("active_owner", &self.active_owner)
            .finish_non_exhaustive()
    }
}
