//! Builder for level command streams.
//!
//! The builder writes commands in the physical layout selected by a [`CommandLayout`] and
//! resolves forward and backward jump labels into segmented addresses once the script is
//! finished. Scripts are assumed to be mapped at `segment:base`.

use thiserror::Error;

use super::format::{
    ByteOrder, CommandLayout, ComparisonOp, FormatError, Opcode, PointerWidth, SegmentedAddress,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("label {0} was never bound")]
    DanglingLabel(usize),
    #[error("label {0} was bound twice")]
    LabelRebound(usize),
    #[error("script does not fit in a 24-bit segment offset")]
    TooLarge,
    #[error(transparent)]
    Format(#[from] FormatError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

/// Destination of a control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Address(SegmentedAddress),
    Label(Label),
}

impl From<SegmentedAddress> for Target {
    fn from(address: SegmentedAddress) -> Self {
        Target::Address(address)
    }
}

impl From<Label> for Target {
    fn from(label: Label) -> Self {
        Target::Label(label)
    }
}

/// A single operand written at a narrow offset.
#[derive(Debug, Clone, Copy)]
pub enum Field {
    U8(usize, u8),
    U16(usize, u16),
    I16(usize, i16),
    U32(usize, u32),
    I32(usize, i32),
    Ptr(usize, u64),
    Target(usize, Target),
}

/// Operands shared by the object placement commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectPlacement {
    pub acts: u8,
    pub model: u8,
    pub position: [i16; 3],
    pub angle: [i16; 3],
    pub behavior_arg: u32,
}

#[derive(Debug, Clone, Copy)]
struct Fixup {
    at: usize,
    order: ByteOrder,
    label: Label,
}

#[derive(Debug, Clone)]
pub struct ScriptBuilder {
    layout: CommandLayout,
    segment: u8,
    base: u32,
    bytes: Vec<u8>,
    labels: Vec<Option<u32>>,
    fixups: Vec<Fixup>,
}

impl ScriptBuilder {
    /// Creates a builder for a script that will be mapped at `segment:0`.
    pub fn new(layout: CommandLayout, segment: u8) -> Self {
        Self::with_base(layout, segment, 0)
    }

    pub fn with_base(layout: CommandLayout, segment: u8, base: u32) -> Self {
        Self {
            layout,
            segment,
            base,
            bytes: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
        }
    }

    /// Byte offset of the next command relative to the start of the script.
    pub fn here(&self) -> u32 {
        self.bytes.len() as u32
    }

    /// Segmented address of a byte offset inside this script.
    pub fn address_of(&self, offset: u32) -> Result<SegmentedAddress, AssemblyError> {
        let absolute = self.base + offset;
        if absolute > 0x00FF_FFFF {
            return Err(AssemblyError::TooLarge);
        }
        Ok(SegmentedAddress::new(self.segment, absolute)?)
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub fn bind(&mut self, label: Label) -> Result<&mut Self, AssemblyError> {
        let here = self.here();
        let slot = self
            .labels
            .get_mut(label.0)
            .ok_or(AssemblyError::DanglingLabel(label.0))?;
        if slot.is_some() {
            return Err(AssemblyError::LabelRebound(label.0));
        }
        *slot = Some(here);
        Ok(self)
    }

    /// Emits `op` with its canonical size and the given operands.
    pub fn emit(&mut self, op: Opcode, fields: &[Field]) -> &mut Self {
        self.emit_sized(op as u8, op.canonical_size(), fields)
    }

    /// Emits an arbitrary command. Used for opcodes outside the table and malformed input.
    pub fn emit_sized(&mut self, opcode: u8, size: u8, fields: &[Field]) -> &mut Self {
        let start = self.bytes.len();
        let len = self.layout.command_bytes(size).max(2);
        self.bytes.resize(start + len, 0);
        self.bytes[start] = opcode;
        self.bytes[start + 1] = size;
        let order = self.layout.order_for(opcode);
        for field in fields {
            self.write_field(start, order, *field);
        }
        self
    }

    fn write_field(&mut self, start: usize, order: ByteOrder, field: Field) {
        let layout = self.layout;
        let at = |offset: usize| start + layout.transform(offset);
        match field {
            Field::U8(offset, value) => self.bytes[at(offset)] = value,
            Field::U16(offset, value) => self.put(at(offset), &encode(order, &value.to_le_bytes())),
            Field::I16(offset, value) => self.put(at(offset), &encode(order, &value.to_le_bytes())),
            Field::U32(offset, value) => self.put(at(offset), &encode(order, &value.to_le_bytes())),
            Field::I32(offset, value) => self.put(at(offset), &encode(order, &value.to_le_bytes())),
            Field::Ptr(offset, value) => self.put_ptr(at(offset), order, value),
            Field::Target(offset, Target::Address(address)) => {
                self.put_ptr(at(offset), order, u64::from(address.raw()))
            }
            Field::Target(offset, Target::Label(label)) => self.fixups.push(Fixup {
                at: at(offset),
                order,
                label,
            }),
        }
    }

    fn put(&mut self, at: usize, bytes: &[u8]) {
        self.bytes[at..at + bytes.len()].copy_from_slice(bytes);
    }

    fn put_ptr(&mut self, at: usize, order: ByteOrder, value: u64) {
        match self.layout.pointer_width {
            PointerWidth::Narrow => self.put(at, &encode(order, &(value as u32).to_le_bytes())),
            PointerWidth::Wide => self.put(at, &encode(order, &value.to_le_bytes())),
        }
    }

    /// Resolves labels and returns the encoded script.
    pub fn finish(mut self) -> Result<Vec<u8>, AssemblyError> {
        let fixups = std::mem::take(&mut self.fixups);
        for fixup in fixups {
            let offset = self
                .labels
                .get(fixup.label.0)
                .copied()
                .flatten()
                .ok_or(AssemblyError::DanglingLabel(fixup.label.0))?;
            let address = self.address_of(offset)?;
            self.put_ptr(fixup.at, fixup.order, u64::from(address.raw()));
        }
        Ok(self.bytes)
    }

    pub fn execute(
        &mut self,
        segment: u8,
        rom_start: u32,
        rom_end: u32,
        entry: impl Into<Target>,
    ) -> &mut Self {
        self.emit(
            Opcode::Execute,
            &segment_load_fields(segment, rom_start, rom_end, Some(entry.into())),
        )
    }

    pub fn exit_and_execute(
        &mut self,
        segment: u8,
        rom_start: u32,
        rom_end: u32,
        entry: impl Into<Target>,
    ) -> &mut Self {
        self.emit(
            Opcode::ExitAndExecute,
            &segment_load_fields(segment, rom_start, rom_end, Some(entry.into())),
        )
    }

    pub fn exit(&mut self) -> &mut Self {
        self.emit(Opcode::Exit, &[])
    }

    pub fn sleep(&mut self, frames: i16) -> &mut Self {
        self.emit(Opcode::Sleep, &[Field::I16(2, frames)])
    }

    pub fn sleep_before_exit(&mut self, frames: i16) -> &mut Self {
        self.emit(Opcode::SleepBeforeExit, &[Field::I16(2, frames)])
    }

    pub fn jump(&mut self, target: impl Into<Target>) -> &mut Self {
        self.emit(Opcode::Jump, &[Field::Target(4, target.into())])
    }

    pub fn jump_link(&mut self, target: impl Into<Target>) -> &mut Self {
        self.emit(Opcode::JumpLink, &[Field::Target(4, target.into())])
    }

    pub fn ret(&mut self) -> &mut Self {
        self.emit(Opcode::Return, &[])
    }

    pub fn loop_begin_count(&mut self, count: i16) -> &mut Self {
        self.emit(Opcode::LoopBeginCount, &[Field::I16(2, count)])
    }

    pub fn loop_repeat(&mut self) -> &mut Self {
        self.emit(Opcode::LoopRepeat, &[])
    }

    pub fn loop_begin(&mut self) -> &mut Self {
        self.emit(Opcode::LoopBegin, &[])
    }

    pub fn loop_until(&mut self, op: ComparisonOp, literal: i32) -> &mut Self {
        self.emit(
            Opcode::LoopUntil,
            &[Field::U8(2, op as u8), Field::I32(4, literal)],
        )
    }

    pub fn jump_if(
        &mut self,
        op: ComparisonOp,
        literal: i32,
        target: impl Into<Target>,
    ) -> &mut Self {
        self.emit(
            Opcode::JumpIf,
            &[
                Field::U8(2, op as u8),
                Field::I32(4, literal),
                Field::Target(8, target.into()),
            ],
        )
    }

    pub fn jump_link_if(
        &mut self,
        op: ComparisonOp,
        literal: i32,
        target: impl Into<Target>,
    ) -> &mut Self {
        self.emit(
            Opcode::JumpLinkIf,
            &[
                Field::U8(2, op as u8),
                Field::I32(4, literal),
                Field::Target(8, target.into()),
            ],
        )
    }

    pub fn skip_if(&mut self, op: ComparisonOp, literal: i32) -> &mut Self {
        self.emit(
            Opcode::SkipIf,
            &[Field::U8(2, op as u8), Field::I32(4, literal)],
        )
    }

    pub fn skip(&mut self) -> &mut Self {
        self.emit(Opcode::Skip, &[])
    }

    pub fn skip_nop(&mut self) -> &mut Self {
        self.emit(Opcode::SkipNop, &[])
    }

    pub fn call(&mut self, arg: i16, function: u32) -> &mut Self {
        self.emit(
            Opcode::Call,
            &[Field::I16(2, arg), Field::Ptr(4, u64::from(function))],
        )
    }

    pub fn call_loop(&mut self, arg: i16, function: u32) -> &mut Self {
        self.emit(
            Opcode::CallLoop,
            &[Field::I16(2, arg), Field::Ptr(4, u64::from(function))],
        )
    }

    pub fn set_register(&mut self, value: i16) -> &mut Self {
        self.emit(Opcode::SetRegister, &[Field::I16(2, value)])
    }

    pub fn push_pool(&mut self) -> &mut Self {
        self.emit(Opcode::PushPool, &[])
    }

    pub fn pop_pool(&mut self) -> &mut Self {
        self.emit(Opcode::PopPool, &[])
    }

    pub fn load_fixed(
        &mut self,
        dest: SegmentedAddress,
        rom_start: u32,
        rom_end: u32,
    ) -> &mut Self {
        self.emit(
            Opcode::LoadFixed,
            &[
                Field::Ptr(4, u64::from(dest.raw())),
                Field::Ptr(8, u64::from(rom_start)),
                Field::Ptr(12, u64::from(rom_end)),
            ],
        )
    }

    pub fn load_raw(&mut self, segment: u8, rom_start: u32, rom_end: u32) -> &mut Self {
        self.emit(
            Opcode::LoadRaw,
            &segment_load_fields(segment, rom_start, rom_end, None),
        )
    }

    pub fn load_compressed(&mut self, segment: u8, rom_start: u32, rom_end: u32) -> &mut Self {
        self.emit(
            Opcode::LoadCompressed,
            &segment_load_fields(segment, rom_start, rom_end, None),
        )
    }

    pub fn init_level(&mut self) -> &mut Self {
        self.emit(Opcode::InitLevel, &[])
    }

    pub fn clear_level(&mut self) -> &mut Self {
        self.emit(Opcode::ClearLevel, &[])
    }

    pub fn alloc_level_pool(&mut self) -> &mut Self {
        self.emit(Opcode::AllocLevelPool, &[])
    }

    pub fn free_level_pool(&mut self) -> &mut Self {
        self.emit(Opcode::FreeLevelPool, &[])
    }

    pub fn begin_area(&mut self, area: u8, geo: SegmentedAddress) -> &mut Self {
        self.emit(
            Opcode::BeginArea,
            &[Field::U8(2, area), Field::Ptr(4, u64::from(geo.raw()))],
        )
    }

    pub fn end_area(&mut self) -> &mut Self {
        self.emit(Opcode::EndArea, &[])
    }

    pub fn load_model_from_geo(&mut self, model: u16, geo: SegmentedAddress) -> &mut Self {
        self.emit(
            Opcode::LoadModelFromGeo,
            &[Field::U16(2, model), Field::Ptr(4, u64::from(geo.raw()))],
        )
    }

    pub fn load_model_from_dl(
        &mut self,
        model: u16,
        dl: SegmentedAddress,
        layer: u16,
    ) -> &mut Self {
        self.emit(
            Opcode::LoadModelFromDl,
            &[
                Field::U16(2, model),
                Field::Ptr(4, u64::from(dl.raw())),
                Field::U16(8, layer),
            ],
        )
    }

    pub fn place_object(
        &mut self,
        placement: ObjectPlacement,
        behavior: SegmentedAddress,
    ) -> &mut Self {
        let mut fields = placement_fields(&placement);
        fields.push(Field::U8(3, placement.model));
        fields.push(Field::Ptr(20, u64::from(behavior.raw())));
        self.emit(Opcode::PlaceObject, &fields)
    }

    pub fn place_object_ext(
        &mut self,
        placement: ObjectPlacement,
        behavior_token: u32,
    ) -> &mut Self {
        let mut fields = placement_fields(&placement);
        fields.push(Field::U8(3, placement.model));
        fields.push(Field::U32(20, behavior_token));
        self.emit(Opcode::PlaceObjectExt, &fields)
    }

    pub fn place_object_ext2(
        &mut self,
        placement: ObjectPlacement,
        model_token: u32,
        behavior_token: u32,
    ) -> &mut Self {
        let mut fields = placement_fields(&placement);
        fields.push(Field::U32(20, model_token));
        fields.push(Field::U32(24, behavior_token));
        self.emit(Opcode::PlaceObjectExt2, &fields)
    }

    pub fn init_player(
        &mut self,
        model: u8,
        behavior_arg: u32,
        behavior: SegmentedAddress,
    ) -> &mut Self {
        self.emit(
            Opcode::InitPlayer,
            &[
                Field::U8(3, model),
                Field::U32(4, behavior_arg),
                Field::Ptr(8, u64::from(behavior.raw())),
            ],
        )
    }

    pub fn create_warp_node(
        &mut self,
        id: u8,
        level: u8,
        area: u8,
        node: u8,
        flags: u8,
    ) -> &mut Self {
        self.emit(Opcode::CreateWarpNode, &warp_fields(id, level, area, node, flags))
    }

    pub fn create_painting_warp_node(
        &mut self,
        id: u8,
        level: u8,
        area: u8,
        node: u8,
        flags: u8,
    ) -> &mut Self {
        self.emit(
            Opcode::CreatePaintingWarpNode,
            &warp_fields(id, level, area, node, flags),
        )
    }

    pub fn create_instant_warp(
        &mut self,
        index: u8,
        area: u8,
        displacement: [i16; 3],
    ) -> &mut Self {
        self.emit(
            Opcode::CreateInstantWarp,
            &[
                Field::U8(2, index),
                Field::U8(3, area),
                Field::I16(4, displacement[0]),
                Field::I16(6, displacement[1]),
                Field::I16(8, displacement[2]),
            ],
        )
    }

    pub fn load_area(&mut self, area: u8) -> &mut Self {
        self.emit(Opcode::LoadArea, &[Field::U8(2, area)])
    }

    pub fn unload_area(&mut self) -> &mut Self {
        self.emit(Opcode::UnloadArea, &[])
    }

    pub fn set_player_start_pos(&mut self, area: u8, yaw: i16, position: [i16; 3]) -> &mut Self {
        self.emit(
            Opcode::SetPlayerStartPos,
            &[
                Field::U8(2, area),
                Field::I16(4, yaw),
                Field::I16(6, position[0]),
                Field::I16(8, position[1]),
                Field::I16(10, position[2]),
            ],
        )
    }

    pub fn set_terrain_data(&mut self, data: SegmentedAddress) -> &mut Self {
        self.emit(Opcode::SetTerrainData, &[Field::Ptr(4, u64::from(data.raw()))])
    }

    pub fn show_dialog(&mut self, index: u8, dialog: u8) -> &mut Self {
        self.emit(Opcode::ShowDialog, &[Field::U8(2, index), Field::U8(3, dialog)])
    }

    pub fn set_terrain_type(&mut self, terrain: i16) -> &mut Self {
        self.emit(Opcode::SetTerrainType, &[Field::I16(2, terrain)])
    }

    pub fn nop(&mut self) -> &mut Self {
        self.emit(Opcode::Nop, &[])
    }

    pub fn transition(&mut self, kind: u8, time: u8, color: [u8; 3]) -> &mut Self {
        self.emit(
            Opcode::Transition,
            &[
                Field::U8(2, kind),
                Field::U8(3, time),
                Field::U8(4, color[0]),
                Field::U8(5, color[1]),
                Field::U8(6, color[2]),
            ],
        )
    }

    pub fn set_music(&mut self, settings: i16, sequence: i16) -> &mut Self {
        self.emit(
            Opcode::SetMusic,
            &[Field::I16(2, settings), Field::I16(4, sequence)],
        )
    }

    pub fn create_whirlpool(
        &mut self,
        index: u8,
        condition: u8,
        position: [i16; 3],
        strength: i16,
    ) -> &mut Self {
        self.emit(
            Opcode::CreateWhirlpool,
            &[
                Field::U8(2, index),
                Field::U8(3, condition),
                Field::I16(4, position[0]),
                Field::I16(6, position[1]),
                Field::I16(8, position[2]),
                Field::I16(10, strength),
            ],
        )
    }

    pub fn get_or_set(&mut self, mode: u8, variable: u8) -> &mut Self {
        self.emit(Opcode::GetOrSet, &[Field::U8(2, mode), Field::U8(3, variable)])
    }

    pub fn load_model_from_geo_ext(&mut self, model: u16, geo_token: u32) -> &mut Self {
        self.emit(
            Opcode::LoadModelFromGeoExt,
            &[Field::U16(2, model), Field::U32(4, geo_token)],
        )
    }

    pub fn call_ext(&mut self, arg: i16, function_token: u32) -> &mut Self {
        self.emit(
            Opcode::CallExt,
            &[Field::I16(2, arg), Field::U32(4, function_token)],
        )
    }

    pub fn call_loop_ext(&mut self, arg: i16, function_token: u32) -> &mut Self {
        self.emit(
            Opcode::CallLoopExt,
            &[Field::I16(2, arg), Field::U32(4, function_token)],
        )
    }
}

fn encode(order: ByteOrder, little: &[u8]) -> Vec<u8> {
    match order {
        ByteOrder::Little => little.to_vec(),
        ByteOrder::Big => little.iter().rev().copied().collect(),
    }
}

fn segment_load_fields(
    segment: u8,
    rom_start: u32,
    rom_end: u32,
    entry: Option<Target>,
) -> Vec<Field> {
    let mut fields = vec![
        Field::I16(2, i16::from(segment)),
        Field::Ptr(4, u64::from(rom_start)),
        Field::Ptr(8, u64::from(rom_end)),
    ];
    if let Some(entry) = entry {
        fields.push(Field::Target(12, entry));
    }
    fields
}

fn placement_fields(placement: &ObjectPlacement) -> Vec<Field> {
    vec![
        Field::U8(2, placement.acts),
        Field::I16(4, placement.position[0]),
        Field::I16(6, placement.position[1]),
        Field::I16(8, placement.position[2]),
        Field::I16(10, placement.angle[0]),
        Field::I16(12, placement.angle[1]),
        Field::I16(14, placement.angle[2]),
        Field::U32(16, placement.behavior_arg),
    ]
}

fn warp_fields(id: u8, level: u8, area: u8, node: u8, flags: u8) -> [Field; 5] {
    [
        Field::U8(2, id),
        Field::U8(3, level),
        Field::U8(4, area),
        Field::U8(5, node),
        Field::U8(6, flags),
    ]
}
