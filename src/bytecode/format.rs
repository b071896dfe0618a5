//! Definition of the level command format: opcodes, command sizes, addresses and the
//! comparison operators used by the conditional family.

use std::convert::TryFrom;
use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of entries in the segment table.
pub const MAX_SEGMENTS: usize = 32;

/// Number of opcodes understood by the interpreter. Values at or beyond this pause the script.
pub const OPCODE_COUNT: usize = 0x3F;

/// Opcodes whose scalar payloads are read with the configured extension byte order.
pub const EXTENSION_OPCODES: RangeInclusive<u8> =
    (Opcode::PlaceObjectExt as u8)..=(Opcode::CallLoopExt as u8);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),
    #[error("unknown comparison operator {0}")]
    UnknownComparison(u8),
    #[error("segment {0} is outside the segment table")]
    SegmentOutOfRange(u8),
}

/// Opcodes understood by the level script interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Execute = 0x00,
    ExitAndExecute = 0x01,
    Exit = 0x02,
    Sleep = 0x03,
    SleepBeforeExit = 0x04,
    Jump = 0x05,
    JumpLink = 0x06,
    Return = 0x07,
    LoopBeginCount = 0x08,
    LoopRepeat = 0x09,
    LoopBegin = 0x0A,
    LoopUntil = 0x0B,
    JumpIf = 0x0C,
    JumpLinkIf = 0x0D,
    SkipIf = 0x0E,
    Skip = 0x0F,
    SkipNop = 0x10,
    Call = 0x11,
    CallLoop = 0x12,
    SetRegister = 0x13,
    PushPool = 0x14,
    PopPool = 0x15,
    LoadFixed = 0x16,
    LoadRaw = 0x17,
    LoadCompressed = 0x18,
    InitLevel = 0x19,
    ClearLevel = 0x1A,
    AllocLevelPool = 0x1B,
    FreeLevelPool = 0x1C,
    BeginArea = 0x1D,
    EndArea = 0x1E,
    LoadModelFromDl = 0x1F,
    LoadModelFromGeo = 0x20,
    LoadModelScaled = 0x21,
    PlaceObject = 0x22,
    InitPlayer = 0x23,
    CreateWarpNode = 0x24,
    CreatePaintingWarpNode = 0x25,
    CreateInstantWarp = 0x26,
    LoadArea = 0x27,
    UnloadArea = 0x28,
    SetPlayerStartPos = 0x29,
    UnloadPlayerArea = 0x2A,
    UpdateObjects = 0x2B,
    SetTerrainData = 0x2C,
    SetRooms = 0x2D,
    ShowDialog = 0x2E,
    SetTerrainType = 0x2F,
    Nop = 0x30,
    Transition = 0x31,
    Blackout = 0x32,
    Gamma = 0x33,
    SetMusic = 0x34,
    SetMenuMusic = 0x35,
    StopMusic = 0x36,
    SetMacroObjects = 0x37,
    CreateWhirlpool = 0x38,
    GetOrSet = 0x39,
    PlaceObjectExt = 0x3A,
    PlaceObjectExt2 = 0x3B,
    LoadModelFromGeoExt = 0x3C,
    CallExt = 0x3D,
    CallLoopExt = 0x3E,
}

impl Opcode {
    /// Every opcode, indexed by its numeric value.
    pub const ALL: [Opcode; OPCODE_COUNT] = {
        use Opcode::*;
        [
            Execute,
            ExitAndExecute,
            Exit,
            Sleep,
            SleepBeforeExit,
            Jump,
            JumpLink,
            Return,
            LoopBeginCount,
            LoopRepeat,
            LoopBegin,
            LoopUntil,
            JumpIf,
            JumpLinkIf,
            SkipIf,
            Skip,
            SkipNop,
            Call,
            CallLoop,
            SetRegister,
            PushPool,
            PopPool,
            LoadFixed,
            LoadRaw,
            LoadCompressed,
            InitLevel,
            ClearLevel,
            AllocLevelPool,
            FreeLevelPool,
            BeginArea,
            EndArea,
            LoadModelFromDl,
            LoadModelFromGeo,
            LoadModelScaled,
            PlaceObject,
            InitPlayer,
            CreateWarpNode,
            CreatePaintingWarpNode,
            CreateInstantWarp,
            LoadArea,
            UnloadArea,
            SetPlayerStartPos,
            UnloadPlayerArea,
            UpdateObjects,
            SetTerrainData,
            SetRooms,
            ShowDialog,
            SetTerrainType,
            Nop,
            Transition,
            Blackout,
            Gamma,
            SetMusic,
            SetMenuMusic,
            StopMusic,
            SetMacroObjects,
            CreateWhirlpool,
            GetOrSet,
            PlaceObjectExt,
            PlaceObjectExt2,
            LoadModelFromGeoExt,
            CallExt,
            CallLoopExt,
        ]
    };

    /// Mnemonic used by the disassembler and in diagnostics.
    pub const fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Execute => "EXECUTE",
            ExitAndExecute => "EXIT_AND_EXECUTE",
            Exit => "EXIT",
            Sleep => "SLEEP",
            SleepBeforeExit => "SLEEP_BEFORE_EXIT",
            Jump => "JUMP",
            JumpLink => "JUMP_LINK",
            Return => "RETURN",
            LoopBeginCount => "LOOP_BEGIN_COUNT",
            LoopRepeat => "LOOP_REPEAT",
            LoopBegin => "LOOP_BEGIN",
            LoopUntil => "LOOP_UNTIL",
            JumpIf => "JUMP_IF",
            JumpLinkIf => "JUMP_LINK_IF",
            SkipIf => "SKIP_IF",
            Skip => "SKIP",
            SkipNop => "SKIP_NOP",
            Call => "CALL",
            CallLoop => "CALL_LOOP",
            SetRegister => "SET_REG",
            PushPool => "PUSH_POOL",
            PopPool => "POP_POOL",
            LoadFixed => "LOAD_FIXED",
            LoadRaw => "LOAD_RAW",
            LoadCompressed => "LOAD_MIO0",
            InitLevel => "INIT_LEVEL",
            ClearLevel => "CLEAR_LEVEL",
            AllocLevelPool => "ALLOC_LEVEL_POOL",
            FreeLevelPool => "FREE_LEVEL_POOL",
            BeginArea => "AREA",
            EndArea => "END_AREA",
            LoadModelFromDl => "LOAD_MODEL_FROM_DL",
            LoadModelFromGeo => "LOAD_MODEL_FROM_GEO",
            LoadModelScaled => "LOAD_MODEL_SCALED",
            PlaceObject => "OBJECT_WITH_ACTS",
            InitPlayer => "INIT_PLAYER",
            CreateWarpNode => "WARP_NODE",
            CreatePaintingWarpNode => "PAINTING_WARP_NODE",
            CreateInstantWarp => "INSTANT_WARP",
            LoadArea => "LOAD_AREA",
            UnloadArea => "UNLOAD_AREA",
            SetPlayerStartPos => "PLAYER_POS",
            UnloadPlayerArea => "UNLOAD_PLAYER_AREA",
            UpdateObjects => "UPDATE_OBJECTS",
            SetTerrainData => "TERRAIN",
            SetRooms => "ROOMS",
            ShowDialog => "SHOW_DIALOG",
            SetTerrainType => "TERRAIN_TYPE",
            Nop => "NOP",
            Transition => "TRANSITION",
            Blackout => "BLACKOUT",
            Gamma => "GAMMA",
            SetMusic => "SET_BACKGROUND_MUSIC",
            SetMenuMusic => "SET_MENU_MUSIC",
            StopMusic => "STOP_MUSIC",
            SetMacroObjects => "MACRO_OBJECTS",
            CreateWhirlpool => "WHIRLPOOL",
            GetOrSet => "GET_OR_SET",
            PlaceObjectExt => "OBJECT_WITH_ACTS_EXT",
            PlaceObjectExt2 => "OBJECT_WITH_ACTS_EXT2",
            LoadModelFromGeoExt => "LOAD_MODEL_FROM_GEO_EXT",
            CallExt => "CALL_EXT",
            CallLoopExt => "CALL_LOOP_EXT",
        }
    }

    /// Size of the command in narrow-layout bytes. This is the value stored in the size field.
    pub const fn canonical_size(self) -> u8 {
        use Opcode::*;
        match self {
            Execute | ExitAndExecute | LoadFixed => 16,
            Jump | JumpLink | LoopUntil | SkipIf | Call | CallLoop | BeginArea
            | LoadModelFromGeo | CreateWarpNode | CreatePaintingWarpNode | SetTerrainData
            | SetRooms | Transition | SetMusic | SetMacroObjects | LoadModelFromGeoExt
            | CallExt | CallLoopExt => 8,
            JumpIf | JumpLinkIf | LoadRaw | LoadCompressed | LoadModelFromDl
            | LoadModelScaled | InitPlayer | CreateInstantWarp | SetPlayerStartPos
            | CreateWhirlpool => 12,
            PlaceObject | PlaceObjectExt => 24,
            PlaceObjectExt2 => 28,
            _ => 4,
        }
    }

    pub fn is_extension(self) -> bool {
        EXTENSION_OPCODES.contains(&(self as u8))
    }
}

impl TryFrom<u8> for Opcode {
    type Error = FormatError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .get(value as usize)
            .copied()
            .ok_or(FormatError::UnknownOpcode(value))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operators of the conditional family, evaluated as `register OP literal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ComparisonOp {
    And = 0,
    Nand = 1,
    Equal = 2,
    NotEqual = 3,
    Less = 4,
    LessEqual = 5,
    Greater = 6,
    GreaterEqual = 7,
}

impl ComparisonOp {
    pub const ALL: [ComparisonOp; 8] = [
        ComparisonOp::And,
        ComparisonOp::Nand,
        ComparisonOp::Equal,
        ComparisonOp::NotEqual,
        ComparisonOp::Less,
        ComparisonOp::LessEqual,
        ComparisonOp::Greater,
        ComparisonOp::GreaterEqual,
    ];

    pub fn evaluate(self, register: i32, literal: i32) -> bool {
        match self {
            ComparisonOp::And => register & literal != 0,
            ComparisonOp::Nand => register & literal == 0,
            ComparisonOp::Equal => register == literal,
            ComparisonOp::NotEqual => register != literal,
            ComparisonOp::Less => register < literal,
            ComparisonOp::LessEqual => register <= literal,
            ComparisonOp::Greater => register > literal,
            ComparisonOp::GreaterEqual => register >= literal,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::And => "&",
            ComparisonOp::Nand => "!&",
            ComparisonOp::Equal => "==",
            ComparisonOp::NotEqual => "!=",
            ComparisonOp::Less => "<",
            ComparisonOp::LessEqual => "<=",
            ComparisonOp::Greater => ">",
            ComparisonOp::GreaterEqual => ">=",
        }
    }
}

impl TryFrom<u8> for ComparisonOp {
    type Error = FormatError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ComparisonOp::ALL
            .get(value as usize)
            .copied()
            .ok_or(FormatError::UnknownComparison(value))
    }
}

/// A 32-bit segmented address: segment number in the top byte, offset in the low 24 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentedAddress(u32);

impl SegmentedAddress {
    pub const NULL: SegmentedAddress = SegmentedAddress(0);

    pub fn new(segment: u8, offset: u32) -> Result<Self, FormatError> {
        if segment as usize >= MAX_SEGMENTS {
            return Err(FormatError::SegmentOutOfRange(segment));
        }
        Ok(Self(((segment as u32) << 24) | (offset & 0x00FF_FFFF)))
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn segment(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub const fn offset(self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SegmentedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Identifier of a command buffer owned by the memory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BufferId(pub u32);

/// Location of a command: a buffer and a byte offset inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptPtr {
    pub buffer: BufferId,
    pub offset: u32,
}

impl ScriptPtr {
    pub const fn new(buffer: BufferId, offset: u32) -> Self {
        Self { buffer, offset }
    }

    pub const fn start_of(buffer: BufferId) -> Self {
        Self { buffer, offset: 0 }
    }

    pub fn advanced_by(self, bytes: u32) -> Self {
        Self {
            buffer: self.buffer,
            offset: self.offset + bytes,
        }
    }
}

impl fmt::Display for ScriptPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf{}+0x{:04X}", self.buffer.0, self.offset)
    }
}

/// Width of pointer-sized operand fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerWidth {
    /// 4-byte pointers, flat offsets, size field in bytes.
    #[default]
    Narrow,
    /// 8-byte pointers; offsets past the first word and the size field are scaled.
    Wide,
}

impl PointerWidth {
    pub const fn bytes(self) -> usize {
        match self {
            PointerWidth::Narrow => 4,
            PointerWidth::Wide => 8,
        }
    }

    const fn shift(self) -> u32 {
        match self {
            PointerWidth::Narrow => 0,
            PointerWidth::Wide => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Physical layout rules shared by the reader and the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandLayout {
    pub pointer_width: PointerWidth,
    pub extension_byte_order: ByteOrder,
}

impl CommandLayout {
    pub const fn new(pointer_width: PointerWidth, extension_byte_order: ByteOrder) -> Self {
        Self {
            pointer_width,
            extension_byte_order,
        }
    }

    /// Maps a narrow operand offset to its physical offset.
    pub const fn transform(&self, offset: usize) -> usize {
        (offset & 3) | ((offset & !3) << self.pointer_width.shift())
    }

    /// Physical length in bytes of a command whose size field holds `size`.
    pub const fn command_bytes(&self, size: u8) -> usize {
        (size as usize) << self.pointer_width.shift()
    }

    /// Byte order used for the scalar operands of `opcode`.
    pub fn order_for(&self, opcode: u8) -> ByteOrder {
        if EXTENSION_OPCODES.contains(&opcode) {
            self.extension_byte_order
        } else {
            ByteOrder::Little
        }
    }
}
