//! Text listing of a command stream.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::VmFault;

use super::format::{BufferId, CommandLayout, ComparisonOp, Opcode, ScriptPtr, OPCODE_COUNT};
use super::reader::{Command, CommandReader};

#[derive(Debug, Clone, Copy)]
enum Kind {
    U8,
    U16,
    I16,
    U32,
    I32,
    Ptr,
    Cmp,
}

use Kind::*;

fn operands(op: Opcode) -> &'static [(&'static str, Kind, usize)] {
    use Opcode::*;
    match op {
        Execute | ExitAndExecute => &[
            ("seg", I16, 2),
            ("start", Ptr, 4),
            ("end", Ptr, 8),
            ("entry", Ptr, 12),
        ],
        Sleep | SleepBeforeExit => &[("frames", I16, 2)],
        Jump | JumpLink => &[("target", Ptr, 4)],
        LoopBeginCount => &[("count", I16, 2)],
        LoopUntil | SkipIf => &[("op", Cmp, 2), ("arg", I32, 4)],
        JumpIf | JumpLinkIf => &[("op", Cmp, 2), ("arg", I32, 4), ("target", Ptr, 8)],
        Call | CallLoop => &[("arg", I16, 2), ("func", Ptr, 4)],
        SetRegister => &[("value", I16, 2)],
        LoadFixed => &[("dest", Ptr, 4), ("start", Ptr, 8), ("end", Ptr, 12)],
        LoadRaw | LoadCompressed => &[("seg", I16, 2), ("start", Ptr, 4), ("end", Ptr, 8)],
        BeginArea => &[("area", U8, 2), ("geo", Ptr, 4)],
        LoadModelFromDl => &[("model", U16, 2), ("dl", Ptr, 4), ("layer", U16, 8)],
        LoadModelFromGeo => &[("model", U16, 2), ("geo", Ptr, 4)],
        LoadModelScaled => &[("model", U16, 2), ("dl", Ptr, 4), ("scale", U32, 8)],
        PlaceObject => &[
            ("acts", U8, 2),
            ("model", U8, 3),
            ("x", I16, 4),
            ("y", I16, 6),
            ("z", I16, 8),
            ("rx", I16, 10),
            ("ry", I16, 12),
            ("rz", I16, 14),
            ("arg", U32, 16),
            ("beh", Ptr, 20),
        ],
        PlaceObjectExt => &[
            ("acts", U8, 2),
            ("model", U8, 3),
            ("x", I16, 4),
            ("y", I16, 6),
            ("z", I16, 8),
            ("arg", U32, 16),
            ("beh_token", U32, 20),
        ],
        PlaceObjectExt2 => &[
            ("acts", U8, 2),
            ("x", I16, 4),
            ("y", I16, 6),
            ("z", I16, 8),
            ("arg", U32, 16),
            ("model_token", U32, 20),
            ("beh_token", U32, 24),
        ],
        InitPlayer => &[("model", U8, 3), ("arg", U32, 4), ("beh", Ptr, 8)],
        CreateWarpNode | CreatePaintingWarpNode => &[
            ("id", U8, 2),
            ("level", U8, 3),
            ("area", U8, 4),
            ("node", U8, 5),
            ("flags", U8, 6),
        ],
        CreateInstantWarp => &[
            ("index", U8, 2),
            ("area", U8, 3),
            ("dx", I16, 4),
            ("dy", I16, 6),
            ("dz", I16, 8),
        ],
        LoadArea => &[("area", U8, 2)],
        SetPlayerStartPos => &[
            ("area", U8, 2),
            ("yaw", I16, 4),
            ("x", I16, 6),
            ("y", I16, 8),
            ("z", I16, 10),
        ],
        SetTerrainData | SetRooms | SetMacroObjects => &[("data", Ptr, 4)],
        ShowDialog => &[("index", U8, 2), ("dialog", U8, 3)],
        SetTerrainType => &[("type", I16, 2)],
        Transition => &[("kind", U8, 2), ("time", U8, 3), ("r", U8, 4), ("g", U8, 5), ("b", U8, 6)],
        Blackout => &[("active", U8, 2)],
        Gamma => &[("enabled", U8, 2)],
        SetMusic => &[("settings", I16, 2), ("seq", I16, 4)],
        SetMenuMusic => &[("seq", I16, 2)],
        StopMusic => &[("fade", I16, 2)],
        CreateWhirlpool => &[
            ("index", U8, 2),
            ("condition", U8, 3),
            ("x", I16, 4),
            ("y", I16, 6),
            ("z", I16, 8),
            ("strength", I16, 10),
        ],
        GetOrSet => &[("mode", U8, 2), ("var", U8, 3)],
        LoadModelFromGeoExt => &[("model", U16, 2), ("geo_token", U32, 4)],
        CallExt | CallLoopExt => &[("arg", I16, 2), ("func_token", U32, 4)],
        _ => &[],
    }
}

fn render_operand(command: &Command, kind: Kind, offset: usize) -> Result<String, VmFault> {
    Ok(match kind {
        U8 => command.u8(offset)?.to_string(),
        U16 => command.u16(offset)?.to_string(),
        I16 => command.i16(offset)?.to_string(),
        U32 => format!("0x{:X}", command.u32(offset)?),
        I32 => command.i32(offset)?.to_string(),
        Ptr => format!("0x{:08X}", command.ptr_value(offset)?),
        Cmp => {
            let raw = command.u8(offset)?;
            ComparisonOp::try_from(raw)
                .map(|op| op.symbol().to_string())
                .unwrap_or_else(|_| format!("?{raw}"))
        }
    })
}

/// Formats one command as `MNEMONIC name=value ...`.
pub fn format_command(command: &Command) -> String {
    let Some(op) = command.op() else {
        return format!("UNKNOWN_0x{:02X}", command.opcode());
    };
    let mut line = op.name().to_string();
    for (name, kind, offset) in operands(op) {
        let value =
            render_operand(command, *kind, *offset).unwrap_or_else(|err| format!("<{err}>"));
        let _ = write!(line, " {name}={value}");
    }
    line
}

/// Renders the stream starting at offset zero until the first opcode outside the table,
/// the end of the buffer, or a malformed command.
pub fn disassemble(bytes: &[u8], layout: CommandLayout) -> String {
    let reader = CommandReader::new(layout);
    let shared: Arc<[u8]> = Arc::from(bytes);
    let mut out = String::new();
    let mut ptr = ScriptPtr::start_of(BufferId(0));
    while (ptr.offset as usize) < shared.len() {
        let opcode = shared[ptr.offset as usize];
        if opcode as usize >= OPCODE_COUNT {
            let _ = writeln!(
                out,
                "{:06X}: UNKNOWN_0x{opcode:02X} ; end of recognized stream",
                ptr.offset
            );
            break;
        }
        match reader.decode(shared.clone(), ptr) {
            Ok(command) => {
                let _ = writeln!(out, "{:06X}: {}", ptr.offset, format_command(&command));
                ptr = command.next();
            }
            Err(err) => {
                let _ = writeln!(out, "{:06X}: ; {err}", ptr.offset);
                break;
            }
        }
    }
    out
}
