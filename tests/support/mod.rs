#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use levelscript::bytecode::{CommandLayout, ScriptBuilder, ScriptPtr, SegmentedAddress};
use levelscript::memory::ContentMemory;
use levelscript::services::{GeometryLayout, SceneWorld, TokenTable};
use levelscript::{Diagnostic, LevelVm, VmConfig, VmParts};

/// Segment test scripts are mapped at so label targets resolve.
pub const SCRIPT_SEGMENT: u8 = 0x10;

/// Geometry layout the default test world knows about, with a camera.
pub const AREA_GEO: SegmentedAddress = SegmentedAddress::from_raw(0x0E00_0100);

pub fn builder(config: &VmConfig) -> ScriptBuilder {
    ScriptBuilder::new(config.layout, SCRIPT_SEGMENT)
}

pub fn narrow() -> ScriptBuilder {
    ScriptBuilder::new(CommandLayout::default(), SCRIPT_SEGMENT)
}

pub fn world() -> SceneWorld {
    let mut world = SceneWorld::new();
    world.define_geometry(AREA_GEO, GeometryLayout { has_camera: true });
    world
}

pub fn vm_with(config: VmConfig, image: Vec<u8>, tokens: TokenTable) -> LevelVm {
    let memory = ContentMemory::new(image, config.main_pool_bytes);
    let parts = VmParts::new(memory).with_world(world()).with_tokens(tokens);
    LevelVm::new(config, parts)
}

pub fn vm() -> LevelVm {
    vm_with(VmConfig::default(), Vec::new(), TokenTable::new())
}

/// Installs `bytes` and maps the script segment onto them.
pub fn load(vm: &mut LevelVm, bytes: Vec<u8>) -> ScriptPtr {
    let ptr = vm.install_script(bytes);
    vm.memory_mut()
        .map_segment(SCRIPT_SEGMENT, ptr.buffer)
        .expect("script segment is valid");
    ptr
}

pub fn record(vm: &LevelVm) -> Arc<Mutex<Vec<Diagnostic>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    vm.diagnostics()
        .set_sink(move |diagnostic| sink.lock().push(diagnostic.clone()));
    seen
}

/// Registers host function `id` that counts its invocations and returns the register plus
/// one.
pub fn counting_host(vm: &mut LevelVm, id: u32) -> Arc<Mutex<u32>> {
    let calls = Arc::new(Mutex::new(0u32));
    let counter = calls.clone();
    vm.host_functions_mut().register(id, move |_, _, register| {
        *counter.lock() += 1;
        register + 1
    });
    calls
}

/// Encodes `data` as an MIO0 block made only of literals.
pub fn mio0_literals(data: &[u8]) -> Vec<u8> {
    let words = data.len().div_ceil(32);
    let literal_at = (0x10 + words * 4) as u32;
    let mut out = b"MIO0".to_vec();
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&literal_at.to_be_bytes());
    out.extend_from_slice(&literal_at.to_be_bytes());
    for word in 0..words {
        let bits = (data.len() - word * 32).min(32);
        let mask = if bits == 32 { u32::MAX } else { !(u32::MAX >> bits) };
        out.extend_from_slice(&mask.to_be_bytes());
    }
    out.extend_from_slice(data);
    out
}

/// Content image with `blocks` placed back to back, returning each block's ROM range.
pub fn image(blocks: &[&[u8]]) -> (Vec<u8>, Vec<(u32, u32)>) {
    let mut image = vec![0u8; 0x40];
    let mut ranges = Vec::new();
    for block in blocks {
        let start = image.len() as u32;
        image.extend_from_slice(block);
        ranges.push((start, image.len() as u32));
    }
    (image, ranges)
}
