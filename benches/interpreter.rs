use criterion::{criterion_group, criterion_main, Criterion};
use levelscript::bytecode::{CommandLayout, ObjectPlacement, ScriptBuilder, SegmentedAddress};
use levelscript::level::ALL_ACTS;
use levelscript::memory::ContentMemory;
use levelscript::services::{GeometryLayout, SceneWorld};
use levelscript::{LevelVm, VmConfig, VmParts};

const AREA_GEO: SegmentedAddress = SegmentedAddress::from_raw(0x0E00_0100);
const BEHAVIOR: SegmentedAddress = SegmentedAddress::from_raw(0x1300_0400);

fn interpreter() -> LevelVm {
    let mut world = SceneWorld::new();
    world.define_geometry(AREA_GEO, GeometryLayout { has_camera: true });
    let config = VmConfig::default();
    let memory = ContentMemory::new(Vec::new(), config.main_pool_bytes);
    LevelVm::new(config, VmParts::new(memory).with_world(world))
}

fn bench_counted_loop(c: &mut Criterion) {
    let mut builder = ScriptBuilder::new(CommandLayout::default(), 0x10);
    builder
        .loop_begin_count(1000)
        .set_register(1)
        .nop()
        .loop_repeat()
        .exit();
    let mut vm = interpreter();
    let start = vm.install_script(builder.finish().expect("assemble"));
    c.bench_function("counted_loop_1000", |b| {
        b.iter(|| vm.execute(start).unwrap())
    });
}

fn bench_level_setup(c: &mut Criterion) {
    let placement = ObjectPlacement {
        acts: ALL_ACTS,
        model: 0x54,
        position: [0, 100, 0],
        ..ObjectPlacement::default()
    };
    let mut builder = ScriptBuilder::new(CommandLayout::default(), 0x10);
    builder.init_level().alloc_level_pool().begin_area(0, AREA_GEO);
    for _ in 0..16 {
        builder.place_object(placement, BEHAVIOR);
    }
    builder
        .create_warp_node(0x0A, 7, 1, 2, 0)
        .end_area()
        .load_area(0)
        .unload_area()
        .clear_level()
        .exit();
    let mut vm = interpreter();
    let start = vm.install_script(builder.finish().expect("assemble"));
    c.bench_function("level_setup_16_objects", |b| {
        b.iter(|| vm.execute(start).unwrap())
    });
}

criterion_group!(benches, bench_counted_loop, bench_level_setup);
criterion_main!(benches);
