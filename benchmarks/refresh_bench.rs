use criterion::{black_box, criterion_group, criterion_main, Criterion};
use riotscope_core::rtos::riot::RIOT_SYMBOLS;
use riotscope_core::symbols::resolve_requirements;
use riotscope_core::{ArchitectureVariant, MemoryImage, Riot};
use std::collections::HashMap;

const TABLE: u32 = 0x2000_0000;
const MAX_THREADS: u8 = 32;

fn target_image() -> MemoryImage {
    let mut mem = MemoryImage::new();
    mem.write_u32(0x2000_1000, u32::from(MAX_THREADS / 2));
    mem.write_u16(0x2000_1004, 2);
    mem.write_u8(0x2000_1008, MAX_THREADS);
    mem.write_u8(0x2000_100C, 0x30);
    for slot in (0..u32::from(MAX_THREADS)).step_by(2) {
        let tcb = 0x2000_4000 + slot * 0x100;
        mem.write_u32(TABLE + slot * 4, tcb);
        mem.write_u32(tcb, 0x2000_8000 + slot * 0x200);
        mem.write_u16(tcb + 0x04, 1);
        mem.write_u32(tcb + 0x30, tcb + 0x80);
        mem.write_bytes(tcb + 0x80, b"worker\0");
    }
    mem
}

fn engine() -> Riot {
    let symbols: HashMap<String, u64> = [
        ("sched_threads", TABLE),
        ("sched_num_threads", 0x2000_1000),
        ("sched_active_pid", 0x2000_1004),
        ("max_threads", 0x2000_1008),
        ("_tcb_name_offset", 0x2000_100C),
    ]
    .into_iter()
    .map(|(name, addr)| (name.to_string(), u64::from(addr)))
    .collect();

    let mut riot = Riot::new();
    riot.attach(ArchitectureVariant::CortexM3).unwrap();
    riot.load_symbols(&resolve_requirements(&RIOT_SYMBOLS, &symbols)).unwrap();
    riot
}

fn bench_refresh(c: &mut Criterion) {
    let mut mem = target_image();
    let mut riot = engine();
    c.bench_function("riot_refresh_32_slots", |b| {
        b.iter(|| {
            let _ = black_box(riot.refresh(&mut mem).map(|s| s.threads.len()));
        })
    });
}

fn bench_thread_registers(c: &mut Criterion) {
    let mut mem = target_image();
    let riot = engine();
    c.bench_function("riot_thread_registers", |b| {
        b.iter(|| {
            let _ = black_box(riot.get_registers(&mut mem, black_box(2)));
        })
    });
}

criterion_group!(benches, bench_refresh, bench_thread_registers);
criterion_main!(benches);
