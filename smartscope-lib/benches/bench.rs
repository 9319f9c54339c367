use criterion::{black_box, criterion_group, criterion_main, Criterion};

use smartscope_lib::{
  AnalogChannel,
  CalibrationTable,
  Controller,
  Operation,
};
use smartscope_lib::calibration::ChannelSettings;
use smartscope_lib::protocol::{
  chunk,
  encode,
};

fn bench_encode(c: &mut Criterion) {
  c.bench_function("encode fpga bus write", |b| {
    b.iter(|| encode(black_box(Controller::FpgaBus), Operation::Write, black_box(0x0C08), 1))
  });
}

fn bench_chunk(c: &mut Criterion) {
  let payload : Vec<u8> = (0..=252).collect();
  let waveform : Vec<u8> = (0..2048).map(|k| (k % 256) as u8).collect();
  c.bench_function("chunk waveform 2048 bytes", |b| {
    b.iter(|| chunk(Controller::WaveformGenerator, Operation::Write, 0, black_box(&waveform)))
  });
  c.bench_function("chunk settings memory 253 bytes", |b| {
    b.iter(|| chunk(Controller::SettingsMemory, Operation::Write, 0, black_box(&payload)))
  });
}

fn bench_select_range(c: &mut Criterion) {
  let table = CalibrationTable::new();
  let mut ch = ChannelSettings::new(AnalogChannel::A, &table);
  c.bench_function("select range", |b| {
    b.iter(|| ch.select_range(&table, black_box(-2.0), black_box(2.0)))
  });
}

criterion_group!(benches, bench_encode, bench_chunk, bench_select_range);
criterion_main!(benches);
