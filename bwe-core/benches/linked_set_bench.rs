use bwe_core::linked_set::LinkedSet;
use bwe_core::packet::MediaPacket;
use bwe_core::receiver::{BweReceiver, ReceiverConfig};
use bwe_core::sequence::SequenceUnwrapper;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn bench_linked_set_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("linked_set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("insert_in_order", |b| {
        let mut set = LinkedSet::new(1000).unwrap();
        let mut seq = 0u16;
        let mut now = 0i64;
        b.iter(|| {
            let evicted = set.insert(black_box(seq), now, now, 1200);
            black_box(evicted);
            seq = seq.wrapping_add(1);
            now += 1;
        });
    });

    group.bench_function("reinsert_duplicate", |b| {
        let mut set = LinkedSet::new(1000).unwrap();
        for seq in 0..1000u16 {
            set.insert(seq, 0, 0, 1200);
        }
        let mut seq = 0u16;
        b.iter(|| {
            set.insert(black_box(seq), 0, 1, 1200);
            seq = (seq + 1) % 1000;
        });
    });

    group.bench_function("range", |b| {
        let mut set = LinkedSet::new(1000).unwrap();
        for seq in 0..1000u16 {
            set.insert(seq.wrapping_mul(3), 0, 0, 1200);
        }
        b.iter(|| black_box(&set).range());
    });

    group.finish();
}

fn bench_unwrapper(c: &mut Criterion) {
    c.bench_function("sequence_unwrap", |b| {
        let mut unwrapper = SequenceUnwrapper::new();
        let mut seq = 0u16;
        b.iter(|| {
            let unwrapped = unwrapper.unwrap(black_box(seq));
            black_box(unwrapped);
            seq = seq.wrapping_add(7);
        });
    });
}

fn bench_receiver(c: &mut Criterion) {
    c.bench_function("receiver_receive_packet", |b| {
        let mut receiver = BweReceiver::new(0, ReceiverConfig::default()).unwrap();
        let mut seq = 0u16;
        let mut now = 0i64;
        b.iter(|| {
            let packet = MediaPacket::new(0, seq, now, 1200);
            receiver.receive_packet(now, black_box(&packet));
            seq = seq.wrapping_add(1);
            now += 5;
        });
        black_box(receiver.global_receiver_packet_loss_ratio());
    });
}

criterion_group!(
    benches,
    bench_linked_set_insert,
    bench_unwrapper,
    bench_receiver
);
criterion_main!(benches);
