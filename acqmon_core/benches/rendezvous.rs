use acqmon_core::mocks::ConstSource;
use acqmon_core::{AtomicCounter, ManualTicker, MonitorSession, Rendezvous};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;

pub fn bench_counter(c: &mut Criterion) {
    let mut g = c.benchmark_group("atomic_counter");
    let counter = AtomicCounter::new(0);
    g.bench_function("increment", |b| b.iter(|| black_box(counter.increment())));
    g.bench_function("write_read", |b| {
        b.iter(|| {
            counter.write(black_box(41));
            black_box(counter.read())
        })
    });
    g.finish();
}

pub fn bench_rendezvous(c: &mut Criterion) {
    let mut g = c.benchmark_group("rendezvous");
    // Allow quick tweaking without CLI flags (Criterion 0.5):
    //   BENCH_SAMPLE_SIZE=10 cargo bench -p acqmon_core --bench rendezvous
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE")
        && let Ok(n) = ss.parse::<usize>()
    {
        g.sample_size(n.max(10));
    }

    // Ping-pong through two mailboxes, the shape of a command + acknowledgement.
    let req = Arc::new(Rendezvous::<u32>::mailbox());
    let ack = Arc::new(Rendezvous::<u32>::mailbox());
    let (wreq, wack) = (req.clone(), ack.clone());
    let worker = std::thread::spawn(move || {
        loop {
            let v = wreq.receive_blocking();
            if v == u32::MAX {
                break;
            }
            wack.send(v);
        }
    });
    g.bench_function("round_trip", |b| {
        b.iter(|| {
            req.send(black_box(7));
            black_box(ack.receive_blocking())
        })
    });
    req.send(u32::MAX);
    let _ = worker.join();

    // Full control command through a live monitor session.
    let ticker = ManualTicker::new();
    let session = MonitorSession::builder()
        .with_device(ConstSource(1.0))
        .with_capacity(16)
        .with_trigger(ticker.factory())
        .build();
    if let Ok(s) = session {
        g.bench_function("session_stop", |b| b.iter(|| black_box(s.stop())));
    }
    g.finish();
}

criterion_group!(benches, bench_counter, bench_rendezvous);
criterion_main!(benches);
