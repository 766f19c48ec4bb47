/// Bridge hot paths
///
/// 1. engine write -> application send -> in-order ack
/// 2. application receive -> engine read path
/// 3. full open/close cycle

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use bytes::Bytes;
use msgendpoint::{
    CloseCode, EngineSocket, Message, MessageBridge, MessageEndpointConnection,
    MessagingCloseCompletion, MessagingCompletion, MessagingError, ProtocolType,
    ReplicatorConnection, SocketDriver,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Engine that only counts acknowledged bytes
#[derive(Default)]
struct CountingEngine {
    acked: AtomicUsize,
    received: AtomicUsize,
}

impl EngineSocket for CountingEngine {
    fn got_http_response(&self, _status: u16) {}

    fn opened(&self) {}

    fn completed_write(&self, byte_count: usize) {
        self.acked.fetch_add(byte_count, Ordering::Relaxed);
    }

    fn received(&self, data: Bytes) {
        self.received.fetch_add(data.len(), Ordering::Relaxed);
    }

    fn close_requested(&self, _code: CloseCode, _message: &str) {}

    fn closed(&self, _domain: i32, _code: i32, _message: &str) {}
}

/// Completes everything inline and keeps the replicator handle
#[derive(Default)]
struct InlineConnection {
    replicator: Mutex<Option<ReplicatorConnection>>,
}

impl MessageEndpointConnection for InlineConnection {
    fn open(&self, connection: ReplicatorConnection, completion: MessagingCompletion) {
        *self.replicator.lock() = Some(connection);
        completion.succeed();
    }

    fn send(&self, message: Message, completion: MessagingCompletion) {
        black_box(message.len());
        completion.succeed();
    }

    fn close(&self, _error: Option<MessagingError>, completion: MessagingCloseCompletion) {
        completion.complete();
    }
}

fn open_bridge(protocol: ProtocolType) -> (MessageBridge, Arc<InlineConnection>, Arc<CountingEngine>) {
    let connection = Arc::new(InlineConnection::default());
    let bridge = MessageBridge::new(connection.clone(), protocol);
    let engine = Arc::new(CountingEngine::default());
    bridge.attach(engine.clone());
    bridge.request_open();
    (bridge, connection, engine)
}

fn bench_write_ack(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_ack");

    for size in [64usize, 1024, 16 * 1024] {
        let payload = Bytes::from(vec![0u8; size]);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{}B", size), |b| {
            let (bridge, _connection, engine) = open_bridge(ProtocolType::MessageStream);
            b.iter(|| bridge.write(black_box(payload.clone())));
            black_box(engine.acked.load(Ordering::Relaxed));
        });
    }

    group.finish();
}

fn bench_receive(c: &mut Criterion) {
    let mut group = c.benchmark_group("receive");
    group.throughput(Throughput::Elements(1));

    group.bench_function("message_1KiB", |b| {
        let (_bridge, connection, engine) = open_bridge(ProtocolType::ByteStream);
        let replicator = connection.replicator.lock().clone();
        let payload = Bytes::from(vec![1u8; 1024]);
        b.iter(|| {
            if let Some(replicator) = &replicator {
                replicator.receive(Message::from_data(payload.clone()));
            }
        });
        black_box(engine.received.load(Ordering::Relaxed));
    });

    group.finish();
}

fn bench_lifecycle(c: &mut Criterion) {
    c.bench_function("open_close_cycle", |b| {
        b.iter(|| {
            let (bridge, _connection, _engine) = open_bridge(ProtocolType::MessageStream);
            bridge.request_close(CloseCode::NORMAL, "");
            black_box(bridge.is_closed())
        })
    });
}

criterion_group!(benches, bench_write_ack, bench_receive, bench_lifecycle);
criterion_main!(benches);
