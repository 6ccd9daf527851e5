use agora_broadcast::message::topic::FUNCTION_PROOF;
use agora_broadcast::network::DEFAULT_PUBSUB_TOPIC;
use agora_broadcast::{ContentTopic, MessageEnvelope, SigningIdentity};
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_envelope(c: &mut Criterion) {
    c.bench_function("content_topic_build", |b| {
        b.iter(|| ContentTopic::new("agora", "1", FUNCTION_PROOF, "proto"))
    });

    let topic = ContentTopic::agora(FUNCTION_PROOF).unwrap();
    c.bench_function("envelope_new_hello_world", |b| {
        b.iter(|| MessageEnvelope::new("Hello World", 1, &topic))
    });

    let envelope = MessageEnvelope::new(vec![7u8; 64 * 1024], 1, &topic);
    c.bench_function("message_id_64k", |b| {
        b.iter(|| envelope.message_id(DEFAULT_PUBSUB_TOPIC))
    });

    let signer = SigningIdentity::generate();
    c.bench_function("sign_64k", |b| {
        b.iter(|| {
            let mut env = envelope.clone();
            env.sign(&signer)
        })
    });
}

criterion_group!(benches, bench_envelope);
criterion_main!(benches);
