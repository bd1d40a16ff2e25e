//! Benchmarks for ephchat cryptographic operations

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ephchat_crypto::{aead::SessionCipher, KeyPair, SessionCrypto, SessionKey};

fn bench_key_exchange(c: &mut Criterion) {
    let mut group = c.benchmark_group("Key Exchange");

    group.bench_function("keypair_generate", |b| {
        b.iter(|| black_box(KeyPair::generate()))
    });

    group.bench_function("derive_shared_session", |b| {
        let peer = SessionCrypto::new().export_public_key();
        let mut engine = SessionCrypto::new();
        b.iter(|| {
            engine.derive_shared_session(black_box(&peer)).unwrap();
        })
    });

    group.finish();
}

fn bench_aead(c: &mut Criterion) {
    let mut group = c.benchmark_group("ChaCha20-Poly1305");
    let cipher = SessionCipher::new(&SessionKey::from_bytes([0x42; 32]));

    for size in [64usize, 1024, 16384] {
        let plaintext = vec![0x42u8; size];

        group.bench_with_input(BenchmarkId::new("seal", size), &plaintext, |b, p| {
            b.iter(|| black_box(cipher.seal(p).unwrap()))
        });

        let blob = cipher.seal(&plaintext).unwrap();
        group.bench_with_input(BenchmarkId::new("open", size), &blob, |b, blob| {
            b.iter(|| black_box(cipher.open(blob).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_key_exchange, bench_aead);
criterion_main!(benches);
