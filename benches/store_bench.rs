// ABOUTME: Criterion benchmarks for encryption and in-memory store hot paths
// ABOUTME: Measures seal/open latency by payload size and token, PKCE and session store operations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Criterion benchmarks for the credential stores.
//!
//! Every stored record goes through AES-256-GCM, so encryption cost dominates
//! the in-memory backends. These benchmarks track both.

#![allow(
    clippy::missing_docs_in_private_items,
    clippy::unwrap_used,
    missing_docs
)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pierre_auth_store::crypto::{hash_key, EncryptionService};
use pierre_auth_store::oauth_tokens::{InMemoryTokenStore, StoredTokenInfo, TokenStore, UserInfo};
use pierre_auth_store::persistence::now_millis;
use pierre_auth_store::pkce::{InMemoryPkceStore, PkceData, PkceStore};
use pierre_auth_store::sessions::{McpSessionMetadata, SessionMetadataStore, TieredSessionStore};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

const PAYLOAD_SIZES: [usize; 3] = [128, 1_024, 16_384];

fn encryption() -> Arc<EncryptionService> {
    Arc::new(EncryptionService::from_base64_key(&EncryptionService::generate_key_base64()).unwrap())
}

fn token_info(index: usize) -> StoredTokenInfo {
    StoredTokenInfo {
        access_token: format!("access-{index}"),
        refresh_token: Some(format!("refresh-{index}")),
        id_token: None,
        provider: "strava".to_owned(),
        scopes: vec!["activity:read_all".to_owned(), "profile:read_all".to_owned()],
        expires_at: now_millis() + 3_600_000,
        user_info: UserInfo {
            sub: format!("athlete-{index}"),
            email: None,
            name: None,
            provider: "strava".to_owned(),
        },
    }
}

fn bench_encryption(c: &mut Criterion) {
    let service = encryption();
    let mut group = c.benchmark_group("encryption");

    for size in PAYLOAD_SIZES {
        let plaintext = "x".repeat(size);
        let sealed = service.encrypt(&plaintext).unwrap();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encrypt", size), &plaintext, |b, text| {
            b.iter(|| service.encrypt(black_box(text)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("decrypt", size), &sealed, |b, payload| {
            b.iter(|| service.decrypt(black_box(payload)).unwrap());
        });
    }

    group.bench_function("hash_key", |b| {
        b.iter(|| hash_key(black_box("a-typical-oauth-access-token-value-0123456789")));
    });

    group.finish();
}

fn bench_token_store(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = InMemoryTokenStore::new(encryption());
    let mut group = c.benchmark_group("token_store");

    rt.block_on(async {
        for i in 0..1_000 {
            let info = token_info(i);
            store.store_token(&info.access_token, &info).await.unwrap();
        }
    });

    group.bench_function("store", |b| {
        let mut index = 1_000_usize;
        b.iter(|| {
            let info = token_info(index);
            index = index.wrapping_add(1);
            rt.block_on(async { store.store_token(&info.access_token, black_box(&info)).await })
        });
    });

    group.bench_function("get_hit", |b| {
        let mut index = 0_usize;
        b.iter(|| {
            let key = format!("access-{}", index % 1_000);
            index = index.wrapping_add(1);
            rt.block_on(async { store.get_token(black_box(&key)).await })
        });
    });

    group.bench_function("find_by_refresh_token", |b| {
        let mut index = 0_usize;
        b.iter(|| {
            let key = format!("refresh-{}", index % 1_000);
            index = index.wrapping_add(1);
            rt.block_on(async { store.find_by_refresh_token(black_box(&key)).await })
        });
    });

    group.finish();
}

fn bench_pkce_store(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = InMemoryPkceStore::new();
    let data = PkceData::new("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk", "state");

    c.bench_function("pkce_store_and_consume", |b| {
        let mut index = 0_usize;
        b.iter(|| {
            let code = format!("code-{index}");
            index = index.wrapping_add(1);
            rt.block_on(async {
                store
                    .store_code_verifier(&code, &data, Duration::from_secs(600))
                    .await
                    .unwrap();
                store.get_and_delete_code_verifier(black_box(&code)).await
            })
        });
    });
}

fn bench_session_store(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = TieredSessionStore::in_memory(NonZeroUsize::new(1_000).unwrap());
    let now = now_millis();

    c.bench_function("session_store_lru_churn", |b| {
        let mut index = 0_usize;
        b.iter(|| {
            let session = McpSessionMetadata {
                session_id: format!("session-{index}"),
                auth_info: None,
                created_at: now,
                expires_at: now + 3_600_000,
                metadata: None,
                events: None,
            };
            index = index.wrapping_add(1);
            rt.block_on(async {
                store.store_session(black_box(&session)).await.unwrap();
                store.get_session(&session.session_id).await
            })
        });
    });
}

criterion_group!(
    benches,
    bench_encryption,
    bench_token_store,
    bench_pkce_store,
    bench_session_store
);
criterion_main!(benches);
