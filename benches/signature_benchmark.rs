use criterion::{black_box, criterion_group, criterion_main, Criterion};
use garmin_gateway::services::signature::OauthSignature;
use std::collections::BTreeMap;

fn benchmark_signing(c: &mut Criterion) {
    // A realistic backfill parameter set
    let mut params = BTreeMap::new();
    params.insert("oauth_consumer_key".to_string(), "consumer-key".to_string());
    params.insert(
        "oauth_nonce".to_string(),
        "7d8f3e4a9b2c1d6e5f0a7b8c9d2e3f4a".to_string(),
    );
    params.insert("oauth_signature_method".to_string(), "HMAC-SHA1".to_string());
    params.insert("oauth_timestamp".to_string(), "1318622958".to_string());
    params.insert("oauth_token".to_string(), "user-token".to_string());
    params.insert("oauth_version".to_string(), "1.0".to_string());
    params.insert(
        "summaryStartTimeInSeconds".to_string(),
        "1600000000".to_string(),
    );
    params.insert(
        "summaryEndTimeInSeconds".to_string(),
        "1600432000".to_string(),
    );

    let mut group = c.benchmark_group("oauth_signing");

    group.bench_function("base_string", |b| {
        b.iter(|| {
            OauthSignature::new(
                black_box("https://healthapi.garmin.com/wellness-api/rest/backfill/dailies"),
                black_box("GET"),
                black_box(&params),
                "consumer-secret",
                Some("token-secret"),
            )
            .base_string()
        })
    });

    group.bench_function("encoded_signature", |b| {
        b.iter(|| {
            OauthSignature::new(
                black_box("https://healthapi.garmin.com/wellness-api/rest/backfill/dailies"),
                black_box("GET"),
                black_box(&params),
                "consumer-secret",
                Some("token-secret"),
            )
            .encoded_signature()
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_signing);
criterion_main!(benches);
