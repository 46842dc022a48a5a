use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use tempfile::tempdir;

use super::*;

fn at(hour: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

#[test]
fn unit_package_key_parses_catalogue_entries_and_rejects_others() {
    let key: PackageKey = "bilder_10".parse().expect("catalogue key");
    assert_eq!(key.media_type(), MediaType::Bilder);
    assert_eq!(key.amount(), 10);
    assert_eq!(key.to_string(), "bilder_10");

    assert_eq!(
        "bilder_11".parse::<PackageKey>(),
        Err(PackageKeyError::UnsupportedAmount(11))
    );
    assert_eq!(
        "audio_10".parse::<PackageKey>(),
        Err(PackageKeyError::UnknownMediaType("audio".to_string()))
    );
    assert!(matches!(
        "bilder".parse::<PackageKey>(),
        Err(PackageKeyError::Malformed(_))
    ));
    assert_eq!(PackageKey::all().len(), 6);
}

#[test]
fn unit_price_catalogue_defaults_and_overrides() {
    let catalogue = PriceCatalogue::default();
    let bilder_10 = PackageKey::new(MediaType::Bilder, 10).expect("key");
    let videos_35 = PackageKey::new(MediaType::Videos, 35).expect("key");
    assert_eq!(catalogue.base_price(bilder_10), 5);
    assert_eq!(catalogue.base_price(videos_35), 30);

    let overridden = PriceCatalogue::default()
        .with_overrides("bilder_10=6, videos_35=29")
        .expect("overrides");
    assert_eq!(overridden.base_price(bilder_10), 6);
    assert_eq!(overridden.base_price(videos_35), 29);

    assert!(PriceCatalogue::default().with_overrides("bilder_10").is_err());
    assert!(PriceCatalogue::default()
        .with_overrides("bilder_12=4")
        .is_err());
    assert!(PriceCatalogue::default()
        .with_overrides("bilder_10=0")
        .is_err());
}

#[test]
fn functional_discount_descriptor_uses_tagged_wire_shape() {
    let mut packages = BTreeMap::new();
    packages.insert("bilder_10".parse::<PackageKey>().expect("key"), 3);
    let descriptor = DiscountDescriptor::Euro { packages };
    let encoded = serde_json::to_value(&descriptor).expect("encode");
    assert_eq!(
        encoded,
        json!({"type": "euro", "packages": {"bilder_10": 3}})
    );

    let percent: DiscountDescriptor =
        serde_json::from_value(json!({"type": "percent", "value": 20})).expect("decode");
    assert_eq!(percent, DiscountDescriptor::Percent { value: 20 });
}

#[test]
fn regression_discount_descriptor_rejects_unknown_tag_and_foreign_package() {
    assert!(serde_json::from_value::<DiscountDescriptor>(
        json!({"type": "bogo", "value": 1})
    )
    .is_err());
    assert!(serde_json::from_value::<DiscountDescriptor>(
        json!({"type": "euro", "packages": {"audio_10": 2}})
    )
    .is_err());
}

#[test]
fn functional_user_record_loads_legacy_last_start_field() {
    let record: UserRecord =
        serde_json::from_value(json!({"last_start": "2024-05-01T10:30:00.123456"}))
            .expect("legacy record");
    assert_eq!(
        record.last_seen,
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0)
            .single()
            .expect("ts")
            + Duration::microseconds(123_456)
    );
    assert_eq!(record.first_seen, chrono::DateTime::<Utc>::UNIX_EPOCH);
    assert!(!record.banned);
    assert!(record.discount.is_none());
}

#[test]
fn unit_payment_attempts_are_deduplicated_by_exact_value() {
    let mut record = UserRecord::new(at(8));
    assert!(record.record_payment_attempt("paypal: 8€"));
    assert!(!record.record_payment_attempt("paypal: 8€"));
    assert!(record.record_payment_attempt("paypal: 10€"));
    assert_eq!(record.payment_attempts, vec!["paypal: 8€", "paypal: 10€"]);
}

#[test]
fn unit_reset_event_counters_zeroes_keys_and_keeps_other_fields() {
    let mut aggregate = Aggregate {
        pinned_message_id: Some(11),
        discount_message_id: Some(12),
        ..Aggregate::default()
    };
    aggregate
        .users
        .insert("42".to_string(), UserRecord::new(at(9)));
    aggregate.increment_event(EventName::StartCommand);
    aggregate.increment_event(EventName::StartCommand);
    aggregate.increment_event(EventName::PaymentPaypal);
    let users_before = aggregate.users.clone();

    aggregate.reset_event_counters();

    assert_eq!(aggregate.events.len(), 2);
    assert!(aggregate.events.values().all(|value| *value == 0));
    assert_eq!(aggregate.users, users_before);
    assert_eq!(aggregate.pinned_message_id, Some(11));
    assert_eq!(aggregate.discount_message_id, Some(12));
}

#[test]
fn unit_full_reset_drops_users_but_keeps_message_ids() {
    let mut aggregate = Aggregate {
        pinned_message_id: Some(5),
        ..Aggregate::default()
    };
    aggregate
        .users
        .insert("1".to_string(), UserRecord::new(at(9)));
    aggregate
        .admin_logs
        .insert("1".to_string(), AdminLogEntry::default());
    aggregate.increment_event(EventName::NextPreview);

    aggregate.full_reset();

    assert!(aggregate.users.is_empty());
    assert!(aggregate.admin_logs.is_empty());
    assert_eq!(aggregate.event_count(EventName::NextPreview), 0);
    assert!(aggregate.events.contains_key("next_preview"));
    assert_eq!(aggregate.pinned_message_id, Some(5));
}

#[test]
fn unit_active_users_since_counts_inside_window() {
    let mut aggregate = Aggregate::default();
    let mut stale = UserRecord::new(at(0));
    stale.last_seen = at(0) - Duration::hours(30);
    aggregate.users.insert("1".to_string(), stale);
    aggregate
        .users
        .insert("2".to_string(), UserRecord::new(at(0)));
    assert_eq!(aggregate.active_users_since(at(1), Duration::hours(24)), 1);
}

#[test]
fn regression_json_file_store_returns_default_for_missing_and_corrupt_files() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("stats.json");
    let store = JsonFileStore::new(&path);
    assert_eq!(store.load(), Aggregate::default());

    std::fs::write(&path, "{not json").expect("seed corrupt file");
    assert_eq!(store.load(), Aggregate::default());
    let kept = std::fs::read_dir(temp.path())
        .expect("list")
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with("stats.json.corrupt-")
        })
        .count();
    assert_eq!(kept, 1);
}

#[test]
fn functional_json_file_store_writes_documented_top_level_keys() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("stats.json");
    let store = JsonFileStore::new(&path);
    let mut aggregate = Aggregate::default();
    aggregate
        .users
        .insert("7".to_string(), UserRecord::new(at(10)));
    aggregate.increment_event(EventName::PackageSelected);
    store.save(&aggregate).expect("save");

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
    for key in [
        "pinned_message_id",
        "discount_message_id",
        "users",
        "admin_logs",
        "events",
    ] {
        assert!(raw.get(key).is_some(), "missing top-level key {key}");
    }
    assert_eq!(store.load(), aggregate);
}

#[tokio::test]
async fn integration_store_handle_rereads_backing_file_before_each_mutation() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("stats.json");
    let handle = StoreHandle::new(Arc::new(JsonFileStore::new(&path)));

    handle
        .mutate(|aggregate| {
            aggregate.increment_event(EventName::StartCommand);
        })
        .await
        .expect("first mutation");

    let external = JsonFileStore::new(&path);
    let mut edited = external.load();
    edited.pinned_message_id = Some(99);
    external.save(&edited).expect("external edit");

    let count = handle
        .mutate(|aggregate| aggregate.increment_event(EventName::StartCommand))
        .await
        .expect("second mutation");
    assert_eq!(count, 2);
    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.pinned_message_id, Some(99));
}

#[tokio::test]
async fn integration_store_handle_serializes_concurrent_mutations() {
    let handle = StoreHandle::in_memory(Aggregate::default());
    let mut tasks = Vec::new();
    for _ in 0..32 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            handle
                .mutate(|aggregate| aggregate.increment_event(EventName::NextPreview))
                .await
                .expect("mutate")
        }));
    }
    for task in tasks {
        task.await.expect("join");
    }
    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.event_count(EventName::NextPreview), 32);
}

#[test]
fn functional_voucher_store_appends_per_provider() {
    let temp = tempdir().expect("tempdir");
    let store = VoucherStore::new(temp.path().join("vouchers.json"));
    assert!(store.load().is_empty());
    store
        .append(VoucherProvider::Amazon, " AMZ-1 ")
        .expect("append amazon");
    store
        .append(VoucherProvider::Paysafe, "PSC-1")
        .expect("append paysafe");
    store
        .append(VoucherProvider::Amazon, "AMZ-2")
        .expect("append amazon again");
    let ledger = store.load();
    assert_eq!(ledger.codes(VoucherProvider::Amazon), ["AMZ-1", "AMZ-2"]);
    assert_eq!(ledger.codes(VoucherProvider::Paysafe), ["PSC-1"]);

    let raw: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(temp.path().join("vouchers.json")).expect("read"),
    )
    .expect("json");
    assert_eq!(raw, json!({"amazon": ["AMZ-1", "AMZ-2"], "paysafe": ["PSC-1"]}));
}

#[test]
fn unit_event_name_round_trips_through_counter_keys() {
    for event in EventName::ALL {
        assert_eq!(EventName::parse(event.as_str()), Some(event));
    }
    assert_eq!(EventName::preview(Segment::Large).as_str(), "preview_gs");
    assert_eq!(EventName::prices(Segment::Small).as_str(), "prices_ks");
}

#[test]
fn regression_voucher_appends_from_parallel_threads_are_all_kept() {
    let temp = tempdir().expect("tempdir");
    let store = VoucherStore::new(temp.path().join("vouchers.json"));
    let workers = (0..8)
        .map(|worker| {
            let store = store.clone();
            std::thread::spawn(move || {
                store
                    .append(VoucherProvider::Paysafe, &format!("PSC-{worker}"))
                    .expect("append")
            })
        })
        .collect::<Vec<_>>();
    for worker in workers {
        worker.join().expect("join");
    }
    assert_eq!(store.load().codes(VoucherProvider::Paysafe).len(), 8);
}

#[test]
fn functional_voucher_store_shares_the_aggregate_store_shape() {
    let backend: Arc<dyn VoucherLedgerStore> = Arc::new(MemoryVoucherLedger::default());
    let store = VoucherStore::with_backend(backend.clone());
    store
        .append(VoucherProvider::Amazon, "AMZ-9")
        .expect("append");
    assert_eq!(backend.load().codes(VoucherProvider::Amazon), ["AMZ-9"]);

    let temp = tempdir().expect("tempdir");
    let file = JsonVoucherFile::new(temp.path().join("vouchers.json"));
    std::fs::write(file.path(), "[1,2").expect("seed corrupt ledger");
    assert!(file.load().is_empty());
    file.save(&backend.load()).expect("save");
    assert_eq!(file.load().codes(VoucherProvider::Amazon), ["AMZ-9"]);
}
