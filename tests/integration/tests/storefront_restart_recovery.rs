use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, TimeZone, Utc};
use shopbot_runtime::{
    BotConfig, DialogueState, ManifestMediaLibrary, PayoutConfig, RouteOutcome, RuntimeContext,
    ShopRuntime,
};
use shopbot_store::{
    Aggregate, AggregateStore, DiscountDescriptor, EventName, JsonFileStore, StoreHandle,
    UserRecord, VoucherStore,
};
use shopbot_telegram::{InMemoryTransport, InboundInteraction, InteractionKind};

const OPERATOR: i64 = 1;
const NOTIFICATION_CHAT: i64 = -900;

static WORKSPACE_COUNTER: AtomicU64 = AtomicU64::new(1);

struct IsolatedWorkspace {
    root: PathBuf,
}

impl IsolatedWorkspace {
    fn new(label: &str) -> Self {
        let tick = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let count = WORKSPACE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "shopbot-{label}-{}-{tick}-{count}",
            std::process::id()
        ));
        fs::create_dir_all(&root).expect("must create isolated workspace root");
        Self { root }
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn stats_path(&self) -> PathBuf {
        self.root.join("stats.json")
    }
}

impl Drop for IsolatedWorkspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, hour, 0, 0)
        .single()
        .expect("timestamp")
}

fn boot(workspace: &IsolatedWorkspace, transport: Arc<InMemoryTransport>) -> ShopRuntime {
    let config = BotConfig {
        notification_chat_id: Some(NOTIFICATION_CHAT),
        payout: PayoutConfig {
            paypal_user: "integrationshop".to_string(),
            btc_wallet: "bc1q-int".to_string(),
            eth_wallet: "0xint".to_string(),
        },
        ..BotConfig::new(OPERATOR)
    };
    let ctx = RuntimeContext::new(
        config,
        StoreHandle::new(Arc::new(JsonFileStore::new(workspace.stats_path()))),
        VoucherStore::new(workspace.root().join("vouchers.json")),
        transport,
        Arc::new(ManifestMediaLibrary::default()),
    );
    ShopRuntime::new(ctx)
}

fn persisted(workspace: &IsolatedWorkspace) -> Aggregate {
    JsonFileStore::new(workspace.stats_path()).load()
}

fn interaction(user_id: i64, kind: InteractionKind) -> InboundInteraction {
    InboundInteraction {
        update_id: 1,
        user_id,
        first_name: format!("Gast{user_id}"),
        chat_id: user_id,
        kind,
    }
}

fn start(user_id: i64, args: &[&str]) -> InboundInteraction {
    interaction(
        user_id,
        InteractionKind::Command {
            name: "start".to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        },
    )
}

fn click(user_id: i64, data: &str) -> InboundInteraction {
    interaction(
        user_id,
        InteractionKind::Button {
            callback_id: format!("cb-{user_id}-{data}"),
            data: data.to_string(),
            message_id: None,
        },
    )
}

fn text(user_id: i64, body: &str) -> InboundInteraction {
    interaction(user_id, InteractionKind::Text(body.to_string()))
}

async fn handle(runtime: &mut ShopRuntime, input: InboundInteraction, hour: u32) -> RouteOutcome {
    runtime.handle(&input, at(hour)).await.expect("handle")
}

#[tokio::test]
async fn integration_referral_journey_persists_discount_and_reward() {
    let workspace = IsolatedWorkspace::new("journey");
    let transport = Arc::new(InMemoryTransport::new());
    let mut runtime = boot(&workspace, transport.clone());

    handle(&mut runtime, start(100, &[]), 9).await;
    handle(&mut runtime, start(200, &["ref_100"]), 10).await;
    let after_signup = persisted(&workspace);
    assert_eq!(after_signup.users["200"].referrer_id.as_deref(), Some("100"));
    assert_eq!(after_signup.users["100"].referrals, vec!["200".to_string()]);
    assert_eq!(after_signup.users["200"].discount, None);

    // Back three hours later: the welcome discount is due.
    handle(&mut runtime, start(200, &[]), 13).await;
    let surprise = transport
        .sent_to(200)
        .into_iter()
        .any(|message| message.text.contains("Überraschung!"));
    assert!(surprise);

    handle(&mut runtime, click(200, "select_package:bilder:25"), 13).await;
    let offer = transport.last_message(200).expect("offer").text;
    assert!(offer.contains("<s>10€</s> <b>9€</b>"), "{offer}");

    handle(&mut runtime, click(200, "pay_paypal:bilder:25"), 13).await;

    let stored = persisted(&workspace);
    assert_eq!(
        stored.users["200"].discount,
        Some(DiscountDescriptor::Percent { value: 10 })
    );
    assert!(stored.users["200"].discount_sent);
    assert_eq!(
        stored.users["200"].payment_attempts,
        vec!["(PayPal, 9€)".to_string()]
    );
    assert_eq!(stored.users["100"].successful_referrals, 1);
    assert_eq!(stored.event_count(EventName::StartCommand), 3);
    assert_eq!(stored.event_count(EventName::PaymentPaypal), 1);
    assert!(stored.discount_message_id.is_some());
    assert!(stored.pinned_message_id.is_some());
}

#[tokio::test]
async fn integration_restart_restores_counters_and_discounts_from_chat() {
    let workspace = IsolatedWorkspace::new("restart");
    let transport = Arc::new(InMemoryTransport::new());
    {
        let mut runtime = boot(&workspace, transport.clone());
        handle(&mut runtime, start(10, &[]), 9).await;
        handle(&mut runtime, start(11, &[]), 9).await;
        for input in [
            click(OPERATOR, "dlg:begin:discount"),
            click(OPERATOR, "dlg:kind:percent"),
            click(OPERATOR, "dlg:target:user"),
            text(OPERATOR, "10"),
            text(OPERATOR, "15"),
            click(OPERATOR, "dlg:confirm"),
        ] {
            assert_eq!(handle(&mut runtime, input, 9).await, RouteOutcome::Handled);
        }
        assert_eq!(runtime.dialogue_state(OPERATOR), DialogueState::Idle);
    }

    // An old backup: users survive, counters and discounts do not.
    let mut backup = Aggregate::default();
    for id in ["10", "11"] {
        backup.users.insert(id.to_string(), UserRecord::new(at(9)));
    }
    JsonFileStore::new(workspace.stats_path())
        .save(&backup)
        .expect("write backup");

    let runtime = boot(&workspace, transport.clone());
    let report = runtime.recover().await;
    assert!(report.summary_restored);
    assert!(!report.legacy_summary);
    assert_eq!(report.placeholders_added, 0);
    assert_eq!(report.discounts_restored, 1);

    let restored = persisted(&workspace);
    assert_eq!(restored.event_count(EventName::StartCommand), 2);
    assert_eq!(
        restored.users["10"].discount,
        Some(DiscountDescriptor::Percent { value: 15 })
    );
    assert_eq!(restored.users["11"].discount, None);
    assert_eq!(
        restored.pinned_message_id,
        transport.pinned_id(NOTIFICATION_CHAT)
    );
}

#[tokio::test]
async fn integration_lost_stats_file_gets_placeholder_users() {
    let workspace = IsolatedWorkspace::new("placeholders");
    let transport = Arc::new(InMemoryTransport::new());
    {
        let mut runtime = boot(&workspace, transport.clone());
        for user_id in [20, 21, 22] {
            handle(&mut runtime, start(user_id, &[]), 9).await;
        }
    }
    fs::remove_file(workspace.stats_path()).expect("remove stats");

    let mut runtime = boot(&workspace, transport.clone());
    let report = runtime.recover().await;
    assert_eq!(report.placeholders_added, 3);
    let restored = persisted(&workspace);
    assert_eq!(restored.user_count(), 3);
    assert!(restored.users.keys().all(|id| id.starts_with("restored_user_")));

    // Placeholders never receive broadcasts.
    for input in [
        click(OPERATOR, "dlg:begin:discount"),
        click(OPERATOR, "dlg:kind:percent"),
        click(OPERATOR, "dlg:target:all"),
        text(OPERATOR, "30"),
        click(OPERATOR, "dlg:confirm"),
    ] {
        handle(&mut runtime, input, 10).await;
    }
    let after = persisted(&workspace);
    assert!(after.users.values().all(|record| record.discount.is_none()));
    let summary = transport.last_message(OPERATOR).expect("summary").text;
    assert!(summary.contains("Empfänger: <b>0</b>"), "{summary}");
}
