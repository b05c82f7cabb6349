mod common;

use core::{num::NonZeroU32, time::Duration};
use std::sync::{Arc, Mutex};

use junction_client::{
    BackendClient,
    request::{
        AddSignerRequest, BroadcastRequest, CreatePsbtRequest, CreateWalletRequest,
        EnterPinRequest, PromptTarget, PsbtOutput, SignPsbtRequest,
    },
};
use junction_test_utils::{StubBackend, StubResponse, fixtures, fixtures::json as wire};
use junction_wallet_domain::{
    device::DeviceStatus,
    psbt::{PsbtStage, SignatureCounting},
    settings::{RpcSettings, Settings},
    wallet::Wallet,
};
use junction_wallet_engine::{
    DevicePoller, Started, WalletEngine, WalletEngineConfig, WalletEngineErrorKind,
    state::Slot,
    view::{self, PsbtStatus},
};
use reqwest::Method;
use serde_json::json;

use self::common::FakeBackend;

const ALICE: &str = "aaaa0001";
const BOB: &str = "bbbb0002";
const CAROL: &str = "cccc0003";

/// A 2-of-3 wallet with one PSBT signed by `signed`.
fn vault(signed: &[&str]) -> Wallet {
    let signers =
        vec![fixtures::signer("alice", ALICE), fixtures::signer("bob", BOB), fixtures::signer("carol", CAROL)];
    let psbt = fixtures::psbt("c0ffee", vec![fixtures::psbt_input(&[ALICE, BOB, CAROL], Some(signed))]);

    fixtures::wallet("vault", 2, 3, signers, vec![psbt])
}

async fn started(backend: FakeBackend) -> WalletEngine<FakeBackend, Started> {
    started_with(backend, WalletEngineConfig::default()).await
}

async fn started_with(backend: FakeBackend, config: WalletEngineConfig) -> WalletEngine<FakeBackend, Started> {
    let engine = WalletEngine::new(backend, config).start();
    engine.bootstrap().await.unwrap();
    engine
}

fn fake() -> FakeBackend {
    FakeBackend::new()
        .with_devices(vec![fixtures::unlocked_device("usb:1", ALICE)])
        .with_wallets(vec![vault(&[])])
        .with_settings(settings())
}

fn settings() -> Settings {
    let rpc = RpcSettings::builder().user("bitcoin").password("secret").host("127.0.0.1").port("18332").build();

    Settings::builder().rpc(rpc).build()
}

fn sign_request(fingerprint: &str) -> SignPsbtRequest {
    SignPsbtRequest::builder().wallet_name("vault").device_id(fingerprint).index(0).build()
}

fn broadcast_request() -> BroadcastRequest {
    BroadcastRequest::builder().wallet_name("vault").index(0).build()
}

#[tokio::test]
async fn bootstrap_loads_everything_in_order() {
    let backend = fake().with_wallets(vec![vault(&[]), fixtures::wallet("spare", 1, 1, vec![], vec![])]);

    let engine = started(backend.clone()).await;

    assert_eq!(backend.calls(), vec!["get_devices", "get_wallets", "get_nodes", "get_settings"]);

    let state = engine.state();
    assert!(state.devices().has_loaded());
    assert!(state.nodes().has_loaded());
    assert!(view::settings_valid(&state));
    assert_eq!(state.active_wallet_name(), Some("vault"));
}

#[tokio::test]
async fn bootstrap_attempts_every_load_and_reports_the_first_failure() {
    let backend = fake();
    backend.fail("get_devices", "hwi unavailable");
    backend.fail("get_settings", "settings unavailable");

    let engine = WalletEngine::new(backend.clone(), WalletEngineConfig::default()).start();
    let err = engine.bootstrap().await.unwrap_err();

    assert_eq!(err.kind().to_string(), "hwi unavailable");
    assert_eq!(backend.calls().len(), 4);

    let state = engine.state();
    assert_eq!(state.devices().error(), Some("hwi unavailable"));
    assert!(state.wallets().has_loaded());
}

#[tokio::test]
async fn selecting_an_unknown_wallet_is_not_found() {
    let engine = started(fake()).await;

    let err = engine.select_wallet("nope").await.unwrap_err();

    assert!(matches!(err.kind(), WalletEngineErrorKind::NotFound(_)));
    assert_eq!(engine.state().active_wallet_name(), Some("vault"));
}

#[tokio::test]
async fn sign_refetches_wallets_and_returns_the_new_status() {
    let backend = fake().after_mutation(vec![vault(&[ALICE])]);
    let engine = started(backend.clone()).await;

    let status = engine.sign(sign_request(ALICE)).await.unwrap();

    assert_eq!(status, PsbtStatus { stage: PsbtStage::PartiallySigned, signatures_remaining: 1 });
    assert_eq!(backend.count("sign_psbt"), 1);
    assert_eq!(backend.count("get_wallets"), 2);
    assert!(engine.state().signing().is_none());
}

#[tokio::test(start_paused = true)]
async fn second_sign_while_signing_is_busy_and_never_reaches_backend() {
    let backend = fake().with_devices(vec![
        fixtures::unlocked_device("usb:1", ALICE),
        fixtures::unlocked_device("usb:2", BOB),
    ]);
    backend.delay("sign_psbt", Duration::from_secs(5));
    let engine = started(backend.clone()).await;

    let (first, second) = tokio::join!(engine.sign(sign_request(ALICE)), engine.sign(sign_request(BOB)));

    assert!(first.is_ok());
    assert!(matches!(second.unwrap_err().kind(), WalletEngineErrorKind::Busy(Slot::Signing)));
    assert_eq!(backend.count("sign_psbt"), 1);
    assert!(!engine.state().is_busy(Slot::Signing));
}

#[tokio::test]
async fn sign_without_an_unlocked_device_is_unavailable() {
    let backend = fake().with_devices(vec![fixtures::locked_trezor("usb:2")]);
    let engine = started(backend.clone()).await;

    let err = engine.sign(sign_request(BOB)).await.unwrap_err();

    assert!(matches!(err.kind(), WalletEngineErrorKind::DeviceUnavailable(fingerprint) if fingerprint.as_str() == BOB));
    assert_eq!(backend.count("sign_psbt"), 0);
}

#[tokio::test]
async fn sign_of_a_fully_signed_psbt_never_reaches_backend() {
    let backend = fake()
        .with_devices(vec![fixtures::unlocked_device("usb:3", CAROL)])
        .with_wallets(vec![vault(&[ALICE, BOB])]);
    let engine = started(backend.clone()).await;
    assert_eq!(
        view::psbt_status(&engine.state(), "vault", 0, SignatureCounting::FirstInput).map(|status| status.stage),
        Some(PsbtStage::FullySigned)
    );

    let err = engine.sign(sign_request(CAROL)).await.unwrap_err();

    assert!(matches!(err.kind(), WalletEngineErrorKind::AlreadyFullySigned { index: 0, .. }));
    assert_eq!(backend.count("sign_psbt"), 0);
    assert!(engine.state().signing().is_none());
}

#[tokio::test]
async fn sign_with_a_device_outside_the_wallet_never_reaches_backend() {
    const STRANGER: &str = "ffff9999";
    let backend = fake().with_devices(vec![fixtures::unlocked_device("usb:9", STRANGER)]);
    let engine = started(backend.clone()).await;

    let err = engine.sign(sign_request(STRANGER)).await.unwrap_err();

    assert!(matches!(err.kind(), WalletEngineErrorKind::NotASigner(fingerprint) if fingerprint.as_str() == STRANGER));
    assert_eq!(backend.count("sign_psbt"), 0);
}

#[tokio::test]
async fn sign_of_unknown_psbt_is_not_found() {
    let engine = started(fake()).await;

    let request = SignPsbtRequest::builder().wallet_name("vault").device_id(ALICE).index(7).build();
    let err = engine.sign(request).await.unwrap_err();

    assert!(matches!(err.kind(), WalletEngineErrorKind::NotFound(_)));
}

#[tokio::test]
async fn failed_sign_releases_the_slot_and_keeps_state() {
    let backend = fake();
    backend.fail("sign_psbt", "device rejected the request");
    let engine = started(backend.clone()).await;
    let before = engine.state();

    let err = engine.sign(sign_request(ALICE)).await.unwrap_err();

    assert_eq!(err.kind().to_string(), "device rejected the request");
    assert_eq!(*engine.state(), *before);
    assert_eq!(backend.count("get_wallets"), 1);
}

#[tokio::test]
async fn broadcast_below_threshold_never_reaches_backend() {
    let backend = fake().with_wallets(vec![vault(&[ALICE])]);
    let engine = started(backend.clone()).await;

    let err = engine.broadcast(broadcast_request()).await.unwrap_err();

    assert!(matches!(err.kind(), WalletEngineErrorKind::ThresholdNotMet { remaining: 1 }));
    assert_eq!(backend.count("broadcast"), 0);
}

#[tokio::test]
async fn broadcast_consumes_the_psbt() {
    let backend = fake().with_wallets(vec![vault(&[ALICE, BOB])]).with_txid("c0ffee");
    let engine = started(backend.clone()).await;

    let receipt = engine.broadcast(broadcast_request()).await.unwrap();
    assert_eq!(receipt.txid(), Some("c0ffee"));
    assert!(engine.state().is_broadcast("c0ffee"));

    let again = engine.broadcast(broadcast_request()).await.unwrap_err();
    let sign = engine.sign(sign_request(ALICE)).await.unwrap_err();

    assert!(matches!(again.kind(), WalletEngineErrorKind::PsbtConsumed { index: 0, .. }));
    assert!(matches!(sign.kind(), WalletEngineErrorKind::PsbtConsumed { .. }));
    assert_eq!(backend.count("broadcast"), 1);
}

#[tokio::test]
async fn broadcast_without_receipt_txid_consumes_the_psbt_txid() {
    let backend = fake().with_wallets(vec![vault(&[ALICE, BOB])]);
    let engine = started(backend).await;

    let receipt = engine.broadcast(broadcast_request()).await.unwrap();

    assert_eq!(receipt.txid(), None);
    assert!(engine.state().is_broadcast("c0ffee"));
}

#[tokio::test]
async fn failed_broadcast_does_not_consume() {
    let backend = fake().with_wallets(vec![vault(&[ALICE, BOB])]);
    backend.fail("broadcast", "bad-txns-inputs-missingorspent");
    let engine = started(backend).await;

    let err = engine.broadcast(broadcast_request()).await.unwrap_err();

    assert_eq!(err.kind().to_string(), "bad-txns-inputs-missingorspent");
    assert!(!engine.state().is_broadcast("c0ffee"));
    assert!(engine.state().broadcasting().is_none());
}

#[tokio::test]
async fn every_input_counting_gates_unevenly_signed_psbts() {
    let signers = vec![fixtures::signer("alice", ALICE), fixtures::signer("bob", BOB)];
    let psbt = fixtures::psbt(
        "c0ffee",
        vec![
            fixtures::psbt_input(&[ALICE, BOB], Some(&[ALICE, BOB])),
            fixtures::psbt_input(&[ALICE, BOB], Some(&[ALICE])),
        ],
    );
    let wallet = fixtures::wallet("vault", 2, 2, signers, vec![psbt]);
    let config = WalletEngineConfig::builder().signature_counting(SignatureCounting::EveryInput).build();

    let backend = fake().with_wallets(vec![wallet]);
    let engine = started_with(backend.clone(), config).await;

    let err = engine.broadcast(broadcast_request()).await.unwrap_err();

    assert!(matches!(err.kind(), WalletEngineErrorKind::ThresholdNotMet { remaining: 1 }));
    assert_eq!(backend.count("broadcast"), 0);
}

#[tokio::test]
async fn add_signer_checks_device_and_wallet_before_calling_backend() {
    let backend = fake().with_devices(vec![
        fixtures::unlocked_device("usb:1", ALICE),
        fixtures::unlocked_device("usb:4", "dddd0004"),
    ]);
    let full = fixtures::wallet("full", 1, 1, vec![fixtures::signer("alice", ALICE)], vec![]);
    let backend = backend.with_wallets(vec![vault(&[]), full]);
    let engine = started(backend.clone()).await;

    let request = |wallet: &str, fingerprint: &str| {
        AddSignerRequest::builder().wallet_name(wallet).signer_name("dave").device_id(fingerprint).build().unwrap()
    };

    let missing = engine.add_signer(request("nope", "dddd0004")).await.unwrap_err();
    let absent = engine.add_signer(request("vault", "eeee0005")).await.unwrap_err();
    let already = engine.add_signer(request("vault", ALICE)).await.unwrap_err();
    let full = engine.add_signer(request("full", "dddd0004")).await.unwrap_err();

    assert!(matches!(missing.kind(), WalletEngineErrorKind::NotFound(_)));
    assert!(matches!(absent.kind(), WalletEngineErrorKind::DeviceUnavailable(_)));
    assert!(matches!(already.kind(), WalletEngineErrorKind::AlreadySigner(_)));
    assert!(matches!(full.kind(), WalletEngineErrorKind::WalletFull(name) if name == "full"));
    assert_eq!(backend.count("add_signer"), 0);
}

#[tokio::test]
async fn add_signer_refetches_the_wallet() {
    let half = fixtures::wallet("vault", 2, 2, vec![fixtures::signer("alice", ALICE)], vec![]);
    let complete = fixtures::wallet(
        "vault",
        2,
        2,
        vec![fixtures::signer("alice", ALICE), fixtures::signer("bob", BOB)],
        vec![],
    );
    let backend = fake()
        .with_devices(vec![fixtures::unlocked_device("usb:2", BOB)])
        .with_wallets(vec![half])
        .after_mutation(vec![complete]);
    let engine = started(backend).await;

    let request = AddSignerRequest::builder().wallet_name("vault").signer_name("bob").device_id(BOB).build().unwrap();
    let wallet = engine.add_signer(request).await.unwrap();

    assert!(wallet.is_ready());
    assert!(engine.state().adding_signer().is_none());
}

#[tokio::test]
async fn created_wallet_becomes_active() {
    let created = fixtures::wallet("savings", 1, 1, vec![], vec![]);
    let backend = fake().after_mutation(vec![vault(&[]), created]);
    let engine = started(backend).await;
    assert_eq!(engine.state().active_wallet_name(), Some("vault"));

    let request = CreateWalletRequest::builder()
        .name("savings")
        .m(NonZeroU32::MIN)
        .n(NonZeroU32::MIN)
        .build()
        .unwrap();
    let wallet = engine.create_wallet(request).await.unwrap();

    assert_eq!(wallet.name(), "savings");
    assert_eq!(engine.state().active_wallet_name(), Some("savings"));
}

#[tokio::test]
async fn create_psbt_returns_the_newest_psbt_after_refetch() {
    let backend = fake().with_wallets(vec![fixtures::wallet("vault", 1, 1, vec![], vec![])]).after_mutation(vec![vault(&[])]);
    let engine = started(backend).await;

    let request = CreatePsbtRequest::builder()
        .wallet_name("vault")
        .outputs(vec![PsbtOutput::builder().address("tb1qrecipient").btc(0.1).build()])
        .build()
        .unwrap();
    let psbt = engine.create_psbt(request).await.unwrap().unwrap();

    assert_eq!(psbt.txid(), Some("c0ffee"));
}

#[tokio::test]
async fn unlocking_closes_the_prompt_and_re_enumerates_devices() {
    let backend = fake().with_devices(vec![fixtures::locked_trezor("usb:2")]);
    let engine = started(backend.clone()).await;

    engine.prompt_pin(PromptTarget::Device("usb:2".into())).await.unwrap();
    assert_eq!(engine.state().pin_prompt(), Some(&PromptTarget::Device("usb:2".into())));

    backend.set_devices(vec![fixtures::unlocked_device("usb:2", BOB)]);
    let devices = engine.enter_pin(EnterPinRequest::new("1234").unwrap()).await.unwrap();

    assert_eq!(devices[0].status(), DeviceStatus::Unlocked);
    assert!(engine.state().pin_prompt().is_none());
    assert_eq!(engine.state().device_list(), devices.as_slice());
}

#[tokio::test]
async fn failed_unlock_keeps_the_prompt_open() {
    let backend = fake();
    backend.fail("enter_pin", "Invalid PIN");
    let engine = started(backend).await;

    engine.prompt_pin(PromptTarget::Wallet("vault".into())).await.unwrap();
    let err = engine.enter_pin(EnterPinRequest::new("0000").unwrap()).await.unwrap_err();

    assert_eq!(err.kind().to_string(), "Invalid PIN");
    assert!(engine.state().pin_prompt().is_some());

    engine.cancel_prompt().await.unwrap();
    assert!(engine.state().pin_prompt().is_none());
}

#[tokio::test]
async fn generated_address_is_returned() {
    let backend = fake();
    let engine = started(backend.clone()).await;

    assert_eq!(engine.generate_address("vault").await.unwrap(), "tb1qvault");
    assert_eq!(backend.count("get_wallets"), 2);
}

#[tokio::test(start_paused = true)]
async fn poller_applies_updates_until_stopped() {
    let config = WalletEngineConfig::builder().poll_interval(Duration::from_secs(2)).build();
    let backend = fake();
    let engine = started_with(backend.clone(), config).await;
    let mut changes = engine.subscribe();

    let poller = engine.start_device_poller();
    backend.set_devices(vec![]);
    tokio::time::sleep(Duration::from_secs(5)).await;
    let _ = changes.borrow_and_update();
    assert!(engine.state().device_list().is_empty());

    poller.stop().await.unwrap();
    let polls = backend.count("get_devices");
    backend.set_devices(vec![fixtures::unlocked_device("usb:9", "ffff0009")]);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(backend.count("get_devices"), polls);
    assert!(!changes.has_changed().unwrap());
    assert!(engine.state().device_list().is_empty());
}

#[tokio::test(start_paused = true)]
async fn poller_stopped_during_fetch_applies_nothing() {
    let backend = fake();
    let engine = started(backend.clone()).await;
    backend.delay("get_devices", Duration::from_secs(3));
    backend.set_devices(vec![]);

    let poller = engine.start_device_poller();
    tokio::time::sleep(Duration::from_secs(1)).await;
    poller.stop().await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(engine.state().device_list().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_poller_stops_polling() {
    let backend = fake();
    let engine = started(backend.clone()).await;

    drop(engine.start_device_poller());
    tokio::time::sleep(Duration::from_secs(1)).await;
    let polls = backend.count("get_devices");
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(backend.count("get_devices"), polls);
}

#[tokio::test(start_paused = true)]
async fn poller_dropped_as_its_fetch_completes_applies_nothing() {
    let backend = fake();
    let engine = started(backend.clone()).await;
    backend.set_devices(vec![]);

    let handle = Arc::new(Mutex::new(None::<DevicePoller>));
    let dropped = Arc::clone(&handle);
    backend.on_answer("get_devices", move || drop(dropped.lock().unwrap().take()));
    *handle.lock().unwrap() = Some(engine.start_device_poller());

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(handle.lock().unwrap().is_none());
    assert_eq!(backend.count("get_devices"), 2);
    assert_eq!(engine.state().device_list().len(), 1);
}

#[tokio::test]
async fn stopped_engine_can_be_restarted() {
    let engine = started(fake()).await;

    let engine = engine.stop().await.unwrap().start();

    assert!(!engine.state().wallets().has_loaded());
    engine.bootstrap().await.unwrap();
    assert!(engine.state().wallets().has_loaded());
}

#[tokio::test]
async fn engine_drives_the_http_backend() {
    let stub = StubBackend::spawn().await;
    let signers = vec![wire::signer("alice", ALICE), wire::signer("bob", BOB)];
    let unsigned = wire::psbt("c0ffee", vec![wire::psbt_input(&[ALICE, BOB], Some(&[]))]);
    stub.respond(Method::GET, "devices", StubResponse::json(json!([wire::unlocked_device("usb:1", "coldcard", ALICE)])))
        .respond(Method::GET, "wallets", StubResponse::json(json!([wire::wallet("vault", 2, 2, signers, vec![unsigned])])))
        .respond(Method::GET, "nodes", StubResponse::json(json!({ "bitcoin": [] })))
        .respond(Method::GET, "settings", StubResponse::json(wire::settings(None)))
        .respond(Method::POST, "sign", StubResponse::json(json!({})));

    let client = BackendClient::new(stub.url(), Duration::from_secs(5)).unwrap();
    let engine = WalletEngine::new(client, WalletEngineConfig::default()).start();
    engine.bootstrap().await.unwrap();

    let status = engine.sign(sign_request(ALICE)).await.unwrap();
    let broadcast = engine.broadcast(broadcast_request()).await.unwrap_err();

    assert_eq!(status.signatures_remaining, 2);
    assert!(matches!(broadcast.kind(), WalletEngineErrorKind::ThresholdNotMet { remaining: 2 }));
    assert_eq!(stub.requests_to("sign")[0].body, Some(json!({ "wallet_name": "vault", "device_id": ALICE, "index": 0 })));
    assert!(stub.requests_to("broadcast").is_empty());
}
