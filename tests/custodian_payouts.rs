//! Behavior-driven tests for bulk payout journeys.
//!
//! These tests drive whole submissions through the custodian registry and
//! a scripted transport, verifying HOW batches are validated, signed,
//! submitted, and reconciled back into the canonical status vocabulary.

use std::sync::Arc;
use std::time::Duration;

use fundrail_core::custodians::meridian::generate_tx_ref;
use fundrail_core::custodians::torii::DEFAULT_TRANSFER_CAP;
use fundrail_core::{
    BackoffPolicy, Custodian, CustodianErrorKind, CustodianId, CustodianRegistry,
    CustodianRegistryBuilder, HttpError, HttpResponse, MeridianClient, MeridianConfig, OriginTag,
    PayoutStatus, SubmitType, ThrottlingQueue, ToriiClient, ToriiConfig, TransferBatch,
    ValidationError,
};
use fundrail_tests::{fresh_price_token, ScriptedTransport};

fn torii_config(cache_dir: &std::path::Path) -> ToriiConfig {
    ToriiConfig {
        base_url: String::from("https://torii.example.test"),
        client_id: String::from("client-id"),
        client_secret: String::from("client-secret"),
        extra_client_secret: String::from("extra-secret"),
        source_from: String::from("self"),
        product_code: String::from("BAT_JPY"),
        transfer_cap: DEFAULT_TRANSFER_CAP,
        quote_cache_path: Some(cache_dir.join("quote.json")),
        dry_run: None,
    }
}

fn token_response() -> HttpResponse {
    HttpResponse::ok_json(r#"{"access_token":"tok-1","expires_in":3600,"token_type":"Bearer"}"#)
}

fn quote_response() -> HttpResponse {
    HttpResponse::ok_json(format!(
        r#"{{"product_code":"BAT_JPY","main_currency":"BAT","sub_currency":"JPY","rate":2.5,"price_token":"{}"}}"#,
        fresh_price_token()
    ))
}

fn meridian_client(transport: Arc<ScriptedTransport>) -> MeridianClient {
    MeridianClient::new(
        MeridianConfig {
            base_url: String::from("https://meridian.example.test"),
            submit_type: SubmitType::Hmac,
            api_key: Some(String::from("meridian-key")),
            api_secret: Some(String::from("meridian-secret")),
        },
        transport,
    )
}

// =============================================================================
// Bulk Payout: Submission Through the Registry
// =============================================================================

#[tokio::test]
async fn when_a_validated_batch_is_submitted_the_registry_routes_it_to_the_custodian() {
    // Given: A registry holding a Torii client over a scripted transport
    let dir = tempfile::tempdir().expect("tempdir");
    let transport = Arc::new(ScriptedTransport::replying(vec![
        token_response(),
        quote_response(),
        HttpResponse::ok_json(
            r#"{"dry_run":false,"withdrawals":[{"transfer_id":"tx-1","transfer_status":"SUCCESS"}]}"#,
        ),
    ]));
    let registry = CustodianRegistry::new(vec![Arc::new(ToriiClient::new(
        torii_config(dir.path()),
        transport.clone(),
    ))]);

    // When: A batch is submitted through the capability trait
    let batch = TransferBatch::from_rows(vec![("tx-1", "acct-1", "1.0", "tipping")], "BAT")
        .expect("valid batch");
    let custodian = registry.require(CustodianId::Torii).expect("registered");
    let outcomes = custodian.submit_bulk(&batch).await.expect("submits");

    // Then: The outcome keeps the caller's id and maps to the canon
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].transfer_id, "tx-1");
    assert_eq!(outcomes[0].status, PayoutStatus::Complete);
    assert_eq!(outcomes[0].provider_status, "SUCCESS");
    assert_eq!(transport.request_count(), 3, "token, price, bulk withdraw");
}

#[tokio::test]
async fn when_the_provider_mixes_item_verdicts_each_outcome_maps_canonically() {
    // Given: A four-item batch answered with four different raw statuses
    let dir = tempfile::tempdir().expect("tempdir");
    let transport = Arc::new(ScriptedTransport::replying(vec![
        token_response(),
        quote_response(),
        HttpResponse::ok_json(
            r#"{"dry_run":false,"withdrawals":[
                {"transfer_id":"tx-1","transfer_status":"SUCCESS"},
                {"transfer_id":"tx-2","transfer_status":"LOCKED_BY_QUICK_DEPOSIT","message":"account locked"},
                {"transfer_id":"tx-3","transfer_status":"PENDING"},
                {"transfer_id":"tx-4","transfer_status":"FOO"}
            ]}"#,
        ),
    ]));
    let torii = ToriiClient::new(torii_config(dir.path()), transport);

    // When: The batch is uploaded
    let batch = TransferBatch::from_rows(
        vec![
            ("tx-1", "acct-1", "1.0", "tipping"),
            ("tx-2", "acct-2", "2.0", "ad-rewards"),
            ("tx-3", "acct-3", "3.0", "user-drain"),
            ("tx-4", "acct-4", "4.0", "tipping"),
        ],
        "BAT",
    )
    .expect("valid batch");
    let outcomes = torii.upload_bulk_payout(&batch).await.expect("uploads");

    // Then: Every raw status resolves to exactly one canonical state
    let statuses: Vec<PayoutStatus> = outcomes.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![
            PayoutStatus::Complete,
            PayoutStatus::Failed,
            PayoutStatus::Pending,
            PayoutStatus::Unknown,
        ]
    );
    // Raw provider strings survive for the audit trail
    assert_eq!(outcomes[1].provider_status, "LOCKED_BY_QUICK_DEPOSIT");
    assert_eq!(outcomes[1].note.as_deref(), Some("account locked"));
    assert_eq!(outcomes[3].provider_status, "FOO");
}

// =============================================================================
// Bulk Payout: Validation Before the Network
// =============================================================================

#[tokio::test]
async fn when_an_origin_tag_is_not_whitelisted_the_whole_batch_is_rejected() {
    // Given: A transport that would answer if anything reached it
    let transport = Arc::new(ScriptedTransport::replying(vec![]));

    // When: One row of the batch carries an unlisted origin tag
    let result = TransferBatch::from_rows(
        vec![
            ("tx-1", "acct-1", "1.0", "tipping"),
            ("tx-2", "acct-2", "2.0", "referral-bonus"),
        ],
        "BAT",
    );

    // Then: Construction fails naming the tag and nothing was submitted
    let error = result.expect_err("unlisted tag must reject the batch");
    assert_eq!(
        error,
        ValidationError::InvalidOriginTag {
            value: String::from("referral-bonus")
        }
    );
    assert!(error.to_string().contains("tipping, ad-rewards, user-drain"));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn when_an_amount_exceeds_eight_decimals_nothing_reaches_the_wire() {
    let transport = Arc::new(ScriptedTransport::replying(vec![]));

    let result =
        TransferBatch::from_rows(vec![("tx-1", "acct-1", "0.000000001", "tipping")], "BAT");

    let error = result.expect_err("scale 9 must reject the batch");
    assert!(matches!(error, ValidationError::AmountScaleTooLarge { .. }));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn when_an_amount_cannot_round_trip_through_f64_nothing_reaches_the_wire() {
    // Given: An amount with more significant digits than f64 can carry
    let result = TransferBatch::from_rows(
        vec![("tx-1", "acct-1", "12345678901234567.891", "tipping")],
        "BAT",
    );

    // Then: The precision loss is caught at construction
    let error = result.expect_err("precision loss must reject the batch");
    assert!(matches!(error, ValidationError::AmountPrecisionLoss { .. }));
}

#[tokio::test]
async fn when_a_batch_has_no_records_construction_fails() {
    let result = TransferBatch::from_rows(Vec::new(), "BAT");
    assert_eq!(result.expect_err("must fail"), ValidationError::EmptyBatch);
}

// =============================================================================
// Status Reconciliation
// =============================================================================

#[tokio::test]
async fn when_outcomes_are_rechecked_the_batch_travels_to_the_status_route() {
    // Given: A submitted batch being reconciled later
    let dir = tempfile::tempdir().expect("tempdir");
    let transport = Arc::new(ScriptedTransport::replying(vec![
        token_response(),
        quote_response(),
        HttpResponse::ok_json(
            r#"{"dry_run":false,"withdrawals":[{"transfer_id":"tx-1","transfer_status":"EXECUTED"}]}"#,
        ),
    ]));
    let torii = ToriiClient::new(torii_config(dir.path()), transport.clone());

    // When: Status is checked through the capability trait
    let batch = TransferBatch::from_rows(vec![("tx-1", "acct-1", "1.0", "tipping")], "BAT")
        .expect("valid batch");
    let outcomes = Custodian::check_status(&torii, &batch).await.expect("checks");

    // Then: The status route received the same withdrawal payload
    assert_eq!(outcomes[0].status, PayoutStatus::Complete);
    let requests = transport.recorded_requests();
    assert!(requests[2].url.ends_with("/v1/payout/bulk-status"));
    let body: serde_json::Value =
        serde_json::from_str(requests[2].body.as_deref().expect("status body"))
            .expect("status body parses");
    assert_eq!(body["withdrawals"][0]["transfer_id"], "tx-1");
    assert!(body["price_token"].as_str().expect("token").contains('.'));
}

#[tokio::test]
async fn when_meridian_reconciles_by_reference_outcomes_keep_the_caller_ids() {
    // Given: Meridian knows transfers only by their deterministic reference
    let tx_ref = generate_tx_ref(OriginTag::Tipping, "tx-1", "acct-1", "BAT");
    let transport = Arc::new(ScriptedTransport::replying(vec![HttpResponse::ok_json(
        format!(r#"{{"result":"Ok","tx_ref":"{tx_ref}","status":"Completed"}}"#),
    )]));
    let meridian = meridian_client(transport.clone());

    // When: The batch is reconciled through the capability trait
    let batch = TransferBatch::from_rows(vec![("tx-1", "acct-1", "1.0", "tipping")], "BAT")
        .expect("valid batch");
    let outcomes = Custodian::check_status(&meridian, &batch)
        .await
        .expect("checks");

    // Then: The recomputed reference resolved, but the caller sees its id
    assert_eq!(outcomes[0].transfer_id, "tx-1");
    assert_eq!(outcomes[0].status, PayoutStatus::Complete);
    assert_eq!(transport.request_count(), 1);
}

// =============================================================================
// Provider Failures End to End
// =============================================================================

#[tokio::test]
async fn when_a_resubmission_conflicts_the_error_is_permanently_non_retryable() {
    // Given: The provider answers the withdraw call with a 409 conflict
    let dir = tempfile::tempdir().expect("tempdir");
    let transport = Arc::new(ScriptedTransport::replying(vec![
        token_response(),
        quote_response(),
        HttpResponse {
            status: 409,
            body: String::from(r#"{"message":"duplicate redemption"}"#),
        },
    ]));
    let torii = ToriiClient::new(torii_config(dir.path()), transport);

    // When: The batch is uploaded
    let batch = TransferBatch::from_rows(vec![("tx-1", "acct-1", "1.0", "tipping")], "BAT")
        .expect("valid batch");
    let error = torii
        .upload_bulk_payout(&batch)
        .await
        .expect_err("conflict must fail");

    // Then: The classification is permanent, not a retry candidate
    assert_eq!(error.kind(), CustodianErrorKind::DuplicateRedemption);
    assert_eq!(error.code(), "custodian.duplicate_redemption");
    assert!(!error.retryable());
    assert!(error.message().contains("duplicate redemption"));
}

#[tokio::test]
async fn when_a_success_response_carries_an_error_label_the_upload_fails() {
    // Given: A 2xx whose body still reports a provider-level error
    let dir = tempfile::tempdir().expect("tempdir");
    let transport = Arc::new(ScriptedTransport::replying(vec![
        token_response(),
        quote_response(),
        HttpResponse::ok_json(r#"{"label":"SESSION_TIME_OUT"}"#),
    ]));
    let torii = ToriiClient::new(torii_config(dir.path()), transport);

    let batch = TransferBatch::from_rows(vec![("tx-1", "acct-1", "1.0", "tipping")], "BAT")
        .expect("valid batch");
    let error = torii
        .upload_bulk_payout(&batch)
        .await
        .expect_err("soft error must surface");

    // Then: The soft error surfaces instead of a silent partial success
    assert_eq!(error.code(), "custodian.unknown_provider_error");
    assert!(error.message().contains("SESSION_TIME_OUT"));
}

#[tokio::test]
async fn when_the_transport_times_out_the_caller_is_told_to_retry() {
    // Given: The price call dies on the request deadline
    let dir = tempfile::tempdir().expect("tempdir");
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(token_response()),
        Err(HttpError::timeout("request timeout: deadline exceeded")),
    ]));
    let torii = ToriiClient::new(torii_config(dir.path()), transport);

    let batch = TransferBatch::from_rows(vec![("tx-1", "acct-1", "1.0", "tipping")], "BAT")
        .expect("valid batch");
    let error = torii
        .upload_bulk_payout(&batch)
        .await
        .expect_err("timeout must surface");

    assert_eq!(error.code(), "custodian.timeout");
    assert!(error.retryable());
}

// =============================================================================
// Registry Behavior
// =============================================================================

#[tokio::test]
async fn when_a_custodian_is_not_registered_resolution_fails_fast() {
    // Given: A mock-mode registry with nothing registered
    let registry = CustodianRegistryBuilder::new()
        .with_mock_mode()
        .build()
        .expect("builds");

    // When/Then: Resolution errors immediately and non-retryably
    let error = registry
        .require(CustodianId::Zenith)
        .expect_err("nothing is registered");
    assert_eq!(error.code(), "custodian.config");
    assert!(!error.retryable());
    assert!(error.message().contains("zenith"));
}

#[tokio::test]
async fn when_multiple_custodians_are_registered_each_resolves_by_id() {
    let dir = tempfile::tempdir().expect("tempdir");
    let torii = ToriiClient::new(
        torii_config(dir.path()),
        Arc::new(ScriptedTransport::replying(vec![])),
    );
    let meridian = meridian_client(Arc::new(ScriptedTransport::replying(vec![])));

    let registry = CustodianRegistry::new(vec![Arc::new(torii), Arc::new(meridian)]);

    assert_eq!(registry.len(), 2);
    assert_eq!(
        registry.ids(),
        vec![CustodianId::Meridian, CustodianId::Torii]
    );
    assert!(registry.require(CustodianId::Torii).is_ok());
    assert!(registry.require(CustodianId::Meridian).is_ok());
    assert!(registry.get(CustodianId::Scrip).is_none());
}

// =============================================================================
// Pacing And Batch Shaping
// =============================================================================

#[tokio::test]
async fn when_a_batch_outgrows_the_quota_the_overflow_chunk_is_buffered() {
    // Given: One submission of budget per window and a batch split in two
    let dir = tempfile::tempdir().expect("tempdir");
    let transport = Arc::new(ScriptedTransport::replying(vec![
        token_response(),
        quote_response(),
        HttpResponse::ok_json(
            r#"{"dry_run":false,"withdrawals":[
                {"transfer_id":"tx-1","transfer_status":"SUCCESS"},
                {"transfer_id":"tx-2","transfer_status":"SUCCESS"}
            ]}"#,
        ),
        HttpResponse::ok_json(
            r#"{"dry_run":false,"withdrawals":[{"transfer_id":"tx-3","transfer_status":"SUCCESS"}]}"#,
        ),
    ]));
    let torii = ToriiClient::new(torii_config(dir.path()), transport.clone());
    let queue = ThrottlingQueue::new(
        Duration::from_secs(300),
        1,
        BackoffPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_retries: 3,
        },
    );

    let batch = TransferBatch::from_rows(
        vec![
            ("tx-1", "acct-1", "1.0", "tipping"),
            ("tx-2", "acct-2", "2.0", "ad-rewards"),
            ("tx-3", "acct-3", "3.0", "tipping"),
        ],
        "BAT",
    )
    .expect("valid batch");
    let chunks = batch.chunked(2);

    // When: The head chunk takes the budget and goes out
    queue.acquire().expect("head chunk has budget");
    let head = TransferBatch::new(chunks[0].to_vec()).expect("head batch");
    let outcomes = torii.upload_bulk_payout(&head).await.expect("uploads");
    assert_eq!(outcomes.len(), 2);

    // Then: The tail chunk is buffered with a delay rather than dropped
    let delay = queue.acquire().expect_err("budget is spent");
    assert_eq!(delay, Duration::from_secs(1));
    assert_eq!(queue.pending_len(), 1);

    // When: The caller comes back after the delay and flushes the tail
    let tail = TransferBatch::new(chunks[1].to_vec()).expect("tail batch");
    let outcomes = torii.upload_bulk_payout(&tail).await.expect("uploads");
    queue.complete_one();

    // Then: The tail settles; bearer and cached quote were reused
    assert_eq!(outcomes[0].transfer_id, "tx-3");
    assert_eq!(outcomes[0].status, PayoutStatus::Complete);
    assert_eq!(queue.pending_len(), 0);
    assert_eq!(
        transport.request_count(),
        4,
        "token and price are fetched once, then reused"
    );
}

#[tokio::test]
async fn when_records_share_a_destination_they_merge_into_one_wire_item() {
    // Given: Two instructions for acct-1 and one for acct-2
    let batch = TransferBatch::from_rows(
        vec![
            ("tx-1", "acct-1", "1.5", "tipping"),
            ("tx-2", "acct-1", "2.25", "tipping"),
            ("tx-3", "acct-2", "4.0", "tipping"),
        ],
        "BAT",
    )
    .expect("valid batch");
    let collapsed = batch.collapse_by_destination().expect("collapse succeeds");
    let merged_id = collapsed.records()[0].id().to_owned();

    let dir = tempfile::tempdir().expect("tempdir");
    let transport = Arc::new(ScriptedTransport::replying(vec![
        token_response(),
        quote_response(),
        HttpResponse::ok_json(format!(
            r#"{{"dry_run":false,"withdrawals":[
                {{"transfer_id":"{merged_id}","transfer_status":"SUCCESS"}},
                {{"transfer_id":"tx-3","transfer_status":"SUCCESS"}}
            ]}}"#
        )),
    ]));
    let torii = ToriiClient::new(torii_config(dir.path()), transport.clone());

    // When: The collapsed batch is uploaded
    let outcomes = torii.upload_bulk_payout(&collapsed).await.expect("uploads");

    // Then: The wire carries one summed item per destination
    let requests = transport.recorded_requests();
    let body: serde_json::Value =
        serde_json::from_str(requests[2].body.as_deref().expect("bulk body"))
            .expect("bulk body parses");
    let withdrawals = body["withdrawals"].as_array().expect("withdrawals");
    assert_eq!(withdrawals.len(), 2);
    assert_eq!(withdrawals[0]["deposit_id"], "acct-1");
    assert_eq!(withdrawals[0]["amount"], 3.75);
    assert_eq!(withdrawals[0]["transfer_id"], merged_id.as_str());
    assert_eq!(withdrawals[1]["deposit_id"], "acct-2");
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].status, PayoutStatus::Complete);
}
