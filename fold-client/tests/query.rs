mod common;

use std::time::Duration;

use fold_core::{
    BranchSelection, FoldError, QueryOptions, RemoteErrorItem, RemoteResponse, RequestStatus,
    Variables,
};
use futures::StreamExt;
use serde_json::json;

use common::{
    create_client, create_test_options, fund_query, funds_data, funds_query, logged_in_client,
    vars, MockTransport, ScriptedAuth,
};

fn statuses(states: &[fold_client::QueryState]) -> Vec<RequestStatus> {
    states.iter().map(|s| s.status).collect()
}

/// Q1. Scope is injected into every request
#[tokio::test]
async fn test_scope_is_injected_into_request_variables() {
    let transport = MockTransport::new();
    transport.respond("GetFunds", funds_data());
    let client = logged_in_client(transport.clone(), ScriptedAuth::new()).await;

    let states: Vec<_> = client
        .query(&funds_query(), Variables::new(), QueryOptions::new())
        .collect()
        .await;

    assert_eq!(statuses(&states), vec![RequestStatus::Loading, RequestStatus::Success]);
    assert_eq!(states[1].data.as_deref(), Some(&funds_data()));

    let sent = transport.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].variables["organisationId"], json!("org-1"));
    assert_eq!(sent[0].variables["branchId"], json!("br-1"));
    assert_eq!(sent[0].credential, "token-0");
}

/// Q2. No session means no network call
#[tokio::test]
async fn test_unscoped_request_never_dispatches() {
    let transport = MockTransport::new();
    transport.respond("GetFunds", funds_data());
    let client = create_client(transport.clone(), ScriptedAuth::new(), create_test_options());

    let states: Vec<_> = client
        .query(&funds_query(), Variables::new(), QueryOptions::new())
        .collect()
        .await;

    assert_eq!(states.len(), 1);
    assert!(matches!(
        states[0].error,
        Some(FoldError::UnscopedRequest(_))
    ));
    assert_eq!(transport.requests().len(), 0);
}

/// Q3. Concurrent identical queries share one network call
#[tokio::test]
async fn test_concurrent_identical_queries_are_deduplicated() {
    let transport = MockTransport::new();
    transport.respond("GetFunds", funds_data());
    transport.set_delay(Duration::from_millis(20));
    let client = logged_in_client(transport.clone(), ScriptedAuth::new()).await;

    let (a, b) = tokio::join!(
        client.query(&funds_query(), Variables::new(), QueryOptions::network_only()).last(),
        client.query(&funds_query(), Variables::new(), QueryOptions::network_only()).last(),
    );

    assert!(a.is_success());
    assert!(b.is_success());
    assert_eq!(a.data, b.data);
    assert_eq!(transport.calls("GetFunds"), 1);
    assert_eq!(client.inflight_requests(), 0);
}

/// Q4. Cache-first serves a fresh entry without the network
#[tokio::test]
async fn test_cache_first_hit_skips_network() {
    let transport = MockTransport::new();
    transport.respond("GetFunds", funds_data());
    let client = logged_in_client(transport.clone(), ScriptedAuth::new()).await;

    let _ = client
        .query(&funds_query(), Variables::new(), QueryOptions::cache_first())
        .last()
        .await;
    let states: Vec<_> = client
        .query(&funds_query(), Variables::new(), QueryOptions::cache_first())
        .collect()
        .await;

    assert_eq!(statuses(&states), vec![RequestStatus::Success]);
    assert_eq!(states[0].data.as_deref(), Some(&funds_data()));
    assert_eq!(transport.calls("GetFunds"), 1);
}

/// Q5. Cache-and-network without an entry: Loading, Success, then cached
#[tokio::test]
async fn test_cache_and_network_miss_populates_cache() {
    let transport = MockTransport::new();
    transport.respond("GetFunds", funds_data());
    let client = logged_in_client(transport.clone(), ScriptedAuth::new()).await;

    let states: Vec<_> = client
        .query(&funds_query(), Variables::new(), QueryOptions::cache_and_network())
        .collect()
        .await;

    assert_eq!(statuses(&states), vec![RequestStatus::Loading, RequestStatus::Success]);
    let cached = client
        .queries()
        .peek(&funds_query(), &Variables::new())
        .unwrap();
    assert_eq!(cached.as_deref(), Some(&funds_data()));
}

/// Q6. Cache-and-network with an entry: cached Success, then fresh Success
#[tokio::test]
async fn test_cache_and_network_hit_emits_cached_then_fresh() {
    let transport = MockTransport::new();
    transport.respond("GetFunds", funds_data());
    let client = logged_in_client(transport.clone(), ScriptedAuth::new()).await;
    let _ = client
        .query(&funds_query(), Variables::new(), QueryOptions::new())
        .last()
        .await;

    let fresh = json!({ "funds": [{ "id": "f-1", "name": "General" }, { "id": "f-2", "name": "Building" }] });
    transport.respond("GetFunds", fresh.clone());
    let states: Vec<_> = client
        .query(&funds_query(), Variables::new(), QueryOptions::cache_and_network())
        .collect()
        .await;

    assert_eq!(statuses(&states), vec![RequestStatus::Success, RequestStatus::Success]);
    assert_eq!(states[0].data.as_deref(), Some(&funds_data()));
    assert_eq!(states[1].data.as_deref(), Some(&fresh));
    assert_eq!(transport.calls("GetFunds"), 2);
}

/// Q7. A failed revalidation keeps the cached data alongside the error
#[tokio::test]
async fn test_cache_and_network_failure_keeps_cached_data() {
    let transport = MockTransport::new();
    transport.respond("GetFunds", funds_data());
    let client = logged_in_client(transport.clone(), ScriptedAuth::new()).await;
    let _ = client
        .query(&funds_query(), Variables::new(), QueryOptions::new())
        .last()
        .await;

    transport.script("GetFunds", Err(FoldError::network("connection reset")));
    let last = client
        .query(&funds_query(), Variables::new(), QueryOptions::cache_and_network())
        .last()
        .await;

    assert!(last.is_error());
    assert_eq!(last.data.as_deref(), Some(&funds_data()));
    assert_eq!(client.cached_entries(), 1);
}

/// Q8. Remote errors surface verbatim and never reach the cache
#[tokio::test]
async fn test_remote_errors_are_not_cached() {
    let transport = MockTransport::new();
    transport.script(
        "GetFunds",
        Ok(RemoteResponse::errors(vec![RemoteErrorItem::new("fund ledger offline")])),
    );
    let client = logged_in_client(transport.clone(), ScriptedAuth::new()).await;

    let last = client
        .query(&funds_query(), Variables::new(), QueryOptions::new())
        .last()
        .await;

    match last.error {
        Some(FoldError::Remote { errors }) => assert_eq!(errors[0].message, "fund ledger offline"),
        other => panic!("expected remote error, got {other:?}"),
    }
    assert_eq!(client.cached_entries(), 0);
}

/// Q9. Dropping a subscription does not cancel the shared call
#[tokio::test]
async fn test_dropped_subscription_keeps_call_alive() {
    let transport = MockTransport::new();
    transport.respond("GetFunds", funds_data());
    transport.set_delay(Duration::from_millis(50));
    let client = logged_in_client(transport.clone(), ScriptedAuth::new()).await;

    let mut first = client.query(&funds_query(), Variables::new(), QueryOptions::network_only());
    assert_eq!(first.next().await.map(|s| s.status), Some(RequestStatus::Loading));
    // Attach to the dedup group; the call is still running.
    assert!(tokio::time::timeout(Duration::from_millis(5), first.next())
        .await
        .is_err());
    assert_eq!(client.inflight_requests(), 1);

    let second = client.query(&funds_query(), Variables::new(), QueryOptions::network_only());
    drop(first);
    let last = second.last().await;

    assert!(last.is_success());
    assert_eq!(transport.calls("GetFunds"), 1);
    assert_eq!(client.cached_entries(), 1);
}

/// Q10. Timeouts are network errors and are not retried
#[tokio::test]
async fn test_timeout_is_network_error() {
    let transport = MockTransport::new();
    transport.respond("GetFunds", funds_data());
    transport.set_delay(Duration::from_millis(200));
    let client = logged_in_client(transport.clone(), ScriptedAuth::new()).await;

    let last = client
        .query(
            &funds_query(),
            Variables::new(),
            QueryOptions::network_only().timeout(Duration::from_millis(20)),
        )
        .last()
        .await;

    let error = last.error.expect("timed out");
    assert!(error.is_timeout());
    assert_eq!(transport.calls("GetFunds"), 1);
    assert_eq!(client.cached_entries(), 0);
}

/// Q11. An expired credential is refreshed once and the call retried
#[tokio::test]
async fn test_auth_expired_refreshes_and_retries() {
    let transport = MockTransport::new();
    transport.respond("GetFunds", funds_data());
    transport.expire_token("token-0");
    let auth = ScriptedAuth::new();
    auth.refresh_to("token-1");
    let client = logged_in_client(transport.clone(), auth.clone()).await;

    let last = client
        .query(&funds_query(), Variables::new(), QueryOptions::new())
        .last()
        .await;

    assert!(last.is_success());
    assert_eq!(auth.refresh_calls(), 1);
    let sent = transport.requests();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].credential, "token-0");
    assert_eq!(sent[1].credential, "token-1");
    assert_eq!(client.session().unwrap().credential_token, "token-1");
}

/// Q12. A retry rejected again ends the session with the original error
#[tokio::test]
async fn test_retry_rejected_again_ends_session() {
    let transport = MockTransport::new();
    transport.respond("GetFunds", funds_data());
    transport.expire_token("token-0");
    transport.expire_token("token-1");
    let auth = ScriptedAuth::new();
    auth.refresh_to("token-1");
    let client = logged_in_client(transport.clone(), auth.clone()).await;

    let last = client
        .query(&funds_query(), Variables::new(), QueryOptions::new())
        .last()
        .await;

    assert_eq!(last.error, Some(FoldError::auth_expired("jwt expired")));
    assert_eq!(auth.refresh_calls(), 1);
    assert_eq!(transport.calls("GetFunds"), 2);
    assert!(client.session().is_none());
}

/// Q13. Without refresh-retry the expiry surfaces as-is
#[tokio::test]
async fn test_auth_expired_without_retry_surfaces() {
    let transport = MockTransport::new();
    transport.expire_token("token-0");
    let auth = ScriptedAuth::new();
    let mut options = create_test_options();
    options.refresh_retry = false;
    let client = create_client(transport.clone(), auth.clone(), options);
    client
        .login(&fold_client::fold_auth::Credentials::password("ada", "secret"))
        .await
        .unwrap();

    let last = client
        .query(&funds_query(), Variables::new(), QueryOptions::new())
        .last()
        .await;

    assert!(last.error.unwrap().is_auth_expired());
    assert_eq!(auth.refresh_calls(), 0);
    assert_eq!(transport.calls("GetFunds"), 1);
    assert!(client.session().is_some());
}

/// Q14. A missing required variable fails before dispatch
#[tokio::test]
async fn test_missing_required_variable_fails_locally() {
    let transport = MockTransport::new();
    let client = logged_in_client(transport.clone(), ScriptedAuth::new()).await;

    let states: Vec<_> = client
        .query(&fund_query(), Variables::new(), QueryOptions::new())
        .collect()
        .await;

    assert_eq!(statuses(&states), vec![RequestStatus::Error]);
    assert!(matches!(states[0].error, Some(FoldError::InvalidVariables(_))));
    assert!(transport.requests().is_empty());
}

/// Q15. A branch outside the active organisation is rejected locally
#[tokio::test]
async fn test_foreign_branch_selection_is_scope_mismatch() {
    let transport = MockTransport::new();
    transport.respond("GetFunds", funds_data());
    let client = logged_in_client(transport.clone(), ScriptedAuth::new()).await;
    client.select_branch(BranchSelection::new("org-2", "br-9"));

    let last = client
        .query(&funds_query(), Variables::new(), QueryOptions::new())
        .last()
        .await;

    assert!(last.error.unwrap().is_scope_error());
    assert!(transport.requests().is_empty());
}

/// Q16. Each branch gets its own cache entry
#[tokio::test]
async fn test_branch_selection_changes_request_key() {
    let transport = MockTransport::new();
    transport.respond("GetFunds", funds_data());
    let client = logged_in_client(transport.clone(), ScriptedAuth::new()).await;

    let _ = client
        .query(&funds_query(), Variables::new(), QueryOptions::new())
        .last()
        .await;
    client.select_branch(BranchSelection::new("org-1", "br-2"));
    let _ = client
        .query(&funds_query(), Variables::new(), QueryOptions::new())
        .last()
        .await;

    assert_eq!(transport.calls("GetFunds"), 2);
    assert_eq!(client.cached_entries(), 2);
    assert_eq!(transport.requests()[1].variables["branchId"], json!("br-2"));
}

/// Q17. Typed fetch decodes the final state
#[tokio::test]
async fn test_fetch_decodes_into_type() {
    #[derive(serde::Deserialize)]
    struct Fund {
        id: String,
    }
    #[derive(serde::Deserialize)]
    struct Funds {
        funds: Vec<Fund>,
    }

    let transport = MockTransport::new();
    transport.respond("GetFund", json!({ "fund": { "id": "f-7", "name": "Mission" } }));
    transport.respond("GetFunds", funds_data());
    let client = logged_in_client(transport.clone(), ScriptedAuth::new()).await;

    let funds: Funds = client
        .fetch(&funds_query(), Variables::new(), QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(funds.funds[0].id, "f-1");

    let one: serde_json::Value = client
        .fetch(&fund_query(), vars(json!({ "fundId": "f-7" })), QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(one["fund"]["id"], json!("f-7"));
}

/// Q18. A cache-first hit is served while a refetch of the same key fails
#[tokio::test]
async fn test_cache_first_hit_ignores_inflight_refetch() {
    let transport = MockTransport::new();
    transport.respond("GetFunds", funds_data());
    let client = logged_in_client(transport.clone(), ScriptedAuth::new()).await;
    let warm = client
        .query(&funds_query(), Variables::new(), QueryOptions::new())
        .last()
        .await;
    assert!(warm.is_success());

    // Arrange: a slow refetch that will fail
    transport.set_delay(Duration::from_millis(30));
    transport.script("GetFunds", Err(FoldError::network("boom")));
    let refetch = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .query(&funds_query(), Variables::new(), QueryOptions::network_only())
                .last()
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(client.inflight_requests(), 1);

    // Act
    let states: Vec<_> = client
        .query(&funds_query(), Variables::new(), QueryOptions::cache_first())
        .collect()
        .await;

    // Assert
    assert_eq!(statuses(&states), vec![RequestStatus::Success]);
    assert_eq!(states[0].data.as_deref(), Some(&funds_data()));
    let failed = refetch.await.unwrap();
    assert_eq!(failed.error, Some(FoldError::network("boom")));
    assert_eq!(transport.calls("GetFunds"), 2);
    assert_eq!(client.cached_entries(), 1);
}

/// Q19. A retry failing for another reason still surfaces the expiry
#[tokio::test]
async fn test_retry_network_failure_surfaces_original_error() {
    let transport = MockTransport::new();
    transport.respond("GetFunds", funds_data());
    transport.expire_token("token-0");
    transport.script("GetFunds", Err(FoldError::network("connection reset")));
    let auth = ScriptedAuth::new();
    auth.refresh_to("token-1");
    let client = logged_in_client(transport.clone(), auth.clone()).await;

    let last = client
        .query(&funds_query(), Variables::new(), QueryOptions::new())
        .last()
        .await;

    assert_eq!(last.error, Some(FoldError::auth_expired("jwt expired")));
    assert_eq!(auth.refresh_calls(), 1);
    assert_eq!(transport.calls("GetFunds"), 2);
    // Only a failed refresh or a second expiry ends the session.
    assert_eq!(client.session().unwrap().credential_token, "token-1");
}
