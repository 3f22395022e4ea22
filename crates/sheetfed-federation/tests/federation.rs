//! 跨域引用的端到端行为：实时解析、远端宕机后的缓存重算，以及从未缓存时的不可达。

mod support;

use sheetfed_core::{ErrorKind, SpreadsheetsService, UsersService};
use sheetfed_federation::LoopbackNetwork;

use support::{PASSWORD, TestDomain, link, sheet, spawn_domain, user};

fn row(values: &[&str]) -> Vec<Vec<String>> {
    vec![values.iter().map(|value| (*value).to_owned()).collect()]
}

/// 在 `beta` 中创建 bob 的源表（`A1=40`, `A2=A1/20`）并共享给 `ana@alpha`。
async fn shared_source(beta: &TestDomain) -> String {
    beta.users.create_user(user("bob", "Bob Stone")).await.unwrap();
    let source = beta
        .sheets
        .create_spreadsheet(sheet("bob", 2, 1, &[("A1", "40"), ("A2", "=A1/20")]), PASSWORD)
        .await
        .unwrap();
    beta.sheets
        .share_spreadsheet(&source, "ana@alpha", PASSWORD)
        .await
        .unwrap();
    source
}

/// 在 `alpha` 中创建 ana 的派生表，引用 `beta` 源表的 `A1:A2`。
async fn derived_sheet(alpha: &TestDomain, source: &str) -> String {
    alpha.users.create_user(user("ana", "Ana Lima")).await.unwrap();
    let formula = format!("=SUM('beta/{source}'!A1:A2)");
    alpha
        .sheets
        .create_spreadsheet(
            sheet("ana", 1, 2, &[("A1", formula.as_str()), ("B1", "=A1*2")]),
            PASSWORD,
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn cross_domain_imports_fall_back_to_recomputed_cache() {
    let network = LoopbackNetwork::new();
    let alpha = spawn_domain(&network, "alpha");
    let beta = spawn_domain(&network, "beta");
    link(&[&alpha, &beta]);

    let source = shared_source(&beta).await;
    let derived = derived_sheet(&alpha, &source).await;

    let live = alpha
        .sheets
        .get_spreadsheet_values(&derived, "ana", PASSWORD)
        .await
        .unwrap();
    assert_eq!(live, row(&["42", "84"]));

    alpha
        .sheets_context
        .spreadsheets_client("beta")
        .unwrap()
        .refresh()
        .await;

    beta.sheets
        .update_cell(&source, "A1", "60", "bob", PASSWORD)
        .await
        .unwrap();
    let updated = alpha
        .sheets
        .get_spreadsheet_values(&derived, "ana", PASSWORD)
        .await
        .unwrap();
    assert_eq!(updated, row(&["63", "126"]));

    beta.set_reachable(&network, false);
    let offline = alpha
        .sheets
        .get_spreadsheet_values(&derived, "ana", PASSWORD)
        .await
        .unwrap();
    assert_eq!(offline, row(&["42", "84"]));

    alpha.shutdown().await;
    beta.shutdown().await;
}

#[tokio::test]
async fn never_cached_imports_are_unavailable_while_the_remote_domain_is_down() {
    let network = LoopbackNetwork::new();
    let alpha = spawn_domain(&network, "alpha");
    let beta = spawn_domain(&network, "beta");
    link(&[&beta]);
    let source = shared_source(&beta).await;

    beta.set_reachable(&network, false);
    link(&[&alpha, &beta]);
    let derived = derived_sheet(&alpha, &source).await;

    let err = alpha
        .sheets
        .get_spreadsheet_values(&derived, "ana", PASSWORD)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);

    beta.set_reachable(&network, true);
    let recovered = alpha
        .sheets
        .get_spreadsheet_values(&derived, "ana", PASSWORD)
        .await
        .unwrap();
    assert_eq!(recovered, row(&["42", "84"]));

    alpha.shutdown().await;
    beta.shutdown().await;
}

#[tokio::test]
async fn unshared_remote_sheets_cannot_be_imported() {
    let network = LoopbackNetwork::new();
    let alpha = spawn_domain(&network, "alpha");
    let beta = spawn_domain(&network, "beta");
    link(&[&alpha, &beta]);

    let source = shared_source(&beta).await;
    let derived = derived_sheet(&alpha, &source).await;
    beta.sheets
        .unshare_spreadsheet(&source, "ana@alpha", PASSWORD)
        .await
        .unwrap();

    let err = alpha
        .sheets
        .get_spreadsheet_values(&derived, "ana", PASSWORD)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    alpha.shutdown().await;
    beta.shutdown().await;
}

#[tokio::test]
async fn imports_from_undiscovered_domains_are_unavailable() {
    let network = LoopbackNetwork::new();
    let alpha = spawn_domain(&network, "alpha");
    link(&[&alpha]);
    alpha.users.create_user(user("ana", "Ana Lima")).await.unwrap();

    let derived = alpha
        .sheets
        .create_spreadsheet(sheet("ana", 1, 1, &[("A1", "='gamma/s-1'!A1")]), PASSWORD)
        .await
        .unwrap();
    let err = alpha
        .sheets
        .get_spreadsheet_values(&derived, "ana", PASSWORD)
        .await
        .unwrap_err();
    assert!(err.is_unavailable());

    alpha.shutdown().await;
}

#[tokio::test]
async fn remote_readers_are_authenticated_by_the_sheet_domain() {
    let network = LoopbackNetwork::new();
    let alpha = spawn_domain(&network, "alpha");
    let beta = spawn_domain(&network, "beta");
    link(&[&alpha, &beta]);

    let source = shared_source(&beta).await;
    let via_alpha = alpha.sheets_context.spreadsheets_client("beta").unwrap();

    let values = via_alpha
        .get_referenced_values(&source, "ana@alpha", "A2")
        .await
        .unwrap();
    assert_eq!(values, row(&["2"]));

    let err = via_alpha
        .get_referenced_values(&source, "zoe@alpha", "A2")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    alpha.shutdown().await;
    beta.shutdown().await;
}
