mod common;

use std::time::Duration;

use common::{LspTestHarness, TIMEOUT};
use indoc::indoc;
use serde_json::json;
use tower_lsp::lsp_types::{DiagnosticSeverity, Position, Range};

/// Open a file with an error → diagnostics arrive → fix → diagnostics clear.
/// This is the core temporal test that unit tests can't exercise.
#[tokio::test]
async fn diagnostics_appear_and_clear() {
    let mut h = LspTestHarness::new().await;

    h.open("test.mm1", "sort wff;\nbogus x;\n").await;

    let diags = h.wait_for_version("test.mm1", 1, TIMEOUT).await.unwrap();
    assert_eq!(diags.diagnostics.len(), 1, "{:?}", diags.diagnostics);
    let diag = &diags.diagnostics[0];
    assert_eq!(diag.severity, Some(DiagnosticSeverity::ERROR));
    assert_eq!(diag.range.start, Position::new(1, 0));
    assert_eq!(diag.source.as_deref(), Some("mm1"));
    assert!(diag.message.contains("bogus"), "{}", diag.message);

    let v2 = h.edit("test.mm1", "sort wff;\nterm t: wff;\n").await;

    let diags = h.wait_for_version("test.mm1", v2, TIMEOUT).await.unwrap();
    assert!(
        diags.diagnostics.is_empty(),
        "expected no diagnostics after fix, got: {:?}",
        diags.diagnostics,
    );

    h.shutdown().await;
}

/// Rapid edits: whatever was published in between, the final version's
/// diagnostics arrive and describe the final text.
#[tokio::test]
async fn rapid_edits_publish_final_version() {
    let mut h = LspTestHarness::new().await;
    h.open("test.mm1", "sort wff;\n").await;
    let _ = h.wait_for_version("test.mm1", 1, TIMEOUT).await;

    for i in 0..10 {
        let text = format!("sort wff;\nterm t{i}: wff;\n");
        h.edit("test.mm1", &text).await;
    }
    // The last edit leaves an unknown sort behind.
    let last = h.edit("test.mm1", "sort wff;\nterm bad: nat;\n").await;

    let diags = h.wait_for_version("test.mm1", last, TIMEOUT).await.unwrap();
    assert_eq!(diags.diagnostics.len(), 1, "{:?}", diags.diagnostics);
    assert!(diags.diagnostics[0].message.contains("unknown sort `nat`"));

    h.shutdown().await;
}

/// Publications for one document never go backwards in version.
#[tokio::test]
async fn publications_are_monotonic() {
    let mut h = LspTestHarness::new().await;
    h.open("test.mm1", "sort wff;\n").await;
    for i in 0..5 {
        h.edit("test.mm1", &format!("sort s{i};\n")).await;
    }
    let final_version = 6;

    let mut seen = Vec::new();
    while let Some(diags) = h.wait_for_diagnostics("test.mm1", TIMEOUT).await {
        seen.push(diags.version.unwrap());
        if diags.version == Some(final_version) {
            break;
        }
    }
    assert_eq!(seen.last(), Some(&final_version));
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");

    h.shutdown().await;
}

/// Closing a file with errors should publish empty diagnostics.
#[tokio::test]
async fn close_clears_diagnostics() {
    let mut h = LspTestHarness::new().await;

    h.open("test.mm1", "term t: nat;\n").await;
    let diags = h.wait_for_version("test.mm1", 1, TIMEOUT).await.unwrap();
    assert!(!diags.diagnostics.is_empty());

    h.close("test.mm1").await;

    let diags = h.wait_for_diagnostics("test.mm1", TIMEOUT).await.unwrap();
    assert_eq!(diags.version, None);
    assert!(
        diags.diagnostics.is_empty(),
        "expected diagnostics cleared on close, got: {:?}",
        diags.diagnostics,
    );

    h.shutdown().await;
}

/// A duplicate declaration points back at the first one.
#[tokio::test]
async fn duplicate_sort_has_related_information() {
    let mut h = LspTestHarness::new().await;
    h.open(
        "test.mm1",
        indoc! {"
            sort wff;
            sort wff;
        "},
    )
    .await;

    let diags = h.wait_for_version("test.mm1", 1, TIMEOUT).await.unwrap();
    let dup = diags
        .diagnostics
        .iter()
        .find(|d| d.message.contains("duplicate sort"))
        .expect("should have a 'duplicate sort' diagnostic");
    assert_eq!(dup.range.start, Position::new(1, 5));

    let related = dup.related_information.as_ref().unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].message, "first declared here");
    assert_eq!(related[0].location.uri, LspTestHarness::uri("test.mm1"));
    assert_eq!(related[0].location.range.start, Position::new(0, 5));

    h.shutdown().await;
}

/// Ranged edits are applied against the server's copy of the text.
#[tokio::test]
async fn incremental_edit_fixes_error() {
    let mut h = LspTestHarness::new().await;
    h.open("test.mm1", "sort wff;\nterm t: nat;\n").await;
    let diags = h.wait_for_version("test.mm1", 1, TIMEOUT).await.unwrap();
    assert_eq!(diags.diagnostics.len(), 1);

    // Replace `nat` with `wff`.
    let range = Range::new(Position::new(1, 8), Position::new(1, 11));
    let v2 = h.edit_range("test.mm1", range, "wff").await;

    let diags = h.wait_for_version("test.mm1", v2, TIMEOUT).await.unwrap();
    assert!(diags.diagnostics.is_empty(), "{:?}", diags.diagnostics);

    h.shutdown().await;
}

/// `diagnostics.maxCount` caps each publication.
#[tokio::test]
async fn max_count_from_initialization_options() {
    let mut h = LspTestHarness::with_capabilities(
        json!({}),
        json!({ "diagnostics": { "maxCount": 2 } }),
    )
    .await;

    h.open("test.mm1", "term a: x;\nterm b: y;\nterm c: z;\nterm d: w;\n")
        .await;
    let diags = h.wait_for_version("test.mm1", 1, TIMEOUT).await.unwrap();
    assert_eq!(diags.diagnostics.len(), 2);
    assert!(diags.diagnostics[0].message.contains("`x`"));
    assert!(diags.diagnostics[1].message.contains("`y`"));

    h.shutdown().await;
}

/// Turning diagnostics off silences publication for later edits.
#[tokio::test]
async fn disabled_diagnostics_are_not_published() {
    let mut h = LspTestHarness::new().await;
    h.open("test.mm1", "sort wff;\n").await;
    let _ = h.wait_for_version("test.mm1", 1, TIMEOUT).await.unwrap();

    h.change_configuration(json!({ "mm1": { "diagnostics": { "enable": false } } }))
        .await;
    h.edit("test.mm1", "term t: nat;\n").await;

    let diags = h
        .wait_for_diagnostics("test.mm1", Duration::from_millis(300))
        .await;
    assert!(diags.is_none(), "unexpected publication: {diags:?}");

    h.shutdown().await;
}
