//! Public token lookups through the full intake flow.

mod common;

use common::*;

use coascan::secrets::{generate_public_token, TOKEN_LEN};
use coascan::{LookupResult, SubmissionStatus};

#[test]
fn test_unknown_and_malformed_tokens_are_indistinguishable() {
    let harness = TestHarness::new();
    let reg = harness.upload_and_submit("coa.txt", "text/plain", LOT_AND_DATE_ONLY.as_bytes());

    let unknown = generate_public_token().unwrap();
    let mut near_miss = reg.public_token.clone();
    near_miss.pop();
    near_miss.push(if reg.public_token.ends_with('A') { 'B' } else { 'A' });

    let candidates = vec![
        unknown,
        near_miss,
        String::new(),
        "not-a-token".to_string(),
        "=".repeat(TOKEN_LEN),
        format!("{}x", reg.public_token),
        reg.submission_id.clone(),
    ];
    for token in &candidates {
        assert_eq!(
            harness.lookup.by_token(token).unwrap(),
            LookupResult::NotFound,
            "token {token:?}"
        );
    }
}

#[test]
fn test_status_progression() {
    let harness = TestHarness::new();
    let reg = harness.upload("coa.txt", "text/plain", LOT_AND_DATE_ONLY.as_bytes());

    let pending = harness.lookup.by_token(&reg.public_token).unwrap();
    assert_eq!(pending.status(), Some(SubmissionStatus::Queued));

    let token = harness.intake.submit(&reg.submission_id).unwrap();
    assert_eq!(token, reg.public_token);
    let processing = harness.lookup.by_token(&token).unwrap();
    assert_eq!(processing.status(), Some(SubmissionStatus::Processing));

    harness
        .dispatcher(SettingsBuilder::new().build())
        .drain(None)
        .unwrap();
    let done = harness.lookup.by_token(&token).unwrap();
    assert_eq!(done.status(), Some(SubmissionStatus::Done));
}

#[test]
fn test_tokens_are_unique_per_submission() {
    let harness = TestHarness::new();
    let a = harness.upload("a.txt", "text/plain", b"Lot: A-1\n");
    let b = harness.upload("b.txt", "text/plain", b"Lot: B-2\n");
    assert_ne!(a.public_token, b.public_token);
    assert_ne!(a.public_token, a.submission_id);
    assert_eq!(a.public_token.len(), TOKEN_LEN);
}
