#![no_main]

use issuebridge_discord::{IssueSubmission, ISSUE_BODY_INPUT_ID, ISSUE_TITLE_INPUT_ID};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let (title, body) = raw.split_once('\n').unwrap_or((raw.as_ref(), ""));

    match IssueSubmission::from_fields([(ISSUE_TITLE_INPUT_ID, title), (ISSUE_BODY_INPUT_ID, body)]) {
        Ok(submission) => {
            assert!(!submission.title.is_empty());
            assert_eq!(submission.title, submission.title.trim());
            assert_eq!(submission.body, body);
        }
        Err(error) => assert!(title.trim().is_empty(), "{error}"),
    }
});
