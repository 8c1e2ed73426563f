#![no_main]

use issuebridge_identity::{normalize_installation_id, CorrelationSigner};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(signer) = CorrelationSigner::new(b"fuzz-correlation-secret") else {
        return;
    };
    let raw = String::from_utf8_lossy(data);

    if let Some(token) = signer.open(&raw) {
        assert!(!token.installation_id.is_empty());
        assert!(token.installation_id.bytes().all(|byte| byte.is_ascii_digit()));
        assert_eq!(signer.seal(&token), raw.trim());
    }

    let digits = raw
        .chars()
        .filter(char::is_ascii_digit)
        .take(18)
        .collect::<String>();
    if let Some(installation_id) = normalize_installation_id(Some(&digits)) {
        let issued_at = data.len() as u64;
        let token = signer.mint(&installation_id, issued_at);
        assert_eq!(signer.open(&signer.seal(&token)), Some(token));
    }
});
