//! Webhook signature verification.
//!
//! HMAC-SHA256 over `"{timestamp}.{payload}"` with the shared signing secret,
//! compared in constant time, plus a replay window on the signed timestamp.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::errors::WebhookError;
use super::event::ProcessorEvent;

/// Maximum allowed age for webhook events (5 minutes).
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Maximum allowed clock skew for future events (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed components of the signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when the signature was generated.
    pub timestamp: i64,
    /// v1 signatures. The processor sends several while a secret is rolled.
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses a header of the form `t=<timestamp>,v1=<hex>[,v1=<hex>...]`.
    ///
    /// Unknown keys (`v0`, future schemes) are skipped.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| WebhookError::ParseError("invalid header format".to_string()))?;

            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        WebhookError::ParseError("invalid timestamp".to_string())
                    })?);
                }
                "v1" => {
                    v1_signatures.push(hex::decode(value).map_err(|_| {
                        WebhookError::ParseError("invalid v1 signature hex".to_string())
                    })?);
                }
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| WebhookError::ParseError("missing timestamp".to_string()))?;
        if v1_signatures.is_empty() {
            return Err(WebhookError::ParseError("missing v1 signature".to_string()));
        }

        Ok(SignatureHeader {
            timestamp,
            v1_signatures,
        })
    }
}

/// Verifies webhook requests against the shared signing secret.
pub struct WebhookVerifier {
    secret: SecretString,
}

impl WebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verifies the signature and parses the event, using the current time.
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<ProcessorEvent, WebhookError> {
        self.verify_and_parse_at(payload, signature_header, chrono::Utc::now().timestamp())
    }

    /// Verifies the signature as of `now_secs` and parses the event.
    ///
    /// Nothing in the payload is interpreted before the signature matches.
    pub fn verify_and_parse_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now_secs: i64,
    ) -> Result<ProcessorEvent, WebhookError> {
        if signature_header.trim().is_empty() {
            return Err(WebhookError::MissingSignature);
        }
        let header = SignatureHeader::parse(signature_header)?;

        validate_timestamp(header.timestamp, now_secs)?;

        let expected = self.compute_signature(header.timestamp, payload)?;
        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate));
        if !matched {
            return Err(WebhookError::InvalidSignature);
        }

        serde_json::from_slice(payload).map_err(|e| WebhookError::ParseError(e.to_string()))
    }

    fn compute_signature(&self, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, WebhookError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn validate_timestamp(timestamp: i64, now_secs: i64) -> Result<(), WebhookError> {
    let age = now_secs - timestamp;

    if age > MAX_EVENT_AGE_SECS {
        return Err(WebhookError::TimestampOutOfRange);
    }
    if age < -MAX_CLOCK_SKEW_SECS {
        return Err(WebhookError::InvalidTimestamp);
    }
    Ok(())
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Signs `payload` the way the processor does; used by test fixtures.
#[cfg(test)]
pub fn sign_test_payload(secret: &str, timestamp: i64, payload: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "whsec_test_secret_12345";
    const NOW: i64 = 1_705_276_800;
    const PAYLOAD: &str = r#"{"id":"evt_1","type":"payment_intent.succeeded","created":1705276800,"data":{"object":{"id":"pi_1"}},"livemode":false}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SecretString::new(TEST_SECRET.to_string()))
    }

    // ══════════════════════════════════════════════════════════════
    // Header parsing
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parse_header_with_single_v1() {
        let header = SignatureHeader::parse(&format!("t=1234567890,v1={}", "a".repeat(64))).unwrap();
        assert_eq!(header.timestamp, 1234567890);
        assert_eq!(header.v1_signatures.len(), 1);
        assert_eq!(header.v1_signatures[0].len(), 32);
    }

    #[test]
    fn parse_header_collects_every_v1_and_skips_v0() {
        let raw = format!("t=1,v1={},v0={},v1={}", "a".repeat(64), "b".repeat(64), "c".repeat(64));
        let header = SignatureHeader::parse(&raw).unwrap();
        assert_eq!(header.v1_signatures.len(), 2);
    }

    #[test]
    fn parse_header_rejects_malformed_input() {
        for raw in ["t1234", "v1=abcd", "t=123", "t=abc,v1=aa", "t=1,v1=zz"] {
            assert!(
                matches!(SignatureHeader::parse(raw), Err(WebhookError::ParseError(_))),
                "{} should not parse",
                raw
            );
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Verification
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn valid_signature_yields_event() {
        let header = sign_test_payload(TEST_SECRET, NOW, PAYLOAD);
        let event = verifier()
            .verify_and_parse_at(PAYLOAD.as_bytes(), &header, NOW)
            .unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.object_id(), Some("pi_1"));
    }

    #[test]
    fn any_matching_v1_is_accepted() {
        let good = sign_test_payload(TEST_SECRET, NOW, PAYLOAD);
        let good_hex = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", NOW, "a".repeat(64), good_hex);
        assert!(verifier()
            .verify_and_parse_at(PAYLOAD.as_bytes(), &header, NOW)
            .is_ok());
    }

    #[test]
    fn empty_header_is_missing_signature() {
        assert!(matches!(
            verifier().verify_and_parse_at(PAYLOAD.as_bytes(), "  ", NOW),
            Err(WebhookError::MissingSignature)
        ));
    }

    #[test]
    fn wrong_secret_fails() {
        let header = sign_test_payload("whsec_other", NOW, PAYLOAD);
        assert!(matches!(
            verifier().verify_and_parse_at(PAYLOAD.as_bytes(), &header, NOW),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn tampered_payload_fails() {
        let header = sign_test_payload(TEST_SECRET, NOW, PAYLOAD);
        let tampered = PAYLOAD.replace("pi_1", "pi_2");
        assert!(matches!(
            verifier().verify_and_parse_at(tampered.as_bytes(), &header, NOW),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn signed_garbage_is_parse_error() {
        let header = sign_test_payload(TEST_SECRET, NOW, "not json");
        assert!(matches!(
            verifier().verify_and_parse_at(b"not json", &header, NOW),
            Err(WebhookError::ParseError(_))
        ));
    }

    // ══════════════════════════════════════════════════════════════
    // Replay window
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn timestamp_at_max_age_boundary_passes() {
        assert!(validate_timestamp(NOW - 300, NOW).is_ok());
    }

    #[test]
    fn timestamp_past_max_age_fails() {
        assert!(matches!(
            validate_timestamp(NOW - 301, NOW),
            Err(WebhookError::TimestampOutOfRange)
        ));
    }

    #[test]
    fn small_future_skew_is_tolerated() {
        assert!(validate_timestamp(NOW + 30, NOW).is_ok());
        assert!(matches!(
            validate_timestamp(NOW + 120, NOW),
            Err(WebhookError::InvalidTimestamp)
        ));
    }

    #[test]
    fn stale_signature_is_rejected_even_when_valid() {
        let header = sign_test_payload(TEST_SECRET, NOW - 600, PAYLOAD);
        assert!(matches!(
            verifier().verify_and_parse_at(PAYLOAD.as_bytes(), &header, NOW),
            Err(WebhookError::TimestampOutOfRange)
        ));
    }
}
