use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age, in either direction, of a signed delivery.
pub const SIGNATURE_TOLERANCE_SECS: u64 = 300;

#[derive(Debug, PartialEq, Eq)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<SignatureHeader, WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            return Err(WebhookError::MalformedSignature(format!(
                "unexpected segment `{part}`"
            )));
        };
        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    WebhookError::MalformedSignature("timestamp is not an integer".to_string())
                })?);
            }
            // Rotated secrets produce one v1 entry per active secret; bad hex never matches.
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| WebhookError::MalformedSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedSignature(
            "missing v1 signature".to_string(),
        ));
    }
    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::NotConfigured)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Check a `t=...,v1=...` signature header against the raw request body.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: DateTime<Utc>,
) -> Result<(), WebhookError> {
    if secret.is_empty() {
        return Err(WebhookError::NotConfigured);
    }
    let header = parse_header(header)?;

    // `t=` is unauthenticated here and may be any i64.
    let age = now.timestamp().abs_diff(header.timestamp);
    if age > SIGNATURE_TOLERANCE_SECS {
        return Err(WebhookError::StaleTimestamp { age_secs: age });
    }

    let expected = mac_for(secret, header.timestamp, payload)?;
    let matched = header
        .signatures
        .iter()
        .any(|candidate| bool::from(candidate.as_slice().ct_eq(expected.as_slice())));
    if matched {
        Ok(())
    } else {
        Err(WebhookError::SignatureMismatch)
    }
}

/// Produce a header value in the processor's format. Used to sign test deliveries.
pub fn sign_payload(secret: &str, payload: &[u8], timestamp: i64) -> Result<String, WebhookError> {
    let mac = mac_for(secret, timestamp, payload)?;
    Ok(format!("t={timestamp},v1={}", hex::encode(mac)))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"id":"evt_1","type":"invoice.paid"}"#;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp")
    }

    #[test]
    fn accepts_fresh_signature() {
        let header = sign_payload(SECRET, BODY, 1_700_000_000).expect("signable");
        verify_signature(SECRET, BODY, &header, at(1_700_000_120)).expect("valid");
    }

    #[test]
    fn accepts_any_matching_v1_entry() {
        let good = sign_payload(SECRET, BODY, 1_700_000_000).expect("signable");
        let good_sig = good.split("v1=").nth(1).expect("v1 present");
        let header = format!("t=1700000000,v1={},v1={good_sig}", "ab".repeat(32));
        verify_signature(SECRET, BODY, &header, at(1_700_000_000)).expect("second entry matches");
    }

    #[test]
    fn rejects_tampered_body() {
        let header = sign_payload(SECRET, BODY, 1_700_000_000).expect("signable");
        let err = verify_signature(SECRET, b"{}", &header, at(1_700_000_000))
            .expect_err("body changed");
        assert_eq!(err, WebhookError::SignatureMismatch);
    }

    #[test]
    fn rejects_wrong_secret() {
        let header = sign_payload("whsec_other", BODY, 1_700_000_000).expect("signable");
        assert_eq!(
            verify_signature(SECRET, BODY, &header, at(1_700_000_000)),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let header = sign_payload(SECRET, BODY, 1_700_000_000).expect("signable");
        let err = verify_signature(SECRET, BODY, &header, at(1_700_000_301))
            .expect_err("outside tolerance");
        assert_eq!(err, WebhookError::StaleTimestamp { age_secs: 301 });
    }

    #[test]
    fn extreme_timestamps_are_stale_not_a_panic() {
        let now = at(1_700_000_000);
        for timestamp in [i64::MIN, i64::MAX] {
            let header = format!("t={timestamp},v1=00");
            let err =
                verify_signature(SECRET, BODY, &header, now).expect_err("far outside tolerance");
            assert!(
                matches!(
                    err,
                    WebhookError::StaleTimestamp { age_secs } if age_secs > SIGNATURE_TOLERANCE_SECS
                ),
                "{header:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn rejects_malformed_headers() {
        for header in ["", "garbage", "t=abc,v1=00", "v1=00", "t=1700000000"] {
            let err = verify_signature(SECRET, BODY, header, at(1_700_000_000))
                .expect_err("malformed");
            assert!(
                matches!(err, WebhookError::MalformedSignature(_)),
                "{header:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn missing_secret_is_not_configured() {
        assert_eq!(
            verify_signature("", BODY, "t=1,v1=00", at(1)),
            Err(WebhookError::NotConfigured)
        );
    }
}
