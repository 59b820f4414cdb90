// Credential token inspection.
//
// The client never verifies signatures (the service does); it only reads the
// `exp` claim so a session can be refreshed before the service rejects it.

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Reads expiry information out of an opaque credential token.
pub trait TokenInspector: Send + Sync {
    fn expires_at(&self, token: &str) -> Result<Option<DateTime<Utc>>>;
}

/// Used when JWT support is compiled out; every token is opaque.
pub struct OpaqueTokenInspector;

impl TokenInspector for OpaqueTokenInspector {
    fn expires_at(&self, _token: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(None)
    }
}

#[cfg(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto"))]
pub struct JwtInspector;

#[cfg(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto"))]
impl TokenInspector for JwtInspector {
    fn expires_at(&self, token: &str) -> Result<Option<DateTime<Utc>>> {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine as _;

        // Rejects anything that is not a three-part token with a valid header.
        jsonwebtoken::decode_header(token)
            .map_err(|e| anyhow::anyhow!("not a JWT: {e}"))?;

        let payload = token
            .split('.')
            .nth(1)
            .ok_or_else(|| anyhow::anyhow!("JWT has no payload segment"))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| anyhow::anyhow!("JWT payload is not base64url: {e}"))?;
        let claims: Value = serde_json::from_slice(&bytes)?;

        Ok(claims.get("exp").and_then(exp_to_datetime))
    }
}

fn exp_to_datetime(exp: &Value) -> Option<DateTime<Utc>> {
    let secs = exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))?;
    Utc.timestamp_opt(secs, 0).single()
}

/// Inspector matching the compiled JWT features.
pub fn default_inspector() -> Box<dyn TokenInspector> {
    #[cfg(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto"))]
    {
        Box::new(JwtInspector)
    }

    #[cfg(not(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto")))]
    {
        Box::new(OpaqueTokenInspector)
    }
}
