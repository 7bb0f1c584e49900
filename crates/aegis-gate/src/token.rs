//! Single-use, parameter-bound tool call tokens.

use std::collections::HashSet;

use aegis_types::{PermissionTier, SharedClock, SystemClock, TrustLevel};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::call::ToolCall;
use crate::error::TokenError;

/// Hex BLAKE3 of the canonical JSON encoding of `parameters`.
pub fn parameters_hash(parameters: &serde_json::Value) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"aegis-tool-params-v1:");
    hasher.update(&serde_json::to_vec(parameters).unwrap_or_default());
    hasher.finalize().to_hex().to_string()
}

/// Credential authorizing exactly one execution of one tool by one agent
/// with one parameter set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallToken {
    pub token_id: Uuid,
    pub tool_id: String,
    pub agent_id: String,
    pub parameters: serde_json::Value,
    pub parameters_hash: String,
    pub tier: PermissionTier,
    pub trust_level: TrustLevel,
    pub approver: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Keyed MAC over every field except `used`.
    pub signature: String,
    pub used: bool,
}

/// Issues and redeems [`ToolCallToken`]s.
pub struct TokenAuthority {
    key: [u8; 32],
    ttl: Duration,
    consumed: Mutex<HashSet<Uuid>>,
    clock: SharedClock,
}

impl TokenAuthority {
    pub fn new(key: [u8; 32], ttl: Duration) -> Self {
        Self {
            key,
            ttl,
            consumed: Mutex::new(HashSet::new()),
            clock: SystemClock::shared(),
        }
    }

    /// A token authority with a fresh random key.
    pub fn generate(ttl: Duration) -> Self {
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self::new(key, ttl)
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(
        &self,
        call: &ToolCall,
        tier: PermissionTier,
        approver: Option<String>,
    ) -> ToolCallToken {
        let issued_at = self.clock.now();
        let mut token = ToolCallToken {
            token_id: Uuid::new_v4(),
            tool_id: call.tool_id.clone(),
            agent_id: call.requesting_agent.clone(),
            parameters: call.parameters.clone(),
            parameters_hash: parameters_hash(&call.parameters),
            tier,
            trust_level: call.trust_level,
            approver,
            issued_at,
            expires_at: issued_at + self.ttl,
            signature: String::new(),
            used: false,
        };
        token.signature = self.mac(&token).to_hex().to_string();
        debug!(
            token_id = %token.token_id,
            tool_id = %token.tool_id,
            agent = %token.agent_id,
            "tool call token issued"
        );
        token
    }

    /// Check `token` against `call` and consume it.
    ///
    /// On success the token is marked used and can never be redeemed again,
    /// including through copies.
    pub fn redeem(&self, token: &mut ToolCallToken, call: &ToolCall) -> Result<(), TokenError> {
        let signature_ok = blake3::Hash::from_hex(&token.signature)
            .map(|claimed| claimed == self.mac(token))
            .unwrap_or(false);
        if !signature_ok {
            warn!(token_id = %token.token_id, "token signature mismatch");
            return Err(TokenError::InvalidSignature);
        }

        if self.clock.now() > token.expires_at {
            return Err(TokenError::Expired);
        }

        if token.tool_id != call.tool_id {
            return Err(TokenError::BindingMismatch {
                expected: format!("tool {}", token.tool_id),
                presented: format!("tool {}", call.tool_id),
            });
        }
        if token.agent_id != call.requesting_agent {
            return Err(TokenError::BindingMismatch {
                expected: format!("agent {}", token.agent_id),
                presented: format!("agent {}", call.requesting_agent),
            });
        }

        if parameters_hash(&call.parameters) != token.parameters_hash {
            warn!(token_id = %token.token_id, "token presented with different parameters");
            return Err(TokenError::ParameterMismatch);
        }

        if token.used || !self.consumed.lock().insert(token.token_id) {
            return Err(TokenError::AlreadyUsed);
        }
        token.used = true;

        debug!(token_id = %token.token_id, "tool call token redeemed");
        Ok(())
    }

    fn mac(&self, token: &ToolCallToken) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(b"aegis-tool-token-v1:");
        let fields: [&[u8]; 7] = [
            token.token_id.as_bytes(),
            token.tool_id.as_bytes(),
            token.agent_id.as_bytes(),
            token.parameters_hash.as_bytes(),
            token.tier.as_str().as_bytes(),
            token.trust_level.as_str().as_bytes(),
            token.approver.as_deref().unwrap_or("").as_bytes(),
        ];
        for field in fields {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field);
        }
        hasher.update(&[token.approver.is_some() as u8]);
        let params = serde_json::to_vec(&token.parameters).unwrap_or_default();
        hasher.update(&(params.len() as u64).to_le_bytes());
        hasher.update(&params);
        hasher.update(&token.issued_at.timestamp().to_le_bytes());
        hasher.update(&token.issued_at.timestamp_subsec_nanos().to_le_bytes());
        hasher.update(&token.expires_at.timestamp().to_le_bytes());
        hasher.update(&token.expires_at.timestamp_subsec_nanos().to_le_bytes());
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_types::ManualClock;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (TokenAuthority, Arc<ManualClock>, ToolCall) {
        let clock = Arc::new(ManualClock::default());
        let authority = TokenAuthority::generate(Duration::minutes(5)).with_clock(clock.clone());
        let call = ToolCall::new(
            "db.drop",
            "agent-1",
            TrustLevel::Operator,
            json!({"table": "sessions"}),
        );
        (authority, clock, call)
    }

    #[test]
    fn redeem_once() {
        let (authority, _, call) = setup();
        let mut token = authority.issue(&call, PermissionTier::Admin, Some("arbiter".into()));
        let mut copy = token.clone();

        assert!(authority.redeem(&mut token, &call).is_ok());
        assert!(token.used);
        assert_eq!(
            authority.redeem(&mut token, &call),
            Err(TokenError::AlreadyUsed)
        );
        assert_eq!(
            authority.redeem(&mut copy, &call),
            Err(TokenError::AlreadyUsed)
        );
    }

    #[test]
    fn different_parameters_are_rejected() {
        let (authority, _, call) = setup();
        let mut token = authority.issue(&call, PermissionTier::Admin, None);
        let mut replay = call.clone();
        replay.parameters = json!({"table": "users"});
        assert_eq!(
            authority.redeem(&mut token, &replay),
            Err(TokenError::ParameterMismatch)
        );
        // A failed attempt does not burn the token
        assert!(authority.redeem(&mut token, &call).is_ok());
    }

    #[test]
    fn expired_token_is_rejected() {
        let (authority, clock, call) = setup();
        let mut token = authority.issue(&call, PermissionTier::WriteSafe, None);
        clock.advance(Duration::minutes(5) + Duration::seconds(1));
        assert_eq!(authority.redeem(&mut token, &call), Err(TokenError::Expired));
    }

    #[test]
    fn edited_token_fails_signature() {
        let (authority, _, call) = setup();
        let mut token = authority.issue(&call, PermissionTier::WriteSafe, None);
        token.tier = PermissionTier::ReadOnly;
        assert_eq!(
            authority.redeem(&mut token, &call),
            Err(TokenError::InvalidSignature)
        );

        let mut token = authority.issue(&call, PermissionTier::WriteSafe, None);
        token.approver = Some("arbiter".into());
        assert_eq!(
            authority.redeem(&mut token, &call),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn token_from_another_authority_fails() {
        let (authority, _, call) = setup();
        let other = TokenAuthority::generate(Duration::minutes(5));
        let mut token = other.issue(&call, PermissionTier::WriteSafe, None);
        assert_eq!(
            authority.redeem(&mut token, &call),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn binding_to_agent() {
        let (authority, _, call) = setup();
        let mut token = authority.issue(&call, PermissionTier::WriteSafe, None);
        let mut other = call.clone();
        other.requesting_agent = "agent-2".into();
        assert!(matches!(
            authority.redeem(&mut token, &other),
            Err(TokenError::BindingMismatch { .. })
        ));
    }

    #[test]
    fn parameter_hash_is_key_order_independent() {
        let a: serde_json::Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(parameters_hash(&a), parameters_hash(&b));
        assert_ne!(parameters_hash(&a), parameters_hash(&json!({"a": 1})));
    }
}
