//! Minimal session-token issuance/verification (§6.1 auth header), built on
//! a user's `serverSignKey`. The wire format and signing *mechanism* are an
//! external collaborator's concern (§1 Non-goals list "token signing/
//! validation"); what belongs to the core is the `tokenSeq` invalidation
//! rule itself — a signature verifying against a stale `seq` must be
//! rejected, since `tokenSeq` is domain state only `vault-server-core` owns.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ed25519_dalek::{Signature, VerifyingKey};
use vault_crypto::{verify as verify_signature, SigningKeyPair};
use wire::TokenClaims;

use crate::error::{Error, Result};

const SCOPE: &str = "session";

/// Signs a `{subject, scope="session", seq}` claim set and returns the
/// opaque `payload.signature` token string.
pub fn issue(signing: &SigningKeyPair, user_id: i64, seq: u64) -> String {
    let claims = TokenClaims {
        subject: user_id,
        scope: SCOPE.into(),
        seq: seq as i64,
    };
    let payload = serde_json::to_vec(&claims).expect("token claims always serialize");
    let signature = signing.sign(&payload);
    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(&payload),
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    )
}

/// Verifies the signature and that `scope`/`seq` match the user's current
/// state; a token signed under a since-invalidated `seq` fails here even
/// though the signature itself is still mathematically valid.
pub fn verify(verifying_key: &VerifyingKey, token: &str, current_seq: u64) -> Result<TokenClaims> {
    let (payload_b64, sig_b64) = token.split_once('.').ok_or(Error::InvalidToken)?;
    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| Error::InvalidToken)?;
    let sig_bytes: [u8; 64] = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| Error::InvalidToken)?
        .try_into()
        .map_err(|_| Error::InvalidToken)?;
    let signature = Signature::from_bytes(&sig_bytes);

    if !verify_signature(verifying_key, &payload, &signature) {
        return Err(Error::InvalidToken);
    }

    let claims: TokenClaims = serde_json::from_slice(&payload).map_err(|_| Error::InvalidToken)?;
    if claims.scope != SCOPE || claims.seq as u64 != current_seq {
        return Err(Error::InvalidToken);
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_rejected_once_seq_advances() {
        let signing = SigningKeyPair::generate();
        let token = issue(&signing, 1_500_000, 1);

        let claims = verify(&signing.verifying_key(), &token, 1).unwrap();
        assert_eq!(claims.subject, 1_500_000);

        assert!(matches!(
            verify(&signing.verifying_key(), &token, 2),
            Err(Error::InvalidToken)
        ));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let signing = SigningKeyPair::generate();
        let token = issue(&signing, 42, 0);
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(verify(&signing.verifying_key(), &tampered, 0).is_err());
    }
}
