use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{ConsentError, ConsentResult};
use crate::types::{FormSecret, PolicyVersion, UserId};

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex-encoded consent-link signature for a user.
///
/// Formula: hex(HMAC-SHA256(secret, canonical user id bytes))
///
/// The signature covers the identity only. The policy version travels
/// alongside it as untrusted data the handler interprets on its own.
pub fn sign_user_hmac(user: &UserId, secret: &FormSecret) -> ConsentResult<String> {
    Ok(hex::encode(compute_mac(user, secret)?))
}

/// Verify a hex-encoded consent-link signature.
///
/// Comparison of the decoded bytes is constant-time. Malformed hex is a
/// decode failure (`Err`), distinct from a mismatch (`Ok(false)`); callers
/// must reject both.
pub fn verify_user_hmac(
    user: &UserId,
    hex_signature: &str,
    secret: &FormSecret,
) -> ConsentResult<bool> {
    let provided = hex::decode(hex_signature)
        .map_err(|e| ConsentError::Validation(format!("malformed signature hex: {e}")))?;
    let expected = compute_mac(user, secret)?;
    Ok(expected.ct_eq(provided.as_slice()).into())
}

fn compute_mac(user: &UserId, secret: &FormSecret) -> ConsentResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.key_bytes())
        .map_err(|e| ConsentError::Validation(format!("unusable HMAC key: {e}")))?;
    mac.update(user.as_str().as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

// ---------------------------------------------------------------------------
// LinkToken — a mintable, URL-renderable consent link
// ---------------------------------------------------------------------------

/// A signed consent link: user identity, policy version, and the hex
/// signature proving the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkToken {
    pub user: UserId,
    pub version: PolicyVersion,
    pub signature: String,
}

impl LinkToken {
    /// Mint a token for a user and policy version.
    pub fn mint(user: UserId, version: PolicyVersion, secret: &FormSecret) -> ConsentResult<Self> {
        let signature = sign_user_hmac(&user, secret)?;
        Ok(Self {
            user,
            version,
            signature,
        })
    }

    /// Render the fully-qualified consent URL.
    ///
    /// The format is part of the wire contract with out-of-band delivery:
    /// `<base>/_matrix/client/consent?u=<user>&h=<sig>&v=<version>`.
    pub fn consent_url(&self, base_url: &str) -> ConsentResult<String> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConsentError::Validation(format!(
                "malformed base URL: {base_url}"
            )));
        }
        Ok(format!(
            "{}/_matrix/client/consent?u={}&h={}&v={}",
            base_url, self.user, self.signature, self.version
        ))
    }
}
