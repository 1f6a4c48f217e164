/// The only identifier version this build knows how to decode. Bumping
/// this would be a wire-format change, not a code change — see §3.
pub const LATEST_VERSION: u16 = 1;

const ENCODED_LEN: usize = 2 + 32 + 32;

/// `{version, payment_hash, token_id}` from §3's "Token identifier".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenId {
    pub version: u16,
    pub payment_hash: [u8; 32],
    pub token_id: [u8; 32],
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenIdError {
    #[error("token identifier is {0} bytes, expected {ENCODED_LEN}")]
    WrongLength(usize),
    #[error("unknown token identifier version {0}")]
    UnknownVersion(u16),
}

impl TokenId {
    pub fn new(payment_hash: [u8; 32], token_id: [u8; 32]) -> Self {
        Self {
            version: LATEST_VERSION,
            payment_hash,
            token_id,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENCODED_LEN);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.payment_hash);
        out.extend_from_slice(&self.token_id);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TokenIdError> {
        if bytes.len() != ENCODED_LEN {
            return Err(TokenIdError::WrongLength(bytes.len()));
        }
        let version = u16::from_be_bytes([bytes[0], bytes[1]]);
        if version != LATEST_VERSION {
            return Err(TokenIdError::UnknownVersion(version));
        }
        let mut payment_hash = [0u8; 32];
        payment_hash.copy_from_slice(&bytes[2..34]);
        let mut token_id = [0u8; 32];
        token_id.copy_from_slice(&bytes[34..66]);
        Ok(Self {
            version,
            payment_hash,
            token_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let id = TokenId::new([1u8; 32], [2u8; 32]);
        let encoded = id.encode();
        assert_eq!(encoded.len(), ENCODED_LEN);
        assert_eq!(TokenId::decode(&encoded).unwrap(), id);
    }

    #[test]
    fn rejects_unknown_version() {
        let id = TokenId::new([1u8; 32], [2u8; 32]);
        let mut encoded = id.encode();
        encoded[1] = 99;
        assert_eq!(
            TokenId::decode(&encoded),
            Err(TokenIdError::UnknownVersion(99))
        );
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(TokenId::decode(&[0u8; 10]), Err(TokenIdError::WrongLength(10)));
    }
}
