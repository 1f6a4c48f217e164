use hmac::Hmac;
use hmac::Mac;
use l402_caveats::Caveat;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// A minimal HMAC-chained macaroon: an identifier, an ordered list of
/// first-party caveats, and a signature computed by chaining
/// `HMAC-SHA256` over the root secret, the id, and each caveat in turn
/// (§9's "Macaroon library dependency" design note — the small subset used
/// here, rolled by hand rather than pulled from an unaudited crate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macaroon {
    pub id: Vec<u8>,
    pub caveats: Vec<Caveat>,
    signature: [u8; 32],
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MacaroonError {
    #[error("macaroon signature does not match the root secret")]
    SignatureMismatch,
    #[error("malformed macaroon encoding")]
    Malformed,
}

fn chain(root_secret: &[u8; 32], id: &[u8], caveats: &[Caveat]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(root_secret).expect("HMAC accepts any key length");
    mac.update(id);
    let mut sig: [u8; 32] = mac.finalize().into_bytes().into();

    for caveat in caveats {
        let mut mac = HmacSha256::new_from_slice(&sig).expect("HMAC accepts any key length");
        mac.update(caveat.encode().as_bytes());
        sig = mac.finalize().into_bytes().into();
    }
    sig
}

impl Macaroon {
    /// Builds a fresh macaroon over `root_secret` with no caveats yet.
    pub fn create(root_secret: &[u8; 32], id: Vec<u8>) -> Self {
        let signature = chain(root_secret, &id, &[]);
        Self {
            id,
            caveats: Vec::new(),
            signature,
        }
    }

    /// Appends a first-party caveat, re-chaining the signature.
    pub fn add_first_party_caveat(&mut self, root_secret: &[u8; 32], caveat: Caveat) {
        self.caveats.push(caveat);
        self.signature = chain(root_secret, &self.id, &self.caveats);
    }

    /// Recomputes the chain over `root_secret` and compares it to the
    /// stored signature in constant time.
    pub fn verify_signature(&self, root_secret: &[u8; 32]) -> Result<(), MacaroonError> {
        let expected = chain(root_secret, &self.id, &self.caveats);
        if expected.ct_eq(&self.signature).into() {
            Ok(())
        } else {
            Err(MacaroonError::SignatureMismatch)
        }
    }

    /// `id_len(u16) || id || num_caveats(u16) || (len(u16) || caveat)* || signature(32)`
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.id.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.id);
        out.extend_from_slice(&(self.caveats.len() as u16).to_be_bytes());
        for caveat in &self.caveats {
            let encoded = caveat.encode();
            out.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
            out.extend_from_slice(encoded.as_bytes());
        }
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MacaroonError> {
        let mut cursor = 0usize;
        let read_u16 = |cursor: &mut usize| -> Result<u16, MacaroonError> {
            let slice = bytes.get(*cursor..*cursor + 2).ok_or(MacaroonError::Malformed)?;
            *cursor += 2;
            Ok(u16::from_be_bytes([slice[0], slice[1]]))
        };

        let id_len = read_u16(&mut cursor)? as usize;
        let id = bytes
            .get(cursor..cursor + id_len)
            .ok_or(MacaroonError::Malformed)?
            .to_vec();
        cursor += id_len;

        let num_caveats = read_u16(&mut cursor)? as usize;
        let mut caveats = Vec::with_capacity(num_caveats);
        for _ in 0..num_caveats {
            let len = read_u16(&mut cursor)? as usize;
            let raw = bytes
                .get(cursor..cursor + len)
                .ok_or(MacaroonError::Malformed)?;
            cursor += len;
            let raw = std::str::from_utf8(raw).map_err(|_| MacaroonError::Malformed)?;
            caveats.push(Caveat::parse(raw).ok_or(MacaroonError::Malformed)?);
        }

        let signature_bytes = bytes.get(cursor..cursor + 32).ok_or(MacaroonError::Malformed)?;
        cursor += 32;
        if cursor != bytes.len() {
            return Err(MacaroonError::Malformed);
        }
        let mut signature = [0u8; 32];
        signature.copy_from_slice(signature_bytes);

        Ok(Self {
            id,
            caveats,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let secret = [3u8; 32];
        let mut mac = Macaroon::create(&secret, vec![1, 2, 3]);
        mac.add_first_party_caveat(&secret, Caveat::new("services", "svc1:0"));

        let encoded = mac.encode();
        let decoded = Macaroon::decode(&encoded).unwrap();
        assert_eq!(decoded, mac);
        decoded.verify_signature(&secret).unwrap();
    }

    #[test]
    fn tampering_breaks_signature() {
        let secret = [3u8; 32];
        let mut mac = Macaroon::create(&secret, vec![1, 2, 3]);
        mac.add_first_party_caveat(&secret, Caveat::new("services", "svc1:0"));

        let mut encoded = mac.encode();
        *encoded.last_mut().unwrap() ^= 0xff;
        let tampered = Macaroon::decode(&encoded).unwrap();
        assert_eq!(
            tampered.verify_signature(&secret),
            Err(MacaroonError::SignatureMismatch)
        );
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let secret = [3u8; 32];
        let other = [9u8; 32];
        let mac = Macaroon::create(&secret, vec![1, 2, 3]);
        assert_eq!(
            mac.verify_signature(&other),
            Err(MacaroonError::SignatureMismatch)
        );
    }
}
