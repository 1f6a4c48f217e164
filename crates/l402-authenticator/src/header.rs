/// A case-insensitive header accessor. The proxy binary implements this
/// for `http::HeaderMap` so this crate never has to depend on a particular
/// HTTP stack (§4.5).
pub trait HeaderLookup {
    fn get(&self, name: &str) -> Option<&str>;
}

impl HeaderLookup for std::collections::HashMap<String, String> {
    fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A macaroon plus the preimage that proves its bound invoice was paid,
/// extracted from one of the three accepted header shapes (§4.5).
pub struct Credential {
    pub macaroon_bytes: Vec<u8>,
    pub preimage: [u8; 32],
}

fn decode_hex32(hex_str: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(hex_str).ok()?;
    bytes.try_into().ok()
}

fn parse_authorization(value: &str) -> Option<Credential> {
    let (scheme, rest) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("LSAT") && !scheme.eq_ignore_ascii_case("L402") {
        return None;
    }
    let (b64_macaroon, hex_preimage) = rest.trim().rsplit_once(':')?;
    let macaroon_bytes = base64::decode(b64_macaroon).ok()?;
    let preimage = decode_hex32(hex_preimage)?;
    Some(Credential {
        macaroon_bytes,
        preimage,
    })
}

/// `Grpc-Metadata-Macaroon` and `Macaroon` carry only the macaroon, hex
/// encoded; its preimage must then be present as a `preimage` caveat.
fn parse_macaroon_with_embedded_preimage(value: &str) -> Option<Credential> {
    let macaroon_bytes = hex::decode(value.trim()).ok()?;
    let macaroon = l402_mint::Macaroon::decode(&macaroon_bytes).ok()?;
    let preimage_hex = macaroon
        .caveats
        .iter()
        .find(|c| c.condition == "preimage")
        .map(|c| c.value.clone())?;
    let preimage = decode_hex32(&preimage_hex)?;
    Some(Credential {
        macaroon_bytes,
        preimage,
    })
}

/// Tries `Authorization`, then `Grpc-Metadata-Macaroon`, then `Macaroon`,
/// in that order, returning the first header that parses successfully.
pub fn extract_credential(headers: &dyn HeaderLookup) -> Option<Credential> {
    if let Some(value) = headers.get("authorization") {
        if let Some(credential) = parse_authorization(value) {
            return Some(credential);
        }
    }
    if let Some(value) = headers.get("grpc-metadata-macaroon") {
        if let Some(credential) = parse_macaroon_with_embedded_preimage(value) {
            return Some(credential);
        }
    }
    if let Some(value) = headers.get("macaroon") {
        if let Some(credential) = parse_macaroon_with_embedded_preimage(value) {
            return Some(credential);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lsat_authorization_header() {
        let preimage = [7u8; 32];
        let macaroon_bytes = vec![1, 2, 3];
        let value = format!(
            "LSAT {}:{}",
            base64::encode(&macaroon_bytes),
            hex::encode(preimage)
        );
        let credential = parse_authorization(&value).unwrap();
        assert_eq!(credential.macaroon_bytes, macaroon_bytes);
        assert_eq!(credential.preimage, preimage);
    }

    #[test]
    fn parses_l402_authorization_header() {
        let preimage = [9u8; 32];
        let macaroon_bytes = vec![4, 5, 6];
        let value = format!(
            "L402 {}:{}",
            base64::encode(&macaroon_bytes),
            hex::encode(preimage)
        );
        let credential = parse_authorization(&value).unwrap();
        assert_eq!(credential.preimage, preimage);
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(parse_authorization("Bearer sometoken").is_none());
    }

    #[test]
    fn macaroon_header_pulls_preimage_from_caveat() {
        let secret = [3u8; 32];
        let preimage = [5u8; 32];
        let mut mac = l402_mint::Macaroon::create(&secret, vec![1, 2, 3]);
        mac.add_first_party_caveat(
            &secret,
            l402_caveats::Caveat::new("preimage", hex::encode(preimage)),
        );
        let value = hex::encode(mac.encode());

        let credential = parse_macaroon_with_embedded_preimage(&value).unwrap();
        assert_eq!(credential.preimage, preimage);
    }
}
