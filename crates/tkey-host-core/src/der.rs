//! Raw `r ‖ s` ⇄ ASN.1 DER conversion for ECDSA signatures (spec.md §4.4,
//! §6). The device only ever produces/consumes raw fixed-width signatures;
//! U2F responses on the wire to a relying party are DER. Uses the `p256`/
//! `ecdsa` crates' built-in DER support rather than hand-rolled ASN.1.

use p256::ecdsa::Signature;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DerError {
    #[error("malformed raw signature")]
    BadRaw,
    #[error("malformed DER signature")]
    BadDer,
}

pub fn raw_to_der(raw: &[u8; 64]) -> Result<Vec<u8>, DerError> {
    let sig = Signature::try_from(raw.as_slice()).map_err(|_| DerError::BadRaw)?;
    Ok(sig.to_der().as_bytes().to_vec())
}

pub fn der_to_raw(der: &[u8]) -> Result<[u8; 64], DerError> {
    let sig = Signature::from_der(der).map_err(|_| DerError::BadDer)?;
    let bytes = sig.to_bytes();
    let mut out = [0u8; 64];
    out.copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_der_roundtrip() {
        // A syntactically valid low-s P-256 signature (r and s both
        // nonzero and below the curve order) used purely to exercise the
        // codec, not a signature over any real message.
        let mut raw = [0u8; 64];
        raw[31] = 1;
        raw[63] = 2;
        let der = raw_to_der(&raw).unwrap();
        let back = der_to_raw(&der).unwrap();
        assert_eq!(raw, back);
    }

    #[test]
    fn bad_der_is_rejected() {
        assert!(der_to_raw(&[0xff; 4]).is_err());
    }
}
