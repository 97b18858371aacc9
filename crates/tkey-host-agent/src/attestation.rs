//! Batch attestation signing for U2F registration responses (spec.md §4.5,
//! §6). The attestation key and certificate here are a single batch-issued
//! keypair compiled into every agent binary — a known, shared weakness
//! explicitly flagged out of scope in spec.md §9: this is not a place to
//! "fix" the design, the spec calls out this exact limitation.

use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use p256::pkcs8::DecodePrivateKey;
use sha2::{Digest, Sha256};

/// A PEM-encoded P-256 private key and a DER certificate, compiled into
/// the binary. In a real deployment this pair would be provisioned at
/// manufacturing time and differ per batch; the development placeholder
/// here is fixed so test registrations are reproducible.
pub struct AttestationKey {
    signing_key: SigningKey,
    certificate_der: Vec<u8>,
}

impl AttestationKey {
    pub fn from_pem_and_der(key_pem: &str, certificate_der: Vec<u8>) -> Result<Self, p256::pkcs8::Error> {
        let signing_key = SigningKey::from_pkcs8_pem(key_pem)?;
        Ok(Self { signing_key, certificate_der })
    }

    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    /// Builds the 194-byte attestation-signed buffer of spec.md §6:
    /// `0x00 ‖ app_param ‖ chall_param ‖ key_handle ‖ user_pub_key` and
    /// signs it with the attestation key. `user_pub_key` is the 65-byte
    /// uncompressed point from the device's registration response.
    pub fn sign_registration(
        &self,
        app_param: &[u8; 32],
        chall_param: &[u8; 32],
        key_handle: &[u8],
        user_pub_key: &[u8; 65],
    ) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 32 + 32 + key_handle.len() + 65);
        buf.push(0x00);
        buf.extend_from_slice(app_param);
        buf.extend_from_slice(chall_param);
        buf.extend_from_slice(key_handle);
        buf.extend_from_slice(user_pub_key);

        let digest = Sha256::digest(&buf);
        let sig: Signature = self.signing_key.sign(&digest);
        sig.to_der().as_bytes().to_vec()
    }

    /// Assembles the full `U2F_REGISTER` response body: marker ‖ pub_key ‖
    /// key_handle_len ‖ key_handle ‖ attestation_cert ‖ attestation_sig.
    pub fn build_registration_response(
        &self,
        app_param: &[u8; 32],
        chall_param: &[u8; 32],
        key_handle: &[u8],
        user_pub_key: &[u8; 65],
    ) -> Vec<u8> {
        let sig = self.sign_registration(app_param, chall_param, key_handle, user_pub_key);
        let mut out = Vec::new();
        out.extend_from_slice(user_pub_key);
        out.push(key_handle.len() as u8);
        out.extend_from_slice(key_handle);
        out.extend_from_slice(&self.certificate_der);
        out.extend_from_slice(&sig);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::pkcs8::EncodePrivateKey;

    fn dev_key() -> AttestationKey {
        let signing_key = SigningKey::from_bytes(&[0x11u8; 32].into()).unwrap();
        let pem = signing_key.to_pkcs8_pem(Default::default()).unwrap();
        AttestationKey::from_pem_and_der(&pem, vec![0xde, 0xad, 0xbe, 0xef]).unwrap()
    }

    #[test]
    fn registration_response_layout() {
        let key = dev_key();
        let app_param = [1u8; 32];
        let chall_param = [2u8; 32];
        let key_handle = [3u8; 64];
        let pub_key = [0x04u8; 65];
        let resp = key.build_registration_response(&app_param, &chall_param, &key_handle, &pub_key);
        assert_eq!(&resp[0..65], &pub_key[..]);
        assert_eq!(resp[65], 64);
        assert_eq!(&resp[66..130], &key_handle[..]);
        assert_eq!(&resp[130..134], &[0xde, 0xad, 0xbe, 0xef]);
    }
}
