//! Binary encodings shared by the attestation formats: the CBOR attestation
//! object envelope and DER encoded ECDSA signatures.

use std::collections::BTreeMap;
use std::convert::TryFrom;

use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;
use serde_cbor_2::Value;

use crate::error::{ErrorKind, VerificationError, VerificationResult};

fn malformed(detail: impl Into<String>) -> VerificationError {
    VerificationError::new(ErrorKind::MalformedEncoding, detail)
}

/// An ECDSA signature as a pair of fixed width big endian integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdsaSignature {
    r: Vec<u8>,
    s: Vec<u8>,
}

impl EcdsaSignature {
    /// Decode an ASN.1 DER `Ecdsa-Sig-Value` whose integers must fit within
    /// `coord_size` bytes.
    ///
    /// Only the canonical DER form is accepted: trailing bytes, non minimal
    /// integer encodings and negative integers are rejected.
    pub fn from_der(der: &[u8], coord_size: usize) -> VerificationResult<Self> {
        if der.is_empty() {
            return Err(malformed("ecdsa signature is empty"));
        }

        let sig = EcdsaSig::from_der(der).map_err(|e| {
            debug!(?e, "EcdsaSig::from_der");
            malformed("ecdsa signature is not a der sequence of two integers")
        })?;

        // Openssl tolerates some non canonical forms, so re-encode and compare.
        let reencoded = sig.to_der()?;
        if reencoded.as_slice() != der {
            debug!("ecdsa signature der is not canonical");
            return Err(malformed("ecdsa signature is not canonical der"));
        }

        if sig.r().is_negative() || sig.s().is_negative() {
            return Err(malformed("ecdsa signature integers must be positive"));
        }

        let width = i32::try_from(coord_size)
            .map_err(|_| malformed("ecdsa coordinate size out of range"))?;

        let r = sig
            .r()
            .to_vec_padded(width)
            .map_err(|_| malformed(format!("ecdsa r exceeds {} bytes", coord_size)))?;
        let s = sig
            .s()
            .to_vec_padded(width)
            .map_err(|_| malformed(format!("ecdsa s exceeds {} bytes", coord_size)))?;

        Ok(EcdsaSignature { r, s })
    }

    /// Build a signature from the raw `r || s` concatenation.
    pub fn from_raw(raw: &[u8]) -> VerificationResult<Self> {
        if raw.is_empty() || raw.len() % 2 != 0 {
            return Err(malformed("raw ecdsa signature must be two equal halves"));
        }
        let (r, s) = raw.split_at(raw.len() / 2);
        Ok(EcdsaSignature {
            r: r.to_vec(),
            s: s.to_vec(),
        })
    }

    /// The `r` component, left padded to the coordinate size.
    pub fn r(&self) -> &[u8] {
        &self.r
    }

    /// The `s` component, left padded to the coordinate size.
    pub fn s(&self) -> &[u8] {
        &self.s
    }

    /// Encode as the raw `r || s` concatenation.
    pub fn to_raw(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.r.len() + self.s.len());
        raw.extend_from_slice(&self.r);
        raw.extend_from_slice(&self.s);
        raw
    }

    pub(crate) fn to_openssl(&self) -> VerificationResult<EcdsaSig> {
        let r = BigNum::from_slice(&self.r)?;
        let s = BigNum::from_slice(&self.s)?;
        EcdsaSig::from_private_components(r, s).map_err(VerificationError::from)
    }

    /// Encode as ASN.1 DER.
    pub fn to_der(&self) -> VerificationResult<Vec<u8>> {
        self.to_openssl()?.to_der().map_err(VerificationError::from)
    }
}

/// A decoded attestation object, the CBOR map returned by the authenticator
/// from `navigator.credentials.create()`.
///
/// <https://www.w3.org/TR/webauthn-3/#sctn-attestation>
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    /// The attestation statement format identifier.
    pub fmt: String,
    /// The format specific attestation statement.
    pub att_stmt: Value,
    /// The raw authenticator data. This is what the attestation signature covers,
    /// so it is kept exactly as received.
    pub auth_data_bytes: Vec<u8>,
}

fn text_key<'a>(m: &'a BTreeMap<Value, Value>, key: &str) -> VerificationResult<&'a Value> {
    m.get(&Value::Text(key.to_string()))
        .ok_or_else(|| malformed(format!("attestation object is missing {}", key)))
}

impl TryFrom<&[u8]> for AttestationObject {
    type Error = VerificationError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        let value: Value = serde_cbor_2::from_slice(data).map_err(|e| {
            debug!(?e, "invalid attestation object cbor");
            malformed("attestation object is not valid cbor")
        })?;

        let m = cbor_try_map!(&value)?;

        let fmt = text_key(m, "fmt").and_then(|v| cbor_try_string!(v))?;
        let att_stmt = text_key(m, "attStmt")?;
        // Validate the type now, it is handed to the verifier as a map.
        let _ = cbor_try_map!(att_stmt)?;
        let auth_data_bytes = text_key(m, "authData").and_then(|v| cbor_try_bytes!(v))?;

        Ok(AttestationObject {
            fmt: fmt.clone(),
            att_stmt: att_stmt.clone(),
            auth_data_bytes: auth_data_bytes.clone(),
        })
    }
}

impl AttestationObject {
    /// Encode this attestation object back to CBOR.
    pub fn to_vec(&self) -> VerificationResult<Vec<u8>> {
        let mut m = BTreeMap::new();
        m.insert(Value::Text("fmt".to_string()), Value::Text(self.fmt.clone()));
        m.insert(Value::Text("attStmt".to_string()), self.att_stmt.clone());
        m.insert(
            Value::Text("authData".to_string()),
            Value::Bytes(self.auth_data_bytes.clone()),
        );
        serde_cbor_2::to_vec(&Value::Map(m)).map_err(|e| {
            error!(?e, "unable to encode attestation object");
            malformed("unable to encode attestation object")
        })
    }
}
