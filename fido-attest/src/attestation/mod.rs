//! Attestation statement verification.
//!
//! Each attestation format is an [AttestationVerifier]. The verifier for a
//! request is chosen by its format tag from a static registry, and is handed a
//! [VerificationContext] holding everything it is allowed to look at.

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;

use serde_cbor_2::Value;

use crate::authenticator_data::{AttestedCredentialData, AuthenticatorData};
use crate::codec::AttestationObject;
use crate::constants::CLIENT_DATA_HASH_LEN;
use crate::error::{ErrorKind, VerificationError, VerificationResult};
use crate::metadata::MetadataService;

mod fido_u2f;

pub use self::fido_u2f::FidoU2fVerifier;

/// The attestation statement formats defined by WebAuthn.
///
/// <https://www.w3.org/TR/webauthn-3/#sctn-defined-attestation-formats>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AttestationFormat {
    /// Packed attestation
    Packed,
    /// TPM attestation (like Micrsoft)
    Tpm,
    /// Android hardware attestation
    AndroidKey,
    /// Older Android Safety Net
    AndroidSafetyNet,
    /// Old U2F attestation type
    FIDOU2F,
    /// Apple touchID/faceID
    AppleAnonymous,
    /// No attestation
    None,
}

impl AttestationFormat {
    /// The format identifier as it appears in an attestation object.
    pub fn as_str(self) -> &'static str {
        match self {
            AttestationFormat::Packed => "packed",
            AttestationFormat::Tpm => "tpm",
            AttestationFormat::AndroidKey => "android-key",
            AttestationFormat::AndroidSafetyNet => "android-safetynet",
            AttestationFormat::FIDOU2F => "fido-u2f",
            AttestationFormat::AppleAnonymous => "apple",
            AttestationFormat::None => "none",
        }
    }
}

impl fmt::Display for AttestationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AttestationFormat {
    type Error = VerificationError;

    fn try_from(a: &str) -> Result<AttestationFormat, Self::Error> {
        match a {
            "packed" => Ok(AttestationFormat::Packed),
            "tpm" => Ok(AttestationFormat::Tpm),
            "android-key" => Ok(AttestationFormat::AndroidKey),
            "android-safetynet" => Ok(AttestationFormat::AndroidSafetyNet),
            "fido-u2f" => Ok(AttestationFormat::FIDOU2F),
            "apple" => Ok(AttestationFormat::AppleAnonymous),
            "none" => Ok(AttestationFormat::None),
            _ => Err(VerificationError::new(
                ErrorKind::UnsupportedFormat,
                format!("unknown attestation format {:?}", a),
            )),
        }
    }
}

/// The inputs of one verification call.
///
/// A context is built once per call and is never modified by a verifier.
pub struct VerificationContext<'a> {
    att_stmt: &'a BTreeMap<Value, Value>,
    auth_data_bytes: &'a [u8],
    auth_data: AuthenticatorData,
    client_data_hash: [u8; CLIENT_DATA_HASH_LEN],
    metadata: Option<&'a dyn MetadataService>,
}

impl<'a> fmt::Debug for VerificationContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationContext")
            .field("att_stmt", &self.att_stmt)
            .field("auth_data", &self.auth_data)
            .field("client_data_hash", &self.client_data_hash)
            .field("metadata", &self.metadata.is_some())
            .finish()
    }
}

impl<'a> VerificationContext<'a> {
    /// Parse the authenticator data and check the shape of the shared inputs.
    pub fn new(
        att_stmt: &'a Value,
        auth_data_bytes: &'a [u8],
        client_data_hash: &[u8],
        metadata: Option<&'a dyn MetadataService>,
    ) -> VerificationResult<Self> {
        let att_stmt = cbor_try_map!(att_stmt)?;

        let client_data_hash = <[u8; CLIENT_DATA_HASH_LEN]>::try_from(client_data_hash)
            .map_err(|_| {
                VerificationError::new(
                    ErrorKind::MalformedEncoding,
                    format!(
                        "client data hash must be {} bytes, got {}",
                        CLIENT_DATA_HASH_LEN,
                        client_data_hash.len()
                    ),
                )
            })?;

        let auth_data = AuthenticatorData::try_from(auth_data_bytes)?;

        Ok(VerificationContext {
            att_stmt,
            auth_data_bytes,
            auth_data,
            client_data_hash,
            metadata,
        })
    }

    /// The format specific attestation statement.
    pub fn att_stmt(&self) -> &BTreeMap<Value, Value> {
        self.att_stmt
    }

    /// The authenticator data exactly as signed.
    pub fn auth_data_bytes(&self) -> &[u8] {
        self.auth_data_bytes
    }

    /// The parsed authenticator data.
    pub fn auth_data(&self) -> &AuthenticatorData {
        &self.auth_data
    }

    /// The attested credential data, which every registration must carry.
    pub fn attested_credential_data(&self) -> VerificationResult<&AttestedCredentialData> {
        self.auth_data.acd.as_ref().ok_or_else(|| {
            debug!("authenticator data has no attested credential data");
            VerificationError::new(
                ErrorKind::MalformedAuthenticatorData,
                "authenticator data has no attested credential data",
            )
        })
    }

    /// The hash of the client data JSON.
    pub fn client_data_hash(&self) -> &[u8; CLIENT_DATA_HASH_LEN] {
        &self.client_data_hash
    }

    /// The metadata service, if one is configured.
    pub fn metadata(&self) -> Option<&'a dyn MetadataService> {
        self.metadata
    }
}

/// A verifier for one attestation statement format.
///
/// Verifiers hold no per call state, so one instance serves any number of
/// concurrent verifications.
pub trait AttestationVerifier: Send + Sync {
    /// The format this verifier handles.
    fn format(&self) -> AttestationFormat;

    /// Verify the attestation statement in `ctx`. The first failed check is returned.
    fn verify(&self, ctx: &VerificationContext<'_>) -> VerificationResult<()>;
}

static FIDO_U2F: FidoU2fVerifier = FidoU2fVerifier;

static REGISTRY: &[&dyn AttestationVerifier] = &[&FIDO_U2F];

/// The verifier registered for `format`, if any.
pub fn registered_verifier(
    format: AttestationFormat,
) -> Option<&'static dyn AttestationVerifier> {
    REGISTRY.iter().copied().find(|v| v.format() == format)
}

fn resolve_verifier(format: &str) -> VerificationResult<&'static dyn AttestationVerifier> {
    let fmt = AttestationFormat::try_from(format)?;
    registered_verifier(fmt).ok_or_else(|| {
        debug!(%fmt, "no verifier registered");
        VerificationError::new(
            ErrorKind::UnsupportedFormat,
            format!("attestation format {} is not supported", fmt),
        )
    })
}

/// Verify an attestation statement of the named `format`.
///
/// `metadata` is optional. Without it no certificate trust validation is done.
pub fn verify_attestation(
    format: &str,
    att_stmt: &Value,
    auth_data_bytes: &[u8],
    client_data_hash: &[u8],
    metadata: Option<&dyn MetadataService>,
) -> VerificationResult<()> {
    let verifier = resolve_verifier(format)?;
    let ctx = VerificationContext::new(att_stmt, auth_data_bytes, client_data_hash, metadata)?;

    trace!(?ctx);

    verifier
        .verify(&ctx)
        .map(|()| debug!(%format, "attestation verified"))
        .map_err(|e| {
            debug!(%format, err = %e, "attestation verification failed");
            e
        })
}

/// Decode a CBOR attestation object and verify it.
pub fn verify_attestation_object(
    attestation_object: &[u8],
    client_data_hash: &[u8],
    metadata: Option<&dyn MetadataService>,
) -> VerificationResult<()> {
    let ao = AttestationObject::try_from(attestation_object)?;
    verify_attestation(
        &ao.fmt,
        &ao.att_stmt,
        &ao.auth_data_bytes,
        client_data_hash,
        metadata,
    )
}
