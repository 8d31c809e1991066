//! The fido-u2f attestation statement format.
//!
//! <https://www.w3.org/TR/webauthn-3/#sctn-fido-u2f-attestation>
//!
//! ```text
//! u2fStmtFormat = {
//!     x5c: [ attestnCert: bytes ],
//!     sig: bytes
//! }
//! ```

use std::collections::BTreeMap;
use std::convert::TryFrom;

use openssl::x509::X509;
use serde_cbor_2::Value;

use super::{AttestationFormat, AttestationVerifier, VerificationContext};
use crate::authenticator_data::AttestedCredentialData;
use crate::codec::EcdsaSignature;
use crate::constants::U2F_RESERVED_BYTE;
use crate::cose::{COSEKeyType, ECDSACurve};
use crate::crypto::{algorithm_mapping, AttestationCertificate, SignatureScheme};
use crate::error::{ErrorKind, VerificationError, VerificationResult};
use crate::metadata::MetadataService;
use crate::trust::{build_chain, ChainPolicy, ChainTrust};

fn err(kind: ErrorKind, detail: &str) -> VerificationError {
    debug!(%kind, "fido-u2f: {}", detail);
    VerificationError::new(kind, detail)
}

struct U2fStatement<'a> {
    attestn_cert: &'a [u8],
    sig: Option<&'a Value>,
}

impl<'a> TryFrom<&'a BTreeMap<Value, Value>> for U2fStatement<'a> {
    type Error = VerificationError;

    fn try_from(att_stmt: &'a BTreeMap<Value, Value>) -> Result<Self, Self::Error> {
        let mut x5c = None;
        let mut sig = None;

        for (k, v) in att_stmt.iter() {
            match k {
                Value::Text(s) if s == "x5c" => x5c = Some(v),
                Value::Text(s) if s == "sig" => sig = Some(v),
                _ => {
                    debug!(key = ?k, "fido-u2f: unexpected statement key");
                    return Err(err(
                        ErrorKind::MalformedStatement,
                        "unexpected key in attestation statement",
                    ));
                }
            }
        }

        let x5c = x5c
            .ok_or_else(|| err(ErrorKind::MalformedStatement, "x5c is missing"))
            .and_then(|v| {
                cbor_try_array!(v)
                    .map_err(|_| err(ErrorKind::MalformedStatement, "x5c is not an array"))
            })?;

        // The attestation certificate must be the one and only element.
        let attestn_cert = match x5c.as_slice() {
            [Value::Bytes(der)] if !der.is_empty() => der.as_slice(),
            [_] => {
                return Err(err(
                    ErrorKind::MalformedStatement,
                    "x5c element is not a non-empty byte string",
                ));
            }
            _ => {
                return Err(err(
                    ErrorKind::MalformedStatement,
                    "x5c must contain exactly one certificate",
                ));
            }
        };

        Ok(U2fStatement { attestn_cert, sig })
    }
}

/// Verifier for the fido-u2f format.
///
/// The [MetadataService] is asked for the AAGUID named by the attestation
/// certificate's id-fido-gen-ce-aaguid extension when the certificate carries
/// one. Otherwise it is asked for the credential's AAGUID, which for this
/// format is always zero. No entry means no trust validation.
///
/// Metadata based trust validation accepts a chain that ends at a self signed
/// root which is not in the platform trust store, as long as the chain is
/// otherwise valid. FIDO conformance tooling issues its attestation roots this
/// way. The exception is limited to this format and is logged whenever it is
/// applied.
#[derive(Debug, Default, Clone, Copy)]
pub struct FidoU2fVerifier;

impl FidoU2fVerifier {
    fn validate_metadata(
        mds: &dyn MetadataService,
        attestn_cert: &AttestationCertificate,
        acd: &AttestedCredentialData,
    ) -> VerificationResult<()> {
        // Prefer the model named by the certificate, U2F devices report a zero AAGUID.
        let aaguid = attestn_cert.fido_gen_ce_aaguid()?.unwrap_or(acd.aaguid);

        let entry = match mds.lookup(&aaguid) {
            Some(entry) => entry,
            None => {
                debug!(aaguid = %uuid::Uuid::from_bytes(aaguid), "no metadata entry, trust validation skipped");
                return Ok(());
            }
        };

        if !entry.is_intact() {
            error!(aaguid = %entry.aaguid(), "metadata statement hash mismatch");
            return Err(err(
                ErrorKind::UntrustedMetadata,
                "metadata statement does not match its stored hash",
            ));
        }

        let anchors = entry
            .trust_anchor_certificates()?
            .iter()
            .map(|der| {
                X509::from_der(der).map_err(|e| {
                    debug!(?e, "metadata trust anchor X509::from_der");
                    err(
                        ErrorKind::UntrustedMetadata,
                        "metadata trust anchor is not a der certificate",
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let policy = ChainPolicy {
            revocation_checks: false,
            ..Default::default()
        };

        match build_chain(attestn_cert, &anchors, &policy)? {
            ChainTrust::Trusted => Ok(()),
            ChainTrust::UntrustedSelfSigned => {
                warn!(
                    aaguid = %entry.aaguid(),
                    "accepting attestation chain ending at an untrusted self signed root"
                );
                Ok(())
            }
            ChainTrust::Invalid(reason) => {
                debug!(%reason, "fido-u2f: attestation chain rejected");
                Err(VerificationError::new(
                    ErrorKind::InvalidCertificateChain,
                    format!("attestation certificate chain is invalid: {}", reason),
                ))
            }
        }
    }
}

impl AttestationVerifier for FidoU2fVerifier {
    fn format(&self) -> AttestationFormat {
        AttestationFormat::FIDOU2F
    }

    fn verify(&self, ctx: &VerificationContext<'_>) -> VerificationResult<()> {
        let acd = ctx.attested_credential_data()?;

        // The AAGUID predates U2F, so authenticators must zero it.
        if !acd.aaguid_is_zero() {
            return Err(err(
                ErrorKind::InvalidAaguid,
                "aaguid must be zero for fido-u2f attestation",
            ));
        }

        let stmt = U2fStatement::try_from(ctx.att_stmt())?;

        let attestn_cert = AttestationCertificate::try_from(stmt.attestn_cert)?;
        if let Ok(Some(transports)) = attestn_cert.fido_u2f_transports() {
            trace!(?transports, "fido-u2f attestation certificate transports");
        }

        if let Some(mds) = ctx.metadata() {
            Self::validate_metadata(mds, &attestn_cert, acd)?;
        }

        // If certificate public key is not an Elliptic Curve (EC) public key over
        // the P-256 curve, terminate this algorithm and return an appropriate error.
        let cert_key = attestn_cert.ec_public_key()?;
        if !cert_key.is_p256() {
            return Err(err(
                ErrorKind::UnsupportedKeyAlgorithm,
                "attestation certificate key is not on p-256",
            ));
        }

        let credential_pk = acd.credential_public_key()?;
        let public_key_u2f = match &credential_pk.key {
            COSEKeyType::EC_EC2(ec2k) if ec2k.curve == ECDSACurve::SECP256R1 => ec2k.to_x962_raw(),
            _ => {
                return Err(err(
                    ErrorKind::UnsupportedKeyAlgorithm,
                    "credential public key is not an ec2 p-256 key",
                ));
            }
        };

        let (hash, scheme) = algorithm_mapping(credential_pk.type_)?;
        if scheme != SignatureScheme::Ecdsa {
            return Err(err(
                ErrorKind::UnsupportedAlgorithm,
                "credential algorithm is not ecdsa",
            ));
        }

        // verificationData = 0x00 || rpIdHash || clientDataHash || credentialId || publicKeyU2F
        let verification_data: Vec<u8> = std::iter::once(U2F_RESERVED_BYTE)
            .chain(ctx.auth_data().rp_id_hash.iter().copied())
            .chain(ctx.client_data_hash().iter().copied())
            .chain(acd.credential_id.iter().copied())
            .chain(public_key_u2f.iter().copied())
            .collect();

        let sig_bytes = match stmt.sig {
            Some(Value::Bytes(sig)) if !sig.is_empty() => sig,
            Some(_) => {
                return Err(err(
                    ErrorKind::MalformedSignature,
                    "sig is not a non-empty byte string",
                ));
            }
            None => return Err(err(ErrorKind::MalformedSignature, "sig is missing")),
        };

        let signature = EcdsaSignature::from_der(sig_bytes, ECDSACurve::SECP256R1.coordinate_size())
            .map_err(|e| {
                debug!(err = %e, "fido-u2f: signature decode");
                VerificationError::new(
                    ErrorKind::MalformedSignature,
                    "sig is not a der encoded ecdsa signature",
                )
            })?;

        if cert_key.verify(hash, &verification_data, &signature)? {
            Ok(())
        } else {
            Err(err(
                ErrorKind::SignatureVerificationFailed,
                "attestation signature does not verify",
            ))
        }
    }
}
