//! Cryptographic primitives used by the attestation verifiers.
//!
//! Everything here is a free function or a thin wrapper over an openssl
//! handle. There is no process wide state.

use std::convert::TryFrom;

use openssl::ec::EcKey;
use openssl::hash::{hash, MessageDigest};
use openssl::nid::Nid;
use openssl::pkey::{Id, Public};
use openssl::x509::X509;
use x509_parser::oid_registry::Oid;

use crate::authenticator_data::Aaguid;
use crate::codec::EcdsaSignature;
use crate::cose::{COSEAlgorithm, ECDSACurve};
use crate::error::{ErrorKind, VerificationError, VerificationResult};

/// id-fido-gen-ce-aaguid, the certificate extension that names the
/// authenticator model the certificate was issued to.
pub const FIDO_GEN_CE_AAGUID_OID: Oid<'static> = der_parser::oid!(1.3.6 .1 .4 .1 .45724 .1 .1 .4);

/// id-fido-u2f-ce-transports, the transports an attestation certificate was
/// issued for.
pub const FIDO_U2F_CE_TRANSPORTS_OID: Oid<'static> =
    der_parser::oid!(1.3.6 .1 .4 .1 .45724 .2 .1 .1);

bitflags::bitflags! {
    /// Transports named by the id-fido-u2f-ce-transports certificate extension.
    #[derive(Default)]
    pub struct U2fTransports: u8 {
        /// bluetoothRadio
        const BLUETOOTH_RADIO = 0x01;
        /// bluetoothLowEnergyRadio
        const BLUETOOTH_LOW_ENERGY = 0x02;
        /// uSB
        const USB = 0x04;
        /// nFC
        const NFC = 0x08;
        /// uSBInternal
        const USB_INTERNAL = 0x10;
    }
}

/// The digest applied to a message before it is signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl HashAlgorithm {
    fn message_digest(self) -> MessageDigest {
        match self {
            HashAlgorithm::Sha256 => MessageDigest::sha256(),
            HashAlgorithm::Sha384 => MessageDigest::sha384(),
            HashAlgorithm::Sha512 => MessageDigest::sha512(),
        }
    }

    /// Hash `data` with this algorithm.
    pub fn digest(self, data: &[u8]) -> VerificationResult<Vec<u8>> {
        hash(self.message_digest(), data)
            .map(|d| d.to_vec())
            .map_err(VerificationError::from)
    }
}

/// The signature scheme an algorithm identifier names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// ECDSA over a NIST curve
    Ecdsa,
    /// RSASSA-PKCS1-v1_5
    RsassaPkcs1v15,
    /// RSASSA-PSS
    RsassaPss,
    /// Pure EdDSA. The hash is internal to the scheme.
    EdDsa,
}

/// Map a COSE algorithm identifier to the hash and signature scheme it names.
///
/// This must be consulted before any signature is checked. Identifiers without
/// a mapping, including the recognised but insecure SHA-1 RSA algorithm, are
/// refused with [ErrorKind::UnsupportedAlgorithm].
pub fn algorithm_mapping(
    alg: COSEAlgorithm,
) -> VerificationResult<(HashAlgorithm, SignatureScheme)> {
    match alg {
        COSEAlgorithm::ES256 => Ok((HashAlgorithm::Sha256, SignatureScheme::Ecdsa)),
        COSEAlgorithm::ES384 => Ok((HashAlgorithm::Sha384, SignatureScheme::Ecdsa)),
        COSEAlgorithm::ES512 => Ok((HashAlgorithm::Sha512, SignatureScheme::Ecdsa)),
        COSEAlgorithm::RS256 => Ok((HashAlgorithm::Sha256, SignatureScheme::RsassaPkcs1v15)),
        COSEAlgorithm::RS384 => Ok((HashAlgorithm::Sha384, SignatureScheme::RsassaPkcs1v15)),
        COSEAlgorithm::RS512 => Ok((HashAlgorithm::Sha512, SignatureScheme::RsassaPkcs1v15)),
        COSEAlgorithm::PS256 => Ok((HashAlgorithm::Sha256, SignatureScheme::RsassaPss)),
        COSEAlgorithm::PS384 => Ok((HashAlgorithm::Sha384, SignatureScheme::RsassaPss)),
        COSEAlgorithm::PS512 => Ok((HashAlgorithm::Sha512, SignatureScheme::RsassaPss)),
        // Ed25519 uses SHA-512 internally.
        COSEAlgorithm::EDDSA => Ok((HashAlgorithm::Sha512, SignatureScheme::EdDsa)),
        COSEAlgorithm::INSECURE_RS1 => {
            warn!("INSECURE SHA1 USAGE DETECTED");
            Err(VerificationError::new(
                ErrorKind::UnsupportedAlgorithm,
                "sha1 based algorithms are not supported",
            ))
        }
    }
}

/// SHA-256 of `data`.
pub fn compute_sha256(data: &[u8]) -> [u8; 32] {
    openssl::sha::sha256(data)
}

/// The algorithm of a certificate's subject public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKeyAlgorithm {
    /// An elliptic curve key. The curve is `None` when it is not one of the
    /// NIST curves usable with WebAuthn.
    Ec(Option<ECDSACurve>),
    /// An RSA key
    Rsa,
    /// An Ed25519 key
    Ed25519,
    /// Anything else
    Other,
}

fn curve_from_nid(nid: Nid) -> Option<ECDSACurve> {
    match nid {
        Nid::X9_62_PRIME256V1 => Some(ECDSACurve::SECP256R1),
        Nid::SECP384R1 => Some(ECDSACurve::SECP384R1),
        Nid::SECP521R1 => Some(ECDSACurve::SECP521R1),
        _ => None,
    }
}

/// An attestation certificate, as carried in `x5c`.
#[derive(Clone)]
pub struct AttestationCertificate {
    x509: X509,
}

impl std::fmt::Debug for AttestationCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationCertificate")
            .field("subject", self.x509.subject_name())
            .finish()
    }
}

impl TryFrom<&[u8]> for AttestationCertificate {
    type Error = VerificationError;

    fn try_from(der: &[u8]) -> Result<Self, Self::Error> {
        X509::from_der(der)
            .map(|x509| AttestationCertificate { x509 })
            .map_err(|e| {
                debug!(?e, "X509::from_der");
                VerificationError::new(
                    ErrorKind::MalformedEncoding,
                    "attestation certificate is not valid der",
                )
            })
    }
}

impl From<X509> for AttestationCertificate {
    fn from(x509: X509) -> Self {
        AttestationCertificate { x509 }
    }
}

impl AttestationCertificate {
    /// The underlying openssl certificate.
    pub fn x509(&self) -> &X509 {
        &self.x509
    }

    /// The algorithm of the subject public key.
    pub fn public_key_algorithm(&self) -> VerificationResult<PublicKeyAlgorithm> {
        let pkey = self.x509.public_key()?;
        let alg = match pkey.id() {
            Id::EC => {
                let ec = pkey.ec_key()?;
                PublicKeyAlgorithm::Ec(ec.group().curve_name().and_then(curve_from_nid))
            }
            Id::RSA => PublicKeyAlgorithm::Rsa,
            Id::ED25519 => PublicKeyAlgorithm::Ed25519,
            _ => PublicKeyAlgorithm::Other,
        };
        Ok(alg)
    }

    /// The DER encoded SubjectPublicKeyInfo.
    pub fn public_key_bytes(&self) -> VerificationResult<Vec<u8>> {
        self.x509
            .public_key()?
            .public_key_to_der()
            .map_err(VerificationError::from)
    }

    /// The raw `extnValue` of the extension identified by `oid`, if present.
    pub fn extension_value(&self, oid: &Oid<'_>) -> VerificationResult<Option<Vec<u8>>> {
        let der_bytes = self.x509.to_der()?;
        let (_, cert) = x509_parser::parse_x509_certificate(&der_bytes).map_err(|e| {
            debug!(?e, "x509_parser::parse_x509_certificate");
            VerificationError::new(
                ErrorKind::MalformedEncoding,
                "attestation certificate could not be parsed",
            )
        })?;

        Ok(cert
            .extensions()
            .iter()
            .find(|extension| &extension.oid == oid)
            .map(|extension| extension.value.to_vec()))
    }

    /// The AAGUID named by the id-fido-gen-ce-aaguid extension, if present.
    pub fn fido_gen_ce_aaguid(&self) -> VerificationResult<Option<Aaguid>> {
        self.extension_value(&FIDO_GEN_CE_AAGUID_OID)?
            .map(|value| parse_aaguid_extension(&value))
            .transpose()
    }

    /// The transports named by the id-fido-u2f-ce-transports extension, if present.
    pub fn fido_u2f_transports(&self) -> VerificationResult<Option<U2fTransports>> {
        self.extension_value(&FIDO_U2F_CE_TRANSPORTS_OID)?
            .map(|value| parse_transports_extension(&value))
            .transpose()
    }

    /// The subject public key, which must be an EC key.
    pub fn ec_public_key(&self) -> VerificationResult<EcPublicKey> {
        let pkey = self.x509.public_key()?;
        let key = pkey.ec_key().map_err(|e| {
            debug!(?e, "certificate public key is not an ec key");
            VerificationError::new(
                ErrorKind::UnsupportedKeyAlgorithm,
                "certificate public key is not an ec key",
            )
        })?;
        Ok(EcPublicKey { key })
    }
}

// The extension value is an OCTET STRING holding the 16 byte AAGUID.
fn parse_aaguid_extension(value: &[u8]) -> VerificationResult<Aaguid> {
    let malformed = || {
        VerificationError::new(
            ErrorKind::MalformedEncoding,
            "id-fido-gen-ce-aaguid extension is not a 16 byte octet string",
        )
    };

    let (rem, obj) = der_parser::der::parse_der_octetstring(value).map_err(|e| {
        debug!(?e, "parse_der_octetstring");
        malformed()
    })?;

    if !rem.is_empty() {
        return Err(malformed());
    }

    obj.as_slice()
        .map_err(|_| malformed())
        .and_then(|s| Aaguid::try_from(s).map_err(|_| malformed()))
}

// A BIT STRING where bit 0 (the most significant bit of the first octet) is
// bluetoothRadio.
fn parse_transports_extension(value: &[u8]) -> VerificationResult<U2fTransports> {
    let malformed = || {
        VerificationError::new(
            ErrorKind::MalformedEncoding,
            "id-fido-u2f-ce-transports extension is not a bit string",
        )
    };

    let (_, obj) = der_parser::der::parse_der_bitstring(value).map_err(|e| {
        debug!(?e, "parse_der_bitstring");
        malformed()
    })?;

    let bits = match obj.content {
        der_parser::ber::BerObjectContent::BitString(_, bits) => bits.data.to_vec(),
        _ => return Err(malformed()),
    };

    let first = bits.first().copied().unwrap_or(0);
    let flags = (0..8)
        .filter(|i| first & (0x80 >> i) != 0)
        .fold(0u8, |acc, i| acc | (1 << i));

    Ok(U2fTransports::from_bits_truncate(flags))
}

/// An elliptic curve public key that can verify ECDSA signatures.
#[derive(Debug, Clone)]
pub struct EcPublicKey {
    key: EcKey<Public>,
}

impl EcPublicKey {
    /// The named curve of this key, if it is one of the supported curves.
    pub fn curve(&self) -> Option<ECDSACurve> {
        self.key.group().curve_name().and_then(curve_from_nid)
    }

    /// True if this key is on NIST P-256.
    pub fn is_p256(&self) -> bool {
        self.key.group().curve_name() == Some(Nid::X9_62_PRIME256V1)
    }

    /// Verify `signature` over `message` hashed with `hash`.
    ///
    /// `Ok(false)` means the signature is well formed but does not verify.
    pub fn verify(
        &self,
        hash: HashAlgorithm,
        message: &[u8],
        signature: &EcdsaSignature,
    ) -> VerificationResult<bool> {
        let digest = hash.digest(message)?;
        let sig = signature.to_openssl()?;
        sig.verify(&digest, &self.key)
            .map_err(VerificationError::from)
    }
}
