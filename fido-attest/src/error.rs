//! Possible errors that may occur during attestation verification.

use thiserror::Error;

/// The category of a verification failure. Every check performed by the
/// engine is a hard gate, and the first failing gate determines the kind
/// that is reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    /// A CBOR, DER or COSE structure could not be decoded.
    #[error("malformed encoding")]
    MalformedEncoding,
    /// The authenticator data layout is inconsistent with its declared lengths.
    #[error("malformed authenticator data")]
    MalformedAuthenticatorData,
    /// Format specific statement fields are missing, have the wrong arity or
    /// the wrong type.
    #[error("malformed attestation statement")]
    MalformedStatement,
    /// The signature field is empty or is not a valid signature encoding.
    #[error("malformed signature")]
    MalformedSignature,
    /// The AAGUID does not satisfy the format's required value.
    #[error("invalid aaguid")]
    InvalidAaguid,
    /// The metadata entry's integrity hash does not match its content.
    #[error("untrusted metadata")]
    UntrustedMetadata,
    /// The certificate chain could not be built to a trust anchor.
    #[error("invalid certificate chain")]
    InvalidCertificateChain,
    /// The public key is not of the curve or algorithm the format requires.
    #[error("unsupported key algorithm")]
    UnsupportedKeyAlgorithm,
    /// A COSE algorithm identifier has no hash and signature scheme mapping.
    #[error("unsupported algorithm")]
    UnsupportedAlgorithm,
    /// No verifier is registered for the requested format tag.
    #[error("unsupported attestation format")]
    UnsupportedFormat,
    /// The cryptographic signature did not verify.
    #[error("signature verification failed")]
    SignatureVerificationFailed,
    /// The cryptographic provider failed independently of the input.
    #[error("cryptographic provider failure")]
    CryptoProvider,
}

/// A verification failure: the kind of failure and a human readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct VerificationError {
    kind: ErrorKind,
    detail: String,
}

impl VerificationError {
    /// Create a new error of `kind` with the supplied detail.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        VerificationError {
            kind,
            detail: detail.into(),
        }
    }

    /// The category of this failure.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human readable detail of this failure.
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl From<openssl::error::ErrorStack> for VerificationError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        VerificationError::new(ErrorKind::CryptoProvider, e.to_string())
    }
}

/// Result alias used throughout this crate.
pub type VerificationResult<T> = Result<T, VerificationError>;
