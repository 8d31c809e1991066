//! Authenticator metadata, as consumed by the attestation verifiers.
//!
//! The verifiers only see the [MetadataService] trait. How entries are fetched,
//! cached or refreshed is the business of the implementor.
//! [StaticMetadataService] is a simple in-memory implementation.

use std::collections::BTreeMap;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, NO_PAD, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authenticator_data::Aaguid;
use crate::crypto::compute_sha256;
use crate::error::{ErrorKind, VerificationError, VerificationResult};

// Metadata tables of contents are url safe base64, with and without padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    NO_PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A source of authenticator metadata keyed by AAGUID.
///
/// Implementations are shared between concurrent verifications and must not
/// rely on the order or number of calls.
pub trait MetadataService: Send + Sync {
    /// Return the entry for `aaguid`, if one is known.
    fn lookup(&self, aaguid: &Aaguid) -> Option<MetadataEntry>;
}

/// The parts of a FIDO metadata statement that attestation verification uses.
///
/// <https://fidoalliance.org/specs/mds/fido-metadata-statement-v3.0-ps-20210518.html>
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataStatement {
    /// Human readable authenticator description.
    #[serde(default)]
    pub description: Option<String>,
    /// The AAGUID of the authenticator, if it is a FIDO2 device.
    #[serde(default)]
    pub aaguid: Option<Uuid>,
    /// Base64 (standard alphabet) DER encoded trust anchors for attestation
    /// certificates issued to this authenticator model.
    #[serde(default)]
    pub attestation_root_certificates: Vec<String>,
}

/// A metadata entry: the statement as published, with the hash the metadata
/// table of contents claims for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    aaguid: Uuid,
    stored_hash: Vec<u8>,
    statement_bytes: Vec<u8>,
}

impl MetadataEntry {
    /// Create an entry from the claimed hash and the statement bytes it
    /// should cover. Nothing is validated here.
    pub fn new(aaguid: Uuid, stored_hash: Vec<u8>, statement_bytes: Vec<u8>) -> Self {
        MetadataEntry {
            aaguid,
            stored_hash,
            statement_bytes,
        }
    }

    /// The AAGUID this entry describes.
    pub fn aaguid(&self) -> Uuid {
        self.aaguid
    }

    /// The hash claimed for the statement by the table of contents.
    pub fn stored_hash(&self) -> &[u8] {
        &self.stored_hash
    }

    /// The SHA-256 of the statement as held in this entry.
    pub fn recomputed_hash(&self) -> [u8; 32] {
        compute_sha256(&self.statement_bytes)
    }

    /// True if the stored hash covers this entry's statement.
    pub fn is_intact(&self) -> bool {
        self.stored_hash.as_slice() == self.recomputed_hash()
    }

    /// Parse the statement. Only meaningful once [MetadataEntry::is_intact] holds.
    pub fn statement(&self) -> VerificationResult<MetadataStatement> {
        serde_json::from_slice(&self.statement_bytes).map_err(|e| {
            debug!(?e, "unable to parse metadata statement");
            VerificationError::new(
                ErrorKind::UntrustedMetadata,
                "metadata statement is not valid json",
            )
        })
    }

    /// The DER encoded trust anchors listed in the statement.
    pub fn trust_anchor_certificates(&self) -> VerificationResult<Vec<Vec<u8>>> {
        self.statement()?
            .attestation_root_certificates
            .iter()
            .map(|b64| {
                STANDARD.decode(b64).map_err(|e| {
                    debug!(?e, "invalid attestation root certificate encoding");
                    VerificationError::new(
                        ErrorKind::UntrustedMetadata,
                        "metadata trust anchor is not valid base64",
                    )
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MetadataFile {
    entries: Vec<MetadataFileEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MetadataFileEntry {
    aaguid: Uuid,
    hash: String,
    statement: String,
}

/// A [MetadataService] over a fixed set of entries.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadataService {
    entries: BTreeMap<Uuid, MetadataEntry>,
}

impl StaticMetadataService {
    /// An empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load entries from JSON of the form
    /// `{"entries":[{"aaguid": "...", "hash": "...", "statement": "..."}]}`
    /// where `hash` and `statement` are url safe base64.
    pub fn from_json(data: &str) -> VerificationResult<Self> {
        let file: MetadataFile = serde_json::from_str(data).map_err(|e| {
            error!(?e, "unable to parse metadata file");
            VerificationError::new(ErrorKind::MalformedEncoding, e.to_string())
        })?;

        let mut svc = Self::new();
        for entry in file.entries {
            let decode = |field: &str, value: &str| {
                URL_SAFE_LENIENT.decode(value).map_err(|e| {
                    error!(?e, aaguid = %entry.aaguid, "invalid base64 in metadata {}", field);
                    VerificationError::new(
                        ErrorKind::MalformedEncoding,
                        format!("metadata {} for {} is not valid base64", field, entry.aaguid),
                    )
                })
            };
            let hash = decode("hash", &entry.hash)?;
            let statement = decode("statement", &entry.statement)?;
            svc.insert(MetadataEntry::new(entry.aaguid, hash, statement));
        }

        debug!(entries = svc.len(), "loaded metadata");
        Ok(svc)
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, entry: MetadataEntry) {
        self.entries.insert(entry.aaguid, entry);
    }

    /// The number of entries held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MetadataService for StaticMetadataService {
    fn lookup(&self, aaguid: &Aaguid) -> Option<MetadataEntry> {
        let key = Uuid::from_bytes(*aaguid);
        let entry = self.entries.get(&key).cloned();
        trace!(%key, found = entry.is_some(), "metadata lookup");
        entry
    }
}
