//! Authenticator data, as signed by the authenticator during registration.
//!
//! <https://www.w3.org/TR/webauthn-3/#sctn-authenticator-data>

use std::convert::TryFrom;

use bitflags::bitflags;
use nom::bytes::complete::take;
use nom::combinator::{cond, verify};
use nom::number::complete::{be_u16, be_u32, u8 as nom_u8};
use uuid::Uuid;

use crate::constants::{AAGUID_LEN, CREDENTIAL_ID_MAX_LEN, RP_ID_HASH_LEN};
use crate::cose::COSEKey;
use crate::error::{ErrorKind, VerificationError, VerificationResult};

/// An authenticator attestation GUID.
pub type Aaguid = [u8; AAGUID_LEN];

bitflags! {
    /// The flags byte of the authenticator data.
    ///
    /// Reference: <https://www.w3.org/TR/webauthn-3/#authdata-flags>
    #[derive(Default)]
    pub struct AuthenticatorFlags: u8 {
        /// User present
        const USER_PRESENT = 0x01;
        /// User verified
        const USER_VERIFIED = 0x04;
        /// Backup eligible
        const BACKUP_ELIGIBLE = 0x08;
        /// Backed up
        const BACKED_UP = 0x10;
        /// Attested credential data included
        const ATTESTED_CREDENTIAL_DATA = 0x40;
        /// Extension data included
        const EXTENSION_DATA = 0x80;
    }
}

/// The credential created by the authenticator, as found in the authenticator data.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestedCredentialData {
    /// The authenticator model identifier.
    pub aaguid: Aaguid,
    /// The credential ID.
    pub credential_id: Vec<u8>,
    /// The credential public key, still as CBOR. Use
    /// [AttestedCredentialData::credential_public_key] to interpret it.
    pub credential_pk: serde_cbor_2::Value,
}

impl AttestedCredentialData {
    /// True if the AAGUID is sixteen zero bytes.
    pub fn aaguid_is_zero(&self) -> bool {
        self.aaguid.iter().all(|b| *b == 0)
    }

    /// The AAGUID as a [Uuid].
    pub fn aaguid_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.aaguid)
    }

    /// Interpret the credential public key as a COSE key.
    pub fn credential_public_key(&self) -> VerificationResult<COSEKey> {
        COSEKey::try_from(&self.credential_pk)
    }
}

/// Parsed authenticator data.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    /// The SHA-256 hash of the relying party id.
    pub rp_id_hash: [u8; RP_ID_HASH_LEN],
    /// The flags byte.
    pub flags: AuthenticatorFlags,
    /// The signature counter.
    pub counter: u32,
    /// Present if and only if [AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA] is set.
    pub acd: Option<AttestedCredentialData>,
    /// Present if and only if [AuthenticatorFlags::EXTENSION_DATA] is set.
    pub extensions: Option<serde_cbor_2::Value>,
}

impl AuthenticatorData {
    /// True if the user present flag is set.
    pub fn user_present(&self) -> bool {
        self.flags.contains(AuthenticatorFlags::USER_PRESENT)
    }

    /// True if the user verified flag is set.
    pub fn user_verified(&self) -> bool {
        self.flags.contains(AuthenticatorFlags::USER_VERIFIED)
    }
}

fn failure(i: &[u8], kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Failure(nom::error::Error::new(i, kind))
}

// Consumes exactly one CBOR item and returns the remainder.
fn cbor_parser(i: &[u8]) -> nom::IResult<&[u8], serde_cbor_2::Value> {
    let mut deserializer = serde_cbor_2::Deserializer::from_slice(i);
    let v = serde::de::Deserialize::deserialize(&mut deserializer).map_err(|e| {
        debug!(?e, "cbor_parser");
        failure(i, nom::error::ErrorKind::Fail)
    })?;

    let len = deserializer.byte_offset();
    let rem = i
        .get(len..)
        .ok_or_else(|| failure(i, nom::error::ErrorKind::Eof))?;

    Ok((rem, v))
}

fn acd_parser(i: &[u8]) -> nom::IResult<&[u8], AttestedCredentialData> {
    let (i, aaguid) = take(AAGUID_LEN)(i)?;
    let (i, cred_id_len) = verify(be_u16, |l: &u16| {
        (*l as usize) <= CREDENTIAL_ID_MAX_LEN
    })(i)?;
    let (i, cred_id) = take(cred_id_len as usize)(i)?;
    let (i, cred_pk) = cbor_parser(i)?;

    let mut aaguid_bytes = [0; AAGUID_LEN];
    aaguid_bytes.copy_from_slice(aaguid);

    Ok((
        i,
        AttestedCredentialData {
            aaguid: aaguid_bytes,
            credential_id: cred_id.to_vec(),
            credential_pk: cred_pk,
        },
    ))
}

fn authenticator_data_parser(i: &[u8]) -> nom::IResult<&[u8], AuthenticatorData> {
    let (i, rp_id_hash) = take(RP_ID_HASH_LEN)(i)?;
    let (i, data_flags) = nom_u8(i)?;
    let flags = AuthenticatorFlags::from_bits_truncate(data_flags);
    let (i, counter) = be_u32(i)?;

    let (i, acd) = cond(
        flags.contains(AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA),
        acd_parser,
    )(i)?;
    let (i, extensions) = cond(
        flags.contains(AuthenticatorFlags::EXTENSION_DATA),
        cbor_parser,
    )(i)?;

    let mut rp_id_hash_bytes = [0; RP_ID_HASH_LEN];
    rp_id_hash_bytes.copy_from_slice(rp_id_hash);

    Ok((
        i,
        AuthenticatorData {
            rp_id_hash: rp_id_hash_bytes,
            flags,
            counter,
            acd,
            extensions,
        },
    ))
}

impl TryFrom<&[u8]> for AuthenticatorData {
    type Error = VerificationError;

    fn try_from(auth_data_bytes: &[u8]) -> Result<Self, Self::Error> {
        let (rem, auth_data) = authenticator_data_parser(auth_data_bytes).map_err(|e| {
            debug!(?e, "try_from authenticator_data_parser");
            VerificationError::new(
                ErrorKind::MalformedAuthenticatorData,
                "authenticator data is truncated or declares inconsistent lengths",
            )
        })?;

        if !rem.is_empty() {
            debug!(trailing = rem.len(), "trailing bytes after authenticator data");
            return Err(VerificationError::new(
                ErrorKind::MalformedAuthenticatorData,
                format!("{} unexpected trailing bytes in authenticator data", rem.len()),
            ));
        }

        trace!(flags = ?auth_data.flags, counter = auth_data.counter, "parsed authenticator data");
        Ok(auth_data)
    }
}
