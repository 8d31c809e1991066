//! COSE public key records as carried in attested credential data.
//!
//! See <https://tools.ietf.org/html/rfc8152#section-7> and
//! <https://www.iana.org/assignments/cose/cose.xhtml>.

#![allow(non_camel_case_types)]

use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::constants::EC_POINT_UNCOMPRESSED;
use crate::error::{ErrorKind, VerificationError, VerificationResult};

/// A COSE algorithm identifier that this crate recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum COSEAlgorithm {
    /// ECDSA with SHA-256 (recommends curve P-256)
    ES256 = -7,
    /// ECDSA with SHA-384 (recommends curve P-384)
    ES384 = -35,
    /// ECDSA with SHA-512 (recommends curve P-521)
    ES512 = -36,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RS256 = -257,
    /// RSASSA-PKCS1-v1_5 with SHA-384
    RS384 = -258,
    /// RSASSA-PKCS1-v1_5 with SHA-512
    RS512 = -259,
    /// RSASSA-PSS with SHA-256
    PS256 = -37,
    /// RSASSA-PSS with SHA-384
    PS384 = -38,
    /// RSASSA-PSS with SHA-512
    PS512 = -39,
    /// EdDSA
    EDDSA = -8,
    /// RSASSA-PKCS1-v1_5 with SHA-1. Recognised so that it can be refused.
    INSECURE_RS1 = -65535,
}

impl TryFrom<i128> for COSEAlgorithm {
    type Error = VerificationError;

    fn try_from(i: i128) -> Result<Self, Self::Error> {
        match i {
            -7 => Ok(COSEAlgorithm::ES256),
            -35 => Ok(COSEAlgorithm::ES384),
            -36 => Ok(COSEAlgorithm::ES512),
            -257 => Ok(COSEAlgorithm::RS256),
            -258 => Ok(COSEAlgorithm::RS384),
            -259 => Ok(COSEAlgorithm::RS512),
            -37 => Ok(COSEAlgorithm::PS256),
            -38 => Ok(COSEAlgorithm::PS384),
            -39 => Ok(COSEAlgorithm::PS512),
            -8 => Ok(COSEAlgorithm::EDDSA),
            -65535 => Ok(COSEAlgorithm::INSECURE_RS1),
            _ => Err(VerificationError::new(
                ErrorKind::UnsupportedAlgorithm,
                format!("unrecognised cose algorithm identifier {}", i),
            )),
        }
    }
}

impl From<COSEAlgorithm> for i128 {
    fn from(a: COSEAlgorithm) -> i128 {
        a as i32 as i128
    }
}

/// An elliptic curve identifier for EC2 keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ECDSACurve {
    // +---------+-------+----------+------------------------------------+
    // | Name    | Value | Key Type | Description                        |
    // +---------+-------+----------+------------------------------------+
    // | P-256   | 1     | EC2      | NIST P-256 also known as secp256r1 |
    // | P-384   | 2     | EC2      | NIST P-384 also known as secp384r1 |
    // | P-521   | 3     | EC2      | NIST P-521 also known as secp521r1 |
    // +---------+-------+----------+------------------------------------+
    /// Identifies this curve as SECP256R1 (X9_62_PRIME256V1 in OpenSSL)
    SECP256R1 = 1,
    /// Identifies this curve as SECP384R1
    SECP384R1 = 2,
    /// Identifies this curve as SECP521R1
    SECP521R1 = 3,
}

impl TryFrom<i128> for ECDSACurve {
    type Error = VerificationError;

    fn try_from(i: i128) -> Result<Self, Self::Error> {
        match i {
            1 => Ok(ECDSACurve::SECP256R1),
            2 => Ok(ECDSACurve::SECP384R1),
            3 => Ok(ECDSACurve::SECP521R1),
            _ => Err(VerificationError::new(
                ErrorKind::MalformedEncoding,
                format!("unrecognised ec2 curve identifier {}", i),
            )),
        }
    }
}

impl ECDSACurve {
    /// The byte length of one affine coordinate on this curve.
    pub fn coordinate_size(self) -> usize {
        match self {
            ECDSACurve::SECP256R1 => 32,
            ECDSACurve::SECP384R1 => 48,
            ECDSACurve::SECP521R1 => 66,
        }
    }
}

/// An EdDSA curve identifier for OKP keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EDDSACurve {
    /// Identifies this OKP as ED25519
    ED25519 = 6,
    /// Identifies this OKP as ED448
    ED448 = 7,
}

impl EDDSACurve {
    /// The byte length of a public key on this curve.
    pub fn coordinate_size(self) -> usize {
        match self {
            EDDSACurve::ED25519 => 32,
            EDDSACurve::ED448 => 57,
        }
    }
}

/// The numeric id of the key type (`kty`, label 1) used in the CBOR fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum COSEKeyTypeId {
    /// Octet Key Pair
    EC_OKP = 1,
    /// Elliptic Curve Keys w/ x- and y-coordinate
    EC_EC2 = 2,
    /// RSA
    EC_RSA = 3,
}

/// A COSE Elliptic Curve public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEEC2Key {
    /// The curve that this key references.
    pub curve: ECDSACurve,
    /// The key's public X coordinate.
    pub x: Vec<u8>,
    /// The key's public Y coordinate.
    pub y: Vec<u8>,
}

impl COSEEC2Key {
    /// Encode this key as the raw ANSI X9.62 uncompressed point `0x04 || x || y`.
    /// This is the public key format of FIDO U2F.
    pub fn to_x962_raw(&self) -> Vec<u8> {
        std::iter::once(EC_POINT_UNCOMPRESSED)
            .chain(self.x.iter().copied())
            .chain(self.y.iter().copied())
            .collect()
    }

    /// Recover the coordinates from a raw ANSI X9.62 uncompressed point.
    pub fn from_x962_raw(curve: ECDSACurve, raw: &[u8]) -> VerificationResult<Self> {
        let coord_len = curve.coordinate_size();
        match raw.split_first() {
            Some((&EC_POINT_UNCOMPRESSED, coords)) if coords.len() == coord_len * 2 => {
                let (x, y) = coords.split_at(coord_len);
                Ok(COSEEC2Key {
                    curve,
                    x: x.to_vec(),
                    y: y.to_vec(),
                })
            }
            _ => Err(VerificationError::new(
                ErrorKind::MalformedEncoding,
                format!(
                    "expected a {} byte uncompressed point for {:?}",
                    1 + coord_len * 2,
                    curve
                ),
            )),
        }
    }
}

/// A COSE Octet Key Pair public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEOKPKey {
    /// The curve that this key references.
    pub curve: EDDSACurve,
    /// The key's public X coordinate.
    pub x: Vec<u8>,
}

/// A COSE RSA public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSERSAKey {
    /// An RSA modulus
    pub n: Vec<u8>,
    /// An RSA exponent
    pub e: Vec<u8>,
}

/// The type of key contained within a COSE value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum COSEKeyType {
    /// Identifies this as an Eliptic Curve octet key pair
    EC_OKP(COSEOKPKey),
    /// Identifies this as an Eliptic Curve EC2 key
    EC_EC2(COSEEC2Key),
    /// Identifies this as an RSA key
    RSA(COSERSAKey),
}

/// A COSE public key as provided by the authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEKey {
    /// The algorithm this key is to be used with
    pub type_: COSEAlgorithm,
    /// The public key
    pub key: COSEKeyType,
}

impl COSEKey {
    /// Convert this key to the raw U2F public key format `0x04 || x || y`.
    pub fn get_alg_key_ecc_x962_raw(&self) -> VerificationResult<Vec<u8>> {
        match &self.key {
            COSEKeyType::EC_EC2(ecpk) => Ok(ecpk.to_x962_raw()),
            _ => {
                debug!("get_alg_key_ecc_x962_raw on a non ec2 key");
                Err(VerificationError::new(
                    ErrorKind::UnsupportedKeyAlgorithm,
                    "credential public key is not an ec2 key",
                ))
            }
        }
    }
}

fn cose_map_get<'a>(
    m: &'a std::collections::BTreeMap<serde_cbor_2::Value, serde_cbor_2::Value>,
    label: i128,
) -> VerificationResult<&'a serde_cbor_2::Value> {
    m.get(&serde_cbor_2::Value::Integer(label)).ok_or_else(|| {
        VerificationError::new(
            ErrorKind::MalformedEncoding,
            format!("cose key is missing label {}", label),
        )
    })
}

fn mismatch(key_type: i128, alg: COSEAlgorithm) -> VerificationError {
    debug!(?key_type, ?alg, "cose key type and algorithm are inconsistent");
    VerificationError::new(
        ErrorKind::MalformedEncoding,
        format!("cose key type {} can not be used with {:?}", key_type, alg),
    )
}

impl TryFrom<&serde_cbor_2::Value> for COSEKey {
    type Error = VerificationError;

    fn try_from(d: &serde_cbor_2::Value) -> Result<COSEKey, Self::Error> {
        let m = cbor_try_map!(d)?;

        // Labels 1 (kty) and 3 (alg) are common to all key types. Negative labels
        // are key type specific.
        let key_type = cose_map_get(m, 1).and_then(|v| cbor_try_i128!(v))?;
        let alg_id = cose_map_get(m, 3).and_then(|v| cbor_try_i128!(v))?;

        // The algorithm must be recognised before anything else is done with the key.
        let type_ = COSEAlgorithm::try_from(alg_id)?;

        let key = if key_type == COSEKeyTypeId::EC_EC2 as i128 {
            if !matches!(
                type_,
                COSEAlgorithm::ES256 | COSEAlgorithm::ES384 | COSEAlgorithm::ES512
            ) {
                return Err(mismatch(key_type, type_));
            }

            // crv (-1), x (-2) and y (-3)
            let curve = cose_map_get(m, -1)
                .and_then(|v| cbor_try_i128!(v))
                .and_then(ECDSACurve::try_from)?;
            let x = cose_map_get(m, -2).and_then(|v| cbor_try_bytes!(v))?;
            let y = cose_map_get(m, -3).and_then(|v| cbor_try_bytes!(v))?;

            let coord_len = curve.coordinate_size();
            if x.len() != coord_len || y.len() != coord_len {
                return Err(VerificationError::new(
                    ErrorKind::MalformedEncoding,
                    format!(
                        "ec2 coordinates must be {} bytes for {:?}, got x={} y={}",
                        coord_len,
                        curve,
                        x.len(),
                        y.len()
                    ),
                ));
            }

            COSEKeyType::EC_EC2(COSEEC2Key {
                curve,
                x: x.clone(),
                y: y.clone(),
            })
        } else if key_type == COSEKeyTypeId::EC_RSA as i128 {
            if !matches!(
                type_,
                COSEAlgorithm::RS256
                    | COSEAlgorithm::RS384
                    | COSEAlgorithm::RS512
                    | COSEAlgorithm::PS256
                    | COSEAlgorithm::PS384
                    | COSEAlgorithm::PS512
                    | COSEAlgorithm::INSECURE_RS1
            ) {
                return Err(mismatch(key_type, type_));
            }

            // n (-1), e (-2)
            let n = cose_map_get(m, -1).and_then(|v| cbor_try_bytes!(v))?;
            let e = cose_map_get(m, -2).and_then(|v| cbor_try_bytes!(v))?;

            if n.is_empty() || e.is_empty() {
                return Err(VerificationError::new(
                    ErrorKind::MalformedEncoding,
                    "rsa modulus and exponent must not be empty",
                ));
            }

            COSEKeyType::RSA(COSERSAKey {
                n: n.clone(),
                e: e.clone(),
            })
        } else if key_type == COSEKeyTypeId::EC_OKP as i128 {
            if type_ != COSEAlgorithm::EDDSA {
                return Err(mismatch(key_type, type_));
            }

            let curve = match cose_map_get(m, -1).and_then(|v| cbor_try_i128!(v))? {
                6 => EDDSACurve::ED25519,
                7 => EDDSACurve::ED448,
                c => {
                    return Err(VerificationError::new(
                        ErrorKind::MalformedEncoding,
                        format!("unrecognised okp curve identifier {}", c),
                    ))
                }
            };
            let x = cose_map_get(m, -2).and_then(|v| cbor_try_bytes!(v))?;

            if x.len() != curve.coordinate_size() {
                return Err(VerificationError::new(
                    ErrorKind::MalformedEncoding,
                    format!("okp key must be {} bytes", curve.coordinate_size()),
                ));
            }

            COSEKeyType::EC_OKP(COSEOKPKey {
                curve,
                x: x.clone(),
            })
        } else {
            debug!(?key_type, ?type_, "unrecognised cose key type");
            return Err(VerificationError::new(
                ErrorKind::MalformedEncoding,
                format!("unrecognised cose key type {}", key_type),
            ));
        };

        Ok(COSEKey { type_, key })
    }
}
