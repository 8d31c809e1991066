/// Credential IDs longer than this are rejected while parsing authenticator data.
/// <https://www.w3.org/TR/webauthn-3/#credential-id>
pub const CREDENTIAL_ID_MAX_LEN: usize = 1023;

pub const RP_ID_HASH_LEN: usize = 32;
pub const AAGUID_LEN: usize = 16;
pub const CLIENT_DATA_HASH_LEN: usize = 32;

// Leading byte of an uncompressed SEC1 / ANSI X9.62 point.
pub const EC_POINT_UNCOMPRESSED: u8 = 0x04;

// Leading byte of the fido-u2f verification data (reserved for future use).
pub const U2F_RESERVED_BYTE: u8 = 0x00;

// x509_vfy.h result codes for a chain that ends at a self signed certificate
// absent from the trust store.
pub const X509_V_ERR_DEPTH_ZERO_SELF_SIGNED_CERT: i32 = 18;
pub const X509_V_ERR_SELF_SIGNED_CERT_IN_CHAIN: i32 = 19;
