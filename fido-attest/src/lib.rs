//! fido-attest - FIDO2 / Webauthn attestation statement verification
//!
//! During a Webauthn registration the authenticator returns an attestation
//! object. The attestation statement inside it is signed evidence that the new
//! credential was created by a genuine authenticator of a given model. This
//! crate decodes that statement, rebuilds the bytes the authenticator signed,
//! validates the attestation certificate against metadata trust anchors and
//! checks the signature.
//!
//! Verification is a pure function of its inputs plus at most one lookup in a
//! caller supplied [MetadataService]. There is no shared mutable state, so any
//! number of verifications may run concurrently.
//!
//! ```no_run
//! use fido_attest::{verify_attestation_object, StaticMetadataService};
//!
//! # fn example(attestation_object: &[u8], client_data_hash: &[u8]) {
//! let mds = StaticMetadataService::new();
//! match verify_attestation_object(attestation_object, client_data_hash, Some(&mds)) {
//!     Ok(()) => println!("attestation is valid"),
//!     Err(e) => println!("attestation rejected: {}", e),
//! }
//! # }
//! ```

#![warn(unused_extern_crates)]
#![warn(missing_docs)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

#[macro_use]
extern crate tracing;

#[macro_use]
mod macros;

mod constants;

pub mod attestation;
pub mod authenticator_data;
pub mod codec;
pub mod cose;
pub mod crypto;
pub mod error;
pub mod metadata;
pub mod trust;

pub use crate::attestation::{
    registered_verifier, verify_attestation, verify_attestation_object, AttestationFormat,
    AttestationVerifier, FidoU2fVerifier, VerificationContext,
};
pub use crate::authenticator_data::{Aaguid, AuthenticatorData, AuthenticatorFlags};
pub use crate::codec::AttestationObject;
pub use crate::constants::CREDENTIAL_ID_MAX_LEN;
pub use crate::error::{ErrorKind, VerificationError, VerificationResult};
pub use crate::metadata::{MetadataEntry, MetadataService, StaticMetadataService};
pub use crate::trust::{ChainPolicy, ChainTrust};
