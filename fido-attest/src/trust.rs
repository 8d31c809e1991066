//! Certificate path construction against a set of trust anchors.
//!
//! This module only classifies a chain. What a classification means for a
//! given attestation format is up to the caller.

use openssl::stack;
use openssl::x509::store::{X509Store, X509StoreBuilder};
use openssl::x509::verify::X509VerifyFlags;
use openssl::x509::{X509StoreContext, X509VerifyResult, X509};

use crate::constants::{
    X509_V_ERR_DEPTH_ZERO_SELF_SIGNED_CERT, X509_V_ERR_SELF_SIGNED_CERT_IN_CHAIN,
};
use crate::crypto::AttestationCertificate;
use crate::error::VerificationResult;

/// Options that control how a certificate chain is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPolicy {
    /// Require CRLs for every certificate in the chain.
    pub revocation_checks: bool,
    /// Check the validity period of every certificate in the chain.
    pub check_time: bool,
    /// Consult the platform trust store in addition to the supplied anchors.
    pub use_system_roots: bool,
}

impl Default for ChainPolicy {
    fn default() -> Self {
        ChainPolicy {
            revocation_checks: false,
            check_time: true,
            use_system_roots: true,
        }
    }
}

impl ChainPolicy {
    fn verify_flags(&self) -> X509VerifyFlags {
        let mut flags = X509VerifyFlags::empty();
        if self.revocation_checks {
            flags |= X509VerifyFlags::CRL_CHECK | X509VerifyFlags::CRL_CHECK_ALL;
        }
        if !self.check_time {
            flags |= X509VerifyFlags::NO_CHECK_TIME;
        }
        flags
    }
}

/// The outcome of building a chain from a leaf certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainTrust {
    /// The chain ends at a trusted root.
    Trusted,
    /// The chain ends at a self signed root that is not in any trust store,
    /// and is otherwise valid.
    UntrustedSelfSigned,
    /// The chain could not be built. Carries the openssl verify result.
    Invalid(String),
}

struct ChainOutcome {
    result: X509VerifyResult,
    root: Option<X509>,
}

fn build_store(policy: &ChainPolicy, extra_root: Option<&X509>) -> VerificationResult<X509Store> {
    let mut ca_store = X509StoreBuilder::new()?;

    if policy.use_system_roots {
        ca_store.set_default_paths()?;
    }

    let flags = policy.verify_flags();
    if !flags.is_empty() {
        ca_store.set_flags(flags)?;
    }

    if let Some(root) = extra_root {
        ca_store.add_cert(root.clone())?;
    }

    Ok(ca_store.build())
}

fn verify_once(
    store: &X509Store,
    leaf: &X509,
    untrusted: &stack::StackRef<X509>,
) -> VerificationResult<ChainOutcome> {
    let mut ca_ctx = X509StoreContext::new()?;

    // The inner closure must return an ErrorStack for openssl, so the verify
    // result is carried out in the Ok arm.
    let outcome = ca_ctx
        .init(store, leaf, untrusted, |ca_ctx_ref| {
            ca_ctx_ref.verify_cert().map(|_| {
                let result = ca_ctx_ref.error();
                if result != X509VerifyResult::OK {
                    debug!(
                        "ca_ctx_ref verify cert - error depth={}, sn={:?}",
                        ca_ctx_ref.error_depth(),
                        ca_ctx_ref.current_cert().map(|crt| crt.subject_name())
                    );
                }
                // The last certificate of the partial chain is where path building stopped.
                let root = ca_ctx_ref
                    .chain()
                    .and_then(|chain| chain.iter().last())
                    .map(|crt| crt.to_owned());
                ChainOutcome { result, root }
            })
        })
        .map_err(|e| {
            error!(?e);
            e
        })?;

    Ok(outcome)
}

/// Build a path from `leaf` using `anchors` as candidate issuers and classify it.
///
/// A chain that stops at a self signed certificate absent from the trust store
/// is verified a second time with that certificate trusted. Only if that
/// second pass is clean is it reported as [ChainTrust::UntrustedSelfSigned];
/// expiry, broken signatures or revocation still make it [ChainTrust::Invalid].
pub fn build_chain(
    leaf: &AttestationCertificate,
    anchors: &[X509],
    policy: &ChainPolicy,
) -> VerificationResult<ChainTrust> {
    classify_chain(leaf, anchors, policy, None)
}

// `trusted_root` is added to the store alongside the platform roots, if enabled.
fn classify_chain(
    leaf: &AttestationCertificate,
    anchors: &[X509],
    policy: &ChainPolicy,
    trusted_root: Option<&X509>,
) -> VerificationResult<ChainTrust> {
    let mut chain_stack = stack::Stack::new()?;
    for crt in anchors {
        chain_stack.push(crt.clone())?;
    }

    let store = build_store(policy, trusted_root)?;
    let first = verify_once(&store, leaf.x509(), &chain_stack)?;
    debug!(result = %first.result, "certificate chain verify result");

    if first.result == X509VerifyResult::OK {
        return Ok(ChainTrust::Trusted);
    }

    let raw = first.result.as_raw();
    if raw != X509_V_ERR_DEPTH_ZERO_SELF_SIGNED_CERT
        && raw != X509_V_ERR_SELF_SIGNED_CERT_IN_CHAIN
    {
        return Ok(ChainTrust::Invalid(first.result.to_string()));
    }

    let root = match first.root {
        Some(root) => root,
        None => return Ok(ChainTrust::Invalid(first.result.to_string())),
    };

    let store = build_store(policy, Some(&root))?;
    let second = verify_once(&store, leaf.x509(), &chain_stack)?;
    debug!(result = %second.result, "certificate chain verify result with self signed root");

    if second.result == X509VerifyResult::OK {
        Ok(ChainTrust::UntrustedSelfSigned)
    } else {
        Ok(ChainTrust::Invalid(second.result.to_string()))
    }
}
