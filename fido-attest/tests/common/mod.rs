#![allow(dead_code)]

use std::collections::BTreeMap;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Extension, X509NameBuilder, X509Ref, X509};
use serde_cbor_2::Value;
use uuid::Uuid;

use fido_attest::crypto::compute_sha256;
use fido_attest::{MetadataService, StaticMetadataService, VerificationResult};

pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn ec_key(nid: Nid) -> Result<PKey<Private>, ErrorStack> {
    let group = EcGroup::from_curve_name(nid)?;
    EcKey::generate(&group).and_then(PKey::from_ec_key)
}

fn name(cn: &str) -> Result<openssl::x509::X509Name, ErrorStack> {
    let mut x509_name = X509NameBuilder::new()?;
    x509_name.append_entry_by_text("C", "AU")?;
    x509_name.append_entry_by_text("O", "fido-attest tests")?;
    x509_name.append_entry_by_text("CN", cn)?;
    Ok(x509_name.build())
}

pub fn build_root(key: &PKey<Private>, cn: &str) -> Result<X509, ErrorStack> {
    let x509_name = name(cn)?;

    let mut cert_builder = X509::builder()?;
    // Yes, 2 actually means 3 here ...
    cert_builder.set_version(2)?;
    let serial_number = BigNum::from_u32(1).and_then(|serial| serial.to_asn1_integer())?;
    cert_builder.set_serial_number(&serial_number)?;
    cert_builder.set_subject_name(&x509_name)?;
    cert_builder.set_issuer_name(&x509_name)?;

    let not_before = Asn1Time::days_from_now(0)?;
    cert_builder.set_not_before(&not_before)?;
    let not_after = Asn1Time::days_from_now(30)?;
    cert_builder.set_not_after(&not_after)?;

    cert_builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    cert_builder.append_extension(
        KeyUsage::new()
            .critical()
            .key_cert_sign()
            .crl_sign()
            .build()?,
    )?;

    let subject_key_identifier =
        SubjectKeyIdentifier::new().build(&cert_builder.x509v3_context(None, None))?;
    cert_builder.append_extension(subject_key_identifier)?;

    cert_builder.set_pubkey(key)?;
    cert_builder.sign(key, MessageDigest::sha256())?;
    Ok(cert_builder.build())
}

/// Options for the attestation certificate.
#[derive(Default)]
pub struct LeafOptions {
    pub expired: bool,
    pub aaguid_extension: Option<[u8; 16]>,
}

pub fn build_leaf(
    key: &PKey<Private>,
    ca_key: &PKey<Private>,
    ca_cert: &X509Ref,
    opts: &LeafOptions,
) -> Result<X509, ErrorStack> {
    let mut cert_builder = X509::builder()?;
    cert_builder.set_version(2)?;
    let serial_number = BigNum::from_u32(2).and_then(|serial| serial.to_asn1_integer())?;
    cert_builder.set_serial_number(&serial_number)?;
    let subject_name = name("U2F Attestation")?;
    cert_builder.set_subject_name(&subject_name)?;
    cert_builder.set_issuer_name(ca_cert.subject_name())?;
    cert_builder.set_pubkey(key)?;

    let (not_before, not_after) = if opts.expired {
        (
            Asn1Time::from_unix(1_000_000_000)?,
            Asn1Time::from_unix(1_100_000_000)?,
        )
    } else {
        (Asn1Time::days_from_now(0)?, Asn1Time::days_from_now(1)?)
    };
    cert_builder.set_not_before(&not_before)?;
    cert_builder.set_not_after(&not_after)?;

    cert_builder.append_extension(BasicConstraints::new().build()?)?;

    let auth_key_identifier = AuthorityKeyIdentifier::new()
        .keyid(false)
        .issuer(false)
        .build(&cert_builder.x509v3_context(Some(ca_cert), None))?;
    cert_builder.append_extension(auth_key_identifier)?;

    if let Some(aaguid) = opts.aaguid_extension {
        let oid = Asn1Object::from_str("1.3.6.1.4.1.45724.1.1.4")?;
        let mut der = vec![0x04, 0x10];
        der.extend_from_slice(&aaguid);
        let value = Asn1OctetString::new_from_bytes(&der)?;
        cert_builder.append_extension(X509Extension::new_from_der(&oid, false, &value)?)?;
    }

    cert_builder.sign(ca_key, MessageDigest::sha256())?;
    Ok(cert_builder.build())
}

/// A fido-u2f registration, with every input that feeds the attestation signature.
#[derive(Clone)]
pub struct U2fFixture {
    pub aaguid: [u8; 16],
    pub rp_id_hash: [u8; 32],
    pub client_data_hash: [u8; 32],
    pub credential_id: Vec<u8>,
    pub cose_alg: i128,
    pub credential_x: Vec<u8>,
    pub credential_y: Vec<u8>,
    pub root_key: PKey<Private>,
    pub root_cert: X509,
    pub attestn_key: PKey<Private>,
    pub attestn_cert: X509,
}

impl U2fFixture {
    pub fn new() -> Self {
        Self::with_options(Nid::X9_62_PRIME256V1, &LeafOptions::default())
    }

    pub fn with_options(attestn_curve: Nid, opts: &LeafOptions) -> Self {
        let root_key = ec_key(Nid::X9_62_PRIME256V1).unwrap();
        let root_cert = build_root(&root_key, "U2F Test Root").unwrap();
        let attestn_key = ec_key(attestn_curve).unwrap();
        let attestn_cert = build_leaf(&attestn_key, &root_key, &root_cert, opts).unwrap();

        let credential_key = ec_key(Nid::X9_62_PRIME256V1).unwrap();
        let (credential_x, credential_y) = affine_coordinates(&credential_key);

        U2fFixture {
            aaguid: [0; 16],
            rp_id_hash: compute_sha256(b"example.com"),
            client_data_hash: compute_sha256(br#"{"type":"webauthn.create"}"#),
            credential_id: (0u8..64).collect(),
            cose_alg: -7,
            credential_x,
            credential_y,
            root_key,
            root_cert,
            attestn_key,
            attestn_cert,
        }
    }

    pub fn cose_key(&self) -> Vec<u8> {
        let mut m = BTreeMap::new();
        m.insert(Value::Integer(1), Value::Integer(2));
        m.insert(Value::Integer(3), Value::Integer(self.cose_alg));
        m.insert(Value::Integer(-1), Value::Integer(1));
        m.insert(Value::Integer(-2), Value::Bytes(self.credential_x.clone()));
        m.insert(Value::Integer(-3), Value::Bytes(self.credential_y.clone()));
        serde_cbor_2::to_vec(&Value::Map(m)).unwrap()
    }

    pub fn auth_data(&self) -> Vec<u8> {
        let mut v = self.rp_id_hash.to_vec();
        // UP | AT
        v.push(0x41);
        v.extend_from_slice(&0u32.to_be_bytes());
        v.extend_from_slice(&self.aaguid);
        v.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
        v.extend_from_slice(&self.credential_id);
        v.extend_from_slice(&self.cose_key());
        v
    }

    pub fn verification_data(&self) -> Vec<u8> {
        let mut v = vec![0x00];
        v.extend_from_slice(&self.rp_id_hash);
        v.extend_from_slice(&self.client_data_hash);
        v.extend_from_slice(&self.credential_id);
        v.push(0x04);
        v.extend_from_slice(&self.credential_x);
        v.extend_from_slice(&self.credential_y);
        v
    }

    /// A DER ECDSA signature over the current verification data.
    pub fn sign(&self) -> Vec<u8> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.attestn_key).unwrap();
        signer.update(&self.verification_data()).unwrap();
        signer.sign_to_vec().unwrap()
    }

    pub fn x5c(&self) -> Value {
        Value::Array(vec![Value::Bytes(self.attestn_cert.to_der().unwrap())])
    }

    pub fn statement_with(&self, sig: Option<Value>, x5c: Option<Value>) -> Value {
        let mut m = BTreeMap::new();
        if let Some(sig) = sig {
            m.insert(Value::Text("sig".to_string()), sig);
        }
        if let Some(x5c) = x5c {
            m.insert(Value::Text("x5c".to_string()), x5c);
        }
        Value::Map(m)
    }

    /// A well formed statement signed over the current state.
    pub fn statement(&self) -> Value {
        self.statement_with(Some(Value::Bytes(self.sign())), Some(self.x5c()))
    }

    pub fn verify(
        &self,
        stmt: &Value,
        metadata: Option<&dyn MetadataService>,
    ) -> VerificationResult<()> {
        fido_attest::verify_attestation(
            "fido-u2f",
            stmt,
            &self.auth_data(),
            &self.client_data_hash,
            metadata,
        )
    }

    pub fn attestation_object(&self, stmt: &Value) -> Vec<u8> {
        fido_attest::AttestationObject {
            fmt: "fido-u2f".to_string(),
            att_stmt: stmt.clone(),
            auth_data_bytes: self.auth_data(),
        }
        .to_vec()
        .unwrap()
    }
}

pub fn affine_coordinates(key: &PKey<Private>) -> (Vec<u8>, Vec<u8>) {
    let ec = key.ec_key().unwrap();
    let mut ctx = BigNumContext::new().unwrap();
    let mut x = BigNum::new().unwrap();
    let mut y = BigNum::new().unwrap();
    ec.public_key()
        .affine_coordinates_gfp(ec.group(), &mut x, &mut y, &mut ctx)
        .unwrap();
    (x.to_vec_padded(32).unwrap(), y.to_vec_padded(32).unwrap())
}

/// Metadata statement JSON listing `roots` as attestation trust anchors.
pub fn statement_json(roots: &[&X509]) -> Vec<u8> {
    let roots: Vec<String> = roots
        .iter()
        .map(|r| STANDARD.encode(r.to_der().unwrap()))
        .collect();
    serde_json::to_vec(&serde_json::json!({
        "description": "fido-attest test authenticator",
        "attestationRootCertificates": roots,
    }))
    .unwrap()
}

/// A metadata service with one entry for `aaguid`. When `intact` is false the
/// stored hash does not cover the statement.
pub fn metadata_for(aaguid: [u8; 16], roots: &[&X509], intact: bool) -> StaticMetadataService {
    let statement = statement_json(roots);
    let mut hash = compute_sha256(&statement);
    if !intact {
        hash[0] ^= 0xff;
    }

    let json = serde_json::json!({
        "entries": [{
            "aaguid": Uuid::from_bytes(aaguid).to_string(),
            "hash": URL_SAFE_NO_PAD.encode(hash),
            "statement": URL_SAFE_NO_PAD.encode(&statement),
        }]
    });

    StaticMetadataService::from_json(&json.to_string()).unwrap()
}
