mod common;

use common::*;
use openssl::nid::Nid;
use serde_cbor_2::Value;

use fido_attest::{verify_attestation, verify_attestation_object, ErrorKind};

#[test]
fn u2f_happy_path() {
    setup_tracing();
    let fx = U2fFixture::new();
    let stmt = fx.statement();
    assert!(fx.verify(&stmt, None).is_ok());
}

#[test]
fn u2f_attestation_object() {
    let fx = U2fFixture::new();
    let ao = fx.attestation_object(&fx.statement());
    assert!(verify_attestation_object(&ao, &fx.client_data_hash, None).is_ok());

    let err = verify_attestation_object(&ao[..ao.len() - 1], &fx.client_data_hash, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedEncoding);
}

#[test]
fn u2f_deterministic() {
    let fx = U2fFixture::new();
    let stmt = fx.statement();
    assert!(fx.verify(&stmt, None).is_ok());
    assert!(fx.verify(&stmt, None).is_ok());

    let bad = fx.statement_with(Some(Value::Bytes(vec![])), Some(fx.x5c()));
    let a = fx.verify(&bad, None).unwrap_err();
    let b = fx.verify(&bad, None).unwrap_err();
    assert_eq!(a, b);
}

#[test]
fn u2f_nonzero_aaguid() {
    let mut fx = U2fFixture::new();
    fx.aaguid[7] = 0x01;
    let stmt = fx.statement();
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAaguid);
}

#[test]
fn u2f_aaguid_checked_before_signature() {
    let mut fx = U2fFixture::new();
    fx.aaguid[0] = 0xff;
    let stmt = fx.statement_with(Some(Value::Bytes(vec![0x30, 0x00])), Some(fx.x5c()));
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAaguid);
}

#[test]
fn u2f_x5c_shape() {
    let fx = U2fFixture::new();
    let sig = Some(Value::Bytes(fx.sign()));
    let der = fx.attestn_cert.to_der().unwrap();

    let cases = vec![
        // Two certificates.
        Some(Value::Array(vec![
            Value::Bytes(der.clone()),
            Value::Bytes(fx.root_cert.to_der().unwrap()),
        ])),
        // No certificates.
        Some(Value::Array(vec![])),
        // Not an array.
        Some(Value::Bytes(der)),
        // Element is not a byte string.
        Some(Value::Array(vec![Value::Text("cert".to_string())])),
        // Element is empty.
        Some(Value::Array(vec![Value::Bytes(vec![])])),
        // Missing.
        None,
    ];

    for x5c in cases {
        let stmt = fx.statement_with(sig.clone(), x5c);
        let err = fx.verify(&stmt, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedStatement);
    }
}

#[test]
fn u2f_unexpected_statement_key() {
    let fx = U2fFixture::new();
    let mut stmt = fx.statement();
    if let Value::Map(m) = &mut stmt {
        m.insert(Value::Text("alg".to_string()), Value::Integer(-7));
    }
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedStatement);
}

#[test]
fn u2f_undecodable_certificate() {
    let fx = U2fFixture::new();
    let x5c = Value::Array(vec![Value::Bytes(vec![0x30, 0x03, 0x02, 0x01, 0x01])]);
    let stmt = fx.statement_with(Some(Value::Bytes(fx.sign())), Some(x5c));
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedEncoding);
}

#[test]
fn u2f_empty_signature() {
    let fx = U2fFixture::new();
    let stmt = fx.statement_with(Some(Value::Bytes(vec![])), Some(fx.x5c()));
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSignature);
}

#[test]
fn u2f_missing_or_mistyped_signature() {
    let fx = U2fFixture::new();

    let stmt = fx.statement_with(None, Some(fx.x5c()));
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSignature);

    let stmt = fx.statement_with(Some(Value::Text("sig".to_string())), Some(fx.x5c()));
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSignature);
}

#[test]
fn u2f_signature_not_der() {
    let fx = U2fFixture::new();

    // A raw r || s signature is not accepted.
    let der = fx.sign();
    let raw = fido_attest::codec::EcdsaSignature::from_der(&der, 32)
        .unwrap()
        .to_raw();
    let stmt = fx.statement_with(Some(Value::Bytes(raw)), Some(fx.x5c()));
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSignature);

    // Trailing garbage after the DER sequence.
    let mut der = fx.sign();
    der.push(0x00);
    let stmt = fx.statement_with(Some(Value::Bytes(der)), Some(fx.x5c()));
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSignature);
}

#[test]
fn u2f_p384_attestation_key() {
    let fx = U2fFixture::with_options(Nid::SECP384R1, &LeafOptions::default());
    // The signature is valid for the P-384 key, but the format requires P-256.
    let stmt = fx.statement();
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedKeyAlgorithm);

    let stmt = fx.statement_with(Some(Value::Bytes(vec![])), Some(fx.x5c()));
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedKeyAlgorithm);
}

#[test]
fn u2f_credential_key_not_p256() {
    let mut fx = U2fFixture::new();
    // A valid ES384 key shape on P-384 is still not usable for U2F.
    fx.credential_x = vec![0x01; 48];
    fx.credential_y = vec![0x02; 48];
    let stmt = fx.statement();
    let auth_data = {
        let mut m = std::collections::BTreeMap::new();
        m.insert(Value::Integer(1), Value::Integer(2));
        m.insert(Value::Integer(3), Value::Integer(-35));
        m.insert(Value::Integer(-1), Value::Integer(2));
        m.insert(Value::Integer(-2), Value::Bytes(fx.credential_x.clone()));
        m.insert(Value::Integer(-3), Value::Bytes(fx.credential_y.clone()));
        let cose = serde_cbor_2::to_vec(&Value::Map(m)).unwrap();

        let mut v = fx.rp_id_hash.to_vec();
        v.push(0x41);
        v.extend_from_slice(&[0; 4]);
        v.extend_from_slice(&fx.aaguid);
        v.extend_from_slice(&(fx.credential_id.len() as u16).to_be_bytes());
        v.extend_from_slice(&fx.credential_id);
        v.extend_from_slice(&cose);
        v
    };

    let err = verify_attestation("fido-u2f", &stmt, &auth_data, &fx.client_data_hash, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedKeyAlgorithm);
}

#[test]
fn u2f_credential_algorithm_unmapped() {
    let mut fx = U2fFixture::new();
    // RS1 is recognised, but an EC2 key can not carry it.
    fx.cose_alg = -65535;
    let stmt = fx.statement();
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedEncoding);

    fx.cose_alg = -4242;
    let stmt = fx.statement();
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);
}

#[test]
fn u2f_tamper_rp_id_hash() {
    let mut fx = U2fFixture::new();
    let stmt = fx.statement();
    fx.rp_id_hash[31] ^= 0x01;
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureVerificationFailed);
}

#[test]
fn u2f_tamper_client_data_hash() {
    let mut fx = U2fFixture::new();
    let stmt = fx.statement();
    fx.client_data_hash[0] ^= 0x80;
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureVerificationFailed);
}

#[test]
fn u2f_tamper_credential_id() {
    let mut fx = U2fFixture::new();
    let stmt = fx.statement();
    fx.credential_id[10] ^= 0x04;
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureVerificationFailed);
}

#[test]
fn u2f_tamper_public_key() {
    let fx = U2fFixture::new();
    let stmt = fx.statement();

    for (coord, byte) in [(0usize, 0usize), (0, 31), (1, 0), (1, 31)] {
        for bit in [0x01u8, 0x80] {
            let mut tampered = fx.clone();
            if coord == 0 {
                tampered.credential_x[byte] ^= bit;
            } else {
                tampered.credential_y[byte] ^= bit;
            }
            let err = tampered.verify(&stmt, None).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SignatureVerificationFailed);
        }
    }
}

#[test]
fn u2f_wrong_signing_key() {
    let mut fx = U2fFixture::new();
    let sig = fx.sign();
    // Re-issue the attestation certificate for a different key.
    let other = ec_key(Nid::X9_62_PRIME256V1).unwrap();
    fx.attestn_cert =
        build_leaf(&other, &fx.root_key, &fx.root_cert, &LeafOptions::default()).unwrap();
    let stmt = fx.statement_with(Some(Value::Bytes(sig)), Some(fx.x5c()));
    let err = fx.verify(&stmt, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureVerificationFailed);
}

#[test]
fn u2f_missing_attested_credential_data() {
    let fx = U2fFixture::new();
    let stmt = fx.statement();
    let mut auth_data = fx.rp_id_hash.to_vec();
    auth_data.push(0x01);
    auth_data.extend_from_slice(&[0; 4]);
    let err = verify_attestation("fido-u2f", &stmt, &auth_data, &fx.client_data_hash, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedAuthenticatorData);
}

#[test]
fn u2f_concurrent_verification() {
    let fx = U2fFixture::new();
    let good = fx.statement();
    let bad = fx.statement_with(Some(Value::Bytes(vec![])), Some(fx.x5c()));
    let auth_data = fx.auth_data();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let stmt = if i % 2 == 0 { &good } else { &bad };
                let auth_data = &auth_data;
                let cdh = &fx.client_data_hash;
                s.spawn(move || {
                    (0..16)
                        .map(|_| verify_attestation("fido-u2f", stmt, auth_data, cdh, None))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for (i, h) in handles.into_iter().enumerate() {
            for res in h.join().unwrap() {
                if i % 2 == 0 {
                    assert!(res.is_ok());
                } else {
                    assert_eq!(res.unwrap_err().kind(), ErrorKind::MalformedSignature);
                }
            }
        }
    });
}
