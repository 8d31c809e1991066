#![warn(unused_extern_crates)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

use std::convert::TryFrom;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use serde_cbor_2::Value;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fido_attest::crypto::{compute_sha256, AttestationCertificate};
use fido_attest::{
    verify_attestation_object, AttestationObject, AuthenticatorData, MetadataService,
    StaticMetadataService,
};

#[derive(Debug, Args)]
pub struct CommonOpt {
    #[arg(short, long)]
    pub debug: bool,
    /// Path to a JSON request holding `attestationObject` (url safe base64)
    /// and either `clientDataHash` (hex) or `clientDataJSON` (url safe base64)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct VerifyOpt {
    #[command(flatten)]
    pub common: CommonOpt,
    /// Path to a metadata file. Without one no trust validation is done.
    #[arg(short = 'm', long = "metadata")]
    pub metadata: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
#[command(about = "Fido attestation verification tool")]
pub enum Opt {
    /// Verify the attestation statement of a registration
    Verify(VerifyOpt),
    /// Display the content of an attestation object
    Inspect(CommonOpt),
}

impl Opt {
    fn debug(&self) -> bool {
        match self {
            Opt::Verify(VerifyOpt {
                common: CommonOpt { debug, .. },
                ..
            })
            | Opt::Inspect(CommonOpt { debug, .. }) => *debug,
        }
    }
}

#[derive(Debug, clap::Parser)]
#[command(about = "Fido attestation verification tool")]
pub struct CliParser {
    #[command(subcommand)]
    pub commands: Opt,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Request {
    attestation_object: String,
    client_data_hash: Option<String>,
    #[serde(rename = "clientDataJSON")]
    client_data_json: Option<String>,
}

struct DecodedRequest {
    attestation_object: Vec<u8>,
    client_data_hash: Vec<u8>,
}

impl TryFrom<Request> for DecodedRequest {
    type Error = String;

    fn try_from(req: Request) -> Result<Self, Self::Error> {
        let attestation_object = URL_SAFE_NO_PAD
            .decode(req.attestation_object.trim_end_matches('='))
            .map_err(|e| format!("attestationObject is not url safe base64: {}", e))?;

        let client_data_hash = match (req.client_data_hash, req.client_data_json) {
            (Some(h), _) => {
                hex::decode(h).map_err(|e| format!("clientDataHash is not hex: {}", e))?
            }
            (None, Some(cdj)) => URL_SAFE_NO_PAD
                .decode(cdj.trim_end_matches('='))
                .map(|json| compute_sha256(&json).to_vec())
                .map_err(|e| format!("clientDataJSON is not url safe base64: {}", e))?,
            (None, None) => {
                return Err("one of clientDataHash or clientDataJSON is required".to_string())
            }
        };

        Ok(DecodedRequest {
            attestation_object,
            client_data_hash,
        })
    }
}

fn load_request(path: &Path) -> Result<DecodedRequest, String> {
    tracing::trace!(?path, "loading request");
    let s = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let req: Request = serde_json::from_str(&s).map_err(|e| format!("invalid request: {}", e))?;
    DecodedRequest::try_from(req)
}

fn load_metadata(path: &Path) -> Result<StaticMetadataService, String> {
    tracing::trace!(?path, "loading metadata");
    let s = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    StaticMetadataService::from_json(&s).map_err(|e| e.to_string())
}

fn verify(opt: &VerifyOpt) -> Result<(), String> {
    let req = load_request(&opt.common.input)?;
    let mds = opt.metadata.as_deref().map(load_metadata).transpose()?;

    verify_attestation_object(
        &req.attestation_object,
        &req.client_data_hash,
        mds.as_ref().map(|m| m as &dyn MetadataService),
    )
    .map_err(|e| e.to_string())
}

fn inspect(opt: &CommonOpt) -> Result<(), String> {
    let req = load_request(&opt.input)?;
    let ao = AttestationObject::try_from(req.attestation_object.as_slice())
        .map_err(|e| e.to_string())?;
    let ad = AuthenticatorData::try_from(ao.auth_data_bytes.as_slice())
        .map_err(|e| e.to_string())?;

    println!("format:          {}", ao.fmt);
    println!("rp id hash:      {}", hex::encode(ad.rp_id_hash));
    println!("flags:           {:?}", ad.flags);
    println!("counter:         {}", ad.counter);
    if let Some(acd) = &ad.acd {
        println!("aaguid:          {}", acd.aaguid_uuid());
        println!("credential id:   {}", hex::encode(&acd.credential_id));
        match acd.credential_public_key() {
            Ok(pk) => println!("credential key:  {:?}", pk.type_),
            Err(e) => println!("credential key:  {}", e),
        }
    }
    if let Some(ext) = &ad.extensions {
        println!("extensions:      {:?}", ext);
    }

    let leaf = match &ao.att_stmt {
        Value::Map(m) => match m.get(&Value::Text("x5c".to_string())) {
            Some(Value::Array(certs)) => match certs.first() {
                Some(Value::Bytes(der)) => Some(der),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    };

    if let Some(der) = leaf {
        let cert = AttestationCertificate::try_from(der.as_slice()).map_err(|e| e.to_string())?;
        let alg = cert.public_key_algorithm().map_err(|e| e.to_string())?;
        println!("attestation key: {:?}", alg);
        if let Ok(Some(aaguid)) = cert.fido_gen_ce_aaguid() {
            println!("cert aaguid:     {}", uuid::Uuid::from_bytes(aaguid));
        }
        if let Ok(Some(transports)) = cert.fido_u2f_transports() {
            println!("transports:      {:?}", transports);
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let opt = CliParser::parse();

    let fmt_layer = fmt::layer().with_writer(std::io::stderr);

    let filter_layer = if opt.commands.debug() {
        match EnvFilter::try_new("fido_attest=debug,fido_attest_tool=debug") {
            Ok(f) => f,
            Err(e) => {
                eprintln!("ERROR! Unable to start tracing {:?}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(f) => f,
            Err(_) => EnvFilter::new("fido_attest=warn,fido_attest_tool=warn"),
        }
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let res = match &opt.commands {
        Opt::Verify(vopt) => verify(vopt).map(|()| println!("ok")),
        Opt::Inspect(iopt) => inspect(iopt),
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(%e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
