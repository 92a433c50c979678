//! Subcommand handlers

use crate::{KeystoreArgs, SealArgs, TextArgs, VerifyArgs};
use anyhow::{bail, Context, Result};
use seal_core::{DirectoryFileStore, FileStore, InputKind, MemoryFileStore, SealConfig, SealService};
use seal_crypto::cert::generate_self_signed_keystore;
use seal_crypto::{IdentityProvider, KeystoreSource, SigningIdentity};
use seal_pdf::{verify_pdf_signatures, SignatureReport};
use seal_raster::verify_image_signature;
use seal_types::{InputRef, Multiplicity, SignMode, SignRequest};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// `@code` names a stored file; anything else is read from disk.
fn input_ref(arg: &str) -> Result<InputRef> {
    if let Some(code) = arg.strip_prefix('@') {
        return Ok(InputRef::FileCode(code.to_string()));
    }
    let path = Path::new(arg);
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or(arg);
    Ok(InputRef::inline(bytes, name))
}

fn build_request(args: &SealArgs, certificate: Option<String>) -> Result<SignRequest> {
    let mode = if args.keyword.is_some() {
        SignMode::Keyword
    } else {
        SignMode::Position
    };
    Ok(SignRequest {
        signer: args.signer.clone(),
        mode,
        position: args.position.clone(),
        keyword: args.keyword.clone(),
        multiplicity: Multiplicity::from_code(args.multi)?,
        merge: args.merge,
        digital_signature: args.sign,
        certificate,
        seal: input_ref(&args.seal)?,
        documents: args
            .documents
            .iter()
            .map(|doc| input_ref(doc))
            .collect::<Result<_>>()?,
    })
}

pub(crate) fn seal(config: SealConfig, args: &SealArgs) -> Result<()> {
    let store: Arc<dyn FileStore> = match &args.store {
        Some(dir) => Arc::new(
            DirectoryFileStore::new(dir).with_context(|| format!("opening store {}", dir.display()))?,
        ),
        None => Arc::new(MemoryFileStore::new()),
    };
    let password = config.keystore_password.clone();
    let mut service = SealService::new(config, store);

    // A stored keystore is a per-request override; a path replaces the default.
    let certificate = match args.cert.as_deref() {
        Some(cert) => match cert.strip_prefix('@') {
            Some(code) => Some(code.to_string()),
            None => {
                let source = KeystoreSource::File(PathBuf::from(cert));
                service = service.with_identities(IdentityProvider::new(source, password));
                None
            }
        },
        None => None,
    };

    let request = build_request(args, certificate)?;
    let result = if args.store.is_some() {
        let (code, result) = service.run_and_store(&request)?;
        println!("{code}");
        result
    } else {
        service.run(&request)?
    };

    if args.store.is_none() || args.out.is_some() {
        let out = args
            .out
            .clone()
            .unwrap_or_else(|| PathBuf::from(&result.file_name));
        std::fs::write(&out, &result.bytes).with_context(|| format!("writing {}", out.display()))?;
        info!(path = %out.display(), content_type = result.content_type.mime(), "result written");
    }
    Ok(())
}

fn report_json(report: &SignatureReport) -> Value {
    json!({
        "name": report.name,
        "signing_time": report.signing_time,
        "byte_range": report.byte_range,
        "covers_whole_file": report.covers_whole_file,
        "subject": report.signer.subject,
        "common_name": report.signer.common_name,
        "certificate_count": report.signer.certificate_count,
    })
}

pub(crate) fn verify(config: &SealConfig, args: &VerifyArgs) -> Result<()> {
    let bytes = std::fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let report = match InputKind::sniff(&bytes)? {
        InputKind::Pdf => {
            let reports = verify_pdf_signatures(&bytes).context("PDF signature check failed")?;
            let valid = reports.iter().all(|r| r.covers_whole_file);
            json!({
                "kind": "pdf",
                "valid": valid,
                "signatures": reports.iter().map(report_json).collect::<Vec<_>>(),
            })
        }
        InputKind::Image(_) => {
            // Image signatures carry no certificate; check against a known one.
            let source = match (&args.cert, &config.keystore_path) {
                (Some(path), _) | (None, Some(path)) => KeystoreSource::File(path.clone()),
                (None, None) => KeystoreSource::Bundled,
            };
            let identity = IdentityProvider::new(source, config.keystore_password.clone()).default_identity()?;
            let valid = verify_image_signature(&bytes, identity.as_ref())?;
            json!({
                "kind": "image",
                "valid": valid,
                "signer": identity.signer_name(),
            })
        }
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report["valid"] != Value::Bool(true) {
        bail!("{} does not carry a valid signature", args.file.display());
    }
    Ok(())
}

pub(crate) fn keystore(config: &SealConfig, args: &KeystoreArgs) -> Result<()> {
    let password = args.password.as_deref().unwrap_or(&config.keystore_password);
    let bytes = generate_self_signed_keystore(&args.common_name, password)?;
    std::fs::write(&args.out, bytes).with_context(|| format!("writing {}", args.out.display()))?;
    info!(path = %args.out.display(), common_name = %args.common_name, "keystore generated");
    Ok(())
}

pub(crate) fn text(config: SealConfig, args: &TextArgs) -> Result<()> {
    let service = SealService::new(config, Arc::new(MemoryFileStore::new()));
    for line in service.extract_text(&input_ref(&args.file)?)? {
        println!("{line}");
    }
    Ok(())
}
