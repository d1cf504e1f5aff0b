//! Staychain attestation daemon.
//!
//! Wires the record server, signer bus, attest client and state machine
//! together, runs the attestation service until interrupted, and shuts
//! down cleanly on SIGINT via a shared cancellation token.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use staychain_bitcoin::{
    AttestClient, AttestConfig, AttestFees, BitcoinRpc, HttpFeeOracle,
};
use staychain_core::SigningKey;
use staychain_service::{AttestService, ServiceTiming};
use staychain_signer::TcpAttestSigner;
use staychain_store::{MemoryStore, RecordServer};

mod config;

use config::Config;

/// Proof-of-publication attestation daemon.
#[derive(Debug, Parser)]
#[command(name = "staychaind", version, about)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "conf.json")]
    config: PathBuf,

    /// Genesis attestation transaction id, overriding the config file.
    #[arg(long)]
    tx: Option<String>,

    /// Wallet private key (WIF), overriding the config file.
    #[arg(long)]
    pk: Option<String>,

    /// Multisig redeem script (hex), overriding the config file.
    #[arg(long)]
    script: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut config = Config::from_file(&args.config)?;
    if let Some(tx) = args.tx {
        config.initial.tx = tx;
    }
    if let Some(pk) = args.pk {
        config.initial.pk = Some(pk);
    }
    if let Some(script) = args.script {
        config.initial.script = Some(script);
    }

    if config.initial.tx.is_empty() {
        bail!("an initial transaction id is required (config initial.tx or --tx)");
    }
    if config.initial.pk.is_none() && config.initial.script.is_none() {
        bail!("either a signing key or a multisig script is required");
    }

    let network = config.main.network;
    let init_txid = config
        .initial
        .tx
        .parse()
        .context("parsing initial transaction id")?;
    let multisig_script = config
        .initial
        .script
        .as_deref()
        .map(bitcoin::ScriptBuf::from_hex)
        .transpose()
        .context("parsing initial redeem script")?;
    let signing_key = config
        .initial
        .pk
        .as_deref()
        .map(SigningKey::from_wif)
        .transpose()
        .context("parsing signing key")?;

    let chain = Arc::new(BitcoinRpc::new(config.main.clone())?);
    let fees = AttestFees::new(
        config.fees,
        Box::new(HttpFeeOracle::new(config.fee_oracle_url.clone())),
    );
    let client = AttestClient::new(
        Arc::clone(&chain),
        fees,
        AttestConfig {
            init_txid,
            multisig_script,
            signing_key,
            network,
        },
    )?;

    let signer = TcpAttestSigner::new(config.signer.clone()).await?;
    let server = RecordServer::new(MemoryStore::new());
    let service = AttestService::new(client, signer, server, ServiceTiming::default());

    let token = CancellationToken::new();
    let service_token = token.child_token();
    let mut service_task = tokio::spawn(async move { service.run(service_token).await });

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            token.cancel();
            (&mut service_task).await
        }
        result = &mut service_task => result,
    };

    match result {
        Ok(Ok(())) => info!("service stopped cleanly"),
        Ok(Err(e)) => {
            error!(error = %e, "service stopped with a fatal error");
            return Err(e.into());
        }
        Err(e) => bail!("service task panicked: {e}"),
    }

    Ok(())
}
