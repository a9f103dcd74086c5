//! poolkit deploys the token set and pool factory to an EVM network and
//! publishes their addresses for later scripts.

mod cli;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use comfy_table::Table;

use cli::{Cli, Command, Tag};
use poolkit_deploy::{
    DeployConfig, EtherscanClient, JsonRpcDeployer, NetworkContext, Pipeline, RegistryFile,
    RunReport, declared_stages, select_stages,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match cli.command {
        Command::Deploy {
            tags,
            network,
            rpc_url,
        } => deploy(&cli.config, &tags, network, rpc_url).await,
        Command::Addresses { registry } => addresses(&cli.config, registry),
        Command::Init { force } => init(&cli.config, force),
    }
}

async fn deploy(
    config_path: &Path,
    tags: &[Tag],
    network: Option<String>,
    rpc_url: Option<String>,
) -> Result<()> {
    let mut config = DeployConfig::load(config_path)?;
    if let Some(network) = network {
        config.network = network;
    }
    if let Some(rpc_url) = rpc_url {
        config.rpc_url = rpc_url;
    }
    let config = config.validate()?;

    let tags: Vec<String> = tags.iter().map(Tag::to_string).collect();
    let stages = select_stages(declared_stages(), &tags);
    if stages.is_empty() {
        anyhow::bail!("No stage matches tags {:?}", tags);
    }

    let deployer = JsonRpcDeployer::connect(config.rpc_settings()).await?;
    let chain_id = deployer.chain_id();
    let verifier = config
        .etherscan_settings(chain_id)
        .map(EtherscanClient::new)
        .transpose()?;

    tracing::info!(
        network = %config.network,
        kind = %config.kind,
        tags = ?tags,
        registry = %config.registry_path.display(),
        "Deploying..."
    );

    let pipeline = Pipeline::new(
        NetworkContext::new(&config.network, chain_id),
        &deployer,
        config.registry(),
    )
    .classifier(config.classifier.clone())
    .confirmations(config.confirmations);

    let report = match &verifier {
        Some(verifier) => pipeline.verifier(verifier).run(&stages).await?,
        None => pipeline.run(&stages).await?,
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    let mut table = Table::new();
    table.set_header(vec![
        "Stage",
        "Contract",
        "Address",
        "Block",
        "Confirmations",
        "Verification",
    ]);
    for stage in &report.stages {
        for record in &stage.records {
            table.add_row(vec![
                stage.name.clone(),
                record.name().to_string(),
                record.address().to_string(),
                record.block_number().to_string(),
                record.confirmations().to_string(),
                record.verification().to_string(),
            ]);
        }
    }

    println!("{table}");
    println!(
        "Deployed {} contracts to {} (chain {}) in {}s",
        report.records().count(),
        report.network.name,
        report.network.chain_id,
        (report.finished_at - report.started_at).num_seconds()
    );
}

fn addresses(config_path: &Path, registry: Option<PathBuf>) -> Result<()> {
    let path = match registry {
        Some(path) => path,
        None => DeployConfig::load(config_path)?.registry_path,
    };
    let entries = RegistryFile::new(&path).read()?;

    let mut table = Table::new();
    table.set_header(vec!["Constant", "Address"]);
    for entry in &entries {
        table.add_row(vec![entry.constant_name(), entry.address.to_string()]);
    }
    println!("{table}");
    Ok(())
}

fn init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite it",
            config_path.display()
        );
    }
    DeployConfig::default().save_to_file(config_path)
}
