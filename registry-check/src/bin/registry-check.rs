use clap::Parser;
use dotenv::dotenv;
use eyre::Result;
use registry_check::{
    load_contract_names, AbiDirectory, BootstrapConfig, Checker, EthersReader, Network,
    NetworkConfig, Settings,
};

// CLI argument parsing
#[derive(Parser, Debug)]
#[clap(author, version, about = "Report registry getters that disagree with the address provider", long_about = None)]
struct Args {
    /// Network to audit: homestead (mainnet) or goerli
    #[clap(default_value = "homestead")]
    network: Network,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = Settings::from_env();
    let network = NetworkConfig::from_env(args.network)?;
    log::info!(
        "Checking {} against address provider {:?}",
        network.network,
        network.address_provider
    );

    let contracts = load_contract_names(&settings.contracts_file)?;
    let config = BootstrapConfig::load(&settings.config_file)?;

    let reader = EthersReader::connect(&network, AbiDirectory::new(&settings.abi_dir)).await?;
    let checker = Checker::new(reader, network.address_provider);
    let report = checker.run(&contracts, &config).await;

    for finding in &report.findings {
        println!("{}", finding);
    }

    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}
