use clap::Parser;
use dotenv::dotenv;
use eyre::Result;
use registry_check::{bootstrap, load_contract_names, AbiDirectory, BootstrapOutcome, Settings};

/// Derive the reference-method config from the ABI directory. Never
/// overwrites an existing config file.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {}

fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let _args = Args::parse();

    let settings = Settings::from_env();
    let contracts = load_contract_names(&settings.contracts_file)?;
    let abis = AbiDirectory::new(&settings.abi_dir);

    match bootstrap(&contracts, &abis, &settings.config_file)? {
        BootstrapOutcome::Written { contracts, methods } => println!(
            "Wrote {} reference methods for {} contracts to {}",
            methods,
            contracts,
            settings.config_file.display()
        ),
        BootstrapOutcome::AlreadyExists { .. } => println!(
            "{} already exists, leaving it untouched",
            settings.config_file.display()
        ),
    }
    Ok(())
}
