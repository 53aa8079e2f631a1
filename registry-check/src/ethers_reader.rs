use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use ethers::{
    abi::{Abi, AbiError},
    contract::{Contract, ContractError},
    providers::{Http, Middleware, Provider},
    types::Address,
};

use crate::{
    abi::AbiDirectory,
    error::Result,
    reader::{
        CallFailure, CallOutcome, ContractReader, ADDRESS_PROVIDER_CONTRACT, ADDRESS_PROVIDER_METHOD,
    },
    settings::NetworkConfig,
};

type Client = Provider<Http>;

/// [`ContractReader`] backed by `eth_call` over an HTTP JSON-RPC endpoint.
pub struct EthersReader {
    client: Arc<Client>,
    abis: AbiDirectory,
    provider_abi: Abi,
    cache: Mutex<HashMap<String, Abi>>,
}

impl EthersReader {
    /// Connects to the network's RPC endpoint and loads the address provider
    /// ABI. Fails if the ABI is missing, the endpoint is unreachable, or it
    /// serves a different chain than the selected network.
    pub async fn connect(config: &NetworkConfig, abis: AbiDirectory) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())?;
        let client = Arc::new(provider);

        let chain_id = client.get_chainid().await?;
        log::info!("Connected to {} (chain ID {})", config.network, chain_id);
        config.network.ensure_chain(chain_id)?;

        let provider_abi = abis.ethers_abi(ADDRESS_PROVIDER_CONTRACT)?;
        Ok(Self {
            client,
            abis,
            provider_abi,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn contract_abi(&self, contract: &str) -> std::result::Result<Abi, CallFailure> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(abi) = cache.get(contract) {
                return Ok(abi.clone());
            }
        }
        let abi = self
            .abis
            .ethers_abi(contract)
            .map_err(|e| CallFailure::CallFailed(e.to_string()))?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(contract.to_string(), abi.clone());
        }
        Ok(abi)
    }
}

#[async_trait]
impl ContractReader for EthersReader {
    async fn registered_address(&self, provider: Address, contract: &str) -> CallOutcome {
        let registry = Contract::new(provider, self.provider_abi.clone(), self.client.clone());
        let call = match registry.method::<_, Address>(ADDRESS_PROVIDER_METHOD, contract.to_string()) {
            Ok(call) => call,
            Err(e) => return CallOutcome::Failed(not_callable(ADDRESS_PROVIDER_METHOD, e)),
        };
        call.call().await.map_err(classify).into()
    }

    async fn reference_address(&self, contract: &str, at: Address, method: &str) -> CallOutcome {
        let abi = match self.contract_abi(contract) {
            Ok(abi) => abi,
            Err(failure) => return CallOutcome::Failed(failure),
        };
        let handle = Contract::new(at, abi, self.client.clone());
        let call = match handle.method::<_, Address>(method, ()) {
            Ok(call) => call,
            Err(e) => return CallOutcome::Failed(not_callable(method, e)),
        };
        call.call().await.map_err(classify).into()
    }
}

// The call could not be built, e.g. the method is missing from the ABI.
fn not_callable(method: &str, err: AbiError) -> CallFailure {
    CallFailure::CallFailed(format!("{} not callable: {}", method, err))
}

fn classify(err: ContractError<Client>) -> CallFailure {
    match err {
        ContractError::DecodingError(e) => CallFailure::DecodeError(e.to_string()),
        ContractError::AbiError(e) => CallFailure::DecodeError(e.to_string()),
        ContractError::DetokenizationError(e) => CallFailure::DecodeError(e.to_string()),
        other => CallFailure::CallFailed(other.to_string()),
    }
}
