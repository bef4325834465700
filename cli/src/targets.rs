//! Loads target contracts from a small JSON description: an address plus a
//! list of human-readable Solidity function signatures (the same syntax
//! `ethers::abi::HumanReadableParser` accepts), e.g.:
//!
//! ```json
//! {
//!   "contracts": [
//!     {
//!       "address": "0x1111111111111111111111111111111111111111",
//!       "signatures": [
//!         "function setValue(uint256 value) external",
//!         "function getValue() external view returns (uint256)"
//!       ]
//!     }
//!   ]
//! }
//! ```
use anyhow::{Context, Result};
use crucible::abi::{AbiMethod, ContractDefinition, Mutability};
use ethers::abi::{HumanReadableParser, StateMutability};
use ethers::types::H160;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
struct TargetsFile {
    contracts: Vec<TargetContract>,
}

#[derive(Debug, Deserialize)]
struct TargetContract {
    address: String,
    signatures: Vec<String>,
}

pub fn load_contracts(path: &str) -> Result<Vec<ContractDefinition>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading target file {path}"))?;
    let parsed: TargetsFile = serde_json::from_str(&raw).with_context(|| format!("parsing target file {path}"))?;

    parsed
        .contracts
        .into_iter()
        .map(|contract| {
            let address = H160::from_str(contract.address.trim_start_matches("0x"))
                .with_context(|| format!("invalid address {}", contract.address))?;
            let methods = contract
                .signatures
                .iter()
                .map(|sig| parse_method(sig))
                .collect::<Result<Vec<_>>>()?;
            Ok(ContractDefinition { address, methods })
        })
        .collect()
}

fn parse_method(signature: &str) -> Result<AbiMethod> {
    let function = HumanReadableParser::parse_function(signature).with_context(|| format!("parsing signature {signature}"))?;
    let mutability = match function.state_mutability {
        StateMutability::Pure => Mutability::Pure,
        StateMutability::View => Mutability::View,
        StateMutability::NonPayable => Mutability::NonPayable,
        StateMutability::Payable => Mutability::Payable,
    };
    let inputs = function.inputs.iter().map(|p| p.kind.clone()).collect();
    let outputs = function.outputs.iter().map(|p| p.kind.clone()).collect();
    Ok(AbiMethod::new(function.name, inputs, outputs, mutability))
}
