//! Minimal ABI metadata the generator and oracle classifier need.
//!
//! Grounded in the teacher's `evm/contract_utils.rs` (`ABIConfig`), reduced
//! to what this core actually consumes: a method's selector, its input
//! types (for value synthesis/mutation), and its mutability (for deciding
//! whether it is state-changing, payable, or a candidate test method).
use crate::types::{selector_of, Address, Selector};
use ethers::abi::ParamType;

/// Solidity's three-way state-mutability split, the same one the teacher's
/// `ContractLoader::parse_abi_str` makes from `stateMutability`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Pure,
    View,
    NonPayable,
    Payable,
}

impl Mutability {
    pub fn is_state_changing(self) -> bool {
        matches!(self, Mutability::NonPayable | Mutability::Payable)
    }

    pub fn is_constant(self) -> bool {
        matches!(self, Mutability::Pure | Mutability::View)
    }
}

#[derive(Debug, Clone)]
pub struct AbiMethod {
    pub name: String,
    pub selector: Selector,
    pub inputs: Vec<ParamType>,
    pub outputs: Vec<ParamType>,
    pub mutability: Mutability,
}

impl AbiMethod {
    pub fn new(name: impl Into<String>, inputs: Vec<ParamType>, outputs: Vec<ParamType>, mutability: Mutability) -> Self {
        let name = name.into();
        let sig_types = inputs
            .iter()
            .map(param_type_signature)
            .collect::<Vec<_>>()
            .join(",");
        let selector = selector_of(&format!("{name}({sig_types})"));
        Self { name, selector, inputs, outputs, mutability }
    }

    pub fn is_payable(&self) -> bool {
        matches!(self.mutability, Mutability::Payable)
    }
}

/// Renders a [`ParamType`] the way Solidity signatures expect (ethers'
/// `Debug`/`Display` impls are not signature-stable for tuples/arrays).
pub fn param_type_signature(ty: &ParamType) -> String {
    match ty {
        ParamType::Address => "address".to_string(),
        ParamType::Bytes => "bytes".to_string(),
        ParamType::Int(n) => format!("int{n}"),
        ParamType::Uint(n) => format!("uint{n}"),
        ParamType::Bool => "bool".to_string(),
        ParamType::String => "string".to_string(),
        ParamType::FixedBytes(n) => format!("bytes{n}"),
        ParamType::Array(inner) => format!("{}[]", param_type_signature(inner)),
        ParamType::FixedArray(inner, n) => format!("{}[{n}]", param_type_signature(inner)),
        ParamType::Tuple(inners) => {
            let joined = inners.iter().map(param_type_signature).collect::<Vec<_>>().join(",");
            format!("({joined})")
        }
    }
}

/// A deployed contract, as the generator sees it: an address plus the ABI
/// methods that can be called on it.
#[derive(Debug, Clone)]
pub struct ContractDefinition {
    pub address: Address,
    pub methods: Vec<AbiMethod>,
}

impl ContractDefinition {
    pub fn state_changing_methods(&self) -> impl Iterator<Item = &AbiMethod> {
        self.methods.iter().filter(|m| m.mutability.is_state_changing())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_derived_from_signature() {
        let m = AbiMethod::new(
            "transfer",
            vec![ParamType::Address, ParamType::Uint(256)],
            vec![ParamType::Bool],
            Mutability::NonPayable,
        );
        assert_eq!(m.selector, [0xa9, 0x05, 0x9c, 0xbb]);
        assert!(m.mutability.is_state_changing());
        assert!(!m.is_payable());
    }

    #[test]
    fn tuple_and_array_signatures() {
        let ty = ParamType::Array(Box::new(ParamType::Tuple(vec![ParamType::Uint(256), ParamType::Address])));
        assert_eq!(param_type_signature(&ty), "(uint256,address)[]");
    }
}
