//! Pluggable value synthesis and mutation (§4.3, §6). The core only commits
//! to the capability shape; `RandomValues` is a concrete `rand`-backed
//! implementation good enough to drive the generator and shrinker in tests
//! and simple campaigns.
use ethers::abi::{ParamType, Token};
use ethers::types::{H160, U256};
use num_bigint::BigInt;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct MutationError(pub String);

impl std::fmt::Display for MutationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "value mutation failed: {}", self.0)
    }
}

impl std::error::Error for MutationError {}

/// Synthesizes fresh ABI values and raw integers from nothing (§4.2 step 3-4,
/// §6).
pub trait ValueGenerator {
    fn generate_abi_value(&mut self, ty: &ParamType) -> Token;
    fn generate_integer(&mut self, signed: bool, bits: u16) -> BigInt;
}

/// Perturbs an existing ABI value toward a related one (§4.3). Failures are
/// non-fatal everywhere they're consumed: callers keep the original value.
pub trait ValueMutator {
    fn mutate_abi_value(&mut self, ty: &ParamType, old: &Token) -> Result<Token, MutationError>;

    /// A mutation that prefers to move the value toward zero/empty, used by
    /// the shrinker (§4.3: "prefers value mutations that reduce magnitude
    /// toward zero/empty").
    fn shrink_abi_value(&mut self, ty: &ParamType, old: &Token) -> Result<Token, MutationError>;
}

/// `rand`-backed implementation of both capabilities, generic over any
/// `rand::Rng` so callers can plug in a seeded PRNG for determinism.
pub struct RandomValues<R: Rng> {
    pub rng: R,
}

impl<R: Rng> RandomValues<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    fn random_uint(&mut self, bits: u16) -> U256 {
        let mut bytes = [0u8; 32];
        self.rng.fill(&mut bytes);
        let bits = bits.min(256) as usize;
        let shift = 256 - bits;
        let value = U256::from_big_endian(&bytes);
        if shift == 0 {
            value
        } else {
            value >> shift
        }
    }

    fn random_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.rng.fill(&mut buf[..]);
        buf
    }
}

impl<R: Rng> ValueGenerator for RandomValues<R> {
    fn generate_abi_value(&mut self, ty: &ParamType) -> Token {
        match ty {
            ParamType::Address => {
                let mut bytes = [0u8; 20];
                self.rng.fill(&mut bytes);
                Token::Address(H160::from(bytes))
            }
            ParamType::Uint(bits) => Token::Uint(self.random_uint(*bits as u16)),
            ParamType::Int(bits) => Token::Int(self.random_uint(*bits as u16)),
            ParamType::Bool => Token::Bool(self.rng.gen_bool(0.5)),
            ParamType::Bytes => {
                let len = self.rng.gen_range(0..=64);
                Token::Bytes(self.random_bytes(len))
            }
            ParamType::FixedBytes(n) => Token::FixedBytes(self.random_bytes(*n)),
            ParamType::String => {
                let len = self.rng.gen_range(0..=32);
                let s: String = (0..len).map(|_| self.rng.gen_range(b'a'..=b'z') as char).collect();
                Token::String(s)
            }
            ParamType::Array(inner) => {
                let len = self.rng.gen_range(0..=4);
                Token::Array((0..len).map(|_| self.generate_abi_value(inner)).collect())
            }
            ParamType::FixedArray(inner, n) => {
                Token::FixedArray((0..*n).map(|_| self.generate_abi_value(inner)).collect())
            }
            ParamType::Tuple(inners) => Token::Tuple(inners.iter().map(|t| self.generate_abi_value(t)).collect()),
        }
    }

    fn generate_integer(&mut self, signed: bool, bits: u16) -> BigInt {
        let magnitude = self.random_uint(bits);
        let mut bytes = [0u8; 32];
        magnitude.to_big_endian(&mut bytes);
        let unsigned = BigInt::from_bytes_be(num_bigint::Sign::Plus, &bytes);
        if signed && self.rng.gen_bool(0.5) {
            -unsigned
        } else {
            unsigned
        }
    }
}

impl<R: Rng> ValueMutator for RandomValues<R> {
    fn mutate_abi_value(&mut self, ty: &ParamType, old: &Token) -> Result<Token, MutationError> {
        match (ty, old) {
            (ParamType::Uint(bits), Token::Uint(v)) => {
                let delta = self.random_uint(8.min(*bits as u16).max(1));
                Ok(Token::Uint(v.overflowing_add(delta).0))
            }
            (ParamType::Int(bits), Token::Int(v)) => {
                let delta = self.random_uint(8.min(*bits as u16).max(1));
                Ok(Token::Int(v.overflowing_add(delta).0))
            }
            (ParamType::Bool, Token::Bool(v)) => Ok(Token::Bool(!v)),
            (ParamType::Address, Token::Address(_)) => Ok(self.generate_abi_value(ty)),
            (ParamType::Bytes, Token::Bytes(b)) => {
                let mut b = b.clone();
                if b.is_empty() {
                    return Ok(Token::Bytes(self.random_bytes(1)));
                }
                let idx = self.rng.gen_range(0..b.len());
                b[idx] = b[idx].wrapping_add(1);
                Ok(Token::Bytes(b))
            }
            (ParamType::FixedBytes(_), Token::FixedBytes(b)) => {
                let mut b = b.clone();
                if b.is_empty() {
                    return Err(MutationError("empty fixed bytes".into()));
                }
                let idx = self.rng.gen_range(0..b.len());
                b[idx] = b[idx].wrapping_add(1);
                Ok(Token::FixedBytes(b))
            }
            (ParamType::String, Token::String(s)) => {
                let mut chars: Vec<char> = s.chars().collect();
                if chars.is_empty() {
                    return Ok(Token::String("a".to_string()));
                }
                let idx = self.rng.gen_range(0..chars.len());
                chars[idx] = self.rng.gen_range(b'a'..=b'z') as char;
                Ok(Token::String(chars.into_iter().collect()))
            }
            (ParamType::Array(inner), Token::Array(items)) => {
                let mut items = items.clone();
                if items.is_empty() {
                    return Ok(Token::Array(vec![]));
                }
                let idx = self.rng.gen_range(0..items.len());
                items[idx] = self.mutate_abi_value(inner, &items[idx])?;
                Ok(Token::Array(items))
            }
            (ParamType::FixedArray(inner, _), Token::FixedArray(items)) => {
                let mut items = items.clone();
                if items.is_empty() {
                    return Err(MutationError("empty fixed array".into()));
                }
                let idx = self.rng.gen_range(0..items.len());
                items[idx] = self.mutate_abi_value(inner, &items[idx])?;
                Ok(Token::FixedArray(items))
            }
            (ParamType::Tuple(inners), Token::Tuple(items)) => {
                if inners.is_empty() {
                    return Err(MutationError("empty tuple".into()));
                }
                let idx = self.rng.gen_range(0..inners.len());
                let mut items = items.clone();
                items[idx] = self.mutate_abi_value(&inners[idx], &items[idx])?;
                Ok(Token::Tuple(items))
            }
            _ => Err(MutationError("type/value mismatch".into())),
        }
    }

    fn shrink_abi_value(&mut self, ty: &ParamType, old: &Token) -> Result<Token, MutationError> {
        match (ty, old) {
            (ParamType::Uint(_), Token::Uint(v)) => {
                if v.is_zero() {
                    return Err(MutationError("already zero".into()));
                }
                Ok(Token::Uint(lower_u256(&mut self.rng, *v)))
            }
            (ParamType::Int(_), Token::Int(v)) => {
                if v.is_zero() {
                    return Err(MutationError("already zero".into()));
                }
                Ok(Token::Int(lower_u256(&mut self.rng, *v)))
            }
            (ParamType::Bytes, Token::Bytes(b)) => {
                if b.is_empty() {
                    return Err(MutationError("already empty".into()));
                }
                let new_len = self.rng.gen_range(0..b.len());
                Ok(Token::Bytes(b[..new_len].to_vec()))
            }
            (ParamType::FixedBytes(_), Token::FixedBytes(_)) => Err(MutationError("fixed size, cannot shrink".into())),
            (ParamType::String, Token::String(s)) => {
                if s.is_empty() {
                    return Err(MutationError("already empty".into()));
                }
                let new_len = self.rng.gen_range(0..s.chars().count());
                Ok(Token::String(s.chars().take(new_len).collect()))
            }
            (ParamType::Array(_), Token::Array(items)) => {
                if items.is_empty() {
                    return Err(MutationError("already empty".into()));
                }
                let new_len = self.rng.gen_range(0..items.len());
                Ok(Token::Array(items[..new_len].to_vec()))
            }
            _ => self.mutate_abi_value(ty, old),
        }
    }
}

/// `lower(x)` from §4.4/§8: `lower(0) == 0`; for `x > 0`, returns a value in
/// `[0, x)`.
pub fn lower<R: Rng>(rng: &mut R, x: u64) -> u64 {
    if x == 0 {
        0
    } else {
        rng.gen_range(0..x)
    }
}

/// `lower(x)` generalized to `U256` (§4.4, used by the shrinker for value
/// and gas-price shrinking as well as argument shrinking).
pub fn lower_u256<R: Rng>(rng: &mut R, x: U256) -> U256 {
    if x.is_zero() {
        U256::zero()
    } else if rng.gen_bool(0.5) {
        U256::zero()
    } else {
        // uniform in [0, x): sample a 256-bit value and reduce modulo x.
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes);
        U256::from_big_endian(&bytes) % x
    }
}
