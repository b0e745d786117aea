//! HyperLogLog cardinality estimator for approximate unique-visitor counts.
//!
//! State is a dense register array and nothing else: hashing is SHA-256 with
//! no per-instance seed, so an estimator rebuilt from its serialized form
//! reports exactly the same count and keeps accepting items consistently.
//!
//! Serialized layout: `b"HLL"`, a format version byte, the precision byte,
//! then one byte per register.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

const MAGIC: &[u8; 3] = b"HLL";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = MAGIC.len() + 2;

pub const MIN_PRECISION: u8 = 4;
pub const MAX_PRECISION: u8 = 16;
/// 16384 registers; standard error around 0.8%.
pub const DEFAULT_PRECISION: u8 = 14;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HyperLogLogError {
    #[error("precision {0} is outside {MIN_PRECISION}..={MAX_PRECISION}")]
    InvalidPrecision(u8),
    #[error("serialized estimator is truncated")]
    Truncated,
    #[error("serialized estimator has an unknown header")]
    BadMagic,
    #[error("unsupported estimator format version {0}")]
    UnsupportedVersion(u8),
    #[error("expected {expected} registers, found {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("register {index} holds impossible rank {rank}")]
    RegisterOutOfRange { index: usize, rank: u8 },
    #[error("estimator value is not valid base64 text: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperLogLog {
    precision: u8,
    registers: Vec<u8>,
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            registers: vec![0; 1 << DEFAULT_PRECISION],
        }
    }
}

impl HyperLogLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_precision(precision: u8) -> Result<Self, HyperLogLogError> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return Err(HyperLogLogError::InvalidPrecision(precision));
        }
        Ok(Self {
            precision,
            registers: vec![0; 1 << precision],
        })
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Highest rank a register can hold: the hash bits left after the index, plus one.
    fn max_rank(&self) -> u8 {
        64 - self.precision + 1
    }

    /// Record `item`. Returns true when the internal state changed.
    pub fn add(&mut self, item: &str) -> bool {
        let hash = hash64(item);
        let index = (hash >> (64 - self.precision)) as usize;
        // Guard bit caps the rank at max_rank when the remaining bits are all zero.
        let remaining = (hash << self.precision) | (1 << (self.precision - 1));
        let rank = remaining.leading_zeros() as u8 + 1;

        let register = &mut self.registers[index];
        if rank > *register {
            *register = rank;
            true
        } else {
            false
        }
    }

    /// Approximate number of distinct items added so far.
    pub fn count(&self) -> u64 {
        let m = self.registers.len() as f64;
        let mut sum = 0.0;
        let mut zeros = 0usize;
        for &rank in &self.registers {
            sum += 2f64.powi(-i32::from(rank));
            if rank == 0 {
                zeros += 1;
            }
        }

        let raw = alpha(self.registers.len()) * m * m / sum;
        let estimate = if raw <= 2.5 * m && zeros > 0 {
            m * (m / zeros as f64).ln()
        } else {
            raw
        };
        estimate.round() as u64
    }

    /// Fold `other` into `self`; both must share a precision.
    pub fn merge(&mut self, other: &HyperLogLog) -> Result<(), HyperLogLogError> {
        if other.precision != self.precision {
            return Err(HyperLogLogError::InvalidPrecision(other.precision));
        }
        for (mine, theirs) in self.registers.iter_mut().zip(&other.registers) {
            *mine = (*mine).max(*theirs);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.registers.iter().all(|&rank| rank == 0)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.registers.len());
        bytes.extend_from_slice(MAGIC);
        bytes.push(FORMAT_VERSION);
        bytes.push(self.precision);
        bytes.extend_from_slice(&self.registers);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HyperLogLogError> {
        if bytes.len() < HEADER_LEN {
            return Err(HyperLogLogError::Truncated);
        }
        let (header, registers) = bytes.split_at(HEADER_LEN);
        if &header[..MAGIC.len()] != MAGIC {
            return Err(HyperLogLogError::BadMagic);
        }
        let version = header[MAGIC.len()];
        if version != FORMAT_VERSION {
            return Err(HyperLogLogError::UnsupportedVersion(version));
        }

        let mut estimator = Self::with_precision(header[MAGIC.len() + 1])?;
        if registers.len() != estimator.registers.len() {
            return Err(HyperLogLogError::LengthMismatch {
                expected: estimator.registers.len(),
                actual: registers.len(),
            });
        }
        let max_rank = estimator.max_rank();
        if let Some((index, &rank)) = registers
            .iter()
            .enumerate()
            .find(|(_, rank)| **rank > max_rank)
        {
            return Err(HyperLogLogError::RegisterOutOfRange { index, rank });
        }

        estimator.registers.copy_from_slice(registers);
        Ok(estimator)
    }

    /// Store-friendly form: the serialized bytes as a base64 string value.
    pub fn to_value(&self) -> Value {
        Value::String(STANDARD.encode(self.to_bytes()))
    }

    pub fn from_value(value: &Value) -> Result<Self, HyperLogLogError> {
        let text = value
            .as_str()
            .ok_or_else(|| HyperLogLogError::Encoding("expected a string".to_string()))?;
        let bytes = STANDARD
            .decode(text)
            .map_err(|err| HyperLogLogError::Encoding(err.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

fn hash64(item: &str) -> u64 {
    let digest = Sha256::digest(item.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

fn alpha(registers: usize) -> f64 {
    match registers {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        m => 0.7213 / (1.0 + 1.079 / m as f64),
    }
}
