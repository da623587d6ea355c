//! Field elements, assets and amounts
//!
//! Every value that ends up inside a hash is a 32-byte little-endian
//! encoding of a BN254 scalar. Amounts are arbitrary precision unsigned
//! integers bounded by the scalar modulus.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;
use num_traits::{Num, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::PrivacyError;

/// Declares a 32-byte newtype with hex `Display`/`FromStr` and a hex string serde form.
macro_rules! field_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
        )]
        #[serde(into = "String", try_from = "String")]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub const ZERO: Self = Self([0u8; 32]);

            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Reduce into a scalar (mod r)
            pub fn to_field(&self) -> ark_bn254::Fr {
                <ark_bn254::Fr as ark_ff::PrimeField>::from_le_bytes_mod_order(&self.0)
            }

            pub fn from_field(f: ark_bn254::Fr) -> Self {
                Self($crate::field::fr_to_bytes(f))
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::PrivacyError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s, &mut bytes).map_err(|e| {
                    $crate::error::PrivacyError::Validation(format!(
                        "invalid {} hex: {}",
                        stringify!($name),
                        e
                    ))
                })?;
                Ok(Self(bytes))
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::error::PrivacyError;

            fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> String {
                v.to_string()
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

pub(crate) use field_newtype;

field_newtype!(
    /// A BN254 scalar in canonical little-endian form
    FieldElement
);

field_newtype!(
    /// Asset identifier (mint address). The all-zero id is the native asset.
    AssetId
);

impl AssetId {
    /// The native (fee-paying) asset
    pub const NATIVE: Self = Self([0u8; 32]);

    pub fn is_native(&self) -> bool {
        *self == Self::NATIVE
    }

    /// The asset id as a hash input
    pub fn to_element(&self) -> FieldElement {
        FieldElement(self.0)
    }
}

impl FieldElement {
    pub fn from_u64(v: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&v.to_le_bytes());
        Self(bytes)
    }

    /// Canonical form of the bytes reduced mod r
    pub fn reduced(&self) -> Self {
        Self::from_field(self.to_field())
    }

    /// Encode an integer below the field modulus
    pub fn from_biguint(v: &BigUint) -> Result<Self, PrivacyError> {
        if v >= field_modulus() {
            return Err(PrivacyError::validation(format!(
                "value {v} exceeds the field modulus"
            )));
        }
        let le = v.to_bytes_le();
        let mut bytes = [0u8; 32];
        bytes[..le.len()].copy_from_slice(&le);
        Ok(Self(bytes))
    }

    /// Parse a decimal field element (the form the pool publishes constants in)
    pub fn from_decimal(s: &str) -> Result<Self, PrivacyError> {
        let v = BigUint::from_str_radix(s, 10).map_err(|e| {
            PrivacyError::validation(format!("invalid decimal field element {s:?}: {e}"))
        })?;
        Self::from_biguint(&v)
    }
}

/// BN254 scalar modulus
pub fn field_modulus() -> &'static BigUint {
    static MODULUS: OnceLock<BigUint> = OnceLock::new();
    MODULUS.get_or_init(|| BigUint::from(Fr::MODULUS))
}

pub(crate) fn fr_to_bytes(f: Fr) -> [u8; 32] {
    let bytes = f.into_bigint().to_bytes_le();
    let mut arr = [0u8; 32];
    arr[..bytes.len()].copy_from_slice(&bytes);
    arr
}

/// Non-negative token amount
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Amount(BigUint);

impl Amount {
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn new(value: BigUint) -> Self {
        Self(value)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Checked subtraction, `None` on underflow
    pub fn checked_sub(&self, rhs: &Self) -> Option<Self> {
        if self.0 < rhs.0 {
            None
        } else {
            Some(Self(&self.0 - &rhs.0))
        }
    }

    /// Subtraction clamped at zero
    pub fn saturating_sub(&self, rhs: &Self) -> Self {
        self.checked_sub(rhs).unwrap_or_default()
    }

    /// Whether the amount can be committed to (strictly below the modulus)
    pub fn fits_field(&self) -> bool {
        &self.0 < field_modulus()
    }

    pub fn to_element(&self) -> Result<FieldElement, PrivacyError> {
        FieldElement::from_biguint(&self.0)
    }

    pub fn to_le_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        let le = self.0.to_bytes_le();
        let n = le.len().min(32);
        bytes[..n].copy_from_slice(&le[..n]);
        bytes
    }

    pub fn from_le_bytes(bytes: &[u8; 32]) -> Self {
        Self(BigUint::from_bytes_le(bytes))
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Self(BigUint::from(v))
    }
}

impl FromStr for Amount {
    type Err = PrivacyError;

    /// Decimal, non-negative integers only
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PrivacyError::validation(format!(
                "amount must be a non-negative integer, got {s:?}"
            )));
        }
        BigUint::from_str_radix(s, 10)
            .map(Self)
            .map_err(|e| PrivacyError::validation(format!("invalid amount {s:?}: {e}")))
    }
}

impl TryFrom<String> for Amount {
    type Error = PrivacyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Amount> for String {
    fn from(v: Amount) -> String {
        v.0.to_str_radix(10)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self.0)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl<'a> Add<&'a Amount> for &'a Amount {
    type Output = Amount;

    fn add(self, rhs: &'a Amount) -> Amount {
        Amount(&self.0 + &rhs.0)
    }
}

impl AddAssign<&Amount> for Amount {
    fn add_assign(&mut self, rhs: &Amount) {
        self.0 += &rhs.0;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |acc, v| acc + v)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |mut acc, v| {
            acc += v;
            acc
        })
    }
}
