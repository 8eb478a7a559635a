use blake2::{Blake2b512, Digest};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// A 20-byte account address, rendered as a `0x`-prefixed hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn new(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Result<Self, AddressParseError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(stripped, &mut bytes).map_err(|e| AddressParseError(e.to_string()))?;
        Ok(Address(bytes))
    }

    pub fn as_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

#[derive(Clone, Debug, Error)]
#[error("Invalid address: {0}")]
pub struct AddressParseError(String);

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_hex(s)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self.as_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.as_hex().serialize(s)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let hex_str = String::deserialize(de)?;
        Address::from_hex(&hex_str).map_err(D::Error::custom)
    }
}

/// An ECDSA-style `(v, r, s)` signature over a position hex string.
///
/// The curve arithmetic itself lives behind [`MessageSigner`]; this type is
/// just the wire representation carried in a peer message envelope.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub v: u8,
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::array_from_hex")]
    pub r: [u8; 32],
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::array_from_hex")]
    pub s: [u8; 32],
}

impl Debug for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature(v={}, r={}, s={})", self.v, hex::encode(self.r), hex::encode(self.s))
    }
}

impl Signature {
    /// The signature as `r || s || v`, the layout the adjudicator expects in
    /// transaction payloads.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(&self.r);
        out.extend_from_slice(&self.s);
        out.push(self.v);
        out
    }
}

/// Sign/recover interface consumed by the engines and wallet.
///
/// A production implementation wraps the platform signer (hardware wallet,
/// keystore, browser extension); the engines never see key material.
pub trait MessageSigner {
    /// Sign the given (hex string) message.
    fn sign(&self, data: &str) -> Signature;

    /// Recover the address that produced `signature` over `data`, or `None`
    /// if the signature does not verify.
    fn recover(&self, data: &str, signature: &Signature) -> Option<Address>;
}

//------------------------------------          MockSigner          ------------------------------------------------//

/// A deterministic stand-in for an ECDSA signer, for tests and local loops.
///
/// `r` is a keyed digest over the message, `s` carries the signer's address.
/// Recovery recomputes `r` from the embedded address and rejects on
/// mismatch. Offers no forgery resistance whatsoever.
#[derive(Clone, Debug)]
pub struct MockSigner {
    address: Address,
}

impl MockSigner {
    pub fn new(address: Address) -> Self {
        MockSigner { address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn digest_for(address: &Address, data: &str) -> [u8; 32] {
        let mut hasher = Blake2b512::new();
        hasher.update(b"Rally MockSigner v1");
        hasher.update(address.as_bytes());
        hasher.update(data.as_bytes());
        let out = hasher.finalize();
        let mut r = [0u8; 32];
        r.copy_from_slice(&out[..32]);
        r
    }
}

impl MessageSigner for MockSigner {
    fn sign(&self, data: &str) -> Signature {
        let r = Self::digest_for(&self.address, data);
        let mut s = [0u8; 32];
        s[..20].copy_from_slice(self.address.as_bytes());
        Signature { v: 27, r, s }
    }

    fn recover(&self, data: &str, signature: &Signature) -> Option<Address> {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&signature.s[..20]);
        let address = Address::new(bytes);
        let expected = Self::digest_for(&address, data);
        (expected == signature.r).then_some(address)
    }
}
