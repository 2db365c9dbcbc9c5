use borsh::{BorshDeserialize, BorshSerialize};
use serde::de::{self, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 4-byte chain identifier. The first byte identifies the network; the
/// remaining bytes distinguish chains within that network. The mainchain of
/// a network is the chain whose non-network bytes are all zero.
#[derive(
    BorshDeserialize, BorshSerialize, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug, Hash,
)]
pub struct ChainId(pub [u8; 4]);

impl ChainId {
    pub const LENGTH: usize = 4;

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn network_byte(&self) -> u8 {
        self.0[0]
    }

    /// The mainchain identity of this chain's network.
    #[must_use]
    pub fn mainchain_id(&self) -> ChainId {
        ChainId([self.0[0], 0, 0, 0])
    }

    #[must_use]
    pub fn is_mainchain(&self) -> bool {
        *self == self.mainchain_id()
    }
}

impl From<[u8; 4]> for ChainId {
    fn from(bytes: [u8; 4]) -> Self {
        ChainId(bytes)
    }
}

impl FromStr for ChainId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 4];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(ChainId(bytes))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct HexVisitor;

        impl<'de> Visitor<'de> for HexVisitor {
            type Value = ChainId;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an 8-character hex string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                v.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(HexVisitor)
    }
}

impl Serialize for ChainId {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> Result<<S as serde::Serializer>::Ok, <S as serde::Serializer>::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}
