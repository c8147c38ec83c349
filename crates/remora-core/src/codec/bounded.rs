//! Depth-bounded blob decoding.
//!
//! Reads the same layout as the derived `Deserialize` for `Value`, but counts
//! container nesting and fails once it passes the limit instead of recursing
//! until the stack runs out.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, DeserializeSeed, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor};
use serde::Deserializer;

use crate::id::ResultId;
use crate::value::{ExecutionFailure, Slice, Value};

/// Error message carried through the decoder when nesting is too deep.
pub(super) const TOO_DEEP: &str = "value nesting exceeds the depth limit";

/// Upper bound on up-front allocation from a length prefix.
const PREALLOC: usize = 4096;

const VARIANTS: &[&str] = &[
    "Null", "Bool", "Int", "Float", "Str", "Bytes", "List", "Map", "Slice", "Instance",
    "Promise", "Failure",
];

#[derive(Debug, Clone, Copy)]
pub(super) struct ValueSeed {
    depth: usize,
    max: usize,
}

impl ValueSeed {
    pub(super) fn root(max: usize) -> Self {
        Self { depth: 0, max }
    }

    fn nested<E: de::Error>(self) -> Result<Self, E> {
        if self.depth >= self.max {
            return Err(E::custom(TOO_DEEP));
        }
        Ok(Self {
            depth: self.depth + 1,
            max: self.max,
        })
    }
}

impl<'de> DeserializeSeed<'de> for ValueSeed {
    type Value = Value;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        deserializer.deserialize_enum("Value", VARIANTS, self)
    }
}

impl<'de> Visitor<'de> for ValueSeed {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a value")
    }

    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<Value, A::Error> {
        let (index, variant) = data.variant::<u32>()?;
        match index {
            0 => variant.unit_variant().map(|()| Value::Null),
            1 => variant.newtype_variant().map(Value::Bool),
            2 => variant.newtype_variant().map(Value::Int),
            3 => variant.newtype_variant().map(Value::Float),
            4 => variant.newtype_variant().map(Value::Str),
            5 => variant.newtype_variant::<Vec<u8>>().map(Value::Bytes),
            6 => {
                let inner = self.nested::<A::Error>()?;
                variant.newtype_variant_seed(ListSeed(inner)).map(Value::List)
            }
            7 => {
                let inner = self.nested::<A::Error>()?;
                variant.newtype_variant_seed(MapSeed(inner)).map(Value::Map)
            }
            8 => variant.newtype_variant::<Slice>().map(Value::Slice),
            9 => {
                let inner = self.nested::<A::Error>()?;
                variant
                    .newtype_variant_seed(InstanceSeed(inner))
                    .map(Value::Instance)
            }
            10 => variant.newtype_variant::<ResultId>().map(Value::Promise),
            11 => variant
                .newtype_variant::<ExecutionFailure>()
                .map(Value::Failure),
            other => Err(de::Error::invalid_value(
                de::Unexpected::Unsigned(u64::from(other)),
                &"a value variant index below 12",
            )),
        }
    }
}

struct ListSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for ListSeed {
    type Value = Vec<Value>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for ListSeed {
    type Value = Vec<Value>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of values")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(PREALLOC));
        while let Some(item) = seq.next_element_seed(self.0)? {
            items.push(item);
        }
        Ok(items)
    }
}

struct MapSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for MapSeed {
    type Value = BTreeMap<String, Value>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for MapSeed {
    type Value = BTreeMap<String, Value>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut out = BTreeMap::new();
        while let Some(key) = map.next_key::<String>()? {
            let value = map.next_value_seed(self.0)?;
            out.insert(key, value);
        }
        Ok(out)
    }
}

#[derive(Clone, Copy)]
struct InstanceSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for InstanceSeed {
    type Value = crate::value::Instance;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_struct("Instance", &["class", "fields"], self)
    }
}

impl<'de> Visitor<'de> for InstanceSeed {
    type Value = crate::value::Instance;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an instance")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let class = seq
            .next_element::<String>()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let fields = seq
            .next_element_seed(MapSeed(self.0))?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        Ok(crate::value::Instance { class, fields })
    }
}
