use serde::{Deserialize, Serialize};

use super::RECORD_TYPE;

/// Response returned by Spaceship's `GET /dns/records/{domain}` endpoint.
///
/// Depending on the API version, records come back either as a bare array or wrapped in an object alongside paging
/// info. An object without any `items` is treated as an empty list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListResponse {
    Bare(Vec<DnsRecord>),
    Paged {
        #[serde(default)]
        items: Vec<DnsRecord>,
    },
}

impl ListResponse {
    pub fn into_records(self) -> Vec<DnsRecord> {
        match self {
            ListResponse::Bare(records) => records,
            ListResponse::Paged { items } => items,
        }
    }
}

/// A single DNS record as listed by Spaceship.
///
/// Only the fields needed to find and compare AAAA records are kept; anything else in the response (MX priorities,
/// CNAME targets, and so on) is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DnsRecord {
    #[serde(default, with = "optional_primitive_as_string")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub typ: String,
    pub name: String,
    /// Only present on `A` and `AAAA` records.
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, with = "optional_or_stringified_number")]
    pub ttl: Option<u32>,
}

impl DnsRecord {
    /// Checks if this is the AAAA record for the given host. Comparison is exact, so `Node1` and `node1` are different
    /// hosts.
    pub fn is_aaaa_for(&self, hostname: &str) -> bool {
        self.typ == RECORD_TYPE && self.name == hostname
    }
}

/// The AAAA record this program wants to exist, in the shape Spaceship expects it in a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AaaaRecord {
    pub address: String,
    #[serde(rename = "type")]
    pub typ: &'static str,
    pub name: String,
    pub ttl: u32,
    /// ID of the record being replaced. Without it, Spaceship would add a second AAAA record next to the old one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl AaaaRecord {
    pub fn new(name: &str, address: &str, ttl: u32) -> Self {
        Self {
            address: address.to_string(),
            typ: RECORD_TYPE,
            name: name.to_string(),
            ttl,
            id: None,
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }
}

/// Request body for Spaceship's `PUT /dns/records/{domain}` endpoint.
///
/// `force` tells Spaceship to overwrite the identified entry if it conflicts with what's there. It only applies to the
/// items in this request; other records on the domain are left alone.
#[derive(Debug, Serialize)]
pub struct UpsertRequest<'a> {
    pub force: bool,
    pub items: &'a [AaaaRecord],
}

/// A `serde(with)` module for a `u32` which may be missing, `null`, a number, or a number inside a string.
mod optional_or_stringified_number {
    use serde::{Deserializer, de};

    #[derive(Debug)]
    struct Visitor;

    impl Visitor {
        fn try_int<T: TryInto<u32>, E: de::Error>(self, x: T) -> Result<u32, E> {
            x.try_into().map_err(|_| de::Error::custom("integer out of range"))
        }
    }

    #[rustfmt::skip]
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<u32>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("an integer, a string, or null")
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
            deserializer.deserialize_any(self)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            self.visit_none()
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            if v.is_empty() {
                Ok(None)
            } else {
                let i = v.parse::<i64>().map_err(de::Error::custom)?;
                self.try_int(i).map(Some)
            }
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> { self.try_int(v).map(Some) }
        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> { self.try_int(v).map(Some) }
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        d.deserialize_any(Visitor)
    }
}

/// A `serde(with)` module for an identifier that may be missing, `null`, a string, or a bare number.
mod optional_primitive_as_string {
    use serde::{Deserializer, de};

    #[derive(Debug)]
    struct Visitor;

    #[rustfmt::skip]
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string, a number, or null")
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
            deserializer.deserialize_any(self)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> { Ok(None) }
        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> { Ok(None) }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> { Ok(Some(v)) }
        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> { Ok(Some(v.to_string())) }
        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> { Ok(Some(v.to_string())) }
        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> { Ok(Some(v.to_string())) }
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        d.deserialize_any(Visitor)
    }
}
