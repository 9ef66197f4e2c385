//! Codec for the polymorphic wire fields of a resource.
//!
//! Two fields of a Bowtie resource can take more than one JSON shape:
//!
//! - `location` is either *tagged* (`{"type": ..., "value": ...}`) or
//!   *untagged* (`{"ip": ...}`, `{"cidr": ...}` or `{"dns": ...}`).
//! - `ports` is either an inclusive `{"range": [low, high]}` or an explicit
//!   `{"collection": {"ports": [...]}}`.
//!
//! Both are modelled as enums so a value always carries exactly one shape.
//! Decoding a location must try the tagged shape first: every untagged field
//! is optional, so a tagged payload read as untagged would silently become
//! an all-empty location.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::CodecError;

const LOCATION: &str = "location";
const PORTS: &str = "ports";

/// Network location of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLocation {
    /// Legacy shape with one of `ip`, `cidr` or `dns` set.
    Untagged(UntaggedLocation),
    /// Generic discriminator shape for forward-compatible location kinds.
    Tagged(TaggedLocation),
}

/// Legacy location shape. Only one field is set in practice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UntaggedLocation {
    /// Single IP address.
    pub ip: String,
    /// CIDR block.
    pub cidr: String,
    /// DNS name.
    pub dns: String,
}

/// Tagged location shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedLocation {
    /// Location kind (e.g. `ip`, `cidr`, `dns`).
    pub kind: String,
    /// Location value.
    pub value: String,
}

/// Declared (user-facing) location, before it is narrowed to one shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSpec {
    /// Single IP address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// CIDR block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    /// DNS name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<String>,
    /// Tagged location kind.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Tagged location value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Port specification of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourcePorts {
    /// Inclusive port range.
    Range {
        /// Lowest port.
        low: u16,
        /// Highest port.
        high: u16,
    },
    /// Explicit list of ports.
    Collection(Vec<u16>),
}

impl ResourceLocation {
    /// Builds an untagged IP location.
    #[must_use]
    pub fn ip(ip: impl Into<String>) -> Self {
        Self::Untagged(UntaggedLocation {
            ip: ip.into(),
            ..UntaggedLocation::default()
        })
    }

    /// Builds an untagged CIDR location.
    #[must_use]
    pub fn cidr(cidr: impl Into<String>) -> Self {
        Self::Untagged(UntaggedLocation {
            cidr: cidr.into(),
            ..UntaggedLocation::default()
        })
    }

    /// Builds an untagged DNS location.
    #[must_use]
    pub fn dns(dns: impl Into<String>) -> Self {
        Self::Untagged(UntaggedLocation {
            dns: dns.into(),
            ..UntaggedLocation::default()
        })
    }

    /// Builds a tagged location.
    #[must_use]
    pub fn tagged(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Tagged(TaggedLocation {
            kind: kind.into(),
            value: value.into(),
        })
    }

    /// Interprets a JSON value as a location, tagged shape first.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the value is not an object or an untagged
    /// field is not a string.
    pub fn from_value(value: &Value) -> Result<Self, CodecError> {
        let Value::Object(object) = value else {
            return Err(CodecError::decode(
                LOCATION,
                format!("expected an object, got {value}"),
            ));
        };

        if let Some(tagged) = TaggedLocation::from_object(object) {
            return Ok(Self::Tagged(tagged));
        }

        UntaggedLocation::from_object(object).map(Self::Untagged)
    }

    /// Renders the location in its wire shape.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Untagged(untagged) => {
                let mut object = Map::new();
                for (key, field) in [
                    ("ip", &untagged.ip),
                    ("cidr", &untagged.cidr),
                    ("dns", &untagged.dns),
                ] {
                    if !field.is_empty() {
                        object.insert(key.to_string(), Value::String(field.clone()));
                    }
                }
                Value::Object(object)
            }
            Self::Tagged(tagged) => json!({ "type": tagged.kind, "value": tagged.value }),
        }
    }

    /// Returns a short human-readable form (`dns:intranet.local`).
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Tagged(tagged) => format!("{}:{}", tagged.kind, tagged.value),
            Self::Untagged(untagged) => {
                if !untagged.ip.is_empty() {
                    format!("ip:{}", untagged.ip)
                } else if !untagged.cidr.is_empty() {
                    format!("cidr:{}", untagged.cidr)
                } else if !untagged.dns.is_empty() {
                    format!("dns:{}", untagged.dns)
                } else {
                    String::from("(empty)")
                }
            }
        }
    }
}

impl TaggedLocation {
    /// Returns the tagged shape if both `type` and `value` are non-empty strings.
    fn from_object(object: &Map<String, Value>) -> Option<Self> {
        let kind = object.get("type").and_then(Value::as_str)?;
        let value = object.get("value").and_then(Value::as_str)?;
        if kind.is_empty() || value.is_empty() {
            return None;
        }
        Some(Self {
            kind: kind.to_string(),
            value: value.to_string(),
        })
    }
}

impl UntaggedLocation {
    /// Reads the untagged fields. Missing or null fields become empty.
    fn from_object(object: &Map<String, Value>) -> Result<Self, CodecError> {
        Ok(Self {
            ip: string_field(object, "ip")?,
            cidr: string_field(object, "cidr")?,
            dns: string_field(object, "dns")?,
        })
    }

    /// Returns true if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ip.is_empty() && self.cidr.is_empty() && self.dns.is_empty()
    }
}

fn string_field(object: &Map<String, Value>, key: &str) -> Result<String, CodecError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(CodecError::decode(
            LOCATION,
            format!("`{key}` must be a string, got {other}"),
        )),
    }
}

impl TryFrom<&LocationSpec> for ResourceLocation {
    type Error = CodecError;

    fn try_from(spec: &LocationSpec) -> Result<Self, Self::Error> {
        let non_empty = |field: &Option<String>| field.clone().filter(|s| !s.is_empty());

        if let (Some(kind), Some(value)) = (non_empty(&spec.kind), non_empty(&spec.value)) {
            return Ok(Self::tagged(kind, value));
        }

        let untagged = UntaggedLocation {
            ip: non_empty(&spec.ip).unwrap_or_default(),
            cidr: non_empty(&spec.cidr).unwrap_or_default(),
            dns: non_empty(&spec.dns).unwrap_or_default(),
        };
        if untagged.is_empty() {
            return Err(CodecError::encode(LOCATION, "no data to encode"));
        }
        Ok(Self::Untagged(untagged))
    }
}

impl Serialize for ResourceLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResourceLocation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(de::Error::custom)
    }
}

/// Decodes a location from raw JSON bytes.
///
/// # Errors
///
/// Returns a decode error if the bytes are not JSON or match neither shape.
pub fn decode_location(bytes: &[u8]) -> Result<ResourceLocation, CodecError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| CodecError::decode(LOCATION, format!("invalid JSON: {e}")))?;
    ResourceLocation::from_value(&value)
}

/// Encodes a location to raw JSON bytes.
///
/// # Errors
///
/// Returns an encode error if serialization fails.
pub fn encode_location(location: &ResourceLocation) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(&location.to_value()).map_err(|e| CodecError::encode(LOCATION, e.to_string()))
}

impl ResourcePorts {
    /// Builds ports from declared inputs. A range always wins over a collection.
    #[must_use]
    pub fn from_declared(range: Option<[u16; 2]>, collection: &[u16]) -> Self {
        match range {
            Some([low, high]) => Self::Range { low, high },
            None => Self::Collection(collection.to_vec()),
        }
    }

    /// Interprets a JSON value as a port specification, range first.
    ///
    /// # Errors
    ///
    /// Returns a decode error for non-objects, ranges that are not exactly
    /// two ports, or values that are not valid port numbers.
    pub fn from_value(value: &Value) -> Result<Self, CodecError> {
        let Value::Object(object) = value else {
            return Err(CodecError::decode(
                PORTS,
                format!("expected an object, got {value}"),
            ));
        };

        if let Some(range) = object.get("range").filter(|v| !is_empty_array_or_null(v)) {
            let bounds = port_list(range, "range")?;
            let [low, high] = bounds.as_slice() else {
                return Err(CodecError::decode(
                    PORTS,
                    format!("range must hold exactly two ports, got {}", bounds.len()),
                ));
            };
            return Ok(Self::Range {
                low: *low,
                high: *high,
            });
        }

        match object.get("collection") {
            None | Some(Value::Null) => Ok(Self::Collection(Vec::new())),
            Some(Value::Object(collection)) => match collection.get("ports") {
                None | Some(Value::Null) => Ok(Self::Collection(Vec::new())),
                Some(ports) => port_list(ports, "collection.ports").map(Self::Collection),
            },
            Some(other) => Err(CodecError::decode(
                PORTS,
                format!("collection must be an object, got {other}"),
            )),
        }
    }

    /// Renders the ports in their wire shape. Never emits both keys.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Range { low, high } => json!({ "range": [low, high] }),
            Self::Collection(ports) => json!({ "collection": { "ports": ports } }),
        }
    }

    /// Returns true if the given port is covered.
    #[must_use]
    pub fn contains(&self, port: u16) -> bool {
        match self {
            Self::Range { low, high } => (*low..=*high).contains(&port),
            Self::Collection(ports) => ports.contains(&port),
        }
    }

    /// Returns a short human-readable form (`80-443` or `22,80`).
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Range { low, high } => format!("{low}-{high}"),
            Self::Collection(ports) if ports.is_empty() => String::from("(none)"),
            Self::Collection(ports) => ports
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

fn is_empty_array_or_null(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn port_list(value: &Value, field: &str) -> Result<Vec<u16>, CodecError> {
    let Value::Array(items) = value else {
        return Err(CodecError::decode(
            PORTS,
            format!("{field} must be an array, got {value}"),
        ));
    };

    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .ok_or_else(|| CodecError::decode(PORTS, format!("{field}: invalid port {item}")))
        })
        .collect()
}

impl Serialize for ResourcePorts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResourcePorts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(de::Error::custom)
    }
}

impl Default for ResourcePorts {
    fn default() -> Self {
        Self::Collection(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_round_trip() {
        let cases = [
            ResourceLocation::ip("10.0.0.1"),
            ResourceLocation::cidr("10.0.0.0/8"),
            ResourceLocation::dns("intranet.example.com"),
            ResourceLocation::tagged("dns", "intranet.example.com"),
        ];

        for location in cases {
            let bytes = encode_location(&location).unwrap();
            assert_eq!(decode_location(&bytes).unwrap(), location);
        }
    }

    #[test]
    fn test_untagged_encodes_only_set_fields() {
        let bytes = encode_location(&ResourceLocation::cidr("10.0.0.0/8")).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({ "cidr": "10.0.0.0/8" }));
    }

    #[test]
    fn test_tagged_wins_when_both_shapes_present() {
        let payload = br#"{"type": "dns", "value": "a.example.com", "ip": "10.0.0.1"}"#;
        assert_eq!(
            decode_location(payload).unwrap(),
            ResourceLocation::tagged("dns", "a.example.com")
        );
    }

    #[test]
    fn test_incomplete_tag_falls_back_to_untagged() {
        let payload = br#"{"type": "dns", "value": "", "ip": "10.0.0.1"}"#;
        assert_eq!(decode_location(payload).unwrap(), ResourceLocation::ip("10.0.0.1"));
    }

    #[test]
    fn test_empty_object_is_accepted_as_untagged() {
        let location = decode_location(b"{}").unwrap();
        assert_eq!(location, ResourceLocation::Untagged(UntaggedLocation::default()));
    }

    #[test]
    fn test_malformed_location_is_decode_error() {
        for payload in [&b"[1, 2]"[..], b"42", br#"{"ip": 7}"#, b"not json"] {
            let err = decode_location(payload).unwrap_err();
            assert!(matches!(err, CodecError::Decode { .. }), "{err:?}");
        }
    }

    #[test]
    fn test_location_through_serde() {
        #[derive(Deserialize)]
        struct Holder {
            location: ResourceLocation,
        }

        let holder: Holder =
            serde_json::from_str(r#"{"location": {"dns": "svc.local"}}"#).unwrap();
        assert_eq!(holder.location, ResourceLocation::dns("svc.local"));
    }

    #[test]
    fn test_declared_location_requires_data() {
        let err = ResourceLocation::try_from(&LocationSpec::default()).unwrap_err();
        assert_eq!(err, CodecError::encode("location", "no data to encode"));

        let spec = LocationSpec {
            ip: Some(String::from("10.1.1.1")),
            kind: Some(String::from("cidr")),
            value: Some(String::from("10.1.0.0/16")),
            ..LocationSpec::default()
        };
        assert_eq!(
            ResourceLocation::try_from(&spec).unwrap(),
            ResourceLocation::tagged("cidr", "10.1.0.0/16")
        );
    }

    #[test]
    fn test_ports_range_wins() {
        let ports = ResourcePorts::from_declared(Some([80, 443]), &[22, 25]);
        assert_eq!(ports, ResourcePorts::Range { low: 80, high: 443 });

        let value = ports.to_value();
        assert!(value.get("collection").is_none());
        assert_eq!(value, json!({ "range": [80, 443] }));
    }

    #[test]
    fn test_ports_collection_when_no_range() {
        let ports = ResourcePorts::from_declared(None, &[22, 25]);
        assert_eq!(ports.to_value(), json!({ "collection": { "ports": [22, 25] } }));
        assert!(ports.contains(25));
        assert!(!ports.contains(80));
    }

    #[test]
    fn test_ports_decode_prefers_range() {
        let value = json!({ "range": [1000, 2000], "collection": { "ports": [22] } });
        assert_eq!(
            ResourcePorts::from_value(&value).unwrap(),
            ResourcePorts::Range { low: 1000, high: 2000 }
        );

        let value = json!({ "range": [], "collection": { "ports": [22] } });
        assert_eq!(
            ResourcePorts::from_value(&value).unwrap(),
            ResourcePorts::Collection(vec![22])
        );
    }

    #[test]
    fn test_ports_decode_errors() {
        for value in [
            json!({ "range": [1, 2, 3] }),
            json!({ "range": [70000, 70001] }),
            json!({ "collection": [22] }),
            json!("22"),
        ] {
            assert!(ResourcePorts::from_value(&value).is_err(), "{value}");
        }
    }

    #[test]
    fn test_ports_missing_keys_decode_as_empty_collection() {
        assert_eq!(
            ResourcePorts::from_value(&json!({})).unwrap(),
            ResourcePorts::Collection(vec![])
        );
    }
}
