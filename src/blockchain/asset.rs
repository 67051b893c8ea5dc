use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single descriptive trait of an asset, e.g. `{"trait_type": "Background", "value": "Aqua"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Attribute {
    pub trait_type: String,
    pub value: String,
}

/// Metadata describing a non-fungible asset.
///
/// An asset is identified by its `dna`: the same `dna` appearing in several
/// transactions always refers to the same asset, and the receiver of the most
/// recent confirmed transaction carrying it is the current owner. The metadata
/// itself is never mutated after minting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Asset {
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// URI of the asset's image.
    pub image: String,
    /// Unique fingerprint identifying the asset across its whole history.
    pub dna: String,
    /// Edition number within a collection, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edition: Option<u32>,
    /// Creation time in milliseconds since the Unix epoch.
    pub date: i64,
    /// Descriptive traits. Empty when the asset has none.
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    /// Tool that generated the asset, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "name": "Punk #7",
            "description": "A punk",
            "image": "ipfs://punk-7.png",
            "dna": "d1f0e5a9",
            "edition": 7,
            "date": 1713000000000,
            "attributes": [{"trait_type": "Background", "value": "Aqua"}],
            "compiler": "HashLips Art Engine"
        }"#
    }

    #[test]
    fn test_asset_deserializes() {
        let asset: Asset = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(asset.dna, "d1f0e5a9");
        assert_eq!(asset.edition, Some(7));
        assert_eq!(asset.attributes.len(), 1);
        assert_eq!(asset.attributes[0].trait_type, "Background");
    }

    #[test]
    fn test_optional_fields_default() {
        let minimal = r#"{
            "name": "Bare",
            "description": "",
            "image": "ipfs://bare.png",
            "dna": "00ff",
            "date": 0
        }"#;
        let asset: Asset = serde_json::from_str(minimal).unwrap();
        assert_eq!(asset.edition, None);
        assert!(asset.attributes.is_empty());
        assert_eq!(asset.compiler, None);
    }

    #[test]
    fn test_absent_options_are_skipped_when_encoding() {
        let asset = Asset {
            name: "Bare".into(),
            description: String::new(),
            image: "ipfs://bare.png".into(),
            dna: "00ff".into(),
            edition: None,
            date: 0,
            attributes: vec![],
            compiler: None,
        };
        let encoded = serde_json::to_string(&asset).unwrap();
        assert!(!encoded.contains("edition"));
        assert!(!encoded.contains("compiler"));
    }
}
