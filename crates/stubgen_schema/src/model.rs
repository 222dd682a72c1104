use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::SchemaError;

/// The schema file format version this crate reads and writes.
pub const SUPPORTED_VERSION: &str = "1.1";

/// A whole schema file: hand-authored overrides mergeable with analysis
/// output.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
    pub version: String,
    #[serde(default)]
    pub languages: Languages,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Languages {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lua: Option<LuaLanguage>,
}

impl SchemaFile {
    pub fn new(lua: LuaLanguage) -> Self {
        Self {
            version: SUPPORTED_VERSION.to_string(),
            languages: Languages { lua: Some(lua) },
        }
    }

    /// Rejects files this crate does not understand. Called by the reader
    /// before any entry is consumed.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.version != SUPPORTED_VERSION {
            return Err(SchemaError::UnsupportedVersion {
                found: self.version.clone(),
            });
        }
        if self.languages.lua.is_none() {
            return Err(SchemaError::Shape {
                message: "missing `languages.lua` section".to_string(),
            });
        }
        Ok(())
    }
}

/// Everything a schema file says about one language's API surface.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LuaLanguage {
    /// Type-name aliases applied when rendering (`Callback` for
    /// `function`, say).
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub aliases: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub classes: IndexMap<String, ClassEntry>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub tables: IndexMap<String, TableEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionEntry>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, FieldEntry>,
    /// File-level tags; `StubGen_Definitions` and `StubGen_Hidden` change
    /// how the emitter treats the whole file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutable: Option<bool>,
    #[serde(default, rename = "local", skip_serializing_if = "Option::is_none")]
    pub is_local: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constructors: Vec<ConstructorEntry>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, FieldEntry>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub static_fields: IndexMap<String, FieldEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<FunctionEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_methods: Vec<FunctionEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overloads: Vec<OverloadEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operators: Vec<OperatorEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Like a class, but never instantiated: no base class, no constructors.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutable: Option<bool>,
    #[serde(default, rename = "local", skip_serializing_if = "Option::is_none")]
    pub is_local: Option<bool>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, FieldEntry>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub static_fields: IndexMap<String, FieldEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<FunctionEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_methods: Vec<FunctionEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overloads: Vec<OverloadEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operators: Vec<OperatorEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterEntry>,
    #[serde(default, rename = "return", skip_serializing_if = "Vec::is_empty")]
    pub returns: Vec<ReturnEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overloads: Vec<OverloadEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructorEntry {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterEntry {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnEntry {
    #[serde(default, rename = "type", skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverloadEntry {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterEntry>,
    #[serde(default, rename = "return", skip_serializing_if = "Vec::is_empty")]
    pub returns: Vec<ReturnEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorEntry {
    /// The metamethod-style operation name (`add`, `concat`, `eq`, ...).
    pub operation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterEntry>,
    #[serde(default, rename = "return", skip_serializing_if = "Vec::is_empty")]
    pub returns: Vec<ReturnEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldEntry {
    #[serde(default, rename = "type", skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::{LuaLanguage, SchemaFile};
    use crate::SchemaError;

    #[test]
    fn validates_supported_version() {
        let file = SchemaFile::new(LuaLanguage::default());
        assert_eq!(file.validate(), Ok(()));
    }

    #[test]
    fn rejects_other_versions() {
        let mut file = SchemaFile::new(LuaLanguage::default());
        file.version = "2.0".to_string();
        assert!(matches!(
            file.validate(),
            Err(SchemaError::UnsupportedVersion { found }) if found == "2.0"
        ));
    }

    #[test]
    fn rejects_missing_language_section() {
        let file = SchemaFile {
            version: super::SUPPORTED_VERSION.to_string(),
            languages: super::Languages::default(),
        };
        assert!(matches!(file.validate(), Err(SchemaError::Shape { .. })));
    }

    #[test]
    fn round_trips_through_json() {
        let source = r#"
        {
            "version": "1.1",
            "languages": {
                "lua": {
                    "classes": {
                        "Foo": {
                            "extends": "Base",
                            "constructors": [{ "parameters": [{ "name": "x", "type": ["number"] }] }],
                            "fields": { "x": { "type": ["number"], "nullable": false } },
                            "methods": [
                                { "name": "getX", "return": [{ "type": ["number"] }] }
                            ],
                            "tags": ["StubGen_NoInitializer"]
                        }
                    },
                    "functions": [
                        { "name": "makeFoo", "return": [{ "type": ["Foo"] }] }
                    ],
                    "fields": { "FOO_VERSION": { "type": ["string"] } }
                }
            }
        }
        "#;
        let parsed: SchemaFile = serde_json::from_str(source).unwrap();
        parsed.validate().unwrap();

        let lua = parsed.languages.lua.as_ref().unwrap();
        let class = &lua.classes["Foo"];
        assert_eq!(class.extends.as_deref(), Some("Base"));
        assert_eq!(class.constructors.len(), 1);
        assert_eq!(class.methods[0].returns[0].types, ["number"]);

        let rendered = serde_json::to_string(&parsed).unwrap();
        let reparsed: SchemaFile = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed, reparsed);
    }
}
