//! Metadata formats understood by the entry loader.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{ErrorDetail, ErrorKind, Result, Chainable};

/// Metadata merged into an entry: always a mapping.
pub type Metadata = Map<String, Value>;

pub trait Format: Sized {
    /// Human readable name of the format, used in error messages.
    const NAME: &'static str;

    /// Whether an empty document is valid and means "no metadata".
    const EMPTY_IS_NONE: bool;

    /// The data format's error type.
    type Error: ErrorDetail + 'static;

    fn from_str<T: DeserializeOwned>(string: &str) -> Result<T, Self::Error>;

    /// Parses `string` and keeps it only if it is a mapping. Any other
    /// top-level value yields `None`, as does an empty document in formats
    /// that allow one.
    fn metadata(string: &str) -> Result<Option<Metadata>> {
        if Self::EMPTY_IS_NONE && string.trim().is_empty() {
            return Ok(None);
        }

        let value: Value = Self::from_str(string)
            .chain_with(|| error!(format!("malformed {}", Self::NAME))
                .with_kind(ErrorKind::Parse))?;

        match value {
            Value::Object(map) => Ok(Some(map)),
            other => {
                tracing::debug!(kind = json_kind(&other), "ignoring non-mapping {} document", Self::NAME);
                Ok(None)
            }
        }
    }
}

macro_rules! impl_format {
    ($name:ident ($display:literal, empty = $empty:literal) : $func:expr, $E:ty) => (
        pub struct $name;

        impl Format for $name {
            const NAME: &'static str = $display;

            const EMPTY_IS_NONE: bool = $empty;

            type Error = $E;

            fn from_str<T: DeserializeOwned>(s: &str) -> Result<T, $E> {
                $func(s)
            }
        }
    );
}

impl_format!(Json ("JSON", empty = false): serde_json::from_str, serde_json::Error);
impl_format!(Yaml ("YAML", empty = true): serde_yaml::from_str, serde_yaml::Error);
impl_format!(Toml ("TOML", empty = true): toml::from_str, toml::de::Error);

/// A document split into its front matter block and the text that follows.
#[derive(Debug, PartialEq)]
pub struct FrontMatter<'a> {
    pub attributes: Option<Metadata>,
    pub body: &'a str,
}

impl<'a> FrontMatter<'a> {
    /// Splits `input` into attributes and body. A `---` fence introduces YAML,
    /// a `+++` fence TOML. Input without an opening fence, or with an opening
    /// fence that is never closed, is all body.
    pub fn parse(input: &'a str) -> Result<Self> {
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);
        if let Some((block, body)) = split_block(input, "---") {
            return Ok(FrontMatter { attributes: Yaml::metadata(block)?, body });
        }

        if let Some((block, body)) = split_block(input, "+++") {
            return Ok(FrontMatter { attributes: Toml::metadata(block)?, body });
        }

        Ok(FrontMatter { attributes: None, body: input })
    }
}

fn split_block<'a>(input: &'a str, fence: &str) -> Option<(&'a str, &'a str)> {
    let rest = input.strip_prefix(fence)?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == fence {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }

        offset += line.len();
    }

    None
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn yaml_front_matter() {
        let doc = "---\ntitle: Hello\npapyre:\n  fn: html\n---\n# Body\n";
        let fm = FrontMatter::parse(doc).unwrap();
        let attrs = fm.attributes.unwrap();
        assert_eq!(attrs["title"], json!("Hello"));
        assert_eq!(attrs["papyre"]["fn"], json!("html"));
        assert_eq!(fm.body, "# Body\n");
    }

    #[test]
    fn toml_front_matter() {
        let doc = "+++\ntitle = \"Hi\"\n+++\nbody";
        let fm = FrontMatter::parse(doc).unwrap();
        assert_eq!(fm.attributes.unwrap()["title"], json!("Hi"));
        assert_eq!(fm.body, "body");
    }

    #[test]
    fn no_or_unclosed_front_matter_is_body() {
        let fm = FrontMatter::parse("just text\n---\n").unwrap();
        assert_eq!(fm, FrontMatter { attributes: None, body: "just text\n---\n" });

        let fm = FrontMatter::parse("---\ntitle: x\nno closing fence").unwrap();
        assert!(fm.attributes.is_none());
        assert_eq!(fm.body, "---\ntitle: x\nno closing fence");
    }

    #[test]
    fn empty_and_scalar_blocks_have_no_attributes() {
        let fm = FrontMatter::parse("---\n---\ntext").unwrap();
        assert_eq!(fm, FrontMatter { attributes: None, body: "text" });

        let fm = FrontMatter::parse("---\njust a string\n---\ntext").unwrap();
        assert_eq!(fm, FrontMatter { attributes: None, body: "text" });
    }

    #[test]
    fn malformed_front_matter_is_a_parse_error() {
        let error = FrontMatter::parse("---\ntitle: [unclosed\n---\n").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Parse);
    }

    #[test]
    fn crlf_fences() {
        let fm = FrontMatter::parse("---\r\na: 1\r\n---\r\nbody\r\n").unwrap();
        assert_eq!(fm.attributes.unwrap()["a"], json!(1));
        assert_eq!(fm.body, "body\r\n");
    }

    #[test]
    fn non_mapping_json_is_ignored() {
        assert!(Json::metadata("[1, 2, 3]").unwrap().is_none());
        assert!(Json::metadata("{\"a\": 1}").unwrap().is_some());
        assert!(Json::metadata("{").unwrap_err().is(ErrorKind::Parse));
    }

    #[test]
    fn empty_documents() {
        assert!(Json::metadata("").unwrap_err().is(ErrorKind::Parse));
        assert!(Json::metadata("  \n").unwrap_err().is(ErrorKind::Parse));
        assert!(Yaml::metadata("\n").unwrap().is_none());
        assert!(Toml::metadata("").unwrap().is_none());
    }
}
