//! Cluster database: clusters, attributes and command payload schemas
//!
//! Loaded once from INFO text and read-only afterwards:
//!
//! ```text
//! global commands
//! {
//!     0x0A "Report attributes"
//!     {
//!         repeated:object "reports"
//!         {
//!             attribId "attribute"
//!             variant "data"
//!         }
//!     }
//! }
//! 0x0006 "On/Off"
//! {
//!     attributes
//!     {
//!         0x0000 "OnOff" { type bool }
//!     }
//!     commands in
//!     {
//!         0x00 "Off"
//!     }
//!     commands out
//!     {
//!     }
//! }
//! ```

use std::str::FromStr;

use bytes::Bytes;

use crate::codec::{self, Context};
use crate::datatype::DataType;
use crate::error::{Error, Result};
use crate::info::{self, InfoNode};
use crate::searchable::{Keyed, SearchableList};
use crate::types::{AnyType, ObjectType};
use crate::value::Value;

/// Attribute of a cluster
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
    pub id: u16,
    pub name: String,
    /// `None` when the attribute is only ever sent as a variant
    pub datatype: Option<DataType>,
}

/// Global or cluster-specific command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInfo {
    pub id: u8,
    pub name: String,
    pub payload: ObjectType,
}

impl CommandInfo {
    /// Decode a complete command payload
    pub fn decode_payload(&self, ctx: &Context<'_>, data: &[u8]) -> Result<Value> {
        let mut buf = data;
        let value = codec::decode_object(ctx, &self.payload, &mut buf)?;
        if !buf.is_empty() {
            return Err(Error::decode(format!(
                "{} trailing bytes after '{}' payload",
                buf.len(),
                self.name
            )));
        }
        Ok(value)
    }

    /// Encode a command payload
    pub fn encode_payload(&self, ctx: &Context<'_>, value: &Value) -> Result<Bytes> {
        codec::encode_object(ctx, &self.payload, value).map_err(|e| match e {
            Error::EncodeError(msg) => Error::EncodeError(format!("{}: {}", self.name, msg)),
            other => other,
        })
    }
}

/// Cluster with its attribute and command tables
#[derive(Debug, Clone)]
pub struct ClusterInfo {
    pub id: u16,
    pub name: String,
    pub attributes: SearchableList<AttributeInfo>,
    pub commands_in: SearchableList<CommandInfo>,
    pub commands_out: SearchableList<CommandInfo>,
}

impl ClusterInfo {
    pub fn new(id: u16, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            attributes: SearchableList::new(),
            commands_in: SearchableList::new(),
            commands_out: SearchableList::new(),
        }
    }

    pub fn attribute_by_id(&self, id: u16) -> Option<&AttributeInfo> {
        self.attributes.by_id(id)
    }

    pub fn attribute_by_name(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.by_name(name)
    }

    pub fn command_in_by_id(&self, id: u8) -> Option<&CommandInfo> {
        self.commands_in.by_id(id)
    }

    pub fn command_in_by_name(&self, name: &str) -> Option<&CommandInfo> {
        self.commands_in.by_name(name)
    }

    pub fn command_out_by_id(&self, id: u8) -> Option<&CommandInfo> {
        self.commands_out.by_id(id)
    }

    pub fn command_out_by_name(&self, name: &str) -> Option<&CommandInfo> {
        self.commands_out.by_name(name)
    }
}

impl Keyed for AttributeInfo {
    type Id = u16;

    fn id(&self) -> u16 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Keyed for CommandInfo {
    type Id = u8;

    fn id(&self) -> u8 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Keyed for ClusterInfo {
    type Id = u16;

    fn id(&self) -> u16 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// All known clusters plus the global (profile-wide) commands
#[derive(Debug, Clone, Default)]
pub struct ClusterDb {
    clusters: SearchableList<ClusterInfo>,
    global_commands: SearchableList<CommandInfo>,
}

impl ClusterDb {
    /// Parse schema text; the first error aborts the whole load
    pub fn load(text: &str) -> Result<Self> {
        let mut db = ClusterDb::default();
        for node in info::parse(text)? {
            if node.key == "global" {
                db.load_global(&node)?;
            } else {
                let cluster = parse_cluster(&node)?;
                db.clusters.add(cluster)?;
            }
        }
        Ok(db)
    }

    pub fn cluster_by_id(&self, id: u16) -> Option<&ClusterInfo> {
        self.clusters.by_id(id)
    }

    pub fn cluster_by_name(&self, name: &str) -> Option<&ClusterInfo> {
        self.clusters.by_name(name)
    }

    pub fn clusters(&self) -> impl Iterator<Item = &ClusterInfo> {
        self.clusters.iter()
    }

    pub fn global_command_by_id(&self, id: u8) -> Option<&CommandInfo> {
        self.global_commands.by_id(id)
    }

    pub fn global_command_by_name(&self, name: &str) -> Option<&CommandInfo> {
        self.global_commands.by_name(name)
    }

    pub fn global_commands(&self) -> impl Iterator<Item = &CommandInfo> {
        self.global_commands.iter()
    }

    /// Resolve a command to send, global commands first
    ///
    /// Returns `(is_global, command)`.
    pub fn command_out_by_name(&self, cluster_id: u16, name: &str) -> Option<(bool, &CommandInfo)> {
        if let Some(cmd) = self.global_commands.by_name(name) {
            return Some((true, cmd));
        }
        self.cluster_by_id(cluster_id)
            .and_then(|cluster| cluster.command_out_by_name(name))
            .map(|cmd| (false, cmd))
    }

    fn load_global(&mut self, node: &InfoNode) -> Result<()> {
        match node.data.as_str() {
            "commands" => parse_commands(&node.children, "global", &mut self.global_commands),
            "" => {
                for section in &node.children {
                    if section.key != "commands" || !section.data.is_empty() {
                        return Err(Error::schema(format!(
                            "line {}: unknown section '{}' in global",
                            section.line, section.key
                        )));
                    }
                    parse_commands(&section.children, "global", &mut self.global_commands)?;
                }
                Ok(())
            }
            other => Err(Error::schema(format!(
                "line {}: unknown global section '{}'",
                node.line, other
            ))),
        }
    }
}

impl FromStr for ClusterDb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ClusterDb::load(s)
    }
}

// ============================================================================
// Schema text parsing
// ============================================================================

/// Parse an integer literal in C style: `0x` hex, leading `0` octal, else decimal
fn parse_number(literal: &str) -> Option<u64> {
    let (digits, radix) = if let Some(hex) = literal
        .strip_prefix("0x")
        .or_else(|| literal.strip_prefix("0X"))
    {
        (hex, 16)
    } else if literal.len() > 1 && literal.starts_with('0') {
        (&literal[1..], 8)
    } else {
        (literal, 10)
    };
    if digits.is_empty() || digits.starts_with('+') {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

fn parse_id<T: TryFrom<u64>>(node: &InfoNode, what: &str) -> Result<T> {
    parse_number(&node.key)
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| {
            Error::schema(format!(
                "line {}: invalid {} id '{}' for '{}'",
                node.line, what, node.key, node.data
            ))
        })
}

fn parse_cluster(node: &InfoNode) -> Result<ClusterInfo> {
    let mut cluster = ClusterInfo::new(parse_id::<u16>(node, "cluster")?, node.data.clone());

    for section in &node.children {
        match (section.key.as_str(), section.data.as_str()) {
            ("attributes", _) => parse_attributes(section, &mut cluster)?,
            ("commands", "in") => {
                parse_commands(&section.children, &cluster.name, &mut cluster.commands_in)?
            }
            ("commands", "out") => {
                parse_commands(&section.children, &cluster.name, &mut cluster.commands_out)?
            }
            ("commands", other) => {
                return Err(Error::schema(format!(
                    "line {}: commands section of '{}' must be 'in' or 'out', got '{}'",
                    section.line, cluster.name, other
                )))
            }
            (other, _) => {
                return Err(Error::schema(format!(
                    "line {}: unknown section '{}' in cluster '{}'",
                    section.line, other, cluster.name
                )))
            }
        }
    }
    Ok(cluster)
}

fn parse_attributes(section: &InfoNode, cluster: &mut ClusterInfo) -> Result<()> {
    for node in &section.children {
        let mut datatype = None;
        for property in &node.children {
            if property.key != "type" || datatype.is_some() {
                return Err(Error::schema(format!(
                    "line {}: unexpected '{}' in attribute '{}' of '{}'",
                    property.line, property.key, node.data, cluster.name
                )));
            }
            datatype = Some(DataType::from_name(&property.data).ok_or_else(|| {
                Error::schema(format!(
                    "line {}: unknown type '{}' for attribute '{}' of '{}'",
                    property.line, property.data, node.data, cluster.name
                ))
            })?);
        }

        let attribute = AttributeInfo {
            id: parse_id(node, "attribute")?,
            name: node.data.clone(),
            datatype,
        };
        cluster
            .attributes
            .add(attribute)
            .map_err(|e| in_owner(e, &cluster.name))?;
    }
    Ok(())
}

fn parse_commands(
    nodes: &[InfoNode],
    owner: &str,
    list: &mut SearchableList<CommandInfo>,
) -> Result<()> {
    for node in nodes {
        let payload = parse_object(&node.children, &node.data)?;
        payload.validate().map_err(|e| in_owner(e, &node.data))?;
        let command = CommandInfo {
            id: parse_id(node, "command")?,
            name: node.data.clone(),
            payload,
        };
        list.add(command).map_err(|e| in_owner(e, owner))?;
    }
    Ok(())
}

fn in_owner(err: Error, owner: &str) -> Error {
    match err {
        Error::SchemaError(msg) => Error::SchemaError(format!("{} in '{}'", msg, owner)),
        other => other,
    }
}

fn parse_object(nodes: &[InfoNode], owner: &str) -> Result<ObjectType> {
    let mut object = ObjectType::new();
    for node in nodes {
        object.push(node.data.clone(), parse_type(node, &node.key, owner)?);
    }
    Ok(object)
}

/// Build the type of one property from its keyword
fn parse_type(node: &InfoNode, keyword: &str, owner: &str) -> Result<AnyType> {
    if let Some(inner) = keyword.strip_prefix("repeated:") {
        return Ok(AnyType::repeated(parse_type(node, inner, owner)?));
    }
    if let Some(inner) = keyword.strip_prefix("error_or:") {
        return Ok(AnyType::error_or(parse_type(node, inner, owner)?));
    }

    let leaf = match keyword {
        "object" => return Ok(AnyType::Object(parse_object(&node.children, &node.data)?)),
        "repeated" => {
            return Ok(AnyType::repeated(parse_object(&node.children, &node.data)?));
        }
        "variant" => AnyType::Variant,
        "attribute" => AnyType::DataType(DataType::AttribId),
        other => AnyType::DataType(DataType::from_name(other).ok_or_else(|| {
            Error::schema(format!(
                "line {}: unknown type '{}' for '{}' in '{}'",
                node.line, other, node.data, owner
            ))
        })?),
    };

    if !node.children.is_empty() {
        return Err(Error::schema(format!(
            "line {}: type '{}' of '{}' in '{}' takes no children",
            node.line, keyword, node.data, owner
        )));
    }
    Ok(leaf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_literals() {
        assert_eq!(parse_number("0x0A"), Some(10));
        assert_eq!(parse_number("0X1f"), Some(31));
        assert_eq!(parse_number("010"), Some(8));
        assert_eq!(parse_number("0"), Some(0));
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("0x"), None);
        assert_eq!(parse_number("12abc"), None);
        assert_eq!(parse_number("09"), None);
        assert_eq!(parse_number("-1"), None);
        assert_eq!(parse_number("+1"), None);
    }

    #[test]
    fn test_type_keywords() {
        let db = ClusterDb::load(
            r#"
            global commands
            {
                0x00 "Sample"
                {
                    uint8 "plain"
                    object "nested" { bool "flag" }
                    repeated:uint16 "rest"
                }
            }
            "#,
        )
        .unwrap();

        let cmd = db.global_command_by_id(0).unwrap();
        let names: Vec<&str> = cmd.payload.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["plain", "nested", "rest"]);
        assert_eq!(cmd.payload.properties[0].ty, AnyType::DataType(DataType::Uint8));
        assert_eq!(
            cmd.payload.properties[1].ty,
            AnyType::Object(ObjectType::new().with("flag", DataType::Bool))
        );
        assert_eq!(cmd.payload.properties[2].ty, AnyType::repeated(DataType::Uint16));
    }

    #[test]
    fn test_scalar_with_children_is_rejected() {
        let err = ClusterDb::load("global commands { 0x00 \"X\" { uint8 \"a\" { bool \"b\" } } }")
            .unwrap_err();
        assert!(err.to_string().contains("takes no children"));
    }
}
