//! Hierarchical node identifiers.
//!
//! Every catalog object is addressed by a dot-separated list of typed
//! segments, for example `db:shop.schema:public.folder:tables.table:orders`.
//! The last recognized segment decides what a node is, so a table inside a
//! database is a table even though its id starts with `db:`.
//!
//! Segment values may not contain `.` or `:`. Objects whose names contain
//! either character cannot be addressed and are skipped during listing.

use crate::error::{DbError, DbResult};
use std::fmt;

/// Literal id of the hierarchy root.
pub const ROOT_ID: &str = "root";

const SEPARATOR: char = '.';
const PREFIX_SEPARATOR: char = ':';

/// Synthetic grouping under a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FolderKind {
    Tables,
    Views,
    Functions,
}

impl FolderKind {
    /// Folders in the order they are listed under a schema.
    pub const ALL: [FolderKind; 3] = [Self::Tables, Self::Views, Self::Functions];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tables => "tables",
            Self::Views => "views",
            Self::Functions => "functions",
        }
    }

    /// Display label of the folder node.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Tables => "Tables",
            Self::Views => "Views",
            Self::Functions => "Functions",
        }
    }

    fn from_value(value: &str) -> Option<Self> {
        match value {
            "tables" => Some(Self::Tables),
            "views" => Some(Self::Views),
            "functions" => Some(Self::Functions),
            _ => None,
        }
    }
}

/// One typed component of a node id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Database(String),
    Schema(String),
    Folder(FolderKind),
    Table(String),
    View(String),
    Function(String),
    Column(String),
}

impl Segment {
    fn prefix(&self) -> &'static str {
        match self {
            Self::Database(_) => "db",
            Self::Schema(_) => "schema",
            Self::Folder(_) => "folder",
            Self::Table(_) => "table",
            Self::View(_) => "view",
            Self::Function(_) => "func",
            Self::Column(_) => "column",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Database(v)
            | Self::Schema(v)
            | Self::Table(v)
            | Self::View(v)
            | Self::Function(v)
            | Self::Column(v) => v,
            Self::Folder(kind) => kind.as_str(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Database(_) => NodeKind::Database,
            Self::Schema(_) => NodeKind::Schema,
            Self::Folder(_) => NodeKind::Folder,
            Self::Table(_) => NodeKind::Table,
            Self::View(_) => NodeKind::View,
            Self::Function(_) => NodeKind::Function,
            Self::Column(_) => NodeKind::Column,
        }
    }

    /// Parse a single `prefix:value` token; None for unrecognized tokens.
    fn from_token(token: &str) -> Option<Self> {
        let (prefix, value) = token.split_once(PREFIX_SEPARATOR)?;
        if value.is_empty() {
            return None;
        }
        let value = value.to_string();
        match prefix {
            "db" => Some(Self::Database(value)),
            "schema" => Some(Self::Schema(value)),
            "folder" => FolderKind::from_value(&value).map(Self::Folder),
            "table" => Some(Self::Table(value)),
            "view" => Some(Self::View(value)),
            "func" => Some(Self::Function(value)),
            "column" => Some(Self::Column(value)),
            _ => None,
        }
    }

    fn validate(&self) -> DbResult<()> {
        let value = self.value();
        if value.is_empty() {
            return Err(DbError::invalid_node_id(
                format!("{}:", self.prefix()),
                "segment value cannot be empty",
            ));
        }
        if value.contains(SEPARATOR) || value.contains(PREFIX_SEPARATOR) {
            return Err(DbError::invalid_node_id(
                format!("{}:{}", self.prefix(), value),
                "segment values cannot contain '.' or ':'",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix(), PREFIX_SEPARATOR, self.value())
    }
}

/// What a node id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Root,
    Database,
    Schema,
    Folder,
    Table,
    View,
    Function,
    Column,
    Unknown,
}

/// A composed node identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id of a direct child reached through `segment`.
    pub fn child(&self, segment: Segment) -> DbResult<NodeId> {
        segment.validate()?;
        Ok(NodeId(format!("{}{}{}", self.0, SEPARATOR, segment)))
    }

    pub fn kind(&self) -> NodeKind {
        classify(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for NodeId {
    type Error = DbError;

    /// Accepts any id that parses to at least one segment.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        parse(value)?;
        Ok(NodeId(value.to_string()))
    }
}

/// Join segments into a node id.
pub fn compose(segments: &[Segment]) -> DbResult<NodeId> {
    if segments.is_empty() {
        return Err(DbError::invalid_node_id("", "at least one segment is required"));
    }
    let mut parts = Vec::with_capacity(segments.len());
    for segment in segments {
        segment.validate()?;
        parts.push(segment.to_string());
    }
    Ok(NodeId(parts.join(".")))
}

/// Split a node id into its recognized segments.
///
/// A string without any `:` is a legacy bare table name. Tokens with an
/// unknown prefix are ignored.
pub fn parse(id: &str) -> DbResult<Vec<Segment>> {
    if id.is_empty() {
        return Err(DbError::invalid_node_id(id, "node id cannot be empty"));
    }
    if id == ROOT_ID {
        return Err(DbError::invalid_node_id(id, "the root has no segments"));
    }
    if !id.contains(PREFIX_SEPARATOR) {
        return Ok(vec![Segment::Table(id.to_string())]);
    }
    Ok(id.split(SEPARATOR).filter_map(Segment::from_token).collect())
}

/// Kind of the last recognized segment of `id`.
pub fn classify(id: &str) -> NodeKind {
    if id == ROOT_ID {
        return NodeKind::Root;
    }
    parse(id)
        .ok()
        .and_then(|segments| segments.last().map(Segment::kind))
        .unwrap_or(NodeKind::Unknown)
}

/// The addressable parts of a node id, with the default schema filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePath {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub folder: Option<FolderKind>,
    /// Table, view or function
    pub object: Option<Segment>,
    pub column: Option<String>,
}

impl NodePath {
    /// Resolve `id`, defaulting the schema when an object is addressed
    /// without one.
    pub fn resolve(id: &str, default_schema: Option<&str>) -> DbResult<Self> {
        let mut path = NodePath::default();
        for segment in parse(id)? {
            match segment {
                Segment::Database(v) => path.database = Some(v),
                Segment::Schema(v) => path.schema = Some(v),
                Segment::Folder(kind) => path.folder = Some(kind),
                Segment::Column(v) => path.column = Some(v),
                object => path.object = Some(object),
            }
        }
        if path.schema.is_none() && path.object.is_some() {
            path.schema = default_schema.map(String::from);
        }
        Ok(path)
    }

    /// Name of the addressed table, view or function.
    pub fn object_name(&self) -> Option<&str> {
        self.object.as_ref().map(Segment::value)
    }
}
