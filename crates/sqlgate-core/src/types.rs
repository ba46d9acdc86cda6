//! Field typing shared by drivers, the result envelope and clients.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generic SQL column type, independent of any backend.
///
/// Names follow the JDBC `java.sql.Types` vocabulary so that field metadata
/// looks the same whichever backend produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SqlType {
    Bit,
    Tinyint,
    Smallint,
    Integer,
    Bigint,
    Float,
    Real,
    Double,
    Numeric,
    Decimal,
    Char,
    Varchar,
    Longvarchar,
    Date,
    Time,
    Timestamp,
    TimeWithTimezone,
    TimestampWithTimezone,
    Binary,
    Varbinary,
    Longvarbinary,
    Blob,
    Clob,
    Boolean,
    Array,
    Struct,
    Other,
}

impl SqlType {
    /// The coarse type a UI uses to render values of this type.
    pub fn display_type(self) -> DisplayType {
        match self {
            SqlType::Bit | SqlType::Boolean => DisplayType::Boolean,
            SqlType::Tinyint | SqlType::Smallint | SqlType::Integer | SqlType::Bigint => {
                DisplayType::Int
            }
            SqlType::Float
            | SqlType::Real
            | SqlType::Double
            | SqlType::Numeric
            | SqlType::Decimal => DisplayType::Float,
            SqlType::Char | SqlType::Varchar | SqlType::Longvarchar | SqlType::Clob => {
                DisplayType::String
            }
            SqlType::Date => DisplayType::Date,
            SqlType::Time | SqlType::TimeWithTimezone => DisplayType::Time,
            SqlType::Timestamp | SqlType::TimestampWithTimezone => DisplayType::Datetime,
            SqlType::Binary | SqlType::Varbinary | SqlType::Longvarbinary | SqlType::Blob => {
                DisplayType::Blob
            }
            SqlType::Array => DisplayType::Array,
            SqlType::Struct => DisplayType::Struct,
            SqlType::Other => DisplayType::Unknown,
        }
    }

    /// Wire name of this type (e.g. `"BIGINT"`).
    pub fn as_str(self) -> &'static str {
        match self {
            SqlType::Bit => "BIT",
            SqlType::Tinyint => "TINYINT",
            SqlType::Smallint => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::Bigint => "BIGINT",
            SqlType::Float => "FLOAT",
            SqlType::Real => "REAL",
            SqlType::Double => "DOUBLE",
            SqlType::Numeric => "NUMERIC",
            SqlType::Decimal => "DECIMAL",
            SqlType::Char => "CHAR",
            SqlType::Varchar => "VARCHAR",
            SqlType::Longvarchar => "LONGVARCHAR",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::TimeWithTimezone => "TIME_WITH_TIMEZONE",
            SqlType::TimestampWithTimezone => "TIMESTAMP_WITH_TIMEZONE",
            SqlType::Binary => "BINARY",
            SqlType::Varbinary => "VARBINARY",
            SqlType::Longvarbinary => "LONGVARBINARY",
            SqlType::Blob => "BLOB",
            SqlType::Clob => "CLOB",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Array => "ARRAY",
            SqlType::Struct => "STRUCT",
            SqlType::Other => "OTHER",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse rendering type derived from [`SqlType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayType {
    String,
    Int,
    Float,
    Boolean,
    Date,
    Datetime,
    Time,
    Blob,
    Struct,
    Array,
    Unknown,
}

/// A named column with its generic type, as produced by introspection and
/// consumed by the import pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeField {
    pub name: String,
    pub sql_type: SqlType,
}

impl TypeField {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

/// Field metadata as exposed to callers: name plus both type views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub name: String,
    pub display_type: DisplayType,
    pub sql_type: SqlType,
}

impl From<&TypeField> for SchemaField {
    fn from(field: &TypeField) -> Self {
        Self {
            name: field.name.clone(),
            display_type: field.sql_type.display_type(),
            sql_type: field.sql_type,
        }
    }
}

/// A table-like object inside a database, optionally namespaced by a schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub collection: String,
}

impl CollectionRef {
    pub fn new(schema: Option<String>, collection: impl Into<String>) -> Self {
        Self {
            schema,
            collection: collection.into(),
        }
    }

    /// `schema.collection`, or just `collection` when there is no schema.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.collection),
            None => self.collection.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_type_mapping() {
        assert_eq!(SqlType::Integer.display_type(), DisplayType::Int);
        assert_eq!(SqlType::Bigint.display_type(), DisplayType::Int);
        assert_eq!(SqlType::Numeric.display_type(), DisplayType::Float);
        assert_eq!(SqlType::Varchar.display_type(), DisplayType::String);
        assert_eq!(SqlType::Bit.display_type(), DisplayType::Boolean);
        assert_eq!(SqlType::Date.display_type(), DisplayType::Date);
        assert_eq!(
            SqlType::TimestampWithTimezone.display_type(),
            DisplayType::Datetime
        );
        assert_eq!(SqlType::Varbinary.display_type(), DisplayType::Blob);
        assert_eq!(SqlType::Other.display_type(), DisplayType::Unknown);
    }

    #[test]
    fn serde_names_match_as_str() {
        for ty in [
            SqlType::Tinyint,
            SqlType::Longvarchar,
            SqlType::TimestampWithTimezone,
            SqlType::Other,
        ] {
            let json = serde_json::to_string(&ty).unwrap();
            assert_eq!(json, format!("\"{}\"", ty.as_str()));
        }
    }

    #[test]
    fn schema_field_serializes_in_envelope_order() {
        let field = SchemaField::from(&TypeField::new("amount", SqlType::Double));
        let json = serde_json::to_string(&field).unwrap();
        assert_eq!(
            json,
            r#"{"name":"amount","displayType":"FLOAT","sqlType":"DOUBLE"}"#
        );
    }

    #[test]
    fn qualified_collection_name() {
        assert_eq!(
            CollectionRef::new(Some("public".into()), "orders").qualified_name(),
            "public.orders"
        );
        assert_eq!(CollectionRef::new(None, "orders").qualified_name(), "orders");
    }
}
