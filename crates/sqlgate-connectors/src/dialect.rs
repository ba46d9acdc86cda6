//! Backend-specific SQL: identifier quoting, placeholders, type mapping and
//! the DDL/DML the import pipeline runs.

use sqlgate_core::{ImportJob, SqlType};

use crate::error::ConnectorError;

/// Name of the generated primary key column.
pub const ID_COLUMN: &str = "ID";
/// Used instead of [`ID_COLUMN`] when a field already upper-cases to `ID`.
pub const FALLBACK_ID_COLUMN: &str = "SQLGATE_GENERATED_ID";

pub trait Dialect: Send + Sync {
    fn quote_identifier(&self, name: &str) -> String;

    /// Bind placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    /// Column type used when creating a table, `None` if unsupported.
    fn native_type(&self, sql_type: SqlType) -> Option<&'static str>;

    /// Column definition of the auto-increment primary key.
    fn auto_increment_type(&self) -> &'static str;

    /// Upper-cased schema names hidden from introspection.
    fn skipped_schemas(&self) -> &'static [&'static str];

    /// Map a backend type name (driver or information_schema spelling).
    fn sql_type_from_name(&self, name: &str) -> SqlType;

    fn is_skipped_schema(&self, schema: &str) -> bool {
        let upper = schema.to_uppercase();
        self.skipped_schemas().iter().any(|s| *s == upper)
    }

    fn qualified_table(&self, schema: Option<&str>, collection: &str) -> String {
        match schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(collection)
            ),
            None => self.quote_identifier(collection),
        }
    }

    fn create_table_sql(&self, job: &ImportJob) -> Result<String, ConnectorError> {
        let id = id_column(job);
        let mut columns = vec![format!(
            "{} {}",
            self.quote_identifier(id),
            self.auto_increment_type()
        )];
        for field in &job.fields {
            let native = self.native_type(field.sql_type).ok_or_else(|| {
                ConnectorError::UnsupportedType(format!(
                    "cannot create column {} of type {}",
                    field.name, field.sql_type
                ))
            })?;
            columns.push(format!(
                "{} {}",
                self.quote_identifier(&field.name.to_uppercase()),
                native
            ));
        }
        columns.push(format!("PRIMARY KEY ({})", self.quote_identifier(id)));
        Ok(format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.qualified_table(job.schema.as_deref(), &job.collection),
            columns.join(",\n    ")
        ))
    }

    /// One `INSERT` carrying `rows` value tuples; parameters are numbered
    /// row by row.
    fn insert_sql(&self, job: &ImportJob, rows: usize) -> String {
        let names: Vec<String> = job
            .fields
            .iter()
            .map(|f| self.quote_identifier(&f.name.to_uppercase()))
            .collect();
        let width = job.fields.len();
        let tuples: Vec<String> = (0..rows)
            .map(|row| {
                let values: Vec<String> = job
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| self.insert_value(row * width + i + 1, f.sql_type))
                    .collect();
                format!("({})", values.join(", "))
            })
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.qualified_table(job.schema.as_deref(), &job.collection),
            names.join(", "),
            tuples.join(", ")
        )
    }

    /// Value expression for one insert parameter.
    fn insert_value(&self, index: usize, _sql_type: SqlType) -> String {
        self.placeholder(index)
    }
}

/// Generated key column name for `job`.
pub fn id_column(job: &ImportJob) -> &'static str {
    if job.fields.iter().any(|f| f.name.to_uppercase() == ID_COLUMN) {
        FALLBACK_ID_COLUMN
    } else {
        ID_COLUMN
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn native_type(&self, sql_type: SqlType) -> Option<&'static str> {
        Some(match sql_type {
            SqlType::Bit | SqlType::Boolean => "BOOLEAN",
            SqlType::Tinyint | SqlType::Smallint => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::Bigint => "BIGINT",
            SqlType::Real => "REAL",
            SqlType::Float | SqlType::Double => "DOUBLE PRECISION",
            SqlType::Numeric | SqlType::Decimal => "NUMERIC",
            SqlType::Char => "CHAR",
            SqlType::Varchar => "VARCHAR",
            SqlType::Longvarchar | SqlType::Clob => "TEXT",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::TimeWithTimezone => "TIMETZ",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::TimestampWithTimezone => "TIMESTAMPTZ",
            SqlType::Binary | SqlType::Varbinary | SqlType::Longvarbinary | SqlType::Blob => {
                "BYTEA"
            }
            SqlType::Array | SqlType::Struct | SqlType::Other => return None,
        })
    }

    fn auto_increment_type(&self) -> &'static str {
        "SERIAL"
    }

    fn skipped_schemas(&self) -> &'static [&'static str] {
        &["INFORMATION_SCHEMA", "PG_CATALOG", "PG_TOAST"]
    }

    fn sql_type_from_name(&self, name: &str) -> SqlType {
        let lower = name.to_lowercase();
        if lower.ends_with("[]") || lower == "array" {
            return SqlType::Array;
        }
        match lower.as_str() {
            "bool" | "boolean" => SqlType::Boolean,
            "int2" | "smallint" | "smallserial" => SqlType::Smallint,
            "int4" | "integer" | "serial" => SqlType::Integer,
            "int8" | "bigint" | "bigserial" | "oid" => SqlType::Bigint,
            "float4" | "real" => SqlType::Real,
            "float8" | "double precision" => SqlType::Double,
            "numeric" | "decimal" | "money" => SqlType::Numeric,
            "char" | "bpchar" | "character" => SqlType::Char,
            "varchar" | "character varying" => SqlType::Varchar,
            "text" | "name" | "citext" => SqlType::Varchar,
            "date" => SqlType::Date,
            "time" | "time without time zone" => SqlType::Time,
            "timetz" | "time with time zone" => SqlType::TimeWithTimezone,
            "timestamp" | "timestamp without time zone" => SqlType::Timestamp,
            "timestamptz" | "timestamp with time zone" => SqlType::TimestampWithTimezone,
            "bytea" => SqlType::Binary,
            "record" => SqlType::Struct,
            _ => SqlType::Other,
        }
    }

    // Text parameters are cast server-side so one bind type serves every column type.
    fn insert_value(&self, index: usize, sql_type: SqlType) -> String {
        match self.native_type(sql_type) {
            Some(native) => format!("CAST({} AS {})", self.placeholder(index), native),
            None => self.placeholder(index),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn native_type(&self, sql_type: SqlType) -> Option<&'static str> {
        Some(match sql_type {
            SqlType::Bit => "BIT",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Tinyint => "TINYINT",
            SqlType::Smallint => "SMALLINT",
            SqlType::Integer => "INT",
            SqlType::Bigint => "BIGINT",
            SqlType::Real => "FLOAT",
            SqlType::Float | SqlType::Double => "DOUBLE",
            SqlType::Numeric | SqlType::Decimal => "DECIMAL(65, 30)",
            SqlType::Char => "CHAR(255)",
            SqlType::Varchar => "TEXT",
            SqlType::Longvarchar | SqlType::Clob => "LONGTEXT",
            SqlType::Date => "DATE",
            SqlType::Time | SqlType::TimeWithTimezone => "TIME",
            SqlType::Timestamp | SqlType::TimestampWithTimezone => "DATETIME",
            SqlType::Binary | SqlType::Varbinary => "BLOB",
            SqlType::Longvarbinary | SqlType::Blob => "LONGBLOB",
            SqlType::Array | SqlType::Struct | SqlType::Other => return None,
        })
    }

    fn auto_increment_type(&self) -> &'static str {
        "BIGINT NOT NULL AUTO_INCREMENT"
    }

    fn skipped_schemas(&self) -> &'static [&'static str] {
        &["INFORMATION_SCHEMA", "MYSQL", "PERFORMANCE_SCHEMA", "SYS"]
    }

    fn sql_type_from_name(&self, name: &str) -> SqlType {
        let lower = name.to_lowercase();
        let base = lower.trim_end_matches(" unsigned");
        match base {
            "bit" => SqlType::Bit,
            "boolean" | "bool" => SqlType::Boolean,
            "tinyint" => SqlType::Tinyint,
            "smallint" | "year" => SqlType::Smallint,
            "mediumint" | "int" | "integer" => SqlType::Integer,
            "bigint" => SqlType::Bigint,
            "float" => SqlType::Real,
            "double" => SqlType::Double,
            "decimal" | "numeric" => SqlType::Decimal,
            "char" | "enum" | "set" => SqlType::Char,
            "varchar" => SqlType::Varchar,
            "tinytext" | "text" | "mediumtext" | "longtext" | "json" => SqlType::Longvarchar,
            "date" => SqlType::Date,
            "time" => SqlType::Time,
            "datetime" | "timestamp" => SqlType::Timestamp,
            "binary" => SqlType::Binary,
            "varbinary" => SqlType::Varbinary,
            "tinyblob" | "blob" | "mediumblob" | "longblob" => SqlType::Longvarbinary,
            _ => SqlType::Other,
        }
    }
}
