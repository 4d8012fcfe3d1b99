//! Extracted facility records.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed set of record columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    AddressLine1,
    AddressLine2,
    City,
    Region,
    PostalCode,
    Phone,
    Website,
    GradesServed,
    ParentOrganization,
}

impl Field {
    /// Every field, in default column order.
    pub const ALL: [Field; 10] = [
        Field::Name,
        Field::AddressLine1,
        Field::AddressLine2,
        Field::City,
        Field::Region,
        Field::PostalCode,
        Field::Phone,
        Field::Website,
        Field::GradesServed,
        Field::ParentOrganization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::AddressLine1 => "address_line1",
            Field::AddressLine2 => "address_line2",
            Field::City => "city",
            Field::Region => "region",
            Field::PostalCode => "postal_code",
            Field::Phone => "phone",
            Field::Website => "website",
            Field::GradesServed => "grades_served",
            Field::ParentOrganization => "parent_organization",
        }
    }

    /// Parse a column name, accepting the legacy export headers too
    /// (`company`, `address1`, `state`, `zip`, `district`, ...).
    pub fn from_name(s: &str) -> Option<Self> {
        let field = match s.trim().to_ascii_lowercase().as_str() {
            "name" | "company" => Field::Name,
            "address_line1" | "address1" | "street" => Field::AddressLine1,
            "address_line2" | "address2" => Field::AddressLine2,
            "city" => Field::City,
            "region" | "state" => Field::Region,
            "postal_code" | "zip" | "zip_code" => Field::PostalCode,
            "phone" => Field::Phone,
            "website" => Field::Website,
            "grades_served" | "grades" => Field::GradesServed,
            "parent_organization" | "district" => Field::ParentOrganization,
            _ => return None,
        };
        Some(field)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted entity.
///
/// Only `name` is required; every other field is absent until a strategy
/// fills it. Values are stored trimmed, and empty strings are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    values: BTreeMap<Field, String>,
}

impl Record {
    /// Create a record with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        let mut record = Self::default();
        record.set(Field::Name, name);
        record
    }

    pub fn name(&self) -> &str {
        self.get(Field::Name).unwrap_or("")
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    /// Value for `field`, or the empty string when absent.
    pub fn value_or_empty(&self, field: Field) -> &str {
        self.get(field).unwrap_or("")
    }

    pub fn has(&self, field: Field) -> bool {
        self.values.contains_key(&field)
    }

    /// Set a field. Blank values clear the field instead.
    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self.values.remove(&field);
        } else if trimmed.len() == value.len() {
            self.values.insert(field, value);
        } else {
            self.values.insert(field, trimmed.to_string());
        }
    }

    /// Set a field only if it is currently absent.
    pub fn set_if_absent(&mut self, field: Field, value: impl Into<String>) {
        if !self.has(field) {
            self.set(field, value);
        }
    }

    /// True when any postal field has been filled.
    pub fn has_address(&self) -> bool {
        self.has(Field::AddressLine1) || self.has(Field::City)
    }

    /// Row values in the given column order, padding absent fields.
    pub fn row(&self, columns: &[Field]) -> Vec<&str> {
        columns.iter().map(|f| self.value_or_empty(*f)).collect()
    }
}
