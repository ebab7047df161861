//! Declarative model descriptions consumed by the diff engine.
//!
//! A [`ModelDescription`] is the flattened, already-parsed shape of one model:
//! its fields and declared indexes. Shared fields are expressed as
//! [`FieldSet`] fragments and merged into a model by [`ModelBuilder`] before
//! the diff engine ever sees it.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};

/// Name of the primary key inserted when a model declares none.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Semantic type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Unbounded text.
    Text,
    /// Length-bounded text.
    Varchar {
        /// Maximum length in characters.
        max_length: u32,
    },
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Floating point number.
    Float,
    /// Fixed precision decimal.
    Decimal {
        /// Total digits.
        precision: u8,
        /// Digits after the decimal point.
        scale: u8,
    },
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// Date and time with timezone.
    DateTime,
    /// Time of day.
    Time,
    /// JSON document.
    Json,
    /// Raw bytes.
    Bytes,
    /// UUID.
    Uuid,
    /// Enumerated text with a fixed set of choices.
    Enum {
        /// Allowed values.
        choices: Vec<String>,
    },
    /// Reference to another model.
    ForeignKey(Relation),
}

impl FieldType {
    /// Check if this is a relation type.
    pub fn is_relation(&self) -> bool {
        matches!(self, Self::ForeignKey(_))
    }
}

/// What happens to referencing rows when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    /// Delete referencing rows.
    Cascade,
    /// Set the foreign key to null.
    SetNull,
    /// Refuse the delete while references exist.
    Restrict,
    /// Leave referencing rows untouched.
    DoNothing,
}

impl OnDelete {
    /// SQL keyword form.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::Restrict => "RESTRICT",
            Self::DoNothing => "NO ACTION",
        }
    }
}

/// Foreign key target and behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Target model name.
    pub model: String,
    /// Target field name.
    #[serde(default = "default_target_field")]
    pub field: String,
    /// Relation name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Name of the reverse accessor on the target model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_name: Option<String>,
    /// On-delete policy.
    pub on_delete: OnDelete,
}

fn default_target_field() -> String {
    DEFAULT_PRIMARY_KEY.to_string()
}

impl Relation {
    /// Create a relation to the primary key of `model`.
    pub fn new(model: impl Into<String>, on_delete: OnDelete) -> Self {
        Self {
            model: model.into(),
            field: default_target_field(),
            name: None,
            related_name: None,
            on_delete,
        }
    }

    /// Point at a field other than the primary key.
    pub fn to_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    /// Set the relation name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the reverse accessor name.
    pub fn related_name(mut self, name: impl Into<String>) -> Self {
        self.related_name = Some(name.into());
        self
    }
}

/// Default value of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    /// SQL NULL.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// Text literal.
    Text(String),
    /// Database expression, e.g. `now()`.
    Expression(String),
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Description of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescription {
    /// Field name.
    pub name: String,
    /// Semantic type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether NULL is allowed.
    #[serde(default, skip_serializing_if = "is_false")]
    pub nullable: bool,
    /// Whether empty values are allowed by validation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub blank: bool,
    /// Whether values must be unique (implies a unique index).
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
    /// Whether the column is indexed.
    #[serde(default, skip_serializing_if = "is_false")]
    pub indexed: bool,
    /// Whether this is the primary key.
    #[serde(default, skip_serializing_if = "is_false")]
    pub primary_key: bool,
    /// Whether values are generated by the engine.
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_increment: bool,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Database column name, when it differs from the field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl FieldDescription {
    /// Create a new field with default attributes.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
            blank: false,
            unique: false,
            indexed: false,
            primary_key: false,
            auto_increment: false,
            default: None,
            column: None,
        }
    }

    /// Create a text field.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    /// Create a varchar field.
    pub fn varchar(name: impl Into<String>, max_length: u32) -> Self {
        Self::new(name, FieldType::Varchar { max_length })
    }

    /// Create an integer field.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    /// Create a boolean field.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    /// Create a date-time field.
    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::DateTime)
    }

    /// Create an enum field.
    pub fn enumeration<I, S>(name: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            FieldType::Enum {
                choices: choices.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// Create a foreign key to the primary key of `target`.
    pub fn foreign_key(name: impl Into<String>, target: impl Into<String>, on_delete: OnDelete) -> Self {
        Self::new(name, FieldType::ForeignKey(Relation::new(target, on_delete)))
    }

    /// Create an auto-incrementing integer primary key.
    pub fn auto_primary_key(name: impl Into<String>) -> Self {
        Self::integer(name).primary_key().auto_increment()
    }

    /// Allow NULL.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Allow blank values.
    pub fn blank(mut self) -> Self {
        self.blank = true;
        self
    }

    /// Require unique values.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Index the column.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Mark as primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark as engine generated.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Set the default value.
    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Override the database column name.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Replace the relation of a foreign key field.
    pub fn relation(mut self, relation: Relation) -> Self {
        self.field_type = FieldType::ForeignKey(relation);
        self
    }

    /// The database column name.
    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }

    /// The relation, if this is a foreign key.
    pub fn as_relation(&self) -> Option<&Relation> {
        match &self.field_type {
            FieldType::ForeignKey(relation) => Some(relation),
            _ => None,
        }
    }

    /// Check if this is a relation field.
    pub fn is_relation(&self) -> bool {
        self.field_type.is_relation()
    }

    /// A copy of this field under another name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        let mut field = self.clone();
        field.name = name.into();
        field
    }

    /// The plain index an `indexed` field carries.
    ///
    /// Unique and primary key columns are already backed by their constraint.
    pub fn implicit_index(&self) -> Option<IndexDescription> {
        (self.indexed && !self.unique && !self.primary_key)
            .then(|| IndexDescription::new([self.name.clone()], false))
    }

    /// Compare everything except the name.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.renamed(other.name.clone()) == *other
    }
}

/// A declared index over one or more fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexDescription {
    /// Indexed fields, in index order.
    pub fields: Vec<String>,
    /// Whether the index enforces uniqueness.
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
}

impl IndexDescription {
    /// Create a new index.
    pub fn new<I, S>(fields: I, unique: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            unique,
        }
    }

    /// Deterministic index name for a model.
    pub fn name_for(&self, model: &str) -> String {
        let suffix = if self.unique { "key" } else { "idx" };
        format!("{}_{}_{}", model.to_lowercase(), self.fields.join("_"), suffix)
    }

    /// Check if the index references a field.
    pub fn references(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

/// Description of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescription {
    /// Model name, unique within an engine.
    pub name: String,
    /// Fields keyed by name. Equality ignores order.
    #[serde(default, with = "field_list")]
    pub fields: IndexMap<String, FieldDescription>,
    /// Declared indexes.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub indexes: BTreeSet<IndexDescription>,
}

impl ModelDescription {
    /// Create a model from its fields without normalization.
    pub fn new(name: impl Into<String>, fields: impl IntoIterator<Item = FieldDescription>) -> Self {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(|f| (f.name.clone(), f)).collect(),
            indexes: BTreeSet::new(),
        }
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescription> {
        self.fields.get(name)
    }

    /// The primary key field, if any.
    pub fn primary_key(&self) -> Option<&FieldDescription> {
        self.fields.values().find(|f| f.primary_key)
    }

    /// Iterate over foreign key fields and their relations.
    pub fn relations(&self) -> impl Iterator<Item = (&FieldDescription, &Relation)> {
        self.fields
            .values()
            .filter_map(|f| f.as_relation().map(|r| (f, r)))
    }

    /// Models referenced by this model's foreign keys, excluding itself.
    pub fn referenced_models(&self) -> BTreeSet<&str> {
        self.relations()
            .map(|(_, r)| r.model.as_str())
            .filter(|target| *target != self.name)
            .collect()
    }

    /// Declared indexes plus the implicit index of every indexed field.
    pub fn effective_indexes(&self) -> BTreeSet<IndexDescription> {
        let mut indexes = self.indexes.clone();
        indexes.extend(self.fields.values().filter_map(FieldDescription::implicit_index));
        indexes
    }

    /// Normalize and validate a description.
    ///
    /// Inserts the default primary key when none is declared and folds
    /// single-field unique indexes into the field's `unique` flag.
    pub fn finalize(mut self) -> MigrateResult<Self> {
        if self.primary_key().is_none() {
            if self.fields.contains_key(DEFAULT_PRIMARY_KEY) {
                return Err(MigrationError::invalid_model(format!(
                    "model '{}' declares a non-key field '{}' and no primary key",
                    self.name, DEFAULT_PRIMARY_KEY
                )));
            }
            let mut fields = IndexMap::with_capacity(self.fields.len() + 1);
            fields.insert(
                DEFAULT_PRIMARY_KEY.to_string(),
                FieldDescription::auto_primary_key(DEFAULT_PRIMARY_KEY),
            );
            fields.extend(self.fields);
            self.fields = fields;
        }

        let folded: Vec<IndexDescription> = self
            .indexes
            .iter()
            .filter(|idx| idx.unique && idx.fields.len() == 1)
            .cloned()
            .collect();
        for index in folded {
            if let Some(field) = self.fields.get_mut(&index.fields[0]) {
                field.unique = true;
                self.indexes.remove(&index);
            }
        }

        self.validate()?;
        Ok(self)
    }

    /// Check the invariants of a description.
    pub fn validate(&self) -> MigrateResult<()> {
        for (key, field) in &self.fields {
            if *key != field.name {
                return Err(MigrationError::invalid_model(format!(
                    "model '{}' stores field '{}' under key '{}'",
                    self.name, field.name, key
                )));
            }
        }

        let primary_keys = self.fields.values().filter(|f| f.primary_key).count();
        if primary_keys > 1 {
            return Err(MigrationError::invalid_model(format!(
                "model '{}' declares {} primary keys",
                self.name, primary_keys
            )));
        }

        for field in self.fields.values() {
            match &field.field_type {
                FieldType::Enum { choices } if choices.is_empty() => {
                    return Err(MigrationError::invalid_model(format!(
                        "enum field '{}.{}' has no choices",
                        self.name, field.name
                    )));
                }
                FieldType::ForeignKey(relation)
                    if relation.on_delete == OnDelete::SetNull && !field.nullable =>
                {
                    return Err(MigrationError::invalid_model(format!(
                        "foreign key '{}.{}' uses on_delete = set_null but is not nullable",
                        self.name, field.name
                    )));
                }
                _ => {}
            }
        }

        for index in &self.indexes {
            if index.fields.is_empty() {
                return Err(MigrationError::invalid_model(format!(
                    "model '{}' declares an index without fields",
                    self.name
                )));
            }
            if let Some(missing) = index.fields.iter().find(|f| !self.fields.contains_key(*f)) {
                return Err(MigrationError::invalid_model(format!(
                    "index on '{}' references unknown field '{}'",
                    self.name, missing
                )));
            }
        }

        Ok(())
    }
}

/// A reusable fragment of fields merged into models at build time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    /// Fields in declaration order.
    pub fields: Vec<FieldDescription>,
}

impl FieldSet {
    /// Create an empty fragment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field to the fragment.
    pub fn field(mut self, field: FieldDescription) -> Self {
        self.fields.push(field);
        self
    }
}

/// Builder assembling a [`ModelDescription`] from fields and fragments.
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    name: String,
    fields: IndexMap<String, FieldDescription>,
    indexes: BTreeSet<IndexDescription>,
    duplicates: Vec<String>,
}

impl ModelBuilder {
    /// Start a model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
            indexes: BTreeSet::new(),
            duplicates: Vec::new(),
        }
    }

    /// Add a field.
    pub fn field(mut self, field: FieldDescription) -> Self {
        if self.fields.contains_key(&field.name) {
            self.duplicates.push(field.name.clone());
        } else {
            self.fields.insert(field.name.clone(), field);
        }
        self
    }

    /// Merge every field of a fragment.
    pub fn include(self, fragment: &FieldSet) -> Self {
        fragment
            .fields
            .iter()
            .cloned()
            .fold(self, |builder, field| builder.field(field))
    }

    /// Declare an index.
    pub fn index<I, S>(mut self, fields: I, unique: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.insert(IndexDescription::new(fields, unique));
        self
    }

    /// Build and validate the model.
    pub fn build(self) -> MigrateResult<ModelDescription> {
        if !self.duplicates.is_empty() {
            return Err(MigrationError::invalid_model(format!(
                "model '{}' declares duplicate fields: {}",
                self.name,
                self.duplicates.join(", ")
            )));
        }

        ModelDescription {
            name: self.name,
            fields: self.fields,
            indexes: self.indexes,
        }
        .finalize()
    }
}

/// Serializes the field map as an ordered list of field descriptions.
mod field_list {
    use indexmap::IndexMap;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::FieldDescription;

    pub fn serialize<S>(fields: &IndexMap<String, FieldDescription>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(fields.values())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<IndexMap<String, FieldDescription>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = Vec::<FieldDescription>::deserialize(deserializer)?;
        let mut fields = IndexMap::with_capacity(list.len());
        for field in list {
            if fields.contains_key(&field.name) {
                return Err(D::Error::custom(format!("duplicate field '{}'", field.name)));
            }
            fields.insert(field.name.clone(), field);
        }
        Ok(fields)
    }
}
