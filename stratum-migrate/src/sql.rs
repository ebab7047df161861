//! PostgreSQL DDL rendering.
//!
//! [`PostgresScriptAdapter`] turns actions into PostgreSQL statements and
//! collects them in an [`SqlScript`]. The script can be reviewed, written to
//! a file or piped into `psql`.

use crate::action::Action;
use crate::adapter::EngineAdapter;
use crate::error::{EngineError, EngineErrorKind};
use crate::model::{DefaultValue, FieldDescription, FieldType, IndexDescription, ModelDescription};
use crate::state::SchemaState;

/// A buffered DDL script.
///
/// Statements issued inside a transaction are held back until commit and
/// discarded on rollback.
#[derive(Debug, Default, Clone)]
pub struct SqlScript {
    statements: Vec<String>,
    transaction: Option<Vec<String>>,
}

impl SqlScript {
    /// Create an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed statements.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Check if nothing has been committed.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// The committed script as one string.
    pub fn to_sql(&self) -> String {
        let mut sql = self.statements.join("\n");
        if !sql.is_empty() {
            sql.push('\n');
        }
        sql
    }

    /// Take the committed statements, leaving the script empty.
    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.statements)
    }

    fn push(&mut self, statement: String) {
        match &mut self.transaction {
            Some(buffer) => buffer.push(statement),
            None => self.statements.push(statement),
        }
    }
}

/// Engine adapter rendering PostgreSQL DDL into an [`SqlScript`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresScriptAdapter;

impl PostgresScriptAdapter {
    /// Create a new adapter.
    pub fn new() -> Self {
        Self
    }

    /// Render the statements for one action against the schema it applies to.
    fn render(&self, action: &Action, schema: &SchemaState) -> Result<Vec<String>, EngineError> {
        let stmts = match action {
            Action::CreateModel { name, fields } => {
                let created = ModelDescription::new(name.clone(), fields.iter().cloned());
                let mut columns = Vec::with_capacity(fields.len() + 1);
                for field in fields {
                    columns.push(self.column_definition(field, schema, Some(&created))?);
                }
                if let Some(pk) = fields.iter().find(|f| f.primary_key) {
                    columns.push(format!("PRIMARY KEY ({})", quote(pk.column_name())));
                }
                let mut stmts = vec![format!(
                    "CREATE TABLE {} (\n    {}\n);",
                    quote(name),
                    columns.join(",\n    ")
                )];
                for index in created.effective_indexes() {
                    stmts.push(create_index(name, &index, &columns_of(&created, &index)));
                }
                stmts
            }
            Action::DeleteModel { name } => vec![format!("DROP TABLE {};", quote(name))],
            Action::AddField { model, field } => {
                if field.primary_key {
                    return Err(EngineError::unsupported(format!(
                        "adding primary key column '{}.{}'",
                        model, field.name
                    )));
                }
                let mut stmts = vec![format!(
                    "ALTER TABLE {} ADD COLUMN {};",
                    quote(model),
                    self.column_definition(field, schema, None)?
                )];
                if let Some(index) = field.implicit_index() {
                    stmts.push(create_index(model, &index, &[field.column_name()]));
                }
                stmts
            }
            Action::RemoveField { model, field } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {};",
                quote(model),
                quote(field.column_name())
            )],
            Action::ChangeField {
                model, from, to, ..
            } => self.alter_column(model, from, to, schema)?,
            Action::RenameField { model, from, to } => {
                let current = existing_model(schema, model)?;
                let field = current.field(from).ok_or_else(|| {
                    EngineError::constraint(format!("field '{}.{}' does not exist", model, from))
                })?;
                rename_field(current, field, to)
            }
            Action::AddIndex { model, index } => {
                let current = existing_model(schema, model)?;
                vec![create_index(model, index, &columns_of(current, index))]
            }
            Action::RemoveIndex { model, index } => {
                vec![format!("DROP INDEX {};", quote(&index.name_for(model)))]
            }
            Action::RunDataOperation { name, payload } => {
                let payload = payload.trim();
                if payload.is_empty() {
                    return Err(EngineError::unsupported(format!(
                        "data operation '{}' has an empty payload",
                        name
                    )));
                }
                let mut stmt = format!("-- data operation: {}\n{}", name, payload);
                if !stmt.ends_with(';') {
                    stmt.push(';');
                }
                vec![stmt]
            }
        };
        Ok(stmts)
    }

    /// Generate column definition.
    ///
    /// `creating` is the model of a `CREATE TABLE` in progress, which a
    /// self-referencing foreign key resolves against.
    fn column_definition(
        &self,
        field: &FieldDescription,
        schema: &SchemaState,
        creating: Option<&ModelDescription>,
    ) -> Result<String, EngineError> {
        let sql_type = match (&field.field_type, field.auto_increment) {
            (FieldType::Integer, true) => "SERIAL".to_string(),
            (FieldType::BigInt, true) => "BIGSERIAL".to_string(),
            _ => self.column_type(field, schema, creating)?,
        };
        let mut parts = vec![quote(field.column_name()), sql_type];

        if !field.nullable && !field.primary_key {
            parts.push("NOT NULL".to_string());
        }

        if field.unique && !field.primary_key {
            parts.push("UNIQUE".to_string());
        }

        if let Some(default) = &field.default {
            parts.push(format!("DEFAULT {}", render_default(default)));
        }

        if let FieldType::Enum { choices } = &field.field_type {
            parts.push(check_choices(field.column_name(), choices));
        }

        if let Some(relation) = field.as_relation() {
            let target = referenced_field(field, schema, creating)?;
            parts.push(format!(
                "REFERENCES {} ({}) ON DELETE {}",
                quote(&relation.model),
                quote(target.column_name()),
                relation.on_delete.as_sql()
            ));
        }

        Ok(parts.join(" "))
    }

    /// Column type of a field. Foreign keys take the type of the field they
    /// reference.
    fn column_type(
        &self,
        field: &FieldDescription,
        schema: &SchemaState,
        creating: Option<&ModelDescription>,
    ) -> Result<String, EngineError> {
        if !field.is_relation() {
            return Ok(self.render_column_type(field));
        }
        let target = referenced_field(field, schema, creating)?;
        Ok(self.render_column_type(target))
    }

    /// Generate ALTER COLUMN statements.
    fn alter_column(
        &self,
        table: &str,
        from: &FieldDescription,
        to: &FieldDescription,
        schema: &SchemaState,
    ) -> Result<Vec<String>, EngineError> {
        if from.primary_key != to.primary_key || from.auto_increment != to.auto_increment {
            return Err(EngineError::unsupported(format!(
                "changing the primary key or generation of '{}.{}'",
                table, to.name
            )));
        }

        let table_sql = quote(table);
        let mut stmts = Vec::new();

        if from.column_name() != to.column_name() {
            stmts.push(format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {};",
                table_sql,
                quote(from.column_name()),
                quote(to.column_name())
            ));
            stmts.extend(rename_constraints(
                table,
                from,
                from.column_name(),
                to.column_name(),
            ));
        }
        let column = quote(to.column_name());

        if from.implicit_index().is_some() && to.implicit_index().is_none() {
            stmts.push(format!(
                "DROP INDEX {};",
                quote(&IndexDescription::new([to.name.clone()], false).name_for(table))
            ));
        }

        if from.field_type != to.field_type {
            if from.is_relation() {
                stmts.push(format!(
                    "ALTER TABLE {} DROP CONSTRAINT {};",
                    table_sql,
                    quote(&constraint_name(table, to.column_name(), "fkey"))
                ));
            }
            if let FieldType::Enum { .. } = from.field_type {
                stmts.push(format!(
                    "ALTER TABLE {} DROP CONSTRAINT {};",
                    table_sql,
                    quote(&constraint_name(table, to.column_name(), "check"))
                ));
            }

            let new_type = self.column_type(to, schema, None)?;
            if self.column_type(from, schema, None)? != new_type {
                stmts.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{};",
                    table_sql, column, new_type, column, new_type
                ));
            }

            if let Some(relation) = to.as_relation() {
                let target = referenced_field(to, schema, None)?;
                stmts.push(format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {};",
                    table_sql,
                    quote(&constraint_name(table, to.column_name(), "fkey")),
                    column,
                    quote(&relation.model),
                    quote(target.column_name()),
                    relation.on_delete.as_sql()
                ));
            }
            if let FieldType::Enum { choices } = &to.field_type {
                stmts.push(format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} {};",
                    table_sql,
                    quote(&constraint_name(table, to.column_name(), "check")),
                    check_choices(to.column_name(), choices)
                ));
            }
        }

        if from.nullable != to.nullable {
            let change = if to.nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
            stmts.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} {};",
                table_sql, column, change
            ));
        }

        if from.default != to.default {
            match &to.default {
                Some(default) => stmts.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {};",
                    table_sql,
                    column,
                    render_default(default)
                )),
                None => stmts.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT;",
                    table_sql, column
                )),
            }
        }

        if from.unique != to.unique {
            let constraint = quote(&constraint_name(table, to.column_name(), "key"));
            if to.unique {
                stmts.push(format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({});",
                    table_sql, constraint, column
                ));
            } else {
                stmts.push(format!(
                    "ALTER TABLE {} DROP CONSTRAINT {};",
                    table_sql, constraint
                ));
            }
        }

        if let (None, Some(index)) = (from.implicit_index(), to.implicit_index()) {
            stmts.push(create_index(table, &index, &[to.column_name()]));
        }

        Ok(stmts)
    }
}

#[async_trait::async_trait]
impl EngineAdapter for PostgresScriptAdapter {
    type Connection = SqlScript;

    async fn apply_action(
        &self,
        action: &Action,
        schema: &SchemaState,
        conn: &mut SqlScript,
    ) -> Result<(), EngineError> {
        for stmt in self.render(action, schema)? {
            conn.push(stmt);
        }
        Ok(())
    }

    fn render_column_type(&self, field: &FieldDescription) -> String {
        match &field.field_type {
            FieldType::Text => "TEXT".to_string(),
            FieldType::Varchar { max_length } => format!("VARCHAR({})", max_length),
            FieldType::Integer => "INTEGER".to_string(),
            FieldType::BigInt => "BIGINT".to_string(),
            FieldType::Float => "DOUBLE PRECISION".to_string(),
            FieldType::Decimal { precision, scale } => format!("NUMERIC({}, {})", precision, scale),
            FieldType::Boolean => "BOOLEAN".to_string(),
            FieldType::Date => "DATE".to_string(),
            FieldType::DateTime => "TIMESTAMP WITH TIME ZONE".to_string(),
            FieldType::Time => "TIME".to_string(),
            FieldType::Json => "JSONB".to_string(),
            FieldType::Bytes => "BYTEA".to_string(),
            FieldType::Uuid => "UUID".to_string(),
            FieldType::Enum { .. } => "TEXT".to_string(),
            // Referenced key type when the target is not known.
            FieldType::ForeignKey(_) => "INTEGER".to_string(),
        }
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    async fn begin(&self, conn: &mut SqlScript) -> Result<(), EngineError> {
        if conn.transaction.is_some() {
            return Err(EngineError::new(
                EngineErrorKind::Other,
                "transaction already open",
            ));
        }
        conn.transaction = Some(Vec::new());
        Ok(())
    }

    async fn commit(&self, conn: &mut SqlScript) -> Result<(), EngineError> {
        let buffer = conn.transaction.take().ok_or_else(|| {
            EngineError::new(EngineErrorKind::Other, "no open transaction")
        })?;
        if !buffer.is_empty() {
            conn.statements.push("BEGIN;".to_string());
            conn.statements.extend(buffer);
            conn.statements.push("COMMIT;".to_string());
        }
        Ok(())
    }

    async fn rollback(&self, conn: &mut SqlScript) -> Result<(), EngineError> {
        conn.transaction = None;
        Ok(())
    }
}

/// Generate CREATE INDEX statement.
fn create_index(model: &str, index: &IndexDescription, columns: &[&str]) -> String {
    let unique = if index.unique { "UNIQUE " } else { "" };
    let cols: Vec<String> = columns.iter().map(|c| quote(c)).collect();
    format!(
        "CREATE {}INDEX {} ON {} ({});",
        unique,
        quote(&index.name_for(model)),
        quote(model),
        cols.join(", ")
    )
}

/// Column names of an index's fields.
fn columns_of<'a>(model: &'a ModelDescription, index: &'a IndexDescription) -> Vec<&'a str> {
    index
        .fields
        .iter()
        .map(|f| model.field(f).map_or(f.as_str(), |d| d.column_name()))
        .collect()
}

fn existing_model<'a>(schema: &'a SchemaState, name: &str) -> Result<&'a ModelDescription, EngineError> {
    schema
        .model(name)
        .ok_or_else(|| EngineError::constraint(format!("table '{}' does not exist", name)))
}

/// The field a foreign key points at.
fn referenced_field<'a>(
    field: &FieldDescription,
    schema: &'a SchemaState,
    creating: Option<&'a ModelDescription>,
) -> Result<&'a FieldDescription, EngineError> {
    let Some(relation) = field.as_relation() else {
        return Err(EngineError::constraint(format!(
            "field '{}' is not a foreign key",
            field.name
        )));
    };
    creating
        .filter(|m| m.name == relation.model)
        .or_else(|| schema.model(&relation.model))
        .and_then(|m| m.field(&relation.field))
        .ok_or_else(|| {
            EngineError::constraint(format!(
                "foreign key '{}' references unknown column '{}.{}'",
                field.name, relation.model, relation.field
            ))
        })
}

/// PostgreSQL's default name for a column constraint.
fn constraint_name(table: &str, column: &str, suffix: &str) -> String {
    format!("{}_{}_{}", table, column, suffix)
}

/// Rename the constraints PostgreSQL named after a column.
fn rename_constraints(table: &str, field: &FieldDescription, from: &str, to: &str) -> Vec<String> {
    let mut suffixes = Vec::new();
    if field.unique && !field.primary_key {
        suffixes.push("key");
    }
    if field.is_relation() {
        suffixes.push("fkey");
    }
    if let FieldType::Enum { .. } = field.field_type {
        suffixes.push("check");
    }
    suffixes
        .into_iter()
        .map(|suffix| {
            format!(
                "ALTER TABLE {} RENAME CONSTRAINT {} TO {};",
                quote(table),
                quote(&constraint_name(table, from, suffix)),
                quote(&constraint_name(table, to, suffix))
            )
        })
        .collect()
}

/// Statements renaming a field's column and every index named after it.
fn rename_field(model: &ModelDescription, field: &FieldDescription, to: &str) -> Vec<String> {
    let table = model.name.as_str();
    let renamed = field.renamed(to);
    let mut stmts = Vec::new();

    if field.column_name() != renamed.column_name() {
        stmts.push(format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {};",
            quote(table),
            quote(field.column_name()),
            quote(renamed.column_name())
        ));
        stmts.extend(rename_constraints(
            table,
            field,
            field.column_name(),
            renamed.column_name(),
        ));
    }

    for index in model.effective_indexes() {
        if !index.references(&field.name) {
            continue;
        }
        let moved = IndexDescription {
            fields: index
                .fields
                .iter()
                .map(|f| if *f == field.name { to.to_string() } else { f.clone() })
                .collect(),
            unique: index.unique,
        };
        stmts.push(format!(
            "ALTER INDEX {} RENAME TO {};",
            quote(&index.name_for(table)),
            quote(&moved.name_for(table))
        ));
    }

    stmts
}

fn check_choices(column: &str, choices: &[String]) -> String {
    let values: Vec<String> = choices.iter().map(|c| literal(c)).collect();
    format!("CHECK ({} IN ({}))", quote(column), values.join(", "))
}

fn render_default(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Null => "NULL".to_string(),
        DefaultValue::Bool(true) => "TRUE".to_string(),
        DefaultValue::Bool(false) => "FALSE".to_string(),
        DefaultValue::Int(value) => value.to_string(),
        DefaultValue::Float(value) => value.to_string(),
        DefaultValue::Text(value) => literal(value),
        DefaultValue::Expression(expr) => expr.clone(),
    }
}

/// Quote an identifier.
fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal.
fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
