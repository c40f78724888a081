//! Entity schema derivation: table metadata and the four canonical SQL
//! templates, computed once per entity type at registration.

use crate::error::SchemaError;
use crate::schema::Field;
use std::sync::Arc;

/// Quote identifier for PostgreSQL (safe: only from declared schemas).
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// One resolved column: the attribute key used by entity instances plus the
/// column name it maps to and its descriptor.
#[derive(Clone, Debug)]
pub struct SchemaField {
    pub key: String,
    pub column: String,
    pub field: Field,
}

/// Derived metadata for one persisted entity type. Templates use the
/// portable `?` placeholder; the data access runtime translates it to the
/// driver's positional marker before execution.
#[derive(Clone, Debug)]
pub struct EntitySchema {
    pub table_name: String,
    pub primary_key: SchemaField,
    /// Non-key fields in declaration order. Insert/update bind values in
    /// exactly this order, then the primary key.
    pub fields: Vec<SchemaField>,
    pub select: String,
    pub insert: String,
    pub update: String,
    pub delete: String,
}

impl EntitySchema {
    /// Look up a field (key or non-key) by attribute key.
    pub fn field(&self, key: &str) -> Option<&SchemaField> {
        if self.primary_key.key == key {
            return Some(&self.primary_key);
        }
        self.fields.iter().find(|f| f.key == key)
    }
}

/// Derive an entity schema from declared fields. Fails when the declaration
/// has zero or more than one primary key; both are startup-time faults.
pub fn derive_schema(
    table_name: &str,
    fields: Vec<(&str, Field)>,
) -> Result<Arc<EntitySchema>, SchemaError> {
    let mut primary_key: Option<SchemaField> = None;
    let mut rest: Vec<SchemaField> = Vec::new();

    for (key, field) in fields {
        let column = field.name.clone().unwrap_or_else(|| key.to_string());
        let sf = SchemaField {
            key: key.to_string(),
            column,
            field,
        };
        if sf.field.primary_key {
            if primary_key.is_some() {
                return Err(SchemaError::DuplicatePrimaryKey {
                    table: table_name.to_string(),
                    field: sf.key,
                });
            }
            primary_key = Some(sf);
        } else {
            rest.push(sf);
        }
    }

    let primary_key = primary_key.ok_or_else(|| SchemaError::MissingPrimaryKey {
        table: table_name.to_string(),
    })?;

    let table = quote_ident(table_name);
    let pk = quote_ident(&primary_key.column);
    let escaped: Vec<String> = rest.iter().map(|f| quote_ident(&f.column)).collect();

    let mut select_cols = vec![pk.clone()];
    select_cols.extend(escaped.iter().cloned());
    // pk is listed first in select but bound last in insert/update
    let select = format!("SELECT {} FROM {}", select_cols.join(", "), table);

    let mut insert_cols = escaped.clone();
    insert_cols.push(pk.clone());
    let placeholders: Vec<&str> = insert_cols.iter().map(|_| "?").collect();
    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        insert_cols.join(", "),
        placeholders.join(", ")
    );

    let sets: Vec<String> = escaped.iter().map(|c| format!("{} = ?", c)).collect();
    let update = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        sets.join(", "),
        pk
    );

    let delete = format!("DELETE FROM {} WHERE {} = ?", table, pk);

    tracing::info!(
        table = %table_name,
        primary_key = %primary_key.key,
        fields = rest.len(),
        "derived entity schema"
    );

    Ok(Arc::new(EntitySchema {
        table_name: table_name.to_string(),
        primary_key,
        fields: rest,
        select,
        insert,
        update,
        delete,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_fields() -> Vec<(&'static str, Field)> {
        vec![
            ("id", Field::string().ddl("varchar(50)").primary()),
            ("email", Field::string().ddl("varchar(50)")),
            ("passwd", Field::string().ddl("varchar(50)")),
            ("admin", Field::boolean()),
            ("name", Field::string().ddl("varchar(50)")),
        ]
    }

    #[test]
    fn derives_templates_in_declaration_order() {
        let schema = derive_schema("users", user_fields()).unwrap();
        assert_eq!(
            schema.select,
            r#"SELECT "id", "email", "passwd", "admin", "name" FROM "users""#
        );
        assert_eq!(
            schema.insert,
            r#"INSERT INTO "users" ("email", "passwd", "admin", "name", "id") VALUES (?, ?, ?, ?, ?)"#
        );
        assert_eq!(
            schema.update,
            r#"UPDATE "users" SET "email" = ?, "passwd" = ?, "admin" = ?, "name" = ? WHERE "id" = ?"#
        );
        assert_eq!(schema.delete, r#"DELETE FROM "users" WHERE "id" = ?"#);
        let keys: Vec<&str> = schema.fields.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, ["email", "passwd", "admin", "name"]);
    }

    #[test]
    fn column_name_override_is_used_in_templates() {
        let schema = derive_schema(
            "blogs",
            vec![
                ("id", Field::string().primary()),
                ("user_name", Field::string().named("author")),
            ],
        )
        .unwrap();
        assert!(schema.update.contains(r#""author" = ?"#));
        assert_eq!(schema.field("user_name").unwrap().column, "author");
    }

    #[test]
    fn missing_primary_key_fails_derivation() {
        let err = derive_schema("users", vec![("email", Field::string())]).unwrap_err();
        assert!(matches!(err, SchemaError::MissingPrimaryKey { .. }));
    }

    #[test]
    fn duplicate_primary_key_fails_derivation() {
        let err = derive_schema(
            "users",
            vec![
                ("id", Field::string().primary()),
                ("email", Field::string().primary()),
            ],
        )
        .unwrap_err();
        match err {
            SchemaError::DuplicatePrimaryKey { field, .. } => assert_eq!(field, "email"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
    }
}
