use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};
use tracing::info;

/// Offset added to schema versions before they are written to `user_version`,
/// so a database created by something else is never mistaken for ours.
pub const BASE_DB_VERSION: usize = 70000;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                is_unique: false,
                default_value: None,
                foreign_key: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
        }
    }

    fn from_sql(declared: &str) -> Option<&'static SqlType> {
        match declared {
            "TEXT" => Some(&SqlType::Text),
            "INTEGER" => Some(&SqlType::Integer),
            "REAL" => Some(&SqlType::Real),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    SetNull,
}

impl OnDelete {
    fn as_sql(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
        }
    }
}

pub struct ForeignKey {
    pub foreign_table: &'static str,
    pub foreign_column: &'static str,
    pub on_delete: OnDelete,
}

pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub is_unique: bool,
    pub default_value: Option<&'static str>,
    pub foreign_key: Option<&'static ForeignKey>,
}

impl Column {
    fn definition(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type.as_sql());
        if self.is_primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.non_null {
            sql.push_str(" NOT NULL");
        }
        if self.is_unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default_value) = self.default_value {
            sql.push_str(&format!(" DEFAULT {}", default_value));
        }
        if let Some(fk) = self.foreign_key {
            sql.push_str(&format!(
                " REFERENCES {}({}) ON DELETE {}",
                fk.foreign_table,
                fk.foreign_column,
                fk.on_delete.as_sql()
            ));
        }
        sql
    }
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let mut definitions: Vec<String> = self.columns.iter().map(Column::definition).collect();
        for columns in self.unique_constraints {
            definitions.push(format!("UNIQUE ({})", columns.join(", ")));
        }
        conn.execute(
            &format!("CREATE TABLE {} ({});", self.name, definitions.join(", ")),
            params![],
        )
        .with_context(|| format!("Failed to create table {}", self.name))?;

        for (index_name, column_name) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON {}({});",
                    index_name, self.name, column_name
                ),
                params![],
            )?;
        }
        Ok(())
    }

    fn validate_columns(&self, conn: &Connection) -> Result<()> {
        struct ActualColumn {
            name: String,
            declared_type: String,
            non_null: bool,
            is_primary_key: bool,
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual: Vec<ActualColumn> = stmt
            .query_map(params![], |row| {
                Ok(ActualColumn {
                    name: row.get(1)?,
                    declared_type: row.get(2)?,
                    non_null: row.get::<_, i32>(3)? == 1,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                })
            })?
            .collect::<Result<_, _>>()?;

        if actual.len() != self.columns.len() {
            bail!(
                "Table {} has columns [{}], expected [{}]",
                self.name,
                actual
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                self.columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (found, expected) in actual.iter().zip(self.columns.iter()) {
            if found.name != expected.name {
                bail!(
                    "Table {} column name mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    found.name
                );
            }
            if SqlType::from_sql(&found.declared_type) != Some(expected.sql_type) {
                bail!(
                    "Table {} column {} type mismatch: expected {:?}, got {}",
                    self.name,
                    expected.name,
                    expected.sql_type,
                    found.declared_type
                );
            }
            if found.non_null != expected.non_null || found.is_primary_key != expected.is_primary_key
            {
                bail!(
                    "Table {} column {} constraint mismatch (non-null {}/{}, primary key {}/{})",
                    self.name,
                    expected.name,
                    expected.non_null,
                    found.non_null,
                    expected.is_primary_key,
                    found.is_primary_key
                );
            }
        }
        Ok(())
    }

    fn validate_unique_constraints(&self, conn: &Connection) -> Result<()> {
        if self.unique_constraints.is_empty() {
            return Ok(());
        }

        let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", self.name))?;
        let unique_indices: Vec<String> = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i32>(2)?)))?
            .filter_map(|r| r.ok())
            .filter(|(_, unique)| *unique == 1)
            .map(|(name, _)| name)
            .collect();

        let mut indexed_column_sets = Vec::with_capacity(unique_indices.len());
        for index_name in &unique_indices {
            let mut stmt = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
            let mut columns: Vec<String> = stmt
                .query_map([], |row| row.get::<_, String>(2))?
                .filter_map(|r| r.ok())
                .collect();
            columns.sort();
            indexed_column_sets.push(columns);
        }

        for expected in self.unique_constraints {
            let mut expected_sorted: Vec<&str> = expected.to_vec();
            expected_sorted.sort();
            let present = indexed_column_sets
                .iter()
                .any(|columns| columns.iter().map(String::as_str).eq(expected_sorted.iter().copied()));
            if !present {
                bail!(
                    "Table {} is missing unique constraint on ({})",
                    self.name,
                    expected.join(", ")
                );
            }
        }
        Ok(())
    }

    fn validate_indices(&self, conn: &Connection) -> Result<()> {
        for (index_name, _) in self.indices {
            let exists = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    params![index_name, self.name],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if !exists {
                bail!("Table {} is missing index '{}'", self.name, index_name);
            }
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON;", params![])?;
        for table in self.tables {
            table.create(conn)?;
        }
        conn.pragma_update(None, "user_version", BASE_DB_VERSION + self.version)?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate_columns(conn)?;
            table.validate_indices(conn)?;
            table.validate_unique_constraints(conn)?;
        }
        Ok(())
    }
}

/// Bring `conn` to the last schema in `schemas`: create it on an empty
/// database, run pending migrations on an older one, then validate.
pub fn migrate_if_needed(conn: &mut Connection, schemas: &[VersionedSchema], label: &str) -> Result<()> {
    let latest = schemas
        .last()
        .context("At least one schema version is required")?;

    let table_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |r| r.get(0),
    )?;
    if table_count == 0 {
        info!("Creating {} db schema at version {}", label, latest.version);
        latest.create(conn)?;
        return Ok(());
    }

    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    if db_version < BASE_DB_VERSION as i64 {
        bail!(
            "{} db has user_version {}, it was not created by this program",
            label,
            db_version
        );
    }
    let mut current_version = (db_version - BASE_DB_VERSION as i64) as usize;
    if current_version > latest.version {
        bail!(
            "{} db is at version {}, newer than the supported {}",
            label,
            current_version,
            latest.version
        );
    }

    if current_version < latest.version {
        let tx = conn.transaction()?;
        for schema in schemas.iter().filter(move |s| s.version > current_version) {
            if let Some(migration) = schema.migration {
                info!(
                    "Migrating {} db from version {} to {}",
                    label, current_version, schema.version
                );
                migration(&tx)?;
            }
            current_version = schema.version;
        }
        tx.pragma_update(None, "user_version", BASE_DB_VERSION + current_version)?;
        tx.commit()?;
    }

    conn.execute("PRAGMA foreign_keys = ON;", params![])?;
    latest.validate(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_column;

    const PARENT_TABLE: Table = Table {
        name: "parent",
        columns: &[
            sqlite_column!("id", &SqlType::Text, is_primary_key = true),
            sqlite_column!("name", &SqlType::Text, non_null = true),
        ],
        indices: &[],
        unique_constraints: &[&["name"]],
    };

    const PARENT_FK: ForeignKey = ForeignKey {
        foreign_table: "parent",
        foreign_column: "id",
        on_delete: OnDelete::Cascade,
    };

    const CHILD_V0: Table = Table {
        name: "child",
        columns: &[
            sqlite_column!("id", &SqlType::Text, is_primary_key = true),
            sqlite_column!(
                "parent_id",
                &SqlType::Text,
                non_null = true,
                foreign_key = Some(&PARENT_FK)
            ),
        ],
        indices: &[("idx_child_parent", "parent_id")],
        unique_constraints: &[],
    };

    const CHILD_V1: Table = Table {
        name: "child",
        columns: &[
            sqlite_column!("id", &SqlType::Text, is_primary_key = true),
            sqlite_column!(
                "parent_id",
                &SqlType::Text,
                non_null = true,
                foreign_key = Some(&PARENT_FK)
            ),
            sqlite_column!("weight", &SqlType::Real),
        ],
        indices: &[("idx_child_parent", "parent_id")],
        unique_constraints: &[],
    };

    fn add_weight(conn: &Connection) -> Result<()> {
        conn.execute("ALTER TABLE child ADD COLUMN weight REAL", [])?;
        Ok(())
    }

    const SCHEMAS: &[VersionedSchema] = &[
        VersionedSchema {
            version: 0,
            tables: &[PARENT_TABLE, CHILD_V0],
            migration: None,
        },
        VersionedSchema {
            version: 1,
            tables: &[PARENT_TABLE, CHILD_V1],
            migration: Some(add_weight),
        },
    ];

    fn user_version(conn: &Connection) -> i64 {
        conn.query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn creates_latest_schema_on_empty_db() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate_if_needed(&mut conn, SCHEMAS, "test").unwrap();
        assert_eq!(user_version(&conn), (BASE_DB_VERSION + 1) as i64);
        SCHEMAS[1].validate(&conn).unwrap();
    }

    #[test]
    fn migrates_older_versions() {
        let mut conn = Connection::open_in_memory().unwrap();
        SCHEMAS[0].create(&conn).unwrap();
        assert!(SCHEMAS[1].validate(&conn).is_err());

        migrate_if_needed(&mut conn, SCHEMAS, "test").unwrap();
        assert_eq!(user_version(&conn), (BASE_DB_VERSION + 1) as i64);
        SCHEMAS[1].validate(&conn).unwrap();
    }

    #[test]
    fn refuses_foreign_databases() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE other (x INTEGER)", []).unwrap();
        assert!(migrate_if_needed(&mut conn, SCHEMAS, "test").is_err());
    }

    #[test]
    fn validate_detects_missing_unique_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE parent (id TEXT PRIMARY KEY, name TEXT NOT NULL)", [])
            .unwrap();
        let schema = VersionedSchema {
            version: 0,
            tables: &[PARENT_TABLE],
            migration: None,
        };
        let err = schema.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("unique constraint"), "{}", err);
    }

    #[test]
    fn validate_detects_missing_index() {
        let conn = Connection::open_in_memory().unwrap();
        PARENT_TABLE.create(&conn).unwrap();
        conn.execute(
            "CREATE TABLE child (id TEXT PRIMARY KEY, parent_id TEXT NOT NULL REFERENCES parent(id) ON DELETE CASCADE)",
            [],
        )
        .unwrap();
        let err = SCHEMAS[0].validate(&conn).unwrap_err().to_string();
        assert!(err.contains("idx_child_parent"), "{}", err);
    }

    #[test]
    fn foreign_keys_cascade() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate_if_needed(&mut conn, SCHEMAS, "test").unwrap();
        conn.execute("INSERT INTO parent (id, name) VALUES ('p', 'P')", [])
            .unwrap();
        conn.execute("INSERT INTO child (id, parent_id) VALUES ('c', 'p')", [])
            .unwrap();
        conn.execute("DELETE FROM parent WHERE id = 'p'", []).unwrap();
        let children: i64 = conn
            .query_row("SELECT COUNT(*) FROM child", [], |r| r.get(0))
            .unwrap();
        assert_eq!(children, 0);
    }
}
