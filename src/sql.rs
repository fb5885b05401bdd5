use std::hash::BuildHasherDefault;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHasher;
use smallvec::SmallVec;
use sqlparser::ast::{ColumnDef, ColumnOption, ObjectName, Statement, TableConstraint};
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, SQLiteDialect};
use sqlparser::parser::{Parser, ParserError};
use thiserror::Error;
use tracing::{debug, warn};

/// Separator drizzle-kit places between statements of one migration.
pub const STATEMENT_BREAKPOINT: &str = "--> statement-breakpoint";

static CREATE_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*CREATE\s+TABLE\b").expect("valid regex"));

static DEFAULT_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"DEFAULT\s+(?:'([^']*)'|(\S+))").expect("valid regex"));

static TABLE_BODY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?[`"]?(\w+)[`"]?\s*\((.*)\)"#)
        .expect("valid regex")
});

static FOREIGN_KEY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)FOREIGN\s+KEY\s*\(\s*[`"]?(\w+)[`"]?\s*\)\s*REFERENCES\s+[`"]?(\w+)[`"]?\s*\(\s*[`"]?(\w+)[`"]?\s*\)"#,
    )
    .expect("valid regex")
});

static COLUMN_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[`"](\w+)[`"]\s+(\S+)\s*(.*)$"#).expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Type exactly as written, e.g. `varchar(255)`.
    pub sql_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

pub type ColumnList = SmallVec<[Column; 16]>;

#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub columns: ColumnList,
    pub foreign_keys: Vec<ForeignKeyRef>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }
}

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Every table declared by one migration, in declaration order.
#[derive(Debug, Default)]
pub struct Schema {
    tables: FxIndexMap<String, Table>,
}

impl Schema {
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Tables holding a foreign key into `name`, paired with that key.
    pub fn referencing(&self, name: &str) -> Vec<(&Table, &ForeignKeyRef)> {
        self.tables
            .values()
            .flat_map(|table| {
                table
                    .foreign_keys
                    .iter()
                    .filter(move |fk| fk.referenced_table == name)
                    .map(move |fk| (table, fk))
            })
            .collect()
    }
}

#[derive(Error, Debug)]
pub enum SqlError {
    #[error("in statement number {index}: {inner}")]
    Statement { index: usize, inner: ParserError },

    #[error("table name doesn't have elements")]
    EmptyName,
}

/// Parses every `CREATE TABLE` block of a migration. Blocks that are not
/// table definitions are skipped, and so are table definitions with no
/// readable body (with a warning); neither aborts the whole migration.
pub fn parse_migration(sql: &str) -> Schema {
    let mut schema = Schema::default();
    for (i, block) in sql.split(STATEMENT_BREAKPOINT).enumerate() {
        if !CREATE_TABLE.is_match(strip_leading_comments(block)) {
            debug!("skipping statement {}: not a CREATE TABLE", i + 1);
            continue;
        }

        match parse_block(i + 1, block) {
            Ok(tables) => {
                for table in tables {
                    debug!("parsed table `{}` ({} columns)", table.name, table.columns.len());
                    schema.tables.insert(table.name.clone(), table);
                }
            }
            Err(err) => warn!("⚠️  skipping unparseable table definition: {}", err),
        }
    }

    schema
}

fn strip_leading_comments(block: &str) -> &str {
    let mut rest = block.trim_start();
    while rest.starts_with("--") {
        rest = match rest.find('\n') {
            Some(end) => rest[end + 1..].trim_start(),
            None => "",
        };
    }
    rest
}

/// Tries the SQLite grammar first, then MySQL and generic SQL. A table none of
/// them accept is read line by line; only a block without a recognizable
/// table body is an error.
fn parse_block(index: usize, block: &str) -> Result<Vec<Table>, SqlError> {
    let inner = match Parser::parse_sql(&SQLiteDialect {}, block) {
        Ok(ast) => return tables_from_statements(&ast),
        Err(inner) => inner,
    };

    let fallbacks: [&dyn Dialect; 2] = [&MySqlDialect {}, &GenericDialect {}];
    for dialect in fallbacks {
        if let Ok(ast) = Parser::parse_sql(dialect, block) {
            debug!("statement {} parsed with {:?}", index, dialect);
            return tables_from_statements(&ast);
        }
    }

    match table_from_lines(block) {
        Some(table) => {
            debug!("statement {} read line by line after: {}", index, inner);
            Ok(vec![table])
        }
        None => Err(SqlError::Statement { index, inner }),
    }
}

fn tables_from_statements(ast: &[Statement]) -> Result<Vec<Table>, SqlError> {
    let mut tables = Vec::new();
    for statement in ast {
        if let Statement::CreateTable {
            name,
            columns,
            constraints,
            ..
        } = statement
        {
            tables.push(table_from_definition(name, columns, constraints)?);
        }
    }

    Ok(tables)
}

fn object_name(name: &ObjectName) -> Result<String, SqlError> {
    Ok(name.0.last().ok_or(SqlError::EmptyName)?.value.clone())
}

fn table_from_definition(
    name: &ObjectName,
    columns: &[ColumnDef],
    constraints: &[TableConstraint],
) -> Result<Table, SqlError> {
    let mut table = Table {
        name: object_name(name)?,
        columns: ColumnList::new(),
        foreign_keys: Vec::new(),
    };

    for column in columns {
        table.columns.push(column_from_definition(column));
        for option in &column.options {
            if let ColumnOption::ForeignKey {
                foreign_table,
                referred_columns,
                ..
            } = &option.option
            {
                table.foreign_keys.push(ForeignKeyRef {
                    column: column.name.value.clone(),
                    referenced_table: object_name(foreign_table)?,
                    referenced_column: referred_columns
                        .first()
                        .map(|ident| ident.value.clone())
                        .unwrap_or_else(|| String::from("id")),
                });
            }
        }
    }

    for constraint in constraints {
        match constraint {
            TableConstraint::ForeignKey {
                columns,
                foreign_table,
                referred_columns,
                ..
            } => {
                let referenced_table = object_name(foreign_table)?;
                for (i, column) in columns.iter().enumerate() {
                    let referenced_column = referred_columns
                        .get(i)
                        .or_else(|| referred_columns.first())
                        .map(|ident| ident.value.clone())
                        .unwrap_or_else(|| String::from("id"));
                    table.foreign_keys.push(ForeignKeyRef {
                        column: column.value.clone(),
                        referenced_table: referenced_table.clone(),
                        referenced_column,
                    });
                }
            }
            TableConstraint::Unique {
                columns,
                is_primary: true,
                ..
            } => {
                for key in columns {
                    if let Some(column) = table.columns.iter_mut().find(|c| c.name == key.value) {
                        column.primary_key = true;
                        column.nullable = false;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(table)
}

fn column_from_definition(column: &ColumnDef) -> Column {
    // Everything after the type, as text. Inspected by substring rather than by
    // option kind, so `PRIMARY KEY` anywhere in the tail marks the key.
    let tail = column
        .options
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");

    column_from_tail(&column.name.value, column.data_type.to_string(), &tail)
}

fn column_from_tail(name: &str, sql_type: String, tail: &str) -> Column {
    let primary_key = tail.contains("PRIMARY KEY");
    let not_null = primary_key || tail.contains("NOT NULL");
    let default_value = DEFAULT_VALUE.captures(tail).and_then(|captures| {
        captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|value| value.as_str().to_string())
    });

    Column {
        name: name.to_string(),
        sql_type,
        nullable: !not_null,
        primary_key,
        default_value,
    }
}

/// Reads a table one body line at a time: `FOREIGN KEY` lines and
/// `` `name` type tail `` column lines. Anything else in the body is ignored.
fn table_from_lines(block: &str) -> Option<Table> {
    let captures = TABLE_BODY.captures(block)?;
    let mut table = Table {
        name: captures[1].to_string(),
        columns: ColumnList::new(),
        foreign_keys: Vec::new(),
    };

    for line in captures[2].lines() {
        let line = line.trim().trim_end_matches(',').trim_end();
        if line.is_empty() {
            continue;
        }

        if line.contains("FOREIGN KEY") {
            if let Some(fk) = FOREIGN_KEY_LINE.captures(line) {
                table.foreign_keys.push(ForeignKeyRef {
                    column: fk[1].to_string(),
                    referenced_table: fk[2].to_string(),
                    referenced_column: fk[3].to_string(),
                });
            }
        } else if let Some(column) = COLUMN_LINE.captures(line) {
            table
                .columns
                .push(column_from_tail(&column[1], column[2].to_string(), &column[3]));
        }
    }

    Some(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIGRATION: &str = r#"CREATE TABLE `organizations` (
	`id` integer PRIMARY KEY NOT NULL,
	`name` text NOT NULL,
	`plan` text DEFAULT 'free'
);
--> statement-breakpoint
CREATE TABLE `charts` (
	`id` integer PRIMARY KEY AUTOINCREMENT NOT NULL,
	`organization_id` integer NOT NULL,
	`title` varchar(255),
	`opacity` real DEFAULT 0.5,
	FOREIGN KEY (`organization_id`) REFERENCES `organizations`(`id`) ON UPDATE no action ON DELETE cascade
);
--> statement-breakpoint
CREATE UNIQUE INDEX `charts_title_unique` ON `charts` (`title`);"#;

    #[test]
    fn parses_tables_in_order() {
        let schema = parse_migration(MIGRATION);
        let names: Vec<_> = schema.tables().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["organizations", "charts"]);
    }

    #[test]
    fn reads_column_constraints() {
        let schema = parse_migration(MIGRATION);
        let organizations = schema.table("organizations").unwrap();

        let id = organizations.column("id").unwrap();
        assert!(id.primary_key);
        assert!(!id.nullable);

        let name = organizations.column("name").unwrap();
        assert!(!name.primary_key);
        assert!(!name.nullable);

        let plan = organizations.column("plan").unwrap();
        assert!(plan.nullable);
        assert_eq!(plan.default_value.as_deref(), Some("free"));

        let charts = schema.table("charts").unwrap();
        assert_eq!(
            charts.column("opacity").unwrap().default_value.as_deref(),
            Some("0.5")
        );
        assert!(charts.column("title").unwrap().sql_type.to_lowercase().contains("varchar"));
    }

    #[test]
    fn primary_key_alone_implies_not_null() {
        let schema = parse_migration("CREATE TABLE `user` (`id` serial PRIMARY KEY, `name` text);");
        let user = schema.table("user").unwrap();
        assert!(!user.column("id").unwrap().nullable);
        assert!(user.column("name").unwrap().nullable);
    }

    #[test]
    fn reads_foreign_keys() {
        let schema = parse_migration(MIGRATION);
        let charts = schema.table("charts").unwrap();
        assert_eq!(
            charts.foreign_keys,
            vec![ForeignKeyRef {
                column: String::from("organization_id"),
                referenced_table: String::from("organizations"),
                referenced_column: String::from("id"),
            }]
        );

        let referencing = schema.referencing("organizations");
        assert_eq!(referencing.len(), 1);
        assert_eq!(referencing[0].0.name, "charts");
    }

    #[test]
    fn inline_references_and_composite_keys() {
        let schema = parse_migration(
            "CREATE TABLE `chart_tags` (
                `chart_id` integer NOT NULL REFERENCES `charts`(`id`),
                `tag` text NOT NULL,
                PRIMARY KEY(`chart_id`, `tag`)
            );",
        );
        let table = schema.table("chart_tags").unwrap();
        assert_eq!(table.foreign_keys[0].referenced_table, "charts");
        assert!(table.columns.iter().all(|c| c.primary_key));
    }

    #[test]
    fn mysql_style_columns() {
        let schema = parse_migration(
            "CREATE TABLE `events` (
                `id` serial AUTO_INCREMENT NOT NULL,
                `updated_at` timestamp DEFAULT (now()) ON UPDATE CURRENT_TIMESTAMP,
                `title` varchar(64) NOT NULL,
                `score` double
            );",
        );
        let events = schema.table("events").unwrap();
        let names: Vec<_> = events.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "updated_at", "title", "score"]);

        let id = events.column("id").unwrap();
        assert!(!id.nullable);
        assert!(id.sql_type.to_lowercase().contains("serial"));
        assert!(events.column("updated_at").unwrap().nullable);
        assert!(!events.column("title").unwrap().nullable);
    }

    #[test]
    fn unparseable_table_is_read_line_by_line() {
        let schema = parse_migration(
            "CREATE TABLE `notes` (
	`id` integer PRIMARY KEY NOT NULL,
	`body` text DEFAULT,
	`kind` text DEFAULT 'plain',
	`owner_id` integer,
	FOREIGN KEY (`owner_id`) REFERENCES `users`(`id`)
);",
        );
        let notes = schema.table("notes").unwrap();
        let names: Vec<_> = notes.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "body", "kind", "owner_id"]);
        assert!(notes.column("id").unwrap().primary_key);
        assert_eq!(notes.column("body").unwrap().default_value, None);
        assert_eq!(
            notes.column("kind").unwrap().default_value.as_deref(),
            Some("plain")
        );
        assert_eq!(
            notes.foreign_keys,
            vec![ForeignKeyRef {
                column: String::from("owner_id"),
                referenced_table: String::from("users"),
                referenced_column: String::from("id"),
            }]
        );
    }

    #[test]
    fn non_table_input_gives_empty_schema() {
        assert!(parse_migration("").is_empty());
        assert!(parse_migration("DROP TABLE `old`;").is_empty());
        assert!(parse_migration("CREATE TABLE `broken` (").is_empty());
    }
}
