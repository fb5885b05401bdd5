use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use tracing::{debug, info};

use crate::naming::{pluralize, to_camel_case, to_pascal_case};
use crate::sql::{self, Column, Schema, Table};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GraphqlScalar {
    String,
    Int,
    Float,
    Boolean,
}

impl GraphqlScalar {
    /// Maps a raw SQL type by substring, first match wins. Dates are strings.
    pub fn from_sql_type(sql_type: &str) -> Self {
        let t = sql_type.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|needle| t.contains(needle));

        if has(&["text", "varchar", "char"]) {
            GraphqlScalar::String
        } else if has(&["int", "serial"]) {
            GraphqlScalar::Int
        } else if has(&["real", "float", "double", "decimal"]) {
            GraphqlScalar::Float
        } else if has(&["boolean", "bool"]) {
            GraphqlScalar::Boolean
        } else {
            // timestamp, datetime, date and anything unknown
            GraphqlScalar::String
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GraphqlScalar::String => "String",
            GraphqlScalar::Int => "Int",
            GraphqlScalar::Float => "Float",
            GraphqlScalar::Boolean => "Boolean",
        }
    }
}

fn field_type(column: &Column) -> String {
    let base = GraphqlScalar::from_sql_type(&column.sql_type).as_str();
    if column.nullable {
        base.to_string()
    } else {
        format!("{base}!")
    }
}

#[derive(Error, Debug)]
pub enum SdlError {
    #[error("no .sql migration found in '{0}'")]
    NoMigration(PathBuf),

    #[error("reading '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("writing '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Converts migration SQL into a GraphQL schema document.
pub fn convert(sql: &str) -> String {
    render(sql).0
}

/// The document for `sql` and the number of tables in it.
fn render(sql: &str) -> (String, usize) {
    let schema = sql::parse_migration(sql);
    (SdlWriter::new(&schema).write(), schema.len())
}

/// Reads `input`, converts it, and writes the document to `output`, creating
/// parent directories as needed. Returns the number of tables emitted.
pub fn generate_sdl(input: &Path, output: &Path) -> Result<usize, SdlError> {
    let sql = std::fs::read_to_string(input).map_err(|source| SdlError::Read {
        path: input.to_path_buf(),
        source,
    })?;

    let (document, tables) = render(&sql);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| SdlError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    std::fs::write(output, document).map_err(|source| SdlError::Write {
        path: output.to_path_buf(),
        source,
    })?;

    info!(
        "✅ wrote {} ({} tables) from {}",
        output.display(),
        tables,
        input.display()
    );
    Ok(tables)
}

/// The most recently modified `.sql` file directly inside `dir`.
pub fn latest_migration(dir: &Path) -> Result<PathBuf, SdlError> {
    let entries = std::fs::read_dir(dir).map_err(|source| SdlError::Read {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "sql") || !path.is_file() {
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        debug!("candidate migration {}", path.display());
        if latest.as_ref().map_or(true, |(time, _)| modified > *time) {
            latest = Some((modified, path));
        }
    }

    latest
        .map(|(_, path)| path)
        .ok_or_else(|| SdlError::NoMigration(dir.to_path_buf()))
}

pub struct SdlWriter<'a> {
    schema: &'a Schema,
    out: String,
}

impl<'a> SdlWriter<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            out: String::new(),
        }
    }

    pub fn write(mut self) -> String {
        self.line("# Generated from SQL migration. Do not edit by hand.");

        let schema = self.schema;
        let tables: Vec<&Table> = schema.tables().collect();
        for table in &tables {
            self.object_type(table);
        }
        for table in &tables {
            self.input_types(table);
        }

        // GraphQL rejects empty object types.
        if !tables.is_empty() {
            self.query_type(&tables);
            self.mutation_type(&tables);
        }

        self.out
    }

    fn line(&mut self, text: &str) {
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn field(&mut self, name: &str, ty: &str) {
        let _ = writeln!(self.out, "  {name}: {ty}");
    }

    fn object_type(&mut self, table: &Table) {
        let _ = writeln!(self.out, "\ntype {} {{", to_pascal_case(&table.name));

        for column in &table.columns {
            self.field(&column.name, &field_type(column));
        }

        for fk in &table.foreign_keys {
            let nullable = table.column(&fk.column).map_or(true, |c| c.nullable);
            let mut ty = to_pascal_case(&fk.referenced_table);
            if !nullable {
                ty.push('!');
            }
            self.field(&to_camel_case(&fk.referenced_table), &ty);
        }

        let schema = self.schema;
        let mut reverse: Vec<String> = Vec::new();
        for (other, _) in schema.referencing(&table.name) {
            let field = pluralize(&to_camel_case(&other.name));
            if other.name == table.name || reverse.contains(&field) {
                continue;
            }
            self.field(&field, &format!("[{}!]!", to_pascal_case(&other.name)));
            reverse.push(field);
        }

        self.line("}");
    }

    fn input_types(&mut self, table: &Table) {
        let name = to_pascal_case(&table.name);

        let _ = writeln!(self.out, "\ninput Create{name}Input {{");
        for column in table.columns.iter().filter(|c| !c.primary_key) {
            self.field(&column.name, GraphqlScalar::from_sql_type(&column.sql_type).as_str());
        }
        self.line("}");

        let _ = writeln!(self.out, "\ninput Update{name}Input {{");
        for column in &table.columns {
            self.field(&column.name, GraphqlScalar::from_sql_type(&column.sql_type).as_str());
        }
        self.line("}");
    }

    fn query_type(&mut self, tables: &[&Table]) {
        self.line("\ntype Query {");
        for table in tables {
            let name = to_pascal_case(&table.name);
            let camel = to_camel_case(&table.name);
            self.field(&format!("{camel}(id: ID!)"), &name);
            self.field(
                &format!("{}(limit: Int, offset: Int)", pluralize(&camel)),
                &format!("[{name}!]!"),
            );
        }
        self.line("}");
    }

    fn mutation_type(&mut self, tables: &[&Table]) {
        self.line("\ntype Mutation {");
        for table in tables {
            let name = to_pascal_case(&table.name);
            self.field(
                &format!("create{name}(input: Create{name}Input!)"),
                &format!("{name}!"),
            );
            self.field(
                &format!("update{name}(id: ID!, input: Update{name}Input!)"),
                &format!("{name}!"),
            );
            self.field(&format!("delete{name}(id: ID!)"), "Boolean!");
        }
        self.line("}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn block<'a>(sdl: &'a str, header: &str) -> &'a str {
        let start = sdl.find(header).unwrap_or_else(|| panic!("missing {header}"));
        let end = sdl[start..].find('}').unwrap() + start;
        &sdl[start..=end]
    }

    fn field_count(block: &str) -> usize {
        block.lines().filter(|l| l.starts_with("  ")).count()
    }

    #[test]
    fn maps_sql_types() {
        let cases = [
            ("TEXT", GraphqlScalar::String),
            ("varchar(255)", GraphqlScalar::String),
            ("INTEGER", GraphqlScalar::Int),
            ("serial", GraphqlScalar::Int),
            ("BIGINT", GraphqlScalar::Int),
            ("REAL", GraphqlScalar::Float),
            ("DOUBLE PRECISION", GraphqlScalar::Float),
            ("decimal(10,2)", GraphqlScalar::Float),
            ("BOOLEAN", GraphqlScalar::Boolean),
            ("timestamp", GraphqlScalar::String),
            ("blob", GraphqlScalar::String),
        ];
        for (sql_type, expected) in cases {
            let first = GraphqlScalar::from_sql_type(sql_type);
            assert_eq!(first, expected, "{sql_type}");
            assert_eq!(GraphqlScalar::from_sql_type(sql_type), first);
        }
    }

    #[test]
    fn user_example() {
        let sdl = convert("CREATE TABLE `user` (`id` serial PRIMARY KEY, `name` text NOT NULL);");

        assert_eq!(
            block(&sdl, "type User {"),
            "type User {\n  id: Int!\n  name: String!\n}"
        );
        assert_eq!(
            block(&sdl, "input CreateUserInput {"),
            "input CreateUserInput {\n  name: String\n}"
        );
        assert!(block(&sdl, "input UpdateUserInput {").contains("  name: String\n"));
        assert!(block(&sdl, "type Query {").contains("  user(id: ID!): User\n"));
        assert!(block(&sdl, "type Query {").contains("  users(limit: Int, offset: Int): [User!]!\n"));
        assert!(block(&sdl, "type Mutation {").contains("  deleteUser(id: ID!): Boolean!\n"));
    }

    #[test]
    fn counts_without_foreign_keys() {
        let sql = [
            "CREATE TABLE `dashboards` (`id` integer PRIMARY KEY, `title` text);",
            "CREATE TABLE `data_sources` (`id` integer PRIMARY KEY, `kind` text NOT NULL);",
            "CREATE TABLE `chart_category` (`id` integer PRIMARY KEY);",
        ]
        .join(&format!("\n{}\n", sql::STATEMENT_BREAKPOINT));
        let sdl = convert(&sql);

        assert_eq!(sdl.matches("\ntype ").count(), 3 + 2);
        assert_eq!(sdl.matches("\ninput Create").count(), 3);
        assert_eq!(sdl.matches("\ninput Update").count(), 3);
        assert_eq!(field_count(block(&sdl, "type Query {")), 6);
        assert_eq!(field_count(block(&sdl, "type Mutation {")), 9);
        assert!(sdl.contains("chartCategories(limit: Int, offset: Int): [ChartCategory!]!"));
    }

    #[test]
    fn relationship_fields() {
        let sql = "CREATE TABLE `country` (`id` integer PRIMARY KEY, `name` text);
--> statement-breakpoint
CREATE TABLE `data_box` (
  `id` integer PRIMARY KEY,
  `country_id` integer NOT NULL,
  FOREIGN KEY (`country_id`) REFERENCES `country`(`id`)
);";
        let sdl = convert(sql);

        assert_eq!(
            block(&sdl, "type DataBox {"),
            "type DataBox {\n  id: Int!\n  country_id: Int!\n  country: Country!\n}"
        );
        assert_eq!(
            block(&sdl, "type Country {"),
            "type Country {\n  id: Int!\n  name: String\n  dataBoxes: [DataBox!]!\n}"
        );
    }

    #[test]
    fn dangling_reference_is_ignored() {
        let sdl = convert(
            "CREATE TABLE `chart` (`id` integer PRIMARY KEY, `owner_id` integer,
             FOREIGN KEY (`owner_id`) REFERENCES `account`(`id`));",
        );
        assert!(block(&sdl, "type Chart {").contains("  account: Account\n"));
        assert!(!sdl.contains("type Account"));
    }

    #[test]
    fn empty_input_is_still_a_document() {
        let sdl = convert("-- nothing here");
        assert!(sdl.starts_with('#'));
        assert!(!sdl.contains("type Query"));
    }
}
