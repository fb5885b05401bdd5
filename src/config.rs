use std::path::PathBuf;

/// Where the SQL-to-GraphQL generator reads and writes.
#[derive(Debug, Clone)]
pub struct SdlConfig {
    pub migrations_dir: PathBuf,
    pub output: PathBuf,
}

impl Default for SdlConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("drizzle"),
            output: PathBuf::from("src/graphql/schema.graphql"),
        }
    }
}

/// Conventions the hook generator relies on to find and read route configs.
#[derive(Debug, Clone)]
pub struct HooksConfig {
    /// Exact file name of a route config.
    pub config_file_name: String,
    /// Text a route config must contain to be picked up.
    pub marker: String,
    /// Leading directives that never name a route group.
    pub reserved_directives: Vec<String>,
    /// How many leading lines may hold directives.
    pub directive_lines: usize,
    /// Directory whose child names the route group when no directive does.
    pub modules_marker: String,
    /// Callee text identifying a curried route definition, `defineRoute<...>()({...})`.
    pub route_keyword: String,
    /// Module the typed RPC client is imported from.
    pub client_import: String,
    /// Name of the client binding exported by `client_import`.
    pub client_ident: String,
    /// Generated file location, relative to the route config's directory.
    pub output_dir: String,
    pub output_file: String,
    /// Directory names never descended into.
    pub skip_dirs: Vec<String>,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            config_file_name: String::from("route.config.ts"),
            marker: String::from("use react-query"),
            reserved_directives: vec![String::from("use react-query"), String::from("use client")],
            directive_lines: 5,
            modules_marker: String::from("modules"),
            route_keyword: String::from("defineRoute"),
            client_import: String::from("@/lib/rpc"),
            client_ident: String::from("client"),
            output_dir: String::from("client"),
            output_file: String::from("index.ts"),
            skip_dirs: vec![String::from("node_modules"), String::from(".git")],
        }
    }
}
