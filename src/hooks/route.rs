use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::HooksConfig;
use crate::js::{self, Call, Expr, ExprKind, Span};

static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*(?:"([^"]*)"|'([^']*)')\s*;"#).expect("valid regex")
});

static SCHEMA_OBJECT_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"object\(\{\s*(\w+)\s*:\s*\w+\.").expect("valid regex"));

/// Schema texts that describe "no input".
const EMPTY_SCHEMAS: [&str; 5] = [
    "{}",
    "Record<string,never>",
    "z.object({})",
    "never",
    "undefined",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteInfo {
    pub path: String,
    pub method: String,
    pub has_params: bool,
    pub has_query: bool,
    pub has_json: bool,
    pub param_names: Vec<String>,
    pub params_schema: Option<String>,
    pub query_schema: Option<String>,
    pub json_schema: Option<String>,
    /// Verbatim source, spliced into the generated hook.
    pub query_options: Option<String>,
    pub mutation_options: Option<String>,
}

impl RouteInfo {
    pub fn is_query(&self) -> bool {
        self.method == "GET"
    }

    /// Whether the endpoint takes path parameters, declared or not.
    pub fn takes_params(&self) -> bool {
        self.has_params || !self.param_names.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ConfigInfo {
    pub route_name: String,
    pub module_name: String,
    pub source: PathBuf,
    pub routes: Vec<RouteInfo>,
}

/// The calling conventions a route definition is recognized in, tried in
/// declaration order.
#[derive(Debug)]
pub enum RouteCall<'e> {
    /// `defineRoute({ ... })`
    Direct {
        object: &'e Expr,
        type_args: &'e [Span],
    },
    /// `defineRoute<P, Q, J, R>()({ ... })`
    Curried {
        object: &'e Expr,
        type_args: &'e [Span],
    },
    /// `routes.get({ ... })`, or a curried call without the route keyword.
    FirstArgObject {
        object: &'e Expr,
        type_args: &'e [Span],
    },
    /// `route("name", { ... })`
    AnyArgObject {
        object: &'e Expr,
        type_args: &'e [Span],
    },
    Unrecognized,
}

fn first_object(call: &Call) -> Option<&Expr> {
    call.args.first().filter(|arg| arg.as_object().is_some())
}

impl<'e> RouteCall<'e> {
    pub fn classify(call: &'e Call, src: &str, keyword: &str) -> Self {
        if let (ExprKind::Ident(_), Some(object)) = (&call.callee.kind, first_object(call)) {
            return RouteCall::Direct {
                object,
                type_args: &call.type_args,
            };
        }

        if let (ExprKind::Call(inner), Some(object)) = (&call.callee.kind, first_object(call)) {
            if inner.callee.text(src).contains(keyword) {
                let type_args = if inner.type_args.is_empty() {
                    &call.type_args
                } else {
                    &inner.type_args
                };
                return RouteCall::Curried { object, type_args };
            }
        }

        if let Some(object) = first_object(call) {
            return RouteCall::FirstArgObject {
                object,
                type_args: &call.type_args,
            };
        }

        match call.args.iter().find(|arg| arg.as_object().is_some()) {
            Some(object) => RouteCall::AnyArgObject {
                object,
                type_args: &call.type_args,
            },
            None => RouteCall::Unrecognized,
        }
    }

    pub fn definition(&self) -> Option<(&'e Expr, &'e [Span])> {
        match *self {
            RouteCall::Direct { object, type_args }
            | RouteCall::Curried { object, type_args }
            | RouteCall::FirstArgObject { object, type_args }
            | RouteCall::AnyArgObject { object, type_args } => Some((object, type_args)),
            RouteCall::Unrecognized => None,
        }
    }
}

fn strip_quotes(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

fn is_empty_schema(text: &str) -> bool {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    EMPTY_SCHEMAS.contains(&compact.as_str())
}

/// `/:id/items/:itemId` -> `["id", "itemId"]`
pub fn path_params(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|segment| segment.strip_prefix(':'))
        .map(|name| name.trim_end_matches('?').to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Keys of the first `z.object({...})` call in a schema chain.
fn schema_object_keys(expr: &Expr) -> Option<Vec<String>> {
    let mut current = expr;
    loop {
        let call = current.as_call()?;
        let ExprKind::Member(member) = &call.callee.kind else {
            return None;
        };
        if member.property == "object" {
            let props = call.args.first()?.as_object()?;
            return Some(props.iter().filter_map(|p| p.key.clone()).collect());
        }
        current = &member.object;
    }
}

/// Reads one route definition object. `None` when it has no `path`.
pub fn parse_route(object: &Expr, type_args: &[Span], src: &str) -> Option<RouteInfo> {
    let path = object.prop("path")?;
    let path = path
        .as_str()
        .map(String::from)
        .unwrap_or_else(|| strip_quotes(path.text(src)).to_string());

    let method = object
        .prop("method")
        .map(|m| strip_quotes(m.text(src)).to_uppercase())
        .unwrap_or_else(|| String::from("GET"));

    let mut route = RouteInfo {
        path,
        method,
        query_options: object.prop("queryOptions").map(|o| o.text(src).to_string()),
        mutation_options: object.prop("mutationOptions").map(|o| o.text(src).to_string()),
        ..RouteInfo::default()
    };

    let validators = object.prop("validators");
    let validator = |key: &str| validators.and_then(|v| v.prop(key));

    route.params_schema = validator("params").map(|v| v.text(src).to_string());
    route.query_schema = validator("query").map(|v| v.text(src).to_string());
    route.json_schema = validator("json").map(|v| v.text(src).to_string());

    // defineRoute<Params, Query, Json, Response>
    if let [params, query, json, _response] = type_args {
        let generic = |span: &Span| Some(span.text(src).to_string());
        route.params_schema = route.params_schema.or_else(|| generic(params));
        route.query_schema = route.query_schema.or_else(|| generic(query));
        route.json_schema = route.json_schema.or_else(|| generic(json));
    }

    for schema in [
        &mut route.params_schema,
        &mut route.query_schema,
        &mut route.json_schema,
    ] {
        if schema.as_deref().map_or(false, is_empty_schema) {
            *schema = None;
        }
    }
    route.has_params = route.params_schema.is_some();
    route.has_query = route.query_schema.is_some();
    route.has_json = route.json_schema.is_some();

    route.param_names = validator("params")
        .and_then(schema_object_keys)
        .filter(|keys| !keys.is_empty())
        .or_else(|| {
            let text = route.params_schema.as_deref()?;
            let keys: Vec<String> = SCHEMA_OBJECT_KEY
                .captures_iter(text)
                .map(|captures| captures[1].to_string())
                .collect();
            (!keys.is_empty()).then_some(keys)
        })
        .unwrap_or_else(|| path_params(&route.path));

    Some(route)
}

/// The route group named by the first non-reserved leading directive.
fn directive_name(src: &str, config: &HooksConfig) -> Option<String> {
    src.lines()
        .take(config.directive_lines)
        .filter_map(|line| DIRECTIVE.captures(line))
        .filter_map(|captures| captures.get(1).or_else(|| captures.get(2)))
        .map(|name| name.as_str())
        .find(|name| !name.is_empty() && !config.reserved_directives.iter().any(|r| r == name))
        .map(String::from)
}

/// The directory right after the `modules` directory, if any.
fn module_segment(path: &Path, config: &HooksConfig) -> Option<String> {
    let mut components = path.components().filter_map(|c| match c {
        Component::Normal(name) => name.to_str(),
        _ => None,
    });
    components.find(|name| *name == config.modules_marker)?;
    // the segment must be a directory, not the config file itself
    let next = components.next()?;
    components.next()?;
    Some(next.to_string())
}

/// Extracts the route group and every route definition from one config file.
pub fn read_config(
    path: &Path,
    src: &str,
    config: &HooksConfig,
) -> Result<ConfigInfo, js::ParseError> {
    let module = module_segment(path, config);
    let route_name = directive_name(src, config)
        .or_else(|| module.clone())
        .or_else(|| {
            path.parent()
                .and_then(Path::file_name)
                .and_then(|name| name.to_str())
                .map(String::from)
        })
        .unwrap_or_default();
    let module_name = module.unwrap_or_else(|| route_name.clone());

    let program = js::parse_program(src)?;
    let mut routes = Vec::new();
    match program.resolved_default_export().and_then(Expr::as_array) {
        Some(elements) => {
            for (i, element) in elements.iter().enumerate() {
                let Some(call) = element.as_call() else {
                    debug!("element {} of {} is not a call", i, path.display());
                    continue;
                };

                let shape = RouteCall::classify(call, src, &config.route_keyword);
                debug!("element {} of {}: {:?}", i, path.display(), ShapeName(&shape));
                let route = shape
                    .definition()
                    .and_then(|(object, type_args)| parse_route(object, type_args, src));
                match route {
                    Some(route) => routes.push(route),
                    None => debug!("element {} of {} has no route definition", i, path.display()),
                }
            }
        }
        None => debug!("{} has no default-exported array", path.display()),
    }

    Ok(ConfigInfo {
        route_name,
        module_name,
        source: path.to_path_buf(),
        routes,
    })
}

/// Logs only the variant of a [`RouteCall`].
struct ShapeName<'a, 'e>(&'a RouteCall<'e>);

impl std::fmt::Debug for ShapeName<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self.0 {
            RouteCall::Direct { .. } => "Direct",
            RouteCall::Curried { .. } => "Curried",
            RouteCall::FirstArgObject { .. } => "FirstArgObject",
            RouteCall::AnyArgObject { .. } => "AnyArgObject",
            RouteCall::Unrecognized => "Unrecognized",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes(src: &str) -> Vec<RouteInfo> {
        read_config(Path::new("src/modules/widgets/route.config.ts"), src, &HooksConfig::default())
            .unwrap()
            .routes
    }

    fn shape_of(src: &str) -> String {
        let expr = js::parse_expression(src).unwrap();
        let call = expr.as_call().unwrap();
        format!("{:?}", ShapeName(&RouteCall::classify(call, src, "defineRoute")))
    }

    #[test]
    fn classifies_call_shapes() {
        assert_eq!(shape_of("defineRoute({ path: '/' })"), "Direct");
        assert_eq!(shape_of("defineRoute<A, B, C, D>()({ path: '/' })"), "Curried");
        assert_eq!(shape_of("api.route({ path: '/' })"), "FirstArgObject");
        assert_eq!(shape_of("make()({ path: '/' })"), "FirstArgObject");
        assert_eq!(shape_of("route('list', { path: '/' })"), "AnyArgObject");
        assert_eq!(shape_of("route('list')"), "Unrecognized");
    }

    #[test]
    fn reads_direct_route() {
        let routes = routes(
            r#""use react-query";
export default [
  defineRoute({
    path: "/:id",
    method: "GET",
    validators: { params: z.object({ id: z.string() }) },
    queryOptions: { staleTime: 30_000 },
  }),
];"#,
        );
        assert_eq!(
            routes,
            vec![RouteInfo {
                path: String::from("/:id"),
                method: String::from("GET"),
                has_params: true,
                param_names: vec![String::from("id")],
                params_schema: Some(String::from("z.object({ id: z.string() })")),
                query_options: Some(String::from("{ staleTime: 30_000 }")),
                ..RouteInfo::default()
            }]
        );
    }

    #[test]
    fn generic_arguments_fill_missing_validators() {
        let routes = routes(
            r#"export default [
  defineRoute<{ chartId: string }, {}, z.object({ title: z.string() }), Chart>()({
    path: "/:chartId",
    method: "patch",
    validators: { query: z.object({ draft: z.boolean() }) },
  }),
];"#,
        );
        let route = &routes[0];
        assert_eq!(route.method, "PATCH");
        assert_eq!(route.params_schema.as_deref(), Some("{ chartId: string }"));
        assert_eq!(route.query_schema.as_deref(), Some("z.object({ draft: z.boolean() })"));
        assert_eq!(route.json_schema.as_deref(), Some("z.object({ title: z.string() })"));
        assert!(route.has_params && route.has_query && route.has_json);
        assert_eq!(route.param_names, ["chartId"]);
    }

    #[test]
    fn empty_schemas_do_not_count() {
        let routes = routes(
            r#"export default [
  defineRoute<Record<string, never>, {}, undefined, void>()({ path: "/", method: "POST" }),
  defineRoute({ path: "/x", method: "POST", validators: { json: z.object({ }) } }),
];"#,
        );
        for route in &routes {
            assert!(!route.has_params && !route.has_query && !route.has_json, "{route:?}");
        }
    }

    #[test]
    fn param_names_fall_back_to_regex_then_path() {
        let routes = routes(
            r#"const routes = [
  defineRoute({ path: "/:slug", method: "DELETE", validators: { params: paramsSchema } }),
  defineRoute<ReturnType<typeof z.object>, {}, {}, R>()({ path: "/:a/:b", method: "GET" }),
  defineRoute({ path: "/:id", method: "PUT", validators: { params: wrap(z.object({ key: z.string() })) } }),
];
export default routes;"#,
        );
        assert_eq!(routes[0].param_names, ["slug"]);
        assert_eq!(routes[1].param_names, ["a", "b"]);
        assert_eq!(routes[2].param_names, ["key"]);
    }

    #[test]
    fn skips_elements_without_routes() {
        let routes = routes(
            r#"export default [
  defineRoute({ method: "GET" }),
  someSpread,
  defineRoute({ path: "/", method: "GET" }),
];"#,
        );
        assert_eq!(routes.len(), 1);
    }

    #[test]
    fn route_group_from_directive_or_path() {
        let config = HooksConfig::default();
        let path = Path::new("app/src/modules/dashboards/route.config.ts");

        let info = read_config(path, "\"use react-query\";\n'charts';\nexport default [];", &config).unwrap();
        assert_eq!(info.route_name, "charts");
        assert_eq!(info.module_name, "dashboards");

        let info = read_config(path, "\"use client\";\n\"use react-query\";\nexport default [];", &config).unwrap();
        assert_eq!(info.route_name, "dashboards");

        let info = read_config(Path::new("api/sources/route.config.ts"), "export default [];", &config).unwrap();
        assert_eq!(info.route_name, "sources");
        assert_eq!(info.module_name, "sources");
    }

    #[test]
    fn path_params_from_segments() {
        assert_eq!(path_params("/:id/items/:itemId?"), ["id", "itemId"]);
        assert!(path_params("/").is_empty());
    }
}
