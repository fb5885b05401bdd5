use std::fmt::Write as _;

use convert_case::{Case, Casing};
use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::{debug, warn};

use super::route::{ConfigInfo, RouteInfo};
use crate::config::HooksConfig;
use crate::js;
use crate::naming::singularize;
use crate::zod::{self, ConvertError};

#[derive(Error, Debug)]
pub enum RequestTypeError {
    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("'{0}' is neither a schema expression nor a type literal")]
    NotASchema(String),
}

/// `chart-configs`, `chart_configs` and `chartConfigs` all give `ChartConfigs`.
fn pascal(name: &str) -> String {
    name.to_case(Case::Pascal)
}

fn is_param(segment: &str) -> bool {
    segment.starts_with(':')
}

fn method_word(method: &str) -> String {
    pascal(&method.to_lowercase())
}

/// Picks a hook name from the route group and the route's path shape.
pub fn hook_name(route_name: &str, route: &RouteInfo) -> String {
    let resource = pascal(&singularize(route_name));
    let plural = pascal(route_name);
    let method = route.method.as_str();
    let segments: Vec<&str> = route.path.split('/').filter(|s| !s.is_empty()).collect();

    let name = match segments.as_slice() {
        [] => match method {
            "GET" => format!("Get{plural}"),
            "POST" => format!("Create{resource}"),
            _ => format!("{}{plural}", method_word(method)),
        },
        [id] if is_param(id) => match method {
            "GET" => format!("Get{resource}"),
            "PUT" | "PATCH" => format!("Update{resource}"),
            "DELETE" => format!("Delete{resource}"),
            _ => format!("{}{resource}", method_word(method)),
        },
        [id, sub] if is_param(id) && !is_param(sub) => match method {
            "GET" => format!("Get{resource}{}", pascal(sub)),
            "POST" => format!("Create{resource}{}", pascal(&singularize(sub))),
            _ => format!("{}{resource}{}", method_word(method), pascal(sub)),
        },
        [id, sub, sub_id] if is_param(id) && !is_param(sub) && is_param(sub_id) => {
            let child = pascal(&singularize(sub));
            match method {
                "GET" => format!("Get{resource}{child}"),
                "PUT" | "PATCH" => format!("Update{resource}{child}"),
                "DELETE" => format!("Delete{resource}{child}"),
                _ => format!("{}{resource}{child}", method_word(method)),
            }
        }
        _ => {
            let mut name = format!("{}{plural}", method_word(method));
            for segment in &segments {
                match segment.strip_prefix(':') {
                    Some(param) => {
                        let _ = write!(name, "By{}", pascal(param));
                    }
                    None => name.push_str(&pascal(segment)),
                }
            }
            name
        }
    };

    format!("use{name}")
}

/// `/:id/comments/:commentId` -> `/comments`
pub fn cleaned_path(path: &str) -> String {
    let kept: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty() && !segment.starts_with(':'))
        .collect();
    format!("/{}", kept.join("/"))
}

/// The TypeScript type for one validator: converted when it is a schema
/// expression, kept verbatim when it is already a type literal.
fn schema_type(text: &str) -> Result<String, RequestTypeError> {
    let expr = js::parse_expression(text).map_err(ConvertError::from)?;
    if zod::is_schema(&expr) {
        return Ok(zod::to_ts_type(text, &expr).to_string());
    }
    if expr.as_object().is_some() {
        return Ok(text.to_string());
    }
    Err(RequestTypeError::NotASchema(text.to_string()))
}

/// The `{ param; query; json }` argument the client method takes, or `None`
/// when it takes nothing.
pub fn request_type(route: &RouteInfo) -> Result<Option<String>, RequestTypeError> {
    let mut members = Vec::new();

    if route.takes_params() {
        let ty = match &route.params_schema {
            Some(schema) => schema_type(schema)?,
            None => {
                let fields: Vec<String> =
                    route.param_names.iter().map(|name| format!("{name}: string")).collect();
                format!("{{ {} }}", fields.join("; "))
            }
        };
        members.push(format!("param: {ty}"));
    }
    if let Some(schema) = route.query_schema.as_deref().filter(|_| route.has_query) {
        members.push(format!("query: {}", schema_type(schema)?));
    }
    if let Some(schema) = route.json_schema.as_deref().filter(|_| route.has_json) {
        members.push(format!("json: {}", schema_type(schema)?));
    }

    if members.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!("{{ {} }}", members.join("; "))))
}

/// Renders the hooks file for one route config.
pub struct HookWriter<'a> {
    info: &'a ConfigInfo,
    config: &'a HooksConfig,
    out: String,
    used_names: FxHashSet<String>,
}

impl<'a> HookWriter<'a> {
    pub fn new(info: &'a ConfigInfo, config: &'a HooksConfig) -> Self {
        Self {
            info,
            config,
            out: String::new(),
            used_names: FxHashSet::default(),
        }
    }

    pub fn write(mut self) -> String {
        let source = self
            .info
            .source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let has_queries = self.info.routes.iter().any(RouteInfo::is_query);
        let has_mutations = self.info.routes.iter().any(|r| !r.is_query());
        let mut imports = Vec::new();
        if has_mutations {
            imports.push("useMutation");
        }
        if has_queries {
            imports.push("useQuery");
        }
        if has_mutations {
            imports.push("useQueryClient");
        }

        let _ = writeln!(self.out, "// Generated from {source}. Do not edit by hand.");
        let _ = writeln!(
            self.out,
            "import {{ {} }} from \"@tanstack/react-query\";",
            imports.join(", ")
        );
        let _ = writeln!(
            self.out,
            "import type {{ InferRequestType, InferResponseType }} from \"hono/client\";"
        );
        let _ = writeln!(
            self.out,
            "import {{ {} }} from \"{}\";",
            self.config.client_ident, self.config.client_import
        );

        let info = self.info;
        for route in &info.routes {
            self.route(route);
        }

        self.out
    }

    fn unique_name(&mut self, name: String) -> String {
        let mut candidate = name.clone();
        let mut n = 2;
        while self.used_names.contains(&candidate) {
            candidate = format!("{name}{n}");
            n += 1;
        }
        self.used_names.insert(candidate.clone());
        candidate
    }

    /// `client.api["widgets"][":id"].$get`
    fn endpoint(&self, route: &RouteInfo) -> String {
        let mut expr = format!("{}.api", self.config.client_ident);
        for segment in self.segments(route) {
            let _ = write!(expr, "[{segment:?}]");
        }
        let _ = write!(expr, ".${}", route.method.to_lowercase());
        expr
    }

    /// `(typeof client.api)["widgets"][":id"]["$get"]`
    fn endpoint_type(&self, route: &RouteInfo) -> String {
        let mut ty = format!("(typeof {}.api)", self.config.client_ident);
        for segment in self.segments(route) {
            let _ = write!(ty, "[{segment:?}]");
        }
        let _ = write!(ty, "[\"${}\"]", route.method.to_lowercase());
        ty
    }

    fn segments<'r>(&'r self, route: &'r RouteInfo) -> impl Iterator<Item = &'r str> {
        std::iter::once(self.info.route_name.as_str())
            .chain(route.path.split('/').filter(|s| !s.is_empty()))
    }

    fn route(&mut self, route: &RouteInfo) {
        let hook = self.unique_name(hook_name(&self.info.route_name, route));
        let base = hook.trim_start_matches("use").to_string();
        let endpoint = self.endpoint(route);
        let endpoint_type = self.endpoint_type(route);
        let display_path = format!("/{}{}", self.info.route_name, route.path.trim_end_matches('/'));
        debug!("{} {} -> {}", route.method, display_path, hook);

        let request = match request_type(route) {
            Ok(request) => request,
            Err(err) => {
                warn!(
                    "⚠️  {} {}: {}; falling back to inferred request type",
                    route.method, display_path, err
                );
                Some(format!("InferRequestType<{endpoint_type}>"))
            }
        };

        let _ = writeln!(self.out);
        if let Some(request) = &request {
            let _ = writeln!(self.out, "export type {base}Request = {request};");
        }
        let _ = writeln!(
            self.out,
            "export type {base}Response = InferResponseType<{endpoint_type}>;"
        );
        let _ = writeln!(self.out);

        if route.is_query() {
            self.query_hook(route, &hook, &base, &endpoint, &display_path, request.is_some());
        } else {
            self.mutation_hook(route, &hook, &base, &endpoint, &display_path, request.is_some());
        }
    }

    fn fetch_body(&mut self, indent: &str, call: &str, route: &RouteInfo, display_path: &str) {
        let out = &mut self.out;
        let _ = writeln!(out, "{indent}const res = await {call};");
        let _ = writeln!(out, "{indent}if (!res.ok) {{");
        let _ = writeln!(
            out,
            "{indent}  throw new Error(`{} {display_path} failed with status ${{res.status}}`);",
            route.method
        );
        let _ = writeln!(out, "{indent}}}");
        let _ = writeln!(out, "{indent}return res.json();");
    }

    fn query_hook(
        &mut self,
        route: &RouteInfo,
        hook: &str,
        base: &str,
        endpoint: &str,
        display_path: &str,
        has_request: bool,
    ) {
        let key = format!("{:?}, {:?}", self.info.route_name, cleaned_path(&route.path));
        if has_request {
            let _ = writeln!(self.out, "export function {hook}(args: {base}Request) {{");
        } else {
            let _ = writeln!(self.out, "export function {hook}() {{");
        }
        let _ = writeln!(self.out, "  return useQuery({{");
        if has_request {
            let _ = writeln!(self.out, "    queryKey: [{key}, args] as const,");
        } else {
            let _ = writeln!(self.out, "    queryKey: [{key}] as const,");
        }
        let _ = writeln!(self.out, "    queryFn: async (): Promise<{base}Response> => {{");
        let call = if has_request {
            format!("{endpoint}(args)")
        } else {
            format!("{endpoint}()")
        };
        self.fetch_body("      ", &call, route, display_path);
        let _ = writeln!(self.out, "    }},");
        if let Some(options) = &route.query_options {
            let _ = writeln!(self.out, "    ...{options},");
        }
        let _ = writeln!(self.out, "  }});");
        let _ = writeln!(self.out, "}}");
    }

    fn mutation_hook(
        &mut self,
        route: &RouteInfo,
        hook: &str,
        base: &str,
        endpoint: &str,
        display_path: &str,
        has_request: bool,
    ) {
        let variables = if has_request {
            format!("{base}Request")
        } else {
            String::from("void")
        };

        let _ = writeln!(self.out, "export function {hook}() {{");
        let _ = writeln!(self.out, "  const queryClient = useQueryClient();");
        let _ = writeln!(
            self.out,
            "  return useMutation<{base}Response, Error, {variables}>({{"
        );
        if has_request {
            let _ = writeln!(self.out, "    mutationFn: async (args) => {{");
            self.fetch_body("      ", &format!("{endpoint}(args)"), route, display_path);
        } else {
            let _ = writeln!(self.out, "    mutationFn: async () => {{");
            self.fetch_body("      ", &format!("{endpoint}()"), route, display_path);
        }
        let _ = writeln!(self.out, "    }},");
        let _ = writeln!(self.out, "    onSuccess: () => {{");
        let _ = writeln!(
            self.out,
            "      queryClient.invalidateQueries({{ queryKey: [{:?}] }});",
            self.info.route_name
        );
        let _ = writeln!(self.out, "    }},");
        if let Some(options) = &route.mutation_options {
            let _ = writeln!(self.out, "    ...{options},");
        }
        let _ = writeln!(self.out, "  }});");
        let _ = writeln!(self.out, "}}");
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use pretty_assertions::assert_eq;

    fn route(method: &str, path: &str) -> RouteInfo {
        RouteInfo {
            method: method.to_string(),
            path: path.to_string(),
            param_names: crate::hooks::route::path_params(path),
            ..RouteInfo::default()
        }
    }

    #[test]
    fn hook_names() {
        let cases = [
            ("GET", "/", "useGetWidgets"),
            ("POST", "/", "useCreateWidget"),
            ("GET", "/:id", "useGetWidget"),
            ("PATCH", "/:id", "useUpdateWidget"),
            ("PUT", "/:id", "useUpdateWidget"),
            ("DELETE", "/:id", "useDeleteWidget"),
            ("GET", "/:id/series", "useGetWidgetSeries"),
            ("POST", "/:id/comments", "useCreateWidgetComment"),
            ("DELETE", "/:id/comments/:commentId", "useDeleteWidgetComment"),
            ("GET", "/search", "useGetWidgetsSearch"),
            ("POST", "/import/:sourceId", "usePostWidgetsImportBySourceId"),
        ];
        for (method, path, expected) in cases {
            assert_eq!(hook_name("widgets", &route(method, path)), expected, "{method} {path}");
        }
        assert_eq!(hook_name("data-sources", &route("GET", "/:id")), "useGetDataSource");
    }

    #[test]
    fn cleans_paths() {
        assert_eq!(cleaned_path("/:id"), "/");
        assert_eq!(cleaned_path("/:id/comments/:commentId"), "/comments");
        assert_eq!(cleaned_path("/search"), "/search");
    }

    #[test]
    fn request_types() {
        let mut update = route("PATCH", "/:id");
        update.has_json = true;
        update.json_schema = Some(String::from("z.object({ title: z.string().optional() })"));
        assert_eq!(
            request_type(&update).unwrap().unwrap(),
            "{ param: { id: string }; json: { title: string | undefined } }"
        );

        let mut typed = route("GET", "/:id");
        typed.has_params = true;
        typed.params_schema = Some(String::from("{ id: string }"));
        assert_eq!(request_type(&typed).unwrap().unwrap(), "{ param: { id: string } }");

        assert_eq!(request_type(&route("GET", "/")).unwrap(), None);

        let mut unresolved = route("POST", "/");
        unresolved.has_json = true;
        unresolved.json_schema = Some(String::from("createWidgetSchema"));
        assert!(matches!(
            request_type(&unresolved),
            Err(RequestTypeError::NotASchema(_))
        ));
    }

    fn info(routes: Vec<RouteInfo>) -> ConfigInfo {
        ConfigInfo {
            route_name: String::from("widgets"),
            module_name: String::from("widgets"),
            source: PathBuf::from("src/modules/widgets/route.config.ts"),
            routes,
        }
    }

    #[test]
    fn writes_query_hook() {
        let mut get = route("GET", "/:id");
        get.has_params = true;
        get.params_schema = Some(String::from("z.object({ id: z.string() })"));
        get.query_options = Some(String::from("{ staleTime: 30_000 }"));

        let config = HooksConfig::default();
        let info = info(vec![get]);
        let out = HookWriter::new(&info, &config).write();

        assert_eq!(
            out,
            r#"// Generated from route.config.ts. Do not edit by hand.
import { useQuery } from "@tanstack/react-query";
import type { InferRequestType, InferResponseType } from "hono/client";
import { client } from "@/lib/rpc";

export type GetWidgetRequest = { param: { id: string } };
export type GetWidgetResponse = InferResponseType<(typeof client.api)["widgets"][":id"]["$get"]>;

export function useGetWidget(args: GetWidgetRequest) {
  return useQuery({
    queryKey: ["widgets", "/", args] as const,
    queryFn: async (): Promise<GetWidgetResponse> => {
      const res = await client.api["widgets"][":id"].$get(args);
      if (!res.ok) {
        throw new Error(`GET /widgets/:id failed with status ${res.status}`);
      }
      return res.json();
    },
    ...{ staleTime: 30_000 },
  });
}
"#
        );
    }

    #[test]
    fn writes_mutation_hook_with_fallback() {
        let mut create = route("POST", "/");
        create.has_json = true;
        create.json_schema = Some(String::from("createWidgetSchema"));
        create.mutation_options = Some(String::from("mutationDefaults"));

        let config = HooksConfig::default();
        let info = info(vec![create, route("DELETE", "/:id")]);
        let out = HookWriter::new(&info, &config).write();

        assert!(out.contains(
            "import { useMutation, useQueryClient } from \"@tanstack/react-query\";"
        ));
        assert!(out.contains(
            "export type CreateWidgetRequest = InferRequestType<(typeof client.api)[\"widgets\"][\"$post\"]>;"
        ));
        assert!(out.contains("return useMutation<CreateWidgetResponse, Error, CreateWidgetRequest>({"));
        assert!(out.contains("const res = await client.api[\"widgets\"].$post(args);"));
        assert!(out.contains("queryClient.invalidateQueries({ queryKey: [\"widgets\"] });"));
        assert!(out.contains("    ...mutationDefaults,\n"));
        assert!(out.contains("export type DeleteWidgetRequest = { param: { id: string } };"));
        assert!(out.contains("export function useDeleteWidget() {"));
    }

    #[test]
    fn colliding_names_get_suffixes() {
        let config = HooksConfig::default();
        let info = info(vec![route("GET", "/:id"), route("GET", "/:slug")]);
        let out = HookWriter::new(&info, &config).write();
        assert!(out.contains("export function useGetWidget(args: GetWidgetRequest)"));
        assert!(out.contains("export function useGetWidget2(args: GetWidget2Request)"));
    }
}
