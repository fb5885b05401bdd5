use std::fmt;

use thiserror::Error;

use crate::js::{self, Expr, ExprKind, ParseError};

/// Identifier the schema library is imported as.
pub const NAMESPACE: &str = "z";

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("parsing schema expression: {0}")]
    Parse(#[from] ParseError),
}

/// Converts a zod schema expression such as `z.object({ a: z.string() })` into
/// the TypeScript type it validates, `{ a: string }`.
pub fn convert(schema: &str) -> Result<String, ConvertError> {
    let expr = js::parse_expression(schema)?;
    Ok(to_ts_type(schema, &expr).to_string())
}

/// Converts an already parsed expression; `src` is the text its spans index.
pub fn to_ts_type(src: &str, expr: &Expr) -> TsType {
    Converter { src }.convert(expr)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TsType {
    /// Keywords and plain references: `string`, `undefined`, `Date`...
    Named(&'static str),
    Literal(String),
    Array(Box<TsType>),
    Tuple(Vec<TsType>),
    Record(Box<TsType>),
    Object(Vec<(String, TsType)>),
    Union(Vec<TsType>),
}

const UNKNOWN: TsType = TsType::Named("unknown");
const UNDEFINED: TsType = TsType::Named("undefined");
const NULL: TsType = TsType::Named("null");

impl TsType {
    /// Flattened, deduplicated union. A single member is returned as is.
    pub fn union(members: impl IntoIterator<Item = TsType>) -> TsType {
        let mut flat: Vec<TsType> = Vec::new();
        for member in members {
            let parts = match member {
                TsType::Union(parts) => parts,
                other => vec![other],
            };
            for part in parts {
                if !flat.contains(&part) {
                    flat.push(part);
                }
            }
        }

        if flat.len() == 1 {
            return flat.remove(0);
        }
        TsType::Union(flat)
    }

    fn without_undefined(self) -> TsType {
        match self {
            TsType::Union(parts) => {
                TsType::union(parts.into_iter().filter(|part| *part != UNDEFINED))
            }
            other => other,
        }
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .map_or(false, |c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

impl fmt::Display for TsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TsType::Named(name) => f.write_str(name),
            TsType::Literal(text) => f.write_str(text),
            TsType::Array(inner) => match inner.as_ref() {
                TsType::Union(_) => write!(f, "({inner})[]"),
                _ => write!(f, "{inner}[]"),
            },
            TsType::Tuple(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            TsType::Record(value) => write!(f, "Record<string, {value}>"),
            TsType::Object(members) if members.is_empty() => f.write_str("{}"),
            TsType::Object(members) => {
                f.write_str("{ ")?;
                for (i, (key, ty)) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    if is_identifier(key) {
                        write!(f, "{key}: {ty}")?;
                    } else {
                        write!(f, "{key:?}: {ty}")?;
                    }
                }
                f.write_str(" }")
            }
            TsType::Union(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{member}")?;
                }
                Ok(())
            }
        }
    }
}

/// Whether `expr` is a chain of calls and member accesses rooted at `z`.
pub fn is_schema(expr: &Expr) -> bool {
    let mut current = expr;
    loop {
        match &current.kind {
            ExprKind::Call(call) => current = &call.callee,
            ExprKind::Member(member) => current = &member.object,
            ExprKind::Ident(name) => return name == NAMESPACE,
            _ => return false,
        }
    }
}

struct Converter<'s> {
    src: &'s str,
}

impl<'s> Converter<'s> {
    fn convert(&self, expr: &Expr) -> TsType {
        if !is_schema(expr) {
            return UNKNOWN;
        }

        let ExprKind::Call(call) = &expr.kind else {
            return UNKNOWN;
        };
        let ExprKind::Member(member) = &call.callee.kind else {
            return UNKNOWN;
        };

        if member.object.as_ident() == Some(NAMESPACE) {
            return self.base(&member.property, &call.args);
        }

        // z.coerce.number()
        if let ExprKind::Member(namespace) = &member.object.kind {
            if namespace.property == "coerce" && namespace.object.as_ident() == Some(NAMESPACE) {
                return self.base(&member.property, &call.args);
            }
        }

        let inner = self.convert(&member.object);
        self.modifier(&member.property, inner, &call.args)
    }

    fn modifier(&self, method: &str, inner: TsType, args: &[Expr]) -> TsType {
        match method {
            "optional" => TsType::union([inner, UNDEFINED]),
            "nullable" => TsType::union([inner, NULL]),
            "nullish" => TsType::union([inner, NULL, UNDEFINED]),
            "default" => inner.without_undefined(),
            "array" => TsType::Array(Box::new(inner)),
            "or" => match args.first() {
                Some(other) => TsType::union([inner, self.convert(other)]),
                None => inner,
            },
            // nonempty, refine, superRefine, transform, describe, min, max...
            _ => inner,
        }
    }

    fn base(&self, method: &str, args: &[Expr]) -> TsType {
        let first = args.first();
        match method {
            "string" => TsType::Named("string"),
            "number" => TsType::Named("number"),
            "boolean" => TsType::Named("boolean"),
            "bigint" => TsType::Named("bigint"),
            "date" => TsType::Named("Date"),
            "undefined" => UNDEFINED,
            "null" => NULL,
            "any" => TsType::Named("any"),
            "unknown" => UNKNOWN,
            "never" => TsType::Named("never"),
            "literal" => first.map_or(UNKNOWN, |value| {
                TsType::Literal(value.text(self.src).to_string())
            }),
            "enum" => match first.and_then(Expr::as_array) {
                Some(values) => TsType::union(
                    values
                        .iter()
                        .map(|value| TsType::Literal(value.text(self.src).to_string())),
                ),
                None => UNKNOWN,
            },
            "union" => match first.and_then(Expr::as_array) {
                Some(options) => TsType::union(options.iter().map(|o| self.convert(o))),
                None => UNKNOWN,
            },
            "object" => match first.and_then(Expr::as_object) {
                Some(props) => TsType::Object(
                    props
                        .iter()
                        .filter_map(|prop| {
                            let key = prop.key.as_ref()?;
                            is_schema(&prop.value)
                                .then(|| (key.clone(), self.convert(&prop.value)))
                        })
                        .collect(),
                ),
                None => UNKNOWN,
            },
            "array" => TsType::Array(Box::new(first.map_or(UNKNOWN, |item| self.convert(item)))),
            "tuple" => match first.and_then(Expr::as_array) {
                Some(items) => TsType::Tuple(items.iter().map(|i| self.convert(i)).collect()),
                None => UNKNOWN,
            },
            "record" => match args.last() {
                Some(value) => TsType::Record(Box::new(self.convert(value))),
                None => UNKNOWN,
            },
            "optional" => TsType::union([first.map_or(UNKNOWN, |t| self.convert(t)), UNDEFINED]),
            "nullable" => TsType::union([first.map_or(UNKNOWN, |t| self.convert(t)), NULL]),
            _ => UNKNOWN,
        }
    }
}
