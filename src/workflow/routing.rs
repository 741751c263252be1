//! Normalization of the `next` directive.
//!
//! The raw document shape (string or mapping) is normalized once at load
//! time; the scheduler only ever consumes the normalized form.

use serde_yaml_ng::Value as YamlValue;

/// A normalized routing directive with the original text preserved for
/// trace output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Routing {
    /// Stringified original directive, recorded on routing traces.
    pub raw: String,
    pub kind: RoutingKind,
}

/// The shape of a routing directive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutingKind {
    /// A plain step id.
    Static(String),
    /// An expression (begins with `${`), evaluated to a step id at
    /// scheduling time.
    Expr(String),
    /// Ordered condition/target pairs; the first true condition wins.
    Map(Vec<(String, String)>),
    /// The document value had an unsupported shape. The step advances
    /// nowhere; a warning is logged at scheduling time.
    Invalid,
}

/// Normalize a raw `next` value. Returns `None` for an absent or null
/// directive (sequential fallthrough).
#[must_use]
pub fn normalize(value: &YamlValue) -> Option<Routing> {
    match value {
        YamlValue::Null => None,
        YamlValue::String(s) => {
            let kind = if s.starts_with("${") {
                RoutingKind::Expr(s.clone())
            } else {
                RoutingKind::Static(s.clone())
            };
            Some(Routing {
                raw: s.clone(),
                kind,
            })
        }
        YamlValue::Mapping(mapping) => {
            let mut pairs = Vec::with_capacity(mapping.len());
            for (key, val) in mapping {
                match (key.as_str(), val.as_str()) {
                    (Some(cond), Some(target)) => {
                        pairs.push((cond.to_string(), target.to_string()));
                    }
                    _ => {
                        return Some(Routing {
                            raw: render_raw(value),
                            kind: RoutingKind::Invalid,
                        })
                    }
                }
            }
            Some(Routing {
                raw: render_map(&pairs),
                kind: RoutingKind::Map(pairs),
            })
        }
        other => Some(Routing {
            raw: render_raw(other),
            kind: RoutingKind::Invalid,
        }),
    }
}

fn render_map(pairs: &[(String, String)]) -> String {
    let body: Vec<String> = pairs
        .iter()
        .map(|(cond, target)| format!("{cond:?}: {target:?}"))
        .collect();
    format!("{{{}}}", body.join(", "))
}

fn render_raw(value: &YamlValue) -> String {
    serde_yaml_ng::to_string(value)
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|_| format!("{value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> YamlValue {
        serde_yaml_ng::from_str(text).unwrap()
    }

    #[test]
    fn null_is_fallthrough() {
        assert!(normalize(&YamlValue::Null).is_none());
    }

    #[test]
    fn plain_string_is_static() {
        let routing = normalize(&yaml("step_two")).unwrap();
        assert_eq!(routing.raw, "step_two");
        assert_eq!(routing.kind, RoutingKind::Static("step_two".to_string()));
    }

    #[test]
    fn dollar_prefix_is_expr() {
        let routing = normalize(&yaml("\"${route}\"")).unwrap();
        assert_eq!(routing.kind, RoutingKind::Expr("${route}".to_string()));
    }

    #[test]
    fn mapping_keeps_document_order() {
        let routing = normalize(&yaml("{\"${x} > 0\": pos, \"${x} <= 0\": neg}")).unwrap();
        match routing.kind {
            RoutingKind::Map(pairs) => {
                assert_eq!(
                    pairs,
                    vec![
                        ("${x} > 0".to_string(), "pos".to_string()),
                        ("${x} <= 0".to_string(), "neg".to_string()),
                    ]
                );
            }
            other => panic!("expected map routing, got {other:?}"),
        }
        assert_eq!(routing.raw, r#"{"${x} > 0": "pos", "${x} <= 0": "neg"}"#);
    }

    #[test]
    fn non_string_shapes_are_invalid() {
        assert_eq!(normalize(&yaml("42")).unwrap().kind, RoutingKind::Invalid);
        assert_eq!(
            normalize(&yaml("[a, b]")).unwrap().kind,
            RoutingKind::Invalid
        );
        // Mapping with a non-string target.
        assert_eq!(
            normalize(&yaml("{cond: 3}")).unwrap().kind,
            RoutingKind::Invalid
        );
    }
}
