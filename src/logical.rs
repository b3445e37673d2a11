//! Boolean-tree queries over specific keys.
//!
//! ```json
//! {"$and": [{"author": "scalzi"}, {"$or": [{"title": "war"}, {"$path": "tags", "$val": "sci"}]}]}
//! ```
//!
//! An object with several plain keys is an implicit `$and` of one leaf per key.

use crate::bitap::MatchOptions;
use crate::error::{QueryError, Result};
use crate::searcher::Searcher;
use serde_json::{Map, Value};

const AND: &str = "$and";
const OR: &str = "$or";
const PATH: &str = "$path";
const VAL: &str = "$val";

/// A parsed boolean query.
#[derive(Debug, Clone)]
pub enum Expression {
    Leaf {
        key_id: String,
        pattern: String,
        searcher: Searcher,
    },
    And(Vec<Expression>),
    Or(Vec<Expression>),
}

fn is_expression(map: &Map<String, Value>) -> bool {
    map.contains_key(AND) || map.contains_key(OR)
}

fn as_object(value: &Value) -> Result<&Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| QueryError::NotAnObject(value.to_string()).into())
}

/// Key id of a `$path` value: a dotted string or an array of segments
fn path_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(segments) => segments
            .iter()
            .map(|s| s.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(|segments| segments.join(".")),
        _ => None,
    }
}

impl Expression {
    pub fn parse(query: &Value, options: MatchOptions, use_extended_search: bool) -> Result<Self> {
        Parser {
            options,
            use_extended_search,
        }
        .node(as_object(query)?)
    }

    /// Evaluate with `leaf` resolving one key and searcher to its matches.
    ///
    /// `$and` stops at the first child without matches and yields nothing;
    /// `$or` stops at the first child with matches and yields only those.
    pub fn evaluate<T, F>(&self, leaf: &F) -> Vec<T>
    where
        F: Fn(&str, &Searcher) -> Vec<T>,
    {
        match self {
            Expression::Leaf {
                key_id, searcher, ..
            } => leaf(key_id, searcher),
            Expression::And(children) => {
                let mut all = Vec::new();
                for child in children {
                    let found = child.evaluate(leaf);
                    if found.is_empty() {
                        return Vec::new();
                    }
                    all.extend(found);
                }
                all
            }
            Expression::Or(children) => children
                .iter()
                .map(|child| child.evaluate(leaf))
                .find(|found| !found.is_empty())
                .unwrap_or_default(),
        }
    }
}

struct Parser {
    options: MatchOptions,
    use_extended_search: bool,
}

impl Parser {
    fn node(&self, map: &Map<String, Value>) -> Result<Expression> {
        if map.is_empty() {
            return Err(QueryError::EmptyExpression.into());
        }

        let is_path = map.contains_key(PATH);

        if is_expression(map) {
            let mut children = Vec::new();
            for operator in [AND, OR] {
                if let Some(Value::Array(items)) = map.get(operator) {
                    for item in items {
                        children.push(self.node(as_object(item)?)?);
                    }
                }
            }
            return Ok(if map.contains_key(AND) {
                Expression::And(children)
            } else {
                Expression::Or(children)
            });
        }

        if !is_path && map.len() > 1 {
            let children = map
                .iter()
                .map(|(key, value)| {
                    let mut single = Map::new();
                    single.insert(key.clone(), value.clone());
                    self.node(&single)
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(Expression::And(children));
        }

        let (key_id, pattern) = if is_path {
            let key_id = map
                .get(PATH)
                .and_then(path_id)
                .ok_or_else(|| QueryError::InvalidValueForKey(PATH.to_string()))?;
            (key_id, map.get(VAL))
        } else {
            match map.iter().next() {
                Some((key, value)) => (key.clone(), Some(value)),
                None => return Err(QueryError::EmptyExpression.into()),
            }
        };

        let pattern = match pattern {
            Some(Value::String(pattern)) => pattern.clone(),
            _ => return Err(QueryError::InvalidValueForKey(key_id).into()),
        };

        let searcher = Searcher::new(&pattern, self.options, self.use_extended_search);
        Ok(Expression::Leaf {
            key_id,
            pattern,
            searcher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    fn parse(query: Value) -> Result<Expression> {
        Expression::parse(&query, MatchOptions::default(), false)
    }

    fn describe(expr: &Expression) -> String {
        match expr {
            Expression::Leaf {
                key_id, pattern, ..
            } => format!("{}:{}", key_id, pattern),
            Expression::And(children) => format!(
                "and({})",
                children.iter().map(describe).collect::<Vec<_>>().join(",")
            ),
            Expression::Or(children) => format!(
                "or({})",
                children.iter().map(describe).collect::<Vec<_>>().join(",")
            ),
        }
    }

    #[test]
    fn test_parse_forms() -> Result<()> {
        assert_eq!(describe(&parse(json!({"title": "war"}))?), "title:war");
        assert_eq!(
            describe(&parse(json!({"author": "a", "title": "t"}))?),
            "and(author:a,title:t)"
        );
        assert_eq!(
            describe(&parse(json!({
                "$or": [{"title": "war"}, {"$path": ["author", "name"], "$val": "scalzi"}]
            }))?),
            "or(title:war,author.name:scalzi)"
        );
        Ok(())
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse(json!({"title": 3})).unwrap_err(),
            Error::Query(QueryError::InvalidValueForKey("title".into()))
        );
        assert!(matches!(
            parse(json!(["title"])),
            Err(Error::Query(QueryError::NotAnObject(_)))
        ));
        assert!(matches!(
            parse(json!({})),
            Err(Error::Query(QueryError::EmptyExpression))
        ));
        assert!(parse(json!({"$path": "title"})).is_err());
    }

    #[test]
    fn test_evaluate_short_circuit() -> Result<()> {
        let expr = parse(json!({
            "$or": [
                {"$and": [{"a": "x"}, {"missing": "x"}]},
                {"b": "x"},
                {"c": "x"}
            ]
        }))?;

        let found = expr.evaluate(&|key: &str, _: &Searcher| {
            if key == "missing" {
                Vec::new()
            } else {
                vec![key.to_string()]
            }
        });
        // The `$and` fails on `missing`; `$or` stops at `b`
        assert_eq!(found, vec!["b".to_string()]);
        Ok(())
    }
}
