//! Seeds a [`super::Corpus`] by walking a generic JSON-shaped compilation
//! AST (§4.1): any mapping with both an `id` and a `nodeType` key is offered
//! to the visitor; `Literal` nodes of kind `number`/`string` are parsed and
//! added. Failures are silent and traversal continues regardless.
use super::Corpus;
use num_bigint::BigInt;
use serde_json::Value;

pub fn seed_from_ast(corpus: &Corpus, ast: &Value) {
    visit(corpus, ast);
}

fn visit(corpus: &Corpus, node: &Value) {
    match node {
        Value::Object(map) => {
            if map.contains_key("id") && map.contains_key("nodeType") {
                offer_literal(corpus, map);
            }
            for value in map.values() {
                visit(corpus, value);
            }
        }
        Value::Array(items) => {
            for item in items {
                visit(corpus, item);
            }
        }
        _ => {}
    }
}

fn offer_literal(corpus: &Corpus, map: &serde_json::Map<String, Value>) {
    let Some("Literal") = map.get("nodeType").and_then(Value::as_str) else {
        return;
    };
    let Some(kind) = map.get("kind").and_then(Value::as_str) else {
        return;
    };
    let Some(raw) = map.get("value").and_then(Value::as_str) else {
        return;
    };
    match kind {
        "number" => {
            if let Ok(n) = raw.parse::<BigInt>() {
                corpus.add_integer(n);
            }
        }
        "string" => corpus.add_string(raw.to_string()),
        _ => {}
    }
}
