//! Argument casting with the host's loose conversion rules.

use serde_json::{Map, Value};

/// Cast to a number: numeric strings parse, booleans are 0/1, everything else is 0. NaN becomes 0.
pub fn to_number(v: &Value) -> f64 {
    let n = match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) => parse_number(s),
        _ => 0.0,
    };
    if n.is_nan() { 0.0 } else { n }
}

fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(n) = parse_radix_literal(t) {
        return n;
    }
    // Rust accepts spellings ("inf", "nan") that the host does not.
    if t.chars().any(|c| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E')) {
        return 0.0;
    }
    t.parse::<f64>().unwrap_or(0.0)
}

/// Unsigned `0x`/`0b`/`0o` literals, case-insensitive. Malformed digits cast to 0.
fn parse_radix_literal(t: &str) -> Option<f64> {
    let radix = match t.get(..2)? {
        "0x" | "0X" => 16,
        "0b" | "0B" => 2,
        "0o" | "0O" => 8,
        _ => return None,
    };
    let digits = &t[2..];
    if digits.is_empty() {
        return Some(0.0);
    }
    let mut n = 0.0f64;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix) else {
            return Some(0.0);
        };
        n = n * f64::from(radix) + f64::from(d);
    }
    Some(n)
}

/// Cast to a boolean: `""`, `"0"` and `"false"` (any case) are false, as are `0` and null.
pub fn to_boolean(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")),
        Value::Null => false,
        _ => true,
    }
}

/// Cast to a string. Whole numbers print without a fraction.
pub fn to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) => f.to_string(),
            None => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Whether the host's `parseInt` finds a leading integer in `s`.
pub fn has_leading_integer(s: &str) -> bool {
    let t = s.trim_start();
    let t = t.strip_prefix(['+', '-']).unwrap_or(t);
    t.starts_with(|c: char| c.is_ascii_digit())
}

/// Named block arguments.
#[derive(Clone, Copy, Debug)]
pub struct BlockArgs<'a>(pub &'a Map<String, Value>);

impl BlockArgs<'_> {
    fn get(&self, key: &str) -> &Value {
        self.0.get(key).unwrap_or(&Value::Null)
    }

    pub fn number(&self, key: &str) -> f64 {
        to_number(self.get(key))
    }

    pub fn boolean(&self, key: &str) -> bool {
        to_boolean(self.get(key))
    }

    pub fn string(&self, key: &str) -> String {
        to_string(self.get(key))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn number_casting() {
        assert_eq!(to_number(&json!(3.5)), 3.5);
        assert_eq!(to_number(&json!(" 42 ")), 42.0);
        assert_eq!(to_number(&json!("1e3")), 1000.0);
        assert_eq!(to_number(&json!("abc")), 0.0);
        assert_eq!(to_number(&json!("inf")), 0.0);
        assert_eq!(to_number(&json!("Infinity")), f64::INFINITY);
        assert_eq!(to_number(&json!("")), 0.0);
        assert_eq!(to_number(&json!(true)), 1.0);
        assert_eq!(to_number(&Value::Null), 0.0);
    }

    #[test]
    fn radix_literals_cast_like_the_host() {
        assert_eq!(to_number(&json!("0x10")), 16.0);
        assert_eq!(to_number(&json!(" 0XfF ")), 255.0);
        assert_eq!(to_number(&json!("0b101")), 5.0);
        assert_eq!(to_number(&json!("0o17")), 15.0);
        assert_eq!(to_number(&json!("0x")), 0.0);
        assert_eq!(to_number(&json!("0b12")), 0.0);
        assert_eq!(to_number(&json!("-0x10")), 0.0);
    }

    #[test]
    fn boolean_casting() {
        assert!(to_boolean(&json!("true")));
        assert!(to_boolean(&json!("yes")));
        assert!(!to_boolean(&json!("FALSE")));
        assert!(!to_boolean(&json!("0")));
        assert!(!to_boolean(&json!("")));
        assert!(!to_boolean(&json!(0)));
        assert!(to_boolean(&json!(2)));
    }

    #[test]
    fn string_casting() {
        assert_eq!(to_string(&json!(7.0)), "7");
        assert_eq!(to_string(&json!(0.5)), "0.5");
        assert_eq!(to_string(&json!("x")), "x");
    }

    #[test]
    fn leading_integer() {
        assert!(has_leading_integer("12"));
        assert!(has_leading_integer(" -3px"));
        assert!(!has_leading_integer("dango"));
        assert!(!has_leading_integer("-"));
    }

    #[test]
    fn missing_args_cast_like_null() {
        let map = Map::new();
        let args = BlockArgs(&map);
        assert_eq!(args.number("x"), 0.0);
        assert!(!args.boolean("x"));
        assert_eq!(args.string("x"), "");
    }
}
