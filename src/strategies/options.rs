use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Open-ended algorithm configuration.
///
/// Keys are case-insensitive (stored lower-cased). Each typed getter returns a
/// fixed zero value when the key is absent or holds another JSON type:
///   - `get_string` → `""`, only JSON strings match
///   - `get_bool`   → `false`, only JSON bools match
///   - `get_int`    → `0`, any JSON number; floats truncate toward zero,
///                    non-finite or out-of-range values give `0`
///   - `get_float`  → `0.0`, any JSON number; integers are widened
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Value>", into = "BTreeMap<String, Value>")]
pub struct Options(BTreeMap<String, Value>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(&key.to_lowercase())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get_string(&self, key: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        }
    }

    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::Bool(true)))
    }

    pub fn get_int(&self, key: &str) -> i64 {
        let Some(Value::Number(n)) = self.get(key) else {
            return 0;
        };
        if let Some(i) = n.as_i64() {
            return i;
        }
        match n.as_f64() {
            Some(f) if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 => f.trunc() as i64,
            _ => 0,
        }
    }

    pub fn get_float(&self, key: &str) -> f64 {
        match self.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Overwrite with every key of `other`; keys it lacks keep their current value.
    pub fn merge(&mut self, other: &Options) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// `self` with `other` merged on top, leaving `self` untouched.
    pub fn merged(&self, other: &Options) -> Options {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<BTreeMap<String, Value>> for Options {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect())
    }
}

impl From<Options> for BTreeMap<String, Value> {
    fn from(options: Options) -> Self {
        options.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_getters_are_case_insensitive() {
        let opts = Options::new()
            .with("Trend.Name", "trend")
            .with("ENABLED", true)
            .with("size", 150)
            .with("ratio", 0.5);

        assert_eq!(opts.get_string("trend.name"), "trend");
        assert!(opts.get_bool("enabled"));
        assert_eq!(opts.get_int("SIZE"), 150);
        assert_eq!(opts.get_float("Ratio"), 0.5);
    }

    #[test]
    fn test_zero_values_on_missing_or_mismatch() {
        let opts = Options::new().with("name", 12).with("flag", "yes");

        assert_eq!(opts.get_string("name"), "");
        assert!(!opts.get_bool("flag"));
        assert_eq!(opts.get_int("flag"), 0);
        assert_eq!(opts.get_float("missing"), 0.0);
        assert_eq!(Options::new().get_int("anything"), 0);
    }

    #[test]
    fn test_int_and_float_conversions() {
        let opts = Options::new().with("f", 10.9).with("neg", -3.7).with("i", 7);
        assert_eq!(opts.get_int("f"), 10);
        assert_eq!(opts.get_int("neg"), -3);
        assert_eq!(opts.get_float("i"), 7.0);
    }

    #[test]
    fn test_merge_overrides_only_given_keys() {
        let mut defaults = Options::new().with("trend.max_price", 140).with("status", false);
        let overrides = Options::new().with("TREND.MAX_PRICE", 150);

        defaults.merge(&overrides);

        assert_eq!(defaults.get_int("trend.max_price"), 150);
        assert!(!defaults.get_bool("status"));
        assert_eq!(defaults.len(), 2);
    }

    #[test]
    fn test_merged_leaves_receiver_untouched() {
        let defaults = Options::new().with("a", 1).with("b", false);
        let out = defaults.merged(&Options::new().with("a", 2));
        assert_eq!(out.get_int("a"), 2);
        assert_eq!(defaults.get_int("a"), 1);
    }

    #[test]
    fn test_deserialize_lowercases_keys() {
        let opts: Options = serde_json::from_value(json!({"Trend.Selling.Long_Trend_Size": 200})).unwrap();
        assert_eq!(opts.get_int("trend.selling.long_trend_size"), 200);
        assert_eq!(
            serde_json::to_value(&opts).unwrap(),
            json!({"trend.selling.long_trend_size": 200})
        );
    }
}
