//! Cache Key Codec
//!
//! Derives deterministic cache keys from call signatures. A key has the
//! shape `namespace:class:operation:<hash|"no-params">` where `hash` is
//! the first 12 characters of the URL-safe base64 SHA-256 digest of the
//! canonical argument serialization.
//!
//! Canonicalization is typed ([`CacheKeyable`]), not reflective: callers
//! convert arguments into an explicit [`KeyArg`] tree. Map entries are
//! always rendered sorted by key so hash-map iteration order can never
//! leak into the derived key.

use std::collections::{BTreeMap, HashMap};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{Error, Result};

/// Number of hash characters kept in a derived key
const PARAM_HASH_LEN: usize = 12;

/// Sentinel used when an operation takes no arguments
const NO_PARAMS: &str = "no-params";

/// Canonical value tree for cache key derivation
#[derive(Debug, Clone, PartialEq)]
pub enum KeyArg {
    /// Absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    Uint(u64),
    /// Floating point
    Float(f64),
    /// Text
    Str(String),
    /// Ordered sequence, rendered `[e1,e2,...]`
    Seq(Vec<KeyArg>),
    /// Key-value map, rendered `{k=v,...}` with entries sorted by key
    Map(Vec<(String, KeyArg)>),
}

impl KeyArg {
    /// Convert an arbitrary structured value through the generic encoding
    ///
    /// This is the fallback for types without a hand-written
    /// [`CacheKeyable`] impl. Serialization failures surface as
    /// [`Error::Serialization`] so the codec can degrade the key.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<KeyArg> {
        let json = serde_json::to_value(value)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Self::from_json(json))
    }

    fn from_json(value: serde_json::Value) -> KeyArg {
        match value {
            serde_json::Value::Null => KeyArg::Null,
            serde_json::Value::Bool(b) => KeyArg::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    KeyArg::Int(i)
                } else if let Some(u) = n.as_u64() {
                    KeyArg::Uint(u)
                } else {
                    KeyArg::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => KeyArg::Str(s),
            serde_json::Value::Array(items) => {
                KeyArg::Seq(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => KeyArg::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Render this argument into the canonical form
    fn render(&self, out: &mut String) {
        match self {
            KeyArg::Null => out.push_str("null"),
            KeyArg::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            KeyArg::Int(i) => out.push_str(&i.to_string()),
            KeyArg::Uint(u) => out.push_str(&u.to_string()),
            KeyArg::Float(f) => out.push_str(&f.to_string()),
            KeyArg::Str(s) => out.push_str(s),
            KeyArg::Seq(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.render(out);
                }
                out.push(']');
            }
            KeyArg::Map(entries) => {
                // Sorted rendering keeps the hash stable across runs
                let mut sorted: Vec<&(String, KeyArg)> = entries.iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                out.push('{');
                for (i, (k, v)) in sorted.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(k);
                    out.push('=');
                    v.render(out);
                }
                out.push('}');
            }
        }
    }
}

/// Typed canonical serialization capability
///
/// Implement this for any type used as a cache key argument. The blanket
/// impls cover primitives, strings, options, sequences, and string-keyed
/// maps; structured domain types should either implement it by hand or
/// go through [`KeyArg::from_serialize`].
pub trait CacheKeyable {
    /// Convert the value into its canonical key argument
    fn to_key_arg(&self) -> KeyArg;
}

macro_rules! keyable_int {
    ($($t:ty),*) => {
        $(impl CacheKeyable for $t {
            fn to_key_arg(&self) -> KeyArg {
                KeyArg::Int(*self as i64)
            }
        })*
    };
}

macro_rules! keyable_uint {
    ($($t:ty),*) => {
        $(impl CacheKeyable for $t {
            fn to_key_arg(&self) -> KeyArg {
                KeyArg::Uint(*self as u64)
            }
        })*
    };
}

keyable_int!(i8, i16, i32, i64, isize);
keyable_uint!(u8, u16, u32, u64, usize);

impl CacheKeyable for bool {
    fn to_key_arg(&self) -> KeyArg {
        KeyArg::Bool(*self)
    }
}

impl CacheKeyable for f32 {
    fn to_key_arg(&self) -> KeyArg {
        KeyArg::Float(*self as f64)
    }
}

impl CacheKeyable for f64 {
    fn to_key_arg(&self) -> KeyArg {
        KeyArg::Float(*self)
    }
}

impl CacheKeyable for str {
    fn to_key_arg(&self) -> KeyArg {
        KeyArg::Str(self.to_string())
    }
}

impl CacheKeyable for String {
    fn to_key_arg(&self) -> KeyArg {
        KeyArg::Str(self.clone())
    }
}

impl<T: CacheKeyable> CacheKeyable for Option<T> {
    fn to_key_arg(&self) -> KeyArg {
        match self {
            Some(v) => v.to_key_arg(),
            None => KeyArg::Null,
        }
    }
}

impl<T: CacheKeyable> CacheKeyable for Vec<T> {
    fn to_key_arg(&self) -> KeyArg {
        KeyArg::Seq(self.iter().map(|v| v.to_key_arg()).collect())
    }
}

impl<T: CacheKeyable> CacheKeyable for [T] {
    fn to_key_arg(&self) -> KeyArg {
        KeyArg::Seq(self.iter().map(|v| v.to_key_arg()).collect())
    }
}

impl<T: CacheKeyable> CacheKeyable for BTreeMap<String, T> {
    fn to_key_arg(&self) -> KeyArg {
        KeyArg::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_key_arg()))
                .collect(),
        )
    }
}

impl<T: CacheKeyable> CacheKeyable for HashMap<String, T> {
    fn to_key_arg(&self) -> KeyArg {
        // Iteration order is irrelevant: Map entries are sorted at render
        KeyArg::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_key_arg()))
                .collect(),
        )
    }
}

impl<T: CacheKeyable + ?Sized> CacheKeyable for &T {
    fn to_key_arg(&self) -> KeyArg {
        (**self).to_key_arg()
    }
}

/// Cache key codec bound to an application namespace
#[derive(Debug, Clone)]
pub struct KeyCodec {
    namespace: String,
}

impl KeyCodec {
    /// Create a codec for the given namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// The namespace this codec prefixes onto call-signature keys
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Derive a key from a call signature
    pub fn generate_key(&self, class: &str, operation: &str, args: &[KeyArg]) -> String {
        let suffix = if args.is_empty() {
            NO_PARAMS.to_string()
        } else {
            let mut canonical = String::new();
            KeyArg::Seq(args.to_vec()).render(&mut canonical);
            param_hash(canonical.as_bytes())
        };
        format!("{}:{}:{}:{}", self.namespace, class, operation, suffix)
    }

    /// Derive a key from arguments whose canonicalization may have failed
    ///
    /// Any failed argument degrades the whole key to a structural hash of
    /// the argument list; the degradation is logged and never propagated.
    pub fn generate_key_checked(
        &self,
        class: &str,
        operation: &str,
        args: Vec<Result<KeyArg>>,
    ) -> String {
        let mut ok_args = Vec::with_capacity(args.len());
        let mut failures = Vec::new();
        for (index, arg) in args.into_iter().enumerate() {
            match arg {
                Ok(a) => ok_args.push(a),
                Err(e) => failures.push((index, e)),
            }
        }

        if failures.is_empty() {
            return self.generate_key(class, operation, &ok_args);
        }

        for (index, error) in &failures {
            warn!(
                class,
                operation,
                arg_index = index,
                %error,
                "argument canonicalization failed, using degraded cache key"
            );
        }
        self.degraded_key(class, operation, ok_args.len() + failures.len(), &failures)
    }

    /// Structural-hash fallback key for unserializable argument lists
    fn degraded_key(
        &self,
        class: &str,
        operation: &str,
        arg_count: usize,
        failures: &[(usize, Error)],
    ) -> String {
        let mut structural = format!("{}#{}#{}", class, operation, arg_count);
        for (index, _) in failures {
            structural.push_str(&format!("#!{}", index));
        }
        format!(
            "{}:{}:{}:deg-{}",
            self.namespace,
            class,
            operation,
            param_hash(structural.as_bytes())
        )
    }

    /// Glob pattern covering every key of one operation
    pub fn generate_pattern(&self, class: &str, operation: &str) -> String {
        format!("{}:{}:{}:*", self.namespace, class, operation)
    }

    /// Key for a single entity, e.g. `customer:cust-1`
    pub fn generate_entity_key(&self, entity_type: &str, id: &str) -> String {
        format!("{}:{}", entity_type, id)
    }

    /// Key for an entity collection, e.g. `order:list:cust-1`
    pub fn generate_collection_key(&self, entity_type: &str, qualifier: &str) -> String {
        format!("{}:list:{}", entity_type, qualifier)
    }

    /// Key for a precomputed aggregate, e.g. `revenue:aggregate:monthly:2026-08`
    pub fn generate_aggregate_key(
        &self,
        entity_type: &str,
        kind: &str,
        qualifier: &str,
    ) -> String {
        format!("{}:aggregate:{}:{}", entity_type, kind, qualifier)
    }
}

/// First 12 base64url characters of the SHA-256 digest
fn param_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut encoded = URL_SAFE_NO_PAD.encode(digest);
    encoded.truncate(PARAM_HASH_LEN);
    encoded
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> KeyCodec {
        KeyCodec::new("app")
    }

    #[test]
    fn test_no_params_key() {
        let key = codec().generate_key("OrderService", "list_all", &[]);
        assert_eq!(key, "app:OrderService:list_all:no-params");
    }

    #[test]
    fn test_key_shape() {
        let key = codec().generate_key(
            "OrderService",
            "find_by_customer",
            &["cust-1".to_key_arg()],
        );
        let parts: Vec<&str> = key.split(':').collect();
        assert_eq!(parts[0], "app");
        assert_eq!(parts[1], "OrderService");
        assert_eq!(parts[2], "find_by_customer");
        assert_eq!(parts[3].len(), PARAM_HASH_LEN);
    }

    #[test]
    fn test_key_determinism() {
        let args = vec![
            "cust-1".to_key_arg(),
            42i64.to_key_arg(),
            vec!["a".to_string(), "b".to_string()].to_key_arg(),
        ];
        let k1 = codec().generate_key("Svc", "op", &args);
        let k2 = codec().generate_key("Svc", "op", &args);
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_different_args_yield_different_keys() {
        let k1 = codec().generate_key("Svc", "op", &["param1".to_key_arg()]);
        let k2 = codec().generate_key("Svc", "op", &["param2".to_key_arg()]);
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_map_order_does_not_leak_into_key() {
        let forward = KeyArg::Map(vec![
            ("alpha".to_string(), KeyArg::Int(1)),
            ("beta".to_string(), KeyArg::Int(2)),
            ("gamma".to_string(), KeyArg::Int(3)),
        ]);
        let reversed = KeyArg::Map(vec![
            ("gamma".to_string(), KeyArg::Int(3)),
            ("beta".to_string(), KeyArg::Int(2)),
            ("alpha".to_string(), KeyArg::Int(1)),
        ]);

        let k1 = codec().generate_key("Svc", "op", &[forward]);
        let k2 = codec().generate_key("Svc", "op", &[reversed]);
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_canonical_rendering() {
        let mut out = String::new();
        KeyArg::Seq(vec![
            KeyArg::Int(1),
            KeyArg::Str("x".into()),
            KeyArg::Map(vec![
                ("b".into(), KeyArg::Bool(true)),
                ("a".into(), KeyArg::Null),
            ]),
        ])
        .render(&mut out);
        assert_eq!(out, "[1,x,{a=null,b=true}]");
    }

    #[test]
    fn test_from_serialize_structured_value() {
        #[derive(Serialize)]
        struct Query {
            customer: String,
            page: u32,
        }

        let arg = KeyArg::from_serialize(&Query {
            customer: "cust-1".into(),
            page: 3,
        })
        .unwrap();

        let k1 = codec().generate_key("Svc", "op", &[arg.clone()]);
        let k2 = codec().generate_key("Svc", "op", &[arg]);
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_checked_key_without_failures() {
        let key = codec().generate_key_checked(
            "Svc",
            "op",
            vec![Ok("a".to_key_arg()), Ok(1i64.to_key_arg())],
        );
        assert!(!key.contains("deg-"));
        assert_eq!(
            key,
            codec().generate_key("Svc", "op", &["a".to_key_arg(), 1i64.to_key_arg()])
        );
    }

    #[test]
    fn test_checked_key_degrades_on_failure() {
        let key = codec().generate_key_checked(
            "Svc",
            "op",
            vec![
                Ok("a".to_key_arg()),
                Err(Error::Serialization("unsupported".into())),
            ],
        );
        assert!(key.starts_with("app:Svc:op:deg-"));

        // Same failure shape degrades to the same key
        let again = codec().generate_key_checked(
            "Svc",
            "op",
            vec![
                Ok("b".to_key_arg()),
                Err(Error::Serialization("unsupported".into())),
            ],
        );
        assert_eq!(key, again);
    }

    #[test]
    fn test_structured_key_builders() {
        let codec = codec();
        assert_eq!(codec.generate_entity_key("customer", "cust-1"), "customer:cust-1");
        assert_eq!(
            codec.generate_collection_key("order", "cust-1"),
            "order:list:cust-1"
        );
        assert_eq!(
            codec.generate_aggregate_key("revenue", "monthly", "2026-08"),
            "revenue:aggregate:monthly:2026-08"
        );
        assert_eq!(codec.generate_pattern("Svc", "op"), "app:Svc:op:*");
    }

    #[test]
    fn test_hash_is_url_safe() {
        let key = codec().generate_key("Svc", "op", &["payload".to_key_arg()]);
        let hash = key.rsplit(':').next().unwrap();
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_key_arg() -> impl Strategy<Value = KeyArg> {
        let leaf = prop_oneof![
            Just(KeyArg::Null),
            any::<bool>().prop_map(KeyArg::Bool),
            any::<i64>().prop_map(KeyArg::Int),
            any::<u64>().prop_map(KeyArg::Uint),
            "[a-z0-9:-]{0,16}".prop_map(KeyArg::Str),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(KeyArg::Seq),
                prop::collection::vec(("[a-z]{1,6}", inner), 0..4).prop_map(KeyArg::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_key_is_deterministic(args in prop::collection::vec(arb_key_arg(), 0..4)) {
            let codec = KeyCodec::new("app");
            let k1 = codec.generate_key("Svc", "op", &args);
            let k2 = codec.generate_key("Svc", "op", &args);
            prop_assert_eq!(k1, k2);
        }

        #[test]
        fn prop_map_shuffle_preserves_key(
            entries in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 1..8)
        ) {
            let codec = KeyCodec::new("app");
            let entries: Vec<(String, KeyArg)> = entries
                .into_iter()
                .map(|(k, v)| (k, KeyArg::Int(v)))
                .collect();
            let mut reversed_entries = entries.clone();
            reversed_entries.reverse();
            prop_assert_eq!(
                codec.generate_key("Svc", "op", &[KeyArg::Map(entries)]),
                codec.generate_key("Svc", "op", &[KeyArg::Map(reversed_entries)])
            );
        }

        #[test]
        fn prop_key_has_fixed_shape(args in prop::collection::vec(arb_key_arg(), 0..4)) {
            let codec = KeyCodec::new("app");
            let key = codec.generate_key("Svc", "op", &args);
            prop_assert!(key.starts_with("app:Svc:op:"));
            let suffix = key.strip_prefix("app:Svc:op:").unwrap();
            if args.is_empty() {
                prop_assert_eq!(suffix, "no-params");
            } else {
                prop_assert_eq!(suffix.len(), 12);
            }
        }
    }
}
