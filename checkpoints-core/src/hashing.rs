//! Structural hashing of runtime values.
//!
//! Every value that participates in a checkpoint identity (arguments,
//! captured globals, function bodies, static overrides) is folded into a
//! [`StructuralHash`], a streaming blake3 digest over typed encodings.
//! Each value is encoded as a short type header followed by type-specific
//! content, so values of different shapes can never collide:
//! `(1, 2)` and `vec![1, 2]` produce different streams, as do
//! `BTreeMap` and `HashMap` with the same entries.
//!
//! Unordered containers are canonicalized before encoding: `BTreeMap` and
//! `BTreeSet` already iterate in key order, while `HashMap` and `HashSet`
//! entries are sorted by the digest of their keys and marked with a
//! distinct `unsortable` header.
//!
//! Custom types participate by implementing [`HashValue`]:
//!
//! ```
//! use checkpoints_core::{HashValue, StructuralHash};
//!
//! struct Point { x: i64, y: i64 }
//!
//! impl HashValue for Point {
//!     fn hash_value(&self, h: &mut StructuralHash) {
//!         h.write_header("instance:Point");
//!         self.x.hash_value(h);
//!         self.y.hash_value(h);
//!     }
//! }
//!
//! let mut h = StructuralHash::new();
//! Point { x: 1, y: 2 }.hash_value(&mut h);
//! assert_eq!(h.ident_digest().len(), 32);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::BuildHasher;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Streaming structural digest.
///
/// Wraps a [`blake3::Hasher`] and exposes two digest widths: the full
/// 64-hex-character form from [`hexdigest`](Self::hexdigest) and the
/// 32-hex-character (128-bit) identity form from
/// [`ident_digest`](Self::ident_digest) used for function and call hashes.
///
/// A hasher created with [`tolerant`](Self::tolerant) is used when folding
/// captured values whose encoding may legitimately fail; failures are
/// recorded in the stream with [`error_marker`](Self::error_marker) instead
/// of aborting the whole digest.
pub struct StructuralHash {
    hasher: blake3::Hasher,
    tolerant: bool,
}

impl StructuralHash {
    pub fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
            tolerant: false,
        }
    }

    /// A hasher that records per-item encoding failures instead of
    /// propagating them.
    pub fn tolerant() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
            tolerant: true,
        }
    }

    pub fn is_tolerant(&self) -> bool {
        self.tolerant
    }

    /// Feeds one value into the stream.
    pub fn update<T: HashValue + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.hash_value(self);
        self
    }

    /// Writes a type header. Headers are NUL-terminated so that adjacent
    /// headers and payloads cannot be reassociated.
    pub fn write_header(&mut self, header: &str) {
        self.hasher.update(header.as_bytes());
        self.hasher.update(b"\0");
    }

    /// Writes raw payload bytes with no header.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Writes a string payload with no header.
    pub fn write_str(&mut self, s: &str) {
        self.hasher.update(s.as_bytes());
    }

    /// Records that an item could not be encoded.
    pub fn error_marker(&mut self, kind: &str) {
        self.write_header("error");
        self.write_header(kind);
    }

    /// Full digest, 64 hex characters.
    pub fn hexdigest(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }

    /// Identity digest, 32 hex characters (128 bits). This is the width
    /// used for `fn_hash` and `call_hash`.
    pub fn ident_digest(&self) -> String {
        let mut hex = self.hexdigest();
        hex.truncate(32);
        hex
    }
}

impl Default for StructuralHash {
    fn default() -> Self {
        Self::new()
    }
}

/// A value that can be folded into a [`StructuralHash`].
pub trait HashValue {
    fn hash_value(&self, h: &mut StructuralHash);
}

/// Identity digest of a single value.
pub fn digest_of<T: HashValue + ?Sized>(value: &T) -> String {
    let mut h = StructuralHash::new();
    value.hash_value(&mut h);
    h.ident_digest()
}

impl HashValue for () {
    fn hash_value(&self, h: &mut StructuralHash) {
        h.write_header("null");
    }
}

impl HashValue for bool {
    fn hash_value(&self, h: &mut StructuralHash) {
        h.write_header(if *self { "number:bool:true" } else { "number:bool:false" });
    }
}

macro_rules! impl_hash_value_int {
    ($($ty:ty),* $(,)?) => {
        $(impl HashValue for $ty {
            fn hash_value(&self, h: &mut StructuralHash) {
                h.write_header(&format!(concat!("number:", stringify!($ty), ":{}"), self));
            }
        })*
    };
}

impl_hash_value_int!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

macro_rules! impl_hash_value_float {
    ($($ty:ty),* $(,)?) => {
        $(impl HashValue for $ty {
            fn hash_value(&self, h: &mut StructuralHash) {
                // {:?} keeps NaN/inf distinguishable and round-trips precision
                h.write_header(&format!(concat!("number:", stringify!($ty), ":{:?}"), self));
            }
        })*
    };
}

impl_hash_value_float!(f32, f64);

impl HashValue for char {
    fn hash_value(&self, h: &mut StructuralHash) {
        h.write_header(&format!("number:char:{}", *self as u32));
    }
}

impl HashValue for str {
    fn hash_value(&self, h: &mut StructuralHash) {
        h.write_header(&format!("bytes:str:{}", self.len()));
        h.write_bytes(self.as_bytes());
    }
}

impl HashValue for String {
    fn hash_value(&self, h: &mut StructuralHash) {
        self.as_str().hash_value(h);
    }
}

impl HashValue for Path {
    fn hash_value(&self, h: &mut StructuralHash) {
        let s = self.to_string_lossy();
        h.write_header(&format!("bytes:path:{}", s.len()));
        h.write_bytes(s.as_bytes());
    }
}

impl HashValue for PathBuf {
    fn hash_value(&self, h: &mut StructuralHash) {
        self.as_path().hash_value(h);
    }
}

impl HashValue for Duration {
    fn hash_value(&self, h: &mut StructuralHash) {
        h.write_header(&format!("number:duration:{}.{:09}", self.as_secs(), self.subsec_nanos()));
    }
}

impl HashValue for SystemTime {
    fn hash_value(&self, h: &mut StructuralHash) {
        match self.duration_since(UNIX_EPOCH) {
            Ok(d) => h.write_header(&format!("number:systemtime:{}.{:09}", d.as_secs(), d.subsec_nanos())),
            Err(_) => h.write_header("number:systemtime:pre-epoch"),
        }
    }
}

impl<T: HashValue + ?Sized> HashValue for &T {
    fn hash_value(&self, h: &mut StructuralHash) {
        (**self).hash_value(h);
    }
}

impl<T: HashValue + ?Sized> HashValue for Box<T> {
    fn hash_value(&self, h: &mut StructuralHash) {
        (**self).hash_value(h);
    }
}

impl<T: HashValue + ?Sized> HashValue for Rc<T> {
    fn hash_value(&self, h: &mut StructuralHash) {
        (**self).hash_value(h);
    }
}

impl<T: HashValue + ?Sized> HashValue for Arc<T> {
    fn hash_value(&self, h: &mut StructuralHash) {
        (**self).hash_value(h);
    }
}

impl<T: HashValue> HashValue for Option<T> {
    fn hash_value(&self, h: &mut StructuralHash) {
        match self {
            None => h.write_header("option:none"),
            Some(v) => {
                h.write_header("option:some");
                v.hash_value(h);
            }
        }
    }
}

impl<T: HashValue, E: HashValue> HashValue for Result<T, E> {
    fn hash_value(&self, h: &mut StructuralHash) {
        match self {
            Ok(v) => {
                h.write_header("result:ok");
                v.hash_value(h);
            }
            Err(e) => {
                h.write_header("result:err");
                e.hash_value(h);
            }
        }
    }
}

impl<T: HashValue> HashValue for [T] {
    fn hash_value(&self, h: &mut StructuralHash) {
        h.write_header(&format!("list:slice:{}", self.len()));
        for item in self {
            item.hash_value(h);
        }
    }
}

impl<T: HashValue, const N: usize> HashValue for [T; N] {
    fn hash_value(&self, h: &mut StructuralHash) {
        h.write_header(&format!("list:array:{}", N));
        for item in self {
            item.hash_value(h);
        }
    }
}

impl<T: HashValue> HashValue for Vec<T> {
    fn hash_value(&self, h: &mut StructuralHash) {
        h.write_header(&format!("list:vec:{}", self.len()));
        for item in self {
            item.hash_value(h);
        }
    }
}

macro_rules! impl_hash_value_tuple {
    ($len:literal => $($name:ident : $idx:tt),+) => {
        impl<$($name: HashValue),+> HashValue for ($($name,)+) {
            fn hash_value(&self, h: &mut StructuralHash) {
                h.write_header(concat!("list:tuple:", $len));
                $(self.$idx.hash_value(h);)+
            }
        }
    };
}

impl_hash_value_tuple!(1 => A:0);
impl_hash_value_tuple!(2 => A:0, B:1);
impl_hash_value_tuple!(3 => A:0, B:1, C:2);
impl_hash_value_tuple!(4 => A:0, B:1, C:2, D:3);
impl_hash_value_tuple!(5 => A:0, B:1, C:2, D:3, E:4);
impl_hash_value_tuple!(6 => A:0, B:1, C:2, D:3, E:4, F:5);
impl_hash_value_tuple!(7 => A:0, B:1, C:2, D:3, E:4, F:5, G:6);
impl_hash_value_tuple!(8 => A:0, B:1, C:2, D:3, E:4, F:5, G:6, H:7);

impl<K: HashValue, V: HashValue> HashValue for BTreeMap<K, V> {
    fn hash_value(&self, h: &mut StructuralHash) {
        h.write_header(&format!("dict:btreemap:{}", self.len()));
        for (key, value) in self {
            key.hash_value(h);
            value.hash_value(h);
        }
    }
}

impl<K: HashValue, V: HashValue, S: BuildHasher> HashValue for HashMap<K, V, S> {
    fn hash_value(&self, h: &mut StructuralHash) {
        h.write_header(&format!("dict-unsortable:hashmap:{}", self.len()));
        let mut entries: Vec<(String, (&K, &V))> = self
            .iter()
            .map(|(k, v)| (digest_of(k), (k, v)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, (key, value)) in entries {
            key.hash_value(h);
            value.hash_value(h);
        }
    }
}

impl<T: HashValue> HashValue for BTreeSet<T> {
    fn hash_value(&self, h: &mut StructuralHash) {
        h.write_header(&format!("set:btreeset:{}", self.len()));
        for item in self {
            item.hash_value(h);
        }
    }
}

impl<T: HashValue, S: BuildHasher> HashValue for HashSet<T, S> {
    fn hash_value(&self, h: &mut StructuralHash) {
        h.write_header(&format!("set-unsortable:hashset:{}", self.len()));
        let mut entries: Vec<(String, &T)> = self.iter().map(|v| (digest_of(v), v)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, item) in entries {
            item.hash_value(h);
        }
    }
}
