//! Canonical content keys.
//!
//! A content key is an order-stable text rendering of everything that
//! changes what a node computes. Two nodes with equal keys are
//! interchangeable for caching. Canvas layout, validity state, edit
//! permissions and mirror sync bookkeeping are not part of the key.
//!
//! Keys look like `join{subtables=["a","b"];operators=[...]}`: a tag, then
//! `name=value` fields separated by `;`. Strings are quoted and escaped,
//! floats use the shortest round-trip form.

mod impls;

use crate::cache::hash_text;
use crate::model::Value;

/// Writes one canonical key.
#[derive(Debug)]
pub struct KeyWriter {
    out: String,
    first: bool,
}

impl Default for KeyWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyWriter {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            first: true,
        }
    }

    fn separate(&mut self) {
        if !self.first {
            self.out.push(';');
        }
        self.first = false;
    }

    fn name(&mut self, name: &str) {
        self.separate();
        self.out.push_str(name);
        self.out.push('=');
    }

    fn quoted(&mut self, s: &str) {
        self.out.push('"');
        for c in s.chars() {
            if c == '"' || c == '\\' {
                self.out.push('\\');
            }
            self.out.push(c);
        }
        self.out.push('"');
    }

    /// Open a tagged object; fields follow until [`end`](Self::end).
    pub fn begin(&mut self, tag: &str) {
        self.out.push_str(tag);
        self.out.push('{');
        self.first = true;
    }

    pub fn end(&mut self) {
        self.out.push('}');
        self.first = false;
    }

    pub fn str(&mut self, name: &str, value: &str) {
        self.name(name);
        self.quoted(value);
    }

    pub fn opt_str(&mut self, name: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.str(name, value);
        }
    }

    /// A bare token such as an enum name.
    pub fn token(&mut self, name: &str, value: &str) {
        self.name(name);
        self.out.push_str(value);
    }

    pub fn int(&mut self, name: &str, value: i64) {
        self.name(name);
        self.out.push_str(&value.to_string());
    }

    pub fn float(&mut self, name: &str, value: f64) {
        self.name(name);
        self.raw_float(value);
    }

    fn raw_float(&mut self, value: f64) {
        let mut buf = ryu::Buffer::new();
        self.out.push_str(buf.format(value));
    }

    /// A flag, written only when set.
    pub fn flag(&mut self, name: &str, value: bool) {
        if value {
            self.name(name);
            self.out.push('1');
        }
    }

    pub fn value(&mut self, name: &str, value: &Value) {
        self.name(name);
        self.raw_value(value);
    }

    fn raw_value(&mut self, value: &Value) {
        match value {
            Value::Null => self.out.push_str("null"),
            Value::Bool(b) => self.out.push_str(if *b { "b:1" } else { "b:0" }),
            Value::Int(i) => {
                self.out.push_str("i:");
                self.out.push_str(&i.to_string());
            }
            Value::Float(f) => {
                self.out.push_str("f:");
                self.raw_float(*f);
            }
            Value::String(s) => {
                self.out.push_str("s:");
                self.quoted(s);
            }
            Value::Date(d) => {
                self.out.push_str("d:");
                self.out.push_str(&d.format("%Y-%m-%d").to_string());
            }
            Value::Timestamp(t) => {
                self.out.push_str("t:");
                self.out.push_str(&t.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
            }
        }
    }

    pub fn values(&mut self, name: &str, values: &[Value]) {
        self.name(name);
        self.out.push('[');
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                self.out.push(',');
            }
            self.raw_value(v);
        }
        self.out.push(']');
    }

    pub fn strs<'a>(&mut self, name: &str, values: impl IntoIterator<Item = &'a str>) {
        self.name(name);
        self.out.push('[');
        for (i, v) in values.into_iter().enumerate() {
            if i > 0 {
                self.out.push(',');
            }
            self.quoted(v);
        }
        self.out.push(']');
    }

    /// A nested object.
    pub fn object<T: ContentKey + ?Sized>(&mut self, name: &str, value: &T) {
        self.name(name);
        value.write_key(self);
    }

    pub fn opt_object<T: ContentKey>(&mut self, name: &str, value: Option<&T>) {
        if let Some(value) = value {
            self.object(name, value);
        }
    }

    /// A list of objects; empty lists are omitted.
    pub fn list<'a, T: ContentKey + 'a>(&mut self, name: &str, items: impl IntoIterator<Item = &'a T>) {
        let mut items = items.into_iter().peekable();
        if items.peek().is_none() {
            return;
        }
        self.name(name);
        self.out.push('[');
        for (i, item) in items.enumerate() {
            if i > 0 {
                self.out.push(',');
            }
            item.write_key(self);
        }
        self.out.push(']');
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// Objects with a canonical content key.
pub trait ContentKey {
    fn write_key(&self, w: &mut KeyWriter);

    fn content_key(&self) -> String {
        let mut w = KeyWriter::new();
        self.write_key(&mut w);
        w.finish()
    }

    /// SHA-256 of the content key, as lowercase hex.
    fn content_digest(&self) -> String {
        hash_text(&self.content_key())
    }
}
