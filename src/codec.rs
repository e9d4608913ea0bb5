
use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{Error, Result};

/// Growable output buffer for marshaling typed values, little-endian
/// throughout. Mirrors the per-type `write_*` methods of a hand-rolled
/// binary encoder rather than a reflection-driven one: the Rust type system
/// already knows the shape of each value at the call site.
#[derive(Default)]
pub struct Encoder {
    out: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    pub fn write_bool(&mut self, v: bool) {
        self.out.push(if v { 1 } else { 0 });
    }

    pub fn write_i32(&mut self, v: i32) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_i32(s.len() as i32);
        self.out.extend_from_slice(s.as_bytes());
    }

    pub fn write_bytes(&mut self, b: &[u8]) {
        self.write_i64(b.len() as i64);
        self.out.extend_from_slice(b);
    }

    pub fn write_seq<T: Encode>(&mut self, items: &[T]) {
        self.write_i64(items.len() as i64);
        for item in items {
            item.encode(self);
        }
    }

    pub fn write_map<K: Encode + Eq + Hash, V: Encode>(&mut self, m: &HashMap<K, V>) {
        self.write_i64(m.len() as i64);
        for (k, v) in m {
            k.encode(self);
            v.encode(self);
        }
    }
}

/// Cursor over an immutable byte slice, raising [`Error::Eof`] on underrun.
pub struct Decoder<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder { buf, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.offset + n > self.buf.len() {
            return Err(Error::Eof);
        }
        let s = &self.buf[self.offset..self.offset + n];
        self.offset += n;
        Ok(s)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.take(1)?[0] != 0)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let b = self.take(8)?;
        let mut a = [0u8; 8];
        a.copy_from_slice(b);
        Ok(i64::from_le_bytes(a))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut a = [0u8; 8];
        a.copy_from_slice(b);
        Ok(u64::from_le_bytes(a))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let b = self.take(8)?;
        let mut a = [0u8; 8];
        a.copy_from_slice(b);
        Ok(f64::from_le_bytes(a))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_i32()? as usize;
        let b = self.take(len)?;
        String::from_utf8(b.to_vec()).map_err(|e| Error::Other(e.to_string()))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_i64()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_seq<T: Decode>(&mut self) -> Result<Vec<T>> {
        let len = self.read_i64()? as usize;
        let mut v = Vec::with_capacity(len);
        for _ in 0..len {
            v.push(T::decode(self)?);
        }
        Ok(v)
    }

    pub fn read_map<K: Decode + Eq + Hash, V: Decode>(&mut self) -> Result<HashMap<K, V>> {
        let len = self.read_i64()? as usize;
        let mut m = HashMap::with_capacity(len);
        for _ in 0..len {
            let k = K::decode(self)?;
            let v = V::decode(self)?;
            m.insert(k, v);
        }
        Ok(m)
    }
}

/// Implemented by every wire type: scalars, strings, byte sequences, and
/// records. Records write a leading `is_null` bool followed by each field in
/// declared order; scalars write their raw representation with no tag.
pub trait Encode {
    fn encode(&self, e: &mut Encoder);
}

pub trait Decode: Sized {
    fn decode(d: &mut Decoder) -> Result<Self>;
}

impl Encode for bool {
    fn encode(&self, e: &mut Encoder) {
        e.write_bool(*self);
    }
}
impl Decode for bool {
    fn decode(d: &mut Decoder) -> Result<Self> {
        d.read_bool()
    }
}

impl Encode for i32 {
    fn encode(&self, e: &mut Encoder) {
        e.write_i32(*self);
    }
}
impl Decode for i32 {
    fn decode(d: &mut Decoder) -> Result<Self> {
        d.read_i32()
    }
}

impl Encode for i64 {
    fn encode(&self, e: &mut Encoder) {
        e.write_i64(*self);
    }
}
impl Decode for i64 {
    fn decode(d: &mut Decoder) -> Result<Self> {
        d.read_i64()
    }
}

impl Encode for u32 {
    fn encode(&self, e: &mut Encoder) {
        e.write_u32(*self);
    }
}
impl Decode for u32 {
    fn decode(d: &mut Decoder) -> Result<Self> {
        d.read_u32()
    }
}

impl Encode for u64 {
    fn encode(&self, e: &mut Encoder) {
        e.write_u64(*self);
    }
}
impl Decode for u64 {
    fn decode(d: &mut Decoder) -> Result<Self> {
        d.read_u64()
    }
}

impl Encode for f32 {
    fn encode(&self, e: &mut Encoder) {
        e.write_f32(*self);
    }
}
impl Decode for f32 {
    fn decode(d: &mut Decoder) -> Result<Self> {
        d.read_f32()
    }
}

impl Encode for f64 {
    fn encode(&self, e: &mut Encoder) {
        e.write_f64(*self);
    }
}
impl Decode for f64 {
    fn decode(d: &mut Decoder) -> Result<Self> {
        d.read_f64()
    }
}

impl Encode for String {
    fn encode(&self, e: &mut Encoder) {
        e.write_string(self);
    }
}
impl Decode for String {
    fn decode(d: &mut Decoder) -> Result<Self> {
        d.read_string()
    }
}

/// A homogeneous sequence is itself a wire type, not just an `Encoder`
/// convenience method -- this lets response bodies that are bare sequences
/// (`FindFlights` -> `Vec<Flight>`) round-trip through `marshal`/`unmarshal`
/// the same way a record does.
impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, e: &mut Encoder) {
        e.write_seq(self);
    }
}
impl<T: Decode> Decode for Vec<T> {
    fn decode(d: &mut Decoder) -> Result<Self> {
        d.read_seq()
    }
}

impl<K: Encode + Eq + Hash, V: Encode> Encode for HashMap<K, V> {
    fn encode(&self, e: &mut Encoder) {
        e.write_map(self);
    }
}
impl<K: Decode + Eq + Hash, V: Decode> Decode for HashMap<K, V> {
    fn decode(d: &mut Decoder) -> Result<Self> {
        d.read_map()
    }
}

/// Marshals a single top-level value.
pub fn marshal<T: Encode>(v: &T) -> Vec<u8> {
    let mut e = Encoder::new();
    v.encode(&mut e);
    e.into_bytes()
}

/// Unmarshals a single top-level value of type `T`. `T` is the statically
/// typed analogue of the reference implementation's runtime "prototype"
/// value: the caller's declared type fills the same role a sample instance
/// fills in a dynamically typed decoder.
pub fn unmarshal<T: Decode>(buf: &[u8]) -> Result<T> {
    let mut d = Decoder::new(buf);
    T::decode(&mut d)
}
