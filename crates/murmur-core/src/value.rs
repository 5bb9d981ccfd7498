//! Typed payload values.
//!
//! Publications carry opaque bytes. These are the structured values that
//! applications most often put in them: numbers and strings use the field
//! encodings from `wire`, the geometric types are their fields in order.

use bytes::{Buf, BufMut};

use crate::wire::{Wire, WireError};

/// Planar vector. Wire size: 8 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

/// Spatial vector. Wire size: 12 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Geographic position in degrees. Wire size: 16 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Vector2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Vector3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl Wire for Vector2 {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), WireError> {
        self.x.encode(buf)?;
        self.y.encode(buf)
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        Ok(Self {
            x: f32::decode(buf)?,
            y: f32::decode(buf)?,
        })
    }
}

impl Wire for Vector3 {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), WireError> {
        self.x.encode(buf)?;
        self.y.encode(buf)?;
        self.z.encode(buf)
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        Ok(Self {
            x: f32::decode(buf)?,
            y: f32::decode(buf)?,
            z: f32::decode(buf)?,
        })
    }
}

impl Wire for Coordinate {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), WireError> {
        self.latitude.encode(buf)?;
        self.longitude.encode(buf)
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        Ok(Self {
            latitude: f64::decode(buf)?,
            longitude: f64::decode(buf)?,
        })
    }
}
