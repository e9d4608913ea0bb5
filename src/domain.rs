
use crate::codec::{Decode, Decoder, Encode, Encoder};
use crate::error::Result;

/// Field order here is the wire layout; it must match the server's
/// declaration order exactly, not Rust's usual alphabetical-looking style.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flight {
    pub id: i64,
    pub source: String,
    pub destination: String,
    pub airfare: f64,
    pub seat_availability: i32,
    pub timestamp: i64,
}

impl Encode for Flight {
    fn encode(&self, e: &mut Encoder) {
        e.write_bool(false);
        e.write_i64(self.id);
        self.source.encode(e);
        self.destination.encode(e);
        e.write_f64(self.airfare);
        e.write_i32(self.seat_availability);
        e.write_i64(self.timestamp);
    }
}

impl Decode for Flight {
    fn decode(d: &mut Decoder) -> Result<Self> {
        let is_null = d.read_bool()?;
        if is_null {
            return Ok(Flight::default());
        }
        Ok(Flight {
            id: d.read_i64()?,
            source: String::decode(d)?,
            destination: String::decode(d)?,
            airfare: d.read_f64()?,
            seat_availability: d.read_i32()?,
            timestamp: d.read_i64()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Food {
    pub id: i64,
    pub name: String,
}

impl Encode for Food {
    fn encode(&self, e: &mut Encoder) {
        e.write_bool(false);
        e.write_i64(self.id);
        self.name.encode(e);
    }
}

impl Decode for Food {
    fn decode(d: &mut Decoder) -> Result<Self> {
        let is_null = d.read_bool()?;
        if is_null {
            return Ok(Food::default());
        }
        Ok(Food {
            id: d.read_i64()?,
            name: String::decode(d)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReserveFlight {
    pub id: String,
    pub flight: Flight,
    pub seats_reserved: i32,
    pub check_in: bool,
    pub cancelled: bool,
    pub meals: Vec<Food>,
}

impl Encode for ReserveFlight {
    fn encode(&self, e: &mut Encoder) {
        e.write_bool(false);
        self.id.encode(e);
        self.flight.encode(e);
        e.write_i32(self.seats_reserved);
        e.write_bool(self.check_in);
        e.write_bool(self.cancelled);
        e.write_seq(&self.meals);
    }
}

impl Decode for ReserveFlight {
    fn decode(d: &mut Decoder) -> Result<Self> {
        let is_null = d.read_bool()?;
        if is_null {
            return Ok(ReserveFlight::default());
        }
        Ok(ReserveFlight {
            id: String::decode(d)?,
            flight: Flight::decode(d)?,
            seats_reserved: d.read_i32()?,
            check_in: d.read_bool()?,
            cancelled: d.read_bool()?,
            meals: d.read_seq()?,
        })
    }
}
