//! Integer encodings of D8 drainage directions.
//!
//! Two conventions are common:
//!
//! | Direction | GRASS | ESRI |
//! |-----------|-------|------|
//! | NE        | 1     | 128  |
//! | N         | 2     | 64   |
//! | NW        | 3     | 32   |
//! | W         | 4     | 16   |
//! | SW        | 5     | 8    |
//! | S         | 6     | 4    |
//! | SE        | 7     | 2    |
//! | E         | 8     | 1    |
//!
//! Both use 0 for a cell without an outflow. GRASS marks cells whose flow
//! leaves the region with a negative code; the absolute value is the
//! direction.

use lfp_pipeline::Direction;
use serde::{Deserialize, Serialize};

/// How direction codes are stored in a grid file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DirectionEncoding {
    /// GRASS `r.watershed` codes, counter-clockwise from north-east.
    #[default]
    Grass,
    /// ESRI power-of-two codes, clockwise from east.
    Esri,
}

/// A code with no meaning in the selected encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownCode(pub i32);

/// ESRI codes in [`Direction::ALL`] order.
const ESRI_CODES: [(Direction, i32); 8] = [
    (Direction::NorthEast, 128),
    (Direction::North, 64),
    (Direction::NorthWest, 32),
    (Direction::West, 16),
    (Direction::SouthWest, 8),
    (Direction::South, 4),
    (Direction::SouthEast, 2),
    (Direction::East, 1),
];

impl DirectionEncoding {
    /// Decode a stored code. `Ok(None)` means no outflow.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownCode`] for codes outside the encoding.
    pub fn decode(self, code: i32) -> Result<Option<Direction>, UnknownCode> {
        if code == 0 {
            return Ok(None);
        }
        let direction = match self {
            Self::Grass => Direction::from_code(code),
            Self::Esri => ESRI_CODES
                .iter()
                .find(|&&(_, c)| c == code)
                .map(|&(d, _)| d),
        };
        direction.map(Some).ok_or(UnknownCode(code))
    }

    /// Encode a direction, 0 for none.
    #[must_use]
    pub fn encode(self, direction: Option<Direction>) -> i32 {
        let Some(direction) = direction else {
            return 0;
        };
        match self {
            Self::Grass => direction.code(),
            Self::Esri => ESRI_CODES
                .iter()
                .find(|&&(d, _)| d == direction)
                .map_or(0, |&(_, c)| c),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn grass_accepts_negative_edge_codes() {
        let enc = DirectionEncoding::Grass;
        assert_eq!(enc.decode(2), Ok(Some(Direction::North)));
        assert_eq!(enc.decode(-2), Ok(Some(Direction::North)));
        assert_eq!(enc.decode(0), Ok(None));
        assert_eq!(enc.decode(9), Err(UnknownCode(9)));
    }

    #[test]
    fn esri_powers_of_two() {
        let enc = DirectionEncoding::Esri;
        assert_eq!(enc.decode(1), Ok(Some(Direction::East)));
        assert_eq!(enc.decode(128), Ok(Some(Direction::NorthEast)));
        assert_eq!(enc.decode(3), Err(UnknownCode(3)));
        assert_eq!(enc.decode(-1), Err(UnknownCode(-1)));
    }

    #[test]
    fn encodings_agree_on_directions() {
        for d in Direction::ALL {
            let grass = DirectionEncoding::Grass.encode(Some(d));
            let esri = DirectionEncoding::Esri.encode(Some(d));
            assert_eq!(DirectionEncoding::Grass.decode(grass).unwrap(), Some(d));
            assert_eq!(DirectionEncoding::Esri.decode(esri).unwrap(), Some(d));
        }
        assert_eq!(DirectionEncoding::Esri.encode(None), 0);
    }
}
