//! Vertex state encodings.

use serde::{Deserialize, Serialize};

/// How vertex states are encoded in observations and assignment vectors.
///
/// Internally the environment always works with signed spins; `+1` is the
/// unflipped state in both encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexBasis {
    /// {0, 1}; 0 is unflipped.
    Binary,
    /// {+1, -1}; +1 is unflipped.
    #[default]
    Signed,
}

impl VertexBasis {
    /// Encoded value of a vertex that has not been flipped.
    pub fn unflipped(self) -> i8 {
        match self {
            VertexBasis::Binary => 0,
            VertexBasis::Signed => 1,
        }
    }

    /// Encode a signed spin in this basis.
    pub fn encode(self, spin: i8) -> i8 {
        match self {
            VertexBasis::Binary => {
                if spin > 0 {
                    0
                } else {
                    1
                }
            }
            VertexBasis::Signed => spin,
        }
    }

    /// Decode a basis value into a signed spin. Returns `None` for values outside the basis.
    pub fn decode(self, value: i8) -> Option<i8> {
        match (self, value) {
            (VertexBasis::Binary, 0) => Some(1),
            (VertexBasis::Binary, 1) => Some(-1),
            (VertexBasis::Signed, 1) => Some(1),
            (VertexBasis::Signed, -1) => Some(-1),
            _ => None,
        }
    }

    pub fn is_binary(self) -> bool {
        matches!(self, VertexBasis::Binary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_are_inverse() {
        for basis in [VertexBasis::Binary, VertexBasis::Signed] {
            for s in [1i8, -1] {
                assert_eq!(basis.decode(basis.encode(s)), Some(s));
            }
            assert_eq!(basis.decode(basis.unflipped()), Some(1));
        }
        assert_eq!(VertexBasis::Binary.decode(-1), None);
        assert_eq!(VertexBasis::Signed.decode(0), None);
    }
}
