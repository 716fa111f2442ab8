//! Define [`Nibbles`] and how to convert bytes, hex prefix encodings and
//! strings into nibbles.
use std::{
    fmt::{self, Debug, Display, LowerHex, UpperHex},
    ops::Range,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::is_even;

// Use a whole byte for a Nibble just for convenience
/// A Nibble has 4 bits and is stored as `u8`.
pub type Nibble = u8;

const SINGLE_NIBBLE_APPEND_ASSERT_ERR_MSG: &str =
    "Attempted to append a single nibble that was greater than 15!";

/// Flag nibble bits of the hex prefix encoding.
const HP_FLAG_ODD: u8 = 0b01;
const HP_FLAG_LEAF: u8 = 0b10;

#[derive(Clone, Debug, Eq, Error, PartialEq, Hash)]
/// Errors encountered when converting to hex prefix encoding to nibbles.
pub enum FromHexPrefixError {
    #[error("Tried to convert a hex prefix byte string into `Nibbles` with invalid flags at the start: {0:#04b}")]
    /// The hex prefix encoding flag is invalid.
    InvalidFlags(Nibble),

    #[error("Tried to convert an empty hex prefix byte string into `Nibbles`")]
    /// There is not even a flag byte.
    Empty,

    #[error("Hex prefix encoding of an even path has a non-zero padding nibble: {0:#x}")]
    /// The padding nibble of an even length path must be zero.
    NonZeroPadding(Nibble),
}

/// An error encountered when converting a string to a sequence of nibbles.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("Invalid hex character {0:?} in nibble string")]
pub struct StrToNibblesError(pub char);

#[derive(Clone, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
/// A sequence of nibbles which is used as the key type when walking a trie.
///
/// Every byte of a key contributes two nibbles, high nibble first. Unlike
/// byte keys, `Nibbles` can hold an odd number of nibbles, which is what the
/// key pieces stored in leaf and extension nodes look like.
///
/// It's important to note that leading `0` nibbles are part of a key:
/// ```rust
/// # use patricia_trie::nibbles::Nibbles;
/// # use std::str::FromStr;
/// let n1 = Nibbles::from_str("0x123").unwrap();
/// let n2 = Nibbles::from_str("0x0123").unwrap();
///
/// assert_ne!(n1, n2); // These are different keys
/// ```
pub struct Nibbles {
    nibbles: Vec<Nibble>,
}

impl Display for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // By default, just use lower hex.
        <Self as LowerHex>::fmt(self, f)
    }
}

impl Debug for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nibbles")
            .field("count", &self.count())
            .field("packed", &format!("{self:x}"))
            .finish()
    }
}

impl FromStr for Nibbles {
    type Err = StrToNibblesError;

    /// Parses a hex string with or without a preceding "0x". Every character
    /// becomes exactly one nibble.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped_str = s.strip_prefix("0x").unwrap_or(s);

        let nibbles = stripped_str
            .chars()
            .map(|c| {
                c.to_digit(16)
                    .map(|d| d as Nibble)
                    .ok_or(StrToNibblesError(c))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { nibbles })
    }
}

impl LowerHex for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex_str(false))
    }
}

impl UpperHex for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex_str(true))
    }
}

impl From<&[u8]> for Nibbles {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes_be(bytes)
    }
}

impl From<Vec<u8>> for Nibbles {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes_be(&bytes)
    }
}

impl<const N: usize> From<&[u8; N]> for Nibbles {
    fn from(bytes: &[u8; N]) -> Self {
        Self::from_bytes_be(bytes)
    }
}

impl Nibbles {
    /// Creates `Nibbles` from big endian bytes. Each byte becomes two nibbles
    /// and an empty slice gives empty `Nibbles`.
    pub fn from_bytes_be(bytes: &[u8]) -> Self {
        let nibbles = bytes.iter().flat_map(|b| [b >> 4, b & 0xf]).collect();

        Self { nibbles }
    }

    /// Creates `Nibbles` directly from a slice of nibbles.
    ///
    /// # Panics
    /// Panics if any of the nibbles is > `0xf`.
    pub fn from_nibbles(nibs: &[Nibble]) -> Self {
        assert!(
            nibs.iter().all(|n| *n <= 0xf),
            "{}",
            SINGLE_NIBBLE_APPEND_ASSERT_ERR_MSG
        );

        Self {
            nibbles: nibs.to_vec(),
        }
    }

    /// Creates a new `Nibbles` from a single `Nibble`.
    ///
    /// # Panics
    /// Panics if the nibble is > `0xf`.
    pub fn from_nibble(n: Nibble) -> Self {
        assert!(n <= 0xf, "{}", SINGLE_NIBBLE_APPEND_ASSERT_ERR_MSG);

        Self { nibbles: vec![n] }
    }

    /// The number of nibbles in this sequence.
    pub fn count(&self) -> usize {
        self.nibbles.len()
    }

    /// Returns whether or not this `Nibbles` contains actual nibbles.
    pub fn is_empty(&self) -> bool {
        self.nibbles.is_empty()
    }

    /// The nibbles as a plain slice.
    pub fn as_slice(&self) -> &[Nibble] {
        &self.nibbles
    }

    /// Gets the nth proceeding nibble. The front `Nibble` is at idx `0`.
    ///
    /// # Panics
    /// Panics if `idx` is out of range.
    pub fn get_nibble(&self, idx: usize) -> Nibble {
        self.nibbles[idx]
    }

    /// Pops the nibble at the front (the next nibble).
    ///
    /// # Panics
    /// Panics if the `Nibbles` is empty.
    pub fn pop_next_nibble_front(&mut self) -> Nibble {
        self.nibbles.remove(0)
    }

    /// Pops the next `n` nibbles from the front.
    ///
    /// # Panics
    /// Panics if `n` is larger than the number of nibbles contained.
    pub fn pop_nibbles_front(&mut self, n: usize) -> Nibbles {
        Self {
            nibbles: self.nibbles.drain(..n).collect(),
        }
    }

    /// Pushes a nibble to the front.
    ///
    /// # Panics
    /// Panics if the nibble is > `0xf`.
    pub fn push_nibble_front(&mut self, n: Nibble) {
        assert!(n <= 0xf, "{}", SINGLE_NIBBLE_APPEND_ASSERT_ERR_MSG);
        self.nibbles.insert(0, n);
    }

    /// Pushes a nibble to the back.
    ///
    /// # Panics
    /// Panics if the nibble is > `0xf`.
    pub fn push_nibble_back(&mut self, n: Nibble) {
        assert!(n <= 0xf, "{}", SINGLE_NIBBLE_APPEND_ASSERT_ERR_MSG);
        self.nibbles.push(n);
    }

    /// Drops the last `n` nibbles in place. Dropping more nibbles than there
    /// are leaves the sequence empty.
    pub fn truncate_n_nibbles_back_mut(&mut self, n: usize) {
        let n = n.min(self.count());
        self.nibbles.truncate(self.count() - n);
    }

    /// Gets the nibbles at the range specified, where `0` is the next nibble.
    ///
    /// # Panics
    /// Panics if `range.end` is outside of the current `Nibbles`.
    pub fn get_nibble_range(&self, range: Range<usize>) -> Nibbles {
        Self {
            nibbles: self.nibbles[range].to_vec(),
        }
    }

    /// Drops the next `n` proceeding nibbles without mutation.
    ///
    /// If we truncate more nibbles that there are, we will just return the
    /// `empty` nibble.
    pub fn truncate_n_nibbles_front(&self, n: usize) -> Nibbles {
        let n = n.min(self.count());

        Self {
            nibbles: self.nibbles[n..].to_vec(),
        }
    }

    /// Returns `true` if `prefix` is a prefix of (or equal to) `self`.
    pub fn starts_with(&self, prefix: &Nibbles) -> bool {
        self.nibbles.starts_with(&prefix.nibbles)
    }

    /// Splits the `Nibbles` at the given index, returning two `Nibbles`.
    /// Specifically, if `0x1234` is split at `1`, we get `0x1` and `0x234`.
    ///
    /// # Panics
    /// Panics if the `idx` is out of range.
    pub fn split_at_idx(&self, idx: usize) -> (Nibbles, Nibbles) {
        let (pre, post) = self.nibbles.split_at(idx);

        (
            Self {
                nibbles: pre.to_vec(),
            },
            Self {
                nibbles: post.to_vec(),
            },
        )
    }

    /// Split the `Nibbles` at the given index but only return the postfix.
    ///
    /// # Panics
    /// Panics if the `idx` is out of range.
    pub fn split_at_idx_postfix(&self, idx: usize) -> Nibbles {
        self.get_nibble_range(idx..self.count())
    }

    /// Merge a single Nibble with a `Nibbles`. `self` will be the prefix.
    pub fn merge_nibble(&self, post: Nibble) -> Nibbles {
        let mut merged = self.clone();
        merged.push_nibble_back(post);

        merged
    }

    /// Merge two `Nibbles` together. `self` will be the prefix.
    pub fn merge_nibbles(&self, post: &Nibbles) -> Nibbles {
        let mut nibbles = Vec::with_capacity(self.count() + post.count());
        nibbles.extend_from_slice(&self.nibbles);
        nibbles.extend_from_slice(&post.nibbles);

        Self { nibbles }
    }

    /// Finds the nibble idx that differs between two nibbles. If there is no
    /// difference up to the shorter of the two, returns the length of the
    /// shorter one.
    pub fn find_nibble_idx_that_differs_between_nibbles_different_lengths(
        n1: &Nibbles,
        n2: &Nibbles,
    ) -> usize {
        n1.nibbles
            .iter()
            .zip(n2.nibbles.iter())
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| n1.count().min(n2.count()))
    }

    /// Returns the minimum number of bytes needed to represent these `Nibbles`.
    pub fn min_bytes(&self) -> usize {
        (self.count() + 1) / 2
    }

    /// Returns the nibbles bytes in big-endian format. An odd count is padded
    /// with a leading `0` nibble.
    pub fn bytes_be(&self) -> Vec<u8> {
        let pad = usize::from(!is_even(self.count()));
        let mut padded = Vec::with_capacity(self.count() + pad);
        padded.resize(pad, 0);
        padded.extend_from_slice(&self.nibbles);

        padded.chunks(2).map(|c| (c[0] << 4) | c[1]).collect()
    }

    /// Converts [`Nibbles`] to hex-prefix encoding (AKA "compact").
    /// This prepends an extra nibble which encodes if the number of nibbles is
    /// odd and if it's a leaf (terminator) or not.
    pub fn to_hex_prefix_encoding(&self, is_leaf: bool) -> Vec<u8> {
        let odd = !is_even(self.count());

        let mut flags = 0;
        if odd {
            flags |= HP_FLAG_ODD;
        }
        if is_leaf {
            flags |= HP_FLAG_LEAF;
        }

        let mut bytes = Vec::with_capacity(self.count() / 2 + 1);
        let rest = match odd {
            false => {
                bytes.push(flags << 4);
                &self.nibbles[..]
            }
            true => {
                bytes.push((flags << 4) | self.nibbles[0]);
                &self.nibbles[1..]
            }
        };

        bytes.extend(rest.chunks(2).map(|c| (c[0] << 4) | c[1]));
        bytes
    }

    /// Converts a hex prefix byte string ("AKA "compact") into `Nibbles`.
    /// Also returns whether the encoding was flagged as a leaf.
    pub fn from_hex_prefix_encoding(
        hex_prefix_bytes: &[u8],
    ) -> Result<(Self, bool), FromHexPrefixError> {
        let first = *hex_prefix_bytes.first().ok_or(FromHexPrefixError::Empty)?;
        let flag_bits = first >> 4;

        if flag_bits > (HP_FLAG_ODD | HP_FLAG_LEAF) {
            return Err(FromHexPrefixError::InvalidFlags(flag_bits));
        }

        let is_leaf = flag_bits & HP_FLAG_LEAF != 0;
        let odd = flag_bits & HP_FLAG_ODD != 0;

        let mut nibbles = Vec::with_capacity(hex_prefix_bytes.len() * 2);
        match odd {
            false if first & 0xf != 0 => {
                return Err(FromHexPrefixError::NonZeroPadding(first & 0xf))
            }
            false => (),
            true => nibbles.push(first & 0xf),
        }

        nibbles.extend(hex_prefix_bytes[1..].iter().flat_map(|b| [b >> 4, b & 0xf]));

        Ok((Self { nibbles }, is_leaf))
    }

    /// Returns a hex representation of the string.
    fn as_hex_str(&self, upper: bool) -> String {
        let mut hex_string = String::with_capacity(self.count() + 2);
        hex_string.push_str("0x");

        hex_string.extend(self.nibbles.iter().map(|n| {
            let c = char::from_digit(*n as u32, 16).unwrap_or('?');
            match upper {
                false => c,
                true => c.to_ascii_uppercase(),
            }
        }));

        hex_string
    }
}
