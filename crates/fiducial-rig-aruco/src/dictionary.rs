//! Predefined ArUco dictionary families.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("no predefined dictionary with {size}x{size} markers and {unique_count} ids (size must be 4..=7, count one of 50/100/250/1000)")]
    UnsupportedDictionary { size: u32, unique_count: u32 },
    #[error("unknown dictionary name {0:?}")]
    UnknownName(String),
}

macro_rules! dictionaries {
    ($($variant:ident => ($name:literal, $size:literal, $count:literal)),+ $(,)?) => {
        /// One of the predefined `DICT_NxN_M` families.
        ///
        /// The bit patterns themselves belong to the detector backend; this is
        /// the handle that selects them.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Dictionary {
            $(
                #[serde(rename = $name)]
                $variant,
            )+
        }

        impl Dictionary {
            pub const ALL: &'static [Dictionary] = &[$(Dictionary::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $(Dictionary::$variant => $name,)+
                }
            }

            /// Inner bits per marker side.
            pub fn marker_size(self) -> u32 {
                match self {
                    $(Dictionary::$variant => $size,)+
                }
            }

            /// Number of distinct marker ids.
            pub fn marker_count(self) -> u32 {
                match self {
                    $(Dictionary::$variant => $count,)+
                }
            }
        }
    };
}

dictionaries! {
    Dict4X4_50 => ("DICT_4X4_50", 4, 50),
    Dict4X4_100 => ("DICT_4X4_100", 4, 100),
    Dict4X4_250 => ("DICT_4X4_250", 4, 250),
    Dict4X4_1000 => ("DICT_4X4_1000", 4, 1000),
    Dict5X5_50 => ("DICT_5X5_50", 5, 50),
    Dict5X5_100 => ("DICT_5X5_100", 5, 100),
    Dict5X5_250 => ("DICT_5X5_250", 5, 250),
    Dict5X5_1000 => ("DICT_5X5_1000", 5, 1000),
    Dict6X6_50 => ("DICT_6X6_50", 6, 50),
    Dict6X6_100 => ("DICT_6X6_100", 6, 100),
    Dict6X6_250 => ("DICT_6X6_250", 6, 250),
    Dict6X6_1000 => ("DICT_6X6_1000", 6, 1000),
    Dict7X7_50 => ("DICT_7X7_50", 7, 50),
    Dict7X7_100 => ("DICT_7X7_100", 7, 100),
    Dict7X7_250 => ("DICT_7X7_250", 7, 250),
    Dict7X7_1000 => ("DICT_7X7_1000", 7, 1000),
}

impl Dictionary {
    /// Resolve a `(size, unique_count)` pair to its family.
    pub fn resolve(size: u32, unique_count: u32) -> Result<Self, ConfigurationError> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.marker_size() == size && d.marker_count() == unique_count)
            .ok_or(ConfigurationError::UnsupportedDictionary { size, unique_count })
    }
}

impl fmt::Display for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dictionary {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigurationError::UnknownName(s.to_string()))
    }
}
