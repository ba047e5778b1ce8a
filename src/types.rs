use std::fmt::Display;
use std::str::FromStr;

use imageproc::point::Point;
use serde::{Deserialize, Serialize};

/// Number of letters available for choices and model identifiers.
pub const LETTER_COUNT: u8 = 26;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Size<T> {
    pub width: T,
    pub height: T,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperSize {
    A4,
    Letter,
}

impl PaperSize {
    /// Physical size of the paper in inches.
    pub fn inches(&self) -> Size<f32> {
        match self {
            PaperSize::A4 => Size {
                width: 210.0 / 25.4,
                height: 297.0 / 25.4,
            },
            PaperSize::Letter => Size {
                width: 8.5,
                height: 11.0,
            },
        }
    }

    /// Pixel size of a sheet of this paper rendered or scanned at `pixels_per_inch`.
    pub fn canvas_size(&self, pixels_per_inch: u32) -> Size<u32> {
        let inches = self.inches();
        Size {
            width: (inches.width * pixels_per_inch as f32).round() as u32,
            height: (inches.height * pixels_per_inch as f32).round() as u32,
        }
    }
}

impl Default for PaperSize {
    fn default() -> Self {
        PaperSize::A4
    }
}

/// A 0-based answer choice, shown on the sheet as `A`, `B`, `C`, ...
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Choice(u8);

impl Choice {
    pub fn new(index: u8) -> Option<Self> {
        (index < LETTER_COUNT).then_some(Self(index))
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        let upper = letter.to_ascii_uppercase();
        if upper.is_ascii_uppercase() {
            Some(Self(upper as u8 - b'A'))
        } else {
            None
        }
    }

    /// Maps a 1-based choice number (`1` → `A`) to a choice.
    pub fn from_number(number: u32) -> Option<Self> {
        if number == 0 || number > LETTER_COUNT as u32 {
            return None;
        }
        Some(Self((number - 1) as u8))
    }

    pub fn index(&self) -> u8 {
        self.0
    }

    pub fn letter(&self) -> char {
        (b'A' + self.0) as char
    }
}

impl Display for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A 1-based exam model (variant) slot.
///
/// Sheets are generated for letters (`A`, `B`, ...), the detector reports the
/// filled slot as a number and answer keys label blocks `Model 1`, `Model 2`,
/// ... All of these spellings name the same slot:
///
/// ```text
/// "B" == "b" == "2" == "Model 2" == "Model B"
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(u8);

impl ModelId {
    pub fn from_slot(slot: u8) -> Option<Self> {
        (1..=LETTER_COUNT).contains(&slot).then_some(Self(slot))
    }

    pub fn slot(&self) -> u8 {
        self.0
    }

    pub fn letter(&self) -> char {
        (b'A' + self.0 - 1) as char
    }
}

impl Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for ModelId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value = match trimmed.get(..5) {
            Some(prefix) if prefix.eq_ignore_ascii_case("model") => trimmed[5..].trim(),
            _ => trimmed,
        };

        if let Ok(slot) = value.parse::<u8>() {
            return ModelId::from_slot(slot).ok_or_else(|| format!("Invalid model: {}", s));
        }

        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (Some(letter), None) if letter.is_ascii_alphabetic() => {
                Ok(Self(letter.to_ascii_uppercase() as u8 - b'A' + 1))
            }
            _ => Err(format!("Invalid model: {}", s)),
        }
    }
}

impl<'de> Deserialize<'de> for ModelId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for ModelId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.letter().to_string())
    }
}

/// What a mark inside a bubble means.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BubbleId {
    /// Seat number digit; position 0 is the units row.
    SeatDigit { position: u8, digit: u8 },
    /// Model selection slot, 1-based.
    Model { slot: u8 },
    Answer { question: u32, choice: Choice },
}

impl Display for BubbleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BubbleId::SeatDigit { digit, .. } => write!(f, "{}", digit),
            BubbleId::Model { slot } => write!(f, "{}", (b'A' + slot - 1) as char),
            BubbleId::Answer { choice, .. } => write!(f, "{}", choice),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bubble {
    pub center: Point<f32>,
    pub radius: f32,
    pub id: BubbleId,
}

impl Bubble {
    pub fn new(x: f32, y: f32, radius: f32, id: BubbleId) -> Self {
        Self {
            center: Point::new(x, y),
            radius,
            id,
        }
    }

    /// Center rounded to the pixel grid.
    pub fn pixel_center(&self) -> (i32, i32) {
        (self.center.x.round() as i32, self.center.y.round() as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_letters() {
        assert_eq!(Choice::from_number(1).unwrap().letter(), 'A');
        assert_eq!(Choice::from_number(4).unwrap().letter(), 'D');
        assert_eq!(Choice::from_number(0), None);
        assert_eq!(Choice::from_number(27), None);
        assert_eq!(Choice::from_letter('c'), Choice::new(2));
        assert_eq!(Choice::from_letter('-'), None);
    }

    #[test]
    fn test_model_id_spellings() {
        let b: ModelId = "B".parse().unwrap();
        assert_eq!(b.slot(), 2);
        assert_eq!("b".parse::<ModelId>().unwrap(), b);
        assert_eq!("2".parse::<ModelId>().unwrap(), b);
        assert_eq!("Model 2".parse::<ModelId>().unwrap(), b);
        assert_eq!("model B".parse::<ModelId>().unwrap(), b);
        assert!("Model".parse::<ModelId>().is_err());
        assert!("0".parse::<ModelId>().is_err());
        assert!("AB".parse::<ModelId>().is_err());
        assert!("_".parse::<ModelId>().is_err());
    }

    #[test]
    fn test_model_id_serializes_as_letter() {
        let model = ModelId::from_slot(3).unwrap();
        assert_eq!(serde_json::to_string(&model).unwrap(), "\"C\"");
        let parsed: ModelId = serde_json::from_str("\"Model 3\"").unwrap();
        assert_eq!(parsed, model);
    }

    #[test]
    fn test_canvas_size_scales_with_resolution() {
        let a4 = PaperSize::A4.canvas_size(100);
        assert_eq!(a4, Size { width: 827, height: 1169 });
        let letter = PaperSize::Letter.canvas_size(200);
        assert_eq!(letter, Size { width: 1700, height: 2200 });
    }
}
