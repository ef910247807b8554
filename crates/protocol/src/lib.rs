use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Canvas colour names understood by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Brown,
    Black,
    Blue,
    Green,
    White,
    Gray,
    Red,
    Purple,
}

/// One canvas operation. A frame replays its commands in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    Clear {
        width: f64,
        height: f64,
    },
    FillRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        color: Color,
    },
    FillCircle {
        x: f64,
        y: f64,
        radius: f64,
        color: Color,
    },
    FillText {
        x: f64,
        y: f64,
        text: String,
        color: Color,
        font: String,
    },
    StrokePath {
        points: Vec<Point>,
        color: Color,
        line_width: f64,
    },
    DrawImage {
        image: String,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub seq: u64,
    pub width: f64,
    pub height: f64,
    pub commands: Vec<DrawCommand>,
}

impl Frame {
    pub fn blank(width: f64, height: f64) -> Self {
        Self {
            seq: 0,
            width,
            height,
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    #[default]
    Info,
    Warning,
}

/// User-facing message; the dashboard shows it as an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    #[serde(default)]
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }
}

/// A form value as typed by the user: a number, some text, or anything else
/// a client happened to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawField {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl RawField {
    /// Numeric reading of the field, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawField::Number(n) => Some(*n),
            RawField::Text(s) => s.trim().parse::<f64>().ok(),
            RawField::Other(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawField::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<f64> for RawField {
    fn from(n: f64) -> Self {
        RawField::Number(n)
    }
}

impl From<&str> for RawField {
    fn from(s: &str) -> Self {
        RawField::Text(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceKind {
    Foundation,
    Wheel,
    House,
    Company,
    Road,
    Highway,
    Car,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceRequest {
    pub kind: PlaceKind,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<RawField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<RawField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<RawField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<RawField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<RawField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<RawField>,
}

impl PlaceRequest {
    pub fn at(kind: PlaceKind, x: f64, y: f64) -> Self {
        Self {
            kind,
            x,
            y,
            width: None,
            height: None,
            radius: None,
            length: None,
            speed: None,
            name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placed {
    pub index: usize,
    pub objects: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSummary {
    pub objects: usize,
    pub residents: usize,
    pub drafting_road: bool,
    pub rev: i64,
}

pub mod keys {
    /// Storage key holding the whole world snapshot.
    pub const GAME_STATE: &str = "gameState";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_field_reads_numbers_from_text() {
        assert_eq!(RawField::from(" 42 ").as_number(), Some(42.0));
        assert_eq!(RawField::from("abc").as_number(), None);
        assert_eq!(RawField::from(7.5).as_number(), Some(7.5));
    }

    #[test]
    fn place_request_accepts_mixed_field_types() {
        let req: PlaceRequest = serde_json::from_str(
            r#"{"kind":"car","x":1,"y":2,"width":"40","height":12,"speed":true}"#,
        )
        .unwrap();
        assert_eq!(req.kind, PlaceKind::Car);
        assert_eq!(req.width.as_ref().and_then(RawField::as_number), Some(40.0));
        assert_eq!(req.height.as_ref().and_then(RawField::as_number), Some(12.0));
        assert_eq!(req.speed.as_ref().and_then(RawField::as_number), None);
    }

    #[test]
    fn notice_without_level_is_info() {
        let n: Notice = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(n, Notice::info("hi"));
        assert_eq!(serde_json::to_value(Notice::warning("x")).unwrap()["level"], "warning");
    }

    #[test]
    fn draw_commands_are_tagged_by_op() {
        let cmd = DrawCommand::FillCircle {
            x: 1.0,
            y: 2.0,
            radius: 3.0,
            color: Color::Black,
        };
        let v = serde_json::to_value(&cmd).unwrap();
        assert_eq!(v["op"], "fill_circle");
        assert_eq!(v["color"], "black");
    }
}
