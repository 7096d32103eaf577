//! Header code table.
//!
//! Codes 0-13 are shared with existing peers. Maps get their own pair (14/15)
//! instead of reusing the list shape.

use std::fmt;

/// Integer tag written before every frame header and as every frame terminator.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderCode {
    RequestStart = 0,
    RequestEnd = 1,
    ResponseStart = 2,
    ResponseEnd = 3,
    ArgumentStart = 4,
    ArgumentEnd = 5,
    ModelStart = 6,
    ModelEnd = 7,
    PropertyStart = 8,
    PropertyEnd = 9,
    ListStart = 10,
    ListEnd = 11,
    IndefiniteStart = 12,
    IndefiniteEnd = 13,
    MapStart = 14,
    MapEnd = 15,
}

impl HeaderCode {
    /// The integer written on the wire.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Look up a wire integer. Returns `None` for codes outside the table.
    pub fn from_code(code: i64) -> Option<Self> {
        let code = match code {
            0 => Self::RequestStart,
            1 => Self::RequestEnd,
            2 => Self::ResponseStart,
            3 => Self::ResponseEnd,
            4 => Self::ArgumentStart,
            5 => Self::ArgumentEnd,
            6 => Self::ModelStart,
            7 => Self::ModelEnd,
            8 => Self::PropertyStart,
            9 => Self::PropertyEnd,
            10 => Self::ListStart,
            11 => Self::ListEnd,
            12 => Self::IndefiniteStart,
            13 => Self::IndefiniteEnd,
            14 => Self::MapStart,
            15 => Self::MapEnd,
            _ => return None,
        };
        Some(code)
    }

    /// Start codes are even, end codes odd.
    pub const fn is_start(self) -> bool {
        self.code() % 2 == 0
    }

    /// The frame kind this code opens or closes.
    pub const fn kind(self) -> FrameKind {
        match self {
            Self::RequestStart | Self::RequestEnd => FrameKind::Request,
            Self::ResponseStart | Self::ResponseEnd => FrameKind::Response,
            Self::ArgumentStart | Self::ArgumentEnd => FrameKind::Argument,
            Self::ModelStart | Self::ModelEnd => FrameKind::Model,
            Self::PropertyStart | Self::PropertyEnd => FrameKind::Property,
            Self::ListStart | Self::ListEnd => FrameKind::List,
            Self::IndefiniteStart | Self::IndefiniteEnd => FrameKind::Indefinite,
            Self::MapStart | Self::MapEnd => FrameKind::Map,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::RequestStart => "reqStart",
            Self::RequestEnd => "reqEnd",
            Self::ResponseStart => "resStart",
            Self::ResponseEnd => "resEnd",
            Self::ArgumentStart => "reqArgStart",
            Self::ArgumentEnd => "reqArgEnd",
            Self::ModelStart => "modelStart",
            Self::ModelEnd => "modelEnd",
            Self::PropertyStart => "propStart",
            Self::PropertyEnd => "propEnd",
            Self::ListStart => "listStart",
            Self::ListEnd => "listEnd",
            Self::IndefiniteStart => "indefiniteStart",
            Self::IndefiniteEnd => "indefiniteEnd",
            Self::MapStart => "mapStart",
            Self::MapEnd => "mapEnd",
        }
    }
}

impl fmt::Display for HeaderCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// One kind of structurally delimited frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Request,
    Response,
    Argument,
    Model,
    Property,
    List,
    Map,
    Indefinite,
}

impl FrameKind {
    pub const ALL: [FrameKind; 8] = [
        FrameKind::Request,
        FrameKind::Response,
        FrameKind::Argument,
        FrameKind::Model,
        FrameKind::Property,
        FrameKind::List,
        FrameKind::Map,
        FrameKind::Indefinite,
    ];

    pub const fn start_code(self) -> HeaderCode {
        match self {
            Self::Request => HeaderCode::RequestStart,
            Self::Response => HeaderCode::ResponseStart,
            Self::Argument => HeaderCode::ArgumentStart,
            Self::Model => HeaderCode::ModelStart,
            Self::Property => HeaderCode::PropertyStart,
            Self::List => HeaderCode::ListStart,
            Self::Map => HeaderCode::MapStart,
            Self::Indefinite => HeaderCode::IndefiniteStart,
        }
    }

    pub const fn end_code(self) -> HeaderCode {
        match self {
            Self::Request => HeaderCode::RequestEnd,
            Self::Response => HeaderCode::ResponseEnd,
            Self::Argument => HeaderCode::ArgumentEnd,
            Self::Model => HeaderCode::ModelEnd,
            Self::Property => HeaderCode::PropertyEnd,
            Self::List => HeaderCode::ListEnd,
            Self::Map => HeaderCode::MapEnd,
            Self::Indefinite => HeaderCode::IndefiniteEnd,
        }
    }

    /// Frames that stand in for a single value inside a parent frame.
    pub const fn is_value(self) -> bool {
        matches!(self, Self::Model | Self::List | Self::Map | Self::Indefinite)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Argument => "argument",
            Self::Model => "model",
            Self::Property => "property",
            Self::List => "list",
            Self::Map => "map",
            Self::Indefinite => "indefinite",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
