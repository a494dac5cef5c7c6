//! Runtime values produced by the evaluator.
//!
//! Numbers keep full `f64` precision until they are turned into text, either
//! in [`Value::to_css`] or when joined to a string; only then are they rounded
//! to the configured precision.

use crate::ast::BinaryOp;
use crate::error::EvalErrorKind;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListSeparator {
    Space,
    Comma,
    Slash,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(Number),
    Color(Color),
    Str { text: String, quote: Option<char> },
    List { items: Vec<Value>, separator: ListSeparator },
    /// A plain CSS function call that is not evaluated, e.g. `translate(10px)`.
    Function { name: String, args: Vec<Value> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Number {
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Color {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub alpha: f64,
    /// Hex digits as written in the source; kept while the color is untouched.
    pub original: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Format {
    pub precision: usize,
    pub compressed: bool,
}

/// A failed operation, without a position; the evaluator attaches one.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueError {
    pub kind: EvalErrorKind,
    pub message: String,
}

impl ValueError {
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self {
            kind: EvalErrorKind::TypeMismatch,
            message: message.into(),
        }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self {
            kind: EvalErrorKind::InvalidOperation,
            message: message.into(),
        }
    }

    pub fn bad_argument(message: impl Into<String>) -> Self {
        Self {
            kind: EvalErrorKind::BadArgument,
            message: message.into(),
        }
    }
}

impl Value {
    pub fn number(value: f64, unit: impl Into<String>) -> Self {
        Self::Number(Number {
            value,
            unit: unit.into(),
        })
    }

    pub fn unquoted(text: impl Into<String>) -> Self {
        Self::Str {
            text: text.into(),
            quote: None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Color(_) => "color",
            Self::Str { .. } => "string",
            Self::List { .. } => "list",
            Self::Function { .. } => "function call",
        }
    }

    pub fn to_css(&self, format: &Format) -> String {
        match self {
            Self::Number(number) => number.to_css(format),
            Self::Color(color) => color.to_css(format),
            Self::Str { text, quote } => match quote {
                Some(q) => format!("{q}{text}{q}"),
                None => text.clone(),
            },
            Self::List { items, separator } => {
                let joiner = match (separator, format.compressed) {
                    (ListSeparator::Space, _) => " ",
                    (ListSeparator::Comma, false) => ", ",
                    (ListSeparator::Comma, true) => ",",
                    (ListSeparator::Slash, _) => "/",
                };
                items
                    .iter()
                    .map(|item| item.to_css(format))
                    .filter(|text| !text.is_empty())
                    .collect::<Vec<_>>()
                    .join(joiner)
            }
            Self::Function { name, args } => {
                let joiner = if format.compressed { "," } else { ", " };
                let args = args
                    .iter()
                    .map(|arg| arg.to_css(format))
                    .collect::<Vec<_>>()
                    .join(joiner);
                format!("{name}({args})")
            }
        }
    }

    /// Text substituted for `#{}`: strings lose their quotes.
    pub fn to_interpolation(&self, format: &Format) -> String {
        match self {
            Self::Str { text, .. } => text.clone(),
            Self::List { items, separator } => {
                let joiner = match separator {
                    ListSeparator::Space => " ",
                    ListSeparator::Comma => ", ",
                    ListSeparator::Slash => "/",
                };
                items
                    .iter()
                    .map(|item| item.to_interpolation(format))
                    .collect::<Vec<_>>()
                    .join(joiner)
            }
            other => other.to_css(format),
        }
    }

    /// `format` renders numbers that end up inside a string.
    pub fn apply(&self, op: BinaryOp, rhs: &Value, format: &Format) -> Result<Value, ValueError> {
        match (self, rhs) {
            (Self::Number(l), Self::Number(r)) => l.apply(op, r).map(Value::Number),
            (Self::Color(l), Self::Color(r)) => l.apply_color(op, r).map(Value::Color),
            (Self::Color(l), Self::Number(r)) if r.unit.is_empty() => {
                l.apply_scalar(op, r.value).map(Value::Color)
            }
            (Self::Str { text, quote }, other) => Ok(concat(op, text, *quote, other, format)),
            (other, Self::Str { text, quote }) if op == BinaryOp::Add => Ok(Value::Str {
                text: format!("{}{text}", other.to_interpolation(format)),
                quote: *quote,
            }),
            (l, r) => Err(ValueError::type_mismatch(format!(
                "Undefined operation: {} {} {}",
                l.type_name(),
                op.symbol(),
                r.type_name()
            ))),
        }
    }

    pub fn negate(&self, format: &Format) -> Value {
        match self {
            Self::Number(number) => Value::number(-number.value, number.unit.clone()),
            other => Value::unquoted(format!("-{}", other.to_interpolation(format))),
        }
    }
}

fn concat(op: BinaryOp, text: &str, quote: Option<char>, rhs: &Value, format: &Format) -> Value {
    let rhs = rhs.to_interpolation(format);
    match op {
        BinaryOp::Add => Value::Str {
            text: format!("{text}{rhs}"),
            quote,
        },
        other => Value::unquoted(format!("{text}{}{rhs}", other.symbol())),
    }
}

impl Number {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    pub fn is_unitless(&self) -> bool {
        self.unit.is_empty()
    }

    pub fn to_css(&self, format: &Format) -> String {
        format!("{}{}", format_number(self.value, format.precision), self.unit)
    }

    /// Express `self` in `unit`, if the two units measure the same thing.
    pub fn convert_to(&self, unit: &str) -> Option<f64> {
        if self.unit == unit || self.unit.is_empty() || unit.is_empty() {
            return Some(self.value);
        }
        conversion_factor(&self.unit, unit).map(|factor| self.value * factor)
    }

    fn compatible_rhs(&self, rhs: &Number) -> Result<(f64, String), ValueError> {
        let unit = if self.unit.is_empty() {
            rhs.unit.clone()
        } else {
            self.unit.clone()
        };
        match rhs.convert_to(&unit) {
            Some(value) => Ok((value, unit)),
            None => Err(ValueError::type_mismatch(format!(
                "Incompatible units: '{}' and '{}'.",
                rhs.unit, self.unit
            ))),
        }
    }

    pub fn apply(&self, op: BinaryOp, rhs: &Number) -> Result<Number, ValueError> {
        match op {
            BinaryOp::Add => {
                let (r, unit) = self.compatible_rhs(rhs)?;
                Ok(Number::new(self.value + r, unit))
            }
            BinaryOp::Sub => {
                let (r, unit) = self.compatible_rhs(rhs)?;
                Ok(Number::new(self.value - r, unit))
            }
            BinaryOp::Mul => {
                if !self.is_unitless() && !rhs.is_unitless() {
                    return Err(ValueError::type_mismatch(format!(
                        "{}{} * {}{} isn't a valid CSS value.",
                        self.value, self.unit, rhs.value, rhs.unit
                    )));
                }
                let unit = if self.is_unitless() { &rhs.unit } else { &self.unit };
                Ok(Number::new(self.value * rhs.value, unit.clone()))
            }
            BinaryOp::Div => {
                if rhs.value == 0.0 {
                    return Err(ValueError::invalid_operation("division by zero"));
                }
                match (self.is_unitless(), rhs.is_unitless()) {
                    (_, true) => Ok(Number::new(self.value / rhs.value, self.unit.clone())),
                    (true, false) => Err(ValueError::type_mismatch(format!(
                        "{} / {}{} isn't a valid CSS value.",
                        self.value, rhs.value, rhs.unit
                    ))),
                    (false, false) => match rhs.convert_to(&self.unit) {
                        Some(r) => Ok(Number::new(self.value / r, "")),
                        None => Err(ValueError::type_mismatch(format!(
                            "Incompatible units: '{}' and '{}'.",
                            rhs.unit, self.unit
                        ))),
                    },
                }
            }
            BinaryOp::Rem => {
                let (r, unit) = self.compatible_rhs(rhs)?;
                if r == 0.0 {
                    return Err(ValueError::invalid_operation("modulo by zero"));
                }
                // Floored: the result takes the sign of the divisor.
                Ok(Number::new(self.value - r * (self.value / r).floor(), unit))
            }
        }
    }
}

/// Most fractional digits an `f64` renders without binary noise.
pub const MAX_PRECISION: usize = 15;

/// Render with at most `precision` fractional digits, trailing zeros removed
/// and a leading `0` kept (`0.33333`, never `.33333`).
pub fn format_number(value: f64, precision: usize) -> String {
    let precision = precision.min(MAX_PRECISION);
    let factor = 10f64.powi(precision as i32);
    let rounded = (value * factor).round() / factor;
    let mut formatted = format!("{rounded:.precision$}");
    if formatted.contains('.') {
        while formatted.ends_with('0') {
            formatted.pop();
        }
        if formatted.ends_with('.') {
            formatted.pop();
        }
    }
    if formatted == "-0" {
        formatted = "0".to_string();
    }
    formatted
}

fn unit_factor(unit: &str) -> Option<(&'static str, f64)> {
    let factor = match unit.to_ascii_lowercase().as_str() {
        "px" => ("length", 1.0),
        "in" => ("length", 96.0),
        "cm" => ("length", 96.0 / 2.54),
        "mm" => ("length", 96.0 / 25.4),
        "q" => ("length", 96.0 / 101.6),
        "pt" => ("length", 4.0 / 3.0),
        "pc" => ("length", 16.0),
        "deg" => ("angle", 1.0),
        "grad" => ("angle", 0.9),
        "rad" => ("angle", 180.0 / PI),
        "turn" => ("angle", 360.0),
        "s" => ("time", 1.0),
        "ms" => ("time", 0.001),
        "hz" => ("frequency", 1.0),
        "khz" => ("frequency", 1000.0),
        _ => return None,
    };
    Some(factor)
}

/// Multiplier taking a value in `from` to `to`.
pub fn conversion_factor(from: &str, to: &str) -> Option<f64> {
    if from.eq_ignore_ascii_case(to) {
        return Some(1.0);
    }
    let (from_group, from_factor) = unit_factor(from)?;
    let (to_group, to_factor) = unit_factor(to)?;
    (from_group == to_group).then(|| from_factor / to_factor)
}

impl Color {
    pub fn rgba(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        Self {
            red: red.clamp(0.0, 255.0),
            green: green.clamp(0.0, 255.0),
            blue: blue.clamp(0.0, 255.0),
            alpha: alpha.clamp(0.0, 1.0),
            original: None,
        }
    }

    /// Parse 3, 4, 6 or 8 hex digits.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(f64::from);
        let expand = |i: usize| hex[i..i + 1].repeat(2);
        let (r, g, b, a) = match hex.len() {
            3 => (channel(&expand(0))?, channel(&expand(1))?, channel(&expand(2))?, 255.0),
            4 => (
                channel(&expand(0))?,
                channel(&expand(1))?,
                channel(&expand(2))?,
                channel(&expand(3))?,
            ),
            6 => (channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?, 255.0),
            8 => (
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                channel(&hex[6..8])?,
            ),
            _ => return None,
        };
        Some(Self {
            red: r,
            green: g,
            blue: b,
            alpha: a / 255.0,
            original: Some(hex.to_string()),
        })
    }

    pub fn to_css(&self, format: &Format) -> String {
        if let Some(original) = &self.original {
            return format!("#{original}");
        }
        let (r, g, b) = (channel_byte(self.red), channel_byte(self.green), channel_byte(self.blue));
        if self.alpha >= 1.0 {
            format!("#{r:02x}{g:02x}{b:02x}")
        } else if format.compressed {
            format!("rgba({r},{g},{b},{})", format_number(self.alpha, format.precision))
        } else {
            format!("rgba({r}, {g}, {b}, {})", format_number(self.alpha, format.precision))
        }
    }

    /// Hue in degrees, saturation and lightness in `0..=1`.
    pub fn to_hsl(&self) -> (f64, f64, f64) {
        let r = self.red / 255.0;
        let g = self.green / 255.0;
        let b = self.blue / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let lightness = (max + min) / 2.0;
        let delta = max - min;
        if delta == 0.0 {
            return (0.0, 0.0, lightness);
        }
        let saturation = if lightness > 0.5 {
            delta / (2.0 - max - min)
        } else {
            delta / (max + min)
        };
        let hue = if max == r {
            (g - b) / delta + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / delta + 2.0
        } else {
            (r - g) / delta + 4.0
        };
        (hue * 60.0, saturation, lightness)
    }

    pub fn from_hsl(hue: f64, saturation: f64, lightness: f64, alpha: f64) -> Self {
        let h = hue.rem_euclid(360.0) / 360.0;
        let s = saturation.clamp(0.0, 1.0);
        let l = lightness.clamp(0.0, 1.0);
        if s == 0.0 {
            let v = l * 255.0;
            return Self::rgba(v, v, v, alpha);
        }
        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        let channel = |t: f64| {
            let t = t.rem_euclid(1.0);
            let v = if t < 1.0 / 6.0 {
                p + (q - p) * 6.0 * t
            } else if t < 0.5 {
                q
            } else if t < 2.0 / 3.0 {
                p + (q - p) * (2.0 / 3.0 - t) * 6.0
            } else {
                p
            };
            v * 255.0
        };
        Self::rgba(channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0), alpha)
    }

    fn apply_color(&self, op: BinaryOp, rhs: &Color) -> Result<Color, ValueError> {
        let f = channel_op(op)?;
        Ok(Color::rgba(
            f(self.red, rhs.red)?,
            f(self.green, rhs.green)?,
            f(self.blue, rhs.blue)?,
            self.alpha,
        ))
    }

    fn apply_scalar(&self, op: BinaryOp, rhs: f64) -> Result<Color, ValueError> {
        let f = channel_op(op)?;
        Ok(Color::rgba(
            f(self.red, rhs)?,
            f(self.green, rhs)?,
            f(self.blue, rhs)?,
            self.alpha,
        ))
    }
}

/// Channels are settled at 1e-5 before rounding so HSL round trips such as
/// 76.49999999999994 land on 77.
fn channel_byte(value: f64) -> u8 {
    ((value * 1e5).round() / 1e5).round().clamp(0.0, 255.0) as u8
}

type ChannelFn = fn(f64, f64) -> Result<f64, ValueError>;

fn channel_op(op: BinaryOp) -> Result<ChannelFn, ValueError> {
    let f: ChannelFn = match op {
        BinaryOp::Add => |a, b| Ok(a + b),
        BinaryOp::Sub => |a, b| Ok(a - b),
        BinaryOp::Mul => |a, b| Ok(a * b),
        BinaryOp::Div => |a, b| {
            if b == 0.0 {
                Err(ValueError::invalid_operation("division by zero"))
            } else {
                Ok(a / b)
            }
        },
        BinaryOp::Rem => {
            return Err(ValueError::invalid_operation("colors do not support '%'"));
        }
    };
    Ok(f)
}
