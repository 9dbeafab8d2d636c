//! State property type definitions
//!
//! Defines the property kinds, typed values and descriptors shared by the
//! metadata table, the curator and every producer/consumer.

/// Kind of a state property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// 64-bit float with a declared inclusive range
    Double,
    /// On/off flag
    Boolean,
    /// Free text
    String,
}

impl std::fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyKind::Double => write!(f, "double"),
            PropertyKind::Boolean => write!(f, "boolean"),
            PropertyKind::String => write!(f, "string"),
        }
    }
}

/// Property value: one variant per supported kind
///
/// Doubles compare by bit pattern, so NaN equals NaN and `0.0 != -0.0`.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    Double(f64),
    Boolean(bool),
    String(String),
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropertyValue::Double(a), PropertyValue::Double(b)) => a.to_bits() == b.to_bits(),
            (PropertyValue::Boolean(a), PropertyValue::Boolean(b)) => a == b,
            (PropertyValue::String(a), PropertyValue::String(b)) => a == b,
            _ => false,
        }
    }
}

impl PropertyValue {
    /// Kind of this value
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Double(_) => PropertyKind::Double,
            PropertyValue::Boolean(_) => PropertyKind::Boolean,
            PropertyValue::String(_) => PropertyKind::String,
        }
    }

    /// Extract the numeric value if available
    pub fn as_double(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract the flag if available
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract the text if available
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Parse a textual value as the given kind (used by the console)
    pub fn parse_as(kind: PropertyKind, text: &str) -> Option<Self> {
        match kind {
            PropertyKind::Double => text.trim().parse::<f64>().ok().map(PropertyValue::Double),
            PropertyKind::Boolean => match text.trim().to_lowercase().as_str() {
                "true" | "on" | "1" | "yes" => Some(PropertyValue::Boolean(true)),
                "false" | "off" | "0" | "no" => Some(PropertyValue::Boolean(false)),
                _ => None,
            },
            PropertyKind::String => Some(PropertyValue::String(text.to_string())),
        }
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Double(v) => write!(f, "{}", v),
            PropertyValue::Boolean(v) => write!(f, "{}", v),
            PropertyValue::String(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Double(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Boolean(value)
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

/// Inclusive numeric range of a Double property
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    /// Width of the range (`max - min`)
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Whether both bounds are finite and `min < max`
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min < self.max
    }
}

/// Immutable description of one state property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    name: String,
    kind: PropertyKind,
    range: Option<ValueRange>,
    animatable: bool,
}

impl PropertyDescriptor {
    pub(crate) fn new(
        name: String,
        kind: PropertyKind,
        range: Option<ValueRange>,
        animatable: bool,
    ) -> Self {
        Self {
            name,
            kind,
            range,
            animatable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    /// Declared range; present iff the kind is Double
    pub fn range(&self) -> Option<ValueRange> {
        self.range
    }

    /// Hint for an external transition subsystem, not used by the engine
    pub fn animatable(&self) -> bool {
        self.animatable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_kind() {
        assert_eq!(PropertyValue::from(0.5).kind(), PropertyKind::Double);
        assert_eq!(PropertyValue::from(true).kind(), PropertyKind::Boolean);
        assert_eq!(PropertyValue::from("x").kind(), PropertyKind::String);
    }

    #[test]
    fn test_parse_as() {
        assert_eq!(
            PropertyValue::parse_as(PropertyKind::Double, " 0.25"),
            Some(PropertyValue::Double(0.25))
        );
        assert_eq!(
            PropertyValue::parse_as(PropertyKind::Boolean, "On"),
            Some(PropertyValue::Boolean(true))
        );
        assert_eq!(PropertyValue::parse_as(PropertyKind::Boolean, "maybe"), None);
        assert_eq!(PropertyValue::parse_as(PropertyKind::Double, "abc"), None);
    }

    #[test]
    fn test_double_equality_is_bitwise() {
        assert_eq!(PropertyValue::Double(f64::NAN), PropertyValue::Double(f64::NAN));
        assert_ne!(PropertyValue::Double(0.0), PropertyValue::Double(-0.0));
        assert_eq!(PropertyValue::Double(0.5), PropertyValue::Double(0.5));
        assert_ne!(PropertyValue::Double(1.0), PropertyValue::Boolean(true));
    }

    #[test]
    fn test_range_validity() {
        assert!(ValueRange { min: 0.0, max: 1.0 }.is_valid());
        assert!(!ValueRange { min: 1.0, max: 1.0 }.is_valid());
        assert!(!ValueRange { min: 2.0, max: 1.0 }.is_valid());
        assert!(!ValueRange { min: 0.0, max: f64::INFINITY }.is_valid());
        assert!(!ValueRange { min: f64::NAN, max: 1.0 }.is_valid());
    }
}
