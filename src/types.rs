use serde::{Deserialize, Serialize};
use std::fmt;

/// Controller pin number as written in a sketch (`digitalWrite(13, HIGH)`).
pub type PinNumber = i64;

/// Opaque key identifying one isolated simulation session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        SessionKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(value: &str) -> Self {
        SessionKey::new(value)
    }
}

impl From<String> for SessionKey {
    fn from(value: String) -> Self {
        SessionKey(value)
    }
}

/// A pin of a circuit component, rendered as `componentId.pinName`.
///
/// Kept as two fields rather than a joined string so component ids that
/// themselves contain a dot never split ambiguously.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub component: String,
    pub pin: String,
}

impl NodeId {
    pub fn new(component: impl Into<String>, pin: impl Into<String>) -> Self {
        NodeId {
            component: component.into(),
            pin: pin.into(),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component, self.pin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let node = NodeId::new("uno", "D13");
        assert_eq!(node.to_string(), "uno.D13");
    }

    #[test]
    fn test_node_id_keeps_dotted_component() {
        let a = NodeId::new("a.b", "c");
        let b = NodeId::new("a", "b.c");
        assert_ne!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_session_key_conversions() {
        let key: SessionKey = "lab-1".into();
        assert_eq!(key.as_str(), "lab-1");
        assert_eq!(SessionKey::from("lab-1".to_string()), key);
        assert_eq!(format!("{}", key), "lab-1");
    }
}
