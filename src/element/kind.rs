//! Element kinds.

use std::fmt;

use crate::error::ConfigurationError;

/// Every element kind a schema may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Text,
    Textarea,
    Hidden,
    /// Multilingual text.
    TText,
    /// Multilingual textarea.
    TTextarea,
    Select,
    Checkbox,
    Toggle,
    Date,
    Dates,
    File,
    List,
    Object,
    Group,
    /// Display-only content without a value.
    Static,
}

impl ElementKind {
    pub const ALL: &'static [ElementKind] = &[
        Self::Text,
        Self::Textarea,
        Self::Hidden,
        Self::TText,
        Self::TTextarea,
        Self::Select,
        Self::Checkbox,
        Self::Toggle,
        Self::Date,
        Self::Dates,
        Self::File,
        Self::List,
        Self::Object,
        Self::Group,
        Self::Static,
    ];

    /// Parse the `type` of a descriptor.
    pub fn parse(kind: &str, path: &str) -> crate::Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name() == kind)
            .ok_or_else(|| ConfigurationError::UnknownKind {
                kind: kind.to_owned(),
                path: path.to_owned(),
            })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Hidden => "hidden",
            Self::TText => "ttext",
            Self::TTextarea => "ttextarea",
            Self::Select => "select",
            Self::Checkbox => "checkbox",
            Self::Toggle => "toggle",
            Self::Date => "date",
            Self::Dates => "dates",
            Self::File => "file",
            Self::List => "list",
            Self::Object => "object",
            Self::Group => "group",
            Self::Static => "static",
        }
    }

    /// Value lives in the children, not in the element.
    pub fn is_container(self) -> bool {
        matches!(self, Self::List | Self::Object | Self::Group)
    }

    /// Value is `{language: value}`.
    pub fn is_multilingual(self) -> bool {
        matches!(self, Self::TText | Self::TTextarea)
    }

    /// Holds a boolean-ish value coerced to `true_value`/`false_value`.
    pub fn is_toggle_like(self) -> bool {
        matches!(self, Self::Checkbox | Self::Toggle)
    }

    pub fn has_value(self) -> bool {
        self != Self::Static
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_kinds() {
        for kind in ElementKind::ALL {
            assert_eq!(ElementKind::parse(kind.name(), "x").unwrap(), *kind);
        }
    }

    #[test]
    fn unknown_kind() {
        let err = ElementKind::parse("slider", "volume").unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::UnknownKind { ref kind, ref path } if kind == "slider" && path == "volume"
        ));
    }

    #[test]
    fn classification() {
        assert!(ElementKind::Group.is_container());
        assert!(!ElementKind::Select.is_container());
        assert!(ElementKind::TTextarea.is_multilingual());
        assert!(ElementKind::Toggle.is_toggle_like());
        assert!(!ElementKind::Static.has_value());
    }
}
