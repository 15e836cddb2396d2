//! Per-kind feature recipes.
//!
//! Each kind is a fixed, ordered list of capabilities. Composition applies them in
//! order, so every feature can rely on the ones it depends on being in place.

use super::kind::ElementKind;

/// A capability an element may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Name, kind, flags.
    Base,
    Path,
    /// Language list of multilingual kinds.
    Languages,
    NullValue,
    Default,
    Value,
    Conditions,
    Validation,
    /// Change listeners.
    Events,
    Label,
    GenericName,
    /// Column width.
    Layout,
    Debounce,
    /// Option list of select-like kinds.
    Items,
    /// Nested schema or list item template.
    Children,
}

impl Feature {
    /// Features that must be applied earlier in a recipe.
    pub fn dependencies(self) -> &'static [Feature] {
        use Feature::*;
        match self {
            Base => &[],
            Path => &[Base],
            Languages => &[Base],
            NullValue => &[Base],
            Default => &[NullValue, Path],
            Value => &[NullValue, Default],
            Conditions => &[Path],
            Label => &[Base],
            GenericName => &[Label],
            Validation => &[Path, Value, GenericName],
            Events => &[Value],
            Layout => &[Base],
            Debounce => &[Validation],
            Items => &[Value],
            Children => &[Path, Default],
        }
    }
}

const TEXT: &[Feature] = &[
    Feature::Base,
    Feature::Path,
    Feature::NullValue,
    Feature::Default,
    Feature::Value,
    Feature::Conditions,
    Feature::Label,
    Feature::GenericName,
    Feature::Validation,
    Feature::Events,
    Feature::Layout,
    Feature::Debounce,
];

const HIDDEN: &[Feature] = &[
    Feature::Base,
    Feature::Path,
    Feature::NullValue,
    Feature::Default,
    Feature::Value,
    Feature::Conditions,
    Feature::Label,
    Feature::GenericName,
    Feature::Validation,
    Feature::Events,
];

const MULTILINGUAL: &[Feature] = &[
    Feature::Base,
    Feature::Path,
    Feature::Languages,
    Feature::NullValue,
    Feature::Default,
    Feature::Value,
    Feature::Conditions,
    Feature::Label,
    Feature::GenericName,
    Feature::Validation,
    Feature::Events,
    Feature::Layout,
    Feature::Debounce,
];

const SELECT: &[Feature] = &[
    Feature::Base,
    Feature::Path,
    Feature::NullValue,
    Feature::Default,
    Feature::Value,
    Feature::Items,
    Feature::Conditions,
    Feature::Label,
    Feature::GenericName,
    Feature::Validation,
    Feature::Events,
    Feature::Layout,
];

const CHOICE: &[Feature] = &[
    Feature::Base,
    Feature::Path,
    Feature::NullValue,
    Feature::Default,
    Feature::Value,
    Feature::Conditions,
    Feature::Label,
    Feature::GenericName,
    Feature::Validation,
    Feature::Events,
    Feature::Layout,
];

const CONTAINER: &[Feature] = &[
    Feature::Base,
    Feature::Path,
    Feature::NullValue,
    Feature::Default,
    Feature::Value,
    Feature::Conditions,
    Feature::Label,
    Feature::GenericName,
    Feature::Validation,
    Feature::Events,
    Feature::Layout,
    Feature::Children,
];

const STATIC: &[Feature] = &[
    Feature::Base,
    Feature::Path,
    Feature::Conditions,
    Feature::Label,
    Feature::Layout,
];

/// The recipe of `kind`.
pub fn recipe(kind: ElementKind) -> &'static [Feature] {
    match kind {
        ElementKind::Text | ElementKind::Textarea => TEXT,
        ElementKind::Hidden => HIDDEN,
        ElementKind::TText | ElementKind::TTextarea => MULTILINGUAL,
        ElementKind::Select => SELECT,
        ElementKind::Checkbox
        | ElementKind::Toggle
        | ElementKind::Date
        | ElementKind::Dates
        | ElementKind::File => CHOICE,
        ElementKind::List | ElementKind::Object | ElementKind::Group => CONTAINER,
        ElementKind::Static => STATIC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_come_first() {
        for &kind in ElementKind::ALL {
            let features = recipe(kind);
            for (position, feature) in features.iter().enumerate() {
                for dependency in feature.dependencies() {
                    let found = features[..position].contains(dependency);
                    assert!(found, "{kind}: {feature:?} needs {dependency:?} earlier");
                }
            }
        }
    }

    #[test]
    fn no_feature_twice() {
        for &kind in ElementKind::ALL {
            let features = recipe(kind);
            for (i, feature) in features.iter().enumerate() {
                assert!(!features[i + 1..].contains(feature), "{kind}: {feature:?} repeated");
            }
        }
    }

    #[test]
    fn recipes_match_kinds() {
        assert!(recipe(ElementKind::TText).contains(&Feature::Languages));
        assert!(!recipe(ElementKind::Text).contains(&Feature::Languages));
        assert!(recipe(ElementKind::Select).contains(&Feature::Items));
        assert!(recipe(ElementKind::List).contains(&Feature::Children));
        assert!(!recipe(ElementKind::Static).contains(&Feature::Value));
        assert_eq!(recipe(ElementKind::Text)[0], Feature::Base);
    }
}
