//! Parameter types guessed from well-known parameter names.
//!
//! Pure convention: `dx`/`dy` pairs, coordinate and color bundles, `is...`
//! predicates, and a handful of suffix rules. Only active when the
//! `heuristics` setting is on, and only ever additive.

use crate::info::FunctionInfo;
use crate::types::Type;

const DIMENSIONS: &[&str] = &["x", "y", "z", "w", "h", "width", "height"];
const CHANNELS: &[&str] = &["r", "g", "b", "a"];

pub(crate) fn apply_parameter_heuristics(info: &mut FunctionInfo) {
    let names: Vec<String> = info
        .parameters
        .iter()
        .map(|parameter| stripped(&parameter.name).to_string())
        .collect();

    let has_dx_dy = names.iter().any(|name| name == "dx") && names.iter().any(|name| name == "dy");
    let dimension_count = names
        .iter()
        .filter(|name| DIMENSIONS.contains(&name.to_lowercase().as_str()))
        .count();
    let channel_count = names
        .iter()
        .filter(|name| CHANNELS.contains(&name.to_lowercase().as_str()))
        .count();

    for (parameter, name) in info.parameters.iter_mut().zip(&names) {
        let lowered = name.to_lowercase();

        if has_dx_dy && (name == "dx" || name == "dy") {
            parameter.types.insert(Type::Number);
        }
        if dimension_count >= 2 && DIMENSIONS.contains(&lowered.as_str()) {
            parameter.types.insert(Type::Number);
        }
        if channel_count >= 3 && CHANNELS.contains(&lowered.as_str()) {
            parameter.types.insert(Type::Number);
        }
        if is_predicate_name(name) {
            parameter.types.insert(Type::Boolean);
        }
        if !lowered.starts_with("do") && (lowered.starts_with("num") || lowered.ends_with("num")) {
            parameter.types.insert(Type::Number);
        }
        if !lowered.starts_with("do")
            && (lowered.ends_with("str") || lowered.ends_with("name") || lowered.ends_with("title"))
        {
            parameter.types.insert(Type::String);
        }
        if lowered == "target" || is_numbered(&lowered, "param") || is_numbered(&lowered, "arg") {
            parameter.types.insert(Type::Unknown);
        }
    }
}

/// One leading underscore is ignored: `_dx` reads as `dx`.
fn stripped(name: &str) -> &str {
    name.strip_prefix('_').unwrap_or(name)
}

/// `isVisible`, `isOpen`: an `is` prefix followed by an uppercase letter.
fn is_predicate_name(name: &str) -> bool {
    name.strip_prefix("is")
        .and_then(|rest| rest.chars().next())
        .is_some_and(char::is_uppercase)
}

/// `param1`, `arg2`: a known prefix with only digits after it.
fn is_numbered(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|character| character.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::apply_parameter_heuristics;
    use crate::ids::{Id, IdKind};
    use crate::info::{FunctionInfo, ParameterInfo};
    use crate::types::{Type, TypeSet};

    fn function_with(parameters: &[&str]) -> FunctionInfo {
        let mut info = FunctionInfo::default();
        info.parameters = parameters
            .iter()
            .enumerate()
            .map(|(index, name)| ParameterInfo {
                id: Id::new(IdKind::Parameter, u32::try_from(index).unwrap(), (*name).into()),
                name: (*name).into(),
                types: TypeSet::default(),
            })
            .collect();
        info
    }

    fn types_of<'a>(info: &'a FunctionInfo, name: &str) -> &'a TypeSet {
        &info
            .parameters
            .iter()
            .find(|parameter| parameter.name == name)
            .unwrap()
            .types
    }

    #[test]
    fn dx_dy_pair() {
        let mut info = function_with(&["dx", "dy", "label"]);
        apply_parameter_heuristics(&mut info);
        assert!(types_of(&info, "dx").contains(&Type::Number));
        assert!(types_of(&info, "dy").contains(&Type::Number));
        assert!(types_of(&info, "label").is_empty());
    }

    #[test]
    fn lone_dx_is_not_enough() {
        let mut info = function_with(&["dx", "label"]);
        apply_parameter_heuristics(&mut info);
        assert!(types_of(&info, "dx").is_empty());
    }

    #[test]
    fn dimension_bundle() {
        let mut info = function_with(&["x", "y", "width", "height"]);
        apply_parameter_heuristics(&mut info);
        for name in ["x", "y", "width", "height"] {
            assert!(types_of(&info, name).contains(&Type::Number));
        }
    }

    #[test]
    fn lone_coordinate_is_not_enough() {
        let mut info = function_with(&["x", "label"]);
        apply_parameter_heuristics(&mut info);
        assert!(types_of(&info, "x").is_empty());
    }

    #[test]
    fn color_bundle_needs_three() {
        let mut info = function_with(&["r", "g"]);
        apply_parameter_heuristics(&mut info);
        assert!(types_of(&info, "r").is_empty());

        let mut info = function_with(&["r", "g", "b", "a"]);
        apply_parameter_heuristics(&mut info);
        for name in ["r", "g", "b", "a"] {
            assert!(types_of(&info, name).contains(&Type::Number));
        }
    }

    #[test_case("isVisible", Type::Boolean; "is predicate")]
    #[test_case("numItems", Type::Number; "num prefix")]
    #[test_case("itemNum", Type::Number; "num suffix")]
    #[test_case("firstName", Type::String; "name suffix")]
    #[test_case("windowTitle", Type::String; "title suffix")]
    #[test_case("searchStr", Type::String; "str suffix")]
    #[test_case("target", Type::Unknown; "target")]
    #[test_case("param1", Type::Unknown; "numbered param")]
    #[test_case("arg2", Type::Unknown; "numbered arg")]
    #[test_case("_dxArgName", Type::String; "underscore stripped name suffix")]
    fn single_name_rules(name: &str, expected: Type) {
        let mut info = function_with(&[name]);
        apply_parameter_heuristics(&mut info);
        assert!(types_of(&info, name).contains(&expected));
    }

    #[test_case("island"; "is without uppercase")]
    #[test_case("doName"; "do prefix blocks string rule")]
    #[test_case("doNum"; "do prefix blocks number rule")]
    #[test_case("param"; "param without digits")]
    fn names_that_match_nothing(name: &str) {
        let mut info = function_with(&[name]);
        apply_parameter_heuristics(&mut info);
        assert!(types_of(&info, name).is_empty());
    }
}
