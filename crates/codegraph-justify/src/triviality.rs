//! Triviality Filter (C3, §4.3). A static table of rules, checked in order,
//! first match wins. Runs in STRICT mode only (§9 Open Question (a)): the
//! lenient variant some implementations carry is not offered here, since
//! the spec mandates strict behavior and the two cannot both be enabled.

use codegraph_core::{Entity, EntityKind, InferredFrom, JustificationDraft};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Names matching this pattern are never trivial, regardless of length or
/// any other rule (§4.3 "sensitive short-circuit").
static SENSITIVE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)auth|security|validate|verify|credential|password|secret|token|permission|role|check|guard|encrypt|decrypt",
    )
    .expect("sensitive name pattern is a valid regex")
});

static GETTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(get|is|has)[A-Z]").unwrap());
static SETTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^set[A-Z]").unwrap());
static UNDERSCORE_PREFIXED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^_").unwrap());

const STANDARD_ACCESSORS: &[&str] = &[
    "toString", "valueOf", "toJSON", "clone", "copy", "equals", "hashCode", "compareTo",
];

/// The reason a triviality rule fired, carried through for diagnostics and
/// tests; not part of the persisted justification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrivialReason {
    SimpleGetter,
    SimpleSetter,
    StandardAccessor,
    SimpleConstructor,
    VeryShortFunction,
    TrivialUtility,
    MinimalClass,
    ErrorClass,
    DataClass,
    MinimalInterface,
    ConfigInterface,
    TestFile,
    IndexFile,
    TypeFile,
    ConfigFile,
}

impl TrivialReason {
    /// Rule-specific confidence the default justification is assigned
    /// (§4.3: "high rule-specific confidence (0.7-0.95)").
    pub fn confidence(self) -> f32 {
        match self {
            TrivialReason::SimpleGetter | TrivialReason::SimpleSetter => 0.9,
            TrivialReason::StandardAccessor => 0.85,
            TrivialReason::SimpleConstructor => 0.8,
            TrivialReason::VeryShortFunction => 0.75,
            TrivialReason::TrivialUtility => 0.7,
            TrivialReason::MinimalClass => 0.8,
            TrivialReason::ErrorClass => 0.85,
            TrivialReason::DataClass => 0.8,
            TrivialReason::MinimalInterface => 0.8,
            TrivialReason::ConfigInterface => 0.9,
            TrivialReason::TestFile => 0.95,
            TrivialReason::IndexFile => 0.9,
            TrivialReason::TypeFile => 0.85,
            TrivialReason::ConfigFile => 0.85,
        }
    }

    fn feature_context(self) -> &'static str {
        match self {
            TrivialReason::SimpleGetter
            | TrivialReason::SimpleSetter
            | TrivialReason::StandardAccessor
            | TrivialReason::SimpleConstructor
            | TrivialReason::VeryShortFunction
            | TrivialReason::TrivialUtility => "Utilities",
            TrivialReason::MinimalClass | TrivialReason::DataClass => "Data Model",
            TrivialReason::ErrorClass => "Error Handling",
            TrivialReason::MinimalInterface | TrivialReason::ConfigInterface => "Configuration",
            TrivialReason::TestFile => "Testing",
            TrivialReason::IndexFile => "Module Exports",
            TrivialReason::TypeFile => "Type Definitions",
            TrivialReason::ConfigFile => "Configuration",
        }
    }

    fn purpose_summary(self, entity: &Entity) -> String {
        match self {
            TrivialReason::SimpleGetter => format!("Returns the value of a property on `{}`.", entity.name),
            TrivialReason::SimpleSetter => format!("Assigns the value of a property on `{}`.", entity.name),
            TrivialReason::StandardAccessor => {
                format!("Standard `{}` accessor implementation.", entity.name)
            }
            TrivialReason::SimpleConstructor => "Initializes a new instance.".to_string(),
            TrivialReason::VeryShortFunction => {
                format!("Single-line helper function `{}`.", entity.name)
            }
            TrivialReason::TrivialUtility => format!("Trivial utility function `{}`.", entity.name),
            TrivialReason::MinimalClass => format!("Minimal class `{}` with little behavior.", entity.name),
            TrivialReason::ErrorClass => format!("Represents an error condition (`{}`).", entity.name),
            TrivialReason::DataClass => format!("Plain data container `{}`.", entity.name),
            TrivialReason::MinimalInterface => format!("Minimal interface `{}`.", entity.name),
            TrivialReason::ConfigInterface => format!("Configuration shape for `{}`.", entity.name),
            TrivialReason::TestFile => format!("Test file `{}`.", entity.file_path),
            TrivialReason::IndexFile => format!("Module entry point `{}`.", entity.file_path),
            TrivialReason::TypeFile => format!("Type declaration file `{}`.", entity.file_path),
            TrivialReason::ConfigFile => format!("Configuration/constants file `{}`.", entity.file_path),
        }
    }

    fn business_value(self) -> &'static str {
        match self {
            TrivialReason::SimpleGetter | TrivialReason::SimpleSetter => {
                "Provides controlled access to internal state."
            }
            TrivialReason::StandardAccessor => "Supports standard object comparison/serialization.",
            TrivialReason::SimpleConstructor => "Establishes object invariants at creation time.",
            TrivialReason::VeryShortFunction | TrivialReason::TrivialUtility => {
                "Supports code reuse without independent business logic."
            }
            TrivialReason::MinimalClass | TrivialReason::DataClass => {
                "Structures data passed between components."
            }
            TrivialReason::ErrorClass => "Communicates failure conditions to callers.",
            TrivialReason::MinimalInterface | TrivialReason::ConfigInterface => {
                "Documents the shape of configuration or options."
            }
            TrivialReason::TestFile => "Verifies behavior of the system under test.",
            TrivialReason::IndexFile => "Aggregates and re-exports module contents.",
            TrivialReason::TypeFile => "Documents data shapes for type-checking.",
            TrivialReason::ConfigFile => "Centralizes configuration values.",
        }
    }

    fn tags(self) -> BTreeSet<String> {
        let tag = match self {
            TrivialReason::SimpleGetter => "getter",
            TrivialReason::SimpleSetter => "setter",
            TrivialReason::StandardAccessor => "accessor",
            TrivialReason::SimpleConstructor => "constructor",
            TrivialReason::VeryShortFunction => "short-function",
            TrivialReason::TrivialUtility => "utility",
            TrivialReason::MinimalClass => "minimal-class",
            TrivialReason::ErrorClass => "error",
            TrivialReason::DataClass => "data-class",
            TrivialReason::MinimalInterface => "minimal-interface",
            TrivialReason::ConfigInterface => "config",
            TrivialReason::TestFile => "test",
            TrivialReason::IndexFile => "index",
            TrivialReason::TypeFile => "types",
            TrivialReason::ConfigFile => "config",
        };
        BTreeSet::from([tag.to_string()])
    }
}

fn file_basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Evaluates whether `entity` is trivial under the strict rule set,
/// returning the matched reason if so. `None` means the entity must go
/// through the full pipeline (batching + LLM inference).
pub fn classify(entity: &Entity) -> Option<TrivialReason> {
    // Sensitive short-circuit applies to functions/methods regardless of
    // any other rule (§4.3, §8 "Triviality conservative over sensitive
    // names").
    if matches!(entity.kind, EntityKind::Function | EntityKind::Method)
        && SENSITIVE_NAME.is_match(&entity.name)
    {
        return None;
    }

    match entity.kind {
        EntityKind::Function | EntityKind::Method => classify_function(entity),
        EntityKind::Class => classify_class(entity),
        EntityKind::Interface => classify_interface(entity),
        EntityKind::File => classify_file(entity),
        EntityKind::TypeAlias | EntityKind::Variable | EntityKind::Module => None,
    }
}

fn classify_function(entity: &Entity) -> Option<TrivialReason> {
    let name = entity.name.as_str();
    let lines = entity.line_count();

    if GETTER.is_match(name) && lines <= 3 {
        return Some(TrivialReason::SimpleGetter);
    }
    if SETTER.is_match(name) && lines <= 3 {
        return Some(TrivialReason::SimpleSetter);
    }
    if STANDARD_ACCESSORS.contains(&name) {
        return Some(TrivialReason::StandardAccessor);
    }
    if name == "constructor" && lines <= 5 {
        return Some(TrivialReason::SimpleConstructor);
    }
    if lines <= 1 {
        return Some(TrivialReason::VeryShortFunction);
    }
    if name == "noop" || name == "identity" || UNDERSCORE_PREFIXED.is_match(name) {
        return Some(TrivialReason::TrivialUtility);
    }
    None
}

fn classify_class(entity: &Entity) -> Option<TrivialReason> {
    let name = entity.name.as_str();
    let lines = entity.line_count();

    if name.ends_with("Error") || name.ends_with("Exception") {
        // size-independent
        return Some(TrivialReason::ErrorClass);
    }
    if lines <= 3 {
        return Some(TrivialReason::MinimalClass);
    }
    if lines <= 10
        && (name.ends_with("Data")
            || name.ends_with("DTO")
            || name.ends_with("Model")
            || name.ends_with("Entity")
            || name.ends_with("Record")
            || name.ends_with("State"))
    {
        return Some(TrivialReason::DataClass);
    }
    None
}

fn classify_interface(entity: &Entity) -> Option<TrivialReason> {
    let name = entity.name.as_str();
    let lines = entity.line_count();

    const CONFIG_SUFFIXES: &[&str] = &[
        "Props", "Options", "Config", "Settings", "Params", "Args", "Input", "Output", "Response",
        "Request",
    ];
    if CONFIG_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        // size-independent
        return Some(TrivialReason::ConfigInterface);
    }
    if lines <= 3 {
        return Some(TrivialReason::MinimalInterface);
    }
    None
}

fn classify_file(entity: &Entity) -> Option<TrivialReason> {
    let base = file_basename(&entity.file_path).to_lowercase();

    if base.contains(".test.") || base.contains(".spec.") {
        return Some(TrivialReason::TestFile);
    }
    if base.starts_with("index.") {
        return Some(TrivialReason::IndexFile);
    }
    if base.ends_with(".d.ts") || base == "types.ts" || base == "interface.ts" {
        return Some(TrivialReason::TypeFile);
    }
    if base.starts_with("config.") || base.starts_with("constants.") || base.starts_with("env.") {
        return Some(TrivialReason::ConfigFile);
    }
    None
}

/// Builds the fixed default justification for a trivial entity (§4.3
/// "Every rule emits fixed default_justification"). Used with
/// `inferred_from = file_name`, matching §4.5 step 2.
pub fn default_justification(entity: &Entity, reason: TrivialReason) -> JustificationDraft {
    JustificationDraft {
        purpose_summary: reason.purpose_summary(entity),
        business_value: reason.business_value().to_string(),
        feature_context: reason.feature_context().to_string(),
        detailed_description: String::new(),
        tags: reason.tags(),
        confidence_score: reason.confidence(),
        inferred_from: InferredFrom::FileName,
        reasoning: "Matched a triviality rule; no LLM call was made.".to_string(),
        evidence_sources: vec![entity.file_path.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::SourceRange;
    use uuid::Uuid;

    fn function(name: &str, lines: u32) -> Entity {
        Entity::new(
            Uuid::new_v4(),
            name,
            "src/app.ts",
            EntityKind::Function,
            SourceRange::Span {
                start_line: 1,
                end_line: lines,
            },
        )
    }

    fn class(name: &str, lines: u32) -> Entity {
        Entity::new(
            Uuid::new_v4(),
            name,
            "src/app.ts",
            EntityKind::Class,
            SourceRange::Span {
                start_line: 1,
                end_line: lines,
            },
        )
    }

    fn interface(name: &str, lines: u32) -> Entity {
        Entity::new(
            Uuid::new_v4(),
            name,
            "src/types.ts",
            EntityKind::Interface,
            SourceRange::Span {
                start_line: 1,
                end_line: lines,
            },
        )
    }

    fn file(path: &str) -> Entity {
        Entity::new(
            Uuid::new_v4(),
            path,
            path,
            EntityKind::File,
            SourceRange::Span {
                start_line: 1,
                end_line: 1,
            },
        )
    }

    #[test]
    fn scenario_1_trivial_config_interfaces() {
        for name in ["FooProps", "BarOptions", "BazConfig"] {
            let entity = interface(name, 25);
            let reason = classify(&entity).expect("should be trivial");
            assert_eq!(reason, TrivialReason::ConfigInterface);
            let draft = default_justification(&entity, reason);
            assert_eq!(draft.feature_context, "Configuration");
            assert!((draft.confidence_score - 0.9).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn scenario_2_sensitive_name_defeats_length_rule() {
        let entity = function("validateInput", 1);
        assert!(classify(&entity).is_none());
    }

    #[test]
    fn getter_at_threshold_is_trivial_one_more_is_not() {
        let at_threshold = function("getName", 3);
        assert_eq!(classify(&at_threshold), Some(TrivialReason::SimpleGetter));

        let over_threshold = function("getName", 4);
        assert_eq!(classify(&over_threshold), None);
    }

    #[test]
    fn sensitive_regex_beats_every_other_signal() {
        for name in [
            "checkPermission",
            "isAuthorized",
            "hasToken",
            "encryptPayload",
            "verifyUser",
        ] {
            let entity = function(name, 1);
            assert!(
                classify(&entity).is_none(),
                "{name} should never be classified trivial"
            );
        }
    }

    #[test]
    fn error_class_is_trivial_regardless_of_size() {
        let entity = class("ValidationError", 80);
        assert_eq!(classify(&entity), Some(TrivialReason::ErrorClass));
    }

    #[test]
    fn data_class_requires_short_body() {
        let short = class("UserData", 8);
        assert_eq!(classify(&short), Some(TrivialReason::DataClass));
        let long = class("UserData", 11);
        assert_eq!(classify(&long), None);
    }

    #[test]
    fn standard_accessor_matches_exact_names() {
        let entity = function("toString", 40);
        assert_eq!(classify(&entity), Some(TrivialReason::StandardAccessor));
    }

    #[test]
    fn underscore_prefixed_function_is_trivial_utility() {
        let entity = function("_internalHelper", 12);
        assert_eq!(classify(&entity), Some(TrivialReason::TrivialUtility));
    }

    #[test]
    fn test_file_pattern_matches() {
        let entity = file("src/app.test.ts");
        assert_eq!(classify(&entity), Some(TrivialReason::TestFile));
    }

    #[test]
    fn index_file_pattern_matches() {
        let entity = file("src/components/index.ts");
        assert_eq!(classify(&entity), Some(TrivialReason::IndexFile));
    }

    #[test]
    fn non_trivial_file_is_not_classified() {
        let entity = file("src/services/payment_processor.ts");
        assert_eq!(classify(&entity), None);
    }
}
