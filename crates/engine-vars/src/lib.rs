//! Typed variable store, lazy formatting and built-in values (component C1).

mod builtin;
mod error;
mod store;
mod value;

pub use builtin::is_privileged;
pub use error::{Error, Result};
pub use store::{Variable, VariableStore};
pub use value::{Value, Version};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_string_and_version_round_trip() {
        let mut store = VariableStore::new();
        store.set_string("PROP1", "VAL1", true).unwrap();
        store.set_numeric("PROP2", 2, true).unwrap();
        store
            .set_version("PROP3", Version::parse("v1.1.0.0"), true)
            .unwrap();

        assert_eq!(store.get_string("PROP2").unwrap(), "2");
        assert!(matches!(
            store.get_numeric("PROP1"),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(store.get_version("PROP3").unwrap().normalized(), "1.1.0.0");
    }

    #[test]
    fn truncated_versions_compare_equal() {
        assert_eq!(Version::parse("v1.1"), Version::parse("v1.1.0.0"));
    }

    #[test]
    fn hex_and_decimal_numeric_parsing() {
        let mut store = VariableStore::new();
        store.set_string("HEXVAL", "0x2A", true).unwrap();
        assert_eq!(store.get_numeric("HEXVAL").unwrap(), 42);

        store.set_string("NEG", "-5", true).unwrap();
        assert_eq!(store.get_numeric("NEG").unwrap(), -5);

        store.set_string("BAD", "12x", true).unwrap();
        assert!(store.get_numeric("BAD").is_err());
    }

    #[test]
    fn integer_boundaries() {
        let mut store = VariableStore::new();
        store
            .set_string("MIN", i64::MIN.to_string(), true)
            .unwrap();
        store
            .set_string("MAX", i64::MAX.to_string(), true)
            .unwrap();
        assert_eq!(store.get_numeric("MIN").unwrap(), i64::MIN);
        assert_eq!(store.get_numeric("MAX").unwrap(), i64::MAX);

        store
            .set_string("OOR", "99999999999999999999", true)
            .unwrap();
        assert!(store.get_numeric("OOR").is_err());
    }

    #[test]
    fn formatted_value_expands_on_read_only() {
        let mut store = VariableStore::new();
        store.set_string("PROP1", "VAL1", true).unwrap();
        store.set_formatted("PROP4", "[PROP1]", true).unwrap();

        let mut hidden = false;
        assert_eq!(store.get_formatted("PROP4", &mut hidden).unwrap(), "VAL1");
        assert_eq!(store.get_string("PROP4").unwrap(), "[PROP1]");
        assert!(!hidden);
    }

    #[test]
    fn escape_sequences_in_templates() {
        let store = VariableStore::new();
        let mut hidden = false;
        assert_eq!(store.format("[\\[]X[\\]]", &mut hidden), "[X]");
    }

    #[test]
    fn self_referencing_format_terminates() {
        let mut store = VariableStore::new();
        store.set_formatted("a", "[a]", true).unwrap();
        let mut hidden = false;
        assert_eq!(store.get_formatted("a", &mut hidden).unwrap(), "[a]");
    }

    #[test]
    fn unknown_reference_expands_to_empty_string() {
        let store = VariableStore::new();
        let mut hidden = false;
        assert_eq!(store.format("x[NOPE]y", &mut hidden), "xy");
    }

    #[test]
    fn hidden_values_are_flagged_when_expanded() {
        let mut store = VariableStore::new();
        store.declare(
            "SECRET",
            Value::String("s3cr3t".to_string()),
            true,
            false,
            false,
        );
        store.set_formatted("TEMPLATE", "token=[SECRET]", true).unwrap();
        let mut hidden = false;
        let expanded = store.get_formatted("TEMPLATE", &mut hidden).unwrap();
        assert_eq!(expanded, "token=s3cr3t");
        assert!(hidden);
    }

    #[test]
    fn builtin_variables_are_read_only() {
        let mut store = VariableStore::new();
        assert!(store.contains("PRIVILEGED"));
        assert!(matches!(
            store.set_numeric("PRIVILEGED", 1, true),
            Err(Error::InvalidArg { .. })
        ));
    }

    #[test]
    fn engine_active_latch_refuses_writes() {
        let mut store = VariableStore::new();
        store.set_engine_active(true);
        assert!(matches!(
            store.set_string("X", "y", true),
            Err(Error::EngineActive)
        ));
        store.set_engine_active(false);
        assert!(store.set_string("X", "y", true).is_ok());
    }

    #[test]
    fn serialize_round_trip_elides_hidden_by_default() {
        let mut store = VariableStore::new();
        store.set_string("PUBLIC", "visible", true).unwrap();
        store.declare(
            "SECRET",
            Value::String("shh".to_string()),
            true,
            false,
            false,
        );

        let without_hidden = VariableStore::deserialize(&store.serialize(false)).unwrap();
        assert!(without_hidden.get_string("SECRET").is_err());
        assert_eq!(without_hidden.get_string("PUBLIC").unwrap(), "visible");

        let with_hidden = VariableStore::deserialize(&store.serialize(true)).unwrap();
        assert_eq!(with_hidden.get_string("SECRET").unwrap(), "shh");
    }
}
