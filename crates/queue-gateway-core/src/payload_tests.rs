use super::*;

#[test]
fn test_person_serializes_to_flat_json() {
    let person = Person {
        name: "Ola Nordmann".to_string(),
        age: 42,
    };
    assert_eq!(
        serde_json::to_string(&person).unwrap(),
        r#"{"name":"Ola Nordmann","age":42}"#
    );
}

#[test]
fn test_blank_name_fails_validation() {
    let person = Person {
        name: "  ".to_string(),
        age: 1,
    };
    assert_eq!(
        person.validate(),
        Err(ValidationError::Required {
            field: "name".to_string()
        })
    );
}

#[test]
fn test_negative_age_cannot_be_deserialized() {
    assert!(serde_json::from_str::<Person>(r#"{"name":"Ola","age":-1}"#).is_err());
}
