// Copyright © 2024 Pathway

use bytes::BytesMut;
use postgres::types::{IsNull, ToSql, Type};

use inventory_sync_engine::engine::Value;

fn assert_success<T: ToSql>(value: Value, postgres_type: &Type, expected: T) {
    let mut value_bytes = BytesMut::new();
    let value_is_null = value
        .to_sql_checked(postgres_type, &mut value_bytes)
        .unwrap_or_else(|e| panic!("converting {value:?} to {postgres_type} failed: {e}"));

    let mut expected_bytes = BytesMut::new();
    let expected_is_null = expected
        .to_sql_checked(postgres_type, &mut expected_bytes)
        .unwrap_or_else(|e| panic!("converting {expected:?} to {postgres_type} failed: {e}"));

    assert!(matches!(value_is_null, IsNull::No), "{value:?} converted to null");
    assert!(matches!(expected_is_null, IsNull::No));
    assert_eq!(
        value_bytes, expected_bytes,
        "expected {value:?} to convert to {postgres_type} as {expected_bytes:?} but got {value_bytes:?}"
    );
}

fn assert_failure(value: Value, postgres_type: &Type) -> String {
    match value.to_sql_checked(postgres_type, &mut BytesMut::new()) {
        Ok(_) => panic!("expected {value:?} not to convert to {postgres_type}"),
        Err(error) => error.to_string(),
    }
}

#[test]
fn test_bool() {
    assert_success(Value::Bool(true), &Type::BOOL, true);
    assert_success(Value::Bool(false), &Type::BOOL, false);
    assert_failure(Value::Bool(true), &Type::TEXT);
}

#[test]
fn test_int() {
    assert_success(Value::Int(-42), &Type::INT2, -42i16);
    assert_success(Value::Int(42 << 8), &Type::INT2, 42i16 << 8);
    assert_failure(Value::Int(42 << 16), &Type::INT2);
    assert_failure(Value::Int(42 << 32), &Type::INT2);

    assert_success(Value::Int(-42), &Type::INT4, -42i32);
    assert_success(Value::Int(42 << 16), &Type::INT4, 42i32 << 16);
    assert_failure(Value::Int(42 << 32), &Type::INT4);

    assert_success(Value::Int(-42), &Type::INT8, -42i64);
    assert_success(Value::Int(42 << 32), &Type::INT8, 42i64 << 32);
    assert_success(Value::Int(i64::MAX), &Type::INT8, i64::MAX);

    assert_failure(Value::Int(42), &Type::TEXT);
    assert_failure(Value::Int(1), &Type::BOOL);
}

#[test]
fn test_string() {
    assert_success(Value::from("Lamp, desk"), &Type::TEXT, "Lamp, desk");
    assert_success(Value::from(""), &Type::TEXT, "");
    assert_success(Value::from("SKU-1"), &Type::VARCHAR, "SKU-1");
    assert_failure(Value::from("42"), &Type::INT8);
}

#[test]
fn test_wrong_value_type_names_both_types() {
    let message = assert_failure(Value::Bool(true), &Type::INT8);
    assert!(message.contains("bool"), "unexpected error: {message}");
    assert!(message.contains("int8"), "unexpected error: {message}");
}
