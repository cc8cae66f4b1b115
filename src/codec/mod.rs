// Native columnar vectors and their translation to and from host values.
//
// - vector: physical layout of a column (`Vector`, `VectorData`) and result chunks
// - decode: recursive decoder from a vector cell to a host `Value`, VARIANT included
// - encode: builds vectors from host values; used by engines and for bound parameters

mod decode;
mod encode;
mod vector;

pub use decode::decode_value;
pub use encode::{encode_values, encode_variant, infer_type};
pub use vector::{DataChunk, ListEntry, Vector, VectorData};

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, NaiveDate, NaiveTime, TimeZone};
    use num_bigint::BigInt;

    use super::*;
    use crate::types::{
        Decimal, Interval, LogicalType, MapValue, Sequence, StructValue, TimeTz, Value,
    };

    fn roundtrip(ty: &LogicalType, values: &[Value]) -> Vec<Value> {
        let vector = encode_values(ty, values).unwrap();
        (0..vector.len())
            .map(|row| decode_value(&vector, row).unwrap())
            .collect()
    }

    #[test]
    fn variant_rows_keep_their_runtime_host_types() {
        let rows = vec![
            Some((LogicalType::Varchar, Value::from("text"))),
            Some((LogicalType::Boolean, Value::Boolean(true))),
            Some((LogicalType::TinyInt, Value::TinyInt(-8))),
            Some((LogicalType::SmallInt, Value::SmallInt(-16))),
            Some((LogicalType::Integer, Value::Integer(-32))),
            Some((LogicalType::BigInt, Value::BigInt(-64))),
            Some((LogicalType::HugeInt, Value::from(i128::MIN))),
            Some((LogicalType::UTinyInt, Value::UTinyInt(8))),
            Some((LogicalType::USmallInt, Value::USmallInt(16))),
            Some((LogicalType::UInteger, Value::UInteger(32))),
            Some((LogicalType::UBigInt, Value::UBigInt(u64::MAX))),
            Some((LogicalType::Float, Value::Float(1.5))),
            Some((LogicalType::Double, Value::Double(2.25))),
            Some((
                LogicalType::Decimal { precision: 9, scale: 2 },
                Value::Decimal(Decimal::new(12345, 2)),
            )),
            None,
        ];
        let expected: Vec<Value> = rows
            .iter()
            .map(|r| r.as_ref().map_or(Value::Null, |(_, v)| v.clone()))
            .collect();
        let vector = encode_variant(rows).unwrap();
        let decoded: Vec<Value> = (0..vector.len())
            .map(|row| decode_value(&vector, row).unwrap())
            .collect();
        assert_eq!(decoded, expected);

        let classes: Vec<&str> = decoded.iter().map(Value::host_class_name).collect();
        assert_eq!(
            &classes[..7],
            &["String", "bool", "i8", "i16", "i32", "i64", "num_bigint::BigInt"]
        );
        assert_eq!(decoded[14], Value::Null);
    }

    #[test]
    fn null_variant_differs_from_variant_holding_typed_null() {
        let vector = encode_variant(vec![
            None,
            Some((LogicalType::Integer, Value::Null)),
            Some((LogicalType::Integer, Value::Integer(4))),
        ])
        .unwrap();
        assert_eq!(decode_value(&vector, 0).unwrap(), Value::Null);
        assert_eq!(
            decode_value(&vector, 1).unwrap(),
            Value::TypedNull(LogicalType::Integer)
        );
        assert_eq!(decode_value(&vector, 2).unwrap(), Value::Integer(4));
    }

    #[test]
    fn nested_variants_inside_composites_resolve_per_element() {
        let list = Value::List(Sequence::list(vec![
            Value::Integer(1),
            Value::from("two"),
            Value::Double(3.0),
            Value::Null,
        ]));
        let ty = infer_type(&list);
        assert_eq!(ty, LogicalType::List(Box::new(LogicalType::Variant)));
        let decoded = roundtrip(&LogicalType::Variant, std::slice::from_ref(&list));
        let seq = decoded[0].as_sequence().unwrap();
        let classes: Vec<&str> = seq.iter().map(Value::host_class_name).collect();
        assert_eq!(classes, vec!["i32", "String", "f64", "sql_bridge::Value"]);

        let record = Value::Struct(StructValue::new(vec![
            ("a".into(), Value::SmallInt(1)),
            ("b".into(), list.clone()),
        ]));
        let decoded = roundtrip(&LogicalType::Variant, std::slice::from_ref(&record));
        assert_eq!(decoded[0], record);
    }

    #[test]
    fn decimal_uses_declared_scale_for_every_backing_width() {
        for precision in [4u8, 9, 18, 38] {
            let ty = LogicalType::Decimal { precision, scale: 2 };
            let decoded = roundtrip(&ty, &[Value::Decimal("12.5".parse().unwrap()), Value::Null]);
            assert_eq!(decoded[0], Value::Decimal(Decimal::new(1250, 2)));
            assert_eq!(decoded[0].as_decimal().unwrap().to_string(), "12.50");
            assert_eq!(decoded[1], Value::Null);
        }

        let wide = LogicalType::Decimal { precision: 18, scale: 7 };
        let vector = Vector::new(wide, 1, None, VectorData::Int16(vec![42])).unwrap();
        assert_eq!(
            decode_value(&vector, 0).unwrap(),
            Value::Decimal(Decimal::new(42, 7))
        );
    }

    #[test]
    fn decimal_that_loses_digits_is_rejected() {
        let ty = LogicalType::Decimal { precision: 4, scale: 2 };
        assert!(encode_values(&ty, &[Value::Decimal("123.45".parse().unwrap())]).is_err());
        assert!(encode_values(&ty, &[Value::Decimal("1.234".parse().unwrap())]).is_err());
    }

    #[test]
    fn integer_widths_are_range_checked() {
        assert!(encode_values(&LogicalType::TinyInt, &[Value::Integer(300)]).is_err());
        assert!(encode_values(&LogicalType::UTinyInt, &[Value::Integer(-1)]).is_err());
        let huge = Value::UHugeInt(BigInt::from(u128::MAX));
        assert_eq!(roundtrip(&LogicalType::UHugeInt, &[huge.clone()]), vec![huge]);
    }

    #[test]
    fn map_keeps_insertion_order_and_duplicates() {
        let map = Value::Map(MapValue::from_pairs(vec![
            (Value::from("zeta"), Value::Integer(1)),
            (Value::from("alpha"), Value::Null),
            (Value::from("zeta"), Value::Integer(3)),
        ]));
        let ty = LogicalType::Map(Box::new(LogicalType::Varchar), Box::new(LogicalType::Integer));
        let decoded = roundtrip(&ty, &[map.clone(), Value::Null]);
        assert_eq!(decoded[0], map);
        let keys: Vec<&str> = decoded[0]
            .as_map()
            .unwrap()
            .iter()
            .filter_map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, vec!["zeta", "alpha", "zeta"]);
        assert_eq!(decoded[1], Value::Null);
    }

    #[test]
    fn struct_preserves_field_order_and_null_fields() {
        let ty = LogicalType::Struct(vec![
            ("v".into(), LogicalType::Varchar),
            ("i".into(), LogicalType::Integer),
        ]);
        let value = Value::Struct(StructValue::new(vec![
            ("v".into(), Value::from("x")),
            ("i".into(), Value::Null),
        ]));
        let decoded = roundtrip(&ty, &[value, Value::Null]);
        let fields: Vec<&str> = decoded[0].as_struct().unwrap().field_names().collect();
        assert_eq!(fields, vec!["v", "i"]);
        assert_eq!(decoded[0].as_struct().unwrap().get("i"), Some(&Value::Null));
        assert_eq!(decoded[1], Value::Null);
    }

    #[test]
    fn arrays_carry_declared_length_and_reject_wrong_sizes() {
        let ty = LogicalType::Array(Box::new(LogicalType::Integer), 3);
        let value = Value::Array(Sequence::array(
            vec![Value::Integer(1), Value::Null, Value::Integer(3)],
            3,
        ));
        let decoded = roundtrip(&ty, &[Value::Null, value.clone()]);
        assert_eq!(decoded, vec![Value::Null, value]);
        assert_eq!(decoded[1].as_sequence().unwrap().declared_len(), Some(3));

        let short = Value::List(Sequence::list(vec![Value::Integer(1)]));
        assert!(encode_values(&ty, &[short]).is_err());
    }

    #[test]
    fn enum_and_union_expose_plain_values() {
        let mood = LogicalType::Enum(vec!["sad".into(), "ok".into(), "happy".into()]);
        let vector = encode_values(&mood, &[Value::from("happy")]).unwrap();
        assert_eq!(vector.data(), &VectorData::UInt8(vec![2]));
        assert_eq!(decode_value(&vector, 0).unwrap(), Value::from("happy"));
        assert!(encode_values(&mood, &[Value::from("angry")]).is_err());

        let union = LogicalType::Union(vec![
            ("num".into(), LogicalType::Integer),
            ("str".into(), LogicalType::Varchar),
        ]);
        let rows = [
            Value::Struct(StructValue::new(vec![("str".into(), Value::from("s"))])),
            Value::Struct(StructValue::new(vec![("num".into(), Value::Integer(9))])),
        ];
        assert_eq!(
            roundtrip(&union, &rows),
            vec![Value::from("s"), Value::Integer(9)]
        );
    }

    #[test]
    fn temporal_values_keep_timezone_presence() {
        let date = NaiveDate::from_ymd_opt(1969, 7, 20).unwrap();
        let time = NaiveTime::from_hms_micro_opt(20, 17, 40, 123_456).unwrap();
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let stamp = offset
            .with_ymd_and_hms(2024, 2, 29, 12, 0, 0)
            .single()
            .unwrap();
        let cases = [
            (LogicalType::Date, Value::Date(date)),
            (LogicalType::Time, Value::Time(time)),
            (LogicalType::TimeTz, Value::TimeTz(TimeTz::new(time, offset))),
            (LogicalType::Timestamp, Value::Timestamp(date.and_time(time))),
            (LogicalType::Interval, Value::Interval(Interval::new(1, 2, 3))),
        ];
        for (ty, value) in cases {
            assert_eq!(roundtrip(&ty, std::slice::from_ref(&value)), vec![value]);
        }
        let decoded = roundtrip(&LogicalType::TimestampTz, &[Value::TimestampTz(stamp)]);
        let Value::TimestampTz(utc) = &decoded[0] else {
            panic!("expected a zoned timestamp");
        };
        assert_eq!(*utc, stamp);
        assert_eq!(utc.offset().local_minus_utc(), 0);
    }

    #[test]
    fn mismatched_layout_is_a_conversion_error() {
        let vector =
            Vector::new(LogicalType::Integer, 1, None, VectorData::Int64(vec![1])).unwrap();
        let err = decode_value(&vector, 0).unwrap_err();
        assert!(err.to_string().contains("unexpected physical layout int64"));
        assert!(decode_value(&vector, 1).is_err());
        assert!(DataChunk::new(vec![vector, Vector::all_null(LogicalType::Null, 2)]).is_err());
    }

    #[test]
    fn short_buffers_and_stray_offsets_are_conversion_errors() {
        let short = Vector::new(LogicalType::Integer, 2, None, VectorData::Int32(vec![1]));
        assert!(matches!(short, Err(crate::error::BridgeError::Conversion(_))));

        let child = Vector::new(LogicalType::Integer, 1, None, VectorData::Int32(vec![7])).unwrap();
        let list = Vector::new(
            LogicalType::List(Box::new(LogicalType::Integer)),
            1,
            None,
            VectorData::List {
                entries: vec![ListEntry {
                    offset: 0,
                    length: 3,
                }],
                child: Box::new(child.clone()),
            },
        )
        .unwrap();
        assert!(decode_value(&list, 0).is_err());

        let array = Vector::new(
            LogicalType::Array(Box::new(LogicalType::Integer), usize::MAX),
            2,
            None,
            VectorData::Array {
                child: Box::new(child),
            },
        )
        .unwrap();
        assert!(decode_value(&array, 1).is_err());
    }
}
