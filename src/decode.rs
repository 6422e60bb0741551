use rmp::{decode, Marker};
use serde::de::DeserializeOwned;

use crate::{
    response::Header,
    wire::{
        ERROR_CODE_BIT, FIELD_NAME, FIELD_TYPE, KEY_CODE, KEY_DATA, KEY_ERROR, KEY_METADATA,
        KEY_SQL_INFO, KEY_SYNC, OK_CODE, SQL_INFO_ROW_COUNT,
    },
    Col, Response, Result, TarantoolError, Value,
};

/// Bytes at or below this length are the framing tail of a response with no body.
const EMPTY_BODY_LEN: usize = 2;

/// Deepest container nesting accepted in an untyped value, matching rmp-serde's default.
const MAX_DEPTH: usize = 1024;

/// Decodes the response header map, advancing `rd` past it.
pub fn decode_header(rd: &mut &[u8]) -> Result<Header> {
    let len = decode::read_map_len(rd).map_err(TarantoolError::decode)?;
    let mut header = Header::default();

    for _ in 0..len {
        match small_int(rd)? {
            KEY_SYNC => header.sync = read_u64(rd)? as u32,
            KEY_CODE => header.code = read_u64(rd)? as u32,
            _ => skip_value(rd)?,
        }
    }

    Ok(header)
}

/// Decodes a response body into an untyped [`Response`].
///
/// A failing status code is returned as [`TarantoolError::Server`] with the
/// error bit cleared.
pub fn decode_body(header: Header, body: &[u8]) -> Result<Response> {
    let mut response = Response {
        sync: header.sync,
        code: header.code,
        ..Response::default()
    };

    if body.len() <= EMPTY_BODY_LEN {
        return Ok(response);
    }

    let mut rd = body;
    let len = decode::read_map_len(&mut rd).map_err(TarantoolError::decode)?;

    for _ in 0..len {
        match small_int(&mut rd)? {
            KEY_DATA => response.data = read_value(&mut rd)?.into_array()?,
            KEY_SQL_INFO => response.sql_row_count = Some(read_sql_row_count(&mut rd)?),
            KEY_ERROR => response.error = Some(read_string(&mut rd)?),
            KEY_METADATA => read_metadata(&mut rd, &mut response.meta)?,
            _key => {
                #[cfg(feature = "tracing")]
                tracing::debug!(key = _key, "skipping unknown response body key");
                skip_value(&mut rd)?;
            }
        }
    }

    check_status(response.code, response.error.as_deref())?;
    Ok(response)
}

/// Decodes a response body, deserializing the data payload straight into `dest`.
///
/// An empty body succeeds and leaves `dest` untouched.
pub fn decode_body_typed<T: DeserializeOwned>(
    header: Header,
    body: &[u8],
    dest: &mut T,
) -> Result<()> {
    if body.is_empty() {
        return Ok(());
    }

    let mut rd = body;
    let len = decode::read_map_len(&mut rd).map_err(TarantoolError::decode)?;
    let mut message = None;

    for _ in 0..len {
        match small_int(&mut rd)? {
            KEY_DATA => *dest = rmp_serde::from_read(&mut rd).map_err(TarantoolError::decode)?,
            KEY_ERROR => message = Some(read_string(&mut rd)?),
            _ => skip_value(&mut rd)?,
        }
    }

    check_status(header.code, message.as_deref())
}

fn check_status(code: u32, message: Option<&str>) -> Result<()> {
    if code == OK_CODE {
        return Ok(());
    }
    Err(TarantoolError::Server {
        code: code & !ERROR_CODE_BIT,
        message: message.unwrap_or_default().to_owned(),
    })
}

/// Reads a map key: one byte inline when it is a positive fixint, otherwise
/// any MessagePack integer.
pub(crate) fn small_int(rd: &mut &[u8]) -> Result<i64> {
    match rd.first() {
        Some(&byte) if byte <= 0x7f => {
            *rd = &rd[1..];
            Ok(byte.into())
        }
        Some(_) => decode::read_int(rd).map_err(TarantoolError::decode),
        None => Err(unexpected_eof()),
    }
}

fn read_u64(rd: &mut &[u8]) -> Result<u64> {
    decode::read_int(rd).map_err(TarantoolError::decode)
}

fn read_string(rd: &mut &[u8]) -> Result<String> {
    let len = decode::read_str_len(rd).map_err(TarantoolError::decode)?;
    let bytes = take(rd, len as usize)?;
    String::from_utf8(bytes.to_vec()).map_err(TarantoolError::decode)
}

fn read_sql_row_count(rd: &mut &[u8]) -> Result<u64> {
    let info = read_value(rd)?;
    if !matches!(info, Value::Map(_)) {
        return Err(TarantoolError::Decode(format!(
            "sql info is not a map: {info}"
        )));
    }
    info.get(SQL_INFO_ROW_COUNT)
        .ok_or_else(|| TarantoolError::Decode("sql info has no row count".to_owned()))?
        .try_u64()
}

fn read_metadata(rd: &mut &[u8], meta: &mut Vec<Col>) -> Result<()> {
    let fields = match read_value(rd)? {
        Value::Array(fields) => fields,
        Value::Null => return Ok(()),
        other => {
            return Err(TarantoolError::Decode(format!(
                "metadata is not array: {other}"
            )))
        }
    };

    for field in &fields {
        let name = field.get(FIELD_NAME).and_then(Value::as_str);
        let type_name = field.get(FIELD_TYPE).and_then(Value::as_str);
        if let (Some(name), Some(type_name)) = (name, type_name) {
            push_column(meta, name, type_name);
        }
    }
    Ok(())
}

fn push_column(meta: &mut Vec<Col>, name: &str, type_name: &str) {
    match meta.iter_mut().find(|col| col.name == name) {
        Some(col) => col.type_name = type_name.to_owned(),
        None => meta.push(Col {
            name: name.to_owned(),
            type_name: type_name.to_owned(),
        }),
    }
}

/// Decodes one MessagePack value of any shape.
///
/// A `str` holding invalid UTF-8 is kept as [`Value::Binary`].
pub(crate) fn read_value(rd: &mut &[u8]) -> Result<Value> {
    read_nested(rd, 0)
}

fn read_nested(rd: &mut &[u8], depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(TarantoolError::Decode("value nesting too deep".to_owned()));
    }
    let marker = peek_marker(rd)?;
    let value = match marker {
        Marker::Null => {
            take(rd, 1)?;
            Value::Null
        }
        Marker::True | Marker::False => {
            take(rd, 1)?;
            Value::Boolean(matches!(marker, Marker::True))
        }
        Marker::FixPos(_) | Marker::U8 | Marker::U16 | Marker::U32 | Marker::U64 => {
            Value::Unsigned(read_u64(rd)?)
        }
        Marker::FixNeg(_) | Marker::I8 | Marker::I16 | Marker::I32 | Marker::I64 => {
            let value: i64 = decode::read_int(rd).map_err(TarantoolError::decode)?;
            Value::integer(value)
        }
        Marker::F32 => Value::Float(decode::read_f32(rd).map_err(TarantoolError::decode)?.into()),
        Marker::F64 => Value::Float(decode::read_f64(rd).map_err(TarantoolError::decode)?),
        Marker::FixStr(_) | Marker::Str8 | Marker::Str16 | Marker::Str32 => {
            let len = decode::read_str_len(rd).map_err(TarantoolError::decode)?;
            let bytes = take(rd, len as usize)?.to_vec();
            match String::from_utf8(bytes) {
                Ok(text) => Value::Text(text),
                Err(err) => Value::Binary(err.into_bytes()),
            }
        }
        Marker::Bin8 | Marker::Bin16 | Marker::Bin32 => {
            let len = decode::read_bin_len(rd).map_err(TarantoolError::decode)?;
            Value::Binary(take(rd, len as usize)?.to_vec())
        }
        Marker::FixArray(_) | Marker::Array16 | Marker::Array32 => {
            let len = decode::read_array_len(rd).map_err(TarantoolError::decode)? as usize;
            let mut items = Vec::with_capacity(len.min(rd.len()));
            for _ in 0..len {
                items.push(read_nested(rd, depth + 1)?);
            }
            Value::Array(items)
        }
        Marker::FixMap(_) | Marker::Map16 | Marker::Map32 => {
            let len = decode::read_map_len(rd).map_err(TarantoolError::decode)? as usize;
            let mut entries = Vec::with_capacity(len.min(rd.len()));
            for _ in 0..len {
                let key = read_nested(rd, depth + 1)?;
                let value = read_nested(rd, depth + 1)?;
                entries.push((key, value));
            }
            Value::Map(entries)
        }
        Marker::FixExt1
        | Marker::FixExt2
        | Marker::FixExt4
        | Marker::FixExt8
        | Marker::FixExt16
        | Marker::Ext8
        | Marker::Ext16
        | Marker::Ext32 => {
            let meta = decode::read_ext_meta(rd).map_err(TarantoolError::decode)?;
            Value::Ext {
                kind: meta.typeid,
                data: take(rd, meta.size as usize)?.to_vec(),
            }
        }
        Marker::Reserved => return Err(reserved_marker()),
    };
    Ok(value)
}

/// Skips one value of any shape and nesting depth without building it.
///
/// Containers only add their element count to the pending total, so nesting
/// never grows the call stack.
pub(crate) fn skip_value(rd: &mut &[u8]) -> Result<()> {
    let mut pending: u64 = 1;

    while pending > 0 {
        pending -= 1;
        match peek_marker(rd)? {
            Marker::Null
            | Marker::True
            | Marker::False
            | Marker::FixPos(_)
            | Marker::FixNeg(_) => {
                take(rd, 1)?;
            }
            Marker::U8 | Marker::I8 => {
                take(rd, 2)?;
            }
            Marker::U16 | Marker::I16 => {
                take(rd, 3)?;
            }
            Marker::U32 | Marker::I32 | Marker::F32 => {
                take(rd, 5)?;
            }
            Marker::U64 | Marker::I64 | Marker::F64 => {
                take(rd, 9)?;
            }
            Marker::FixStr(_) | Marker::Str8 | Marker::Str16 | Marker::Str32 => {
                let len = decode::read_str_len(rd).map_err(TarantoolError::decode)?;
                take(rd, len as usize)?;
            }
            Marker::Bin8 | Marker::Bin16 | Marker::Bin32 => {
                let len = decode::read_bin_len(rd).map_err(TarantoolError::decode)?;
                take(rd, len as usize)?;
            }
            Marker::FixArray(_) | Marker::Array16 | Marker::Array32 => {
                let len = decode::read_array_len(rd).map_err(TarantoolError::decode)?;
                pending += u64::from(len);
            }
            Marker::FixMap(_) | Marker::Map16 | Marker::Map32 => {
                let len = decode::read_map_len(rd).map_err(TarantoolError::decode)?;
                pending += 2 * u64::from(len);
            }
            Marker::FixExt1
            | Marker::FixExt2
            | Marker::FixExt4
            | Marker::FixExt8
            | Marker::FixExt16
            | Marker::Ext8
            | Marker::Ext16
            | Marker::Ext32 => {
                let meta = decode::read_ext_meta(rd).map_err(TarantoolError::decode)?;
                take(rd, meta.size as usize)?;
            }
            Marker::Reserved => return Err(reserved_marker()),
        }
    }
    Ok(())
}

fn peek_marker(rd: &[u8]) -> Result<Marker> {
    rd.first()
        .map(|&byte| Marker::from_u8(byte))
        .ok_or_else(unexpected_eof)
}

fn take<'a>(rd: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if rd.len() < len {
        return Err(unexpected_eof());
    }
    let slice: &'a [u8] = *rd;
    let (head, tail) = slice.split_at(len);
    *rd = tail;
    Ok(head)
}

fn unexpected_eof() -> TarantoolError {
    TarantoolError::Decode("unexpected end of buffer".to_owned())
}

fn reserved_marker() -> TarantoolError {
    TarantoolError::Decode("reserved msgpack marker 0xc1".to_owned())
}

#[cfg(test)]
pub(crate) mod tests {
    use serde::Serialize;

    use super::{read_value, skip_value, small_int};
    use crate::{decode, Col, Header, TarantoolError, Value};

    /// Builds MessagePack test packets.
    pub(crate) struct Packet(Vec<u8>);

    impl Packet {
        pub(crate) fn new() -> Self {
            Self(Vec::new())
        }

        pub(crate) fn header(sync: u64, code: u64) -> Self {
            Self::new().map(2).uint(0x01).uint(sync).uint(0x00).uint(code)
        }

        pub(crate) fn map(mut self, len: u32) -> Self {
            rmp::encode::write_map_len(&mut self.0, len).expect("must encode map");
            self
        }

        pub(crate) fn array(mut self, len: u32) -> Self {
            rmp::encode::write_array_len(&mut self.0, len).expect("must encode array");
            self
        }

        pub(crate) fn uint(mut self, value: u64) -> Self {
            rmp::encode::write_uint(&mut self.0, value).expect("must encode uint");
            self
        }

        pub(crate) fn sint(mut self, value: i64) -> Self {
            rmp::encode::write_sint(&mut self.0, value).expect("must encode sint");
            self
        }

        pub(crate) fn str(mut self, value: &str) -> Self {
            rmp::encode::write_str(&mut self.0, value).expect("must encode str");
            self
        }

        pub(crate) fn raw(mut self, bytes: &[u8]) -> Self {
            self.0.extend_from_slice(bytes);
            self
        }

        pub(crate) fn value<T: Serialize>(mut self, value: &T) -> Self {
            let bytes = rmp_serde::to_vec(value).expect("must encode value");
            self.0.extend_from_slice(&bytes);
            self
        }

        pub(crate) fn bytes(self) -> Vec<u8> {
            self.0
        }
    }

    fn ok_header() -> Header {
        Header { sync: 1, code: 0 }
    }

    #[test]
    fn small_int_fast_path() {
        for byte in [0u8, 1, 0x30, 0x7f] {
            let buf = [byte, 0xff];
            let mut rd = &buf[..];
            assert_eq!(small_int(&mut rd).expect("must read"), i64::from(byte));
            assert_eq!(rd, &[0xff]);
        }
    }

    #[test]
    fn small_int_general_path_matches_direct_read() {
        let cases: [(Vec<u8>, i64); 4] = [
            (vec![0xcc, 0x30], 0x30),
            (vec![0xcc, 0x80], 0x80),
            (Packet::new().uint(0x1234).bytes(), 0x1234),
            (Packet::new().sint(-5).bytes(), -5),
        ];
        for (buf, expected) in cases {
            let mut rd = &buf[..];
            assert_eq!(small_int(&mut rd).expect("must read"), expected);
            assert!(rd.is_empty());
        }
    }

    #[test]
    fn small_int_fails_on_truncated_buffer() {
        let mut rd: &[u8] = &[];
        assert!(matches!(small_int(&mut rd), Err(TarantoolError::Decode(_))));

        let mut rd: &[u8] = &[0xcd, 0x01];
        assert!(matches!(small_int(&mut rd), Err(TarantoolError::Decode(_))));
    }

    #[test]
    fn skip_walks_nested_values() {
        let nested = Value::Map(vec![(
            Value::text("k"),
            Value::Array(vec![
                Value::Array(vec![Value::Unsigned(1_000_000), Value::Float(2.5)]),
                Value::Binary(vec![1, 2, 3]),
                Value::Integer(-300),
                Value::Null,
            ]),
        )]);
        let buf = Packet::new().value(&nested).uint(7).bytes();
        let mut rd = &buf[..];
        skip_value(&mut rd).expect("must skip");
        assert_eq!(rd, &[7]);
    }

    #[test]
    fn skip_handles_deep_nesting() {
        let depth = 10_000;
        let mut buf = vec![0x91; depth];
        buf.push(0xc0);
        let mut rd = &buf[..];
        skip_value(&mut rd).expect("must skip");
        assert!(rd.is_empty());
    }

    #[test]
    fn deeply_nested_data_is_a_decode_error() {
        let mut body = Packet::new().map(1).uint(0x30).bytes();
        body.extend(std::iter::repeat(0x91).take(200_000));
        body.push(0xc0);
        let err = decode::decode_body(ok_header(), &body).expect_err("must fail");
        match err {
            TarantoolError::Decode(message) => assert!(message.contains("too deep")),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn nesting_within_limit_decodes() {
        let mut buf = vec![0x91; 1000];
        buf.push(0x01);
        let mut rd = &buf[..];
        read_value(&mut rd).expect("must decode");
        assert!(rd.is_empty());
    }

    #[test]
    fn invalid_utf8_field_is_kept_as_binary() {
        let body = Packet::new()
            .map(1)
            .uint(0x30)
            .array(1)
            .array(2)
            .uint(1)
            .raw(&[0xa2, 0xff, 0xfe])
            .bytes();
        let response = decode::decode_body(ok_header(), &body).expect("must decode");
        assert_eq!(
            response.data,
            vec![Value::Array(vec![
                Value::Unsigned(1),
                Value::Binary(vec![0xff, 0xfe])
            ])]
        );
    }

    #[test]
    fn invalid_utf8_error_message_is_rejected() {
        let body = Packet::new().map(1).uint(0x31).raw(&[0xa1, 0xff]).bytes();
        let header = Header {
            sync: 1,
            code: 0x8001,
        };
        assert!(matches!(
            decode::decode_body(header, &body),
            Err(TarantoolError::Decode(_))
        ));
    }

    #[test]
    fn skip_fails_on_truncated_value() {
        let buf = Packet::new().array(3).uint(1).bytes();
        let mut rd = &buf[..];
        assert!(matches!(skip_value(&mut rd), Err(TarantoolError::Decode(_))));
    }

    #[test]
    fn read_value_decodes_every_shape() {
        let buf = Packet::new()
            .array(5)
            .uint(300)
            .sint(-2)
            .str("abc")
            .map(1)
            .uint(0)
            .raw(&[0xc3])
            .raw(&[0xd4, 0x01, 0x09])
            .bytes();
        let mut rd = &buf[..];
        let value = read_value(&mut rd).expect("must decode");
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Unsigned(300),
                Value::Integer(-2),
                Value::text("abc"),
                Value::Map(vec![(Value::Unsigned(0), Value::Boolean(true))]),
                Value::Ext {
                    kind: 1,
                    data: vec![9]
                },
            ])
        );
    }

    #[test]
    fn header_reads_sync_and_code_and_skips_unknown() {
        let buf = Packet::new()
            .map(3)
            .uint(0x05)
            .array(2)
            .str("x")
            .map(0)
            .uint(0x01)
            .uint(0x1_0000_0007)
            .uint(0x00)
            .uint(0x8003)
            .raw(&[0xaa])
            .bytes();
        let mut rd = &buf[..];
        let header = decode::decode_header(&mut rd).expect("must decode header");
        assert_eq!(header.sync, 7);
        assert_eq!(header.code, 0x8003);
        assert_eq!(rd, &[0xaa]);
    }

    #[test]
    fn header_rejects_non_map() {
        let buf = Packet::new().array(0).bytes();
        let mut rd = &buf[..];
        assert!(matches!(
            decode::decode_header(&mut rd),
            Err(TarantoolError::Decode(_))
        ));
    }

    #[test]
    fn body_with_data_array_keeps_order() {
        let body = Packet::new()
            .map(1)
            .uint(0x30)
            .value(&vec![(1u32, "a"), (2u32, "b"), (3u32, "c")])
            .bytes();
        let response = decode::decode_body(ok_header(), &body).expect("must decode");
        assert_eq!(response.data.len(), 3);
        assert_eq!(
            response.data[2],
            Value::Array(vec![Value::Unsigned(3), Value::text("c")])
        );
        assert!(response.error.is_none());
        assert!(response.meta.is_empty());
        assert!(response.sql_row_count.is_none());
    }

    #[test]
    fn body_rejects_non_array_data() {
        let body = Packet::new().map(1).uint(0x30).str("scalar").bytes();
        let err = decode::decode_body(ok_header(), &body).expect_err("must fail");
        match err {
            TarantoolError::Decode(message) => assert!(message.contains("scalar")),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn body_with_error_status_clears_error_bit() {
        let body = Packet::new()
            .map(1)
            .uint(0x31)
            .str("Space 'users' does not exist")
            .bytes();
        let header = Header {
            sync: 9,
            code: 0x8000 | 36,
        };
        let err = decode::decode_body(header, &body).expect_err("must fail");
        match err {
            TarantoolError::Server { code, message } => {
                assert_eq!(code, 36);
                assert_eq!(message, "Space 'users' does not exist");
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[test]
    fn body_reads_sql_metadata_in_declaration_order() {
        let body = Packet::new()
            .map(2)
            .uint(0x32)
            .array(4)
            .map(2)
            .uint(0)
            .str("id")
            .uint(1)
            .str("integer")
            .map(2)
            .uint(0)
            .str("name")
            .uint(1)
            .str("string")
            .map(1)
            .uint(0)
            .str("orphan")
            .uint(42)
            .uint(0x30)
            .array(0)
            .bytes();
        let response = decode::decode_body(ok_header(), &body).expect("must decode");
        assert_eq!(
            response.meta,
            vec![
                Col {
                    name: "id".to_owned(),
                    type_name: "integer".to_owned()
                },
                Col {
                    name: "name".to_owned(),
                    type_name: "string".to_owned()
                },
            ]
        );
        assert_eq!(response.column_type("name"), Some("string"));
    }

    #[test]
    fn body_reads_sql_info_row_count() {
        let body = Packet::new().map(1).uint(0x42).map(1).uint(0).uint(5).bytes();
        let response = decode::decode_body(ok_header(), &body).expect("must decode");
        assert_eq!(response.sql_row_count, Some(5));
    }

    #[test]
    fn body_rejects_signed_sql_row_count() {
        let body = Packet::new().map(1).uint(0x42).map(1).uint(0).sint(-1).bytes();
        assert!(matches!(
            decode::decode_body(ok_header(), &body),
            Err(TarantoolError::Decode(_))
        ));
    }

    #[test]
    fn body_skips_unknown_keys() {
        let body = Packet::new()
            .map(2)
            .uint(0x99)
            .map(1)
            .str("nested")
            .array(2)
            .uint(1)
            .uint(2)
            .uint(0x30)
            .array(1)
            .uint(11)
            .bytes();
        let response = decode::decode_body(ok_header(), &body).expect("must decode");
        assert_eq!(response.data, vec![Value::Unsigned(11)]);
    }

    #[test]
    fn empty_body_decodes_trivially() {
        for body in [&[][..], &[0x80][..], &[0x80, 0x80][..]] {
            let response = decode::decode_body(ok_header(), body).expect("must decode");
            assert!(response.data.is_empty());
            assert!(response.error.is_none());
            assert!(response.meta.is_empty());
            assert!(response.sql_row_count.is_none());
        }
    }

    #[test]
    fn typed_body_decodes_into_destination() {
        let body = Packet::new()
            .map(2)
            .uint(0x77)
            .str("ignored")
            .uint(0x30)
            .value(&vec![(1u32, "kit".to_owned())])
            .bytes();
        let mut dest: Vec<(u32, String)> = Vec::new();
        decode::decode_body_typed(ok_header(), &body, &mut dest).expect("must decode");
        assert_eq!(dest, vec![(1, "kit".to_owned())]);
    }

    #[test]
    fn typed_body_empty_leaves_destination() {
        let mut dest = vec![(5u32, "kept".to_owned())];
        let header = Header {
            sync: 1,
            code: 0x8001,
        };
        decode::decode_body_typed(header, &[], &mut dest).expect("must succeed");
        assert_eq!(dest, vec![(5, "kept".to_owned())]);
    }

    #[test]
    fn typed_body_error_status() {
        let body = Packet::new().map(1).uint(0x31).str("boom").bytes();
        let header = Header {
            sync: 1,
            code: 0x8000 | 0x20,
        };
        let mut dest: Vec<u32> = Vec::new();
        let err = decode::decode_body_typed(header, &body, &mut dest).expect_err("must fail");
        assert!(matches!(
            err,
            TarantoolError::Server { code: 0x20, ref message } if message == "boom"
        ));
    }
}
