use std::fs;

use bytes::Bytes;
use rpcframe_protocol::{Datum, ErrorHeader, Protocol, RequestHeader, Value};
use rpcframe_transport::{MemoryTransport, Transport};
use serde_json::Value as Json;

use crate::cmd::{split_pair, SampleArgs};
use crate::exit::{io_error, protocol_error, transport_error, CliResult, SUCCESS};
use crate::output::print_raw;

pub fn run(args: SampleArgs) -> CliResult<i32> {
    let message = if args.response {
        encode_response(args.result.as_deref(), args.error.as_deref())?
    } else {
        let method = args.method.as_deref().unwrap_or_default();
        encode_request(method, &args.args, &args.tags)?
    };

    match &args.out {
        Some(path) => fs::write(path, &message)
            .map_err(|err| io_error(&format!("failed writing {}", path.display()), err))?,
        None => print_raw(&message),
    }
    tracing::info!(len = message.len(), "sample message written");
    Ok(SUCCESS)
}

pub fn encode_request(method: &str, args: &[String], tags: &[String]) -> CliResult<Bytes> {
    let mut header = RequestHeader::new(method, args.len());
    for tag in tags {
        let (key, value) = split_pair("--tag", tag)?;
        header = header.with_tag(key, value);
    }
    let mut arguments = Vec::with_capacity(args.len());
    for arg in args {
        let (name, value) = split_pair("--arg", arg)?;
        arguments.push((name, parse_datum(value)));
    }

    let mut protocol = Protocol::new(MemoryTransport::new());
    write_request(&mut protocol, &header, &arguments)
        .map_err(|err| protocol_error("encoding request failed", err))?;
    take_message(protocol)
}

fn write_request(
    protocol: &mut Protocol<MemoryTransport>,
    header: &RequestHeader,
    arguments: &[(&str, Datum)],
) -> rpcframe_protocol::Result<()> {
    protocol.write_request_start(header)?;
    for (name, value) in arguments {
        protocol.write_argument_start(name)?;
        protocol.write_datum(value)?;
        protocol.write_argument_end()?;
    }
    protocol.write_request_end()
}

pub fn encode_response(result: Option<&str>, error: Option<&str>) -> CliResult<Bytes> {
    let mut protocol = Protocol::new(MemoryTransport::new());
    write_response(&mut protocol, result, error)
        .map_err(|err| protocol_error("encoding response failed", err))?;
    take_message(protocol)
}

fn write_response(
    protocol: &mut Protocol<MemoryTransport>,
    result: Option<&str>,
    error: Option<&str>,
) -> rpcframe_protocol::Result<()> {
    protocol.write_response_start(error.is_none())?;
    if let Some(message) = error {
        protocol.write_error(&ErrorHeader::new(message))?;
    } else if let Some(result) = result {
        protocol.write_datum(&parse_datum(result))?;
    }
    protocol.write_response_end()
}

fn take_message(protocol: Protocol<MemoryTransport>) -> CliResult<Bytes> {
    protocol
        .into_transport()
        .receive()
        .map_err(|err| transport_error("loopback receive failed", err))
}

/// Read a command-line value as JSON, falling back to a plain string.
pub fn parse_datum(input: &str) -> Datum {
    match serde_json::from_str::<Json>(input) {
        Ok(json) => json_to_datum(json),
        Err(_) => Datum::Primitive(Value::String(input.to_string())),
    }
}

fn json_to_datum(json: Json) -> Datum {
    match json {
        Json::Null => Datum::Null,
        Json::Bool(b) => Datum::from(b),
        Json::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => Datum::from(i),
            (None, Some(u)) => Datum::Primitive(Value::from(u)),
            _ => Datum::from(n.as_f64().unwrap_or_default()),
        },
        Json::String(s) => Datum::from(s),
        Json::Array(items) => Datum::List(items.into_iter().map(json_to_datum).collect()),
        Json::Object(entries) => Datum::Map(
            entries
                .into_iter()
                .map(|(key, value)| (Datum::from(key), json_to_datum(value)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalars_as_json() {
        assert_eq!(parse_datum("3"), Datum::from(3i64));
        assert_eq!(parse_datum("2.5"), Datum::from(2.5f64));
        assert_eq!(parse_datum("true"), Datum::from(true));
        assert_eq!(parse_datum("null"), Datum::Null);
        assert_eq!(parse_datum("\"7\""), Datum::from("7"));
    }

    #[test]
    fn non_json_is_a_string() {
        assert_eq!(parse_datum("hello world"), Datum::from("hello world"));
    }

    #[test]
    fn nested_json_becomes_lists_and_maps() {
        assert_eq!(
            parse_datum(r#"{"xs": [1, null]}"#),
            Datum::Map(vec![(
                Datum::from("xs"),
                Datum::List(vec![Datum::from(1i64), Datum::Null])
            )])
        );
    }

    #[test]
    fn request_reads_back() {
        let message = encode_request(
            "add",
            &["a=3".to_string(), "b=4".to_string()],
            &["trace=abc".to_string()],
        )
        .unwrap();

        let mut protocol = Protocol::new(MemoryTransport::with_incoming([message]));
        let header = protocol.read_request_start().unwrap();
        assert_eq!(header.method_name, "add");
        assert_eq!(header.argument_count, 2);
        assert_eq!(header.tags.get("trace").map(String::as_str), Some("abc"));
        for (name, value) in [("a", 3i64), ("b", 4)] {
            assert_eq!(protocol.read_argument_start().unwrap().name, name);
            assert_eq!(protocol.read_datum().unwrap(), Datum::from(value));
            protocol.read_argument_end().unwrap();
        }
        protocol.read_request_end().unwrap();
    }

    #[test]
    fn error_response_carries_message() {
        let message = encode_response(None, Some("division by zero")).unwrap();

        let mut protocol = Protocol::new(MemoryTransport::with_incoming([message]));
        assert!(!protocol.read_response_start().unwrap().is_valid);
        let remote = protocol.read_error().unwrap().into_error();
        assert_eq!(remote.to_string(), "division by zero");
        protocol.read_response_end().unwrap();
    }

    #[test]
    fn bad_argument_syntax_is_usage_error() {
        let err = encode_request("m", &["novalue".to_string()], &[]).unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }
}
